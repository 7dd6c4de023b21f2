//! Bounded top-k selection with a deterministic tie-break.
//!
//! Candidates are ordered by descending score, then by ascending document
//! index. The selector keeps at most `k` candidates in a min-heap keyed on
//! that order, so selection is O(N log k) instead of a full sort.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// One scored document, addressed by its position in the corpus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub index: usize,
    pub score: f32,
}

/// Heap entry whose `Ord` says "greater = ranks earlier".
#[derive(Debug, Clone, Copy)]
struct Ranked(Hit);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .score
            .total_cmp(&other.0.score)
            .then_with(|| other.0.index.cmp(&self.0.index))
    }
}

/// Streaming top-k collector. Insertion order never affects the result.
#[derive(Debug, Clone)]
pub struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(4096) + 1),
        }
    }

    /// Offer a candidate. NaN scores are dropped.
    pub fn push(&mut self, index: usize, score: f32) {
        if self.k == 0 || score.is_nan() {
            return;
        }
        // -0.0 and 0.0 are the same score; only the index may break the tie.
        let score = score + 0.0;
        let candidate = Ranked(Hit { index, score });
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return;
        }
        // Heap is full: replace the current worst only if the candidate beats it.
        if let Some(Reverse(worst)) = self.heap.peek() {
            if candidate > *worst {
                self.heap.pop();
                self.heap.push(Reverse(candidate));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Consume the collector and return hits best-first.
    pub fn into_sorted(self) -> Vec<Hit> {
        let mut ranked: Vec<Ranked> = self.heap.into_iter().map(|Reverse(r)| r).collect();
        ranked.sort_by(|a, b| b.cmp(a));
        ranked.into_iter().map(|r| r.0).collect()
    }
}

/// Select the `k` best entries of one query's full score vector.
/// If `k` exceeds the number of scores, every (non-NaN) score is returned.
pub fn select_top_k(scores: &[f32], k: usize) -> Vec<Hit> {
    let mut top = TopK::new(k.min(scores.len()));
    for (index, &score) in scores.iter().enumerate() {
        top.push(index, score);
    }
    top.into_sorted()
}
