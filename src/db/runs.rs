use crate::db::Db;
use crate::error::Result;
use rusqlite::params;

/// One evaluated dataset of an eval run
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub dataset: String,
    pub model: String,
    pub score_function: String,
    pub query_count: usize,
    /// The dataset's score table as written to score.json
    pub scores_json: String,
    pub created_at: String,
}

/// Store a run record. Recording the same (run, dataset) twice replaces it.
pub async fn record_run(db: &Db, record: RunRecord) -> Result<()> {
    db.with_connection(move |conn| {
        conn.execute(
            "INSERT OR REPLACE INTO eval_runs
             (run_id, dataset, model, score_function, query_count, scores_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.run_id,
                record.dataset,
                record.model,
                record.score_function,
                record.query_count as i64,
                record.scores_json,
                record.created_at,
            ],
        )?;
        Ok(())
    })
    .await
}

/// Most recent records first
pub async fn recent_runs(db: &Db, limit: usize) -> Result<Vec<RunRecord>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT run_id, dataset, model, score_function, query_count, scores_json, created_at
             FROM eval_runs
             ORDER BY created_at DESC, id DESC
             LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(RunRecord {
                    run_id: row.get(0)?,
                    dataset: row.get(1)?,
                    model: row.get(2)?,
                    score_function: row.get(3)?,
                    query_count: row.get::<_, i64>(4)? as usize,
                    scores_json: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(records)
    })
    .await
}
