use crate::config::{EncoderConfig, EncodingFormat};
use crate::encoder::Encoder;
use crate::error::{DensebenchError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body of an OpenAI-compatible embeddings endpoint
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: EmbeddingPayload,
}

/// `float` responses carry a JSON array, `base64` responses a packed
/// little-endian f32 string.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingPayload {
    Float(Vec<f32>),
    Base64(String),
}

/// One failed request, tagged with whether another attempt may succeed
struct RequestError {
    retryable: bool,
    error: DensebenchError,
}

impl RequestError {
    fn fatal(error: DensebenchError) -> Self {
        Self { retryable: false, error }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint
///
/// Splits input into batches, retries rate limits and server errors with
/// exponential backoff, and checks every vector against the configured
/// dimensionality.
pub struct HttpEncoder {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    batch_size: usize,
    dimensions: usize,
    encoding_format: EncodingFormat,
    max_retries: usize,
    retry_delay: Duration,
}

impl HttpEncoder {
    pub fn new(config: &EncoderConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DensebenchError::Encoder(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            dimensions: config.dimensions,
            encoding_format: config.encoding_format,
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Initial backoff; doubled after every retry
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Embed texts in order, batch by batch
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.embed_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }
        Ok(all_embeddings)
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = self.retry_delay;

        loop {
            match self.request(texts).await {
                Ok(embeddings) => {
                    log::debug!(
                        "Encoded {} texts in {:?} (attempt {})",
                        texts.len(),
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(embeddings);
                }
                Err(e) if e.retryable && attempt < self.max_retries => {
                    log::warn!("Retry {}/{} after error: {}", attempt + 1, self.max_retries, e.error);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e.error),
            }
        }
    }

    async fn request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RequestError> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            encoding_format: self.encoding_format.as_str(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| RequestError {
            retryable: e.is_timeout() || e.is_connect(),
            error: DensebenchError::Encoder(format!("Network error: {}", e)),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RequestError {
                retryable: is_retryable(status),
                error: DensebenchError::Encoder(format!("Encoder endpoint returned {}: {}", status, body)),
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            RequestError::fatal(DensebenchError::Encoder(format!("Failed to parse response: {}", e)))
        })?;
        collect_embeddings(parsed, texts.len(), self.dimensions).map_err(RequestError::fatal)
    }
}

impl Encoder for HttpEncoder {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts).await
    }
}

/// Order rows by `index` and check count and width
fn collect_embeddings(response: EmbeddingResponse, expected: usize, dimensions: usize) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return Err(DensebenchError::Encoder(format!(
            "Requested {} embeddings, received {}",
            expected,
            response.data.len()
        )));
    }

    let mut data = response.data;
    data.sort_by_key(|d| d.index);

    let mut embeddings = Vec::with_capacity(expected);
    for (position, item) in data.into_iter().enumerate() {
        if item.index != position {
            return Err(DensebenchError::Encoder(format!(
                "Response indices are not 0..{}: missing {}",
                expected, position
            )));
        }
        let vector = match item.embedding {
            EmbeddingPayload::Float(v) => v,
            EmbeddingPayload::Base64(s) => decode_base64_embedding(&s)?,
        };
        if vector.len() != dimensions {
            return Err(DensebenchError::Dimension {
                expected: dimensions,
                got: vector.len(),
            });
        }
        embeddings.push(vector);
    }
    Ok(embeddings)
}

/// Decode a base64 string of packed little-endian f32 values
pub fn decode_base64_embedding(encoded: &str) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| DensebenchError::Encoder(format!("Invalid base64 embedding: {}", e)))?;
    if bytes.len() % 4 != 0 {
        return Err(DensebenchError::Encoder(format!(
            "Base64 embedding has {} bytes, not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(endpoint: String, dimensions: usize) -> EncoderConfig {
        EncoderConfig {
            endpoint,
            model: "test-model".to_string(),
            api_key_env: None,
            batch_size: 2,
            dimensions,
            encoding_format: EncodingFormat::Float,
            max_retries: 2,
        }
    }

    fn response(json: &str) -> EmbeddingResponse {
        serde_json::from_str(json).unwrap()
    }

    /// Reads one HTTP request and returns its head and body
    async fn read_request(stream: &mut tokio::net::TcpStream) -> (String, String) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request head");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let length = head
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                while buf.len() < end + 4 + length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "connection closed before request body");
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body = String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).to_string();
                return (head, body);
            }
        }
    }

    /// Serves the canned (status, body) responses in order, one per connection.
    /// Returns the endpoint URL and a handle yielding the received requests.
    async fn serve(responses: Vec<(u16, String)>) -> (String, tokio::task::JoinHandle<Vec<(String, String)>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/embeddings", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                seen.push(read_request(&mut stream).await);
                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
            seen
        });
        (url, handle)
    }

    #[test]
    fn rows_are_ordered_by_index() {
        let parsed = response(
            r#"{"data":[{"index":1,"embedding":[3.0,4.0]},{"index":0,"embedding":[1.0,2.0]}]}"#,
        );
        let embeddings = collect_embeddings(parsed, 2, 2).unwrap();
        assert_eq!(embeddings, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn wrong_width_is_a_dimension_error() {
        let parsed = response(r#"{"data":[{"index":0,"embedding":[1.0,2.0,3.0]}]}"#);
        assert!(matches!(
            collect_embeddings(parsed, 1, 2),
            Err(DensebenchError::Dimension { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn missing_rows_are_rejected() {
        let parsed = response(r#"{"data":[{"index":0,"embedding":[1.0]}]}"#);
        assert!(collect_embeddings(parsed, 2, 1).is_err());
        let parsed = response(r#"{"data":[{"index":0,"embedding":[1.0]},{"index":0,"embedding":[2.0]}]}"#);
        assert!(collect_embeddings(parsed, 2, 1).is_err());
    }

    #[test]
    fn base64_payload_decodes_little_endian() {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|f| f.to_le_bytes()).collect();
        let encoded = STANDARD.encode(&bytes);
        assert_eq!(decode_base64_embedding(&encoded).unwrap(), vec![1.5, -2.0]);

        let parsed = response(&format!(r#"{{"data":[{{"index":0,"embedding":"{}"}}]}}"#, encoded));
        assert_eq!(collect_embeddings(parsed, 1, 2).unwrap(), vec![vec![1.5, -2.0]]);
    }

    #[test]
    fn base64_with_partial_float_is_rejected() {
        let encoded = STANDARD.encode([0u8, 0, 128]);
        assert!(decode_base64_embedding(&encoded).is_err());
        assert!(decode_base64_embedding("not base64!").is_err());
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn batches_requests_and_sends_bearer_key() {
        let (url, handle) = serve(vec![
            (200, r#"{"data":[{"index":0,"embedding":[1.0]},{"index":1,"embedding":[2.0]}]}"#.to_string()),
            (200, r#"{"data":[{"index":0,"embedding":[3.0]}]}"#.to_string()),
        ])
        .await;
        let encoder = HttpEncoder::new(&config(url, 1), Some("secret".to_string())).unwrap();

        let texts: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let embeddings = encoder.encode(&texts).await.unwrap();
        assert_eq!(embeddings, vec![vec![1.0], vec![2.0], vec![3.0]]);

        let requests = handle.await.unwrap();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].0.to_lowercase().contains("authorization: bearer secret"));
        let body: serde_json::Value = serde_json::from_str(&requests[0].1).unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["input"], serde_json::json!(["a", "b"]));
        assert_eq!(body["encoding_format"], "float");
    }

    #[tokio::test]
    async fn retries_server_errors() {
        let (url, handle) = serve(vec![
            (503, r#"{"error":"busy"}"#.to_string()),
            (200, r#"{"data":[{"index":0,"embedding":[0.5]}]}"#.to_string()),
        ])
        .await;
        let encoder = HttpEncoder::new(&config(url, 1), None)
            .unwrap()
            .with_retry_delay(Duration::from_millis(1));

        let embeddings = encoder.encode(&["x".to_string()]).await.unwrap();
        assert_eq!(embeddings, vec![vec![0.5]]);
        let requests = handle.await.unwrap();
        assert!(!requests[1].0.to_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, handle) = serve(vec![(400, r#"{"error":"bad input"}"#.to_string())]).await;
        let encoder = HttpEncoder::new(&config(url, 1), None)
            .unwrap()
            .with_retry_delay(Duration::from_millis(1));

        let err = encoder.encode(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, DensebenchError::Encoder(ref msg) if msg.contains("400")));
        assert_eq!(handle.await.unwrap().len(), 1);
    }
}
