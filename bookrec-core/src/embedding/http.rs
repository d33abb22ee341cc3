//! Embedding client for OpenAI-compatible `/embeddings` endpoints.

use super::Embedder;
use crate::error::{RecError, RecResult};
use crate::vector::Embedding;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    model_id: String,
    dimensions: Option<usize>,
    max_retries: usize,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
    ) -> RecResult<Self> {
        if model.trim().is_empty() {
            return Err(RecError::Configuration("missing embedding model name".to_string()));
        }
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            let auth = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                .map_err(|_| RecError::Configuration("invalid embedding API key".to_string()))?;
            headers.insert(AUTHORIZATION, auth);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RecError::Configuration(format!("failed to build embedding HTTP client: {}", e)))?;

        let model_id = match dimensions {
            Some(d) => format!("{}@{}", model, d),
            None => model.to_string(),
        };
        Ok(HttpEmbedder {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            model_id,
            dimensions,
            max_retries: max_retries.max(1),
        })
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(200 * (1 << capped))
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, texts: &[String]) -> RecResult<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest { model: &self.model, input: texts, dimensions: self.dimensions };

        let mut attempt = 0usize;
        loop {
            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp
                            .json()
                            .await
                            .map_err(|e| RecError::Embedding(format!("failed to parse embedding response: {}", e)))?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != texts.len() {
                            return Err(RecError::Embedding(format!(
                                "endpoint returned {} embeddings for {} inputs",
                                parsed.data.len(),
                                texts.len()
                            )));
                        }
                        return Ok(parsed.data.into_iter().map(|entry| Embedding::from(entry.embedding)).collect());
                    }

                    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
                    if Self::should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "Embedding request rejected, retrying");
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(RecError::Embedding(format!("embedding request failed ({}): {}", status, body)));
                }
                Err(err) => {
                    if Self::is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "Embedding request failed, retrying");
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(RecError::Embedding(format!("embedding request failed: {}", err)));
                }
            }
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves each canned `(status, body)` to one connection, in order.
    async fn serve_canned(responses: Vec<(u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                let reply = format!(
                    "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        format!("http://{}", addr)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower.strip_prefix("content-length:").map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length {
                    return;
                }
            }
        }
    }

    fn embedder(base: &str, retries: usize) -> HttpEmbedder {
        HttpEmbedder::new(base, "mini-lm", Some("secret"), None, Duration::from_secs(5), retries).unwrap()
    }

    #[tokio::test]
    async fn test_http_embedder_orders_by_index() {
        let body = r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#;
        let base = serve_canned(vec![(200, body.to_string())]).await;

        let out = embedder(&base, 1).embed(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(out[0], Embedding::from(vec![1.0, 0.0]));
        assert_eq!(out[1], Embedding::from(vec![0.0, 1.0]));
    }

    #[tokio::test]
    async fn test_http_embedder_retries_server_errors() {
        let ok = r#"{"data":[{"embedding":[0.5],"index":0}]}"#;
        let base = serve_canned(vec![(503, "{}".to_string()), (200, ok.to_string())]).await;

        let out = embedder(&base, 3).embed(&["a".to_string()]).await.unwrap();
        assert_eq!(out, vec![Embedding::from(vec![0.5])]);
    }

    #[tokio::test]
    async fn test_http_embedder_count_mismatch_is_error() {
        let body = r#"{"data":[{"embedding":[0.5],"index":0}]}"#;
        let base = serve_canned(vec![(200, body.to_string())]).await;

        let result = embedder(&base, 1).embed(&["a".to_string(), "b".to_string()]).await;
        assert!(matches!(result, Err(RecError::Embedding(_))));
    }

    #[tokio::test]
    async fn test_http_embedder_client_error_not_retried() {
        let base = serve_canned(vec![(400, r#"{"error":"bad"}"#.to_string())]).await;
        let result = embedder(&base, 3).embed(&["a".to_string()]).await;
        match result {
            Err(RecError::Embedding(msg)) => assert!(msg.contains("400")),
            other => panic!("expected embedding error, got {:?}", other),
        }
    }

    #[test]
    fn test_model_id_includes_dimensions() {
        let e = HttpEmbedder::new("http://localhost", "text-embedding-3-small", None, Some(256), Duration::from_secs(1), 1).unwrap();
        assert_eq!(e.model_id(), "text-embedding-3-small@256");
        assert!(HttpEmbedder::new("http://localhost", " ", None, None, Duration::from_secs(1), 1).is_err());
    }
}
