//! JSON-over-HTTP calls with retry and exponential backoff.
//!
//! Shared by the OpenAI and Ollama embedding and completion adapters.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors (including timeouts) → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{anyhow, bail, Result};
use std::time::Duration;
use tracing::debug;

/// Build a client with a per-request timeout.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST `body` to `url` and return the parsed JSON response.
///
/// `label` names the provider in error messages (e.g. `"OpenAI"`).
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    label: &str,
) -> Result<serde_json::Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(provider = label, attempt, delay_secs = delay.as_secs(), "retrying");
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = bearer {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }

                // Client error (not 429): fail now
                let body_text = response.text().await.unwrap_or_default();
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("{} connection error ({}): {}", label, url, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("{} request failed after retries", label)))
}

/// Join a base URL and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// One-shot HTTP responders for adapter tests.
#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `responses` (status, JSON body) to consecutive connections and
    /// return the base URL. Each received request body is sent on the
    /// returned channel.
    pub async fn serve(
        responses: Vec<(u16, String)>,
    ) -> (String, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request_body = read_request(&mut socket).await;
                let _ = tx.send(request_body);

                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (format!("http://{}", addr), rx)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return String::from_utf8_lossy(&buf[header_end + 4..]).to_string();
                }
            }
        }
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://localhost:11434/", "/api/embed"),
            "http://localhost:11434/api/embed"
        );
        assert_eq!(
            join_url("https://api.openai.com", "v1/embeddings"),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[tokio::test]
    async fn test_post_json_success() {
        let (url, mut rx) = test_server::serve(vec![(200, r#"{"ok":true}"#.to_string())]).await;
        let client = client(5).unwrap();
        let json = post_json(
            &client,
            &join_url(&url, "x"),
            Some("k"),
            &serde_json::json!({"a": 1}),
            0,
            "Test",
        )
        .await
        .unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(rx.recv().await.unwrap(), r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_post_json_client_error_not_retried() {
        let (url, _rx) = test_server::serve(vec![(400, r#"{"error":"bad"}"#.to_string())]).await;
        let client = client(5).unwrap();
        let err = post_json(&client, &url, None, &serde_json::json!({}), 3, "Test")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_post_json_retries_server_error() {
        let (url, _rx) = test_server::serve(vec![
            (503, r#"{"error":"busy"}"#.to_string()),
            (200, r#"{"ok":1}"#.to_string()),
        ])
        .await;
        let client = client(5).unwrap();
        let json = post_json(&client, &url, None, &serde_json::json!({}), 1, "Test")
            .await
            .unwrap();
        assert_eq!(json["ok"], 1);
    }
}
