//! Client for the remote music generation service.
//!
//! The service takes one audio file as multipart field `file` on
//! `POST {endpoint}/generate` and answers with the generated audio bytes.

use std::time::Duration;

use crate::config::GenerationConfig;
use crate::recording::Clip;

/// Environment variable that overrides the configured bearer token.
pub const TOKEN_ENV: &str = "CHARADE_API_TOKEN";

/// Uploads clips to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl GenerationClient {
    /// Builds a client from configuration, applying the token override.
    ///
    /// # Errors
    /// - If the HTTP client cannot be constructed
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| config.token.clone().filter(|t| !t.trim().is_empty()));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            url: generate_url(&config.endpoint),
            token,
        })
    }

    /// The full URL clips are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Uploads a clip and returns the generated audio.
    ///
    /// # Errors
    /// - If the request cannot be sent (connection refused, timeout)
    /// - If the service answers with a non-success status
    /// - If the service answers with an empty body
    pub async fn generate(&self, clip: Clip) -> anyhow::Result<Vec<u8>> {
        let clip_size = clip.bytes.len();
        let file_part = reqwest::multipart::Part::bytes(clip.bytes)
            .file_name(clip.file_name.clone())
            .mime_str(&clip.mime)
            .map_err(|e| anyhow::anyhow!("Failed to create file part for upload: {e}"))?;

        let form = reqwest::multipart::Form::new().part("file", file_part);

        tracing::debug!(
            "Generation API Call:\n  URL: {}\n  Method: POST\n  Headers:\n    Authorization: {}\n    Content-Type: multipart/form-data\n  Body: file={} ({}, {} bytes)",
            self.url,
            if self.token.is_some() { "Bearer <redacted>" } else { "<none>" },
            clip.file_name,
            clip.mime,
            clip_size
        );

        let mut request = self.client.post(&self.url).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let error_msg = if e.is_connect() {
                    format!(
                        "Failed to connect to the generation service at {}. Is it running?",
                        self.url
                    )
                } else if e.is_timeout() {
                    "The generation service timed out before returning any audio.".to_string()
                } else {
                    format!("Generation network error: {e}")
                };
                tracing::error!("Upload failed: {e}");
                return Err(anyhow::anyhow!(error_msg));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Generation service returned {}: {}", status, error_body);

            let human_readable = match status.as_u16() {
                401 | 403 => format!(
                    "The generation service rejected the request (status {status}). Check the token in your config or {TOKEN_ENV}."
                ),
                413 => "The recording is too large for the generation service. Try a shorter take.".to_string(),
                429 => "The generation service is busy. Please wait and try again.".to_string(),
                500..=599 => format!(
                    "The generation service failed (status {status}). Please try again later."
                ),
                _ => format!("Generation service error (status {status}): {error_body}"),
            };
            return Err(anyhow::anyhow!(human_readable));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read generated audio: {e}"))?;

        if bytes.is_empty() {
            return Err(anyhow::anyhow!(
                "The generation service returned no audio."
            ));
        }

        tracing::info!("Generated audio received: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Appends the `/generate` route to a base endpoint.
pub fn generate_url(endpoint: &str) -> String {
    format!("{}/generate", endpoint.trim().trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    const WAV_HEADER: [u8; 12] = [
        0x52, 0x49, 0x46, 0x46, 0x24, 0x00, 0x00, 0x00, 0x57, 0x41, 0x56, 0x45,
    ];

    /// Serves a single canned HTTP response and hands back the raw request.
    async fn serve_once(status: &'static str, body: Vec<u8>) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;

            let head = format!(
                "HTTP/1.1 {status}\r\nContent-Type: audio/wav\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.ok();

            String::from_utf8_lossy(&request).to_string()
        });

        (endpoint, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> Vec<u8> {
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];

        let header_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return request;
            }
            request.extend_from_slice(&buf[..n]);
            if let Some(pos) = find(&request, b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok());

        loop {
            let done = match content_length {
                Some(len) => request.len() >= header_end + len,
                None => request.ends_with(b"0\r\n\r\n"),
            };
            if done {
                break;
            }
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        request
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    fn config(endpoint: &str, token: Option<&str>) -> GenerationConfig {
        GenerationConfig {
            endpoint: endpoint.to_string(),
            token: token.map(str::to_string),
            timeout_secs: 10,
        }
    }

    fn clip() -> Clip {
        Clip {
            bytes: b"fake recording".to_vec(),
            file_name: "recording.wav".to_string(),
            mime: "audio/wav".to_string(),
        }
    }

    #[test]
    fn test_generate_url_trims_slashes() {
        assert_eq!(generate_url("http://localhost:8000"), "http://localhost:8000/generate");
        assert_eq!(generate_url("http://localhost:8000//"), "http://localhost:8000/generate");
    }

    #[tokio::test]
    async fn test_generate_returns_audio_bytes() {
        let (endpoint, server) = serve_once("200 OK", WAV_HEADER.to_vec()).await;
        let client = GenerationClient::new(&config(&endpoint, Some("secret"))).unwrap();

        let bytes = client.generate(clip()).await.unwrap();
        assert_eq!(bytes, WAV_HEADER.to_vec());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /generate HTTP/1.1"));
        assert!(request.contains("name=\"file\""));
        assert!(request.contains("filename=\"recording.wav\""));
        assert!(request.contains("fake recording"));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn test_generate_maps_server_error() {
        let (endpoint, server) = serve_once("500 Internal Server Error", b"oops".to_vec()).await;
        let client = GenerationClient::new(&config(&endpoint, None)).unwrap();

        let err = client.generate(clip()).await.unwrap_err();
        assert!(err.to_string().contains("500"));

        let request = server.await.unwrap();
        assert!(!request.to_ascii_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_body() {
        let (endpoint, _server) = serve_once("200 OK", Vec::new()).await;
        let client = GenerationClient::new(&config(&endpoint, None)).unwrap();

        let err = client.generate(clip()).await.unwrap_err();
        assert!(err.to_string().contains("no audio"));
    }

    #[tokio::test]
    async fn test_generate_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let client = GenerationClient::new(&config(&endpoint, None)).unwrap();
        let err = client.generate(clip()).await.unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
