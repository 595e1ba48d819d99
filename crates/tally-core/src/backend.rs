use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;

use crate::classifier::RawReply;
use crate::error::BackendError;
use crate::message::HistoryEntry;

/// Body of one outbound query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub message: String,
    pub history: Vec<HistoryEntry>,
}

/// The remote analytics service. It answers one request with one reply.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn submit(&self, request: &QueryRequest) -> Result<RawReply, BackendError>;
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    url: String,
}

impl HttpBackend {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn submit(&self, request: &QueryRequest) -> Result<RawReply, BackendError> {
        let response = self.client.post(&self.url).json(request).send().await?;

        let status = response.status().as_u16();
        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let content_disposition = header(CONTENT_DISPOSITION);

        let body = response.bytes().await?.to_vec();

        Ok(RawReply {
            status,
            content_type,
            content_disposition,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Origin;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one connection with a canned raw HTTP response. Returns
    /// the backend URL and a handle yielding the request bytes received.
    async fn serve_once(response: Vec<u8>) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{}/chat", addr), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
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
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n",
            status,
            body.len()
        );
        for (name, value) in headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str("\r\n");
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(body);
        bytes
    }

    fn request() -> QueryRequest {
        QueryRequest {
            message: "Create a line graph for QE vs CA?".to_string(),
            history: vec![HistoryEntry {
                role: Origin::User,
                content: "hello".to_string(),
            }],
        }
    }

    #[test]
    fn test_request_wire_shape() {
        let wire = serde_json::to_value(request()).unwrap();
        assert_eq!(
            wire,
            serde_json::json!({
                "message": "Create a line graph for QE vs CA?",
                "history": [{"role": "user", "content": "hello"}]
            })
        );
    }

    #[tokio::test]
    async fn test_submit_posts_json_and_returns_reply() {
        let body = br#"{"response":"ok"}"#;
        let (url, server) = serve_once(http_response(
            "200 OK",
            &[("content-type", "application/json")],
            body,
        ))
        .await;

        let backend = HttpBackend::new(&url, Duration::from_secs(5)).unwrap();
        let reply = backend.submit(&request()).await.unwrap();

        assert_eq!(reply.status, 200);
        assert_eq!(reply.content_type.as_deref(), Some("application/json"));
        assert_eq!(reply.body, body.to_vec());

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /chat HTTP/1.1"));
        assert!(received.contains("\"message\":\"Create a line graph for QE vs CA?\""));
        assert!(received.contains("\"history\":[{\"role\":\"user\",\"content\":\"hello\"}]"));
    }

    #[tokio::test]
    async fn test_submit_keeps_spreadsheet_headers() {
        let (url, _server) = serve_once(http_response(
            "200 OK",
            &[
                (
                    "content-type",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                ),
                ("content-disposition", "attachment; filename=\"report.xlsx\""),
            ],
            b"PK\x03\x04",
        ))
        .await;

        let backend = HttpBackend::new(&url, Duration::from_secs(5)).unwrap();
        let reply = backend.submit(&request()).await.unwrap();
        assert!(reply.is_spreadsheet());
        assert_eq!(
            reply.content_disposition.as_deref(),
            Some("attachment; filename=\"report.xlsx\"")
        );
        assert_eq!(reply.body, b"PK\x03\x04".to_vec());
    }

    #[tokio::test]
    async fn test_failure_status_is_still_a_reply() {
        let (url, _server) = serve_once(http_response(
            "500 Internal Server Error",
            &[("content-type", "application/json")],
            br#"{"error":"boom"}"#,
        ))
        .await;

        let backend = HttpBackend::new(&url, Duration::from_secs(5)).unwrap();
        let reply = backend.submit(&request()).await.unwrap();
        assert_eq!(reply.status, 500);
        assert!(!reply.is_success());
    }

    #[tokio::test]
    async fn test_dropped_connection_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = read_request(&mut socket).await;
            drop(socket);
        });

        let url = format!("http://{}/chat", addr);
        let backend = HttpBackend::new(&url, Duration::from_secs(5)).unwrap();
        assert!(backend.submit(&request()).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = format!("http://{}/chat", addr);
        let backend = HttpBackend::new(&url, Duration::from_secs(5)).unwrap();
        let err = backend.submit(&request()).await.unwrap_err();
        assert_eq!(err.diagnostic(), "connection failed");
    }
}
