//! HTTP transport for chat-completion requests.
//!
//! Uses `ureq` for synchronous HTTP. A transport performs exactly one POST and
//! reports the status and body as-is; status handling and retries belong to
//! the executor.

use std::time::Duration;

use crate::llm::{LlmError, LlmResult};

/// One outbound request.
#[derive(Debug)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub api_key: &'a str,
    /// Extra headers beyond authorization and content type.
    pub headers: &'a [(String, String)],
    pub body: &'a serde_json::Value,
}

/// Status and body of a completed exchange, success or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single-shot HTTP POST.
pub trait Transport {
    /// Errors only on transport failure; any HTTP status is a reply.
    fn post_json(&self, request: &HttpRequest<'_>) -> LlmResult<HttpReply>;
}

/// Blocking transport backed by a shared `ureq::Agent`.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout_secs: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(timeout_secs))
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn post_json(&self, request: &HttpRequest<'_>) -> LlmResult<HttpReply> {
        let body = serde_json::to_string(request.body).map_err(|e| LlmError::Transport {
            endpoint: request.url.to_string(),
            message: format!("JSON serialize error: {e}"),
        })?;

        let mut call = self
            .agent
            .post(request.url)
            .set("Authorization", &format!("Bearer {}", request.api_key))
            .set("Content-Type", "application/json");
        for (name, value) in request.headers {
            call = call.set(name, value);
        }

        match call.send_string(&body) {
            Ok(response) => {
                let status = response.status();
                let body = response.into_string().map_err(|e| LlmError::Transport {
                    endpoint: request.url.to_string(),
                    message: format!("failed to read response body: {e}"),
                })?;
                Ok(HttpReply { status, body })
            }
            Err(ureq::Error::Status(status, response)) => Ok(HttpReply {
                status,
                body: error_body(response.into_string()),
            }),
            Err(ureq::Error::Transport(transport)) => Err(LlmError::Transport {
                endpoint: request.url.to_string(),
                message: transport.to_string(),
            }),
        }
    }
}

/// Body of a non-2xx reply, or a note saying why it could not be read.
fn error_body(read: std::io::Result<String>) -> String {
    read.unwrap_or_else(|e| format!("<failed to read error body: {e}>"))
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FailureKind;

    #[test]
    fn unreachable_endpoint_is_transport_error() {
        let transport = UreqTransport::new(2);
        let body = serde_json::json!({});
        let err = transport
            .post_json(&HttpRequest {
                url: "http://127.0.0.1:1/v1/chat/completions", // unreachable port
                api_key: "test",
                headers: &[],
                body: &body,
            })
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
    }

    #[test]
    fn success_range() {
        let ok = HttpReply {
            status: 204,
            body: String::new(),
        };
        let limited = HttpReply {
            status: 429,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!limited.is_success());
    }

    #[test]
    fn unreadable_error_body_is_reported() {
        let err = std::io::Error::new(std::io::ErrorKind::InvalidData, "stream did not contain valid UTF-8");
        let body = error_body(Err(err));
        assert!(body.starts_with("<failed to read error body: "));
        assert!(body.contains("valid UTF-8"));
        assert_eq!(error_body(Ok("quota exceeded".into())), "quota exceeded");
    }
}
