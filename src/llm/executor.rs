//! Request executor: chat-completions calls with rate-limit backoff.

use std::time::Duration;

use crate::config::CleanConfig;
use crate::error::CleanResult;
use crate::llm::transport::{HttpRequest, Transport, UreqTransport};
use crate::llm::{ChatBackend, LlmError, LlmResult};
use crate::model::{ModelResolver, ResolvedModel};
use crate::prompt::Prompt;

/// Exponential backoff for HTTP 429 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first request.
    pub max_attempts: u32,
    /// Delay after the first rate-limited attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt:
    /// `base`, `2 * base`, `4 * base`, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Sends prompts to one resolved model.
pub struct RequestExecutor<T: Transport = UreqTransport> {
    transport: T,
    model: ResolvedModel,
    policy: RetryPolicy,
    headers: Vec<(String, String)>,
}

impl RequestExecutor<UreqTransport> {
    /// Resolve `model_id` and build a network-backed executor.
    ///
    /// Fails on unsupported models or missing credentials without touching
    /// the network.
    pub fn from_config(model_id: &str, config: &CleanConfig) -> CleanResult<Self> {
        let model = ModelResolver::from_env(config).resolve(model_id)?;
        let policy = config.retry.policy()?;
        let transport = UreqTransport::new(config.timeout_secs);
        let headers = if model.route.is_gateway() {
            vec![
                ("HTTP-Referer".to_string(), config.gateway.referer.clone()),
                ("X-Title".to_string(), config.gateway.title.clone()),
            ]
        } else {
            Vec::new()
        };
        tracing::info!(
            model = %model.canonical,
            route = ?model.route,
            max_attempts = policy.max_attempts,
            "model resolved"
        );
        Ok(Self::new(transport, model, policy).with_headers(headers))
    }
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(transport: T, model: ResolvedModel, policy: RetryPolicy) -> Self {
        Self {
            transport,
            model,
            policy,
            headers: Vec::new(),
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn model(&self) -> &ResolvedModel {
        &self.model
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn request_body(&self, prompt: &Prompt) -> serde_json::Value {
        serde_json::json!({
            "model": self.model.wire_model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "response_format": { "type": "json_object" },
        })
    }

    /// Send one prompt, retrying only on HTTP 429.
    pub fn send(&self, prompt: &Prompt) -> LlmResult<String> {
        let body = self.request_body(prompt);
        let request = HttpRequest {
            url: &self.model.endpoint,
            api_key: self.model.api_key.expose(),
            headers: &self.headers,
            body: &body,
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(attempt, model = %self.model.canonical, "sending request");
            let reply = self.transport.post_json(&request)?;

            if reply.is_success() {
                return message_content(&reply.body);
            }
            if reply.status != 429 {
                return Err(LlmError::Http {
                    status: reply.status,
                    body: reply.body,
                });
            }
            if attempt >= self.policy.max_attempts {
                tracing::warn!(attempt, "rate limited, retries exhausted");
                return Err(LlmError::RateLimited {
                    endpoint: self.model.endpoint.clone(),
                    attempts: attempt,
                });
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "rate limited, backing off"
            );
            std::thread::sleep(delay);
        }
    }
}

impl<T: Transport> ChatBackend for RequestExecutor<T> {
    fn complete(&self, prompt: &Prompt) -> LlmResult<String> {
        self.send(prompt)
    }

    fn model_id(&self) -> &str {
        &self.model.canonical
    }
}

/// Pull `choices[0].message.content` out of a chat-completions envelope.
fn message_content(body: &str) -> LlmResult<String> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| LlmError::UnexpectedResponse {
            message: format!("response is not JSON: {e}"),
            body: body.to_string(),
        })?;

    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| LlmError::UnexpectedResponse {
            message: "missing 'choices[0].message.content'".into(),
            body: body.to_string(),
        })
}
