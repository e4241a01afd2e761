//! Chat-completion plumbing shared by the analyzer and the classifiers.
//!
//! A request flows through three stages:
//! - [`transport`]: one HTTP POST, nothing more
//! - [`executor`]: model routing, rate-limit backoff, envelope decoding
//! - [`parse`]: recovering a JSON object from free-form model text
//!
//! Callers only see the [`ChatBackend`] trait, so tests can script the model.

pub mod executor;
pub mod parse;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;

use miette::Diagnostic;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompt::Prompt;

/// Errors from the LLM subsystem. Each one is fatal for the current result
/// key only; batch drivers record it and move on.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("rate limited by {endpoint}: gave up after {attempts} attempts")]
    #[diagnostic(
        code(clean::llm::rate_limited),
        help(
            "The provider kept answering HTTP 429. Wait and re-run (completed keys are \
             skipped), or raise `retry.max_attempts` / `retry.base_delay_ms`."
        )
    )]
    RateLimited { endpoint: String, attempts: u32 },

    #[error("upstream returned HTTP {status}: {body}")]
    #[diagnostic(
        code(clean::llm::http_status),
        help("The provider rejected the request. The response body above usually says why.")
    )]
    Http { status: u16, body: String },

    #[error("transport error talking to {endpoint}: {message}")]
    #[diagnostic(
        code(clean::llm::transport),
        help("Check network connectivity and the endpoint URL in the config file.")
    )]
    Transport { endpoint: String, message: String },

    #[error("malformed model output: {message}")]
    #[diagnostic(
        code(clean::llm::malformed_output),
        help("The model did not return the expected JSON object. The raw text is kept in the result store.")
    )]
    MalformedOutput { message: String, raw: String },

    #[error("unexpected response envelope: {message}")]
    #[diagnostic(
        code(clean::llm::unexpected_response),
        help("The endpoint answered 2xx but not in chat-completions format.")
    )]
    UnexpectedResponse { message: String, body: String },
}

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Serializable classification of an [`LlmError`], stored with failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    Http,
    Transport,
    MalformedOutput,
    UnexpectedResponse,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RateLimited => "rate-limited",
            Self::Http => "http",
            Self::Transport => "transport",
            Self::MalformedOutput => "malformed-output",
            Self::UnexpectedResponse => "unexpected-response",
        };
        f.write_str(s)
    }
}

impl LlmError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Http { .. } => FailureKind::Http,
            Self::Transport { .. } => FailureKind::Transport,
            Self::MalformedOutput { .. } => FailureKind::MalformedOutput,
            Self::UnexpectedResponse { .. } => FailureKind::UnexpectedResponse,
        }
    }

    /// Raw model text, when the failure happened after the model answered.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>, raw: &str) -> Self {
        Self::MalformedOutput {
            message: message.into(),
            raw: raw.to_string(),
        }
    }
}

/// Anything that can turn a prompt into model text.
pub trait ChatBackend {
    /// Send the prompt and return the assistant's raw text.
    fn complete(&self, prompt: &Prompt) -> LlmResult<String>;

    /// Canonical model identifier, recorded with every result.
    fn model_id(&self) -> &str;
}

/// Complete a prompt and decode the embedded JSON object into `T`.
///
/// Any shape mismatch is reported as [`LlmError::MalformedOutput`] carrying
/// the untouched model text.
pub fn ask_json<T: DeserializeOwned>(backend: &dyn ChatBackend, prompt: &Prompt) -> LlmResult<T> {
    let raw = backend.complete(prompt)?;
    decode_json(&raw)
}

/// Decode the JSON object embedded in raw model text into `T`.
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> LlmResult<T> {
    let value = parse::extract_json_object(raw)?;
    serde_json::from_value(value)
        .map_err(|e| LlmError::malformed(format!("unexpected JSON shape: {e}"), raw))
}
