//! Rich diagnostic error types for llm-clean.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. `CleanError` wraps them transparently so
//! the CLI can render the full diagnostic chain.

use miette::Diagnostic;
use thiserror::Error;

use crate::llm::LlmError;
use crate::ontology::OntologyError;
use crate::paths::PathError;
use crate::prompt::background::BackgroundError;
use crate::terms::InputError;

/// Top-level error type.
#[derive(Debug, Error, Diagnostic)]
pub enum CleanError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Background(#[from] BackgroundError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Path(#[from] PathError),
}

pub type CleanResult<T> = std::result::Result<T, CleanError>;

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors raised while building clients from configuration.
///
/// All of these surface before any network request is attempted.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unsupported model: \"{model}\"")]
    #[diagnostic(
        code(clean::config::unsupported_model),
        help(
            "Supported models are: {supported}. Use the `gemini` or `anthropic` shortcuts, \
             add the model to `models.supported` in the config file, or pass \
             --allow-unlisted-model for any `vendor/model` identifier."
        )
    )]
    UnsupportedModel { model: String, supported: String },

    #[error("malformed model identifier: \"{model}\"")]
    #[diagnostic(
        code(clean::config::malformed_model),
        help("Fully-qualified model identifiers have the form `vendor/model`, e.g. `openai/gpt-4o`.")
    )]
    MalformedModel { model: String },

    #[error("credential variable {var} is not set (required by model \"{model}\")")]
    #[diagnostic(
        code(clean::config::missing_credential),
        help("Export {var} in the environment before running, e.g. `export {var}=...`.")
    )]
    MissingCredential { var: String, model: String },

    #[error("failed to read config file: {path}")]
    #[diagnostic(
        code(clean::config::read),
        help("Ensure the file exists and is readable, or omit --config to use defaults.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(clean::config::parse),
        help("Check the TOML syntax. Every key is optional; remove unknown keys.")
    )]
    Parse { path: String, message: String },

    #[error("invalid retry policy: {message}")]
    #[diagnostic(
        code(clean::config::retry_policy),
        help("`retry.max_attempts` must be at least 1.")
    )]
    InvalidRetryPolicy { message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("result store I/O error at {path}: {source}")]
    #[diagnostic(
        code(clean::store::io),
        help(
            "A filesystem operation on the result store failed. Check that the \
             directory exists, has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("result store {path} is not valid: {message}")]
    #[diagnostic(
        code(clean::store::corrupt),
        help(
            "The store file could not be decoded. Move it aside to start a fresh run, \
             or repair the JSON by hand."
        )
    )]
    Corrupt { path: String, message: String },

    #[error("failed to serialize result store: {message}")]
    #[diagnostic(code(clean::store::serialize))]
    Serialize { message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
