//! Model identifier resolution.
//!
//! A user-supplied identifier is resolved exactly once, when a client is
//! built: the shortcut aliases route to the provider's native endpoint with
//! its own credential, everything else goes through the gateway. Unsupported
//! names and missing credentials fail here, before any network I/O.

use crate::config::CleanConfig;
use crate::error::{ConfigError, ConfigResult};

/// The closed set of model identifier forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSpec {
    /// The `gemini` shortcut.
    Gemini,
    /// The `anthropic` shortcut.
    Anthropic,
    /// Any `vendor/model` identifier, routed through the gateway.
    Qualified(String),
}

impl ModelSpec {
    pub fn parse(id: &str) -> Self {
        match id.trim() {
            "gemini" => Self::Gemini,
            "anthropic" => Self::Anthropic,
            other => Self::Qualified(other.to_string()),
        }
    }
}

/// Where requests for a resolved model are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Google,
    Anthropic,
    Gateway,
}

impl Route {
    pub fn is_gateway(self) -> bool {
        matches!(self, Self::Gateway)
    }
}

/// A credential value. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Everything the executor needs to address a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Canonical `vendor/model` name, recorded with results.
    pub canonical: String,
    /// Name sent in the request body.
    pub wire_model: String,
    pub endpoint: String,
    pub route: Route,
    /// Environment variable the key was read from.
    pub credential_var: String,
    pub api_key: ApiKey,
}

type Lookup = Box<dyn Fn(&str) -> Option<String>>;

/// Resolves identifiers against a configuration and a credential source.
pub struct ModelResolver<'a> {
    config: &'a CleanConfig,
    lookup: Lookup,
}

impl<'a> ModelResolver<'a> {
    /// Resolver reading credentials from the process environment.
    pub fn from_env(config: &'a CleanConfig) -> Self {
        Self::with_lookup(config, |var| {
            std::env::var(var).ok().filter(|v| !v.trim().is_empty())
        })
    }

    /// Resolver with an explicit credential source.
    pub fn with_lookup(
        config: &'a CleanConfig,
        lookup: impl Fn(&str) -> Option<String> + 'static,
    ) -> Self {
        Self {
            config,
            lookup: Box::new(lookup),
        }
    }

    pub fn resolve(&self, id: &str) -> ConfigResult<ResolvedModel> {
        let (canonical, wire_model, endpoint, route, credential_var) = match ModelSpec::parse(id) {
            ModelSpec::Gemini => {
                let native = &self.config.gemini;
                (
                    native.canonical.clone(),
                    native.wire_model.clone(),
                    native.url.clone(),
                    Route::Google,
                    native.credential_var.clone(),
                )
            }
            ModelSpec::Anthropic => {
                let native = &self.config.anthropic;
                (
                    native.canonical.clone(),
                    native.wire_model.clone(),
                    native.url.clone(),
                    Route::Anthropic,
                    native.credential_var.clone(),
                )
            }
            ModelSpec::Qualified(name) => {
                let gateway = &self.config.gateway;
                (
                    name.clone(),
                    name,
                    gateway.url.clone(),
                    Route::Gateway,
                    gateway.credential_var.clone(),
                )
            }
        };

        self.check_supported(&canonical)?;

        let key = (self.lookup)(&credential_var).ok_or_else(|| ConfigError::MissingCredential {
            var: credential_var.clone(),
            model: canonical.clone(),
        })?;

        Ok(ResolvedModel {
            canonical,
            wire_model,
            endpoint,
            route,
            credential_var,
            api_key: ApiKey::new(key),
        })
    }

    fn check_supported(&self, canonical: &str) -> ConfigResult<()> {
        let models = &self.config.models;
        if models.supported.contains(canonical) {
            return Ok(());
        }
        if models.allow_unlisted {
            return if is_qualified(canonical) {
                Ok(())
            } else {
                Err(ConfigError::MalformedModel {
                    model: canonical.to_string(),
                })
            };
        }
        let mut supported: Vec<&str> = vec!["gemini", "anthropic"];
        supported.extend(models.supported.iter().map(String::as_str));
        Err(ConfigError::UnsupportedModel {
            model: canonical.to_string(),
            supported: supported.join(", "),
        })
    }
}

/// `vendor/model` with both halves non-empty and no whitespace.
fn is_qualified(id: &str) -> bool {
    match id.split_once('/') {
        Some((vendor, model)) => {
            !vendor.is_empty()
                && !model.is_empty()
                && !id.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
