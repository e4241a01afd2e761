//! XDG-compliant path resolution for llm-clean.
//!
//! The config file and the default result stores live under the usual XDG
//! base directories; every path can also be given explicitly on the CLI.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::store::Strategy;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(clean::paths::no_home),
        help("Set the HOME environment variable, or pass --config and --store explicitly.")
    )]
    NoHome,
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global directories for llm-clean.
#[derive(Debug, Clone)]
pub struct CleanPaths {
    /// `$XDG_CONFIG_HOME/llm-clean/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/llm-clean/`
    pub data_dir: PathBuf,
}

impl CleanPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("llm-clean");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("llm-clean");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Path to the global config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default result store for a batch run.
    ///
    /// Classification runs share one store; meta-property runs get their own.
    pub fn default_store(&self, strategy: Strategy) -> PathBuf {
        let name = match strategy {
            Strategy::MetaProperties => "meta_property_results.json",
            Strategy::OneShot | Strategy::Hierarchical => "experiment_results.json",
        };
        self.data_dir.join("results").join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_paths_use_xdg_layout() {
        // Read-only: mutating env vars is unsafe in edition 2024.
        let Ok(paths) = CleanPaths::resolve() else {
            return;
        };
        assert!(
            paths.config_dir.to_string_lossy().contains("llm-clean"),
            "config_dir should contain 'llm-clean': {}",
            paths.config_dir.display()
        );
        assert!(paths.config_file().starts_with(&paths.config_dir));
    }

    #[test]
    fn default_stores_split_by_task() {
        let paths = CleanPaths {
            config_dir: PathBuf::from("/cfg/llm-clean"),
            data_dir: PathBuf::from("/data/llm-clean"),
        };
        assert_eq!(
            paths.default_store(Strategy::OneShot),
            PathBuf::from("/data/llm-clean/results/experiment_results.json")
        );
        assert_eq!(
            paths.default_store(Strategy::Hierarchical),
            paths.default_store(Strategy::OneShot)
        );
        assert_eq!(
            paths.default_store(Strategy::MetaProperties),
            PathBuf::from("/data/llm-clean/results/meta_property_results.json")
        );
    }
}
