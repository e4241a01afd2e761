//! Background material injected into the meta-property agent prompts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::BackgroundConfig;
use crate::metaprop::Property;
use crate::prompt::truncate_chars;

/// Errors from loading background files.
#[derive(Debug, Error, Diagnostic)]
pub enum BackgroundError {
    #[error("failed to read background file {path}")]
    #[diagnostic(
        code(clean::background::read),
        help("Check the path given with --background-* or in the [backgrounds] config section.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract text from PDF {path}: {message}")]
    #[diagnostic(
        code(clean::background::pdf),
        help("The PDF may be scanned or encrypted. Convert it to .txt and pass that instead.")
    )]
    Pdf { path: String, message: String },

    #[error("unsupported background file type \"{extension}\" for {path}")]
    #[diagnostic(
        code(clean::background::unsupported_type),
        help("Supported types are .txt and .pdf.")
    )]
    UnsupportedType { path: String, extension: String },
}

pub type BackgroundResult<T> = std::result::Result<T, BackgroundError>;

const GUARINO_DIR: &str = "resources/converted_text_files/guarino_text_files";

/// File path per meta-property. Own identity shares the identity text by
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rigidity: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_identity: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unity: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependence: Option<PathBuf>,
}

impl Default for BackgroundTable {
    fn default() -> Self {
        let file = |name: &str| Some(Path::new(GUARINO_DIR).join(format!("01-guarino00formal-{name}.txt")));
        Self {
            rigidity: file("rigidity"),
            identity: file("identity"),
            own_identity: file("identity"),
            unity: file("unity"),
            dependence: file("dependence"),
        }
    }
}

impl BackgroundTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self {
            rigidity: None,
            identity: None,
            own_identity: None,
            unity: None,
            dependence: None,
        }
    }

    pub fn get(&self, property: Property) -> Option<&Path> {
        self.slot(property).as_deref()
    }

    pub fn set(&mut self, property: Property, path: impl Into<PathBuf>) {
        *self.slot_mut(property) = Some(path.into());
    }

    pub fn is_empty(&self) -> bool {
        Property::ALL.iter().all(|p| self.get(*p).is_none())
    }

    fn slot(&self, property: Property) -> &Option<PathBuf> {
        match property {
            Property::Rigidity => &self.rigidity,
            Property::Identity => &self.identity,
            Property::OwnIdentity => &self.own_identity,
            Property::Unity => &self.unity,
            Property::Dependence => &self.dependence,
        }
    }

    fn slot_mut(&mut self, property: Property) -> &mut Option<PathBuf> {
        match property {
            Property::Rigidity => &mut self.rigidity,
            Property::Identity => &mut self.identity,
            Property::OwnIdentity => &mut self.own_identity,
            Property::Unity => &mut self.unity,
            Property::Dependence => &mut self.dependence,
        }
    }
}

/// Loaded background texts, already cut to the character budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backgrounds {
    per_property: BTreeMap<Property, String>,
    fallback: Option<String>,
}

impl Backgrounds {
    pub fn none() -> Self {
        Self::default()
    }

    /// Build from in-memory texts.
    pub fn from_texts(
        per_property: impl IntoIterator<Item = (Property, String)>,
        fallback: Option<String>,
    ) -> Self {
        Self {
            per_property: per_property.into_iter().collect(),
            fallback,
        }
    }

    /// Text for a property: its own entry, else the shared fallback.
    pub fn for_property(&self, property: Property) -> Option<&str> {
        self.per_property
            .get(&property)
            .or(self.fallback.as_ref())
            .map(String::as_str)
    }

    /// The text shared by every property, if one was loaded.
    pub fn shared(&self) -> Option<&str> {
        self.fallback.as_deref()
    }

    /// Load backgrounds in precedence order:
    ///
    /// 1. `config.default_file` as the shared fallback, else the default
    ///    table when `config.use_defaults` is set (missing files are skipped)
    /// 2. `overrides`, which must all exist
    pub fn load(config: &BackgroundConfig, overrides: &BackgroundTable) -> BackgroundResult<Self> {
        let max_chars = config.max_chars;
        let mut loaded = Self::default();

        if let Some(path) = &config.default_file {
            loaded.fallback = Some(load_background_file(path, max_chars)?);
            tracing::info!(path = %path.display(), "loaded shared background");
        } else if config.use_defaults {
            for property in Property::ALL {
                let Some(path) = config.table.get(property) else {
                    continue;
                };
                if !path.is_file() {
                    tracing::warn!(
                        property = %property,
                        path = %path.display(),
                        "default background not found, skipping"
                    );
                    continue;
                }
                match load_background_file(path, max_chars) {
                    Ok(text) => {
                        loaded.per_property.insert(property, text);
                    }
                    Err(e) => {
                        tracing::warn!(property = %property, error = %e, "failed to load default background");
                    }
                }
            }
        }

        for property in Property::ALL {
            if let Some(path) = overrides.get(property) {
                let text = load_background_file(path, max_chars)?;
                tracing::info!(property = %property, path = %path.display(), "loaded background override");
                loaded.per_property.insert(property, text);
            }
        }

        Ok(loaded)
    }
}

/// Read a `.txt` or `.pdf` file and cut it to `max_chars` characters.
pub fn load_background_file(path: &Path, max_chars: usize) -> BackgroundResult<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let read_err = |e| BackgroundError::Read {
        path: path.display().to_string(),
        source: e,
    };

    let text = match extension.as_str() {
        "txt" => std::fs::read_to_string(path).map_err(read_err)?,
        "pdf" => {
            let bytes = std::fs::read(path).map_err(read_err)?;
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| BackgroundError::Pdf {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
        }
        _ => {
            return Err(BackgroundError::UnsupportedType {
                path: path.display().to_string(),
                extension,
            });
        }
    };

    let truncated = truncate_chars(&text, max_chars);
    if truncated.len() < text.len() {
        tracing::warn!(
            path = %path.display(),
            chars = text.chars().count(),
            max_chars,
            "background truncated"
        );
    }
    Ok(truncated.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> BackgroundConfig {
        let mut table = BackgroundTable::empty();
        table.set(Property::Rigidity, dir.join("rigidity.txt"));
        table.set(Property::Unity, dir.join("missing.txt"));
        BackgroundConfig {
            max_chars: 10,
            use_defaults: true,
            default_file: None,
            table,
        }
    }

    #[test]
    fn default_table_points_at_guarino_texts() {
        let table = BackgroundTable::default();
        assert_eq!(table.get(Property::OwnIdentity), table.get(Property::Identity));
        assert!(
            table
                .get(Property::Dependence)
                .unwrap()
                .ends_with("01-guarino00formal-dependence.txt")
        );
        assert!(BackgroundTable::empty().is_empty());
    }

    #[test]
    fn missing_default_file_is_skipped() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("rigidity.txt"), "Rigidity is essentiality.").unwrap();

        let loaded = Backgrounds::load(&config(dir.path()), &BackgroundTable::empty()).unwrap();
        assert_eq!(loaded.for_property(Property::Rigidity), Some("Rigidity i"));
        assert_eq!(loaded.for_property(Property::Unity), None);
    }

    #[test]
    fn missing_override_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut overrides = BackgroundTable::empty();
        overrides.set(Property::Identity, dir.path().join("nope.txt"));
        let err = Backgrounds::load(&config(dir.path()), &overrides).unwrap_err();
        assert!(matches!(err, BackgroundError::Read { .. }));
    }

    #[test]
    fn shared_file_replaces_table_but_not_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("rigidity.txt"), "table text").unwrap();
        std::fs::write(dir.path().join("shared.txt"), "shared").unwrap();
        std::fs::write(dir.path().join("unity.txt"), "unity only").unwrap();

        let mut cfg = config(dir.path());
        cfg.default_file = Some(dir.path().join("shared.txt"));
        let mut overrides = BackgroundTable::empty();
        overrides.set(Property::Unity, dir.path().join("unity.txt"));

        let loaded = Backgrounds::load(&cfg, &overrides).unwrap();
        assert_eq!(loaded.for_property(Property::Rigidity), Some("shared"));
        assert_eq!(loaded.for_property(Property::Unity), Some("unity only"));
    }

    #[test]
    fn defaults_disabled_loads_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("rigidity.txt"), "text").unwrap();
        let mut cfg = config(dir.path());
        cfg.use_defaults = false;
        let loaded = Backgrounds::load(&cfg, &BackgroundTable::empty()).unwrap();
        assert_eq!(loaded, Backgrounds::none());
    }

    #[test]
    fn unsupported_extension_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["notes.docx", "notes.md"] {
            let path = dir.path().join(name);
            std::fs::write(&path, "x").unwrap();
            assert!(matches!(
                load_background_file(&path, 100),
                Err(BackgroundError::UnsupportedType { .. })
            ));
        }
    }
}
