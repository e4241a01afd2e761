//! Input terms: what gets analysed or classified.
//!
//! Two file formats are accepted:
//! - JSON: `[{"term": "...", "description": "...", "example": "..."}]`
//! - TSV: a header row containing `term`, optionally `description` and
//!   `example` (or `usage`) columns

use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from reading a terms file.
#[derive(Debug, Error, Diagnostic)]
pub enum InputError {
    #[error("failed to read input file {path}")]
    #[diagnostic(code(clean::input::read), help("Check the path and file permissions."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse terms file {path}: {message}")]
    #[diagnostic(
        code(clean::input::parse),
        help("JSON term files are an array of objects with at least a \"term\" field.")
    )]
    Parse { path: String, message: String },

    #[error("{path} has no \"term\" column")]
    #[diagnostic(
        code(clean::input::missing_column),
        help("The first line of a TSV input file must be a header naming a `term` column.")
    )]
    MissingTermColumn { path: String },

    #[error("unsupported terms file format: \"{extension}\"")]
    #[diagnostic(
        code(clean::input::unsupported_format),
        help("Use a .json or .tsv file.")
    )]
    UnsupportedFormat { extension: String },
}

pub type InputResult<T> = std::result::Result<T, InputError>;

/// A term to analyse, with optional context. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermRequest {
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Example sentence showing the term in use.
    #[serde(default, alias = "example", skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
}

impl TermRequest {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            description: None,
            usage: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Blank optional fields become `None`.
    fn normalized(mut self) -> Self {
        self.term = self.term.trim().to_string();
        self.description = non_blank(self.description);
        self.usage = non_blank(self.usage);
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Description used for TSV rows that carry none.
pub fn default_description(term: &str) -> String {
    format!("{term} in the context of travel and tourism.")
}

/// Load terms from a `.json` or `.tsv` file.
pub fn load_terms(path: &Path) -> InputResult<Vec<TermRequest>> {
    let content = std::fs::read_to_string(path).map_err(|e| InputError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let terms = match extension.as_str() {
        "json" => parse_json_terms(&content, path)?,
        "tsv" | "txt" => parse_tsv_terms(&content, path)?,
        _ => return Err(InputError::UnsupportedFormat { extension }),
    };
    tracing::info!(count = terms.len(), path = %path.display(), "loaded terms");
    Ok(terms)
}

fn parse_json_terms(content: &str, path: &Path) -> InputResult<Vec<TermRequest>> {
    let raw: Vec<TermRequest> = serde_json::from_str(content).map_err(|e| InputError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(raw
        .into_iter()
        .map(TermRequest::normalized)
        .filter(|t| !t.term.is_empty())
        .collect())
}

fn parse_tsv_terms(content: &str, path: &Path) -> InputResult<Vec<TermRequest>> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .map(|h| h.split('\t').map(|c| c.trim().to_ascii_lowercase()).collect())
        .unwrap_or_default();

    let column = |names: &[&str]| header.iter().position(|h| names.contains(&h.as_str()));
    let term_col = column(&["term"]).ok_or_else(|| InputError::MissingTermColumn {
        path: path.display().to_string(),
    })?;
    let desc_col = column(&["description"]);
    let usage_col = column(&["example", "usage"]);

    let mut terms = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split('\t').collect();
        let cell = |idx: Option<usize>| idx.and_then(|i| cells.get(i)).map(|c| c.to_string());

        let Some(term) = cell(Some(term_col)) else {
            continue;
        };
        let mut request = TermRequest {
            term,
            description: cell(desc_col),
            usage: cell(usage_col),
        }
        .normalized();
        if request.term.is_empty() {
            continue;
        }
        if request.description.is_none() {
            request.description = Some(default_description(&request.term));
        }
        terms.push(request);
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn json_terms_with_example_as_usage() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            "input_terms.json",
            r#"[
                {"term": "clubbing", "description": "Going out dancing.", "example": ""},
                {"term": "moment", "description": "A short time.", "example": "The moment I stepped out."},
                {"term": "  "}
            ]"#,
        );
        let terms = load_terms(&path).unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].usage, None);
        assert_eq!(terms[1].usage.as_deref(), Some("The moment I stepped out."));
    }

    #[test]
    fn tsv_terms_default_description() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(
            &dir,
            "entities.tsv",
            "term\tdescription\nbus driver\ta person driving a bus\ntimetable\t\n\n",
        );
        let terms = load_terms(&path).unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[0].description.as_deref(), Some("a person driving a bus"));
        assert_eq!(
            terms[1].description.as_deref(),
            Some("timetable in the context of travel and tourism.")
        );
    }

    #[test]
    fn tsv_single_column() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(&dir, "terms.tsv", "term\nair space\nvacation location\n");
        let terms = load_terms(&path).unwrap();
        assert_eq!(
            terms.iter().map(|t| t.term.as_str()).collect::<Vec<_>>(),
            vec!["air space", "vacation location"]
        );
    }

    #[test]
    fn tsv_without_term_header_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(&dir, "terms.tsv", "name\nStudent\n");
        assert!(matches!(
            load_terms(&path),
            Err(InputError::MissingTermColumn { .. })
        ));
    }

    #[test]
    fn unknown_extension_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write(&dir, "terms.xml", "<terms/>");
        assert!(matches!(
            load_terms(&path),
            Err(InputError::UnsupportedFormat { .. })
        ));
    }
}
