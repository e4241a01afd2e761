//! Incremental result store backed by a single JSON file.
//!
//! Every [`ResultStore::upsert`] is followed by an atomic flush (write a
//! sibling temp file, then rename), so an interrupted run loses at most the
//! key in flight. Keys holding a successful outcome are skipped by later runs;
//! failed keys are retried.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::classify::{ClassificationPath, OneShotClassification};
use crate::error::{StoreError, StoreResult};
use crate::llm::{FailureKind, LlmError};
use crate::metaprop::MetaPropertyResult;

/// Pseudo-ontology name meta-property results are stored under.
pub const ONTOCLEAN: &str = "OntoClean";

/// How a result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    OneShot,
    Hierarchical,
    MetaProperties,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneShot => "one-shot",
            Self::Hierarchical => "hierarchical",
            Self::MetaProperties => "meta-properties",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "one-shot" | "oneshot" => Ok(Self::OneShot),
            "hierarchical" => Ok(Self::Hierarchical),
            "meta-properties" => Ok(Self::MetaProperties),
            other => Err(format!(
                "unknown strategy \"{other}\" (expected one-shot, hierarchical or meta-properties)"
            )),
        }
    }
}

/// Identity of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub term: String,
    pub ontology: String,
    pub strategy: Strategy,
}

impl ResultKey {
    pub fn new(term: impl Into<String>, ontology: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            term: term.into(),
            ontology: ontology.into(),
            strategy,
        }
    }

    /// Key for a meta-property analysis of `term`.
    pub fn meta_properties(term: impl Into<String>) -> Self {
        Self::new(term, ONTOCLEAN, Strategy::MetaProperties)
    }
}

impl std::fmt::Display for ResultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {} / {}", self.term, self.ontology, self.strategy)
    }
}

/// What happened for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    OneShot(OneShotClassification),
    Hierarchical {
        final_class: String,
        path: ClassificationPath,
    },
    MetaProperties(MetaPropertyResult),
    Failed {
        error: FailureKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_output: Option<String>,
    },
}

impl Outcome {
    pub fn hierarchical(path: ClassificationPath) -> Self {
        Self::Hierarchical {
            final_class: path.final_class().to_string(),
            path,
        }
    }

    pub fn failed(error: &LlmError) -> Self {
        Self::Failed {
            error: error.kind(),
            message: error.to_string(),
            raw_output: error.raw_output().map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// One stored result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    #[serde(flatten)]
    pub key: ResultKey,
    pub model: String,
    pub outcome: Outcome,
    /// Seconds since the UNIX epoch.
    pub recorded_at: u64,
}

impl ExperimentResult {
    pub fn new(key: ResultKey, model: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            key,
            model: model.into(),
            outcome,
            recorded_at: now_secs(),
        }
    }

    /// Same model and outcome, regardless of when it was recorded.
    fn same_content(&self, other: &Self) -> bool {
        self.model == other.model && self.outcome == other.outcome
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.display().to_string();
    move |source| StoreError::Io { path, source }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// What [`ResultStore::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
    /// An identical result was already stored; nothing was written.
    Unchanged,
}

/// Counts over a store's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Results keyed by `(term, ontology, strategy)`, persisted on every change.
pub struct ResultStore {
    path: PathBuf,
    results: BTreeMap<ResultKey, ExperimentResult>,
}

impl ResultStore {
    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let results = if path.exists() {
            let data = std::fs::read_to_string(path).map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let list: Vec<ExperimentResult> = if data.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
            };
            list.into_iter().map(|r| (r.key.clone(), r)).collect()
        } else {
            BTreeMap::new()
        };

        let store = Self {
            path: path.to_path_buf(),
            results,
        };
        tracing::info!(path = %path.display(), results = store.len(), "opened result store");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `key` already holds a successful result.
    pub fn is_resolved(&self, key: &ResultKey) -> bool {
        self.results
            .get(key)
            .is_some_and(|r| r.outcome.is_success())
    }

    pub fn get(&self, key: &ResultKey) -> Option<&ExperimentResult> {
        self.results.get(key)
    }

    /// Insert or replace the result for its key and flush immediately.
    pub fn upsert(&mut self, result: ExperimentResult) -> StoreResult<UpsertOutcome> {
        let outcome = match self.results.get(&result.key) {
            Some(existing) if existing.same_content(&result) => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Inserted,
        };
        self.results.insert(result.key.clone(), result);
        self.flush()?;
        Ok(outcome)
    }

    /// Write all results to a temp file next to the store, then rename it
    /// over the store.
    fn flush(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let list: Vec<&ExperimentResult> = self.results.values().collect();
        let json = serde_json::to_string_pretty(&list).map_err(|e| StoreError::Serialize {
            message: e.to_string(),
        })?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        std::fs::write(&tmp, json).map_err(io_error(&tmp))?;
        std::fs::rename(&tmp, &self.path).map_err(io_error(&self.path))?;
        Ok(())
    }

    /// Results in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ExperimentResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn summary(&self) -> StoreSummary {
        self.iter().fold(StoreSummary::default(), |mut acc, r| {
            if r.outcome.is_success() {
                acc.succeeded += 1;
            } else {
                acc.failed += 1;
            }
            acc
        })
    }
}
