//! Flat TSV export of a result store, one row per key.
//!
//! Classification stores use the seven generic columns. Meta-property stores
//! get one column per property so they can be scored with
//! [`crate::evaluate`].

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::metaprop::Property;
use crate::store::{ExperimentResult, Outcome, ResultStore, Strategy};

/// Column order of the TSV output.
pub const COLUMNS: [&str; 7] = [
    "term",
    "model",
    "ontology",
    "strategy",
    "classification",
    "info",
    "reasoning",
];

/// One exported result with every field flattened to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    pub term: String,
    pub model: String,
    pub ontology: String,
    pub strategy: String,
    /// Chosen class, OntoClean category, or `ERROR`.
    pub classification: String,
    /// Confidence, traversal path, property vector, or error message.
    pub info: String,
    pub reasoning: String,
}

impl ResultRow {
    pub fn from_result(result: &ExperimentResult) -> Self {
        let (classification, info, reasoning) = match &result.outcome {
            Outcome::OneShot(c) => (
                c.class.clone(),
                format!("Conf: {}", c.confidence.as_deref().unwrap_or("N/A")),
                c.reasoning.clone(),
            ),
            Outcome::Hierarchical { final_class, path } => (
                final_class.clone(),
                format!("Path: {}", path.render()),
                path.trace
                    .iter()
                    .map(|t| format!("{} -> {}: {}", t.from, t.selected, t.reasoning))
                    .collect::<Vec<_>>()
                    .join(" | "),
            ),
            Outcome::MetaProperties(m) => {
                let mut reasoning: Vec<String> = m
                    .reasoning
                    .iter()
                    .map(|(p, r)| format!("{}: {r}", p.label()))
                    .collect();
                if let Some(summary) = &m.summary {
                    reasoning.push(summary.clone());
                }
                let mut info = format!("Props: {}", m.properties.vector());
                if !m.is_consistent() {
                    info.push_str(" (inconsistent)");
                }
                (m.classification.clone(), info, reasoning.join(" | "))
            }
            Outcome::Failed { error, message, .. } => {
                ("ERROR".to_string(), format!("{error}: {message}"), String::new())
            }
        };

        Self {
            term: result.key.term.clone(),
            model: result.model.clone(),
            ontology: result.key.ontology.clone(),
            strategy: result.key.strategy.to_string(),
            classification,
            info,
            reasoning,
        }
    }

    fn cells(&self) -> [&str; 7] {
        [
            &self.term,
            &self.model,
            &self.ontology,
            &self.strategy,
            &self.classification,
            &self.info,
            &self.reasoning,
        ]
    }
}

/// Column order of the meta-property TSV output.
pub const META_COLUMNS: [&str; 15] = [
    "term",
    "model",
    "rigidity",
    "identity",
    "own_identity",
    "unity",
    "dependence",
    "classification",
    "rigidity_reasoning",
    "identity_reasoning",
    "own_identity_reasoning",
    "unity_reasoning",
    "dependence_reasoning",
    "reasoning",
    "error",
];

/// One meta-property result with a column per property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaPropertyRow {
    pub term: String,
    pub model: String,
    /// Property symbols; empty for failed keys.
    pub values: BTreeMap<Property, String>,
    pub classification: String,
    pub reasoning: BTreeMap<Property, String>,
    /// Reasoning covering the whole analysis.
    pub summary: String,
    /// `kind: message` for failed keys, empty otherwise.
    pub error: String,
}

impl MetaPropertyRow {
    /// `None` unless `result` is a meta-property key.
    pub fn from_result(result: &ExperimentResult) -> Option<Self> {
        if result.key.strategy != Strategy::MetaProperties {
            return None;
        }
        let mut row = Self {
            term: result.key.term.clone(),
            model: result.model.clone(),
            values: BTreeMap::new(),
            classification: String::new(),
            reasoning: BTreeMap::new(),
            summary: String::new(),
            error: String::new(),
        };
        match &result.outcome {
            Outcome::MetaProperties(m) => {
                row.values = Property::ALL
                    .iter()
                    .map(|&p| (p, m.properties.symbol(p).to_string()))
                    .collect();
                row.classification = m.classification.clone();
                row.reasoning = m.reasoning.clone();
                row.summary = m.summary.clone().unwrap_or_default();
            }
            Outcome::Failed { error, message, .. } => row.error = format!("{error}: {message}"),
            _ => return None,
        }
        Some(row)
    }

    fn cells(&self) -> Vec<&str> {
        let mut cells = vec![self.term.as_str(), self.model.as_str()];
        cells.extend(Property::ALL.iter().map(|&p| per_property(&self.values, p)));
        cells.push(&self.classification);
        cells.extend(Property::ALL.iter().map(|&p| per_property(&self.reasoning, p)));
        cells.push(&self.summary);
        cells.push(&self.error);
        cells
    }
}

fn per_property(map: &BTreeMap<Property, String>, property: Property) -> &str {
    map.get(&property).map(String::as_str).unwrap_or("")
}

/// Replace the TSV delimiters (tab, CR, LF) with spaces.
fn sanitize(field: &str) -> String {
    field.replace(['\t', '\r', '\n'], " ")
}

/// All rows of a store, in key order.
pub fn rows(store: &ResultStore) -> Vec<ResultRow> {
    store.iter().map(ResultRow::from_result).collect()
}

/// Meta-property rows of a store, in key order. Other keys are left out.
pub fn meta_rows(store: &ResultStore) -> Vec<MetaPropertyRow> {
    store.iter().filter_map(MetaPropertyRow::from_result).collect()
}

/// True when the store is non-empty and holds meta-property results only.
pub fn is_meta_store(store: &ResultStore) -> bool {
    !store.is_empty()
        && store
            .iter()
            .all(|r| r.key.strategy == Strategy::MetaProperties)
}

fn write_line<W: Write>(out: &mut W, cells: &[&str]) -> std::io::Result<()> {
    let line = cells
        .iter()
        .map(|c| sanitize(c))
        .collect::<Vec<_>>()
        .join("\t");
    writeln!(out, "{line}")
}

/// Write a header line and one line per row.
pub fn write_tsv<W: Write>(rows: &[ResultRow], mut out: W) -> std::io::Result<()> {
    write_line(&mut out, &COLUMNS)?;
    for row in rows {
        write_line(&mut out, &row.cells())?;
    }
    out.flush()
}

/// Write the meta-property layout: header, then one line per row.
pub fn write_meta_tsv<W: Write>(rows: &[MetaPropertyRow], mut out: W) -> std::io::Result<()> {
    write_line(&mut out, &META_COLUMNS)?;
    for row in rows {
        write_line(&mut out, &row.cells())?;
    }
    out.flush()
}
