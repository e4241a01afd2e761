//! Scoring predicted meta-properties against a ground-truth table.
//!
//! Both sides are keyed by term. Only terms present in both are scored, and
//! predictions carrying an error are skipped. A value is correct when its
//! trimmed text equals the expected one; blank values count as `N/A`.

use std::collections::BTreeMap;
use std::path::Path;

use crate::metaprop::Property;
use crate::store::{Outcome, ResultStore, Strategy};
use crate::terms::{InputError, InputResult};

/// Placeholder for a blank or absent value.
pub const NOT_AVAILABLE: &str = "N/A";

/// Property values for one term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyRecord {
    pub values: BTreeMap<Property, String>,
    /// The prediction failed; the record is not scored.
    pub error: bool,
}

impl PropertyRecord {
    fn value(&self, property: Property) -> &str {
        self.values
            .get(&property)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or(NOT_AVAILABLE)
    }
}

/// Records keyed by term.
pub type PropertyTable = BTreeMap<String, PropertyRecord>;

/// Read a TSV with a `term` header and one column per property. An `error`
/// column, when present and non-blank, marks the row as failed.
pub fn load_property_table(path: &Path) -> InputResult<PropertyTable> {
    let content = std::fs::read_to_string(path).map_err(|e| InputError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let table = parse_property_table(&content).ok_or_else(|| InputError::MissingTermColumn {
        path: path.display().to_string(),
    })?;
    tracing::info!(terms = table.len(), path = %path.display(), "loaded property table");
    Ok(table)
}

/// `None` when the header has no `term` column. Later rows for the same term
/// replace earlier ones.
pub fn parse_property_table(content: &str) -> Option<PropertyTable> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()?
        .split('\t')
        .map(|c| c.trim().to_ascii_lowercase())
        .collect();
    let column = |name: &str| header.iter().position(|h| h == name);

    let term_col = column("term")?;
    let error_col = column("error");
    let property_cols: Vec<(Property, usize)> = Property::ALL
        .iter()
        .filter_map(|&p| column(p.key()).map(|i| (p, i)))
        .collect();

    let mut table = PropertyTable::new();
    for line in lines {
        let cells: Vec<&str> = line.split('\t').collect();
        let Some(term) = cells.get(term_col).map(|t| t.trim()).filter(|t| !t.is_empty()) else {
            continue;
        };
        let record = PropertyRecord {
            values: property_cols
                .iter()
                .filter_map(|&(p, i)| cells.get(i).map(|v| (p, v.to_string())))
                .collect(),
            error: error_col
                .and_then(|i| cells.get(i))
                .is_some_and(|e| !e.trim().is_empty()),
        };
        table.insert(term.to_string(), record);
    }
    Some(table)
}

/// Predictions taken from the meta-property keys of a result store.
pub fn predictions_from_store(store: &ResultStore) -> PropertyTable {
    store
        .iter()
        .filter(|r| r.key.strategy == Strategy::MetaProperties)
        .filter_map(|r| {
            let record = match &r.outcome {
                Outcome::MetaProperties(m) => PropertyRecord {
                    values: Property::ALL
                        .iter()
                        .map(|&p| (p, m.properties.symbol(p).to_string()))
                        .collect(),
                    error: false,
                },
                Outcome::Failed { .. } => PropertyRecord {
                    values: BTreeMap::new(),
                    error: true,
                },
                _ => return None,
            };
            Some((r.key.term.clone(), record))
        })
        .collect()
}

/// One wrong property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub term: String,
    pub property: Property,
    pub predicted: String,
    pub expected: String,
}

/// Accuracy per property and for whole rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Terms scored.
    pub evaluated: usize,
    /// Correct values per property.
    pub correct: BTreeMap<Property, usize>,
    /// Terms with all five properties correct.
    pub exact_matches: usize,
    pub mismatches: Vec<Mismatch>,
}

impl Evaluation {
    /// Fraction of correct values, or `None` when nothing was scored.
    pub fn accuracy(&self, property: Property) -> Option<f64> {
        let correct = self.correct.get(&property).copied().unwrap_or(0);
        ratio(correct, self.evaluated)
    }

    pub fn exact_match_rate(&self) -> Option<f64> {
        ratio(self.exact_matches, self.evaluated)
    }
}

fn ratio(n: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| n as f64 / total as f64)
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for m in &self.mismatches {
            writeln!(
                f,
                "{:<20} {:<15} {:<5} {:<5} FAIL",
                m.term,
                m.property.key(),
                m.predicted,
                m.expected
            )?;
        }
        if self.evaluated == 0 {
            return writeln!(f, "No overlapping terms found.");
        }
        writeln!(f, "Total evaluated: {}", self.evaluated)?;
        for property in Property::ALL {
            let correct = self.correct.get(&property).copied().unwrap_or(0);
            writeln!(
                f,
                "{:<15}: {}/{} ({:.2}%)",
                property.label(),
                correct,
                self.evaluated,
                self.accuracy(property).unwrap_or(0.0) * 100.0
            )?;
        }
        writeln!(
            f,
            "{:<15}: {}/{} ({:.2}%)",
            "Exact match",
            self.exact_matches,
            self.evaluated,
            self.exact_match_rate().unwrap_or(0.0) * 100.0
        )
    }
}

/// Score `predictions` against `truth`.
pub fn evaluate(predictions: &PropertyTable, truth: &PropertyTable) -> Evaluation {
    let mut eval = Evaluation::default();

    for (term, expected) in truth {
        let Some(predicted) = predictions.get(term) else {
            continue;
        };
        if predicted.error {
            tracing::debug!(term = %term, "prediction failed, not scored");
            continue;
        }
        eval.evaluated += 1;

        let mut all_correct = true;
        for property in Property::ALL {
            let (p, e) = (predicted.value(property), expected.value(property));
            if p == e {
                *eval.correct.entry(property).or_default() += 1;
            } else {
                all_correct = false;
                eval.mismatches.push(Mismatch {
                    term: term.clone(),
                    property,
                    predicted: p.to_string(),
                    expected: e.to_string(),
                });
            }
        }
        if all_correct {
            eval.exact_matches += 1;
        }
    }
    eval
}
