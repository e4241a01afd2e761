//! Batch drivers.
//!
//! Each driver walks its work items in order, skips keys the store already
//! resolved, and records either the outcome or the failure for every other
//! key. A model failure never aborts the batch; a store failure does.

use crate::classify::Classifier;
use crate::error::StoreResult;
use crate::llm::LlmResult;
use crate::metaprop::MetaPropertyAnalyzer;
use crate::ontology::Ontology;
use crate::store::{ExperimentResult, Outcome, ResultKey, ResultStore, Strategy};
use crate::terms::TermRequest;

/// Tally of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Keys that failed in this run, in processing order.
    pub failed_keys: Vec<ResultKey>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed + self.skipped + self.failed
    }

    /// `(completed, skipped, failed)`.
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.completed, self.skipped, self.failed)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} completed, {} skipped, {} failed",
            self.completed, self.skipped, self.failed
        )
    }
}

/// Run `work` for `key` unless it is already resolved, and store the result.
fn process_key(
    store: &mut ResultStore,
    summary: &mut RunSummary,
    key: ResultKey,
    model: &str,
    work: impl FnOnce() -> LlmResult<Outcome>,
) -> StoreResult<()> {
    if store.is_resolved(&key) {
        tracing::debug!(term = %key.term, ontology = %key.ontology, strategy = %key.strategy, "already resolved, skipping");
        summary.skipped += 1;
        return Ok(());
    }

    let outcome = match work() {
        Ok(outcome) => {
            summary.completed += 1;
            outcome
        }
        Err(e) => {
            tracing::warn!(
                term = %key.term,
                ontology = %key.ontology,
                strategy = %key.strategy,
                kind = %e.kind(),
                error = %e,
                "key failed"
            );
            summary.failed += 1;
            summary.failed_keys.push(key.clone());
            Outcome::failed(&e)
        }
    };

    store.upsert(ExperimentResult::new(key, model, outcome))?;
    Ok(())
}

/// Classify every term against every ontology with each strategy.
pub fn run_classification(
    classifier: &Classifier<'_>,
    terms: &[TermRequest],
    ontologies: &[Ontology],
    strategies: &[Strategy],
    store: &mut ResultStore,
) -> StoreResult<RunSummary> {
    let mut summary = RunSummary::default();
    let model = classifier.model_id().to_string();

    for (n, request) in terms.iter().enumerate() {
        tracing::info!(term = %request.term, progress = n + 1, total = terms.len(), "classifying");
        for ontology in ontologies {
            for &strategy in strategies {
                let key = ResultKey::new(&request.term, ontology.name(), strategy);
                match strategy {
                    Strategy::OneShot => process_key(store, &mut summary, key, &model, || {
                        classifier.one_shot(request, ontology).map(Outcome::OneShot)
                    })?,
                    Strategy::Hierarchical => process_key(store, &mut summary, key, &model, || {
                        classifier.hierarchical(request, ontology).map(Outcome::hierarchical)
                    })?,
                    Strategy::MetaProperties => {
                        tracing::warn!("meta-properties is not a classification strategy, ignoring");
                    }
                }
            }
        }
    }

    tracing::info!(%summary, store = %store.path().display(), "classification run finished");
    Ok(summary)
}

/// Analyse every term's meta-properties.
pub fn run_meta_properties(
    analyzer: &MetaPropertyAnalyzer<'_>,
    terms: &[TermRequest],
    store: &mut ResultStore,
) -> StoreResult<RunSummary> {
    let mut summary = RunSummary::default();
    let model = analyzer.model_id().to_string();

    for (n, request) in terms.iter().enumerate() {
        tracing::info!(term = %request.term, progress = n + 1, total = terms.len(), "analyzing");
        let key = ResultKey::meta_properties(&request.term);
        process_key(store, &mut summary, key, &model, || {
            analyzer.analyze(request).map(Outcome::MetaProperties)
        })?;
    }

    tracing::info!(%summary, store = %store.path().display(), "meta-property run finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::llm::testing::ScriptedBackend;
    use crate::metaprop::AnalysisMode;
    use crate::prompt::PromptBuilder;

    fn ontology() -> Ontology {
        Ontology::from_json_str(
            "DOLCE",
            r#"{"root": "Particular", "classes": {"Particular": ["Endurant", "Perdurant"]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn failure_is_recorded_and_batch_continues() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = ResultStore::open(&dir.path().join("results.json")).unwrap();
        let backend = ScriptedBackend::with_results(vec![
            Err(LlmError::RateLimited {
                endpoint: "gateway".into(),
                attempts: 5,
            }),
            Ok(r#"{"classification": "Perdurant", "confidence": "Medium"}"#.into()),
        ]);
        let prompts = PromptBuilder::default();
        let classifier = Classifier::new(&backend, &prompts);
        let terms = [TermRequest::new("bus"), TermRequest::new("trip")];

        let summary =
            run_classification(&classifier, &terms, &[ontology()], &[Strategy::OneShot], &mut store)
                .unwrap();
        assert_eq!(summary.counts(), (1, 0, 1));
        assert_eq!(
            summary.failed_keys,
            vec![ResultKey::new("bus", "DOLCE", Strategy::OneShot)]
        );
        assert!(!store.is_resolved(&ResultKey::new("bus", "DOLCE", Strategy::OneShot)));
        assert!(store.is_resolved(&ResultKey::new("trip", "DOLCE", Strategy::OneShot)));
    }

    #[test]
    fn rerun_retries_only_failed_keys() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let prompts = PromptBuilder::default();
        let terms = [TermRequest::new("bus"), TermRequest::new("trip")];

        {
            let mut store = ResultStore::open(&path).unwrap();
            let backend = ScriptedBackend::with_results(vec![
                Ok(r#"{"classification": "Endurant"}"#.into()),
                Ok("no json here".into()),
            ]);
            let classifier = Classifier::new(&backend, &prompts);
            run_classification(&classifier, &terms, &[ontology()], &[Strategy::OneShot], &mut store)
                .unwrap();
        }

        let mut store = ResultStore::open(&path).unwrap();
        let backend = ScriptedBackend::new(&[r#"{"classification": "Perdurant"}"#]);
        let classifier = Classifier::new(&backend, &prompts);
        let summary =
            run_classification(&classifier, &terms, &[ontology()], &[Strategy::OneShot], &mut store)
                .unwrap();
        assert_eq!(summary.counts(), (1, 1, 0));
        assert!(summary.failed_keys.is_empty());
        assert_eq!(backend.calls(), 1);
        assert_eq!(store.summary().failed, 0);
    }

    #[test]
    fn meta_property_batch_uses_ontoclean_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = ResultStore::open(&dir.path().join("meta.json")).unwrap();
        let backend = ScriptedBackend::new(&[
            r#"{"properties": {"rigidity": "+R", "identity": "+I", "own_identity": "+O",
                "unity": "+U", "dependence": "-D"}, "classification": "Sortal"}"#,
        ]);
        let prompts = PromptBuilder::default();
        let analyzer = MetaPropertyAnalyzer::new(&backend, &prompts, AnalysisMode::Combined);

        let summary =
            run_meta_properties(&analyzer, &[TermRequest::new("Person")], &mut store).unwrap();
        assert_eq!(summary.completed, 1);
        let stored = store.get(&ResultKey::meta_properties("Person")).unwrap();
        assert_eq!(stored.key.ontology, "OntoClean");
        assert_eq!(stored.model, "test/scripted");
        assert!(matches!(stored.outcome, Outcome::MetaProperties(_)));
    }
}
