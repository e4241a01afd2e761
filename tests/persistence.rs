//! Resume and recovery tests for the result store.
//!
//! These verify that a rerun over a finished store sends no requests, that
//! failed keys are retried, and that results survive a reopen.

use llm_clean::classify::Classifier;
use llm_clean::experiment::{run_classification, run_meta_properties};
use llm_clean::llm::{ChatBackend, LlmError, LlmResult};
use llm_clean::metaprop::{AnalysisMode, MetaPropertyAnalyzer};
use llm_clean::ontology::Ontology;
use llm_clean::prompt::{Prompt, PromptBuilder};
use llm_clean::store::{ResultKey, ResultStore, Strategy};
use llm_clean::terms::TermRequest;

/// Answers every prompt with the reply for its kind and counts calls.
struct FixedModel {
    calls: std::cell::Cell<usize>,
    fail: bool,
}

impl FixedModel {
    fn new() -> Self {
        Self {
            calls: std::cell::Cell::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            calls: std::cell::Cell::new(0),
            fail: true,
        }
    }
}

impl ChatBackend for FixedModel {
    fn complete(&self, prompt: &Prompt) -> LlmResult<String> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(LlmError::Transport {
                endpoint: "http://localhost".into(),
                message: "connection refused".into(),
            });
        }
        let reply = if prompt.system.contains("\"selected_class\"") {
            r#"{"selected_class": "STOP", "reasoning": "generic"}"#
        } else if prompt.system.contains("\"classification\": \"ClassName\"") {
            r#"{"classification": "Endurant", "confidence": "Medium", "reasoning": "persists"}"#
        } else {
            r#"{"properties": {"rigidity": "+R", "identity": "+I", "own_identity": "+O",
                "unity": "+U", "dependence": "-D"}, "classification": "Sortal"}"#
        };
        Ok(reply.to_string())
    }

    fn model_id(&self) -> &str {
        "test/fixed"
    }
}

fn ontologies() -> Vec<Ontology> {
    vec![
        Ontology::from_json_str(
            "DOLCE",
            r#"{"root": "Particular", "classes": {"Particular": ["Endurant", "Perdurant"]}}"#,
        )
        .unwrap(),
    ]
}

fn terms() -> Vec<TermRequest> {
    ["airport", "boarding pass", "layover"]
        .into_iter()
        .map(TermRequest::new)
        .collect()
}

const BOTH: [Strategy; 2] = [Strategy::OneShot, Strategy::Hierarchical];

#[test]
fn completed_run_resumes_with_zero_requests() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("results.json");
    let prompts = PromptBuilder::without_backgrounds();

    // First session: everything succeeds.
    {
        let model = FixedModel::new();
        let classifier = Classifier::new(&model, &prompts);
        let mut store = ResultStore::open(&path).unwrap();
        let summary =
            run_classification(&classifier, &terms(), &ontologies(), &BOTH, &mut store).unwrap();
        assert_eq!(summary.counts(), (6, 0, 0));
        assert_eq!(model.calls.get(), 6);
    }
    let before = std::fs::read_to_string(&path).unwrap();

    // Second session: nothing left to do.
    let model = FixedModel::new();
    let classifier = Classifier::new(&model, &prompts);
    let mut store = ResultStore::open(&path).unwrap();
    let summary =
        run_classification(&classifier, &terms(), &ontologies(), &BOTH, &mut store).unwrap();
    assert_eq!(summary.counts(), (0, 6, 0));
    assert_eq!(model.calls.get(), 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn failed_keys_are_retried_on_next_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("meta_property_results.json");
    let prompts = PromptBuilder::without_backgrounds();

    {
        let model = FixedModel::failing();
        let analyzer = MetaPropertyAnalyzer::new(&model, &prompts, AnalysisMode::Combined);
        let mut store = ResultStore::open(&path).unwrap();
        let summary = run_meta_properties(&analyzer, &terms(), &mut store).unwrap();
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.failed_keys[0], ResultKey::meta_properties("airport"));
        assert_eq!(store.summary().failed, 3);
    }

    let model = FixedModel::new();
    let analyzer = MetaPropertyAnalyzer::new(&model, &prompts, AnalysisMode::Combined);
    let mut store = ResultStore::open(&path).unwrap();
    let summary = run_meta_properties(&analyzer, &terms(), &mut store).unwrap();
    assert_eq!(summary.counts(), (3, 0, 0));
    assert_eq!(store.summary().failed, 0);
    assert!(store.is_resolved(&ResultKey::meta_properties("layover")));
}

#[test]
fn partial_run_picks_up_where_it_stopped() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("results.json");
    let prompts = PromptBuilder::without_backgrounds();

    // Interrupted after the first term.
    {
        let model = FixedModel::new();
        let classifier = Classifier::new(&model, &prompts);
        let mut store = ResultStore::open(&path).unwrap();
        run_classification(&classifier, &terms()[..1], &ontologies(), &BOTH, &mut store).unwrap();
    }
    // A stale temp file from a crash mid-flush must not matter.
    std::fs::write(dir.path().join("results.json.tmp"), "{garbage").unwrap();

    let model = FixedModel::new();
    let classifier = Classifier::new(&model, &prompts);
    let mut store = ResultStore::open(&path).unwrap();
    let summary =
        run_classification(&classifier, &terms(), &ontologies(), &BOTH, &mut store).unwrap();
    assert_eq!(summary.counts(), (4, 2, 0));
    assert_eq!(model.calls.get(), 4);
    assert_eq!(store.len(), 6);

    let reopened = ResultStore::open(&path).unwrap();
    assert_eq!(reopened.len(), 6);
    assert!(reopened.is_resolved(&ResultKey::new("airport", "DOLCE", Strategy::Hierarchical)));
}
