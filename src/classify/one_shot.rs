//! Flat classification: the model sees the whole class list at once.

use serde::{Deserialize, Serialize};

use crate::llm::{ChatBackend, LlmError, LlmResult, decode_json};
use crate::ontology::Ontology;
use crate::prompt::PromptBuilder;
use crate::terms::TermRequest;

/// The model's single-shot answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneShotClassification {
    /// Chosen class, normalised to the ontology's spelling when it matches one.
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
struct Reply {
    classification: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
    #[serde(default)]
    reasoning: String,
}

pub(crate) fn classify(
    backend: &dyn ChatBackend,
    prompts: &PromptBuilder,
    request: &TermRequest,
    ontology: &Ontology,
) -> LlmResult<OneShotClassification> {
    let prompt = prompts.one_shot(request, ontology);
    let raw = backend.complete(&prompt)?;
    let reply: Reply = decode_json(&raw)?;

    let answer = reply
        .classification
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| LlmError::malformed("missing \"classification\"", &raw))?;

    let class = match ontology.canonical_class(&answer) {
        Some(known) => known.to_string(),
        None => {
            tracing::warn!(
                term = %request.term,
                ontology = ontology.name(),
                answer = %answer,
                "one-shot answer is not a class of the ontology"
            );
            answer
        }
    };

    Ok(OneShotClassification {
        class,
        confidence: reply.confidence.filter(|c| !c.trim().is_empty()),
        reasoning: reply.reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FailureKind;
    use crate::llm::testing::ScriptedBackend;

    fn ontology() -> Ontology {
        Ontology::from_json_str(
            "DOLCE",
            r#"{"root": "Particular", "classes": {"Particular": ["Endurant", "Perdurant"]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn answer_normalised_to_class_spelling() {
        let backend = ScriptedBackend::new(&[
            r#"{"classification": "endurant", "confidence": "High", "reasoning": "persists"}"#,
        ]);
        let prompts = PromptBuilder::default();
        let result = classify(&backend, &prompts, &TermRequest::new("bus"), &ontology()).unwrap();
        assert_eq!(result.class, "Endurant");
        assert_eq!(result.confidence.as_deref(), Some("High"));
        assert_eq!(result.reasoning, "persists");
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn unknown_class_is_kept() {
        let backend = ScriptedBackend::new(&[r#"{"classification": "Quality"}"#]);
        let prompts = PromptBuilder::default();
        let result = classify(&backend, &prompts, &TermRequest::new("red"), &ontology()).unwrap();
        assert_eq!(result.class, "Quality");
        assert_eq!(result.confidence, None);
    }

    #[test]
    fn missing_classification_is_malformed() {
        let backend = ScriptedBackend::new(&[r#"{"confidence": "Low"}"#]);
        let prompts = PromptBuilder::default();
        let err = classify(&backend, &prompts, &TermRequest::new("red"), &ontology()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedOutput);
    }
}
