//! Meta-property analysis of a single term.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::llm::{ChatBackend, LlmError, LlmResult, decode_json};
use crate::metaprop::{
    Dependence, Identity, MetaProperties, MetaPropertyResult, OwnIdentity, Property, Rigidity,
    Unity,
};
use crate::prompt::PromptBuilder;
use crate::terms::TermRequest;

/// How many model calls an analysis uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AnalysisMode {
    /// One specialised call per meta-property.
    #[default]
    Agents,
    /// A single call asking for all five values.
    Combined,
}

#[derive(Debug, Deserialize)]
struct AgentVerdict {
    value: String,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct CombinedReply {
    properties: BTreeMap<String, String>,
    #[serde(default)]
    classification: Option<String>,
    /// Either one string or an object keyed by property.
    #[serde(default)]
    reasoning: Option<serde_json::Value>,
}

/// Assigns the five meta-properties to a term.
pub struct MetaPropertyAnalyzer<'a> {
    backend: &'a dyn ChatBackend,
    prompts: &'a PromptBuilder,
    mode: AnalysisMode,
}

impl<'a> MetaPropertyAnalyzer<'a> {
    pub fn new(backend: &'a dyn ChatBackend, prompts: &'a PromptBuilder, mode: AnalysisMode) -> Self {
        Self {
            backend,
            prompts,
            mode,
        }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Analyse one term. An inconsistent result (`+O` with `-I`) is returned
    /// as-is and logged; use [`MetaPropertyResult::inconsistencies`] to act
    /// on it.
    pub fn analyze(&self, request: &TermRequest) -> LlmResult<MetaPropertyResult> {
        tracing::info!(term = %request.term, mode = ?self.mode, "analyzing meta-properties");
        let result = match self.mode {
            AnalysisMode::Agents => self.analyze_with_agents(request)?,
            AnalysisMode::Combined => self.analyze_combined(request)?,
        };

        for issue in result.inconsistencies() {
            tracing::warn!(term = %request.term, issue = %issue, "inconsistent meta-properties");
        }
        Ok(result)
    }

    fn analyze_with_agents(&self, request: &TermRequest) -> LlmResult<MetaPropertyResult> {
        let mut reasoning = BTreeMap::new();

        let (rigidity, why) = self.agent_verdict::<Rigidity>(Property::Rigidity, request, None)?;
        reasoning.insert(Property::Rigidity, why);
        let (identity, why) = self.agent_verdict::<Identity>(Property::Identity, request, None)?;
        reasoning.insert(Property::Identity, why);
        let (own_identity, why) =
            self.agent_verdict::<OwnIdentity>(Property::OwnIdentity, request, Some(identity))?;
        reasoning.insert(Property::OwnIdentity, why);
        let (unity, why) = self.agent_verdict::<Unity>(Property::Unity, request, None)?;
        reasoning.insert(Property::Unity, why);
        let (dependence, why) = self.agent_verdict::<Dependence>(Property::Dependence, request, None)?;
        reasoning.insert(Property::Dependence, why);

        let properties = MetaProperties {
            rigidity,
            identity,
            own_identity,
            unity,
            dependence,
        };
        Ok(MetaPropertyResult {
            classification: properties.derived_classification().to_string(),
            properties,
            reasoning,
            summary: None,
        })
    }

    fn agent_verdict<V: FromStr<Err = String>>(
        &self,
        property: Property,
        request: &TermRequest,
        identity: Option<Identity>,
    ) -> LlmResult<(V, String)> {
        tracing::debug!(term = %request.term, property = %property, "property agent");
        let prompt = self.prompts.property_agent(property, request, identity);
        let raw = self.backend.complete(&prompt)?;
        let verdict: AgentVerdict = decode_json(&raw)?;
        let value = verdict
            .value
            .parse::<V>()
            .map_err(|e| LlmError::malformed(e, &raw))?;
        Ok((value, verdict.reasoning))
    }

    fn analyze_combined(&self, request: &TermRequest) -> LlmResult<MetaPropertyResult> {
        let prompt = self.prompts.combined_analysis(request);
        let raw = self.backend.complete(&prompt)?;
        let reply: CombinedReply = decode_json(&raw)?;

        let field = |property: Property| {
            reply
                .properties
                .get(property.key())
                .map(String::as_str)
                .ok_or_else(|| LlmError::malformed(format!("missing property \"{property}\""), &raw))
        };

        let rigidity: Rigidity = parse_value(field(Property::Rigidity)?, &raw)?;
        let unity: Unity = parse_value(field(Property::Unity)?, &raw)?;
        let dependence: Dependence = parse_value(field(Property::Dependence)?, &raw)?;

        // Older prompts folded own identity into identity as `+O`.
        let identity_raw = field(Property::Identity)?;
        let legacy_own = identity_raw.trim().to_ascii_uppercase().starts_with("+O");
        let identity = if legacy_own {
            Identity::Carries
        } else {
            parse_value(identity_raw, &raw)?
        };
        let own_identity = match field(Property::OwnIdentity) {
            Ok(value) => parse_value(value, &raw)?,
            Err(_) if legacy_own => OwnIdentity::Supplies,
            Err(e) => return Err(e),
        };

        let properties = MetaProperties {
            rigidity,
            identity,
            own_identity,
            unity,
            dependence,
        };

        let (reasoning, summary) = split_reasoning(reply.reasoning);
        let classification = reply
            .classification
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| properties.derived_classification().to_string());

        Ok(MetaPropertyResult {
            properties,
            classification,
            reasoning,
            summary,
        })
    }
}

fn parse_value<V: FromStr<Err = String>>(value: &str, raw: &str) -> LlmResult<V> {
    value.parse::<V>().map_err(|e| LlmError::malformed(e, raw))
}

/// Per-property reasoning from an object, or a single summary string.
fn split_reasoning(
    value: Option<serde_json::Value>,
) -> (BTreeMap<Property, String>, Option<String>) {
    match value {
        Some(serde_json::Value::String(s)) => (BTreeMap::new(), Some(s)),
        Some(serde_json::Value::Object(map)) => {
            let per_property = map
                .into_iter()
                .filter_map(|(k, v)| {
                    let property = k.parse::<Property>().ok()?;
                    let text = v.as_str()?.to_string();
                    Some((property, text))
                })
                .collect();
            (per_property, None)
        }
        _ => (BTreeMap::new(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FailureKind;
    use crate::llm::testing::ScriptedBackend as Script;

    fn student() -> TermRequest {
        TermRequest::new("Student").with_description("A person enrolled in a school.")
    }

    #[test]
    fn student_with_agents() {
        let backend = Script::new(&[
            r#"{"value": "~R", "reasoning": "one can stop being a student"}"#,
            "```json\n{\"value\": \"+I\", \"reasoning\": \"inherits from Person\",}\n```",
            r#"{"value": "-O", "reasoning": "IC comes from Person"}"#,
            r#"Here you go: {"value": "+U", "reasoning": "a whole person"}"#,
            r#"{"value": "+D", "reasoning": "depends on a school"}"#,
        ]);
        let prompts = PromptBuilder::without_backgrounds();
        let analyzer = MetaPropertyAnalyzer::new(&backend, &prompts, AnalysisMode::Agents);

        let result = analyzer.analyze(&student()).unwrap();
        assert_eq!(result.properties.vector(), "~R +I -O +U +D");
        assert_eq!(result.classification, "Role (Anti-rigid, dependent)");
        assert!(result.classification.starts_with("Role"));
        assert_eq!(result.reasoning.len(), 5);
        assert_eq!(result.reasoning[&Property::Dependence], "depends on a school");
        assert!(result.is_consistent());

        let sent = backend.prompts.borrow();
        assert_eq!(sent.len(), 5);
        assert!(sent[2].system.contains("determined this entity is +I"));
    }

    #[test]
    fn inconsistent_values_are_kept() {
        let backend = Script::new(&[
            r#"{"value": "+R"}"#,
            r#"{"value": "-I"}"#,
            r#"{"value": "+O"}"#,
            r#"{"value": "+U"}"#,
            r#"{"value": "-D"}"#,
        ]);
        let prompts = PromptBuilder::without_backgrounds();
        let analyzer = MetaPropertyAnalyzer::new(&backend, &prompts, AnalysisMode::Agents);
        let result = analyzer.analyze(&TermRequest::new("Red")).unwrap();
        assert!(!result.is_consistent());
        assert_eq!(result.properties.own_identity, OwnIdentity::Supplies);
    }

    #[test]
    fn invalid_symbol_is_malformed_output() {
        let backend = Script::new(&[r#"{"value": "+X", "reasoning": "?"}"#]);
        let prompts = PromptBuilder::without_backgrounds();
        let analyzer = MetaPropertyAnalyzer::new(&backend, &prompts, AnalysisMode::Agents);
        let err = analyzer.analyze(&student()).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedOutput);
        assert_eq!(err.raw_output(), Some(r#"{"value": "+X", "reasoning": "?"}"#));
    }

    #[test]
    fn student_combined() {
        let backend = Script::new(&[
            "```json\n{\"properties\": {\"rigidity\": \"~R\", \"identity\": \"+I\", \
             \"own_identity\": \"-O\", \"unity\": \"+U\", \"dependence\": \"+D\",}, \
             \"classification\": \"Role\", \"reasoning\": \"Students are roles.\"}\n```",
        ]);
        let prompts = PromptBuilder::without_backgrounds();
        let analyzer = MetaPropertyAnalyzer::new(&backend, &prompts, AnalysisMode::Combined);
        let result = analyzer.analyze(&student()).unwrap();
        assert_eq!(result.properties.vector(), "~R +I -O +U +D");
        assert_eq!(result.classification, "Role");
        assert_eq!(result.summary.as_deref(), Some("Students are roles."));
        assert_eq!(backend.prompts.borrow().len(), 1);
    }

    #[test]
    fn combined_legacy_own_identity() {
        let backend = Script::new(&[
            r#"{"properties": {"rigidity": "+R", "identity": "+O", "unity": "+U", "dependence": "-D"},
                "reasoning": {"rigidity": "essential", "unity": "whole"}}"#,
        ]);
        let prompts = PromptBuilder::without_backgrounds();
        let analyzer = MetaPropertyAnalyzer::new(&backend, &prompts, AnalysisMode::Combined);
        let result = analyzer.analyze(&TermRequest::new("Person")).unwrap();
        assert_eq!(result.properties.identity, Identity::Carries);
        assert_eq!(result.properties.own_identity, OwnIdentity::Supplies);
        assert_eq!(result.classification, "Sortal (Rigid, supplies identity)");
        assert_eq!(result.reasoning[&Property::Unity], "whole");
        assert_eq!(result.summary, None);
    }

    #[test]
    fn combined_missing_property_is_malformed() {
        let backend = Script::new(&[r#"{"properties": {"rigidity": "+R"}}"#]);
        let prompts = PromptBuilder::without_backgrounds();
        let analyzer = MetaPropertyAnalyzer::new(&backend, &prompts, AnalysisMode::Combined);
        let err = analyzer.analyze(&TermRequest::new("Person")).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedOutput);
    }

    #[test]
    fn combined_missing_own_identity_is_malformed() {
        let raw = r#"{"properties": {"rigidity": "+R", "identity": "+I", "unity": "+U", "dependence": "-D"}}"#;
        let backend = Script::new(&[raw]);
        let prompts = PromptBuilder::without_backgrounds();
        let analyzer = MetaPropertyAnalyzer::new(&backend, &prompts, AnalysisMode::Combined);
        let err = analyzer.analyze(&TermRequest::new("Person")).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedOutput);
        assert!(err.to_string().contains("own_identity"));
        assert_eq!(err.raw_output(), Some(raw));
    }
}
