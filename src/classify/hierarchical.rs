//! Top-down classification: starting at the root, the model picks one child
//! per level until it stops or reaches a leaf.
//!
//! A step stops at the current class when the model answers the stop token,
//! repeats the current class, or names something that is not a child. Since
//! ontologies are validated as trees at load time, the walk takes at most
//! [`Ontology::depth`] steps.

use serde::{Deserialize, Serialize};

use crate::llm::{ChatBackend, LlmResult, decode_json};
use crate::ontology::Ontology;
use crate::prompt::{PromptBuilder, STOP_TOKEN};
use crate::terms::TermRequest;

/// One node on the path, with the reasoning that led to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub class: String,
    /// `None` for the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// One model decision, including the one that stopped the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub from: String,
    pub selected: String,
    #[serde(default)]
    pub reasoning: String,
}

/// Root-to-terminal path through the ontology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationPath {
    pub steps: Vec<PathStep>,
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
}

impl ClassificationPath {
    fn start(root: &str) -> Self {
        Self {
            steps: vec![PathStep {
                class: root.to_string(),
                justification: None,
            }],
            trace: Vec::new(),
        }
    }

    /// The class the walk ended at.
    pub fn final_class(&self) -> &str {
        self.steps.last().map(|s| s.class.as_str()).unwrap_or("")
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.class.as_str())
    }

    /// `Root -> Child -> Grandchild`.
    pub fn render(&self) -> String {
        self.classes().collect::<Vec<_>>().join(" -> ")
    }
}

#[derive(Debug, Deserialize)]
struct StepReply {
    #[serde(default)]
    selected_class: Option<String>,
    #[serde(default)]
    reasoning: String,
}

/// What a single step decided.
#[derive(Debug, PartialEq, Eq)]
enum Decision<'o> {
    Descend(&'o str),
    Stop,
}

fn decide<'o>(ontology: &'o Ontology, current: &str, selected: &str) -> Decision<'o> {
    let selected = selected.trim();
    if selected.eq_ignore_ascii_case(STOP_TOKEN) || selected.eq_ignore_ascii_case(current) {
        return Decision::Stop;
    }
    match ontology.find_child(current, selected) {
        Some(child) => Decision::Descend(child),
        None => Decision::Stop,
    }
}

pub(crate) fn classify(
    backend: &dyn ChatBackend,
    prompts: &PromptBuilder,
    request: &TermRequest,
    ontology: &Ontology,
) -> LlmResult<ClassificationPath> {
    let mut path = ClassificationPath::start(ontology.root());
    let mut current = ontology.root();

    while !ontology.is_leaf(current) {
        let prompt = prompts.hierarchical_step(request, ontology, current);
        let raw = backend.complete(&prompt)?;
        let reply: StepReply = decode_json(&raw)?;
        let selected = reply.selected_class.unwrap_or_default();

        path.trace.push(TraceEntry {
            from: current.to_string(),
            selected: selected.clone(),
            reasoning: reply.reasoning.clone(),
        });

        match decide(ontology, current, &selected) {
            Decision::Descend(child) => {
                tracing::debug!(term = %request.term, from = current, to = child, "descending");
                path.steps.push(PathStep {
                    class: child.to_string(),
                    justification: Some(reply.reasoning),
                });
                current = child;
            }
            Decision::Stop => {
                let recognised = selected.trim().eq_ignore_ascii_case(STOP_TOKEN)
                    || selected.trim().eq_ignore_ascii_case(current);
                if !recognised {
                    tracing::warn!(
                        term = %request.term,
                        ontology = ontology.name(),
                        at = current,
                        answer = %selected,
                        "unrecognised selection, stopping"
                    );
                }
                break;
            }
        }
    }

    tracing::debug!(term = %request.term, path = %path.render(), "hierarchical path");
    Ok(path)
}
