//! Upper-ontology classification strategies.
//!
//! - [`one_shot`]: one prompt listing every class in the ontology
//! - [`hierarchical`]: top-down traversal, one prompt per level

pub mod hierarchical;
pub mod one_shot;

use crate::llm::{ChatBackend, LlmResult};
use crate::ontology::Ontology;
use crate::prompt::PromptBuilder;
use crate::terms::TermRequest;

pub use hierarchical::{ClassificationPath, PathStep, TraceEntry};
pub use one_shot::OneShotClassification;

/// Classifies terms into ontology classes with one model.
pub struct Classifier<'a> {
    backend: &'a dyn ChatBackend,
    prompts: &'a PromptBuilder,
}

impl<'a> Classifier<'a> {
    pub fn new(backend: &'a dyn ChatBackend, prompts: &'a PromptBuilder) -> Self {
        Self { backend, prompts }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub fn one_shot(
        &self,
        request: &TermRequest,
        ontology: &Ontology,
    ) -> LlmResult<OneShotClassification> {
        one_shot::classify(self.backend, self.prompts, request, ontology)
    }

    pub fn hierarchical(
        &self,
        request: &TermRequest,
        ontology: &Ontology,
    ) -> LlmResult<ClassificationPath> {
        hierarchical::classify(self.backend, self.prompts, request, ontology)
    }
}
