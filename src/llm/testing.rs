//! Scripted chat backend for unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::llm::{ChatBackend, LlmResult};
use crate::prompt::Prompt;

/// Answers prompts from a fixed queue and records every prompt it saw.
pub struct ScriptedBackend {
    replies: RefCell<VecDeque<LlmResult<String>>>,
    pub prompts: RefCell<Vec<Prompt>>,
}

impl ScriptedBackend {
    pub fn new(replies: &[&str]) -> Self {
        Self::with_results(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<LlmResult<String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl ChatBackend for ScriptedBackend {
    fn complete(&self, prompt: &Prompt) -> LlmResult<String> {
        self.prompts.borrow_mut().push(prompt.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .expect("script exhausted")
    }

    fn model_id(&self) -> &str {
        "test/scripted"
    }
}
