// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # llm-clean
//!
//! Ontological analysis of terms with large language models.
//!
//! Two tasks share one linear request pipeline (prompt, request, backoff,
//! parse, store):
//!
//! - **Meta-properties** (`metaprop`): assign the OntoClean meta-properties
//!   of Guarino & Welty (rigidity, identity, own identity, unity,
//!   dependence) to a term, either with one specialised call per property or
//!   with a single combined call.
//! - **Upper-ontology classification** (`classify`): place a term in BFO,
//!   DOLCE, UFO or any other class tree, in one shot or by walking the tree
//!   top-down.
//!
//! ## Modules
//!
//! - `model`: resolves model identifiers to endpoints and credentials
//! - `llm`: chat backend trait, HTTP transport, retrying executor, JSON recovery
//! - `prompt`: pure prompt rendering and background loading
//! - `store`: incremental JSON result store with atomic flushes
//! - `experiment`: resumable batch drivers
//! - `export`: flat TSV export
//! - `evaluate`: meta-property accuracy against a ground-truth table
//!
//! ## Library usage
//!
//! ```no_run
//! use llm_clean::config::CleanConfig;
//! use llm_clean::llm::executor::RequestExecutor;
//! use llm_clean::metaprop::{AnalysisMode, MetaPropertyAnalyzer};
//! use llm_clean::prompt::PromptBuilder;
//! use llm_clean::terms::TermRequest;
//!
//! let config = CleanConfig::default();
//! let executor = RequestExecutor::from_config("gemini", &config).unwrap();
//! let prompts = PromptBuilder::without_backgrounds();
//! let analyzer = MetaPropertyAnalyzer::new(&executor, &prompts, AnalysisMode::Agents);
//! let result = analyzer.analyze(&TermRequest::new("Student")).unwrap();
//! println!("{} => {}", result.properties.vector(), result.classification);
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod experiment;
pub mod export;
pub mod llm;
pub mod metaprop;
pub mod model;
pub mod ontology;
pub mod paths;
pub mod prompt;
pub mod store;
pub mod terms;
