//! Upper-ontology class trees (BFO, DOLCE, UFO, ...).
//!
//! Ontologies are loaded from a JSON object keyed by ontology name:
//!
//! ```json
//! { "BFO": { "root": "Entity",
//!            "classes": { "Entity": ["Continuant", "Occurrent"] },
//!            "descriptions": { "Continuant": "..." },
//!            "examples": { "Continuant": ["car"] } } }
//! ```
//!
//! Loading checks that `classes` forms a tree rooted at `root`, so traversal
//! never needs cycle detection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

/// Errors from loading an ontology definition.
#[derive(Debug, Error, Diagnostic)]
pub enum OntologyError {
    #[error("failed to read ontology file {path}")]
    #[diagnostic(code(clean::ontology::read), help("Check the path passed with --ontologies."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ontology definition {origin}: {message}")]
    #[diagnostic(
        code(clean::ontology::parse),
        help("Each ontology needs a \"root\" and a \"classes\" map of parent -> [children].")
    )]
    Parse { origin: String, message: String },

    #[error("ontology {ontology}: class \"{class}\" has more than one parent ({parents})")]
    #[diagnostic(
        code(clean::ontology::shared_child),
        help("Hierarchical traversal needs a tree. List each class under exactly one parent.")
    )]
    SharedChild {
        ontology: String,
        class: String,
        parents: String,
    },

    #[error("ontology {ontology}: root \"{root}\" is listed as a child")]
    #[diagnostic(
        code(clean::ontology::root_is_child),
        help("The root must not appear in any children list; this would form a cycle.")
    )]
    RootIsChild { ontology: String, root: String },

    #[error("ontology {ontology}: class \"{class}\" is not reachable from root \"{root}\"")]
    #[diagnostic(
        code(clean::ontology::unreachable),
        help("Every parent in \"classes\" must descend from the root. Check for cycles or typos.")
    )]
    Unreachable {
        ontology: String,
        class: String,
        root: String,
    },
}

pub type OntologyResult<T> = std::result::Result<T, OntologyError>;

#[derive(Debug, Deserialize)]
struct OntologyDef {
    root: String,
    #[serde(default)]
    classes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    descriptions: BTreeMap<String, String>,
    #[serde(default)]
    examples: BTreeMap<String, Vec<String>>,
}

/// A validated class tree with definitions and examples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ontology {
    name: String,
    root: String,
    children: BTreeMap<String, Vec<String>>,
    descriptions: BTreeMap<String, String>,
    examples: BTreeMap<String, Vec<String>>,
}

impl Ontology {
    /// Parse and validate a single ontology definition.
    pub fn from_json_str(name: &str, json: &str) -> OntologyResult<Self> {
        let def: OntologyDef = serde_json::from_str(json).map_err(|e| OntologyError::Parse {
            origin: name.to_string(),
            message: e.to_string(),
        })?;
        Self::from_def(name, def)
    }

    fn from_def(name: &str, def: OntologyDef) -> OntologyResult<Self> {
        let ontology = Self {
            name: name.to_string(),
            root: def.root.trim().to_string(),
            children: def.classes,
            descriptions: def.descriptions,
            examples: def.examples,
        };
        ontology.validate()?;
        Ok(ontology)
    }

    fn validate(&self) -> OntologyResult<()> {
        let mut parents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (parent, children) in &self.children {
            for child in children {
                parents.entry(child.as_str()).or_default().push(parent.as_str());
            }
        }

        if parents.contains_key(self.root.as_str()) {
            return Err(OntologyError::RootIsChild {
                ontology: self.name.clone(),
                root: self.root.clone(),
            });
        }
        if let Some((class, ps)) = parents.iter().find(|(_, ps)| ps.len() > 1) {
            return Err(OntologyError::SharedChild {
                ontology: self.name.clone(),
                class: class.to_string(),
                parents: ps.join(", "),
            });
        }

        // With one parent per class and a parentless root, the structure is a
        // tree exactly when every parent is reachable from the root.
        let reachable = self.descendants_of_root();
        if let Some(orphan) = self.children.keys().find(|p| !reachable.contains(p.as_str())) {
            return Err(OntologyError::Unreachable {
                ontology: self.name.clone(),
                class: orphan.clone(),
                root: self.root.clone(),
            });
        }
        Ok(())
    }

    fn descendants_of_root(&self) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![self.root.as_str()];
        while let Some(class) = stack.pop() {
            if seen.insert(class) {
                stack.extend(self.children(class).iter().map(String::as_str));
            }
        }
        seen
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Direct children; empty for leaves and unknown classes.
    pub fn children(&self, class: &str) -> &[String] {
        self.children.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_leaf(&self, class: &str) -> bool {
        self.children(class).is_empty()
    }

    pub fn description(&self, class: &str) -> Option<&str> {
        self.descriptions.get(class).map(String::as_str)
    }

    pub fn examples(&self, class: &str) -> &[String] {
        self.examples.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every class in the tree, sorted.
    pub fn all_classes(&self) -> Vec<&str> {
        self.descendants_of_root().into_iter().collect()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.canonical_class(class).is_some()
    }

    /// The class named by `answer`, ignoring case and surrounding whitespace.
    pub fn canonical_class(&self, answer: &str) -> Option<&str> {
        let answer = answer.trim();
        self.all_classes()
            .into_iter()
            .find(|c| c.eq_ignore_ascii_case(answer))
    }

    /// The child of `current` named by `answer`, ignoring case.
    pub fn find_child(&self, current: &str, answer: &str) -> Option<&str> {
        let answer = answer.trim();
        self.children(current)
            .iter()
            .map(String::as_str)
            .find(|c| c.eq_ignore_ascii_case(answer))
    }

    /// Number of edges on the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        fn walk(ontology: &Ontology, class: &str) -> usize {
            ontology
                .children(class)
                .iter()
                .map(|c| 1 + walk(ontology, c))
                .max()
                .unwrap_or(0)
        }
        walk(self, &self.root)
    }
}

/// Load every ontology from a JSON file, sorted by name.
pub fn load_ontologies(path: &Path) -> OntologyResult<Vec<Ontology>> {
    let content = std::fs::read_to_string(path).map_err(|e| OntologyError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let defs: BTreeMap<String, OntologyDef> =
        serde_json::from_str(&content).map_err(|e| OntologyError::Parse {
            origin: path.display().to_string(),
            message: e.to_string(),
        })?;

    let ontologies = defs
        .into_iter()
        .map(|(name, def)| Ontology::from_def(&name, def))
        .collect::<OntologyResult<Vec<_>>>()?;

    for ontology in &ontologies {
        tracing::info!(
            ontology = ontology.name(),
            classes = ontology.all_classes().len(),
            depth = ontology.depth(),
            "loaded ontology"
        );
    }
    Ok(ontologies)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BFO: &str = r#"{
        "root": "Entity",
        "classes": {
            "Entity": ["Continuant", "Occurrent"],
            "Continuant": ["Independent Continuant", "Role"],
            "Independent Continuant": ["Material Entity"]
        },
        "descriptions": {"Role": "A realizable entity."},
        "examples": {"Role": ["student"]}
    }"#;

    #[test]
    fn loads_tree() {
        let ont = Ontology::from_json_str("BFO", BFO).unwrap();
        assert_eq!(ont.root(), "Entity");
        assert_eq!(ont.depth(), 3);
        assert_eq!(
            ont.all_classes(),
            vec![
                "Continuant",
                "Entity",
                "Independent Continuant",
                "Material Entity",
                "Occurrent",
                "Role"
            ]
        );
        assert!(ont.is_leaf("Role"));
        assert_eq!(ont.examples("Role"), &["student".to_string()]);
        assert_eq!(ont.description("Entity"), None);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let ont = Ontology::from_json_str("BFO", BFO).unwrap();
        assert_eq!(ont.find_child("Entity", " continuant "), Some("Continuant"));
        assert_eq!(ont.find_child("Entity", "Role"), None);
        assert_eq!(ont.canonical_class("material entity"), Some("Material Entity"));
        assert!(!ont.contains("Process"));
    }

    #[test]
    fn shared_child_rejected() {
        let json = r#"{"root": "A", "classes": {"A": ["B", "C"], "B": ["D"], "C": ["D"]}}"#;
        assert!(matches!(
            Ontology::from_json_str("X", json),
            Err(OntologyError::SharedChild { class, .. }) if class == "D"
        ));
    }

    #[test]
    fn cycle_through_root_rejected() {
        let json = r#"{"root": "A", "classes": {"A": ["B"], "B": ["A"]}}"#;
        assert!(matches!(
            Ontology::from_json_str("X", json),
            Err(OntologyError::RootIsChild { .. })
        ));
    }

    #[test]
    fn detached_cycle_rejected() {
        let json = r#"{"root": "A", "classes": {"A": ["B"], "C": ["D"], "D": ["C"]}}"#;
        assert!(matches!(
            Ontology::from_json_str("X", json),
            Err(OntologyError::Unreachable { .. })
        ));
    }

    #[test]
    fn load_file_sorted_by_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ontologies.json");
        std::fs::write(
            &path,
            format!(r#"{{"UFO": {{"root": "Thing"}}, "BFO": {BFO}}}"#),
        )
        .unwrap();
        let onts = load_ontologies(&path).unwrap();
        assert_eq!(onts.len(), 2);
        assert_eq!(onts[0].name(), "BFO");
        assert_eq!(onts[1].name(), "UFO");
        assert_eq!(onts[1].all_classes(), vec!["Thing"]);
        assert_eq!(onts[1].depth(), 0);
    }
}
