//! Prompt construction.
//!
//! Every builder method is a pure function of its inputs: the same request,
//! ontology and background texts always render byte-identical prompts. No
//! file or environment access happens here; backgrounds are loaded up front
//! by [`background::Backgrounds::load`].

pub mod background;

use std::fmt::Write as _;

use crate::metaprop::{Identity, Property};
use crate::ontology::Ontology;
use crate::terms::TermRequest;

use background::Backgrounds;

/// Default character budget for one background text.
pub const DEFAULT_MAX_BACKGROUND_CHARS: usize = 50_000;

/// Answer a hierarchical step gives to stop at the current class.
pub const STOP_TOKEN: &str = "STOP";

/// A rendered `(system, user)` message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Renders every prompt family.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    backgrounds: Backgrounds,
    max_background_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::without_backgrounds()
    }
}

impl PromptBuilder {
    pub fn new(backgrounds: Backgrounds, max_background_chars: usize) -> Self {
        Self {
            backgrounds,
            max_background_chars,
        }
    }

    pub fn without_backgrounds() -> Self {
        Self::new(Backgrounds::none(), DEFAULT_MAX_BACKGROUND_CHARS)
    }

    fn background(&self, property: Property) -> Option<&str> {
        self.backgrounds
            .for_property(property)
            .map(|text| truncate_chars(text, self.max_background_chars))
    }

    /// Prompt for one meta-property agent. `identity` is the value the
    /// identity agent already settled on; only the own-identity agent uses it.
    pub fn property_agent(
        &self,
        property: Property,
        request: &TermRequest,
        identity: Option<Identity>,
    ) -> Prompt {
        let label = property.label();
        let mut system = match self.background(property) {
            Some(background) => format!(
                "You are an expert Ontological Analyst specializing in the {label} meta-property.\n\n\
                 Use the following background information:\n\n{background}\n\n\
                 Your task is to analyze ONLY the {} property of the given entity.",
                focus_name(property)
            ),
            None => format!(
                "You are an expert Ontological Analyst specializing in the {label} meta-property \
                 from Guarino and Welty (2000)."
            ),
        };

        system.push_str("\n\n");
        system.push_str(property_definition(property));

        if property == Property::OwnIdentity {
            system.push_str(
                "\n\n**IMPORTANT CONSTRAINT**: If +O, then +I must be true. \
                 You cannot supply an IC without carrying one.\n",
            );
            if let Some(identity) = identity {
                let _ = writeln!(
                    system,
                    "Note: The Identity analysis determined this entity is {identity}."
                );
            }
        }

        let alternatives = property
            .symbols()
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(" | ");
        let _ = write!(
            system,
            "\n\nReturn your analysis in strict JSON format:\n\
             {{\n  \"value\": {alternatives},\n  \"reasoning\": \"Brief explanation of why this \
             entity has this {} value.\"\n}}\n",
            label.to_ascii_lowercase()
        );

        let user = format!(
            "Analyze the {label} property of:\n\n{}",
            entity_block(request)
        );
        Prompt { system, user }
    }

    /// Single prompt asking for all five meta-properties at once.
    pub fn combined_analysis(&self, request: &TermRequest) -> Prompt {
        let mut system = String::from(
            "You are an expert Ontological Analyst specializing in the \"Formal Ontology of \
             Properties\" methodology by Guarino and Welty (2000).\n\
             Your task is to analyze a given entity (term) and assign its ontological \
             meta-properties based on the paper's framework.\n",
        );
        if let Some(background) = self.backgrounds.shared() {
            let _ = write!(
                system,
                "\nUse the following background information:\n\n{}\n",
                truncate_chars(background, self.max_background_chars)
            );
        }

        system.push_str("\nThe meta-properties are:\n");
        for (n, property) in Property::ALL.iter().enumerate() {
            let _ = write!(system, "\n{}. {}\n", n + 1, property_definition(*property));
        }

        system.push_str(
            "\nA property cannot supply its own identity condition (+O) without carrying one (+I).\n\
             \nReturn your analysis in strict JSON format with the following structure:\n\
             {\n  \"properties\": {\n\
             \x20   \"rigidity\": \"+R\" | \"-R\" | \"~R\",\n\
             \x20   \"identity\": \"+I\" | \"-I\",\n\
             \x20   \"own_identity\": \"+O\" | \"-O\",\n\
             \x20   \"unity\": \"+U\" | \"-U\" | \"~U\",\n\
             \x20   \"dependence\": \"+D\" | \"-D\"\n  },\n\
             \x20 \"classification\": \"Sortal/Role/Mixin/etc\",\n\
             \x20 \"reasoning\": \"Brief explanation of why these values were chosen.\"\n}\n",
        );

        let user = format!("Analyze the following entity:\n\n{}", entity_block(request));
        Prompt { system, user }
    }

    /// Flat classification against every class of the ontology.
    pub fn one_shot(&self, request: &TermRequest, ontology: &Ontology) -> Prompt {
        let name = ontology.name();
        let system = format!(
            "You are an expert Ontologist specializing in the {name} upper ontology.\n\
             Your task is to classify a given domain entity into exactly one of the provided \
             {name} classes.\nChoose the most specific and ontologically correct class.\n\n\
             Available Classes and Definitions:\n{}\n\n\
             Return your answer in JSON format:\n\
             {{\n  \"classification\": \"ClassName\",\n  \"confidence\": \"High/Medium/Low\",\n  \
             \"reasoning\": \"Brief explanation referencing the definition.\"\n}}\n",
            class_info(ontology, &ontology.all_classes())
        );
        let user = format!("Classify the following entity:\n{}", entity_block(request));
        Prompt { system, user }
    }

    /// One step of the top-down traversal: pick a child of `current` or stop.
    pub fn hierarchical_step(
        &self,
        request: &TermRequest,
        ontology: &Ontology,
        current: &str,
    ) -> Prompt {
        let name = ontology.name();
        let term = &request.term;
        let children: Vec<&str> = ontology.children(current).iter().map(String::as_str).collect();
        let system = format!(
            "You are an expert Ontologist specializing in the {name} upper ontology.\n\
             We are traversing the ontology hierarchically. The entity '{term}' has been \
             identified as a type of '{current}'.\n\
             Now, choose the best sub-class for '{term}' from the following candidates.\n\n\
             Candidates:\n{}\n\n\
             If the entity clearly belongs to '{current}' but does not fit well into any of the \
             candidates, answer \"{STOP_TOKEN}\" to stop at '{current}'.\n\n\
             Return your answer in JSON format:\n\
             {{\n  \"selected_class\": \"ClassName\" | \"{STOP_TOKEN}\",\n  \
             \"reasoning\": \"Brief explanation referencing the definition.\"\n}}\n",
            class_info(ontology, &children)
        );
        let user = entity_block(request);
        Prompt { system, user }
    }
}

fn focus_name(property: Property) -> &'static str {
    match property {
        Property::Identity => "Identity (Carries Identity)",
        Property::OwnIdentity => "Own Identity (Supplies Identity)",
        other => other.label(),
    }
}

/// `Term:` / `Description:` / `Usage context:` lines, absent fields omitted.
fn entity_block(request: &TermRequest) -> String {
    let mut block = format!("Term: {}\n", request.term);
    if let Some(description) = &request.description {
        let _ = writeln!(block, "Description: {description}");
    }
    if let Some(usage) = &request.usage {
        let _ = writeln!(block, "Usage context: {usage}");
    }
    block
}

/// `- **Class**: definition (e.g. a, b)` per class, in the given order.
fn class_info(ontology: &Ontology, classes: &[&str]) -> String {
    classes
        .iter()
        .map(|cls| {
            let desc = ontology
                .description(cls)
                .unwrap_or("No definition provided.");
            let examples = ontology.examples(cls);
            if examples.is_empty() {
                format!("- **{cls}**: {desc}")
            } else {
                format!("- **{cls}**: {desc} (e.g. {})", examples.join(", "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn property_definition(property: Property) -> &'static str {
    match property {
        Property::Rigidity => {
            "**Rigidity (R)** - Analyze whether the property is essential to all its instances:\n\
             \x20  - **+R (Rigid)**: Essential to ALL instances in ALL possible worlds.\n\
             \x20    Examples: Person (anything that is a person is necessarily a person), Physical Object\n\
             \x20  - **-R (Non-Rigid)**: Not essential to some instances; instances can gain/lose it.\n\
             \x20    Examples: Student (a person can become/stop being a student), Red Thing\n\
             \x20  - **~R (Anti-Rigid)**: Essential NOT to be essential (contingent by definition).\n\
             \x20    Examples: Role (like Student, Employee), Phase (like Child, Adult)"
        }
        Property::Identity => {
            "**Identity (I) - Carries Identity Condition** - Does this property carry an identity \
             condition for its instances?\n\
             \x20  - **+I**: The property carries an Identity Condition (IC). Instances can be \
             distinguished and re-identified.\n\
             \x20    Examples: Person (has IC like DNA, fingerprints), Physical Object (has \
             spatio-temporal continuity)\n\
             \x20  - **-I**: The property does NOT carry an identity condition. No principled way \
             to distinguish instances.\n\
             \x20    Examples: Red (what makes one instance of red the same over time?), Amount of Matter"
        }
        Property::OwnIdentity => {
            "**Own Identity (O) - Supplies Identity Condition** - Does this property supply its \
             OWN identity condition?\n\
             \x20  - **+O**: Supplies its own global identity condition.\n\
             \x20    Examples: Person (supplies own IC), Physical Object (supplies own IC)\n\
             \x20  - **-O**: Does not supply own IC (inherits it from a more general property, or \
             has none).\n\
             \x20    Examples: Student (inherits IC from Person), Red (has no IC to supply)"
        }
        Property::Unity => {
            "**Unity (U)** - Are instances of this property wholes with integrated parts?\n\
             \x20  - **+U (Unifying)**: Instances are intrinsic wholes with clear mereological structure.\n\
             \x20    Examples: Person (integrated biological system), Car (functional whole)\n\
             \x20  - **-U (Non-Unifying)**: Instances are not necessarily wholes; parts may be arbitrary.\n\
             \x20    Examples: Red Thing (scattered red objects), Amount of Water\n\
             \x20  - **~U (Anti-Unity)**: Instances are strictly aggregates/sums without integration.\n\
             \x20    Examples: Collection, Group, Scattered Object"
        }
        Property::Dependence => {
            "**Dependence (D)** - Do instances intrinsically depend on other entities?\n\
             \x20  - **+D (Dependent)**: Instances necessarily depend on other entities to exist.\n\
             \x20    Examples: Student (depends on School/Educational Institution), Parasite \
             (depends on Host)\n\
             \x20  - **-D (Independent)**: Instances can exist without depending on specific \
             other entities.\n\
             \x20    Examples: Person (independent), Physical Object (independent)"
        }
    }
}
