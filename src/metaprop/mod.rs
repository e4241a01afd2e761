//! OntoClean meta-properties (Guarino & Welty).
//!
//! Each of the five meta-properties has a small closed set of symbolic values
//! (`+R`, `~U`, ...). Values are parsed leniently from model text but always
//! stored and printed in their canonical two-character form.

pub mod analyzer;

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use analyzer::{AnalysisMode, MetaPropertyAnalyzer};

/// The five meta-properties, in analysis order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Property {
    Rigidity,
    Identity,
    OwnIdentity,
    Unity,
    Dependence,
}

impl Property {
    pub const ALL: [Property; 5] = [
        Self::Rigidity,
        Self::Identity,
        Self::OwnIdentity,
        Self::Unity,
        Self::Dependence,
    ];

    /// JSON / config key.
    pub fn key(self) -> &'static str {
        match self {
            Self::Rigidity => "rigidity",
            Self::Identity => "identity",
            Self::OwnIdentity => "own_identity",
            Self::Unity => "unity",
            Self::Dependence => "dependence",
        }
    }

    /// Human-readable name.
    pub fn label(self) -> &'static str {
        match self {
            Self::Rigidity => "Rigidity",
            Self::Identity => "Identity",
            Self::OwnIdentity => "Own Identity",
            Self::Unity => "Unity",
            Self::Dependence => "Dependence",
        }
    }

    /// Allowed symbols, canonical form.
    pub fn symbols(self) -> &'static [&'static str] {
        match self {
            Self::Rigidity => Rigidity::SYMBOLS,
            Self::Identity => Identity::SYMBOLS,
            Self::OwnIdentity => OwnIdentity::SYMBOLS,
            Self::Unity => Unity::SYMBOLS,
            Self::Dependence => Dependence::SYMBOLS,
        }
    }
}

impl std::fmt::Display for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Property {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|p| p.key() == normalized)
            .ok_or_else(|| format!("unknown meta-property \"{s}\""))
    }
}

/// Map unicode look-alikes models like to emit onto ASCII, then keep the
/// leading sign and letter.
fn normalize_symbol(raw: &str) -> Option<String> {
    let mut chars = raw.trim().chars().map(|c| match c {
        '\u{2212}' | '\u{2013}' | '\u{2010}' => '-',
        '\u{223C}' | '\u{02DC}' => '~',
        other => other.to_ascii_uppercase(),
    });
    let sign = chars.next()?;
    let letter = chars.next()?;
    Some([sign, letter].iter().collect())
}

/// Declares a meta-property value enum with its canonical symbols.
macro_rules! meta_value {
    (
        $(#[$meta:meta])*
        $name:ident { $( $variant:ident => $sym:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( #[serde(rename = $sym)] $variant, )+
        }

        impl $name {
            pub const SYMBOLS: &'static [&'static str] = &[$($sym),+];

            pub fn symbol(self) -> &'static str {
                match self {
                    $( Self::$variant => $sym, )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.symbol())
            }
        }

        impl FromStr for $name {
            type Err = String;

            /// Accepts `+R`, `+r`, `−R`, and decorated forms like `~R (Anti-Rigid)`.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let symbol = normalize_symbol(s)
                    .ok_or_else(|| format!("empty {} value", stringify!($name)))?;
                match symbol.as_str() {
                    $( $sym => Ok(Self::$variant), )+
                    _ => Err(format!(
                        "\"{}\" is not a valid {} value (expected one of {})",
                        s.trim(),
                        stringify!($name),
                        Self::SYMBOLS.join(", ")
                    )),
                }
            }
        }
    };
}

meta_value! {
    /// Whether the property is essential to all its instances.
    Rigidity { Rigid => "+R", NonRigid => "-R", AntiRigid => "~R" }
}

meta_value! {
    /// Whether the property carries an identity condition.
    Identity { Carries => "+I", Lacks => "-I" }
}

meta_value! {
    /// Whether the property supplies its own identity condition.
    OwnIdentity { Supplies => "+O", DoesNotSupply => "-O" }
}

meta_value! {
    /// Whether instances are integrated wholes.
    Unity { Unifying => "+U", NonUnifying => "-U", AntiUnity => "~U" }
}

meta_value! {
    /// Whether instances depend on some other, external entity.
    Dependence { Dependent => "+D", Independent => "-D" }
}

/// One value per meta-property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaProperties {
    pub rigidity: Rigidity,
    pub identity: Identity,
    pub own_identity: OwnIdentity,
    pub unity: Unity,
    pub dependence: Dependence,
}

/// A constraint between meta-property values that the model violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inconsistency {
    /// `+O` without `+I`: a property cannot supply an identity condition it
    /// does not carry.
    OwnIdentityWithoutIdentity,
}

impl std::fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnIdentityWithoutIdentity => {
                f.write_str("own identity +O requires identity +I, but identity is -I")
            }
        }
    }
}

impl MetaProperties {
    pub fn symbol(&self, property: Property) -> &'static str {
        match property {
            Property::Rigidity => self.rigidity.symbol(),
            Property::Identity => self.identity.symbol(),
            Property::OwnIdentity => self.own_identity.symbol(),
            Property::Unity => self.unity.symbol(),
            Property::Dependence => self.dependence.symbol(),
        }
    }

    /// Constraint violations; empty when consistent.
    pub fn validate(&self) -> Vec<Inconsistency> {
        let mut found = Vec::new();
        if self.own_identity == OwnIdentity::Supplies && self.identity == Identity::Lacks {
            found.push(Inconsistency::OwnIdentityWithoutIdentity);
        }
        found
    }

    /// Coarse OntoClean category implied by the values.
    pub fn derived_classification(&self) -> &'static str {
        use Identity::*;
        use Rigidity::*;

        match (self.rigidity, self.identity) {
            (Rigid, Carries) if self.own_identity == OwnIdentity::Supplies => {
                "Sortal (Rigid, supplies identity)"
            }
            (Rigid, Carries) => "Sortal (Rigid, carries identity)",
            (AntiRigid, _) if self.dependence == Dependence::Dependent => {
                "Role (Anti-rigid, dependent)"
            }
            (AntiRigid, _) => "Role or Phase (Anti-rigid)",
            (NonRigid, Lacks) => "Attribution (Non-rigid, no identity)",
            (NonRigid, _) => "Category or Mixin (Non-rigid)",
            (_, Lacks) => "Attribution or Quality",
        }
    }

    /// Compact vector form, e.g. `+R +I +O +U -D`.
    pub fn vector(&self) -> String {
        Property::ALL
            .iter()
            .map(|p| self.symbol(*p))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of analysing one term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaPropertyResult {
    pub properties: MetaProperties,
    pub classification: String,
    /// Reasoning per property, where the model gave one.
    #[serde(default)]
    pub reasoning: BTreeMap<Property, String>,
    /// Reasoning covering the whole analysis (combined mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl MetaPropertyResult {
    pub fn inconsistencies(&self) -> Vec<Inconsistency> {
        self.properties.validate()
    }

    pub fn is_consistent(&self) -> bool {
        self.inconsistencies().is_empty()
    }
}
