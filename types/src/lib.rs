use serde::{Deserialize, Serialize};
use std::fmt;

// ── Reference categories ─────────────────────────────────────────────────

/// Version of the category ↔ code mapping below. Bump when a code changes
/// meaning; stored rows carry codes, not Rust discriminants.
pub const CATEGORY_CODES_VERSION: u32 = 1;

/// What kind of thing a reference type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefCategory {
    #[serde(rename = "CH")]
    Character,
    #[serde(rename = "CL")]
    Class,
    #[serde(rename = "SK")]
    Skill,
    #[serde(rename = "SP")]
    Spell,
    #[serde(rename = "LO")]
    Location,
    #[serde(rename = "IT")]
    Item,
    #[serde(rename = "MI")]
    Miracle,
    /// [Skill Obtained!], [Skill Change – ...]
    #[serde(rename = "SU")]
    SkillUpdate,
    /// [Level 12!], [Class Obtained!], [Conditions Met: ...]
    #[serde(rename = "CU")]
    ClassUpdate,
    /// [Spell Obtained!]
    #[serde(rename = "PU")]
    SpellUpdate,
    #[serde(rename = "UN")]
    Undecided,
}

impl RefCategory {
    /// Menu order shown to an operator.
    pub const ALL: [RefCategory; 11] = [
        Self::Character,
        Self::Class,
        Self::Skill,
        Self::Spell,
        Self::Location,
        Self::Item,
        Self::Miracle,
        Self::SkillUpdate,
        Self::ClassUpdate,
        Self::SpellUpdate,
        Self::Undecided,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::Character => "CH",
            Self::Class => "CL",
            Self::Skill => "SK",
            Self::Spell => "SP",
            Self::Location => "LO",
            Self::Item => "IT",
            Self::Miracle => "MI",
            Self::SkillUpdate => "SU",
            Self::ClassUpdate => "CU",
            Self::SpellUpdate => "PU",
            Self::Undecided => "UN",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Character => "Character",
            Self::Class => "Class",
            Self::Skill => "Skill",
            Self::Spell => "Spell",
            Self::Location => "Location",
            Self::Item => "Item",
            Self::Miracle => "Miracle",
            Self::SkillUpdate => "Skill update",
            Self::ClassUpdate => "Class update",
            Self::SpellUpdate => "Spell update",
            Self::Undecided => "Undecided",
        }
    }

    /// Transient system notifications rather than stable identities.
    pub fn is_update(&self) -> bool {
        matches!(
            self,
            Self::SkillUpdate | Self::ClassUpdate | Self::SpellUpdate
        )
    }
}

impl fmt::Display for RefCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Stored records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub number: u32,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// SHA-256 of the raw chapter text, hex encoded
    pub digest: String,
    pub word_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub id: i64,
    pub chapter_id: i64,
    pub line_number: usize,
    pub text: String,
}

/// Canonical identity for a keyword or named entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefType {
    pub id: i64,
    pub name: String,
    pub category: RefCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    pub id: i64,
    pub name: String,
    pub ref_type_id: i64,
}

/// A located mention of a reference type. `start`/`end` are byte offsets
/// into the line text, half-open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: i64,
    pub line_id: i64,
    pub ref_type_id: i64,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorCategory {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub id: i64,
    pub name: String,
    /// Six uppercase hex digits, no leading '#'
    pub hex: String,
    pub category_id: i64,
}
