use std::sync::LazyLock;

use reference_types::RefCategory;
use regex::Regex;

use crate::context::ResolutionContext;
use crate::patterns::unbracket;

// ── Rule table ─────────────────────────────────────────────────────
//
// Real data examples:
//   [Skill – Basic Cleaning obtained!]
//   [Skill Obtained!]
//   [Skill Change – Power Strike → Greater Power Strike!]
//   [Innkeeper Class Obtained!]
//   [Innkeeper Level 12!]
//   [Class Consolidation: Warrior → Veteran!]
//   [Conditions Met: Innkeeper → Magical Innkeeper Class!]
//   [Spell – Ice Wall obtained!]
//
// Order matters: "[Skill Change ...]" would otherwise read as a class
// upgrade, "[Conditions Met: ... Class!]" as class obtained.

/// Which heuristic fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateRule {
    SkillObtained,
    SkillChange,
    ClassObtained,
    LevelUp,
    ClassConsolidation,
    ConditionalUpgrade,
    SpellObtained,
}

struct Rule {
    rule: UpdateRule,
    category: RefCategory,
    re: Regex,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let table: &[(UpdateRule, RefCategory, &str)] = &[
        (
            UpdateRule::SkillObtained,
            RefCategory::SkillUpdate,
            r"(?i)^\[skills?\b.*\b(?:obtained|learned)[!.]?\]$",
        ),
        (
            UpdateRule::SkillChange,
            RefCategory::SkillUpdate,
            r"(?i)^\[skill (?:change|changed|lost|removed|upgrade|upgraded)\b",
        ),
        (
            UpdateRule::ClassObtained,
            RefCategory::ClassUpdate,
            r"(?i)^\[(?:.+ )?class obtained[!.]?\]$",
        ),
        (
            UpdateRule::LevelUp,
            RefCategory::ClassUpdate,
            r"(?i)^\[(?:.+ )?level \d+[!.]?\]$",
        ),
        (
            UpdateRule::ClassConsolidation,
            RefCategory::ClassUpdate,
            r"(?i)^\[class consolidat(?:ion|ed)\b",
        ),
        (
            UpdateRule::ConditionalUpgrade,
            RefCategory::ClassUpdate,
            r"(?i)^\[conditions met\b.*\bclass[!.]?\]$",
        ),
        (
            UpdateRule::SpellObtained,
            RefCategory::SpellUpdate,
            r"(?i)^\[spells?\b.*\b(?:obtained|learned)[!.]?\]$",
        ),
    ];
    table
        .iter()
        .map(|(rule, category, pattern)| Rule {
            rule: *rule,
            category: *category,
            re: Regex::new(pattern).unwrap(),
        })
        .collect()
});

/// Outcome of classifying a bracket-keyword believed to be transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Update { rule: UpdateRule, category: RefCategory },
    /// A character's name in brackets: a message or mention, not a keyword.
    Mention,
    Unclassified,
}

/// First matching rule, if any.
pub fn match_rule(keyword: &str) -> Option<(UpdateRule, RefCategory)> {
    RULES
        .iter()
        .find(|r| r.re.is_match(keyword))
        .map(|r| (r.rule, r.category))
}

pub fn classify(ctx: &ResolutionContext, keyword: &str) -> Classification {
    if ctx.is_character_name(unbracket(keyword).trim()) {
        return Classification::Mention;
    }
    match match_rule(keyword) {
        Some((rule, category)) => Classification::Update { rule, category },
        None => Classification::Unclassified,
    }
}
