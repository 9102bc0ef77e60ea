use reference_types::RefCategory;

use crate::context::ResolutionContext;
use crate::error::IntegrityError;
use crate::patterns::unbracket;

/// Suffix substitutions tried on an unresolved keyword, in order.
/// (suffix, replacement)
pub const INFLECTIONS: &[(&str, &str)] = &[
    ("s", ""),
    ("es", ""),
    ("ies", "y"),
    ("men", "man"),
    ("women", "woman"),
];

/// A candidate spelling that hit an existing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphMatch {
    pub candidate: String,
    pub ref_type_id: i64,
}

/// Candidate spellings for `keyword`, most likely first: the title-cased form,
/// then every inflection rule applied to the original and to the title-cased
/// text. Bracket wrapping is kept; the keyword itself is never a candidate.
pub fn candidates(keyword: &str) -> Vec<String> {
    let wrapped = keyword.starts_with('[') && keyword.ends_with(']') && keyword.len() >= 2;
    let inner = unbracket(keyword);
    let titled = title_case(inner);

    let mut stems = vec![titled.clone()];
    for base in [inner, titled.as_str()] {
        for (suffix, replacement) in INFLECTIONS {
            if let Some(stem) = base.strip_suffix(suffix) {
                if !stem.is_empty() {
                    stems.push(format!("{stem}{replacement}"));
                }
            }
        }
    }

    let mut out: Vec<String> = Vec::new();
    for stem in stems {
        let c = if wrapped { format!("[{stem}]") } else { stem };
        if c != keyword && !out.contains(&c) {
            out.push(c);
        }
    }
    out
}

/// Capitalize the first letter of every space-separated word.
pub fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Try each candidate spelling against known names and aliases.
///
/// `Ok(None)` means nothing matched and the keyword is genuinely new. A
/// candidate naming types in more than one category cannot be settled here.
pub fn resolve(
    ctx: &ResolutionContext,
    keyword: &str,
) -> Result<Option<MorphMatch>, IntegrityError> {
    for candidate in candidates(keyword) {
        let named = ctx.types_named(&candidate);
        let mut categories: Vec<RefCategory> = named.iter().map(|rt| rt.category).collect();
        let aliased = ctx.alias_target(&candidate);
        if let Some(rt) = aliased {
            categories.push(rt.category);
        }
        categories.sort();
        categories.dedup();

        if categories.len() > 1 {
            return Err(IntegrityError::AmbiguousCategory {
                keyword: keyword.to_string(),
                candidate,
                categories,
            });
        }

        let hit = named.first().copied().or(aliased);
        if let Some(rt) = hit {
            return Ok(Some(MorphMatch {
                candidate,
                ref_type_id: rt.id,
            }));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reference_types::{Alias, RefType};

    fn ctx_with(types: &[(i64, &str, RefCategory)]) -> ResolutionContext {
        let mut ctx = ResolutionContext::default();
        for (id, name, category) in types {
            ctx.add_type(RefType {
                id: *id,
                name: name.to_string(),
                category: *category,
            });
        }
        ctx
    }

    #[test]
    fn test_candidates_plural_s() {
        let c = candidates("[Warriors]");
        assert!(c.contains(&"[Warrior]".to_string()));
        assert!(!c.contains(&"[Warriors]".to_string()));
    }

    #[test]
    fn test_candidates_order_title_case_first() {
        let c = candidates("[flame swords]");
        assert_eq!(c[0], "[Flame Swords]");
        assert!(c.contains(&"[flame sword]".to_string()));
        assert!(c.contains(&"[Flame Sword]".to_string()));
    }

    #[test]
    fn test_candidates_ies_and_men() {
        assert!(candidates("[Sorceries]").contains(&"[Sorcery]".to_string()));
        assert!(candidates("[Swordsmen]").contains(&"[Swordsman]".to_string()));
        assert!(candidates("[Washerwomen]").contains(&"[Washerwoman]".to_string()));
        assert!(candidates("[Witches]").contains(&"[Witch]".to_string()));
    }

    #[test]
    fn test_candidates_unwrapped_stay_unwrapped() {
        let c = candidates("Goblins");
        assert!(c.contains(&"Goblin".to_string()));
        assert!(c.iter().all(|s| !s.starts_with('[')));
    }

    #[test]
    fn test_candidates_no_duplicates() {
        let c = candidates("[Warriors]");
        let mut dedup = c.clone();
        dedup.dedup();
        assert_eq!(c.len(), dedup.len());
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("basic cleaning"), "Basic Cleaning");
        assert_eq!(title_case("Already Done"), "Already Done");
    }

    #[test]
    fn test_resolve_plural_to_existing() {
        let ctx = ctx_with(&[(7, "[Warrior]", RefCategory::Class)]);
        let m = resolve(&ctx, "[Warriors]").unwrap().unwrap();
        assert_eq!(m.candidate, "[Warrior]");
        assert_eq!(m.ref_type_id, 7);
    }

    #[test]
    fn test_resolve_through_alias() {
        let mut ctx = ctx_with(&[(3, "[Innkeeper]", RefCategory::Class)]);
        ctx.add_alias(&Alias {
            id: 1,
            name: "[Inn Keeper]".into(),
            ref_type_id: 3,
        });
        let m = resolve(&ctx, "[Inn Keepers]").unwrap().unwrap();
        assert_eq!(m.ref_type_id, 3);
    }

    #[test]
    fn test_resolve_not_found() {
        let ctx = ctx_with(&[(7, "[Warrior]", RefCategory::Class)]);
        assert_eq!(resolve(&ctx, "[Mage]").unwrap(), None);
    }

    #[test]
    fn test_resolve_ambiguous_category_is_integrity_error() {
        let ctx = ctx_with(&[
            (1, "[Fireball]", RefCategory::Spell),
            (2, "[Fireball]", RefCategory::Skill),
        ]);
        match resolve(&ctx, "[Fireballs]") {
            Err(IntegrityError::AmbiguousCategory { categories, .. }) => {
                assert_eq!(categories, vec![RefCategory::Skill, RefCategory::Spell]);
            }
            other => panic!("expected integrity error, got {other:?}"),
        }
    }
}
