use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

// ── Bracket-keyword grammar ────────────────────────────────────────
//
// Real data examples:
//   [Innkeeper Level 12!]
//   [Skill – Basic Cleaning obtained!]
//   [Warrior]
//   [Conditions Met: Warrior → Veteran Class!]
//
// Keywords start with a capital or a digit; nested brackets and line
// breaks end the match so "[a] [b]" never fuses into one span.
pub static RE_BRACKET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[\p{Lu}0-9][^\[\]\r\n]{0,150}\]").unwrap()
});

/// Every bracket-keyword span in `text`, as (start, end, matched text).
pub fn bracket_keywords(text: &str) -> Vec<(usize, usize, &str)> {
    RE_BRACKET
        .find_iter(text)
        .map(|m| (m.start(), m.end(), m.as_str()))
        .collect()
}

/// Strip the outer `[` `]` if present.
pub fn unbracket(keyword: &str) -> &str {
    keyword
        .strip_prefix('[')
        .and_then(|k| k.strip_suffix(']'))
        .unwrap_or(keyword)
}

// ── Known-name matchers ──────────────────────────────────────────────

/// One compiled alternation over every name of an entity domain.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    re: Option<Regex>,
    names: usize,
}

impl NameMatcher {
    /// Build a whole-word matcher over canonical names and aliases.
    ///
    /// Names carrying a parenthesis are category annotations from the wiki
    /// ("Ryoka Griffin (Character)") and are left out. Longer names come
    /// first in the alternation so "Erin Solstice" beats "Erin".
    pub fn compile<'a, I>(names: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::build(names, true)
    }

    /// Like `compile`, but bracketed keywords are matched verbatim.
    pub fn for_keywords<'a, I>(keywords: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::build(keywords, false)
    }

    fn build<'a, I>(names: I, skip_annotated: bool) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut all: Vec<&str> = names
            .into_iter()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .filter(|n| !(skip_annotated && (n.contains('(') || n.contains(')'))))
            .filter(|n| seen.insert(*n))
            .collect();

        if all.is_empty() {
            return Ok(NameMatcher { re: None, names: 0 });
        }

        // Sort by char-length descending for correct longest-match behavior
        all.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));

        let alts: Vec<String> = all.iter().map(|n| word_bounded(n)).collect();
        let re = Regex::new(&format!("(?:{})", alts.join("|")))?;
        Ok(NameMatcher {
            re: Some(re),
            names: all.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names == 0
    }

    /// Every non-overlapping match in `text`, leftmost first.
    pub fn find_all<'t>(&self, text: &'t str) -> Vec<(usize, usize, &'t str)> {
        match &self.re {
            Some(re) => re
                .find_iter(text)
                .map(|m| (m.start(), m.end(), m.as_str()))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Escape a name and anchor it on word boundaries, but only on sides where
/// the name itself starts/ends with a word character (`\b` next to "[" would
/// demand a word character outside the bracket).
fn word_bounded(name: &str) -> String {
    let escaped = regex::escape(name);
    let starts_word = name.chars().next().is_some_and(is_word_char);
    let ends_word = name.chars().last().is_some_and(is_word_char);
    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_keywords_found_in_order() {
        let text = "She gained [Skill Obtained!] and then [Level 12!].";
        let found: Vec<&str> = bracket_keywords(text).into_iter().map(|(_, _, s)| s).collect();
        assert_eq!(found, vec!["[Skill Obtained!]", "[Level 12!]"]);
    }

    #[test]
    fn test_bracket_requires_capital_or_digit() {
        assert!(bracket_keywords("a [note] here").is_empty());
        assert_eq!(bracket_keywords("[4th Wall]").len(), 1);
    }

    #[test]
    fn test_plain_text_produces_nothing() {
        assert!(bracket_keywords("Skill Obtained! Level 12!").is_empty());
    }

    #[test]
    fn test_bracket_spans_do_not_nest() {
        let text = "[Outer [Inner] tail]";
        let found = bracket_keywords(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].2, "[Inner]");
    }

    #[test]
    fn test_unbracket() {
        assert_eq!(unbracket("[Warrior]"), "Warrior");
        assert_eq!(unbracket("Warrior"), "Warrior");
        assert_eq!(unbracket("[Warrior"), "[Warrior");
    }

    #[test]
    fn test_empty_matcher_matches_nothing() {
        let m = NameMatcher::compile(std::iter::empty()).unwrap();
        assert!(m.is_empty());
        assert!(m.find_all("Erin walked into the inn.").is_empty());
    }

    #[test]
    fn test_whole_word_only() {
        let m = NameMatcher::compile(["Erin"]).unwrap();
        assert_eq!(m.find_all("Erin met Erina.").len(), 1);
        assert!(m.find_all("Berinda").is_empty());
    }

    #[test]
    fn test_longest_name_wins() {
        let m = NameMatcher::compile(["Erin", "Erin Solstice"]).unwrap();
        let found = m.find_all("Erin Solstice smiled.");
        assert_eq!(found, vec![(0, 13, "Erin Solstice")]);
    }

    #[test]
    fn test_parenthesized_names_excluded() {
        let m = NameMatcher::compile(["Liscor (City)", "Liscor"]).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.find_all("Liscor (City)").len(), 1);
    }

    #[test]
    fn test_names_are_escaped() {
        let m = NameMatcher::compile(["Mrsha.", "Lyonette du Marquin"]).unwrap();
        assert_eq!(m.find_all("Mrsha. waved").len(), 1);
        assert!(m.find_all("Mrshax waved").is_empty());
    }

    #[test]
    fn test_keyword_matcher_matches_brackets_verbatim() {
        let m = NameMatcher::for_keywords(["[Warrior]", "[Go]"]).unwrap();
        let found = m.find_all("A [Warrior] said [Go]!");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].2, "[Warrior]");
    }
}
