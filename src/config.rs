use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use reference_types::RefCategory;
use serde::Deserialize;

use crate::error::ConfigError;

// ── Run configuration ────────────────────────────────────────────────

/// Which prompts may reach the operator. A disabled stage behaves as if the
/// operator had skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interactivity {
    pub disambiguation: bool,
    pub color: bool,
    pub type_selection: bool,
}

impl Interactivity {
    pub fn all() -> Self {
        Interactivity {
            disambiguation: true,
            color: true,
            type_selection: true,
        }
    }

    pub fn none() -> Self {
        Interactivity {
            disambiguation: false,
            color: false,
            type_selection: false,
        }
    }
}

/// Re-process only some lines of one chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRange {
    pub chapter: u32,
    pub lines: Range<usize>,
}

impl LineRange {
    pub fn contains(&self, chapter: u32, line: usize) -> bool {
        self.chapter == chapter && self.lines.contains(&line)
    }
}

/// Parse "a..b" (end exclusive) or a single line number.
pub fn parse_line_span(s: &str) -> Result<Range<usize>, ConfigError> {
    let bad = || ConfigError::EmptyLineRange(s.to_string());
    let range = match s.split_once("..") {
        Some((a, b)) => {
            let a = usize::from_str(a.trim()).map_err(|_| bad())?;
            let b = usize::from_str(b.trim()).map_err(|_| bad())?;
            a..b
        }
        None => {
            let n = usize::from_str(s.trim()).map_err(|_| bad())?;
            n..n + 1
        }
    };
    if range.is_empty() {
        return Err(bad());
    }
    Ok(range)
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub interactive: Interactivity,
    /// Scan only for these keywords instead of the bracket grammar and the
    /// character/location matchers.
    pub keywords: Option<Vec<String>>,
    pub line_range: Option<LineRange>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            interactive: Interactivity::none(),
            keywords: None,
            line_range: None,
        }
    }
}

// ── Seed and rule files ──────────────────────────────────────────────

/// Innocuous bracket phrases and their per-phrase exception patterns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisambiguationFile {
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default)]
    pub exceptions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaletteFile {
    pub categories: Vec<PaletteCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaletteCategory {
    pub name: String,
    #[serde(default)]
    pub colors: Vec<PaletteColor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaletteColor {
    pub name: String,
    pub hex: String,
}

/// One canonical entry scraped from the wiki.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WikiEntry {
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub first_appearance: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Canonical name → entry, per wiki category.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WikiMetadata {
    #[serde(default)]
    pub characters: BTreeMap<String, WikiEntry>,
    #[serde(default)]
    pub locations: BTreeMap<String, WikiEntry>,
    #[serde(default)]
    pub classes: BTreeMap<String, WikiEntry>,
    #[serde(default)]
    pub skills: BTreeMap<String, WikiEntry>,
    #[serde(default)]
    pub spells: BTreeMap<String, WikiEntry>,
    #[serde(default)]
    pub items: BTreeMap<String, WikiEntry>,
    #[serde(default)]
    pub miracles: BTreeMap<String, WikiEntry>,
}

impl WikiMetadata {
    /// Each section with the category its entries are seeded as.
    pub fn sections(&self) -> [(RefCategory, &BTreeMap<String, WikiEntry>); 7] {
        [
            (RefCategory::Character, &self.characters),
            (RefCategory::Location, &self.locations),
            (RefCategory::Class, &self.classes),
            (RefCategory::Skill, &self.skills),
            (RefCategory::Spell, &self.spells),
            (RefCategory::Item, &self.items),
            (RefCategory::Miracle, &self.miracles),
        ]
    }
}

pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// One keyword per line; blank lines and `#` comments ignored.
pub fn read_keyword_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_line_span() {
        assert_eq!(parse_line_span("3..7").unwrap(), 3..7);
        assert_eq!(parse_line_span("5").unwrap(), 5..6);
        assert!(parse_line_span("7..3").is_err());
        assert!(parse_line_span("x..3").is_err());
    }

    #[test]
    fn test_line_range_contains() {
        let r = LineRange {
            chapter: 2,
            lines: 3..5,
        };
        assert!(r.contains(2, 3));
        assert!(!r.contains(2, 5));
        assert!(!r.contains(1, 3));
    }

    #[test]
    fn test_wiki_metadata_parse() {
        let meta: WikiMetadata = serde_json::from_str(
            r#"{
                "characters": {"Erin Solstice": {"aliases": ["Erin"], "first_appearance": "1.00"}},
                "classes": {"[Innkeeper]": {}}
            }"#,
        )
        .unwrap();
        assert_eq!(meta.characters["Erin Solstice"].aliases, vec!["Erin"]);
        assert!(meta.classes.contains_key("[Innkeeper]"));
        assert!(meta.locations.is_empty());
    }

    #[test]
    fn test_wiki_metadata_rejects_unknown_section() {
        let err = serde_json::from_str::<WikiMetadata>(r#"{"charcters": {}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_read_json_errors_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            read_json::<WikiMetadata>(&missing),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            read_json::<WikiMetadata>(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_read_keyword_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "# classes\n[Warrior]\n\n  [Go]  ").unwrap();
        assert_eq!(read_keyword_list(&path).unwrap(), vec!["[Warrior]", "[Go]"]);
    }
}
