use std::collections::{HashMap, HashSet};

use regex::Regex;
use tracing::info;

use crate::config::DisambiguationFile;
use crate::error::{ConfigError, Interrupted};
use crate::prompt::{Operator, Reply};

/// Whether a bracket match may go on to become an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Suppress,
}

/// What the curated list alone says about a keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCheck {
    NotListed,
    /// Listed, but an exception pattern matched the line.
    Excepted,
    Listed,
}

/// Bracket-shaped phrases that are ordinary prose ("[Go]" shouted as an
/// order) plus per-phrase line patterns under which they are keywords after all.
#[derive(Debug, Default)]
pub struct DisambiguationFilter {
    phrases: HashSet<String>,
    exceptions: HashMap<String, Vec<Regex>>,
}

impl DisambiguationFilter {
    pub fn new(phrases: &[&str]) -> Self {
        DisambiguationFilter {
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
            exceptions: HashMap::new(),
        }
    }

    pub fn from_file(file: &DisambiguationFile) -> Result<Self, ConfigError> {
        let mut filter = DisambiguationFilter {
            phrases: file.phrases.iter().cloned().collect(),
            exceptions: HashMap::new(),
        };
        for (phrase, patterns) in &file.exceptions {
            for pattern in patterns {
                filter.add_exception(phrase, pattern)?;
            }
        }
        Ok(filter)
    }

    pub fn add_exception(&mut self, phrase: &str, pattern: &str) -> Result<(), ConfigError> {
        let re = Regex::new(pattern).map_err(|source| ConfigError::ExceptionPattern {
            phrase: phrase.to_string(),
            source,
        })?;
        self.exceptions.entry(phrase.to_string()).or_default().push(re);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// Exception patterns are tested against the whole line.
    pub fn check(&self, keyword: &str, line: &str) -> ListCheck {
        if !self.phrases.contains(keyword) {
            return ListCheck::NotListed;
        }
        let excepted = self
            .exceptions
            .get(keyword)
            .is_some_and(|res| res.iter().any(|re| re.is_match(line)));
        if excepted {
            ListCheck::Excepted
        } else {
            ListCheck::Listed
        }
    }

    /// Settle a keyword, asking the operator about listed phrases when
    /// `interactive` is set.
    pub fn evaluate(
        &self,
        keyword: &str,
        line: &str,
        operator: &mut dyn Operator,
        interactive: bool,
    ) -> Result<Verdict, Interrupted> {
        match self.check(keyword, line) {
            ListCheck::NotListed | ListCheck::Excepted => Ok(Verdict::Allow),
            ListCheck::Listed if !interactive => {
                info!(kind = "skipped", keyword, "listed as prose");
                Ok(Verdict::Suppress)
            }
            ListCheck::Listed => {
                let question = format!(
                    "{keyword} is on the disambiguation list.\n  {line}\nCreate a new identity anyway?"
                );
                match operator.confirm(&question)? {
                    Reply::Chosen(true) => Ok(Verdict::Allow),
                    Reply::Chosen(false) | Reply::Skip | Reply::Retry => {
                        info!(kind = "skipped", keyword, "operator kept it as prose");
                        Ok(Verdict::Suppress)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{NonInteractive, ScriptedOperator, Scripted};

    #[test]
    fn test_listed_phrase_suppressed() {
        let f = DisambiguationFilter::new(&["[Go]"]);
        let verdict = f
            .evaluate("[Go]", "\"[Go]!\" she shouted.", &mut NonInteractive, false)
            .unwrap();
        assert_eq!(verdict, Verdict::Suppress);
    }

    #[test]
    fn test_unlisted_phrase_allowed() {
        let f = DisambiguationFilter::new(&["[Go]"]);
        assert_eq!(f.check("[Warrior]", "a [Warrior]"), ListCheck::NotListed);
        let verdict = f.evaluate("[Warrior]", "a [Warrior]", &mut NonInteractive, false).unwrap();
        assert_eq!(verdict, Verdict::Allow);
    }

    #[test]
    fn test_exception_overrides_list() {
        let mut f = DisambiguationFilter::new(&["[Go]"]);
        f.add_exception("[Go]", r"board game").unwrap();
        assert_eq!(f.check("[Go]", "They played [Go], the board game."), ListCheck::Excepted);
        assert_eq!(f.check("[Go]", "[Go]!"), ListCheck::Listed);
    }

    #[test]
    fn test_bad_exception_pattern_is_config_error() {
        let mut f = DisambiguationFilter::new(&["[Go]"]);
        assert!(matches!(
            f.add_exception("[Go]", "(unclosed"),
            Err(ConfigError::ExceptionPattern { .. })
        ));
    }

    #[test]
    fn test_operator_can_allow_listed_phrase() {
        let f = DisambiguationFilter::new(&["[Go]"]);
        let mut op = ScriptedOperator::new([Scripted::Confirm(true)]);
        assert_eq!(f.evaluate("[Go]", "[Go]", &mut op, true).unwrap(), Verdict::Allow);

        let mut op = ScriptedOperator::new([Scripted::Confirm(false)]);
        assert_eq!(f.evaluate("[Go]", "[Go]", &mut op, true).unwrap(), Verdict::Suppress);
    }

    #[test]
    fn test_interruption_propagates() {
        let f = DisambiguationFilter::new(&["[Go]"]);
        let mut op = ScriptedOperator::new([]);
        assert_eq!(f.evaluate("[Go]", "[Go]", &mut op, true), Err(Interrupted));
    }

    #[test]
    fn test_from_file() {
        let file: DisambiguationFile = serde_json::from_str(
            r#"{"phrases": ["[Go]", "[Stop]"], "exceptions": {"[Go]": ["board game"]}}"#,
        )
        .unwrap();
        let f = DisambiguationFilter::from_file(&file).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f.check("[Go]", "the board game [Go]"), ListCheck::Excepted);
    }
}
