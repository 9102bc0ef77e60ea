#[cfg(test)]
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use reference_types::RefCategory;
use tracing::{info, warn};

use crate::error::Interrupted;

// ── Operator capability ──────────────────────────────────────────────

/// An operator's answer to one prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply<T> {
    Chosen(T),
    Skip,
    /// Start classification of the occurrence over.
    Retry,
}

/// What the operator is shown when a keyword needs a category.
#[derive(Debug, Clone)]
pub struct CategoryPrompt<'a> {
    pub keyword: &'a str,
    pub line: &'a str,
    pub chapter: u32,
    pub line_number: usize,
}

/// The places where the pipeline can defer to a human. Every method blocks
/// until an answer arrives; `Err(Interrupted)` ends the whole run.
pub trait Operator {
    fn select_category(
        &mut self,
        prompt: &CategoryPrompt<'_>,
    ) -> Result<Reply<RefCategory>, Interrupted>;

    fn confirm(&mut self, question: &str) -> Result<Reply<bool>, Interrupted>;

    /// Pick one of `options` by index.
    fn choose(&mut self, question: &str, options: &[String]) -> Result<Reply<usize>, Interrupted>;
}

// ── Non-interactive ──────────────────────────────────────────────────

/// Answers every prompt with a skip.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonInteractive;

impl Operator for NonInteractive {
    fn select_category(
        &mut self,
        prompt: &CategoryPrompt<'_>,
    ) -> Result<Reply<RefCategory>, Interrupted> {
        info!(
            kind = "skipped",
            keyword = prompt.keyword,
            chapter = prompt.chapter,
            line = prompt.line_number,
            "needs a category; non-interactive"
        );
        Ok(Reply::Skip)
    }

    fn confirm(&mut self, question: &str) -> Result<Reply<bool>, Interrupted> {
        info!(kind = "skipped", question, "confirmation skipped; non-interactive");
        Ok(Reply::Skip)
    }

    fn choose(&mut self, question: &str, options: &[String]) -> Result<Reply<usize>, Interrupted> {
        info!(
            kind = "skipped",
            question,
            options = options.len(),
            "choice skipped; non-interactive"
        );
        Ok(Reply::Skip)
    }
}

// ── Scripted ─────────────────────────────────────────────────────────

/// One canned answer for `ScriptedOperator`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Category(RefCategory),
    Confirm(bool),
    Choose(usize),
    Skip,
    Retry,
    Interrupt,
}

/// Replays canned answers in order. Running out of answers, or meeting an
/// answer of the wrong kind, interrupts the run.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: VecDeque<Scripted>,
    /// Every prompt seen, in order.
    pub asked: Vec<String>,
}

#[cfg(test)]
impl ScriptedOperator {
    pub fn new<I: IntoIterator<Item = Scripted>>(answers: I) -> Self {
        ScriptedOperator {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next<T>(
        &mut self,
        asked: String,
        pick: impl FnOnce(&Scripted) -> Option<T>,
    ) -> Result<Reply<T>, Interrupted> {
        self.asked.push(asked);
        let answer = self.answers.pop_front().ok_or(Interrupted)?;
        match answer {
            Scripted::Skip => Ok(Reply::Skip),
            Scripted::Retry => Ok(Reply::Retry),
            Scripted::Interrupt => Err(Interrupted),
            other => match pick(&other) {
                Some(v) => Ok(Reply::Chosen(v)),
                None => {
                    warn!(answer = ?other, "scripted answer does not fit the prompt");
                    Err(Interrupted)
                }
            },
        }
    }
}

#[cfg(test)]
impl Operator for ScriptedOperator {
    fn select_category(
        &mut self,
        prompt: &CategoryPrompt<'_>,
    ) -> Result<Reply<RefCategory>, Interrupted> {
        self.next(format!("category {}", prompt.keyword), |a| match a {
            Scripted::Category(c) => Some(*c),
            _ => None,
        })
    }

    fn confirm(&mut self, question: &str) -> Result<Reply<bool>, Interrupted> {
        self.next(format!("confirm {question}"), |a| match a {
            Scripted::Confirm(b) => Some(*b),
            _ => None,
        })
    }

    fn choose(&mut self, question: &str, options: &[String]) -> Result<Reply<usize>, Interrupted> {
        let len = options.len();
        self.next(format!("choose {question}"), |a| match a {
            Scripted::Choose(i) if *i < len => Some(*i),
            _ => None,
        })
    }
}

// ── Console ──────────────────────────────────────────────────────────

/// Line-oriented prompts over any reader/writer pair; stdin/stderr in the CLI.
///
/// `s` skips, `r` retries (category prompts only), `q` or end of input
/// interrupts. Unrecognized input asks whether to skip before re-prompting.
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
}

impl ConsoleOperator<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        ConsoleOperator::new(io::stdin().lock(), io::stderr())
    }
}

/// Parsed console input.
enum Input {
    Number(usize),
    Yes,
    No,
    Skip,
    Retry,
    Quit,
    Other(String),
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        ConsoleOperator { input, output }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) -> Result<(), Interrupted> {
        write!(self.output, "{text}")
            .and_then(|_| self.output.flush())
            .map_err(|e| {
                warn!(error = %e, "cannot write prompt");
                Interrupted
            })
    }

    fn read(&mut self) -> Result<Input, Interrupted> {
        let mut buf = String::new();
        let n = self.input.read_line(&mut buf).map_err(|e| {
            warn!(error = %e, "cannot read operator input");
            Interrupted
        })?;
        if n == 0 {
            return Err(Interrupted);
        }
        let answer = buf.trim();
        Ok(match answer.to_lowercase().as_str() {
            "y" | "yes" => Input::Yes,
            "n" | "no" => Input::No,
            "s" | "skip" => Input::Skip,
            "r" | "retry" => Input::Retry,
            "q" | "quit" => Input::Quit,
            other => match other.parse::<usize>() {
                Ok(n) => Input::Number(n),
                Err(_) => Input::Other(answer.to_string()),
            },
        })
    }

    /// After malformed input: `true` means the operator wants to skip.
    fn confirm_skip(&mut self, got: &str) -> Result<bool, Interrupted> {
        self.say(&format!("Unrecognized input {got:?}. Skip this one? [y/N] "))?;
        match self.read()? {
            Input::Yes => Ok(true),
            Input::Quit => Err(Interrupted),
            _ => Ok(false),
        }
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn select_category(
        &mut self,
        prompt: &CategoryPrompt<'_>,
    ) -> Result<Reply<RefCategory>, Interrupted> {
        let mut menu = format!(
            "\n── {} ── chapter {}, line {}\n  {}\n",
            prompt.keyword, prompt.chapter, prompt.line_number, prompt.line
        );
        for (i, cat) in RefCategory::ALL.iter().enumerate() {
            menu.push_str(&format!("  {}) {}\n", i + 1, cat.label()));
        }
        menu.push_str("  s) skip  r) retry  q) quit\n");

        loop {
            self.say(&menu)?;
            self.say("> ")?;
            match self.read()? {
                Input::Number(n) if (1..=RefCategory::ALL.len()).contains(&n) => {
                    return Ok(Reply::Chosen(RefCategory::ALL[n - 1]));
                }
                Input::Skip => return Ok(Reply::Skip),
                Input::Retry => return Ok(Reply::Retry),
                Input::Quit => return Err(Interrupted),
                Input::Number(n) => {
                    if self.confirm_skip(&n.to_string())? {
                        return Ok(Reply::Skip);
                    }
                }
                Input::Yes => {
                    if self.confirm_skip("y")? {
                        return Ok(Reply::Skip);
                    }
                }
                Input::No => {
                    if self.confirm_skip("n")? {
                        return Ok(Reply::Skip);
                    }
                }
                Input::Other(s) => {
                    if self.confirm_skip(&s)? {
                        return Ok(Reply::Skip);
                    }
                }
            }
        }
    }

    fn confirm(&mut self, question: &str) -> Result<Reply<bool>, Interrupted> {
        loop {
            self.say(&format!("\n{question} [y/n, s=skip, q=quit] "))?;
            match self.read()? {
                Input::Yes => return Ok(Reply::Chosen(true)),
                Input::No => return Ok(Reply::Chosen(false)),
                Input::Skip => return Ok(Reply::Skip),
                Input::Quit => return Err(Interrupted),
                _ => self.say("Please answer y or n.\n")?,
            }
        }
    }

    fn choose(&mut self, question: &str, options: &[String]) -> Result<Reply<usize>, Interrupted> {
        let mut menu = format!("\n{question}\n");
        for (i, opt) in options.iter().enumerate() {
            menu.push_str(&format!("  {}) {}\n", i + 1, opt));
        }
        menu.push_str("  s) skip  q) quit\n> ");

        loop {
            self.say(&menu)?;
            match self.read()? {
                Input::Number(n) if (1..=options.len()).contains(&n) => {
                    return Ok(Reply::Chosen(n - 1));
                }
                Input::Skip => return Ok(Reply::Skip),
                Input::Quit => return Err(Interrupted),
                Input::Other(s) => {
                    if self.confirm_skip(&s)? {
                        return Ok(Reply::Skip);
                    }
                }
                _ => {
                    if self.confirm_skip("out of range")? {
                        return Ok(Reply::Skip);
                    }
                }
            }
        }
    }
}
