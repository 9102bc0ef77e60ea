use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use reference_types::{Line, RefCategory, RefType};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::color;
use crate::config::BuildConfig;
use crate::context::ResolutionContext;
use crate::disambig::{DisambiguationFilter, Verdict};
use crate::error::{BuildError, ConfigError, Halt, IntegrityError, Interrupted, StoreError};
use crate::morph;
use crate::patterns::{NameMatcher, bracket_keywords};
use crate::prompt::{CategoryPrompt, Operator, Reply};
use crate::scanner::ChapterSource;
use crate::store::{ChapterMeta, ChapterSync, LineSync, NewOccurrence, Store};
use crate::updates::{self, Classification};

// ── Cancellation ─────────────────────────────────────────────────────

/// Shared stop flag, checked between chapters, lines and candidates.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Occurrence lifecycle ─────────────────────────────────────────────

/// Where a candidate span ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OccurrenceState {
    Detected,
    Suppressed,
    AliasMatched,
    ExactMatched,
    MorphMatched,
    UpdateClassified,
    Ignored,
    NewTypeCreated,
    Skipped,
    Persisted,
    Dropped,
}

/// Which scanner produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Bracket,
    Character,
    Location,
    /// Restricted scan over a custom keyword list
    Keyword,
}

impl CandidateSource {
    /// Category a candidate is confined to, if any.
    fn domain(&self) -> Option<RefCategory> {
        match self {
            Self::Character => Some(RefCategory::Character),
            Self::Location => Some(RefCategory::Location),
            Self::Bracket | Self::Keyword => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub source: CandidateSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Resolved { ref_type_id: i64, state: OccurrenceState },
    Unresolved(OccurrenceState),
}

// ── Run results ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    pub chapters: usize,
    pub chapters_rebuilt: usize,
    pub occurrences_purged: usize,
    pub lines: usize,
    pub lines_skipped: usize,
    pub line_conflicts: usize,
    pub candidates: usize,
    pub already_persisted: usize,
    pub persisted: usize,
    pub new_types: usize,
    pub new_aliases: usize,
    /// Candidates that passed through each state
    pub states: BTreeMap<OccurrenceState, usize>,
    pub integrity_errors: Vec<String>,
}

impl BuildStats {
    pub fn state(&self, state: OccurrenceState) -> usize {
        self.states.get(&state).copied().unwrap_or(0)
    }

    fn record(&mut self, state: OccurrenceState) {
        *self.states.entry(state).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Completed(BuildStats),
    /// Stopped by the operator; everything persisted before that stands.
    Interrupted(BuildStats),
}

impl BuildOutcome {
    pub fn stats(&self) -> &BuildStats {
        match self {
            BuildOutcome::Completed(s) | BuildOutcome::Interrupted(s) => s,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, BuildOutcome::Interrupted(_))
    }
}

/// Why processing stopped early.
enum Stop {
    Interrupted,
    Failed(BuildError),
}

impl From<Interrupted> for Stop {
    fn from(_: Interrupted) -> Self {
        Stop::Interrupted
    }
}

impl From<StoreError> for Stop {
    fn from(e: StoreError) -> Self {
        Stop::Failed(e.into())
    }
}

impl From<BuildError> for Stop {
    fn from(e: BuildError) -> Self {
        Stop::Failed(e)
    }
}

impl From<Halt> for Stop {
    fn from(h: Halt) -> Self {
        match h {
            Halt::Store(e) => e.into(),
            Halt::Interrupted(_) => Stop::Interrupted,
        }
    }
}

// ── Line shapes that are never scanned ───────────────────────────────
//
// Real data examples:
//   <a href="https://wanderinginn.com/table-of-contents/">Previous Chapter</a>
//   <img class="aligncenter" src="https://i.imgur.com/map.png">
//   <div class="entry-content">
//   </blockquote>

static SKIP_SHAPES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^\s*$", "blank"),
        (r#"(?i)<a\s[^>]*\bhref\s*="#, "link markup"),
        (r"(?i)<img\b", "image markup"),
        (
            r"(?i)^\s*</?(?:div|blockquote|hr|table|tbody|thead|tr|td|ul|ol|li|p)\b[^>]*/?>\s*$",
            "block wrapper",
        ),
    ]
    .into_iter()
    .map(|(p, reason)| (Regex::new(p).unwrap(), reason))
    .collect()
});

/// Why a line is not scanned, if it isn't.
pub fn excluded_shape(text: &str) -> Option<&'static str> {
    SKIP_SHAPES
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, reason)| *reason)
}

// ── Orchestrator ─────────────────────────────────────────────────────

/// Drives chapters → lines → candidate spans through resolution and
/// persistence, strictly in source order.
pub struct Builder<'a> {
    store: &'a Store,
    operator: &'a mut dyn Operator,
    config: BuildConfig,
    disambiguation: DisambiguationFilter,
    ctx: ResolutionContext,
    characters: NameMatcher,
    locations: NameMatcher,
    keywords: Option<NameMatcher>,
    cancel: CancelToken,
    stats: BuildStats,
}

impl<'a> Builder<'a> {
    /// Load identity state and compile matchers. Fails before any write when
    /// the configuration cannot be honored.
    pub fn new(
        store: &'a Store,
        operator: &'a mut dyn Operator,
        config: BuildConfig,
        disambiguation: DisambiguationFilter,
    ) -> Result<Self, BuildError> {
        let ctx = ResolutionContext::load(store)?;
        let characters = NameMatcher::compile(ctx.names_in(RefCategory::Character))
            .map_err(ConfigError::from)?;
        let locations = NameMatcher::compile(ctx.names_in(RefCategory::Location))
            .map_err(ConfigError::from)?;

        let keywords = match &config.keywords {
            Some(list) => {
                for keyword in list {
                    let mut categories: Vec<RefCategory> =
                        ctx.types_named(keyword).iter().map(|rt| rt.category).collect();
                    categories.sort();
                    categories.dedup();
                    if categories.len() > 1 {
                        return Err(ConfigError::AmbiguousKeyword {
                            keyword: keyword.clone(),
                            categories,
                        }
                        .into());
                    }
                }
                Some(
                    NameMatcher::for_keywords(list.iter().map(String::as_str))
                        .map_err(ConfigError::from)?,
                )
            }
            None => None,
        };

        info!(
            kind = "info",
            ref_types = ctx.type_count(),
            aliases = ctx.alias_count(),
            character_names = characters.len(),
            location_names = locations.len(),
            "resolution context loaded"
        );

        Ok(Builder {
            store,
            operator,
            config,
            disambiguation,
            ctx,
            characters,
            locations,
            keywords,
            cancel: CancelToken::new(),
            stats: BuildStats::default(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process chapters in order. Interruption is an outcome, not an error.
    pub fn run(&mut self, chapters: &[ChapterSource]) -> Result<BuildOutcome, BuildError> {
        self.stats = BuildStats::default();

        let selected: Vec<&ChapterSource> = match &self.config.line_range {
            Some(range) => {
                let chapter = chapters
                    .iter()
                    .find(|c| c.number == range.chapter)
                    .ok_or(BuildError::MissingChapter(range.chapter))?;
                vec![chapter]
            }
            None => chapters.iter().collect(),
        };

        for chapter in selected {
            match self.process_chapter(chapter) {
                Ok(()) => {}
                Err(Stop::Interrupted) => {
                    info!(
                        kind = "info",
                        chapter = chapter.number,
                        persisted = self.stats.persisted,
                        "interrupted; committed occurrences kept"
                    );
                    return Ok(BuildOutcome::Interrupted(std::mem::take(&mut self.stats)));
                }
                Err(Stop::Failed(e)) => return Err(e),
            }
        }
        Ok(BuildOutcome::Completed(std::mem::take(&mut self.stats)))
    }

    fn check_cancel(&self) -> Result<(), Stop> {
        if self.cancel.is_cancelled() {
            Err(Stop::Interrupted)
        } else {
            Ok(())
        }
    }

    fn process_chapter(&mut self, chapter: &ChapterSource) -> Result<(), Stop> {
        self.check_cancel()?;

        let meta = ChapterMeta {
            number: chapter.number,
            title: &chapter.title,
            url: chapter.url.as_deref(),
            digest: &chapter.digest,
            word_count: chapter.word_count,
        };

        let stored = match self.store.sync_chapter(&meta)? {
            ChapterSync::Created(c) => {
                info!(
                    kind = "created",
                    chapter = c.number,
                    title = %c.title,
                    published = ?chapter.published,
                    "chapter"
                );
                c
            }
            ChapterSync::Unchanged(c) => {
                debug!(chapter = c.number, "chapter unchanged");
                c
            }
            // A partial run cannot re-derive the lines it leaves out
            ChapterSync::Changed { stored, .. } if self.config.line_range.is_some() => {
                warn!(
                    kind = "skipped",
                    chapter = stored.number,
                    "content changed; rebuilding needs a full-chapter run"
                );
                stored
            }
            ChapterSync::Changed { stored, fresh_digest } => {
                let question = format!(
                    "Chapter {} ({}) changed since it was stored ({} → {}).\nPurge its occurrences and rebuild?",
                    stored.number,
                    stored.title,
                    short(&stored.digest),
                    short(&fresh_digest)
                );
                match self.operator.confirm(&question)? {
                    Reply::Chosen(true) => {
                        let fresh: Vec<(usize, &str)> = chapter
                            .lines
                            .iter()
                            .map(String::as_str)
                            .enumerate()
                            .filter(|(_, text)| excluded_shape(text).is_none())
                            .collect();
                        let purged = self.store.rebuild_chapter(stored.id, &meta, &fresh)?;
                        self.stats.chapters_rebuilt += 1;
                        self.stats.occurrences_purged += purged;
                        info!(kind = "updated", chapter = stored.number, purged, "chapter rebuilt");
                        stored
                    }
                    _ => {
                        warn!(
                            kind = "skipped",
                            chapter = stored.number,
                            "content changed; keeping stored lines"
                        );
                        stored
                    }
                }
            }
        };

        for (line_number, text) in chapter.lines.iter().enumerate() {
            self.check_cancel()?;
            if let Some(range) = &self.config.line_range {
                if !range.contains(chapter.number, line_number) {
                    continue;
                }
            }
            if let Some(reason) = excluded_shape(text) {
                self.stats.lines_skipped += 1;
                debug!(kind = "skipped", chapter = chapter.number, line = line_number, reason, "line");
                continue;
            }

            let line = match self.store.sync_line(stored.id, line_number, text)? {
                LineSync::Created(l) | LineSync::Existing(l) => l,
                LineSync::Conflict { stored: old } => {
                    self.stats.line_conflicts += 1;
                    let question = format!(
                        "Chapter {} line {} differs from the stored text.\n  stored: {}\n  fresh:  {}\nContinue without overwriting?",
                        chapter.number, line_number, old.text, text
                    );
                    match self.operator.confirm(&question)? {
                        Reply::Chosen(false) => {
                            error!(kind = "error", chapter = chapter.number, line = line_number, "line conflict; aborting");
                            return Err(BuildError::Conflict {
                                chapter: chapter.number,
                                line: line_number,
                            }
                            .into());
                        }
                        _ => {
                            warn!(kind = "skipped", chapter = chapter.number, line = line_number, "line conflict; not scanned");
                            continue;
                        }
                    }
                }
            };

            self.stats.lines += 1;
            self.process_line(chapter.number, &line)?;
        }

        self.stats.chapters += 1;
        Ok(())
    }

    /// Raw candidate spans, ordered by start then longest first, one per span.
    pub fn candidates(&self, text: &str) -> Vec<Candidate> {
        let mut found: Vec<Candidate> = Vec::new();
        let mut push = |hits: Vec<(usize, usize, &str)>, source: CandidateSource| {
            found.extend(hits.into_iter().map(|(start, end, s)| Candidate {
                start,
                end,
                text: s.to_string(),
                source,
            }));
        };

        match &self.keywords {
            Some(keywords) => push(keywords.find_all(text), CandidateSource::Keyword),
            None => {
                push(bracket_keywords(text), CandidateSource::Bracket);
                push(self.characters.find_all(text), CandidateSource::Character);
                push(self.locations.find_all(text), CandidateSource::Location);
            }
        }

        found.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        // Same span from two scanners: the first pushed wins
        found.dedup_by(|later, kept| {
            let same = later.start == kept.start && later.end == kept.end;
            if same && later.source != kept.source {
                warn!(
                    kind = "warn",
                    text = %kept.text,
                    kept = ?kept.source,
                    dropped = ?later.source,
                    "span claimed by two name lists"
                );
            }
            same
        });
        found
    }

    fn process_line(&mut self, chapter: u32, line: &Line) -> Result<(), Stop> {
        for candidate in self.candidates(&line.text) {
            self.check_cancel()?;
            self.stats.candidates += 1;
            self.stats.record(OccurrenceState::Detected);

            if candidate.start >= candidate.end || candidate.end > line.text.len() {
                warn!(kind = "warn", chapter, line = line.line_number, start = candidate.start, end = candidate.end, "span outside line");
                self.stats.record(OccurrenceState::Dropped);
                continue;
            }

            if self
                .store
                .occurrence_at(line.id, candidate.start, candidate.end)?
                .is_some()
            {
                self.stats.already_persisted += 1;
                debug!(kind = "exists", chapter, line = line.line_number, text = %candidate.text, "occurrence");
                continue;
            }

            match self.resolve(chapter, line, &candidate)? {
                Resolution::Resolved { ref_type_id, state } => {
                    let color_id = color::detect(
                        self.store,
                        &line.text,
                        candidate.start,
                        candidate.end,
                        &mut *self.operator,
                        self.config.interactive.color,
                    )?;
                    let new = NewOccurrence {
                        line_id: line.id,
                        ref_type_id,
                        start: candidate.start,
                        end: candidate.end,
                        color_id,
                    };
                    let occ = self.store.insert_occurrence(&new)?;
                    if occ.is_created() {
                        self.stats.persisted += 1;
                        self.stats.record(OccurrenceState::Persisted);
                        info!(
                            kind = "created",
                            chapter,
                            line = line.line_number,
                            text = %candidate.text,
                            via = ?state,
                            color = ?color_id,
                            "occurrence"
                        );
                    } else {
                        self.stats.already_persisted += 1;
                        info!(kind = "exists", chapter, line = line.line_number, text = %candidate.text, "occurrence");
                    }
                    self.stats.record(state);
                }
                Resolution::Unresolved(state) => {
                    self.stats.record(state);
                    debug!(chapter, line = line.line_number, text = %candidate.text, state = ?state, "not persisted");
                }
            }
        }
        Ok(())
    }

    /// exact → alias → morphological → disambiguation / update rules →
    /// operator. `Retry` from the operator starts over.
    fn resolve(&mut self, chapter: u32, line: &Line, candidate: &Candidate) -> Result<Resolution, Halt> {
        let domain = candidate.source.domain();
        let interactive = self.config.interactive;

        loop {
            // Exact name
            let named: Vec<(i64, RefCategory)> = self
                .ctx
                .types_named(&candidate.text)
                .into_iter()
                .filter(|rt| domain.is_none_or(|d| rt.category == d))
                .map(|rt| (rt.id, rt.category))
                .collect();
            match named.len() {
                0 => {}
                1 => {
                    return Ok(Resolution::Resolved {
                        ref_type_id: named[0].0,
                        state: OccurrenceState::ExactMatched,
                    });
                }
                _ => return self.pick_among(chapter, line, candidate, &named),
            }

            // Alias
            if let Some(rt) = self.ctx.alias_target(&candidate.text) {
                if domain.is_none_or(|d| rt.category == d) {
                    return Ok(Resolution::Resolved {
                        ref_type_id: rt.id,
                        state: OccurrenceState::AliasMatched,
                    });
                }
            }

            // Name matchers are compiled from known names; nothing else applies
            if domain.is_some() {
                warn!(kind = "warn", chapter, line = line.line_number, text = %candidate.text, "name outside its domain");
                return Ok(Resolution::Unresolved(OccurrenceState::Dropped));
            }

            // Inflected spelling of a known identity
            match morph::resolve(&self.ctx, &candidate.text) {
                Ok(Some(m)) => {
                    self.bind_alias(&candidate.text, m.ref_type_id)?;
                    debug!(text = %candidate.text, via = %m.candidate, "morphological match");
                    return Ok(Resolution::Resolved {
                        ref_type_id: m.ref_type_id,
                        state: OccurrenceState::MorphMatched,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    self.integrity(e);
                    return Ok(Resolution::Unresolved(OccurrenceState::Dropped));
                }
            }

            let verdict = self.disambiguation.evaluate(
                &candidate.text,
                &line.text,
                &mut *self.operator,
                interactive.disambiguation,
            )?;
            if verdict == Verdict::Suppress {
                return Ok(Resolution::Unresolved(OccurrenceState::Suppressed));
            }

            match updates::classify(&self.ctx, &candidate.text) {
                Classification::Mention => {
                    debug!(kind = "skipped", text = %candidate.text, "character mention");
                    return Ok(Resolution::Unresolved(OccurrenceState::Ignored));
                }
                Classification::Update { rule, category } => {
                    let rt = self.create_type(&candidate.text, category)?;
                    debug!(text = %candidate.text, rule = ?rule, "update message");
                    return Ok(Resolution::Resolved {
                        ref_type_id: rt.id,
                        state: OccurrenceState::UpdateClassified,
                    });
                }
                Classification::Unclassified => {}
            }

            if !interactive.type_selection {
                info!(kind = "skipped", chapter, line = line.line_number, text = %candidate.text, "unclassified");
                return Ok(Resolution::Unresolved(OccurrenceState::Skipped));
            }

            let prompt = CategoryPrompt {
                keyword: &candidate.text,
                line: &line.text,
                chapter,
                line_number: line.line_number,
            };
            match self.operator.select_category(&prompt)? {
                Reply::Chosen(category) => {
                    let rt = self.create_type(&candidate.text, category)?;
                    return Ok(Resolution::Resolved {
                        ref_type_id: rt.id,
                        state: OccurrenceState::NewTypeCreated,
                    });
                }
                Reply::Skip => {
                    info!(kind = "skipped", chapter, line = line.line_number, text = %candidate.text, "operator skipped");
                    return Ok(Resolution::Unresolved(OccurrenceState::Skipped));
                }
                Reply::Retry => {
                    debug!(text = %candidate.text, "retrying classification");
                }
            }
        }
    }

    /// Same name in several categories: the operator may pick one, otherwise
    /// the candidate is dropped as an integrity problem.
    fn pick_among(
        &mut self,
        chapter: u32,
        line: &Line,
        candidate: &Candidate,
        named: &[(i64, RefCategory)],
    ) -> Result<Resolution, Halt> {
        let categories: Vec<RefCategory> = named.iter().map(|(_, c)| *c).collect();
        if self.config.interactive.type_selection {
            let options: Vec<String> = categories.iter().map(|c| c.label().to_string()).collect();
            let question = format!(
                "{} (chapter {chapter}, line {}) names several types",
                candidate.text, line.line_number
            );
            if let Reply::Chosen(i) = self.operator.choose(&question, &options)? {
                if let Some((id, _)) = named.get(i) {
                    return Ok(Resolution::Resolved {
                        ref_type_id: *id,
                        state: OccurrenceState::ExactMatched,
                    });
                }
            }
        }
        self.integrity(IntegrityError::AmbiguousCategory {
            keyword: candidate.text.clone(),
            candidate: candidate.text.clone(),
            categories,
        });
        Ok(Resolution::Unresolved(OccurrenceState::Dropped))
    }

    fn integrity(&mut self, e: IntegrityError) {
        error!(kind = "error", error = %e, "data integrity");
        self.stats.integrity_errors.push(e.to_string());
    }

    fn create_type(&mut self, name: &str, category: RefCategory) -> Result<RefType, StoreError> {
        let rt = self.store.get_or_create_ref_type(name, category)?;
        if rt.is_created() {
            self.stats.new_types += 1;
            info!(kind = "created", ref_type = name, %category, "reference type");
        } else {
            info!(kind = "exists", ref_type = name, %category, "reference type");
        }
        let rt = rt.into_inner();
        self.ctx.add_type(rt.clone());
        Ok(rt)
    }

    fn bind_alias(&mut self, name: &str, ref_type_id: i64) -> Result<(), StoreError> {
        let alias = self.store.get_or_create_alias(name, ref_type_id)?;
        if alias.is_created() {
            self.stats.new_aliases += 1;
            info!(kind = "created", alias = name, ref_type_id, "alias");
        } else if alias.get().ref_type_id != ref_type_id {
            warn!(
                kind = "exists",
                alias = name,
                wanted = ref_type_id,
                bound_to = alias.get().ref_type_id,
                "alias already bound elsewhere"
            );
        }
        self.ctx.add_alias(alias.get());
        Ok(())
    }
}

fn short(digest: &str) -> &str {
    digest.get(..8).unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Interactivity, LineRange, WikiMetadata};
    use crate::prompt::{NonInteractive, Scripted, ScriptedOperator};
    use crate::seed::seed_wiki;

    fn seeded() -> Store {
        let store = Store::in_memory().unwrap();
        let meta: WikiMetadata = serde_json::from_str(
            r#"{
                "characters": {"Erin Solstice": {"aliases": ["Erin"]}},
                "locations": {"Liscor": {}},
                "classes": {"[Warrior]": {}, "[Innkeeper]": {}},
                "skills": {"[Blood Magic]": {}}
            }"#,
        )
        .unwrap();
        seed_wiki(&store, &meta).unwrap();
        store
    }

    fn chapter(number: u32, text: &str) -> ChapterSource {
        ChapterSource::from_text(number, &format!("1.0{number}"), text)
    }

    fn run_with(
        store: &Store,
        operator: &mut dyn Operator,
        config: BuildConfig,
        filter: DisambiguationFilter,
        chapters: &[ChapterSource],
    ) -> BuildOutcome {
        let mut builder = Builder::new(store, operator, config, filter).unwrap();
        builder.run(chapters).unwrap()
    }

    fn run_quiet(store: &Store, chapters: &[ChapterSource]) -> BuildOutcome {
        run_with(
            store,
            &mut NonInteractive,
            BuildConfig::default(),
            DisambiguationFilter::default(),
            chapters,
        )
    }

    fn interactive() -> BuildConfig {
        BuildConfig {
            interactive: Interactivity::all(),
            ..BuildConfig::default()
        }
    }

    fn stored_chapter(store: &Store, number: u32) -> i64 {
        store.chapter_by_number(number).unwrap().unwrap().id
    }

    #[test]
    fn test_two_runs_produce_identical_occurrences() {
        let store = seeded();
        let chapters = [
            chapter(1, "Erin walked to Liscor.\nA [Warrior] waved.\n\n[Innkeeper Level 12!]"),
            chapter(2, "Erin Solstice smiled at the [Warriors]."),
        ];

        let first = run_quiet(&store, &chapters);
        let mut before: Vec<_> = [1, 2]
            .iter()
            .flat_map(|n| store.occurrences_for_chapter(stored_chapter(&store, *n)).unwrap())
            .collect();
        assert!(!first.is_interrupted());
        assert_eq!(first.stats().persisted, before.len());
        assert_eq!(before.len(), 6);

        let second = run_quiet(&store, &chapters);
        let mut after: Vec<_> = [1, 2]
            .iter()
            .flat_map(|n| store.occurrences_for_chapter(stored_chapter(&store, *n)).unwrap())
            .collect();
        assert_eq!(second.stats().persisted, 0);
        assert_eq!(second.stats().already_persisted, before.len());
        before.sort_by_key(|o| o.id);
        after.sort_by_key(|o| o.id);
        assert_eq!(before, after);
    }

    #[test]
    fn test_plural_resolves_through_morphology_then_alias() {
        let store = seeded();
        let chapters = [chapter(1, "Two [Warriors] arrived.\nMore [Warriors] followed.")];
        let outcome = run_quiet(&store, &chapters);
        let stats = outcome.stats();

        assert_eq!(stats.new_aliases, 1);
        assert_eq!(stats.state(OccurrenceState::MorphMatched), 1);
        assert_eq!(stats.state(OccurrenceState::AliasMatched), 1);

        let warrior = store.find_ref_type("[Warrior]", RefCategory::Class).unwrap().unwrap();
        assert_eq!(store.alias("[Warriors]").unwrap().unwrap().ref_type_id, warrior.id);
        assert_eq!(store.aliases_for(warrior.id).unwrap().len(), 1);
        assert_eq!(store.occurrences_for_ref_type(warrior.id).unwrap().len(), 2);
        assert!(store.ref_types_named("[Warriors]").unwrap().is_empty());
    }

    #[test]
    fn test_listed_phrase_suppressed() {
        let store = seeded();
        let chapters = [chapter(1, "\"[Go]!\" Erin shouted.")];
        let outcome = run_with(
            &store,
            &mut NonInteractive,
            BuildConfig::default(),
            DisambiguationFilter::new(&["[Go]"]),
            &chapters,
        );
        assert_eq!(outcome.stats().state(OccurrenceState::Suppressed), 1);
        assert!(store.ref_types_named("[Go]").unwrap().is_empty());
        // Only Erin persisted
        let occs = store.occurrences_for_chapter(stored_chapter(&store, 1)).unwrap();
        assert_eq!(occs.len(), 1);
    }

    #[test]
    fn test_update_messages_classified() {
        let store = seeded();
        let chapters = [chapter(1, "[Skill Obtained!]\n[Level 12!]\nLevel 12! Skill Obtained!")];
        let outcome = run_quiet(&store, &chapters);
        assert_eq!(outcome.stats().state(OccurrenceState::UpdateClassified), 2);
        assert_eq!(outcome.stats().candidates, 2);
        assert!(store.find_ref_type("[Skill Obtained!]", RefCategory::SkillUpdate).unwrap().is_some());
        assert!(store.find_ref_type("[Level 12!]", RefCategory::ClassUpdate).unwrap().is_some());
    }

    #[test]
    fn test_character_mention_ignored() {
        let store = seeded();
        let chapters = [chapter(1, "A message for [Erin].")];
        let outcome = run_quiet(&store, &chapters);
        assert_eq!(outcome.stats().state(OccurrenceState::Ignored), 1);
        assert!(store.ref_types_named("[Erin]").unwrap().is_empty());
        // The bare name inside the brackets is still a character occurrence
        assert_eq!(outcome.stats().persisted, 1);
    }

    #[test]
    fn test_unclassified_skipped_without_operator() {
        let store = seeded();
        let outcome = run_quiet(&store, &[chapter(1, "She cast [Fireball].")]);
        assert_eq!(outcome.stats().state(OccurrenceState::Skipped), 1);
        assert!(store.ref_types_named("[Fireball]").unwrap().is_empty());
    }

    #[test]
    fn test_operator_creates_type_once() {
        let store = seeded();
        let mut op = ScriptedOperator::new([Scripted::Retry, Scripted::Category(RefCategory::Spell)]);
        let chapters = [chapter(1, "She cast [Fireball].\nAnother [Fireball] flew.")];
        let outcome = run_with(&store, &mut op, interactive(), DisambiguationFilter::default(), &chapters);

        assert_eq!(outcome.stats().state(OccurrenceState::NewTypeCreated), 1);
        assert_eq!(outcome.stats().state(OccurrenceState::ExactMatched), 1);
        assert_eq!(op.remaining(), 0);
        let fireball = store.find_ref_type("[Fireball]", RefCategory::Spell).unwrap().unwrap();
        assert_eq!(store.occurrences_for_ref_type(fireball.id).unwrap().len(), 2);
    }

    #[test]
    fn test_interruption_keeps_committed_prefix() {
        let store = seeded();
        // One answer for two unknown keywords: the second prompt interrupts
        let mut op = ScriptedOperator::new([Scripted::Category(RefCategory::Spell)]);
        let chapters = [chapter(1, "A [Warrior] cast [Fireball].\nThen [Ice Wall] rose.\nErin ran.")];
        let outcome = run_with(&store, &mut op, interactive(), DisambiguationFilter::default(), &chapters);

        assert!(outcome.is_interrupted());
        assert_eq!(outcome.stats().persisted, 2);
        let occs = store.occurrences_for_chapter(stored_chapter(&store, 1)).unwrap();
        assert_eq!(occs.len(), 2);
        assert!(store.ref_types_named("[Ice Wall]").unwrap().is_empty());

        // A later non-interactive run continues from the prefix without duplicating it
        let rerun = run_quiet(&store, &chapters);
        assert_eq!(rerun.stats().already_persisted, 2);
        assert_eq!(rerun.stats().persisted, 1);
    }

    #[test]
    fn test_cancel_token_stops_before_work() {
        let store = seeded();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut op = NonInteractive;
        let mut builder = Builder::new(&store, &mut op, BuildConfig::default(), DisambiguationFilter::default())
            .unwrap()
            .with_cancel(cancel);
        let outcome = builder.run(&[chapter(1, "Erin")]).unwrap();
        assert!(outcome.is_interrupted());
        assert!(store.chapter_by_number(1).unwrap().is_none());
    }

    #[test]
    fn test_changed_chapter_rebuilt_on_confirmation() {
        let store = seeded();
        run_quiet(&store, &[chapter(1, "Erin walked to Liscor.")]);

        let mut op = ScriptedOperator::new([Scripted::Confirm(true)]);
        let outcome = run_with(
            &store,
            &mut op,
            BuildConfig::default(),
            DisambiguationFilter::default(),
            &[chapter(1, "Liscor waited for Erin.")],
        );
        assert_eq!(outcome.stats().chapters_rebuilt, 1);
        assert_eq!(outcome.stats().occurrences_purged, 2);

        let id = stored_chapter(&store, 1);
        let lines = store.lines_for_chapter(id).unwrap();
        assert_eq!(lines[0].text, "Liscor waited for Erin.");
        let occs = store.occurrences_for_chapter(id).unwrap();
        assert_eq!(occs.iter().map(|o| o.start).collect::<Vec<_>>(), vec![0, 18]);
        assert_eq!(
            store.chapter_by_number(1).unwrap().unwrap().digest,
            crate::scanner::digest("Liscor waited for Erin.")
        );
    }

    #[test]
    fn test_changed_chapter_without_rebuild_skips_conflicting_lines() {
        let store = seeded();
        run_quiet(&store, &[chapter(1, "Erin walked to Liscor.\nA [Warrior] waved.")]);
        let before = store.count_occurrences().unwrap();

        let outcome = run_quiet(&store, &[chapter(1, "Erin ran to Liscor.\nA [Warrior] waved.")]);
        assert_eq!(outcome.stats().line_conflicts, 1);
        assert_eq!(outcome.stats().already_persisted, 1);
        assert_eq!(store.count_occurrences().unwrap(), before);

        let id = stored_chapter(&store, 1);
        assert_eq!(store.lines_for_chapter(id).unwrap()[0].text, "Erin walked to Liscor.");
        // Digest left alone: stored lines still match the old text
        assert_eq!(
            store.chapter_by_number(1).unwrap().unwrap().digest,
            crate::scanner::digest("Erin walked to Liscor.\nA [Warrior] waved.")
        );
    }

    #[test]
    fn test_interrupted_rebuild_resumes_from_prefix() {
        let store = seeded();
        run_quiet(&store, &[chapter(1, "Erin walked.\nA.\nErin sat.")]);

        // The rebuild is confirmed, then the prompt for [Ice Wall] runs out of answers
        let revised = chapter(1, "Erin ran.\nShe cast [Ice Wall].\nErin stood.");
        let mut op = ScriptedOperator::new([Scripted::Confirm(true)]);
        let outcome = run_with(&store, &mut op, interactive(), DisambiguationFilter::default(), &[revised.clone()]);
        assert!(outcome.is_interrupted());
        assert_eq!(outcome.stats().occurrences_purged, 2);

        let rerun = run_quiet(&store, &[revised.clone()]);
        assert!(!rerun.is_interrupted());
        assert_eq!(rerun.stats().line_conflicts, 0);
        assert_eq!(rerun.stats().already_persisted, 1);

        let id = stored_chapter(&store, 1);
        let lines: Vec<String> = store.lines_for_chapter(id).unwrap().into_iter().map(|l| l.text).collect();
        assert_eq!(lines, revised.lines);
        assert_eq!(store.chapter_by_number(1).unwrap().unwrap().digest, revised.digest);
        assert_eq!(store.occurrences_for_chapter(id).unwrap().len(), 2);
    }

    #[test]
    fn test_rebuild_drops_stale_lines() {
        let store = seeded();
        run_quiet(&store, &[chapter(1, "Erin walked.\nLiscor slept.\nErin sat.")]);

        let mut op = ScriptedOperator::new([Scripted::Confirm(true)]);
        let outcome = run_with(
            &store,
            &mut op,
            BuildConfig::default(),
            DisambiguationFilter::default(),
            &[chapter(1, "Erin walked.\n<div>")],
        );
        assert_eq!(outcome.stats().lines_skipped, 1);

        let id = stored_chapter(&store, 1);
        let lines: Vec<String> = store.lines_for_chapter(id).unwrap().into_iter().map(|l| l.text).collect();
        assert_eq!(lines, vec!["Erin walked."]);
        assert_eq!(store.occurrences_for_chapter(id).unwrap().len(), 1);
    }

    #[test]
    fn test_line_range_never_rebuilds_changed_chapter() {
        let store = seeded();
        let original = chapter(2, "Erin.\nLiscor.\nErin sat.");
        run_quiet(&store, &[original.clone()]);
        assert_eq!(store.count_occurrences().unwrap(), 3);

        let config = BuildConfig {
            line_range: Some(LineRange {
                chapter: 2,
                lines: 1..2,
            }),
            ..BuildConfig::default()
        };
        let mut op = ScriptedOperator::new([Scripted::Confirm(true)]);
        let outcome = run_with(
            &store,
            &mut op,
            config,
            DisambiguationFilter::default(),
            &[chapter(2, "Erin.\nLiscor!\nErin sat.")],
        );

        // Only the line conflict was asked about; nothing was purged
        assert_eq!(op.asked.len(), 1);
        assert!(!op.asked[0].contains("Purge"));
        assert_eq!(outcome.stats().chapters_rebuilt, 0);
        assert_eq!(outcome.stats().line_conflicts, 1);
        assert_eq!(store.count_occurrences().unwrap(), 3);

        let stored = store.chapter_by_number(2).unwrap().unwrap();
        assert_eq!(stored.digest, original.digest);
        assert_eq!(store.lines_for_chapter(stored.id).unwrap()[1].text, "Liscor.");
    }

    #[test]
    fn test_declined_conflict_aborts() {
        let store = seeded();
        run_quiet(&store, &[chapter(1, "Erin walked.")]);

        let mut op = ScriptedOperator::new([Scripted::Confirm(false), Scripted::Confirm(false)]);
        let mut builder =
            Builder::new(&store, &mut op, BuildConfig::default(), DisambiguationFilter::default()).unwrap();
        let result = builder.run(&[chapter(1, "Erin ran.")]);
        assert!(matches!(result, Err(BuildError::Conflict { chapter: 1, line: 0 })));
    }

    #[test]
    fn test_excluded_shapes_not_scanned() {
        assert_eq!(excluded_shape("   "), Some("blank"));
        assert_eq!(excluded_shape(r#"See <a href="https://x">[Warrior]</a>"#), Some("link markup"));
        assert_eq!(excluded_shape(r#"<img src="map.png">"#), Some("image markup"));
        assert_eq!(excluded_shape("<div class=\"chapter\">"), Some("block wrapper"));
        assert_eq!(excluded_shape("</div>"), Some("block wrapper"));
        assert_eq!(excluded_shape("A [Warrior] waved."), None);

        let store = seeded();
        let outcome = run_quiet(&store, &[chapter(1, "<div>\n[Warrior]\n<img src=\"a.png\"> [Warrior]\n</div>")]);
        assert_eq!(outcome.stats().lines_skipped, 3);
        assert_eq!(outcome.stats().persisted, 1);
    }

    #[test]
    fn test_color_attached_to_occurrence() {
        let store = seeded();
        let blood = store.get_or_create_color_category("Blood").unwrap().into_inner();
        let crimson = store.get_or_create_color("Crimson", "FF0000", blood.id).unwrap().into_inner();

        let text = r#"She used <span style="color:#FF0000">[Blood Magic]</span> and [Blood Magic]."#;
        run_quiet(&store, &[chapter(1, text)]);
        let occs = store.occurrences_for_chapter(stored_chapter(&store, 1)).unwrap();
        assert_eq!(occs.len(), 2);
        assert_eq!(occs[0].color_id, Some(crimson.id));
        assert_eq!(occs[1].color_id, None);
    }

    #[test]
    fn test_candidates_order_and_dedup() {
        let store = seeded();
        let mut op = NonInteractive;
        let builder =
            Builder::new(&store, &mut op, BuildConfig::default(), DisambiguationFilter::default()).unwrap();
        let found = builder.candidates("Erin Solstice met [Erin] in Liscor. Plain text.");
        let texts: Vec<&str> = found.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Erin Solstice", "[Erin]", "Erin", "Liscor"]);
        assert!(builder.candidates("Level 12! Skill Obtained!").is_empty());
    }

    #[test]
    fn test_same_span_from_two_name_lists_kept_once() {
        let store = seeded();
        store.get_or_create_ref_type("Liscor", RefCategory::Character).unwrap();
        let mut op = NonInteractive;
        let builder =
            Builder::new(&store, &mut op, BuildConfig::default(), DisambiguationFilter::default()).unwrap();
        let found = builder.candidates("Back in Liscor.");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, CandidateSource::Character);
    }

    #[test]
    fn test_custom_keywords_restrict_scan() {
        let store = seeded();
        let config = BuildConfig {
            keywords: Some(vec!["[Warrior]".to_string()]),
            ..BuildConfig::default()
        };
        let outcome = run_with(
            &store,
            &mut NonInteractive,
            config,
            DisambiguationFilter::default(),
            &[chapter(1, "Erin met a [Warrior] and an [Innkeeper].")],
        );
        assert_eq!(outcome.stats().candidates, 1);
        assert_eq!(outcome.stats().persisted, 1);
    }

    #[test]
    fn test_ambiguous_custom_keyword_is_config_error() {
        let store = seeded();
        store.get_or_create_ref_type("[Warrior]", RefCategory::Skill).unwrap();
        let config = BuildConfig {
            keywords: Some(vec!["[Warrior]".to_string()]),
            ..BuildConfig::default()
        };
        let mut op = NonInteractive;
        let result = Builder::new(&store, &mut op, config, DisambiguationFilter::default());
        assert!(matches!(
            result,
            Err(BuildError::Config(ConfigError::AmbiguousKeyword { .. }))
        ));
    }

    #[test]
    fn test_line_range_limits_processing() {
        let store = seeded();
        let config = BuildConfig {
            line_range: Some(LineRange {
                chapter: 2,
                lines: 1..2,
            }),
            ..BuildConfig::default()
        };
        let chapters = [
            chapter(1, "Erin."),
            chapter(2, "Erin.\nLiscor.\n[Warrior]."),
        ];
        let outcome = run_with(&store, &mut NonInteractive, config, DisambiguationFilter::default(), &chapters);
        assert_eq!(outcome.stats().chapters, 1);
        assert_eq!(outcome.stats().lines, 1);
        assert_eq!(outcome.stats().persisted, 1);
        assert!(store.chapter_by_number(1).unwrap().is_none());

        let missing = BuildConfig {
            line_range: Some(LineRange {
                chapter: 9,
                lines: 0..1,
            }),
            ..BuildConfig::default()
        };
        let mut op = NonInteractive;
        let mut builder = Builder::new(&store, &mut op, missing, DisambiguationFilter::default()).unwrap();
        assert!(matches!(builder.run(&chapters), Err(BuildError::MissingChapter(9))));
    }

    #[test]
    fn test_same_name_in_two_categories() {
        let store = seeded();
        store.get_or_create_ref_type("[Fireball]", RefCategory::Spell).unwrap();
        store.get_or_create_ref_type("[Fireball]", RefCategory::Skill).unwrap();
        let chapters = [chapter(1, "[Fireball]")];

        let outcome = run_quiet(&store, &chapters);
        assert_eq!(outcome.stats().state(OccurrenceState::Dropped), 1);
        assert_eq!(outcome.stats().integrity_errors.len(), 1);

        let mut op = ScriptedOperator::new([Scripted::Choose(0)]);
        let outcome = run_with(&store, &mut op, interactive(), DisambiguationFilter::default(), &chapters);
        assert_eq!(outcome.stats().persisted, 1);
    }
}
