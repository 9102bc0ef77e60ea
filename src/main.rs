mod build;
mod color;
mod config;
mod context;
mod disambig;
mod error;
mod morph;
mod patterns;
mod prompt;
mod scanner;
mod seed;
mod store;
mod updates;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use reference_types::{CATEGORY_CODES_VERSION, RefCategory};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use build::{BuildOutcome, Builder, CancelToken, OccurrenceState};
use config::{BuildConfig, DisambiguationFile, Interactivity, LineRange, PaletteFile, WikiMetadata};
use disambig::DisambiguationFilter;
use error::StoreError;
use prompt::{ConsoleOperator, NonInteractive, Operator};
use store::Store;

const OUTPUT_DIR: &str = "output";

#[derive(Parser)]
#[command(
    name = "reference_extract",
    about = "Reference extraction and classification for web-novel chapters"
)]
struct Cli {
    /// SQLite database holding chapters, reference types and occurrences
    #[arg(long, global = true, default_value = "output/references.sqlite3")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed reference types/aliases from wiki metadata and colors from a palette
    Seed {
        /// Wiki metadata JSON (characters, locations, classes, ...)
        #[arg(long)]
        wiki: Option<PathBuf>,
        /// Color palette JSON
        #[arg(long)]
        palette: Option<PathBuf>,
    },
    /// Scan a chapter corpus and persist reference occurrences
    Build(BuildArgs),
    /// Merge one reference type into another, e.g. "Erin:CH" "Erin Solstice:CH"
    Merge {
        from: String,
        into: String,
        /// Keep the merged name as an alias of the target
        #[arg(long)]
        alias: bool,
    },
    /// Per-category counts of reference types and occurrences → output/report.json
    Report,
}

#[derive(Args)]
struct BuildArgs {
    /// Corpus root with NNNN_slug.txt chapter files
    #[arg(default_value = ".")]
    corpus: PathBuf,

    /// Disambiguation list JSON (phrases + exception patterns)
    #[arg(long)]
    disambiguation: Option<PathBuf>,

    /// Never prompt; every question is answered with a skip
    #[arg(long)]
    no_interactive: bool,

    #[arg(long)]
    no_disambiguation_prompt: bool,

    #[arg(long)]
    no_color_prompt: bool,

    #[arg(long)]
    no_type_prompt: bool,

    /// Scan only for the keywords listed in this file, one per line
    #[arg(long)]
    keywords: Option<PathBuf>,

    /// Re-process a single chapter (requires --lines)
    #[arg(long, requires = "lines")]
    chapter: Option<u32>,

    /// Line span within --chapter, "a..b" (end exclusive) or a single line
    #[arg(long, requires = "chapter")]
    lines: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Seed { wiki, palette } => run_seed(&cli.db, wiki.as_deref(), palette.as_deref()),
        Command::Build(args) => run_build(&cli.db, &args),
        Command::Merge { from, into, alias } => run_merge(&cli.db, &from, &into, alias),
        Command::Report => run_report(&cli.db),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  OUTPUT FILE HELPERS
// ═══════════════════════════════════════════════════════════════════════

fn output_path(name: &str) -> PathBuf {
    Path::new(OUTPUT_DIR).join(name)
}

fn write_json<T: Serialize>(name: &str, data: &T) -> Result<()> {
    let path = output_path(name);
    std::fs::create_dir_all(OUTPUT_DIR).with_context(|| format!("cannot create {OUTPUT_DIR}"))?;
    let json = serde_json::to_string_pretty(data)?;
    std::fs::write(&path, &json).with_context(|| format!("cannot write {}", path.display()))?;
    eprintln!("  {} ({} bytes)", path.display(), json.len());
    Ok(())
}

fn open_store(db: &Path) -> Result<Store> {
    if let Some(dir) = db.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    }
    Store::open(db).with_context(|| format!("cannot open database {}", db.display()))
}

// ═══════════════════════════════════════════════════════════════════════
//  SEED
// ═══════════════════════════════════════════════════════════════════════

fn run_seed(db: &Path, wiki: Option<&Path>, palette: Option<&Path>) -> Result<()> {
    if wiki.is_none() && palette.is_none() {
        bail!("nothing to seed: pass --wiki and/or --palette");
    }

    // Parse everything before the first write
    let wiki: Option<WikiMetadata> = wiki.map(config::read_json).transpose()?;
    let palette: Option<PaletteFile> = palette.map(config::read_json).transpose()?;
    if let Some(p) = &palette {
        seed::validate_palette(p)?;
    }

    let store = open_store(db)?;
    if let Some(meta) = &wiki {
        let stats = seed::seed_wiki(&store, meta)?;
        eprintln!(
            "Wiki: {} reference types created ({} existing), {} aliases created ({} existing, {} conflicting)",
            stats.ref_types_created,
            stats.ref_types_existing,
            stats.aliases_created,
            stats.aliases_existing,
            stats.alias_conflicts
        );
    }
    if let Some(p) = &palette {
        let stats = seed::seed_palette(&store, p)?;
        eprintln!(
            "Palette: {} colors created ({} existing)",
            stats.colors_created, stats.colors_existing
        );
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  BUILD
// ═══════════════════════════════════════════════════════════════════════

fn build_config(args: &BuildArgs) -> Result<BuildConfig> {
    let interactive = if args.no_interactive {
        Interactivity::none()
    } else {
        Interactivity {
            disambiguation: !args.no_disambiguation_prompt,
            color: !args.no_color_prompt,
            type_selection: !args.no_type_prompt,
        }
    };

    let keywords = args
        .keywords
        .as_deref()
        .map(config::read_keyword_list)
        .transpose()?;

    let line_range = match (args.chapter, &args.lines) {
        (Some(chapter), Some(span)) => Some(LineRange {
            chapter,
            lines: config::parse_line_span(span)?,
        }),
        _ => None,
    };

    Ok(BuildConfig {
        interactive,
        keywords,
        line_range,
    })
}

fn run_build(db: &Path, args: &BuildArgs) -> Result<()> {
    let config = build_config(args)?;
    let filter = match &args.disambiguation {
        Some(path) => {
            let file: DisambiguationFile = config::read_json(path)?;
            DisambiguationFilter::from_file(&file)?
        }
        None => DisambiguationFilter::default(),
    };
    if filter.is_empty() {
        info!(kind = "info", "no disambiguation list; every new bracket phrase is a candidate");
    } else {
        info!(kind = "info", phrases = filter.len(), "disambiguation list loaded");
    }

    let files = scanner::scan_corpus(&args.corpus);
    if files.is_empty() {
        bail!("no chapter files under {}", args.corpus.display());
    }
    let chapters = files
        .iter()
        .map(scanner::load_chapter)
        .collect::<Result<Vec<_>, _>>()?;
    eprintln!("Loaded {} chapters from {}", chapters.len(), args.corpus.display());

    let store = open_store(db)?;
    let prompts = config.interactive;
    let mut console;
    let mut quiet = NonInteractive;
    let operator: &mut dyn Operator = if args.no_interactive {
        &mut quiet
    } else {
        console = ConsoleOperator::stdio();
        &mut console
    };
    if prompts == Interactivity::none() && !args.no_interactive {
        warn!(kind = "warn", "all prompt stages disabled; integrity confirmations still prompt");
    }

    // First Ctrl-C stops at the next checkpoint, a second one exits
    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || {
        if handler.is_cancelled() {
            std::process::exit(130);
        }
        handler.cancel();
        eprintln!("\nStopping after the current step (Ctrl-C again to quit now)");
    })
    .context("cannot install Ctrl-C handler")?;

    let mut builder = Builder::new(&store, operator, config, filter)?.with_cancel(cancel);
    let outcome = builder.run(&chapters)?;
    let stats = outcome.stats();

    match &outcome {
        BuildOutcome::Completed(_) => info!(kind = "info", persisted = stats.persisted, "build complete"),
        BuildOutcome::Interrupted(_) => warn!(kind = "warn", persisted = stats.persisted, "build interrupted"),
    }
    eprintln!(
        "{} chapters, {} lines: {} occurrences persisted, {} already stored, {} new types, {} new aliases",
        stats.chapters, stats.lines, stats.persisted, stats.already_persisted, stats.new_types, stats.new_aliases
    );
    eprintln!(
        "  {} suppressed as prose, {} skipped, {} dropped",
        stats.state(OccurrenceState::Suppressed),
        stats.state(OccurrenceState::Skipped),
        stats.state(OccurrenceState::Dropped)
    );
    if !stats.integrity_errors.is_empty() {
        eprintln!("{} integrity errors (see log)", stats.integrity_errors.len());
    }

    #[derive(Serialize)]
    struct BuildReport<'a> {
        database: &'a str,
        interrupted: bool,
        stats: &'a build::BuildStats,
    }
    write_json(
        "build_report.json",
        &BuildReport {
            database: store.path(),
            interrupted: outcome.is_interrupted(),
            stats,
        },
    )
}

// ═══════════════════════════════════════════════════════════════════════
//  MERGE
// ═══════════════════════════════════════════════════════════════════════

/// Split "name:CODE" at the last colon.
fn parse_type_ref(s: &str) -> Result<(String, RefCategory)> {
    let Some((name, code)) = s.rsplit_once(':') else {
        bail!("expected name:CODE, got {s:?}");
    };
    let category = RefCategory::from_code(code.trim())
        .with_context(|| format!("unknown category code {code:?} (codes v{CATEGORY_CODES_VERSION})"))?;
    let name = name.trim();
    if name.is_empty() {
        bail!("empty name in {s:?}");
    }
    Ok((name.to_string(), category))
}

fn run_merge(db: &Path, from: &str, into: &str, alias: bool) -> Result<()> {
    let (from_name, from_cat) = parse_type_ref(from)?;
    let (into_name, into_cat) = parse_type_ref(into)?;

    let mut store = open_store(db)?;
    let lookup = |store: &Store, name: &str, category| -> Result<i64> {
        let rt = store
            .find_ref_type(name, category)?
            .ok_or_else(|| StoreError::MissingRefType {
                name: name.to_string(),
                category,
            })?;
        Ok(rt.id)
    };
    let from_id = lookup(&store, &from_name, from_cat)?;
    let into_id = lookup(&store, &into_name, into_cat)?;

    let report = store.merge_ref_types(from_id, into_id, alias)?;
    info!(
        kind = "updated",
        from = %from_name,
        into = %into_name,
        aliases = report.aliases_moved,
        occurrences = report.occurrences_moved,
        alias_created = report.alias_created,
        "merged reference type"
    );
    eprintln!(
        "Merged {from} into {into}: {} aliases and {} occurrences moved{}",
        report.aliases_moved,
        report.occurrences_moved,
        if report.alias_created { ", alias created" } else { "" }
    );
    let aliases: Vec<String> = store.aliases_for(into_id)?.into_iter().map(|a| a.name).collect();
    if !aliases.is_empty() {
        eprintln!("  {into_name} is now also known as: {}", aliases.join(", "));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  REPORT
// ═══════════════════════════════════════════════════════════════════════

fn run_report(db: &Path) -> Result<()> {
    let store = open_store(db)?;
    let counts = store.category_counts()?;

    for c in &counts {
        eprintln!(
            "  {} {:<18} {:>6} types {:>8} occurrences",
            c.category.code(),
            c.category.label(),
            c.ref_types,
            c.occurrences
        );
    }

    let palette = store.palette()?;
    eprintln!("  {} palette colors", palette.len());

    #[derive(Serialize)]
    struct Report<'a> {
        category_codes_version: u32,
        total_occurrences: usize,
        palette_colors: usize,
        categories: &'a [store::CategoryCount],
    }
    write_json(
        "report.json",
        &Report {
            category_codes_version: CATEGORY_CODES_VERSION,
            total_occurrences: store.count_occurrences()?,
            palette_colors: palette.len(),
            categories: &counts,
        },
    )
}
