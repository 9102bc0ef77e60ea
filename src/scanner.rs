use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::read_json;
use crate::error::ConfigError;

/// A chapter text file discovered in the corpus.
#[derive(Debug, Clone)]
pub struct ChapterFile {
    pub number: u32,
    /// File stem without the numeric prefix, e.g. "rooftops" for "0003_rooftops.txt"
    pub slug: String,
    pub path: PathBuf,
    /// Sidecar JSON with title/url/published, if present
    pub meta_path: Option<PathBuf>,
}

/// Optional sidecar next to a chapter file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChapterSidecar {
    pub title: Option<String>,
    pub url: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

/// One chapter as the pipeline consumes it: ordered lines plus a digest that
/// changes exactly when the text does.
#[derive(Debug, Clone)]
pub struct ChapterSource {
    pub number: u32,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub digest: String,
    pub word_count: usize,
    pub lines: Vec<String>,
}

impl ChapterSource {
    pub fn from_text(number: u32, title: &str, text: &str) -> Self {
        ChapterSource {
            number,
            title: title.to_string(),
            url: None,
            published: None,
            digest: digest(text),
            word_count: text.split_whitespace().count(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }
}

/// SHA-256 of the text, hex encoded.
pub fn digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Scan the corpus root and discover all chapter files, in chapter order.
///
/// Expected layout:
///   {root}/{NNNN}_{slug}.txt
///   {root}/{NNNN}_{slug}.json   (optional sidecar)
///
/// Volume subdirectories are allowed; files without a numeric prefix are
/// skipped.
pub fn scan_corpus(root: &Path) -> Vec<ChapterFile> {
    let mut results = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path().to_path_buf();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");

        let Some((number, slug)) = split_numeric_prefix(stem) else {
            debug!(file = %path.display(), "no chapter number; skipped");
            continue;
        };

        let sidecar = path.with_extension("json");
        results.push(ChapterFile {
            number,
            slug: slug.to_string(),
            meta_path: sidecar.is_file().then_some(sidecar),
            path,
        });
    }

    results.sort_by_key(|c| c.number);
    for pair in results.windows(2) {
        if pair[0].number == pair[1].number {
            warn!(
                kind = "warn",
                number = pair[0].number,
                first = %pair[0].path.display(),
                second = %pair[1].path.display(),
                "duplicate chapter number"
            );
        }
    }
    results
}

/// Read a chapter file and its sidecar.
pub fn load_chapter(file: &ChapterFile) -> Result<ChapterSource, ConfigError> {
    let text = std::fs::read_to_string(&file.path).map_err(|source| ConfigError::Read {
        path: file.path.clone(),
        source,
    })?;
    let sidecar: ChapterSidecar = match &file.meta_path {
        Some(p) => read_json(p)?,
        None => ChapterSidecar::default(),
    };

    let title = sidecar.title.unwrap_or_else(|| file.slug.replace('_', " "));
    let mut chapter = ChapterSource::from_text(file.number, &title, &text);
    chapter.url = sidecar.url;
    chapter.published = sidecar.published;
    Ok(chapter)
}

/// Split "0003_rooftops" into (3, "rooftops").
fn split_numeric_prefix(s: &str) -> Option<(u32, &str)> {
    let (prefix, rest) = s.split_once('_').unwrap_or((s, ""));
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    prefix.parse().ok().map(|n| (n, rest))
}
