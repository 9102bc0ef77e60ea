use std::path::PathBuf;

use reference_types::RefCategory;
use thiserror::Error;

/// Problems with seed files, rule files or run options. Always raised before
/// anything is written to the store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid exception pattern for {phrase}: {source}")]
    ExceptionPattern {
        phrase: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid color hex {hex:?} in palette category {category}")]
    ColorHex { category: String, hex: String },

    #[error("custom keyword {keyword} matches several categories: {categories:?}")]
    AmbiguousKeyword {
        keyword: String,
        categories: Vec<RefCategory>,
    },

    #[error("blank name or alias in {0} seed data")]
    BlankName(RefCategory),

    #[error("line range {0:?} is empty")]
    EmptyLineRange(String),

    #[error("cannot compile matcher: {0}")]
    Matcher(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("unknown category code {0:?} in storage")]
    UnknownCategory(String),

    #[error("no reference type {name} ({category})")]
    MissingRefType { name: String, category: RefCategory },

    #[error("cannot merge reference type {0} into itself")]
    SelfMerge(i64),
}

/// A lookup that would have to pick between identities which the uniqueness
/// rules say cannot both apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("{candidate} (from {keyword}) matches types in several categories: {categories:?}")]
    AmbiguousCategory {
        keyword: String,
        candidate: String,
        categories: Vec<RefCategory>,
    },
}

/// The operator stopped the run. Not an error: the committed prefix stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("interrupted by operator")]
pub struct Interrupted;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("chapter {chapter} line {line}: stored text differs and the operator declined to continue")]
    Conflict { chapter: u32, line: usize },

    #[error("chapter {0} is not part of the corpus")]
    MissingChapter(u32),
}

impl From<rusqlite::Error> for BuildError {
    fn from(e: rusqlite::Error) -> Self {
        BuildError::Store(StoreError::Sqlite(e))
    }
}

/// Why a stage that may both touch the store and prompt the operator
/// stopped short.
#[derive(Debug, Error)]
pub enum Halt {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}
