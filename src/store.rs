use std::path::Path;

use chrono::Utc;
use reference_types::{Alias, Chapter, Color, ColorCategory, Line, Occurrence, RefCategory, RefType};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

// ── Outcomes ─────────────────────────────────────────────────────────────

/// Result of a get-or-create keyed by a uniqueness constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert<T> {
    Created(T),
    Existing(T),
}

impl<T> Upsert<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Upsert::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Upsert::Created(t) | Upsert::Existing(t) => t,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Upsert::Created(t) | Upsert::Existing(t) => t,
        }
    }
}

/// How a freshly parsed chapter relates to what is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterSync {
    Created(Chapter),
    Unchanged(Chapter),
    /// Stored row still carries the old digest.
    Changed { stored: Chapter, fresh_digest: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSync {
    Created(Line),
    Existing(Line),
    /// Same position, different text. Nothing was written.
    Conflict { stored: Line },
}

/// Fields of a chapter as supplied by the source provider.
#[derive(Debug, Clone)]
pub struct ChapterMeta<'a> {
    pub number: u32,
    pub title: &'a str,
    pub url: Option<&'a str>,
    pub digest: &'a str,
    pub word_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOccurrence {
    pub line_id: i64,
    pub ref_type_id: i64,
    pub start: usize,
    pub end: usize,
    pub color_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub aliases_moved: usize,
    pub occurrences_moved: usize,
    pub alias_created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: RefCategory,
    pub ref_types: usize,
    pub occurrences: usize,
}

// ── Database ─────────────────────────────────────────────────────────────

pub struct Store {
    conn: Connection,
    path: String,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let conn = Connection::open(&path)?;
        let store = Store { conn, path: path_str };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Store { conn, path: ":memory:".to_string() };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS chapters (
                id INTEGER PRIMARY KEY,
                number INTEGER NOT NULL UNIQUE,
                title TEXT NOT NULL,
                url TEXT,
                digest TEXT NOT NULL,
                word_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS lines (
                id INTEGER PRIMARY KEY,
                chapter_id INTEGER NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
                line_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                UNIQUE (chapter_id, line_number)
            );

            CREATE TABLE IF NOT EXISTS ref_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (name, category)
            );

            CREATE TABLE IF NOT EXISTS aliases (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                ref_type_id INTEGER NOT NULL REFERENCES ref_types(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS color_categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS colors (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                hex TEXT NOT NULL,
                category_id INTEGER NOT NULL REFERENCES color_categories(id) ON DELETE CASCADE,
                UNIQUE (hex, category_id)
            );

            -- Span offsets are bytes into lines.text
            CREATE TABLE IF NOT EXISTS occurrences (
                id INTEGER PRIMARY KEY,
                line_id INTEGER NOT NULL REFERENCES lines(id) ON DELETE CASCADE,
                ref_type_id INTEGER NOT NULL REFERENCES ref_types(id),
                span_start INTEGER NOT NULL,
                span_end INTEGER NOT NULL,
                color_id INTEGER REFERENCES colors(id),
                CHECK (span_start >= 0 AND span_start < span_end),
                UNIQUE (line_id, span_start, span_end)
            );

            CREATE INDEX IF NOT EXISTS idx_ref_types_name ON ref_types(name);
            CREATE INDEX IF NOT EXISTS idx_aliases_ref_type ON aliases(ref_type_id);
            CREATE INDEX IF NOT EXISTS idx_occurrences_ref_type ON occurrences(ref_type_id);
            CREATE INDEX IF NOT EXISTS idx_colors_hex ON colors(hex);
            ",
        )?;
        Ok(())
    }

    // ── Chapters and lines ───────────────────────────────────────────────

    pub fn chapter_by_number(&self, number: u32) -> Result<Option<Chapter>> {
        let chapter = self
            .conn
            .query_row(
                "SELECT id, number, title, url, digest, word_count FROM chapters WHERE number = ?1",
                params![number],
                row_to_chapter,
            )
            .optional()?;
        Ok(chapter)
    }

    /// Insert a chapter, or report whether its stored digest still matches.
    pub fn sync_chapter(&self, meta: &ChapterMeta<'_>) -> Result<ChapterSync> {
        if let Some(stored) = self.chapter_by_number(meta.number)? {
            if stored.digest == meta.digest {
                return Ok(ChapterSync::Unchanged(stored));
            }
            return Ok(ChapterSync::Changed {
                stored,
                fresh_digest: meta.digest.to_string(),
            });
        }

        let now = Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO chapters (number, title, url, digest, word_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                meta.number,
                meta.title,
                meta.url,
                meta.digest,
                meta.word_count as i64,
                now
            ],
        )?;
        let chapter = Chapter {
            id: self.conn.last_insert_rowid(),
            number: meta.number,
            title: meta.title.to_string(),
            url: meta.url.map(str::to_string),
            digest: meta.digest.to_string(),
            word_count: meta.word_count,
        };
        Ok(ChapterSync::Created(chapter))
    }

    /// Replace a chapter's stored content in one transaction: purge its
    /// occurrences, swap in the fresh `lines` (line number, text) and stamp
    /// the new digest. Positions absent from `lines` are dropped. Returns the
    /// number of occurrences purged.
    ///
    /// After this the chapter reads like a newly created one, so a scan
    /// interrupted later restarts from the persisted prefix.
    pub fn rebuild_chapter(&self, chapter_id: i64, meta: &ChapterMeta<'_>, lines: &[(usize, &str)]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let purged = tx.execute(
            "DELETE FROM occurrences WHERE line_id IN (SELECT id FROM lines WHERE chapter_id = ?1)",
            params![chapter_id],
        )?;
        tx.execute("DELETE FROM lines WHERE chapter_id = ?1", params![chapter_id])?;
        {
            let mut insert =
                tx.prepare("INSERT INTO lines (chapter_id, line_number, text) VALUES (?1, ?2, ?3)")?;
            for (line_number, text) in lines {
                insert.execute(params![chapter_id, *line_number as i64, *text])?;
            }
        }
        tx.execute(
            "UPDATE chapters SET title = ?2, url = ?3, digest = ?4, word_count = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                chapter_id,
                meta.title,
                meta.url,
                meta.digest,
                meta.word_count as i64,
                Utc::now().timestamp()
            ],
        )?;
        tx.commit()?;
        Ok(purged)
    }

    pub fn sync_line(&self, chapter_id: i64, line_number: usize, text: &str) -> Result<LineSync> {
        let stored = self
            .conn
            .query_row(
                "SELECT id, chapter_id, line_number, text FROM lines
                 WHERE chapter_id = ?1 AND line_number = ?2",
                params![chapter_id, line_number as i64],
                row_to_line,
            )
            .optional()?;

        match stored {
            Some(line) if line.text == text => Ok(LineSync::Existing(line)),
            Some(line) => Ok(LineSync::Conflict { stored: line }),
            None => {
                self.conn.execute(
                    "INSERT INTO lines (chapter_id, line_number, text) VALUES (?1, ?2, ?3)",
                    params![chapter_id, line_number as i64, text],
                )?;
                Ok(LineSync::Created(Line {
                    id: self.conn.last_insert_rowid(),
                    chapter_id,
                    line_number,
                    text: text.to_string(),
                }))
            }
        }
    }

    pub fn lines_for_chapter(&self, chapter_id: i64) -> Result<Vec<Line>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, chapter_id, line_number, text FROM lines
             WHERE chapter_id = ?1 ORDER BY line_number",
        )?;
        let lines = stmt
            .query_map(params![chapter_id], row_to_line)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lines)
    }

    // ── Reference types and aliases ──────────────────────────────────────

    pub fn ref_type(&self, id: i64) -> Result<Option<RefType>> {
        let rt = self
            .conn
            .query_row(
                "SELECT id, name, category FROM ref_types WHERE id = ?1",
                params![id],
                row_to_ref_type,
            )
            .optional()?;
        Ok(rt)
    }

    pub fn find_ref_type(&self, name: &str, category: RefCategory) -> Result<Option<RefType>> {
        let rt = self
            .conn
            .query_row(
                "SELECT id, name, category FROM ref_types WHERE name = ?1 AND category = ?2",
                params![name, category.code()],
                row_to_ref_type,
            )
            .optional()?;
        Ok(rt)
    }

    /// All types with this exact name, across categories.
    pub fn ref_types_named(&self, name: &str) -> Result<Vec<RefType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, category FROM ref_types WHERE name = ?1 ORDER BY id")?;
        let types = stmt
            .query_map(params![name], row_to_ref_type)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(types)
    }

    pub fn all_ref_types(&self) -> Result<Vec<RefType>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, category FROM ref_types ORDER BY id")?;
        let types = stmt
            .query_map([], row_to_ref_type)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(types)
    }

    pub fn get_or_create_ref_type(&self, name: &str, category: RefCategory) -> Result<Upsert<RefType>> {
        let inserted = self.conn.execute(
            "INSERT INTO ref_types (name, category, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (name, category) DO NOTHING",
            params![name, category.code(), Utc::now().timestamp()],
        )?;
        if inserted == 1 {
            return Ok(Upsert::Created(RefType {
                id: self.conn.last_insert_rowid(),
                name: name.to_string(),
                category,
            }));
        }
        match self.find_ref_type(name, category)? {
            Some(rt) => Ok(Upsert::Existing(rt)),
            None => Err(StoreError::MissingRefType {
                name: name.to_string(),
                category,
            }),
        }
    }

    pub fn alias(&self, name: &str) -> Result<Option<Alias>> {
        let alias = self
            .conn
            .query_row(
                "SELECT id, name, ref_type_id FROM aliases WHERE name = ?1",
                params![name],
                row_to_alias,
            )
            .optional()?;
        Ok(alias)
    }

    pub fn all_aliases(&self) -> Result<Vec<Alias>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, ref_type_id FROM aliases ORDER BY id")?;
        let aliases = stmt
            .query_map([], row_to_alias)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(aliases)
    }

    pub fn aliases_for(&self, ref_type_id: i64) -> Result<Vec<Alias>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, ref_type_id FROM aliases WHERE ref_type_id = ?1 ORDER BY id",
        )?;
        let aliases = stmt
            .query_map(params![ref_type_id], row_to_alias)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(aliases)
    }

    /// Alias names are global. An existing alias is returned untouched even
    /// when it points at a different type; the caller decides what that means.
    pub fn get_or_create_alias(&self, name: &str, ref_type_id: i64) -> Result<Upsert<Alias>> {
        let inserted = self.conn.execute(
            "INSERT INTO aliases (name, ref_type_id) VALUES (?1, ?2) ON CONFLICT (name) DO NOTHING",
            params![name, ref_type_id],
        )?;
        if inserted == 1 {
            return Ok(Upsert::Created(Alias {
                id: self.conn.last_insert_rowid(),
                name: name.to_string(),
                ref_type_id,
            }));
        }
        let existing = self.conn.query_row(
            "SELECT id, name, ref_type_id FROM aliases WHERE name = ?1",
            params![name],
            row_to_alias,
        )?;
        Ok(Upsert::Existing(existing))
    }

    /// Move every alias and occurrence of `from` onto `into` and delete
    /// `from`. With `create_alias`, `from`'s name becomes an alias of `into`.
    pub fn merge_ref_types(&mut self, from: i64, into: i64, create_alias: bool) -> Result<MergeReport> {
        if from == into {
            return Err(StoreError::SelfMerge(from));
        }
        let from_type = self.ref_type(from)?.ok_or_else(|| StoreError::MissingRefType {
            name: format!("#{from}"),
            category: RefCategory::Undecided,
        })?;
        if self.ref_type(into)?.is_none() {
            return Err(StoreError::MissingRefType {
                name: format!("#{into}"),
                category: RefCategory::Undecided,
            });
        }

        let tx = self.conn.transaction()?;
        let aliases_moved = tx.execute(
            "UPDATE aliases SET ref_type_id = ?2 WHERE ref_type_id = ?1",
            params![from, into],
        )?;
        let occurrences_moved = tx.execute(
            "UPDATE occurrences SET ref_type_id = ?2 WHERE ref_type_id = ?1",
            params![from, into],
        )?;
        tx.execute("DELETE FROM ref_types WHERE id = ?1", params![from])?;

        let mut alias_created = false;
        if create_alias {
            // An alias already carrying the old name is repointed, not duplicated.
            let updated = tx.execute(
                "UPDATE aliases SET ref_type_id = ?2 WHERE name = ?1",
                params![from_type.name, into],
            )?;
            if updated == 0 {
                tx.execute(
                    "INSERT INTO aliases (name, ref_type_id) VALUES (?1, ?2)",
                    params![from_type.name, into],
                )?;
                alias_created = true;
            }
        }
        tx.commit()?;

        Ok(MergeReport {
            aliases_moved,
            occurrences_moved,
            alias_created,
        })
    }

    // ── Occurrences ──────────────────────────────────────────────────────

    pub fn occurrence_at(&self, line_id: i64, start: usize, end: usize) -> Result<Option<Occurrence>> {
        let occ = self
            .conn
            .query_row(
                "SELECT id, line_id, ref_type_id, span_start, span_end, color_id FROM occurrences
                 WHERE line_id = ?1 AND span_start = ?2 AND span_end = ?3",
                params![line_id, start as i64, end as i64],
                row_to_occurrence,
            )
            .optional()?;
        Ok(occ)
    }

    /// Insert unless (line, start, end) is already taken.
    pub fn insert_occurrence(&self, new: &NewOccurrence) -> Result<Upsert<Occurrence>> {
        let inserted = self.conn.execute(
            "INSERT INTO occurrences (line_id, ref_type_id, span_start, span_end, color_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (line_id, span_start, span_end) DO NOTHING",
            params![
                new.line_id,
                new.ref_type_id,
                new.start as i64,
                new.end as i64,
                new.color_id
            ],
        )?;
        if inserted == 1 {
            return Ok(Upsert::Created(Occurrence {
                id: self.conn.last_insert_rowid(),
                line_id: new.line_id,
                ref_type_id: new.ref_type_id,
                start: new.start,
                end: new.end,
                color_id: new.color_id,
            }));
        }
        let existing = self.conn.query_row(
            "SELECT id, line_id, ref_type_id, span_start, span_end, color_id FROM occurrences
             WHERE line_id = ?1 AND span_start = ?2 AND span_end = ?3",
            params![new.line_id, new.start as i64, new.end as i64],
            row_to_occurrence,
        )?;
        Ok(Upsert::Existing(existing))
    }

    pub fn occurrences_for_chapter(&self, chapter_id: i64) -> Result<Vec<Occurrence>> {
        let mut stmt = self.conn.prepare(
            "SELECT o.id, o.line_id, o.ref_type_id, o.span_start, o.span_end, o.color_id
             FROM occurrences o JOIN lines l ON l.id = o.line_id
             WHERE l.chapter_id = ?1
             ORDER BY l.line_number, o.span_start, o.span_end",
        )?;
        let occs = stmt
            .query_map(params![chapter_id], row_to_occurrence)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(occs)
    }

    pub fn occurrences_for_ref_type(&self, ref_type_id: i64) -> Result<Vec<Occurrence>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, line_id, ref_type_id, span_start, span_end, color_id FROM occurrences
             WHERE ref_type_id = ?1 ORDER BY id",
        )?;
        let occs = stmt
            .query_map(params![ref_type_id], row_to_occurrence)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(occs)
    }

    pub fn count_occurrences(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM occurrences", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn category_counts(&self) -> Result<Vec<CategoryCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.category, COUNT(DISTINCT t.id), COUNT(o.id)
             FROM ref_types t LEFT JOIN occurrences o ON o.ref_type_id = t.id
             GROUP BY t.category ORDER BY t.category",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(CategoryCount {
                    category: category_at(row, 0)?,
                    ref_types: row.get::<_, i64>(1)? as usize,
                    occurrences: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    // ── Colors ───────────────────────────────────────────────────────────

    pub fn get_or_create_color_category(&self, name: &str) -> Result<Upsert<ColorCategory>> {
        let inserted = self.conn.execute(
            "INSERT INTO color_categories (name) VALUES (?1) ON CONFLICT (name) DO NOTHING",
            params![name],
        )?;
        if inserted == 1 {
            return Ok(Upsert::Created(ColorCategory {
                id: self.conn.last_insert_rowid(),
                name: name.to_string(),
            }));
        }
        let existing = self.conn.query_row(
            "SELECT id, name FROM color_categories WHERE name = ?1",
            params![name],
            |row| {
                Ok(ColorCategory {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;
        Ok(Upsert::Existing(existing))
    }

    pub fn get_or_create_color(&self, name: &str, hex: &str, category_id: i64) -> Result<Upsert<Color>> {
        let inserted = self.conn.execute(
            "INSERT INTO colors (name, hex, category_id) VALUES (?1, ?2, ?3)
             ON CONFLICT (hex, category_id) DO NOTHING",
            params![name, hex, category_id],
        )?;
        if inserted == 1 {
            return Ok(Upsert::Created(Color {
                id: self.conn.last_insert_rowid(),
                name: name.to_string(),
                hex: hex.to_string(),
                category_id,
            }));
        }
        let existing = self.conn.query_row(
            "SELECT id, name, hex, category_id FROM colors WHERE hex = ?1 AND category_id = ?2",
            params![hex, category_id],
            row_to_color,
        )?;
        Ok(Upsert::Existing(existing))
    }

    /// Every palette entry with this hex, paired with its category name.
    pub fn colors_by_hex(&self, hex: &str) -> Result<Vec<(Color, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.hex, c.category_id, k.name
             FROM colors c JOIN color_categories k ON k.id = c.category_id
             WHERE c.hex = ?1 ORDER BY c.id",
        )?;
        let colors = stmt
            .query_map(params![hex], |row| Ok((row_to_color(row)?, row.get(4)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(colors)
    }

    /// Whole palette, with category names, in insertion order.
    pub fn palette(&self) -> Result<Vec<(Color, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, c.hex, c.category_id, k.name
             FROM colors c JOIN color_categories k ON k.id = c.category_id
             ORDER BY c.id",
        )?;
        let colors = stmt
            .query_map([], |row| Ok((row_to_color(row)?, row.get(4)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(colors)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────

fn category_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<RefCategory> {
    let code: String = row.get(idx)?;
    RefCategory::from_code(&code).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            Box::new(StoreError::UnknownCategory(code)),
        )
    })
}

fn row_to_chapter(row: &Row<'_>) -> rusqlite::Result<Chapter> {
    Ok(Chapter {
        id: row.get(0)?,
        number: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        digest: row.get(4)?,
        word_count: row.get::<_, i64>(5)? as usize,
    })
}

fn row_to_line(row: &Row<'_>) -> rusqlite::Result<Line> {
    Ok(Line {
        id: row.get(0)?,
        chapter_id: row.get(1)?,
        line_number: row.get::<_, i64>(2)? as usize,
        text: row.get(3)?,
    })
}

fn row_to_ref_type(row: &Row<'_>) -> rusqlite::Result<RefType> {
    Ok(RefType {
        id: row.get(0)?,
        name: row.get(1)?,
        category: category_at(row, 2)?,
    })
}

fn row_to_alias(row: &Row<'_>) -> rusqlite::Result<Alias> {
    Ok(Alias {
        id: row.get(0)?,
        name: row.get(1)?,
        ref_type_id: row.get(2)?,
    })
}

fn row_to_occurrence(row: &Row<'_>) -> rusqlite::Result<Occurrence> {
    Ok(Occurrence {
        id: row.get(0)?,
        line_id: row.get(1)?,
        ref_type_id: row.get(2)?,
        start: row.get::<_, i64>(3)? as usize,
        end: row.get::<_, i64>(4)? as usize,
        color_id: row.get(5)?,
    })
}

fn row_to_color(row: &Row<'_>) -> rusqlite::Result<Color> {
    Ok(Color {
        id: row.get(0)?,
        name: row.get(1)?,
        hex: row.get(2)?,
        category_id: row.get(3)?,
    })
}
