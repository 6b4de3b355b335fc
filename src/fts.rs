//! N-gram full-text search.
//!
//! Task text is tokenized into overlapping 3-grams (every word, with a
//! leading space so word beginnings weigh slightly more) and 4-grams (only
//! for words longer than three characters; shorter words are fully covered
//! by the trigrams). Each distinct n-gram is interned once in the `ngrams`
//! table and linked to `(task, property, kind)` triples in
//! `search_content`. Re-indexing diffs the link set instead of recreating
//! it, so n-gram ids stay stable under concurrent readers.

use crate::error::Result;
use crate::schema::tables;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};

/// Matches anything that does not belong to a word or number.
static SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{M}\p{N}]+").expect("separator pattern is valid"));

/// Minimum fraction of query n-grams a task must match to be returned.
pub const MIN_SCORE: f64 = 0.33;

/// N-gram id sets are looked up in chunks of this size to stay below the
/// statement parameter limit.
pub const QUERY_CHUNK_SIZE: usize = 500;

/// What kind of text produced a search entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    /// The task title.
    Title,
    /// The task description.
    Description,
    /// The task location.
    Location,
    /// A property's searchable text.
    Property,
}

impl SearchKind {
    /// The stored discriminator.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Title => 1,
            Self::Description => 2,
            Self::Location => 3,
            Self::Property => 4,
        }
    }
}

/// Generator for the n-grams of a string.
#[derive(Debug, Clone, Copy)]
pub struct NGramGenerator {
    n: usize,
    min_word_len: usize,
    add_space_in_front: bool,
}

impl NGramGenerator {
    /// A generator for n-grams of words at least `min_word_len` characters
    /// long.
    #[must_use]
    pub const fn new(n: usize, min_word_len: usize) -> Self {
        Self { n, min_word_len, add_space_in_front: false }
    }

    /// Also index each word's beginning with a space in front.
    #[must_use]
    pub const fn with_space_in_front(mut self) -> Self {
        self.add_space_in_front = true;
        self
    }

    /// Collect all n-grams of `text` into `ngrams`.
    pub fn ngrams_into(&self, ngrams: &mut HashSet<String>, text: &str) {
        let lowered = text.to_lowercase();
        for word in SEPARATOR.split(&lowered).filter(|w| !w.is_empty()) {
            self.word_ngrams(ngrams, word);
        }
    }

    /// All n-grams of `text`.
    #[must_use]
    pub fn ngrams(&self, text: &str) -> HashSet<String> {
        let mut result = HashSet::new();
        self.ngrams_into(&mut result, text);
        result
    }

    fn word_ngrams(&self, ngrams: &mut HashSet<String>, word: &str) {
        let chars: Vec<char> = word.chars().collect();
        let len = chars.len();
        if len < self.min_word_len {
            return;
        }
        let last = std::cmp::max(1, (len + 1).saturating_sub(self.n));
        for i in 0..last {
            ngrams.insert(chars[i..std::cmp::min(i + self.n, len)].iter().collect());
        }
        if self.add_space_in_front {
            let mut front = String::with_capacity(self.n);
            front.push(' ');
            front.extend(&chars[..std::cmp::min(len, self.n - 1)]);
            ngrams.insert(front);
        }
    }
}

/// The trigram generator used for indexing and querying.
static TRIGRAMS: NGramGenerator = NGramGenerator::new(3, 1).with_space_in_front();

/// The tetragram generator; words of up to three characters are already
/// fully covered by the trigrams.
static TETRAGRAMS: NGramGenerator = NGramGenerator::new(4, 4).with_space_in_front();

/// The combined n-gram set of a piece of text.
#[must_use]
pub fn text_ngrams(text: &str) -> HashSet<String> {
    let mut set = TRIGRAMS.ngrams(text);
    TETRAGRAMS.ngrams_into(&mut set, text);
    set
}

/// Sync the search entry for `(task, property, kind)` to `text`.
///
/// Passing `None` or empty text removes the entry. Existing links are
/// diffed against the new n-gram set; only the difference is written.
///
/// # Errors
///
/// Returns a database error if the sync fails.
pub fn update_entry(
    conn: &Connection,
    task_id: i64,
    property_id: Option<i64>,
    kind: SearchKind,
    text: Option<&str>,
) -> Result<()> {
    let wanted_ngrams = text.map(text_ngrams).unwrap_or_default();
    let wanted: HashSet<i64> = intern_ngrams(conn, &wanted_ngrams)?;

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT ngram_id FROM {} WHERE task_id = ?1 AND kind = ?2 AND property_id IS ?3",
        tables::SEARCH_CONTENT
    ))?;
    let existing: HashSet<i64> = stmt
        .query_map(params![task_id, kind.as_i64(), property_id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    let stale: Vec<i64> = existing.difference(&wanted).copied().collect();
    for chunk in stale.chunks(QUERY_CHUNK_SIZE) {
        let placeholders = vec!["?"; chunk.len()].join(",");
        let sql = format!(
            "DELETE FROM {} WHERE task_id = ?1 AND kind = ?2 AND property_id IS ?3
             AND ngram_id IN ({placeholders})",
            tables::SEARCH_CONTENT
        );
        let mut args: Vec<Value> =
            vec![Value::Integer(task_id), Value::Integer(kind.as_i64()), property_id.into()];
        args.extend(chunk.iter().map(|id| Value::Integer(*id)));
        conn.execute(&sql, rusqlite::params_from_iter(args))?;
    }

    let mut insert = conn.prepare_cached(&format!(
        "INSERT INTO {} (task_id, property_id, kind, ngram_id) VALUES (?1, ?2, ?3, ?4)",
        tables::SEARCH_CONTENT
    ))?;
    for ngram_id in wanted.difference(&existing) {
        insert.execute(params![task_id, property_id, kind.as_i64(), ngram_id])?;
    }
    Ok(())
}

/// Remove every search entry of a task.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub fn delete_task_entries(conn: &Connection, task_id: i64) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE task_id = ?1", tables::SEARCH_CONTENT),
        params![task_id],
    )?;
    Ok(())
}

/// Map each n-gram to its stable id, interning new ones.
fn intern_ngrams(conn: &Connection, ngrams: &HashSet<String>) -> Result<HashSet<i64>> {
    let mut ids = HashSet::with_capacity(ngrams.len());
    let mut select = conn.prepare_cached(&format!(
        "SELECT ngram_id FROM {} WHERE ngram_text = ?1",
        tables::NGRAMS
    ))?;
    let mut insert = conn.prepare_cached(&format!(
        "INSERT OR IGNORE INTO {} (ngram_text) VALUES (?1)",
        tables::NGRAMS
    ))?;
    for ngram in ngrams {
        let existing: Option<i64> =
            select.query_row(params![ngram], |row| row.get(0)).optional()?;
        if let Some(id) = existing {
            ids.insert(id);
        } else {
            insert.execute(params![ngram])?;
            let id = select.query_row(params![ngram], |row| row.get(0))?;
            ids.insert(id);
        }
    }
    Ok(ids)
}

/// Score all visible, non-deleted tasks against a search string.
///
/// The score of a task is the fraction of the query's distinct n-grams it
/// matches; only tasks scoring at least [`MIN_SCORE`] are returned, best
/// first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub fn search_task_ids(conn: &Connection, query: &str) -> Result<Vec<(i64, f64)>> {
    let ngrams: Vec<String> = text_ngrams(query).into_iter().collect();
    if ngrams.is_empty() {
        return Ok(Vec::new());
    }
    #[allow(clippy::cast_precision_loss)]
    let total = ngrams.len() as f64;

    let mut matched: HashMap<i64, i64> = HashMap::new();
    for chunk in ngrams.chunks(QUERY_CHUNK_SIZE) {
        let placeholders = vec!["?"; chunk.len()].join(",");
        let sql = format!(
            "SELECT sc.task_id, count(DISTINCT sc.ngram_id)
             FROM {ngrams} n
             JOIN {content} sc ON (sc.ngram_id = n.ngram_id)
             WHERE n.ngram_text IN ({placeholders})
               AND sc.task_id IN
                   (SELECT _id FROM {task_view} WHERE _deleted = 0 AND visible = 1)
             GROUP BY sc.task_id",
            ngrams = tables::NGRAMS,
            content = tables::SEARCH_CONTENT,
            task_view = tables::TASK_VIEW,
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(chunk.iter().map(|n| Value::Text(n.clone()))),
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        for row in rows {
            let (task_id, count) = row?;
            *matched.entry(task_id).or_insert(0) += count;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let mut scored: Vec<(i64, f64)> = matched
        .into_iter()
        .map(|(task_id, count)| (task_id, (count as f64 / total).min(1.0)))
        .filter(|(_, score)| *score >= MIN_SCORE)
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.0.cmp(&b.0)));
    Ok(scored)
}
