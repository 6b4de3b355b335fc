//! Logical resource paths and their query parameters.
//!
//! Collaborators address the store through paths like `tasks/5` or
//! `tasks/search?q=milk&caller_is_privileged=true`. Parsing is strict:
//! unknown segments and parameters are rejected rather than ignored.

use crate::error::{Error, Result};
use rusqlite::types::Value;

/// The addressed table, view or row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// All task lists.
    Lists,
    /// One task list.
    List(i64),
    /// All tasks.
    Tasks,
    /// One task.
    Task(i64),
    /// Relevance-ranked task search.
    TaskSearch,
    /// All instances.
    Instances,
    /// One instance.
    Instance(i64),
    /// All properties.
    Properties,
    /// One property.
    Property(i64),
    /// All categories.
    Categories,
    /// One category.
    Category(i64),
    /// All alarms.
    Alarms,
    /// One alarm.
    Alarm(i64),
    /// Per-account sync state.
    SyncState,
    /// One sync state row.
    SyncStateItem(i64),
}

/// Recognized query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    /// The caller acts on behalf of the data owner (sync adapter rights).
    pub privileged: bool,
    /// Join properties into task query results.
    pub load_properties: bool,
    /// Scope rows to one account (required for sync state).
    pub account_name: Option<String>,
    /// Scope rows to one account (required for sync state).
    pub account_type: Option<String>,
    /// The search string for `tasks/search`.
    pub q: Option<String>,
}

/// A parsed resource path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// The addressed target.
    pub target: Target,
    /// The query parameters.
    pub params: Params,
}

impl Resource {
    /// A resource with default parameters.
    #[must_use]
    pub fn of(target: Target) -> Self {
        Self { target, params: Params::default() }
    }

    /// Grant the caller sync adapter rights.
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.params.privileged = true;
        self
    }

    /// Scope to an account.
    #[must_use]
    pub fn account(mut self, name: &str, account_type: &str) -> Self {
        self.params.account_name = Some(name.to_string());
        self.params.account_type = Some(account_type.to_string());
        self
    }

    /// Parse a path like `tasks/5?caller_is_privileged=true`.
    ///
    /// # Errors
    ///
    /// Returns a validation error on unknown paths or parameters.
    pub fn parse(path: &str) -> Result<Self> {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let target = match segments.as_slice() {
            ["lists"] => Target::Lists,
            ["lists", id] => Target::List(parse_id(id)?),
            ["tasks"] => Target::Tasks,
            ["tasks", "search"] => Target::TaskSearch,
            ["tasks", id] => Target::Task(parse_id(id)?),
            ["instances"] => Target::Instances,
            ["instances", id] => Target::Instance(parse_id(id)?),
            ["properties"] => Target::Properties,
            ["properties", id] => Target::Property(parse_id(id)?),
            ["categories"] => Target::Categories,
            ["categories", id] => Target::Category(parse_id(id)?),
            ["alarms"] => Target::Alarms,
            ["alarms", id] => Target::Alarm(parse_id(id)?),
            ["syncstate"] => Target::SyncState,
            ["syncstate", id] => Target::SyncStateItem(parse_id(id)?),
            _ => return Err(Error::validation(format!("unknown resource path '{path}'"))),
        };

        let mut params = Params::default();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                let value = decode(value)?;
                match key {
                    "caller_is_privileged" => params.privileged = parse_bool(&value)?,
                    "load_properties" => params.load_properties = parse_bool(&value)?,
                    "account_name" => params.account_name = Some(value),
                    "account_type" => params.account_type = Some(value),
                    "q" => params.q = Some(value),
                    other => {
                        return Err(Error::validation(format!(
                            "unknown query parameter '{other}'"
                        )))
                    }
                }
            }
        }
        Ok(Self { target, params })
    }
}

fn parse_id(text: &str) -> Result<i64> {
    text.parse::<i64>()
        .map_err(|_| Error::validation(format!("'{text}' is not a row id")))
}

fn parse_bool(text: &str) -> Result<bool> {
    match text {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(Error::validation(format!("'{other}' is not a boolean"))),
    }
}

/// Minimal percent decoding; `+` decodes to a space.
fn decode(text: &str) -> Result<String> {
    let bad = || Error::validation(format!("malformed query value '{text}'"));
    let mut out = String::with_capacity(text.len());
    let mut bytes = text.bytes();
    let mut buffer = Vec::new();
    while let Some(byte) = bytes.next() {
        match byte {
            b'+' => buffer.push(b' '),
            b'%' => {
                let high = bytes.next().ok_or_else(|| bad())?;
                let low = bytes.next().ok_or_else(|| bad())?;
                let hex = [high, low];
                let hex = std::str::from_utf8(&hex).map_err(|_| bad())?;
                buffer.push(u8::from_str_radix(hex, 16).map_err(|_| bad())?);
            }
            other => buffer.push(other),
        }
    }
    out.push_str(std::str::from_utf8(&buffer).map_err(|_| bad())?);
    Ok(out)
}

/// An extra SQL restriction for selection-addressed updates, deletes and
/// queries, with positional arguments.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// The SQL fragment, e.g. `status = ? AND priority > ?`.
    pub clause: String,
    /// Arguments for the fragment's placeholders.
    pub args: Vec<Value>,
}

impl Selection {
    /// Build a selection.
    #[must_use]
    pub fn new(clause: impl Into<String>, args: Vec<Value>) -> Self {
        Self { clause: clause.into(), args }
    }
}
