//! Column/value maps staged for reads and writes.
//!
//! [`Values`] is the unit of data exchanged with the store: callers stage
//! pending column writes in one, and query results come back as one per row.
//! Values reuse `SQLite`'s own dynamic type, so staging and persisting never
//! disagree about representation.

use crate::error::{Error, Result};
use rusqlite::types::Value;
use rusqlite::Row;
use std::collections::BTreeMap;

/// An ordered column → value map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    map: BTreeMap<String, Value>,
}

impl Values {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no columns are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of columns present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the column is present (possibly as an explicit null).
    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.map.contains_key(column)
    }

    /// The raw value of a column, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.map.get(column)
    }

    /// Stage a raw value.
    pub fn put(&mut self, column: impl Into<String>, value: Value) -> &mut Self {
        self.map.insert(column.into(), value);
        self
    }

    /// Stage a text value.
    pub fn put_text(&mut self, column: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put(column, Value::Text(value.into()))
    }

    /// Stage an integer value.
    pub fn put_integer(&mut self, column: impl Into<String>, value: i64) -> &mut Self {
        self.put(column, Value::Integer(value))
    }

    /// Stage a boolean as 0/1.
    pub fn put_bool(&mut self, column: impl Into<String>, value: bool) -> &mut Self {
        self.put(column, Value::Integer(i64::from(value)))
    }

    /// Stage an explicit null.
    pub fn put_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.put(column, Value::Null)
    }

    /// Stage an optional integer as the value or an explicit null.
    pub fn put_opt_integer(&mut self, column: impl Into<String>, value: Option<i64>) -> &mut Self {
        match value {
            Some(v) => self.put_integer(column, v),
            None => self.put_null(column),
        }
    }

    /// Stage an optional text as the value or an explicit null.
    pub fn put_opt_text(&mut self, column: impl Into<String>, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => self.put_text(column, v),
            None => self.put_null(column),
        }
    }

    /// Remove a staged column, returning its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.map.remove(column)
    }

    /// The text value of a column.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is neither text nor null.
    pub fn text(&self, column: &str) -> Result<Option<&str>> {
        match self.map.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s)),
            Some(other) => Err(type_error(column, "text", other)),
        }
    }

    /// The integer value of a column.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is neither an integer nor null.
    pub fn integer(&self, column: &str) -> Result<Option<i64>> {
        match self.map.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(i)) => Ok(Some(*i)),
            Some(other) => Err(type_error(column, "integer", other)),
        }
    }

    /// The boolean value of a 0/1 column.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is not 0, 1 or null.
    pub fn flag(&self, column: &str) -> Result<Option<bool>> {
        match self.integer(column)? {
            None => Ok(None),
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            Some(other) => {
                Err(Error::validation(format!("column '{column}' must be 0 or 1, got {other}")))
            }
        }
    }

    /// Iterate over staged `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The staged column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Read a whole result row into a map keyed by the statement's column
    /// names.
    ///
    /// # Errors
    ///
    /// Returns a database error if a column cannot be read.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut values = Self::new();
        for (index, name) in row.as_ref().column_names().iter().enumerate() {
            values.put((*name).to_string(), row.get::<_, Value>(index)?);
        }
        Ok(values)
    }
}

impl<const N: usize> From<[(&str, Value); N]> for Values {
    fn from(entries: [(&str, Value); N]) -> Self {
        let mut values = Self::new();
        for (column, value) in entries {
            values.put(column, value);
        }
        values
    }
}

fn type_error(column: &str, expected: &str, got: &Value) -> Error {
    Error::validation(format!("column '{column}' must be {expected}, got {got:?}"))
}
