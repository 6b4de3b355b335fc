//! The property entity adapter.

use crate::error::{Error, Result};
use crate::model::Staged;
use crate::schema::properties as cols;
use crate::values::Values;
use rusqlite::types::Value;

/// A property row staged for a write.
#[derive(Debug, Clone, Default)]
pub struct PropertyAdapter {
    id: Option<i64>,
    staged: Staged,
}

impl PropertyAdapter {
    /// An adapter for a new property.
    #[must_use]
    pub fn new(pending: Values) -> Self {
        Self { id: None, staged: Staged { snapshot: Values::new(), pending } }
    }

    /// An adapter over an existing row snapshot with pending changes.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the snapshot has no row id.
    pub fn for_row(snapshot: Values, pending: Values) -> Result<Self> {
        let id = snapshot
            .integer(cols::PROPERTY_ID)?
            .ok_or_else(|| Error::validation("property snapshot is missing a row id"))?;
        Ok(Self { id: Some(id), staged: Staged { snapshot, pending } })
    }

    /// The row id, once known.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    /// Record the row id assigned on insert.
    pub fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Whether the column has a pending write.
    #[must_use]
    pub fn is_updated(&self, column: &str) -> bool {
        self.staged.is_updated(column)
    }

    /// The pending changes.
    #[must_use]
    pub const fn pending(&self) -> &Values {
        &self.staged.pending
    }

    /// The pending changes, for staging writes.
    pub fn pending_mut(&mut self) -> &mut Values {
        &mut self.staged.pending
    }

    /// The owning task id.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn task_id(&self) -> Result<Option<i64>> {
        self.staged.integer(cols::TASK_ID)
    }

    /// The mimetype discriminator.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn mimetype(&self) -> Result<Option<&str>> {
        self.staged.text(cols::MIMETYPE)
    }

    /// The effective raw value of a data slot (0-15).
    #[must_use]
    pub fn data(&self, slot: usize) -> Option<&Value> {
        let column = cols::DATA.get(slot)?;
        self.staged
            .pending
            .get(column)
            .or_else(|| self.staged.snapshot.get(column))
            .filter(|v| !matches!(v, &Value::Null))
    }

    /// The effective text value of a data slot.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn data_text(&self, slot: usize) -> Result<Option<&str>> {
        match self.data(slot) {
            None => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s)),
            Some(other) => Err(Error::validation(format!(
                "property slot data{slot} must be text, got {other:?}"
            ))),
        }
    }

    /// The effective integer value of a data slot.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn data_integer(&self, slot: usize) -> Result<Option<i64>> {
        match self.data(slot) {
            None => Ok(None),
            Some(Value::Integer(i)) => Ok(Some(*i)),
            Some(other) => Err(Error::validation(format!(
                "property slot data{slot} must be an integer, got {other:?}"
            ))),
        }
    }

    /// Stage a data slot write.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not in 0-15.
    pub fn set_data(&mut self, slot: usize, value: Value) {
        self.staged.pending.put(cols::DATA[slot], value);
    }
}
