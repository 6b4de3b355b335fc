//! The list entity adapter.

use crate::error::{Error, Result};
use crate::model::Staged;
use crate::schema::lists as cols;
use crate::values::Values;

/// A list row staged for a write.
#[derive(Debug, Clone, Default)]
pub struct ListAdapter {
    id: Option<i64>,
    staged: Staged,
}

impl ListAdapter {
    /// An adapter for a new list.
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
            .integer(cols::ID)?
            .ok_or_else(|| Error::validation("list snapshot is missing a row id"))?;
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

    /// The stored snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &Values {
        &self.staged.snapshot
    }

    /// Effective text value of a column, pending-first.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn text(&self, column: &str) -> Result<Option<&str>> {
        self.staged.text(column)
    }

    /// The account identity (name, type).
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn account(&self) -> Result<(Option<&str>, Option<&str>)> {
        Ok((self.text(cols::ACCOUNT_NAME)?, self.text(cols::ACCOUNT_TYPE)?))
    }

    /// Whether the list is visible.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn visible(&self) -> Result<bool> {
        Ok(self.staged.flag(cols::VISIBLE)?.unwrap_or(true))
    }
}
