//! The instance entity adapter.
//!
//! Instances are derived rows maintained by the instantiating stage; the
//! adapter is read-only and mostly serves the diff/sync logic and queries.

use crate::error::{Error, Result};
use crate::schema::instances as cols;
use crate::values::Values;

/// A read-only view of an instance row.
#[derive(Debug, Clone)]
pub struct InstanceAdapter {
    id: i64,
    row: Values,
}

impl InstanceAdapter {
    /// Wrap an instance row.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the row has no id.
    pub fn for_row(row: Values) -> Result<Self> {
        let id = row
            .integer(cols::ID)?
            .ok_or_else(|| Error::validation("instance row is missing a row id"))?;
        Ok(Self { id, row })
    }

    /// The row id.
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.id
    }

    /// The owning task id.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn task_id(&self) -> Result<Option<i64>> {
        self.row.integer(cols::TASK_ID)
    }

    /// The computed occurrence start timestamp.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn start(&self) -> Result<Option<i64>> {
        self.row.integer(cols::INSTANCE_START)
    }

    /// The computed occurrence due timestamp.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn due(&self) -> Result<Option<i64>> {
        self.row.integer(cols::INSTANCE_DUE)
    }

    /// The un-overridden occurrence time.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn original_time(&self) -> Result<Option<i64>> {
        self.row.integer(cols::INSTANCE_ORIGINAL_TIME)
    }

    /// The distance from the current occurrence.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn distance_from_current(&self) -> Result<Option<i64>> {
        self.row.integer(cols::DISTANCE_FROM_CURRENT)
    }

    /// The underlying row.
    #[must_use]
    pub const fn row(&self) -> &Values {
        &self.row
    }
}
