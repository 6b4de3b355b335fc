//! Entity adapters: typed, change-tracking wrappers around rows.
//!
//! An adapter pairs an immutable snapshot of a stored row with a separate
//! map of pending column writes. Getters read through the pending values
//! first, so stages always observe the state the row will have after
//! commit; `is_updated` reports whether a field was explicitly staged. The
//! two maps are only merged by the commit stage, which writes the pending
//! diff and nothing else.

pub mod instance;
pub mod list;
pub mod property;
pub mod task;
pub mod types;

pub use instance::InstanceAdapter;
pub use list::ListAdapter;
pub use property::PropertyAdapter;
pub use task::TaskAdapter;
pub use types::{Classification, Status};

use crate::error::Result;
use crate::values::Values;

/// Shared snapshot-plus-pending access used by all adapters.
#[derive(Debug, Clone, Default)]
pub(crate) struct Staged {
    pub(crate) snapshot: Values,
    pub(crate) pending: Values,
}

impl Staged {
    pub(crate) fn is_updated(&self, column: &str) -> bool {
        self.pending.contains(column)
    }

    pub(crate) fn text(&self, column: &str) -> Result<Option<&str>> {
        if self.pending.contains(column) {
            self.pending.text(column)
        } else {
            self.snapshot.text(column)
        }
    }

    pub(crate) fn integer(&self, column: &str) -> Result<Option<i64>> {
        if self.pending.contains(column) {
            self.pending.integer(column)
        } else {
            self.snapshot.integer(column)
        }
    }

    pub(crate) fn flag(&self, column: &str) -> Result<Option<bool>> {
        if self.pending.contains(column) {
            self.pending.flag(column)
        } else {
            self.snapshot.flag(column)
        }
    }
}
