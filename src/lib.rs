//! # `taskvault`
//!
//! A transactional store for recurring RFC5545-style to-do tasks.
//!
//! The store keeps two consistent views of its data: the canonical task
//! rows and a derived, per-occurrence *instance* projection used for
//! due/start sorting, notifications and calendars. Every write runs
//! through an ordered processor pipeline that validates input, keeps
//! status fields consistent, expands recurrence rules into instance rows
//! and syncs an n-gram search index — all inside one transaction whose
//! observers are notified exactly once per changed resource.
//!
//! # Example
//!
//! ```no_run
//! use taskvault::provider::TaskProvider;
//! use taskvault::resource::{Resource, Target};
//! use taskvault::values::Values;
//!
//! let provider = TaskProvider::new("/tmp/tasks.sqlite3").unwrap();
//!
//! let mut list = Values::new();
//! list.put_text("account_name", "me")
//!     .put_text("account_type", "LOCAL")
//!     .put_text("list_name", "inbox");
//! let list_id = provider.insert(&Resource::of(Target::Lists), list).unwrap();
//!
//! let mut task = Values::new();
//! task.put_integer("list_id", list_id)
//!     .put_text("title", "water the plants")
//!     .put_text("rrule", "FREQ=DAILY;COUNT=3")
//!     .put_integer("dtstart", 1_700_000_000_000);
//! provider.insert(&Resource::of(Target::Tasks), task).unwrap();
//!
//! let found = provider
//!     .query(&Resource::parse("tasks/search?q=plants").unwrap(), None, None)
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! ```

pub mod error;
pub mod fts;
pub mod instances;
pub mod maintenance;
pub mod model;
pub mod processor;
pub mod properties;
pub mod provider;
pub mod recur;
pub mod resource;
mod rows;
pub mod schema;
pub mod time;
pub mod traits;
pub mod values;

pub use error::{Error, Result};
pub use maintenance::Account;
pub use model::{Classification, ListAdapter, PropertyAdapter, Status, TaskAdapter};
pub use provider::{BatchOperation, BatchResult, TaskProvider};
pub use resource::{Resource, Selection, Target};
pub use traits::{ChangeSink, Clock, Scheduler};
pub use values::Values;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
