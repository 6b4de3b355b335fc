//! The write-time processor pipeline.
//!
//! Every row mutation runs through an ordered list of stages. For each
//! operation the coordinator runs every stage's `before` hook in order,
//! then every stage's `after` hook in order; the ninth stage performs the
//! actual row write in its `before` hook, so earlier stages validate and
//! derive against the staged state while `after` hooks observe the
//! committed row (including its id). Stages are plain values composed by
//! iteration, so any sub-sequence can be wired up in a test.

pub mod auto_completing;
pub mod commit;
pub mod instantiating;
pub mod lists;
pub mod moving;
pub mod originating;
pub mod props;
pub mod relating;
pub mod reparenting;
pub mod searchable;
pub mod validating;

pub use auto_completing::AutoCompleting;
pub use commit::Commit;
pub use instantiating::Instantiating;
pub use lists::ListPipeline;
pub use moving::Moving;
pub use originating::Originating;
pub use props::PropertyPipeline;
pub use relating::Relating;
pub use reparenting::Reparenting;
pub use searchable::Searchable;
pub use validating::Validating;

use crate::error::Result;
use crate::model::TaskAdapter;
use chrono_tz::Tz;
use rusqlite::Connection;
use std::collections::BTreeSet;

/// The kind of write running through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// A row is being created.
    Insert,
    /// An existing row is being changed.
    Update,
    /// An existing row is being removed (soft or hard).
    Delete,
}

/// Per-transaction state handed to every stage.
#[derive(Debug)]
pub struct WriteContext<'a> {
    /// Whether the caller acts on behalf of the data owner (sync adapter).
    pub privileged: bool,
    /// The provider's local timezone, used for sort surrogates.
    pub local: Tz,
    /// The transaction's "now" in epoch milliseconds.
    pub now: i64,
    notifications: &'a mut BTreeSet<String>,
}

impl<'a> WriteContext<'a> {
    /// Create a context collecting notifications into `notifications`.
    pub fn new(
        privileged: bool,
        local: Tz,
        now: i64,
        notifications: &'a mut BTreeSet<String>,
    ) -> Self {
        Self { privileged, local, now, notifications }
    }

    /// Record that a resource changed; delivered (deduplicated) on commit.
    pub fn post_notify(&mut self, resource: &str) {
        self.notifications.insert(resource.to_string());
    }
}

/// One stage of the task pipeline.
///
/// Both hooks default to no-ops; a stage overrides the ones it needs. A
/// hook may reject the operation (aborting the transaction), stage further
/// pending fields on the adapter, or write to other tables.
pub trait TaskStage: Send + Sync {
    /// The stage name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Runs before the row write.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the transaction.
    fn before(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        let _ = (conn, op, task, ctx);
        Ok(())
    }

    /// Runs after the row write.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the transaction.
    fn after(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        let _ = (conn, op, task, ctx);
        Ok(())
    }
}

/// An ordered list of task stages.
pub struct TaskPipeline {
    stages: Vec<Box<dyn TaskStage>>,
}

impl TaskPipeline {
    /// The fixed production stage order.
    #[must_use]
    pub fn standard() -> Self {
        Self::with_stages(vec![
            Box::new(Validating),
            Box::new(AutoCompleting),
            Box::new(Relating),
            Box::new(Reparenting),
            Box::new(Instantiating),
            Box::new(Searchable),
            Box::new(Moving),
            Box::new(Originating),
            Box::new(Commit),
        ])
    }

    /// A pipeline over an arbitrary stage sub-sequence, for tests.
    #[must_use]
    pub fn with_stages(stages: Vec<Box<dyn TaskStage>>) -> Self {
        Self { stages }
    }

    /// Run the operation through all stages.
    ///
    /// # Errors
    ///
    /// Propagates the first stage error, aborting the transaction.
    pub fn execute(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        for stage in &self.stages {
            log::trace!("stage {} before {op:?}", stage.name());
            stage.before(conn, op, task, ctx)?;
        }
        for stage in &self.stages {
            log::trace!("stage {} after {op:?}", stage.name());
            stage.after(conn, op, task, ctx)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Values;
    use std::sync::{Arc, Mutex};

    struct Recording {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TaskStage for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn before(
            &self,
            _conn: &Connection,
            _op: Operation,
            _task: &mut TaskAdapter,
            _ctx: &mut WriteContext<'_>,
        ) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}.before", self.tag));
            Ok(())
        }

        fn after(
            &self,
            _conn: &Connection,
            _op: Operation,
            _task: &mut TaskAdapter,
            _ctx: &mut WriteContext<'_>,
        ) -> Result<()> {
            self.log.lock().unwrap().push(format!("{}.after", self.tag));
            Ok(())
        }
    }

    #[test]
    fn test_all_befores_run_before_any_after() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = TaskPipeline::with_stages(vec![
            Box::new(Recording { tag: "a", log: Arc::clone(&log) }),
            Box::new(Recording { tag: "b", log: Arc::clone(&log) }),
        ]);
        let conn = Connection::open_in_memory().unwrap();
        let mut task = TaskAdapter::new(Values::new());
        let mut notifications = BTreeSet::new();
        let mut ctx = WriteContext::new(false, chrono_tz::UTC, 0, &mut notifications);
        pipeline.execute(&conn, Operation::Insert, &mut task, &mut ctx).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a.before", "b.before", "a.after", "b.after"]
        );
    }

    #[test]
    fn test_stage_error_aborts_before_later_stages() {
        struct Failing;
        impl TaskStage for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            fn before(
                &self,
                _conn: &Connection,
                _op: Operation,
                _task: &mut TaskAdapter,
                _ctx: &mut WriteContext<'_>,
            ) -> Result<()> {
                Err(crate::error::Error::validation("nope"))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = TaskPipeline::with_stages(vec![
            Box::new(Failing),
            Box::new(Recording { tag: "late", log: Arc::clone(&log) }),
        ]);
        let conn = Connection::open_in_memory().unwrap();
        let mut task = TaskAdapter::new(Values::new());
        let mut notifications = BTreeSet::new();
        let mut ctx = WriteContext::new(false, chrono_tz::UTC, 0, &mut notifications);
        assert!(pipeline.execute(&conn, Operation::Insert, &mut task, &mut ctx).is_err());
        assert!(log.lock().unwrap().is_empty());
    }
}
