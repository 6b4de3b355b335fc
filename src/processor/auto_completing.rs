//! Stage 2: status / percent-complete consistency.

use crate::error::Result;
use crate::model::{Status, TaskAdapter};
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::schema::tasks as cols;
use rusqlite::Connection;

/// Keeps `status`, `percent_complete` and the `completed` timestamp
/// consistent with one another.
pub struct AutoCompleting;

impl TaskStage for AutoCompleting {
    fn name(&self) -> &'static str {
        "auto-completing"
    }

    fn before(
        &self,
        _conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        if op == Operation::Delete {
            return Ok(());
        }
        let old_status = task.snapshot_status()?;
        let status_staged = task.is_updated(cols::STATUS);
        let percent_staged = task.is_updated(cols::PERCENT_COMPLETE);

        // a percent write alone can complete or reopen the task
        if percent_staged && !status_staged {
            match task.percent_complete()? {
                Some(100) if !task.status()?.is_closed() => task.set_status(Status::Completed),
                Some(percent) if percent < 100 && old_status == Some(Status::Completed) => {
                    task.set_status(Status::InProcess);
                }
                _ => {}
            }
        }

        let status = task.status()?;
        if status == Status::Completed {
            if task.percent_complete()? != Some(100) {
                task.set_percent_complete(Some(100));
            }
            if old_status != Some(Status::Completed) && !task.is_updated(cols::COMPLETED) {
                let all_day = task.is_allday()?;
                task.set_completed(Some(ctx.now), all_day);
            }
        } else if old_status == Some(Status::Completed) && !task.is_updated(cols::COMPLETED) {
            task.set_completed(None, false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::{run_stage, test_conn};
    use crate::values::Values;

    fn existing(status: Status, percent: Option<i64>, pending: Values) -> TaskAdapter {
        let mut snapshot = Values::new();
        snapshot
            .put_integer(cols::ID, 1)
            .put_integer(cols::STATUS, status.as_i64())
            .put_opt_integer(cols::PERCENT_COMPLETE, percent);
        if status == Status::Completed {
            snapshot.put_integer(cols::COMPLETED, 5);
        }
        TaskAdapter::for_row(snapshot, pending).unwrap()
    }

    #[test]
    fn test_completing_sets_percent_and_timestamp() {
        let conn = test_conn();
        let mut pending = Values::new();
        pending.put_integer(cols::STATUS, Status::Completed.as_i64());
        let mut task = existing(Status::NeedsAction, None, pending);
        run_stage(&AutoCompleting, &conn, Operation::Update, &mut task, false).unwrap();
        assert_eq!(task.percent_complete().unwrap(), Some(100));
        assert_eq!(task.integer(cols::COMPLETED).unwrap(), Some(1_700_000_000_000));
    }

    #[test]
    fn test_full_percent_completes_task() {
        let conn = test_conn();
        let mut pending = Values::new();
        pending.put_integer(cols::PERCENT_COMPLETE, 100);
        let mut task = existing(Status::InProcess, Some(40), pending);
        run_stage(&AutoCompleting, &conn, Operation::Update, &mut task, false).unwrap();
        assert_eq!(task.status().unwrap(), Status::Completed);
        assert!(task.integer(cols::COMPLETED).unwrap().is_some());
    }

    #[test]
    fn test_lower_percent_reopens_completed_task() {
        let conn = test_conn();
        let mut pending = Values::new();
        pending.put_integer(cols::PERCENT_COMPLETE, 60);
        let mut task = existing(Status::Completed, Some(100), pending);
        run_stage(&AutoCompleting, &conn, Operation::Update, &mut task, false).unwrap();
        assert_eq!(task.status().unwrap(), Status::InProcess);
        assert_eq!(task.integer(cols::COMPLETED).unwrap(), None);
    }

    #[test]
    fn test_full_percent_on_completed_task_stays_completed() {
        let conn = test_conn();
        let mut pending = Values::new();
        pending.put_integer(cols::PERCENT_COMPLETE, 100);
        let mut task = existing(Status::Completed, Some(100), pending);
        run_stage(&AutoCompleting, &conn, Operation::Update, &mut task, false).unwrap();
        assert_eq!(task.status().unwrap(), Status::Completed);
    }

    #[test]
    fn test_leaving_completed_clears_timestamp() {
        let conn = test_conn();
        let mut pending = Values::new();
        pending.put_integer(cols::STATUS, Status::NeedsAction.as_i64());
        let mut task = existing(Status::Completed, Some(100), pending);
        run_stage(&AutoCompleting, &conn, Operation::Update, &mut task, false).unwrap();
        assert_eq!(task.integer(cols::COMPLETED).unwrap(), None);
    }

    #[test]
    fn test_cancelled_does_not_gain_timestamp() {
        let conn = test_conn();
        let mut pending = Values::new();
        pending.put_integer(cols::STATUS, Status::Cancelled.as_i64());
        let mut task = existing(Status::NeedsAction, None, pending);
        run_stage(&AutoCompleting, &conn, Operation::Update, &mut task, false).unwrap();
        assert_eq!(task.integer(cols::COMPLETED).unwrap(), None);
        assert_eq!(task.percent_complete().unwrap(), None);
    }

    #[test]
    fn test_unrelated_update_stays_untouched() {
        let conn = test_conn();
        let mut pending = Values::new();
        pending.put_text(cols::TITLE, "still open");
        let mut task = existing(Status::InProcess, Some(40), pending);
        run_stage(&AutoCompleting, &conn, Operation::Update, &mut task, false).unwrap();
        assert_eq!(task.status().unwrap(), Status::InProcess);
        assert_eq!(task.percent_complete().unwrap(), Some(40));
        assert!(!task.is_updated(cols::COMPLETED));
    }
}
