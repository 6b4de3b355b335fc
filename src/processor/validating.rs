//! Stage 1: structural validation.

use crate::error::{Error, Result};
use crate::model::TaskAdapter;
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::rows::row_exists;
use crate::schema::{lists, tables, tasks as cols};
use rusqlite::Connection;

/// Rejects structurally invalid writes before any row is touched.
pub struct Validating;

impl TaskStage for Validating {
    fn name(&self) -> &'static str {
        "validating"
    }

    fn before(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        if op == Operation::Delete {
            return Ok(());
        }

        for column in task.pending().columns() {
            if !cols::ALL.contains(&column) {
                return Err(Error::validation(format!("unknown task column '{column}'")));
            }
            if cols::READ_ONLY.contains(&column) {
                return Err(Error::validation(format!("task column '{column}' is read-only")));
            }
            if !ctx.privileged && cols::SYNC_ONLY.contains(&column) {
                return Err(Error::permission(format!(
                    "task column '{column}' is writable by sync adapters only"
                )));
            }
        }

        if op == Operation::Insert {
            let list_id = task
                .list_id()?
                .ok_or_else(|| Error::validation("a task needs an owning list"))?;
            if !row_exists(conn, tables::LISTS, lists::ID, list_id)? {
                return Err(Error::validation(format!("list {list_id} does not exist")));
            }
        }

        // enumerated fields
        task.status()?;
        task.classification()?;
        if let Some(priority) = task.integer(cols::PRIORITY)? {
            if !(0..=9).contains(&priority) {
                return Err(Error::validation(format!("priority {priority} is out of range 0-9")));
            }
        }
        if let Some(percent) = task.percent_complete()? {
            if !(0..=100).contains(&percent) {
                return Err(Error::validation(format!(
                    "percent_complete {percent} is out of range 0-100"
                )));
            }
        }

        // time fields; parsing alone catches malformed values
        task.timezone()?;
        let start = task.dtstart()?;
        let due = task.due()?;
        let duration = task.duration()?;

        if due.is_some() && duration.is_some() {
            return Err(Error::validation("DUE and DURATION are mutually exclusive"));
        }
        if duration.is_some() && start.is_none() {
            return Err(Error::validation("DURATION requires DTSTART"));
        }
        if let (Some(start), Some(due)) = (start, due) {
            if due.timestamp() < start.timestamp() {
                return Err(Error::validation("DUE must not be before DTSTART"));
            }
        }

        if task.is_allday()? {
            for (name, time) in [(cols::DTSTART, start), (cols::DUE, due)] {
                if let Some(time) = time {
                    if !time.is_midnight_aligned() {
                        return Err(Error::validation(format!(
                            "all-day {name} must be a date without a time part"
                        )));
                    }
                }
            }
            if let Some(duration) = duration {
                if !duration.is_date_only() {
                    return Err(Error::validation(
                        "all-day tasks only allow date-only durations",
                    ));
                }
            }
        }

        // recurrence fields; a task is a master, a single instance or an
        // override, never a mix
        let recurring = task.is_recurring()?;
        if recurring {
            task.recurrence_set()?;
            if task.is_override()? {
                return Err(Error::validation(
                    "a task cannot be recurring and an override at once",
                ));
            }
            if start.is_none() {
                return Err(Error::validation("a recurring task needs a DTSTART"));
            }
        }
        if task.is_override()? {
            let original = task.original_time()?.ok_or_else(|| {
                Error::validation("an override needs its original instance time")
            })?;
            if original.is_all_day() && !original.is_midnight_aligned() {
                return Err(Error::validation(
                    "an all-day original instance time must be a date",
                ));
            }
        }

        Ok(())
    }
}
