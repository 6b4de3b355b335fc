//! Stage 5: instance regeneration.

use crate::error::Result;
use crate::instances::{delete_task_instances, sync_master_instances, sync_task_instances};
use crate::model::TaskAdapter;
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::rows::load_row;
use crate::schema::{tables, tasks as cols};
use crate::time::format_datetime;
use crate::values::Values;
use rusqlite::{params, Connection};

/// Columns whose change requires an instance resync.
const RELEVANT: &[&str] = &[
    cols::DTSTART,
    cols::DUE,
    cols::DURATION,
    cols::TZ,
    cols::IS_ALLDAY,
    cols::STATUS,
    cols::RRULE,
    cols::RDATE,
    cols::EXDATE,
    cols::DELETED,
];

/// Recomputes a task's instance rows after the row write.
pub struct Instantiating;

impl TaskStage for Instantiating {
    fn name(&self) -> &'static str {
        "instantiating"
    }

    fn after(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        let changed = match op {
            Operation::Insert => {
                if task.is_override()? {
                    promote_single_master(conn, task)?;
                }
                sync_task_instances(conn, task, ctx.local)?
            }
            Operation::Update => {
                if task.any_updated(RELEVANT) {
                    sync_task_instances(conn, task, ctx.local)?
                } else {
                    false
                }
            }
            Operation::Delete => {
                let mut changed = false;
                if task.is_override()? {
                    // the occurrence falls back to the master's values
                    if let Some(master_id) = task.original_instance_id()? {
                        if let Some(row) = load_row(conn, tables::TASKS, cols::ID, master_id)? {
                            let master = TaskAdapter::for_row(row, Values::new())?;
                            changed = sync_master_instances(conn, &master, ctx.local)?;
                        }
                    }
                }
                if let Some(id) = task.id() {
                    // hard deletes already cascaded; this covers soft deletes
                    changed |= delete_task_instances(conn, id)? > 0;
                }
                changed
            }
        };
        if changed {
            ctx.post_notify("instances");
        }
        Ok(())
    }
}

/// Inserting an override against a non-recurring master turns the master
/// into a recurring task by adding the override's occurrence time to its
/// RDATE. The original occurrence time is not retroactively excluded.
fn promote_single_master(conn: &Connection, task: &TaskAdapter) -> Result<()> {
    let (Some(master_id), Some(original)) =
        (task.original_instance_id()?, task.original_time()?)
    else {
        return Ok(());
    };
    let Some(row) = load_row(conn, tables::TASKS, cols::ID, master_id)? else {
        return Ok(());
    };
    let master = TaskAdapter::for_row(row, Values::new())?;
    if master.is_recurring()? {
        return Ok(());
    }
    // skip when the override replaces the master's own occurrence
    if master.dtstart()?.map(|t| t.timestamp()) == Some(original.timestamp()) {
        return Ok(());
    }
    conn.execute(
        &format!("UPDATE {} SET {} = ?1 WHERE {} = ?2", tables::TASKS, cols::RDATE, cols::ID),
        params![format_datetime(&original), master_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::{run_stage, test_conn};
    use crate::time::MILLIS_PER_DAY;

    const DAY0: i64 = 1_700_006_400_000;

    fn adapter(conn: &Connection, id: i64) -> TaskAdapter {
        let row = load_row(conn, tables::TASKS, cols::ID, id).unwrap().unwrap();
        TaskAdapter::for_row(row, Values::new()).unwrap()
    }

    #[test]
    fn test_insert_creates_instances() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO tasks (list_id, title, rrule, dtstart)
             VALUES (1, 'm', 'FREQ=DAILY;COUNT=2', ?1)",
            params![DAY0],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        let mut task = adapter(&conn, id);
        run_stage(&Instantiating, &conn, Operation::Insert, &mut task, false).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM instances WHERE task_id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_irrelevant_update_skips_resync() {
        let conn = test_conn();
        conn.execute("INSERT INTO tasks (list_id, title, dtstart) VALUES (1, 't', ?1)", [DAY0])
            .unwrap();
        let id = conn.last_insert_rowid();
        let mut task = adapter(&conn, id);
        run_stage(&Instantiating, &conn, Operation::Insert, &mut task, false).unwrap();

        let row = load_row(&conn, tables::TASKS, cols::ID, id).unwrap().unwrap();
        let mut pending = Values::new();
        pending.put_text(cols::TITLE, "renamed");
        let mut renamed = TaskAdapter::for_row(row, pending).unwrap();
        // a resync would be a no-op anyway; the point is the fast path
        run_stage(&Instantiating, &conn, Operation::Update, &mut renamed, false).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM instances WHERE task_id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_override_insert_promotes_single_master_via_rdate() {
        let conn = test_conn();
        conn.execute("INSERT INTO tasks (list_id, title, dtstart) VALUES (1, 's', ?1)", [DAY0])
            .unwrap();
        let master = conn.last_insert_rowid();
        let mut task = adapter(&conn, master);
        run_stage(&Instantiating, &conn, Operation::Insert, &mut task, false).unwrap();

        let new_time = DAY0 + MILLIS_PER_DAY;
        conn.execute(
            "INSERT INTO tasks (list_id, title, dtstart, original_instance_id,
                                original_instance_time)
             VALUES (1, 'moved', ?1, ?2, ?1)",
            params![new_time, master],
        )
        .unwrap();
        let override_id = conn.last_insert_rowid();
        let mut override_task = adapter(&conn, override_id);
        run_stage(&Instantiating, &conn, Operation::Insert, &mut override_task, false).unwrap();

        let rdate: Option<String> = conn
            .query_row("SELECT rdate FROM tasks WHERE _id = ?1", [master], |r| r.get(0))
            .unwrap();
        assert!(rdate.is_some());

        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM instances WHERE task_id IN (?1, ?2)",
                params![master, override_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_soft_delete_removes_instances() {
        let conn = test_conn();
        conn.execute("INSERT INTO tasks (list_id, title, dtstart) VALUES (1, 't', ?1)", [DAY0])
            .unwrap();
        let id = conn.last_insert_rowid();
        let mut task = adapter(&conn, id);
        run_stage(&Instantiating, &conn, Operation::Insert, &mut task, false).unwrap();

        conn.execute("UPDATE tasks SET _deleted = 1 WHERE _id = ?1", [id]).unwrap();
        let mut deleted = adapter(&conn, id);
        run_stage(&Instantiating, &conn, Operation::Delete, &mut deleted, false).unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM instances WHERE task_id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
