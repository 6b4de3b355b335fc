//! Stage 7: list-to-list transfer.

use crate::error::{Error, Result};
use crate::model::TaskAdapter;
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::rows::row_exists;
use crate::schema::{lists, tables, tasks as cols};
use rusqlite::{params, Connection};

/// Handles moving a task to another list.
///
/// The list id itself is written by the commit stage; this stage checks
/// the transfer is legal and drags the task's overrides along, since a
/// master and its overrides always share a list.
pub struct Moving;

impl Moving {
    fn list_changed(task: &TaskAdapter) -> Result<Option<i64>> {
        if !task.is_updated(cols::LIST_ID) {
            return Ok(None);
        }
        let new_list = task
            .list_id()?
            .ok_or_else(|| Error::validation("a task cannot leave its list without a new one"))?;
        let old_list = task.snapshot().integer(cols::LIST_ID)?;
        Ok((Some(new_list) != old_list).then_some(new_list))
    }
}

impl TaskStage for Moving {
    fn name(&self) -> &'static str {
        "moving"
    }

    fn before(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        _ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        if op != Operation::Update {
            return Ok(());
        }
        let Some(new_list) = Self::list_changed(task)? else {
            return Ok(());
        };
        if task.snapshot().integer(cols::ORIGINAL_INSTANCE_ID)?.is_some()
            || task.snapshot().text(cols::ORIGINAL_INSTANCE_SYNC_ID)?.is_some()
        {
            return Err(Error::validation(
                "an override cannot move on its own; move its master",
            ));
        }
        if !row_exists(conn, tables::LISTS, lists::ID, new_list)? {
            return Err(Error::validation(format!("list {new_list} does not exist")));
        }
        Ok(())
    }

    fn after(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        if op != Operation::Update {
            return Ok(());
        }
        let Some(new_list) = Self::list_changed(task)? else {
            return Ok(());
        };
        let Some(id) = task.id() else {
            return Ok(());
        };
        let moved = conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                tables::TASKS,
                cols::LIST_ID,
                cols::ORIGINAL_INSTANCE_ID
            ),
            params![new_list, id],
        )?;
        if moved > 0 {
            ctx.post_notify("tasks");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::{run_stage, test_conn};
    use crate::rows::load_row;
    use crate::values::Values;

    fn staged_move(conn: &Connection, id: i64, target: i64) -> TaskAdapter {
        let row = load_row(conn, tables::TASKS, cols::ID, id).unwrap().unwrap();
        let mut pending = Values::new();
        pending.put_integer(cols::LIST_ID, target);
        TaskAdapter::for_row(row, pending).unwrap()
    }

    #[test]
    fn test_move_to_missing_list_is_rejected() {
        let conn = test_conn();
        conn.execute("INSERT INTO tasks (list_id, title) VALUES (1, 't')", []).unwrap();
        let id = conn.last_insert_rowid();
        let mut task = staged_move(&conn, id, 55);
        assert!(run_stage(&Moving, &conn, Operation::Update, &mut task, false).is_err());
    }

    #[test]
    fn test_override_cannot_move_alone() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO lists (account_name, account_type, list_name) VALUES ('a', 'LOCAL', 'm')",
            [],
        )
        .unwrap();
        let other_list = conn.last_insert_rowid();
        conn.execute("INSERT INTO tasks (list_id, title) VALUES (1, 'master')", []).unwrap();
        let master = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO tasks (list_id, title, original_instance_id, original_instance_time)
             VALUES (1, 'override', ?1, 0)",
            [master],
        )
        .unwrap();
        let override_id = conn.last_insert_rowid();

        let mut task = staged_move(&conn, override_id, other_list);
        assert!(run_stage(&Moving, &conn, Operation::Update, &mut task, false).is_err());
    }

    #[test]
    fn test_master_move_drags_overrides() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO lists (account_name, account_type, list_name) VALUES ('a', 'LOCAL', 'm')",
            [],
        )
        .unwrap();
        let other_list = conn.last_insert_rowid();
        conn.execute("INSERT INTO tasks (list_id, title) VALUES (1, 'master')", []).unwrap();
        let master = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO tasks (list_id, title, original_instance_id, original_instance_time)
             VALUES (1, 'override', ?1, 0)",
            [master],
        )
        .unwrap();
        let override_id = conn.last_insert_rowid();

        let mut task = staged_move(&conn, master, other_list);
        run_stage(&Moving, &conn, Operation::Update, &mut task, false).unwrap();

        let moved: i64 = conn
            .query_row("SELECT list_id FROM tasks WHERE _id = ?1", [override_id], |r| r.get(0))
            .unwrap();
        assert_eq!(moved, other_list);
    }
}
