//! Stage 4: parent link maintenance.

use crate::error::{Error, Result};
use crate::model::TaskAdapter;
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::schema::{tables, tasks as cols};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;

/// Validates parent changes and keeps sibling sort keys in order.
pub struct Reparenting;

impl TaskStage for Reparenting {
    fn name(&self) -> &'static str {
        "reparenting"
    }

    fn before(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        _ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        let relevant = match op {
            Operation::Delete => false,
            Operation::Insert => task.parent_id()?.is_some(),
            Operation::Update => task.is_updated(cols::PARENT_ID),
        };
        if !relevant {
            return Ok(());
        }
        let Some(parent) = task.parent_id()? else {
            return Ok(());
        };

        if Some(parent) == task.id() {
            return Err(Error::validation("a task cannot be its own parent"));
        }
        if !crate::rows::row_exists(conn, tables::TASKS, cols::ID, parent)? {
            return Err(Error::validation(format!("parent task {parent} does not exist")));
        }
        if let Some(id) = task.id() {
            ensure_no_cycle(conn, id, parent)?;
        }

        if !task.is_updated(cols::SORTING) {
            let max: Option<i64> = conn.query_row(
                &format!(
                    "SELECT max({}) FROM {} WHERE {} = ?1",
                    cols::SORTING,
                    tables::TASKS,
                    cols::PARENT_ID
                ),
                params![parent],
                |row| row.get(0),
            )?;
            task.set_sorting(max.unwrap_or(0) + 1);
        }
        Ok(())
    }
}

/// Walk up from `parent`; reaching `task_id` means the new link closes a
/// cycle.
fn ensure_no_cycle(conn: &Connection, task_id: i64, parent: i64) -> Result<()> {
    let mut visited = HashSet::new();
    let mut current = Some(parent);
    while let Some(ancestor) = current {
        if ancestor == task_id {
            return Err(Error::validation(format!(
                "parenting task {task_id} under {parent} would create a cycle"
            )));
        }
        if !visited.insert(ancestor) {
            break;
        }
        current = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    cols::PARENT_ID,
                    tables::TASKS,
                    cols::ID
                ),
                params![ancestor],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::{run_stage, test_conn};
    use crate::rows::load_row;
    use crate::values::Values;

    fn insert(conn: &Connection, title: &str, parent: Option<i64>) -> i64 {
        conn.execute(
            "INSERT INTO tasks (list_id, title, parent_id) VALUES (1, ?1, ?2)",
            params![title, parent],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn staged(conn: &Connection, id: i64, parent: i64) -> TaskAdapter {
        let row = load_row(conn, tables::TASKS, cols::ID, id).unwrap().unwrap();
        let mut pending = Values::new();
        pending.put_integer(cols::PARENT_ID, parent);
        TaskAdapter::for_row(row, pending).unwrap()
    }

    #[test]
    fn test_cycle_is_rejected() {
        let conn = test_conn();
        let a = insert(&conn, "a", None);
        let b = insert(&conn, "b", Some(a));
        let c = insert(&conn, "c", Some(b));

        let mut closing = staged(&conn, a, c);
        assert!(run_stage(&Reparenting, &conn, Operation::Update, &mut closing, false).is_err());
    }

    #[test]
    fn test_self_parent_is_rejected() {
        let conn = test_conn();
        let a = insert(&conn, "a", None);
        let mut own = staged(&conn, a, a);
        assert!(run_stage(&Reparenting, &conn, Operation::Update, &mut own, false).is_err());
    }

    #[test]
    fn test_missing_parent_is_rejected() {
        let conn = test_conn();
        let a = insert(&conn, "a", None);
        let mut dangling = staged(&conn, a, 999);
        assert!(run_stage(&Reparenting, &conn, Operation::Update, &mut dangling, false).is_err());
    }

    #[test]
    fn test_sibling_sort_key_is_assigned() {
        let conn = test_conn();
        let parent = insert(&conn, "parent", None);
        let first = insert(&conn, "first", None);
        let second = insert(&conn, "second", None);

        let mut a = staged(&conn, first, parent);
        run_stage(&Reparenting, &conn, Operation::Update, &mut a, false).unwrap();
        assert_eq!(a.integer(cols::SORTING).unwrap(), Some(1));
        conn.execute(
            "UPDATE tasks SET parent_id = ?1, sorting = 1 WHERE _id = ?2",
            params![parent, first],
        )
        .unwrap();

        let mut b = staged(&conn, second, parent);
        run_stage(&Reparenting, &conn, Operation::Update, &mut b, false).unwrap();
        assert_eq!(b.integer(cols::SORTING).unwrap(), Some(2));
    }
}
