//! Stage 9: the actual row write.

use crate::error::{Error, Result};
use crate::model::TaskAdapter;
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::schema::{tables, tasks as cols};
use crate::values::Values;
use rusqlite::types::Value;
use rusqlite::Connection;

/// Writes the staged row, assigning defaults and bumping the version.
pub struct Commit;

impl TaskStage for Commit {
    fn name(&self) -> &'static str {
        "commit"
    }

    fn before(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        match op {
            Operation::Insert => {
                let mut values = task.pending().clone();
                if !values.contains(cols::CREATED) {
                    values.put_integer(cols::CREATED, ctx.now);
                }
                if !values.contains(cols::LAST_MODIFIED) {
                    values.put_integer(cols::LAST_MODIFIED, ctx.now);
                }
                let id = insert_row(conn, tables::TASKS, &values)?;
                task.set_id(id);
            }
            Operation::Update => {
                let id = task
                    .id()
                    .ok_or_else(|| Error::consistency("update without a target row"))?;
                let mut extra = vec![format!("{v} = {v} + 1", v = cols::VERSION)];
                if !task.is_updated(cols::LAST_MODIFIED) {
                    extra.push(format!("{} = {}", cols::LAST_MODIFIED, ctx.now));
                }
                if !ctx.privileged && !task.is_updated(cols::DIRTY) {
                    extra.push(format!("{} = 1", cols::DIRTY));
                }
                update_row(conn, tables::TASKS, cols::ID, id, task.pending(), &extra)?;
            }
            Operation::Delete => {
                let id = task
                    .id()
                    .ok_or_else(|| Error::consistency("delete without a target row"))?;
                if ctx.privileged {
                    conn.execute(
                        &format!("DELETE FROM {} WHERE {} = ?1", tables::TASKS, cols::ID),
                        [id],
                    )?;
                } else {
                    // ordinary callers only mark the row; the owning sync
                    // adapter removes it for real
                    conn.execute(
                        &format!(
                            "UPDATE {table} SET {deleted} = 1, {dirty} = 1,
                             {version} = {version} + 1, {modified} = ?1
                             WHERE {id_col} = ?2",
                            table = tables::TASKS,
                            deleted = cols::DELETED,
                            dirty = cols::DIRTY,
                            version = cols::VERSION,
                            modified = cols::LAST_MODIFIED,
                            id_col = cols::ID,
                        ),
                        [ctx.now, id],
                    )?;
                }
            }
        }
        ctx.post_notify("tasks");
        Ok(())
    }
}

/// Insert a row from staged values, returning the new row id.
pub(crate) fn insert_row(conn: &Connection, table: &str, values: &Values) -> Result<i64> {
    let columns: Vec<&str> = values.columns().collect();
    let sql = if columns.is_empty() {
        format!("INSERT INTO {table} DEFAULT VALUES")
    } else {
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    conn.execute(&sql, rusqlite::params_from_iter(values.iter().map(|(_, v)| v.clone())))?;
    Ok(conn.last_insert_rowid())
}

/// Apply staged values plus raw extra assignments to a single row.
pub(crate) fn update_row(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: i64,
    values: &Values,
    extra_assignments: &[String],
) -> Result<()> {
    let mut assignments: Vec<String> = Vec::with_capacity(values.len() + extra_assignments.len());
    let mut args: Vec<Value> = Vec::with_capacity(values.len() + 1);
    for (column, value) in values.iter() {
        args.push(value.clone());
        assignments.push(format!("{column} = ?{}", args.len()));
    }
    assignments.extend(extra_assignments.iter().cloned());
    if assignments.is_empty() {
        return Ok(());
    }
    args.push(Value::Integer(id));
    let sql = format!(
        "UPDATE {table} SET {} WHERE {id_column} = ?{}",
        assignments.join(", "),
        args.len()
    );
    conn.execute(&sql, rusqlite::params_from_iter(args))?;
    Ok(())
}
