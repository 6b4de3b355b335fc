//! Stage 3: relation property bookkeeping.

use crate::error::Result;
use crate::model::TaskAdapter;
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::properties::mime;
use crate::schema::{tables, tasks as cols};
use rusqlite::{params, Connection};

/// Keeps relation properties pointing at this task resolved.
///
/// Relations address their counterpart either by row id or by UID; when a
/// task appears (or disappears) the dangling half of that pair is filled
/// in (or cleared) here.
pub struct Relating;

impl TaskStage for Relating {
    fn name(&self) -> &'static str {
        "relating"
    }

    fn after(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        match op {
            Operation::Insert => {
                let (Some(id), Some(uid)) = (task.id(), task.text(cols::UID)?) else {
                    return Ok(());
                };
                // resolve relations that referenced this task by UID only
                let resolved = conn.execute(
                    &format!(
                        "UPDATE {} SET data0 = ?1, data3 = ?2
                         WHERE mimetype = ?3 AND data2 = ?4 AND data0 IS NULL",
                        tables::PROPERTIES
                    ),
                    params![id, format!("tasks/{id}"), mime::RELATION, uid],
                )?;
                if resolved > 0 {
                    ctx.post_notify("properties");
                }
            }
            Operation::Delete => {
                if !ctx.privileged {
                    // a soft-deleted task may come back; keep relations
                    return Ok(());
                }
                let Some(id) = task.id() else {
                    return Ok(());
                };
                let cleared = conn.execute(
                    &format!(
                        "UPDATE {} SET data0 = NULL, data3 = NULL
                         WHERE mimetype = ?1 AND data0 = ?2",
                        tables::PROPERTIES
                    ),
                    params![mime::RELATION, id],
                )?;
                if cleared > 0 {
                    ctx.post_notify("properties");
                }
            }
            Operation::Update => {}
        }
        Ok(())
    }
}
