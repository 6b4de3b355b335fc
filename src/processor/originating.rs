//! Stage 8: override linkage resolution.

use crate::error::Result;
use crate::model::TaskAdapter;
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::rows::load_row;
use crate::schema::{tables, tasks as cols};
use rusqlite::{params, Connection, OptionalExtension};

/// Fills in whichever half of an override's master linkage is missing.
///
/// Overrides may arrive addressed by the master's row id (local callers)
/// or by its sync id (sync adapters); the other form is derived here. An
/// unresolvable sync id is tolerated, since the master may arrive in a
/// later sync.
pub struct Originating;

impl TaskStage for Originating {
    fn name(&self) -> &'static str {
        "originating"
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
            Operation::Insert => task.is_override()?,
            Operation::Update => {
                task.is_updated(cols::ORIGINAL_INSTANCE_ID)
                    || task.is_updated(cols::ORIGINAL_INSTANCE_SYNC_ID)
            }
        };
        if !relevant {
            return Ok(());
        }

        let id = task.integer(cols::ORIGINAL_INSTANCE_ID)?;
        let sync_id = task.text(cols::ORIGINAL_INSTANCE_SYNC_ID)?.map(ToString::to_string);
        match (id, sync_id) {
            (Some(master_id), None) => {
                if let Some(row) = load_row(conn, tables::TASKS, cols::ID, master_id)? {
                    if let Some(master_sync_id) = row.text(cols::SYNC_ID)? {
                        task.set_original_instance_sync_id(master_sync_id);
                    }
                }
            }
            (None, Some(master_sync_id)) => {
                let list_id = task.list_id()?;
                let resolved: Option<i64> = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM {} WHERE {} = ?1 AND {} IS ?2",
                            cols::ID,
                            tables::TASKS,
                            cols::SYNC_ID,
                            cols::LIST_ID
                        ),
                        params![master_sync_id, list_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(master_id) = resolved {
                    task.set_original_instance_id(master_id);
                }
            }
            _ => {}
        }
        Ok(())
    }
}
