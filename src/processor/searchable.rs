//! Stage 6: search index sync.

use crate::error::Result;
use crate::fts::{self, SearchKind};
use crate::model::TaskAdapter;
use crate::processor::{Operation, TaskStage, WriteContext};
use crate::schema::tasks as cols;
use rusqlite::Connection;

/// The task-level searchable text kinds.
const KINDS: &[(&str, SearchKind)] = &[
    (cols::TITLE, SearchKind::Title),
    (cols::DESCRIPTION, SearchKind::Description),
    (cols::LOCATION, SearchKind::Location),
];

/// Resyncs search entries for changed text fields.
pub struct Searchable;

impl TaskStage for Searchable {
    fn name(&self) -> &'static str {
        "searchable"
    }

    fn after(
        &self,
        conn: &Connection,
        op: Operation,
        task: &mut TaskAdapter,
        _ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        let Some(id) = task.id() else {
            return Ok(());
        };
        match op {
            Operation::Insert => {
                for (column, kind) in KINDS {
                    if let Some(text) = task.text(column)? {
                        if !text.is_empty() {
                            fts::update_entry(conn, id, None, *kind, Some(text))?;
                        }
                    }
                }
            }
            Operation::Update => {
                for (column, kind) in KINDS {
                    if task.is_updated(column) {
                        let text = task.text(column)?.filter(|t| !t.is_empty());
                        fts::update_entry(conn, id, None, *kind, text)?;
                    }
                }
            }
            Operation::Delete => {
                // hard deletes cascade; this covers soft deletes
                fts::delete_task_entries(conn, id)?;
            }
        }
        Ok(())
    }
}
