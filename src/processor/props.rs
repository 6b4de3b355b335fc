//! The property pipeline: validation, mimetype handler hooks, search sync
//! and commit.

use crate::error::{Error, Result};
use crate::fts::{self, SearchKind};
use crate::model::PropertyAdapter;
use crate::processor::commit::{insert_row, update_row};
use crate::processor::{Operation, WriteContext};
use crate::properties::handler_for;
use crate::rows::row_exists;
use crate::schema::{properties as cols, tables, tasks};
use rusqlite::Connection;

/// Runs property writes through validation, the mimetype handler, the
/// search index and commit.
pub struct PropertyPipeline;

impl PropertyPipeline {
    /// Run the operation.
    ///
    /// # Errors
    ///
    /// Propagates the first error, aborting the transaction.
    pub fn execute(
        &self,
        conn: &Connection,
        op: Operation,
        property: &mut PropertyAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        Self::validate(conn, op, property, ctx)?;

        let mimetype = property.mimetype()?.unwrap_or_default().to_string();
        let handler = handler_for(&mimetype);

        match op {
            Operation::Insert => {
                handler.validate(property)?;
                handler.before_write(conn, property)?;
                let id = insert_row(conn, tables::PROPERTIES, property.pending())?;
                property.set_id(id);
                handler.after_insert(conn, property)?;
                Self::sync_search(conn, property, handler.search_text(property)?.as_deref())?;
                // the counter triggers touched the owning task too
                ctx.post_notify("tasks");
            }
            Operation::Update => {
                handler.validate(property)?;
                handler.before_write(conn, property)?;
                let id = property
                    .id()
                    .ok_or_else(|| Error::consistency("property update without a target row"))?;
                let extra = vec![format!("{v} = {v} + 1", v = cols::PROP_VERSION)];
                update_row(conn, tables::PROPERTIES, cols::PROPERTY_ID, id, property.pending(), &extra)?;
                Self::sync_search(conn, property, handler.search_text(property)?.as_deref())?;
            }
            Operation::Delete => {
                let id = property
                    .id()
                    .ok_or_else(|| Error::consistency("property delete without a target row"))?;
                conn.execute(
                    &format!(
                        "DELETE FROM {} WHERE {} = ?1",
                        tables::PROPERTIES,
                        cols::PROPERTY_ID
                    ),
                    [id],
                )?;
                handler.after_delete(conn, property)?;
                ctx.post_notify("tasks");
            }
        }
        ctx.post_notify("properties");
        Ok(())
    }

    fn validate(
        conn: &Connection,
        op: Operation,
        property: &PropertyAdapter,
        ctx: &WriteContext<'_>,
    ) -> Result<()> {
        if op == Operation::Delete {
            return Ok(());
        }
        for column in property.pending().columns() {
            if !cols::ALL.contains(&column) {
                return Err(Error::validation(format!("unknown property column '{column}'")));
            }
            if cols::READ_ONLY.contains(&column) {
                return Err(Error::validation(format!(
                    "property column '{column}' is read-only"
                )));
            }
            if !ctx.privileged && cols::SYNC_ONLY.contains(&column) {
                return Err(Error::permission(format!(
                    "property column '{column}' is writable by sync adapters only"
                )));
            }
        }
        match op {
            Operation::Insert => {
                if property.mimetype()?.is_none() {
                    return Err(Error::validation("a property needs a mimetype"));
                }
                let task_id = property
                    .task_id()?
                    .ok_or_else(|| Error::validation("a property needs an owning task"))?;
                if !row_exists(conn, tables::TASKS, tasks::ID, task_id)? {
                    return Err(Error::validation(format!("task {task_id} does not exist")));
                }
            }
            Operation::Update => {
                for column in [cols::MIMETYPE, cols::TASK_ID] {
                    if property.is_updated(column) {
                        return Err(Error::validation(format!(
                            "property column '{column}' is write-once"
                        )));
                    }
                }
            }
            Operation::Delete => {}
        }
        Ok(())
    }

    fn sync_search(
        conn: &Connection,
        property: &PropertyAdapter,
        text: Option<&str>,
    ) -> Result<()> {
        if let (Some(task_id), Some(id)) = (property.task_id()?, property.id()) {
            fts::update_entry(conn, task_id, Some(id), SearchKind::Property, text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::testing::test_conn;
    use crate::properties::mime;
    use crate::values::Values;
    use chrono_tz::UTC;
    use std::collections::BTreeSet;

    fn run(
        conn: &Connection,
        op: Operation,
        property: &mut PropertyAdapter,
        privileged: bool,
    ) -> Result<()> {
        let mut notifications = BTreeSet::new();
        let mut ctx = WriteContext::new(privileged, UTC, 0, &mut notifications);
        PropertyPipeline.execute(conn, op, property, &mut ctx)
    }

    fn task(conn: &Connection) -> i64 {
        conn.execute("INSERT INTO tasks (list_id, title) VALUES (1, 't')", []).unwrap();
        conn.last_insert_rowid()
    }

    #[test]
    fn test_insert_requires_task_and_mimetype() {
        let conn = test_conn();
        let mut empty = PropertyAdapter::new(Values::new());
        assert!(run(&conn, Operation::Insert, &mut empty, false).is_err());

        let mut pending = Values::new();
        pending.put_text(cols::MIMETYPE, mime::COMMENT).put_integer(cols::TASK_ID, 404);
        let mut orphan = PropertyAdapter::new(pending);
        assert!(run(&conn, Operation::Insert, &mut orphan, false).is_err());
    }

    #[test]
    fn test_insert_indexes_and_counts() {
        let conn = test_conn();
        let task_id = task(&conn);
        let mut pending = Values::new();
        pending
            .put_text(cols::MIMETYPE, mime::COMMENT)
            .put_integer(cols::TASK_ID, task_id)
            .put_text("data0", "remember the plunger");
        let mut property = PropertyAdapter::new(pending);
        run(&conn, Operation::Insert, &mut property, false).unwrap();

        assert_eq!(fts::search_task_ids(&conn, "plunger").unwrap().len(), 1);
        let count: i64 = conn
            .query_row("SELECT has_properties FROM tasks WHERE _id = ?1", [task_id], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_update_bumps_prop_version_and_reindexes() {
        let conn = test_conn();
        let task_id = task(&conn);
        let mut pending = Values::new();
        pending
            .put_text(cols::MIMETYPE, mime::COMMENT)
            .put_integer(cols::TASK_ID, task_id)
            .put_text("data0", "peach");
        let mut property = PropertyAdapter::new(pending);
        run(&conn, Operation::Insert, &mut property, false).unwrap();
        let id = property.id().unwrap();

        let snapshot =
            crate::rows::load_row(&conn, tables::PROPERTIES, cols::PROPERTY_ID, id).unwrap().unwrap();
        let mut changes = Values::new();
        changes.put_text("data0", "grape");
        let mut updated = PropertyAdapter::for_row(snapshot, changes).unwrap();
        run(&conn, Operation::Update, &mut updated, false).unwrap();

        let version: i64 = conn
            .query_row("SELECT prop_version FROM properties WHERE property_id = ?1", [id], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
        assert!(fts::search_task_ids(&conn, "peach").unwrap().is_empty());
        assert_eq!(fts::search_task_ids(&conn, "grape").unwrap().len(), 1);
    }

    #[test]
    fn test_mimetype_is_write_once() {
        let conn = test_conn();
        let task_id = task(&conn);
        let mut pending = Values::new();
        pending.put_text(cols::MIMETYPE, mime::COMMENT).put_integer(cols::TASK_ID, task_id);
        let mut property = PropertyAdapter::new(pending);
        run(&conn, Operation::Insert, &mut property, false).unwrap();
        let id = property.id().unwrap();

        let snapshot =
            crate::rows::load_row(&conn, tables::PROPERTIES, cols::PROPERTY_ID, id).unwrap().unwrap();
        let mut changes = Values::new();
        changes.put_text(cols::MIMETYPE, mime::CONTACT);
        let mut updated = PropertyAdapter::for_row(snapshot, changes).unwrap();
        assert!(run(&conn, Operation::Update, &mut updated, false).is_err());
    }

    #[test]
    fn test_delete_drops_search_links() {
        let conn = test_conn();
        let task_id = task(&conn);
        let mut pending = Values::new();
        pending
            .put_text(cols::MIMETYPE, mime::COMMENT)
            .put_integer(cols::TASK_ID, task_id)
            .put_text("data0", "fleeting note");
        let mut property = PropertyAdapter::new(pending);
        run(&conn, Operation::Insert, &mut property, false).unwrap();
        let id = property.id().unwrap();

        let snapshot =
            crate::rows::load_row(&conn, tables::PROPERTIES, cols::PROPERTY_ID, id).unwrap().unwrap();
        let mut doomed = PropertyAdapter::for_row(snapshot, Values::new()).unwrap();
        run(&conn, Operation::Delete, &mut doomed, false).unwrap();

        assert!(fts::search_task_ids(&conn, "fleeting").unwrap().is_empty());
        let links: i64 = conn
            .query_row("SELECT count(*) FROM search_content WHERE task_id = ?1", [task_id], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(links, 0);
    }
}
