//! Extended property mimetypes and their handlers.
//!
//! A property row is a mimetype discriminator plus sixteen generic data
//! slots whose meaning the mimetype defines. Each mimetype with derived
//! state or side tables gets a handler that is hooked into the property
//! pipeline around the row write.

use crate::error::{Error, Result};
use crate::model::PropertyAdapter;
use crate::schema::tables;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};

/// The supported property mimetypes.
pub mod mime {
    /// An attachment; `data0` is the URI, `data1` the format type.
    pub const ATTACHMENT: &str = "vnd.taskvault.property/attachment";
    /// An attendee; `data0` is the address, `data1` the display name.
    pub const ATTENDEE: &str = "vnd.taskvault.property/attendee";
    /// A category link; `data0` is the category row id, `data1` the name,
    /// `data2` the color.
    pub const CATEGORY: &str = "vnd.taskvault.property/category";
    /// A comment; `data0` is the text, `data1` the language.
    pub const COMMENT: &str = "vnd.taskvault.property/comment";
    /// A contact; `data0` is the name.
    pub const CONTACT: &str = "vnd.taskvault.property/contact";
    /// A relation to another task; see the `relation` slot constants.
    pub const RELATION: &str = "vnd.taskvault.property/relation";
    /// An alarm; `data0` is minutes before the reference time, `data1` the
    /// reference (0 start, 1 due), `data2` the alarm type, `data3` the
    /// message.
    pub const ALARM: &str = "vnd.taskvault.property/alarm";
}

/// Data slot assignment of relation properties.
pub mod relation {
    /// Row id of the related task, derived from [`RELATED_UID`] if absent.
    pub const RELATED_ID: usize = 0;
    /// Relation type (0 parent, 1 child, 2 sibling).
    pub const RELATED_TYPE: usize = 1;
    /// UID of the related task, derived from [`RELATED_ID`] if absent.
    pub const RELATED_UID: usize = 2;
    /// Resource path of the related task, always derived.
    pub const RELATED_URI: usize = 3;

    /// The related task is the parent of this property's task.
    pub const TYPE_PARENT: i64 = 0;
    /// The related task is a child of this property's task.
    pub const TYPE_CHILD: i64 = 1;
    /// The related task is a sibling.
    pub const TYPE_SIBLING: i64 = 2;
}

/// Per-mimetype hooks around the property row write.
///
/// All hooks default to no-ops; handlers override what they need.
pub trait PropertyHandler: Send + Sync {
    /// Reject structurally invalid slot values.
    ///
    /// # Errors
    ///
    /// Returns a validation error for invalid slot values.
    fn validate(&self, property: &PropertyAdapter) -> Result<()> {
        let _ = property;
        Ok(())
    }

    /// Derive slot values before the row is written.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the write.
    fn before_write(&self, conn: &Connection, property: &mut PropertyAdapter) -> Result<()> {
        let _ = (conn, property);
        Ok(())
    }

    /// Maintain side tables after the row was inserted.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the write.
    fn after_insert(&self, conn: &Connection, property: &mut PropertyAdapter) -> Result<()> {
        let _ = (conn, property);
        Ok(())
    }

    /// Maintain side tables after the row was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the write.
    fn after_delete(&self, conn: &Connection, property: &PropertyAdapter) -> Result<()> {
        let _ = (conn, property);
        Ok(())
    }

    /// The text the search index should see for this property, if any.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a slot type mismatch.
    fn search_text(&self, property: &PropertyAdapter) -> Result<Option<String>> {
        let _ = property;
        Ok(None)
    }
}

/// Plain properties without derived state.
struct DefaultHandler {
    /// The slot exposed to the search index, if any.
    searchable_slot: Option<usize>,
}

impl PropertyHandler for DefaultHandler {
    fn search_text(&self, property: &PropertyAdapter) -> Result<Option<String>> {
        self.searchable_slot
            .map_or(Ok(None), |slot| Ok(property.data_text(slot)?.map(ToString::to_string)))
    }
}

/// Category links; keeps the account-scoped categories table in sync.
struct CategoryHandler;

impl PropertyHandler for CategoryHandler {
    fn validate(&self, property: &PropertyAdapter) -> Result<()> {
        if property.data_text(1)?.is_none() && property.data_integer(0)?.is_none() {
            return Err(Error::validation("category property needs a name or a category id"));
        }
        Ok(())
    }

    fn before_write(&self, conn: &Connection, property: &mut PropertyAdapter) -> Result<()> {
        let task_id = property
            .task_id()?
            .ok_or_else(|| Error::validation("category property has no task"))?;
        let (account_name, account_type): (String, String) = conn.query_row(
            &format!("SELECT account_name, account_type FROM {} WHERE _id = ?1", tables::TASK_VIEW),
            params![task_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        if let Some(name) = property.data_text(1).map(|o| o.map(ToString::to_string))? {
            // resolve or create the category row for this account
            let existing: Option<(i64, Option<i64>)> = conn
                .query_row(
                    &format!(
                        "SELECT _id, color FROM {} WHERE account_name = ?1 AND account_type = ?2
                         AND name = ?3",
                        tables::CATEGORIES
                    ),
                    params![account_name, account_type, name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (category_id, color) = match existing {
                Some(found) => found,
                None => {
                    conn.execute(
                        &format!(
                            "INSERT INTO {} (account_name, account_type, name) VALUES (?1, ?2, ?3)",
                            tables::CATEGORIES
                        ),
                        params![account_name, account_type, name],
                    )?;
                    (conn.last_insert_rowid(), None)
                }
            };
            property.set_data(0, Value::Integer(category_id));
            property.set_data(2, color.map_or(Value::Null, Value::Integer));
        } else if let Some(category_id) = property.data_integer(0)? {
            let found: Option<(String, Option<i64>)> = conn
                .query_row(
                    &format!("SELECT name, color FROM {} WHERE _id = ?1", tables::CATEGORIES),
                    params![category_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let (name, color) =
                found.ok_or_else(|| Error::NotFound(format!("category {category_id}")))?;
            property.set_data(1, Value::Text(name));
            property.set_data(2, color.map_or(Value::Null, Value::Integer));
        }
        Ok(())
    }

    fn search_text(&self, property: &PropertyAdapter) -> Result<Option<String>> {
        Ok(property.data_text(1)?.map(ToString::to_string))
    }
}

/// Alarm properties own a row in the alarms table.
struct AlarmHandler;

impl PropertyHandler for AlarmHandler {
    fn validate(&self, property: &PropertyAdapter) -> Result<()> {
        if property.data_integer(0)?.is_none() {
            return Err(Error::validation("alarm property needs minutes in data0"));
        }
        if let Some(reference) = property.data_integer(1)? {
            if !(0..=1).contains(&reference) {
                return Err(Error::validation("alarm reference must be 0 (start) or 1 (due)"));
            }
        }
        Ok(())
    }

    fn after_insert(&self, conn: &Connection, property: &mut PropertyAdapter) -> Result<()> {
        let property_id =
            property.id().ok_or_else(|| Error::validation("alarm property has no row id"))?;
        conn.execute(&format!("INSERT INTO {} DEFAULT VALUES", tables::ALARMS), [])?;
        let alarm_id = conn.last_insert_rowid();
        conn.execute(
            &format!(
                "INSERT INTO {} (property_id, alarm_id) VALUES (?1, ?2)",
                tables::PROPERTY_ALARMS
            ),
            params![property_id, alarm_id],
        )?;
        Ok(())
    }

    // row cleanup on delete is handled by the alarm cleanup trigger

    fn search_text(&self, property: &PropertyAdapter) -> Result<Option<String>> {
        Ok(property.data_text(3)?.map(ToString::to_string))
    }
}

/// Relation properties; resolves the counterpart task's id/uid pair and
/// maintains the parent link for parent relations.
struct RelationHandler;

impl PropertyHandler for RelationHandler {
    fn validate(&self, property: &PropertyAdapter) -> Result<()> {
        if property.data(relation::RELATED_ID).is_none()
            && property.data(relation::RELATED_UID).is_none()
        {
            return Err(Error::validation("relation property needs a related id or uid"));
        }
        if let Some(kind) = property.data_integer(relation::RELATED_TYPE)? {
            if !(0..=2).contains(&kind) {
                return Err(Error::validation("relation type must be 0, 1 or 2"));
            }
        }
        Ok(())
    }

    fn before_write(&self, conn: &Connection, property: &mut PropertyAdapter) -> Result<()> {
        let related_id = property.data_integer(relation::RELATED_ID)?;
        let related_uid =
            property.data_text(relation::RELATED_UID)?.map(ToString::to_string);

        let resolved_id = match (related_id, &related_uid) {
            (Some(id), _) => Some(id),
            (None, Some(uid)) => conn
                .query_row("SELECT _id FROM tasks WHERE _uid = ?1", params![uid], |row| row.get(0))
                .optional()?,
            (None, None) => None,
        };
        if let Some(id) = resolved_id {
            if related_uid.is_none() {
                let uid: Option<String> = conn
                    .query_row("SELECT _uid FROM tasks WHERE _id = ?1", params![id], |row| {
                        row.get(0)
                    })
                    .optional()?
                    .flatten();
                if let Some(uid) = uid {
                    property.set_data(relation::RELATED_UID, Value::Text(uid));
                }
            }
            property.set_data(relation::RELATED_ID, Value::Integer(id));
            property.set_data(relation::RELATED_URI, Value::Text(format!("tasks/{id}")));
        }
        Ok(())
    }

    fn after_insert(&self, conn: &Connection, property: &mut PropertyAdapter) -> Result<()> {
        // a parent relation also sets the structural parent link
        if property.data_integer(relation::RELATED_TYPE)? == Some(relation::TYPE_PARENT) {
            if let (Some(task_id), Some(parent)) =
                (property.task_id()?, property.data_integer(relation::RELATED_ID)?)
            {
                conn.execute(
                    "UPDATE tasks SET parent_id = ?1 WHERE _id = ?2",
                    params![parent, task_id],
                )?;
            }
        }
        Ok(())
    }

    fn after_delete(&self, conn: &Connection, property: &PropertyAdapter) -> Result<()> {
        if property.data_integer(relation::RELATED_TYPE)? == Some(relation::TYPE_PARENT) {
            if let Some(task_id) = property.task_id()? {
                conn.execute(
                    "UPDATE tasks SET parent_id = NULL WHERE _id = ?1",
                    params![task_id],
                )?;
            }
        }
        Ok(())
    }
}

static ATTACHMENT_HANDLER: DefaultHandler = DefaultHandler { searchable_slot: None };
static TEXT_HANDLER: DefaultHandler = DefaultHandler { searchable_slot: Some(0) };
static CATEGORY_HANDLER: CategoryHandler = CategoryHandler;
static ALARM_HANDLER: AlarmHandler = AlarmHandler;
static RELATION_HANDLER: RelationHandler = RelationHandler;

/// The handler responsible for a mimetype.
#[must_use]
pub fn handler_for(mimetype: &str) -> &'static dyn PropertyHandler {
    match mimetype {
        mime::CATEGORY => &CATEGORY_HANDLER,
        mime::ALARM => &ALARM_HANDLER,
        mime::RELATION => &RELATION_HANDLER,
        mime::ATTENDEE | mime::COMMENT | mime::CONTACT => &TEXT_HANDLER,
        _ => &ATTACHMENT_HANDLER,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_schema;
    use crate::values::Values;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        create_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO lists (account_name, account_type, list_name) VALUES ('a', 'LOCAL', 'l')",
            [],
        )
        .unwrap();
        conn
    }

    fn insert_task(conn: &Connection, title: &str, uid: Option<&str>) -> i64 {
        conn.execute(
            "INSERT INTO tasks (list_id, title, _uid) VALUES (1, ?1, ?2)",
            params![title, uid],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn property(entries: &[(&str, Value)]) -> PropertyAdapter {
        let mut values = Values::new();
        for (column, value) in entries {
            values.put((*column).to_string(), value.clone());
        }
        PropertyAdapter::new(values)
    }

    #[test]
    fn test_category_creates_and_links_row() {
        let conn = open();
        let task = insert_task(&conn, "t", None);
        let mut prop = property(&[
            ("task_id", Value::Integer(task)),
            ("mimetype", Value::from(mime::CATEGORY.to_string())),
            ("data1", Value::from("Groceries".to_string())),
        ]);
        CATEGORY_HANDLER.validate(&prop).unwrap();
        CATEGORY_HANDLER.before_write(&conn, &mut prop).unwrap();

        let category_id = prop.data_integer(0).unwrap().unwrap();
        let name: String = conn
            .query_row("SELECT name FROM categories WHERE _id = ?1", params![category_id], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(name, "Groceries");

        // a second link to the same name reuses the row
        let mut second = property(&[
            ("task_id", Value::Integer(task)),
            ("mimetype", Value::from(mime::CATEGORY.to_string())),
            ("data1", Value::from("Groceries".to_string())),
        ]);
        CATEGORY_HANDLER.before_write(&conn, &mut second).unwrap();
        assert_eq!(second.data_integer(0).unwrap(), Some(category_id));
    }

    #[test]
    fn test_category_requires_name_or_id() {
        let prop = property(&[("mimetype", Value::from(mime::CATEGORY.to_string()))]);
        assert!(CATEGORY_HANDLER.validate(&prop).is_err());
    }

    #[test]
    fn test_relation_resolves_uid_to_id() {
        let conn = open();
        let task = insert_task(&conn, "child", None);
        let other = insert_task(&conn, "parent", Some("uid-123"));
        let mut prop = property(&[
            ("task_id", Value::Integer(task)),
            ("mimetype", Value::from(mime::RELATION.to_string())),
            ("data1", Value::Integer(relation::TYPE_PARENT)),
            ("data2", Value::from("uid-123".to_string())),
        ]);
        RELATION_HANDLER.validate(&prop).unwrap();
        RELATION_HANDLER.before_write(&conn, &mut prop).unwrap();
        assert_eq!(prop.data_integer(relation::RELATED_ID).unwrap(), Some(other));
        assert_eq!(
            prop.data_text(relation::RELATED_URI).unwrap(),
            Some(format!("tasks/{other}").as_str())
        );
    }

    #[test]
    fn test_parent_relation_sets_parent_link() {
        let conn = open();
        let task = insert_task(&conn, "child", None);
        let parent = insert_task(&conn, "parent", None);
        let mut prop = property(&[
            ("task_id", Value::Integer(task)),
            ("mimetype", Value::from(mime::RELATION.to_string())),
            ("data0", Value::Integer(parent)),
            ("data1", Value::Integer(relation::TYPE_PARENT)),
        ]);
        RELATION_HANDLER.after_insert(&conn, &mut prop).unwrap();
        let linked: Option<i64> = conn
            .query_row("SELECT parent_id FROM tasks WHERE _id = ?1", params![task], |r| r.get(0))
            .unwrap();
        assert_eq!(linked, Some(parent));

        RELATION_HANDLER.after_delete(&conn, &prop).unwrap();
        let cleared: Option<i64> = conn
            .query_row("SELECT parent_id FROM tasks WHERE _id = ?1", params![task], |r| r.get(0))
            .unwrap();
        assert_eq!(cleared, None);
    }

    #[test]
    fn test_alarm_creates_alarm_row() {
        let conn = open();
        let task = insert_task(&conn, "t", None);
        conn.execute(
            "INSERT INTO properties (task_id, mimetype, data0) VALUES (?1, ?2, 15)",
            params![task, mime::ALARM],
        )
        .unwrap();
        let prop_id = conn.last_insert_rowid();

        let mut snapshot = Values::new();
        snapshot
            .put_integer("property_id", prop_id)
            .put_integer("task_id", task)
            .put_text("mimetype", mime::ALARM)
            .put_integer("data0", 15);
        let mut prop = PropertyAdapter::for_row(snapshot, Values::new()).unwrap();
        ALARM_HANDLER.validate(&prop).unwrap();
        ALARM_HANDLER.after_insert(&conn, &mut prop).unwrap();

        let mapped: i64 = conn
            .query_row(
                "SELECT count(*) FROM property_alarms WHERE property_id = ?1",
                params![prop_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(mapped, 1);
    }

    #[test]
    fn test_search_text_per_mimetype() {
        let comment = property(&[("data0", Value::from("call back".to_string()))]);
        assert_eq!(
            handler_for(mime::COMMENT).search_text(&comment).unwrap(),
            Some("call back".to_string())
        );
        assert_eq!(handler_for(mime::ATTACHMENT).search_text(&comment).unwrap(), None);
    }
}
