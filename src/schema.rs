//! Database schema: tables, views, triggers and the column vocabulary.
//!
//! Six logical tables (lists, tasks, instances, properties, categories,
//! alarms) plus the sync state table and the two search tables, with
//! read-only views that join tasks and instances with their owning list's
//! denormalized columns. Cascades are foreign-key driven; the derived
//! `has_alarms`/`has_properties` counters are trigger-maintained and
//! `is_new`/`is_closed` are generated columns, so none of them can drift
//! from the data they are derived from.

use crate::error::Result;
use crate::properties::mime;
use rusqlite::Connection;

/// Table and view names.
pub mod tables {
    /// Task lists.
    pub const LISTS: &str = "lists";
    /// Tasks.
    pub const TASKS: &str = "tasks";
    /// Expanded task occurrences.
    pub const INSTANCES: &str = "instances";
    /// Extended task properties.
    pub const PROPERTIES: &str = "properties";
    /// Account-scoped categories.
    pub const CATEGORIES: &str = "categories";
    /// Alarms, linked to properties through [`PROPERTY_ALARMS`].
    pub const ALARMS: &str = "alarms";
    /// Property → alarm mapping.
    pub const PROPERTY_ALARMS: &str = "property_alarms";
    /// Per-account sync adapter state.
    pub const SYNCSTATE: &str = "syncstate";
    /// Search links between tasks and n-grams.
    pub const SEARCH_CONTENT: &str = "search_content";
    /// Interned n-grams.
    pub const NGRAMS: &str = "ngrams";
    /// Tasks joined with their list's denormalized columns.
    pub const TASK_VIEW: &str = "task_view";
    /// Instances joined with their task and list columns.
    pub const INSTANCE_VIEW: &str = "instance_view";
}

/// Columns of the lists table.
pub mod lists {
    /// Row id.
    pub const ID: &str = "_id";
    /// Account name, write-once.
    pub const ACCOUNT_NAME: &str = "account_name";
    /// Account type, write-once.
    pub const ACCOUNT_TYPE: &str = "account_type";
    /// Display name.
    pub const LIST_NAME: &str = "list_name";
    /// Display color.
    pub const LIST_COLOR: &str = "list_color";
    /// Owner identifier.
    pub const LIST_OWNER: &str = "list_owner";
    /// Visibility flag.
    pub const VISIBLE: &str = "visible";
    /// Whether the list takes part in sync.
    pub const SYNC_ENABLED: &str = "sync_enabled";
    /// Dirty counter for sync.
    pub const DIRTY: &str = "_dirty";
    /// Sync adapter row id.
    pub const SYNC_ID: &str = "_sync_id";
    /// Sync adapter version tag.
    pub const SYNC_VERSION: &str = "sync_version";

    /// Columns only the store itself may write.
    pub const READ_ONLY: &[&str] = &[ID];

    /// Columns only a privileged (sync adapter) caller may write.
    pub const SYNC_ONLY: &[&str] = &[
        SYNC_ID,
        SYNC_VERSION,
        DIRTY,
        "sync1",
        "sync2",
        "sync3",
        "sync4",
        "sync5",
        "sync6",
        "sync7",
        "sync8",
    ];

    /// Every column of the lists table.
    pub const ALL: &[&str] = &[
        ID,
        ACCOUNT_NAME,
        ACCOUNT_TYPE,
        LIST_NAME,
        LIST_COLOR,
        LIST_OWNER,
        VISIBLE,
        SYNC_ENABLED,
        DIRTY,
        SYNC_ID,
        SYNC_VERSION,
        "sync1",
        "sync2",
        "sync3",
        "sync4",
        "sync5",
        "sync6",
        "sync7",
        "sync8",
    ];
}

/// Columns of the tasks table.
pub mod tasks {
    /// Row id.
    pub const ID: &str = "_id";
    /// Owning list, write-once.
    pub const LIST_ID: &str = "list_id";
    /// Title.
    pub const TITLE: &str = "title";
    /// Location.
    pub const LOCATION: &str = "location";
    /// Description.
    pub const DESCRIPTION: &str = "description";
    /// URL.
    pub const URL: &str = "url";
    /// Organizer.
    pub const ORGANIZER: &str = "organizer";
    /// Geographic position.
    pub const GEO: &str = "geo";
    /// Priority 0-9, 0 meaning unset.
    pub const PRIORITY: &str = "priority";
    /// Classification (0 public, 1 private, 2 confidential, null unset).
    pub const CLASSIFICATION: &str = "classification";
    /// Status (0 needs-action, 1 in-process, 2 completed, 3 cancelled).
    pub const STATUS: &str = "status";
    /// Percent complete, 0-100 or null.
    pub const PERCENT_COMPLETE: &str = "percent_complete";
    /// Completion timestamp.
    pub const COMPLETED: &str = "completed";
    /// All-day flag of the completion timestamp.
    pub const COMPLETED_IS_ALLDAY: &str = "completed_is_allday";
    /// Start timestamp.
    pub const DTSTART: &str = "dtstart";
    /// All-day flag for start/due.
    pub const IS_ALLDAY: &str = "is_allday";
    /// Timezone identifier, null meaning floating time.
    pub const TZ: &str = "tz";
    /// Due timestamp, mutually exclusive with [`DURATION`].
    pub const DUE: &str = "due";
    /// RFC5545 duration, requires [`DTSTART`].
    pub const DURATION: &str = "duration";
    /// Recurrence rule.
    pub const RRULE: &str = "rrule";
    /// Additional recurrence dates.
    pub const RDATE: &str = "rdate";
    /// Excluded recurrence dates.
    pub const EXDATE: &str = "exdate";
    /// Sync id of the overridden master.
    pub const ORIGINAL_INSTANCE_SYNC_ID: &str = "original_instance_sync_id";
    /// Row id of the overridden master.
    pub const ORIGINAL_INSTANCE_ID: &str = "original_instance_id";
    /// Occurrence time this task overrides.
    pub const ORIGINAL_INSTANCE_TIME: &str = "original_instance_time";
    /// All-day flag of the overridden occurrence.
    pub const ORIGINAL_INSTANCE_ALLDAY: &str = "original_instance_allday";
    /// Parent task for sub-tasks.
    pub const PARENT_ID: &str = "parent_id";
    /// Sort key under the parent.
    pub const SORTING: &str = "sorting";
    /// Derived alarm counter.
    pub const HAS_ALARMS: &str = "has_alarms";
    /// Derived property counter.
    pub const HAS_PROPERTIES: &str = "has_properties";
    /// Generated: status is needs-action.
    pub const IS_NEW: &str = "is_new";
    /// Generated: status is completed or cancelled.
    pub const IS_CLOSED: &str = "is_closed";
    /// Monotonic row version.
    pub const VERSION: &str = "version";
    /// Creation timestamp.
    pub const CREATED: &str = "created";
    /// Last modification timestamp.
    pub const LAST_MODIFIED: &str = "last_modified";
    /// iCalendar UID.
    pub const UID: &str = "_uid";
    /// Soft-delete flag.
    pub const DELETED: &str = "_deleted";
    /// Dirty flag for sync.
    pub const DIRTY: &str = "_dirty";
    /// Sync adapter row id.
    pub const SYNC_ID: &str = "_sync_id";
    /// Sync adapter version tag.
    pub const SYNC_VERSION: &str = "sync_version";

    /// Columns only the store itself may write.
    pub const READ_ONLY: &[&str] =
        &[ID, HAS_ALARMS, HAS_PROPERTIES, IS_NEW, IS_CLOSED, VERSION, CREATED, LAST_MODIFIED];

    /// Every column of the tasks table.
    pub const ALL: &[&str] = &[
        ID,
        LIST_ID,
        TITLE,
        LOCATION,
        DESCRIPTION,
        URL,
        ORGANIZER,
        GEO,
        PRIORITY,
        CLASSIFICATION,
        STATUS,
        PERCENT_COMPLETE,
        COMPLETED,
        COMPLETED_IS_ALLDAY,
        DTSTART,
        IS_ALLDAY,
        TZ,
        DUE,
        DURATION,
        RRULE,
        RDATE,
        EXDATE,
        ORIGINAL_INSTANCE_SYNC_ID,
        ORIGINAL_INSTANCE_ID,
        ORIGINAL_INSTANCE_TIME,
        ORIGINAL_INSTANCE_ALLDAY,
        PARENT_ID,
        SORTING,
        HAS_ALARMS,
        HAS_PROPERTIES,
        IS_NEW,
        IS_CLOSED,
        VERSION,
        CREATED,
        LAST_MODIFIED,
        UID,
        DELETED,
        DIRTY,
        SYNC_ID,
        SYNC_VERSION,
        "sync1",
        "sync2",
        "sync3",
        "sync4",
        "sync5",
        "sync6",
        "sync7",
        "sync8",
    ];

    /// Columns only a privileged (sync adapter) caller may write.
    pub const SYNC_ONLY: &[&str] = &[
        SYNC_ID,
        SYNC_VERSION,
        DIRTY,
        DELETED,
        "sync1",
        "sync2",
        "sync3",
        "sync4",
        "sync5",
        "sync6",
        "sync7",
        "sync8",
    ];
}

/// Columns of the instances table and view.
pub mod instances {
    /// Row id.
    pub const ID: &str = "_id";
    /// Owning task.
    pub const TASK_ID: &str = "task_id";
    /// Computed occurrence start.
    pub const INSTANCE_START: &str = "instance_start";
    /// Opaque ordering key for the start.
    pub const INSTANCE_START_SORTING: &str = "instance_start_sorting";
    /// Computed occurrence due.
    pub const INSTANCE_DUE: &str = "instance_due";
    /// Opaque ordering key for the due.
    pub const INSTANCE_DUE_SORTING: &str = "instance_due_sorting";
    /// Difference between due and start, when both are set.
    pub const INSTANCE_DURATION: &str = "instance_duration";
    /// The un-overridden occurrence time.
    pub const INSTANCE_ORIGINAL_TIME: &str = "instance_original_time";
    /// −1 for closed occurrences, 0 for the current one, then +1, +2, ….
    pub const DISTANCE_FROM_CURRENT: &str = "distance_from_current";
}

/// Columns of the properties table.
pub mod properties {
    /// Row id.
    pub const PROPERTY_ID: &str = "property_id";
    /// Owning task.
    pub const TASK_ID: &str = "task_id";
    /// Discriminates the meaning of the data slots.
    pub const MIMETYPE: &str = "mimetype";
    /// Monotonic property version.
    pub const PROP_VERSION: &str = "prop_version";

    /// The generic data slot names, `data0` through `data15`.
    pub const DATA: [&str; 16] = [
        "data0", "data1", "data2", "data3", "data4", "data5", "data6", "data7", "data8", "data9",
        "data10", "data11", "data12", "data13", "data14", "data15",
    ];

    /// Columns only the store itself may write.
    pub const READ_ONLY: &[&str] = &[PROPERTY_ID, PROP_VERSION];

    /// Columns only a privileged (sync adapter) caller may write.
    pub const SYNC_ONLY: &[&str] = &[
        "prop_sync1",
        "prop_sync2",
        "prop_sync3",
        "prop_sync4",
        "prop_sync5",
        "prop_sync6",
        "prop_sync7",
        "prop_sync8",
    ];

    /// Every column of the properties table.
    pub const ALL: &[&str] = &[
        PROPERTY_ID,
        TASK_ID,
        MIMETYPE,
        PROP_VERSION,
        "data0",
        "data1",
        "data2",
        "data3",
        "data4",
        "data5",
        "data6",
        "data7",
        "data8",
        "data9",
        "data10",
        "data11",
        "data12",
        "data13",
        "data14",
        "data15",
        "prop_sync1",
        "prop_sync2",
        "prop_sync3",
        "prop_sync4",
        "prop_sync5",
        "prop_sync6",
        "prop_sync7",
        "prop_sync8",
    ];
}

/// Columns of the categories table.
pub mod categories {
    /// Row id.
    pub const ID: &str = "_id";
    /// Account name scope.
    pub const ACCOUNT_NAME: &str = "account_name";
    /// Account type scope.
    pub const ACCOUNT_TYPE: &str = "account_type";
    /// Category name.
    pub const NAME: &str = "name";
    /// Display color.
    pub const COLOR: &str = "color";
}

/// Columns of the alarms table.
pub mod alarms {
    /// Row id.
    pub const ALARM_ID: &str = "alarm_id";
    /// When the alarm last fired.
    pub const LAST_TRIGGER: &str = "last_trigger";
    /// When the alarm fires next.
    pub const NEXT_TRIGGER: &str = "next_trigger";
}

/// Columns of the sync state table.
pub mod syncstate {
    /// Row id.
    pub const ID: &str = "_id";
    /// Account name.
    pub const ACCOUNT_NAME: &str = "account_name";
    /// Account type.
    pub const ACCOUNT_TYPE: &str = "account_type";
    /// Opaque adapter state.
    pub const DATA: &str = "data";
}

/// Columns of the search tables.
pub mod search {
    /// Task the link belongs to.
    pub const TASK_ID: &str = "task_id";
    /// Property the link belongs to, null for task-level text.
    pub const PROPERTY_ID: &str = "property_id";
    /// What kind of text produced the link (title, description, …).
    pub const KIND: &str = "kind";
    /// The linked n-gram.
    pub const NGRAM_ID: &str = "ngram_id";
    /// N-gram row id.
    pub const NGRAM_TEXT: &str = "ngram_text";
}

/// The account type of lists that live only on this device.
pub const LOCAL_ACCOUNT_TYPE: &str = "LOCAL";

/// Create all tables, views, triggers and indexes.
///
/// # Errors
///
/// Returns a database error if the DDL fails.
#[allow(clippy::too_many_lines)]
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS lists (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            list_name TEXT,
            list_color INTEGER,
            list_owner TEXT,
            visible INTEGER NOT NULL DEFAULT 1,
            sync_enabled INTEGER NOT NULL DEFAULT 1,
            _dirty INTEGER NOT NULL DEFAULT 0,
            _sync_id TEXT,
            sync_version TEXT,
            sync1 TEXT, sync2 TEXT, sync3 TEXT, sync4 TEXT,
            sync5 TEXT, sync6 TEXT, sync7 TEXT, sync8 TEXT
        );

        CREATE TABLE IF NOT EXISTS tasks (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            list_id INTEGER NOT NULL REFERENCES lists(_id) ON DELETE CASCADE,
            title TEXT,
            location TEXT,
            description TEXT,
            url TEXT,
            organizer TEXT,
            geo TEXT,
            priority INTEGER NOT NULL DEFAULT 0
                CHECK (priority >= 0 AND priority <= 9),
            classification INTEGER
                CHECK (classification IS NULL OR classification IN (0, 1, 2)),
            status INTEGER NOT NULL DEFAULT 0 CHECK (status IN (0, 1, 2, 3)),
            percent_complete INTEGER
                CHECK (percent_complete IS NULL
                       OR (percent_complete >= 0 AND percent_complete <= 100)),
            completed INTEGER,
            completed_is_allday INTEGER NOT NULL DEFAULT 0,
            dtstart INTEGER,
            is_allday INTEGER NOT NULL DEFAULT 0,
            tz TEXT,
            due INTEGER,
            duration TEXT,
            rrule TEXT,
            rdate TEXT,
            exdate TEXT,
            original_instance_sync_id TEXT,
            original_instance_id INTEGER
                REFERENCES tasks(_id) ON DELETE CASCADE,
            original_instance_time INTEGER,
            original_instance_allday INTEGER NOT NULL DEFAULT 0,
            parent_id INTEGER,
            sorting INTEGER,
            has_alarms INTEGER NOT NULL DEFAULT 0,
            has_properties INTEGER NOT NULL DEFAULT 0,
            is_new INTEGER GENERATED ALWAYS AS (status = 0) VIRTUAL,
            is_closed INTEGER GENERATED ALWAYS AS (status IN (2, 3)) VIRTUAL,
            version INTEGER NOT NULL DEFAULT 0,
            created INTEGER,
            last_modified INTEGER,
            _uid TEXT,
            _deleted INTEGER NOT NULL DEFAULT 0,
            _dirty INTEGER NOT NULL DEFAULT 1,
            _sync_id TEXT,
            sync_version TEXT,
            sync1 TEXT, sync2 TEXT, sync3 TEXT, sync4 TEXT,
            sync5 TEXT, sync6 TEXT, sync7 TEXT, sync8 TEXT
        );

        CREATE TABLE IF NOT EXISTS instances (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL REFERENCES tasks(_id) ON DELETE CASCADE,
            instance_start INTEGER,
            instance_start_sorting INTEGER,
            instance_due INTEGER,
            instance_due_sorting INTEGER,
            instance_duration INTEGER,
            instance_original_time INTEGER,
            distance_from_current INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS properties (
            property_id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL REFERENCES tasks(_id) ON DELETE CASCADE,
            mimetype TEXT NOT NULL,
            prop_version INTEGER NOT NULL DEFAULT 0,
            data0, data1, data2, data3, data4, data5, data6, data7,
            data8, data9, data10, data11, data12, data13, data14, data15,
            prop_sync1 TEXT, prop_sync2 TEXT, prop_sync3 TEXT, prop_sync4 TEXT,
            prop_sync5 TEXT, prop_sync6 TEXT, prop_sync7 TEXT, prop_sync8 TEXT
        );

        CREATE TABLE IF NOT EXISTS categories (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            name TEXT NOT NULL,
            color INTEGER
        );

        CREATE TABLE IF NOT EXISTS alarms (
            alarm_id INTEGER PRIMARY KEY AUTOINCREMENT,
            last_trigger INTEGER,
            next_trigger INTEGER
        );

        CREATE TABLE IF NOT EXISTS property_alarms (
            property_id INTEGER NOT NULL,
            alarm_id INTEGER NOT NULL REFERENCES alarms(alarm_id) ON DELETE CASCADE,
            PRIMARY KEY (property_id, alarm_id)
        );

        CREATE TABLE IF NOT EXISTS syncstate (
            _id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_name TEXT NOT NULL,
            account_type TEXT NOT NULL,
            data BLOB,
            UNIQUE (account_name, account_type) ON CONFLICT REPLACE
        );

        CREATE TABLE IF NOT EXISTS ngrams (
            ngram_id INTEGER PRIMARY KEY AUTOINCREMENT,
            ngram_text TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS search_content (
            task_id INTEGER NOT NULL REFERENCES tasks(_id) ON DELETE CASCADE,
            property_id INTEGER REFERENCES properties(property_id) ON DELETE CASCADE,
            kind INTEGER NOT NULL,
            ngram_id INTEGER NOT NULL REFERENCES ngrams(ngram_id),
            UNIQUE (task_id, kind, property_id, ngram_id) ON CONFLICT IGNORE
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_list ON tasks(list_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_original ON tasks(original_instance_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_sync_id ON tasks(_sync_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_uid ON tasks(_uid);
        CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);
        CREATE INDEX IF NOT EXISTS idx_instances_task
            ON instances(task_id, instance_original_time);
        CREATE INDEX IF NOT EXISTS idx_instances_due_sorting
            ON instances(instance_due_sorting);
        CREATE INDEX IF NOT EXISTS idx_instances_start_sorting
            ON instances(instance_start_sorting);
        CREATE INDEX IF NOT EXISTS idx_properties_task ON properties(task_id);
        CREATE INDEX IF NOT EXISTS idx_properties_mimetype
            ON properties(mimetype, task_id);
        CREATE INDEX IF NOT EXISTS idx_search_ngram ON search_content(ngram_id);
        CREATE INDEX IF NOT EXISTS idx_search_task
            ON search_content(task_id, kind, property_id);

        CREATE TRIGGER IF NOT EXISTS property_count_insert_trigger
        AFTER INSERT ON properties
        BEGIN
            UPDATE tasks SET has_properties =
                (SELECT count(*) FROM properties WHERE task_id = new.task_id)
            WHERE _id = new.task_id;
        END;

        CREATE TRIGGER IF NOT EXISTS property_count_delete_trigger
        AFTER DELETE ON properties
        BEGIN
            UPDATE tasks SET has_properties =
                (SELECT count(*) FROM properties WHERE task_id = old.task_id)
            WHERE _id = old.task_id;
        END;

        CREATE TRIGGER IF NOT EXISTS alarm_count_insert_trigger
        AFTER INSERT ON properties WHEN new.mimetype = '{alarm}'
        BEGIN
            UPDATE tasks SET has_alarms =
                (SELECT count(*) FROM properties
                 WHERE task_id = new.task_id AND mimetype = '{alarm}')
            WHERE _id = new.task_id;
        END;

        CREATE TRIGGER IF NOT EXISTS alarm_count_delete_trigger
        AFTER DELETE ON properties WHEN old.mimetype = '{alarm}'
        BEGIN
            UPDATE tasks SET has_alarms =
                (SELECT count(*) FROM properties
                 WHERE task_id = old.task_id AND mimetype = '{alarm}')
            WHERE _id = old.task_id;
        END;

        CREATE TRIGGER IF NOT EXISTS alarm_property_cleanup_trigger
        AFTER DELETE ON properties WHEN old.mimetype = '{alarm}'
        BEGIN
            DELETE FROM alarms WHERE alarm_id IN
                (SELECT alarm_id FROM property_alarms
                 WHERE property_id = old.property_id);
            DELETE FROM property_alarms WHERE property_id = old.property_id;
        END;

        CREATE VIEW IF NOT EXISTS task_view AS
        SELECT tasks.*,
               lists.account_name, lists.account_type, lists.list_name,
               lists.list_color, lists.list_owner, lists.visible,
               lists.sync_enabled
        FROM tasks
        JOIN lists ON (tasks.list_id = lists._id);

        CREATE VIEW IF NOT EXISTS instance_view AS
        SELECT instances._id, instances.task_id,
               instances.instance_start, instances.instance_start_sorting,
               instances.instance_due, instances.instance_due_sorting,
               instances.instance_duration, instances.instance_original_time,
               instances.distance_from_current,
               tasks.list_id, tasks.title, tasks.location, tasks.description,
               tasks.url, tasks.organizer, tasks.geo, tasks.priority,
               tasks.classification, tasks.status, tasks.percent_complete,
               tasks.completed, tasks.is_allday, tasks.tz,
               NULL AS duration,
               tasks.rrule, tasks.rdate, tasks.exdate,
               tasks.original_instance_id, tasks.parent_id,
               tasks.has_alarms, tasks.has_properties,
               tasks.is_new, tasks.is_closed, tasks.version,
               tasks._deleted, tasks._dirty, tasks._uid, tasks._sync_id,
               lists.account_name, lists.account_type, lists.list_name,
               lists.list_color, lists.visible
        FROM instances
        JOIN tasks ON (instances.task_id = tasks._id)
        JOIN lists ON (tasks.list_id = lists._id);
        "#,
        alarm = mime::ALARM,
    ))?;
    Ok(())
}
