//! The transaction coordinator.
//!
//! Every public write runs in its own atomic transaction (or joins a
//! batch's single transaction), flows through the processor pipeline of
//! its target, and defers change notification to commit time, deduplicated
//! by resource. Reads inside a transaction see its uncommitted writes;
//! readers outside only ever see committed state.

use crate::error::{Error, Result};
use crate::model::{ListAdapter, PropertyAdapter, TaskAdapter};
use crate::processor::{ListPipeline, Operation, PropertyPipeline, TaskPipeline, WriteContext};
use crate::resource::{Params, Resource, Selection, Target};
use crate::rows::query_rows;
use crate::schema::{self, tables};
use crate::traits::{ChangeSink, Clock, NoopSink, Scheduler, SystemClock};
use crate::values::Values;
use chrono_tz::Tz;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Maximum batch operations between yield points.
pub const MAX_OPERATIONS_PER_YIELD_POINT: usize = 500;

/// One operation of a batch.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Insert a row.
    Insert {
        /// The target resource.
        resource: Resource,
        /// The staged column values.
        values: Values,
        /// Whether the transaction may yield before this operation.
        yield_allowed: bool,
    },
    /// Update matching rows.
    Update {
        /// The target resource.
        resource: Resource,
        /// The staged column values.
        values: Values,
        /// An extra row restriction.
        selection: Option<Selection>,
        /// Whether the transaction may yield before this operation.
        yield_allowed: bool,
    },
    /// Delete matching rows.
    Delete {
        /// The target resource.
        resource: Resource,
        /// An extra row restriction.
        selection: Option<Selection>,
        /// Whether the transaction may yield before this operation.
        yield_allowed: bool,
    },
}

impl BatchOperation {
    const fn yield_allowed(&self) -> bool {
        match self {
            Self::Insert { yield_allowed, .. }
            | Self::Update { yield_allowed, .. }
            | Self::Delete { yield_allowed, .. } => *yield_allowed,
        }
    }
}

/// The outcome of one batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchResult {
    /// A row was created with this id.
    Inserted(i64),
    /// This many rows were affected.
    Affected(usize),
}

/// The task store coordinator.
///
/// Cheap to clone; clones share the injected collaborators and open their
/// own connections against the same database file.
#[derive(Clone)]
pub struct TaskProvider {
    db_path: PathBuf,
    local: Arc<RwLock<Tz>>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn ChangeSink>,
    scheduler: Option<Arc<dyn Scheduler>>,
    pipeline: Arc<TaskPipeline>,
}

impl std::fmt::Debug for TaskProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProvider").field("db_path", &self.db_path).finish_non_exhaustive()
    }
}

impl TaskProvider {
    /// Open (and initialize if needed) a task store at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let provider = Self {
            db_path: db_path.as_ref().to_path_buf(),
            local: Arc::new(RwLock::new(chrono_tz::UTC)),
            clock: Arc::new(SystemClock),
            sink: Arc::new(NoopSink),
            scheduler: None,
            pipeline: Arc::new(TaskPipeline::standard()),
        };
        let conn = provider.open()?;
        schema::create_schema(&conn)?;
        Ok(provider)
    }

    /// Replace the clock (for tests or frozen time).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the change notification sink.
    #[must_use]
    pub fn with_change_sink(mut self, sink: Arc<dyn ChangeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attach a wake-up scheduler.
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Set the local timezone used for sort surrogates.
    #[must_use]
    pub fn with_local_timezone(self, tz: Tz) -> Self {
        *self.local.write().expect("timezone lock poisoned") = tz;
        self
    }

    /// The database path.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// The current local timezone.
    ///
    /// # Panics
    ///
    /// Panics if the timezone lock is poisoned.
    #[must_use]
    pub fn local_timezone(&self) -> Tz {
        *self.local.read().expect("timezone lock poisoned")
    }

    pub(crate) fn swap_local_timezone(&self, tz: Tz) {
        *self.local.write().expect("timezone lock poisoned") = tz;
    }

    pub(crate) const fn scheduler(&self) -> Option<&Arc<dyn Scheduler>> {
        self.scheduler.as_ref()
    }

    pub(crate) fn clock_now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Open a connection to the database.
    pub(crate) fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA recursive_triggers = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(conn)
    }

    /// Deliver deduplicated notifications after a commit.
    pub(crate) fn deliver(&self, notifications: &BTreeSet<String>) {
        for resource in notifications {
            self.sink.notify(resource);
        }
    }

    fn context<'a>(
        &self,
        params: &Params,
        notifications: &'a mut BTreeSet<String>,
    ) -> WriteContext<'a> {
        WriteContext::new(
            params.privileged,
            self.local_timezone(),
            self.clock.now_millis(),
            notifications,
        )
    }

    fn after_commit(&self, conn: &Connection, notifications: &BTreeSet<String>) {
        self.deliver(notifications);
        if self.scheduler.is_some()
            && (notifications.contains("tasks") || notifications.contains("instances"))
        {
            if let Err(error) = crate::maintenance::reschedule_wakeup(self, conn) {
                log::warn!("wake-up rescheduling failed: {error}");
            }
        }
    }

    /// Insert a row, returning its id.
    ///
    /// # Errors
    ///
    /// Returns a typed error and rolls the transaction back; nothing is
    /// committed or notified on failure.
    pub fn insert(&self, resource: &Resource, values: Values) -> Result<i64> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut notifications = BTreeSet::new();
        let id = self.insert_in_tx(&tx, resource, values, &mut notifications)?;
        tx.commit()?;
        self.after_commit(&conn, &notifications);
        Ok(id)
    }

    /// Update matching rows, returning the affected-row count.
    ///
    /// Matching zero rows is a zero-count success, not an error. An update
    /// with no staged values counts matching rows but writes and notifies
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns a typed error and rolls the transaction back.
    pub fn update(
        &self,
        resource: &Resource,
        values: Values,
        selection: Option<&Selection>,
    ) -> Result<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut notifications = BTreeSet::new();
        let count = self.update_in_tx(&tx, resource, &values, selection, &mut notifications)?;
        tx.commit()?;
        self.after_commit(&conn, &notifications);
        Ok(count)
    }

    /// Delete matching rows, returning the affected-row count.
    ///
    /// Unprivileged callers soft-delete tasks; privileged callers remove
    /// rows for real, triggering the cascades.
    ///
    /// # Errors
    ///
    /// Returns a typed error and rolls the transaction back.
    pub fn delete(&self, resource: &Resource, selection: Option<&Selection>) -> Result<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut notifications = BTreeSet::new();
        let count = self.delete_in_tx(&tx, resource, selection, &mut notifications)?;
        tx.commit()?;
        self.after_commit(&conn, &notifications);
        Ok(count)
    }

    /// Run a batch of operations in one atomic transaction.
    ///
    /// After an operation marked `yield_allowed` the contention budget
    /// resets; running more than [`MAX_OPERATIONS_PER_YIELD_POINT`]
    /// operations without such a point aborts the whole batch.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole batch; nothing is committed or notified.
    pub fn apply_batch(&self, operations: &[BatchOperation]) -> Result<Vec<BatchResult>> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let mut notifications = BTreeSet::new();
        let mut results = Vec::with_capacity(operations.len());
        let mut since_yield = 0_usize;

        for (index, operation) in operations.iter().enumerate() {
            if index > 0 && operation.yield_allowed() {
                // the batch stays one atomic transaction; a yield point
                // only resets the contention budget
                log::debug!("batch yield point after {since_yield} operations");
                since_yield = 0;
            }
            since_yield += 1;
            if since_yield > MAX_OPERATIONS_PER_YIELD_POINT {
                return Err(Error::Contention {
                    max_operations: MAX_OPERATIONS_PER_YIELD_POINT,
                });
            }
            let result = match operation {
                BatchOperation::Insert { resource, values, .. } => BatchResult::Inserted(
                    self.insert_in_tx(&tx, resource, values.clone(), &mut notifications)?,
                ),
                BatchOperation::Update { resource, values, selection, .. } =>
                    BatchResult::Affected(self.update_in_tx(
                        &tx,
                        resource,
                        values,
                        selection.as_ref(),
                        &mut notifications,
                    )?),
                BatchOperation::Delete { resource, selection, .. } => BatchResult::Affected(
                    self.delete_in_tx(&tx, resource, selection.as_ref(), &mut notifications)?,
                ),
            };
            results.push(result);
        }
        tx.commit()?;
        self.after_commit(&conn, &notifications);
        Ok(results)
    }

    fn insert_in_tx(
        &self,
        conn: &Connection,
        resource: &Resource,
        values: Values,
        notifications: &mut BTreeSet<String>,
    ) -> Result<i64> {
        let params = &resource.params;
        match resource.target {
            Target::Tasks => {
                let mut task = TaskAdapter::new(values);
                let mut ctx = self.context(params, notifications);
                self.pipeline.execute(conn, Operation::Insert, &mut task, &mut ctx)?;
                task.id().ok_or_else(|| Error::consistency("task insert produced no row id"))
            }
            Target::Lists => {
                let mut list = ListAdapter::new(values);
                let mut ctx = self.context(params, notifications);
                ListPipeline.execute(conn, Operation::Insert, &mut list, &mut ctx)?;
                list.id().ok_or_else(|| Error::consistency("list insert produced no row id"))
            }
            Target::Properties => {
                let mut property = PropertyAdapter::new(values);
                let mut ctx = self.context(params, notifications);
                PropertyPipeline.execute(conn, Operation::Insert, &mut property, &mut ctx)?;
                property
                    .id()
                    .ok_or_else(|| Error::consistency("property insert produced no row id"))
            }
            Target::Categories => {
                let values = account_scoped(values, params)?;
                if values.text(schema::categories::NAME)?.is_none() {
                    return Err(Error::validation("a category needs a name"));
                }
                let id =
                    crate::processor::commit::insert_row(conn, tables::CATEGORIES, &values)?;
                notifications.insert("categories".to_string());
                Ok(id)
            }
            Target::Alarms => {
                let id = crate::processor::commit::insert_row(conn, tables::ALARMS, &values)?;
                notifications.insert("alarms".to_string());
                Ok(id)
            }
            Target::SyncState => {
                require_privileged(params, "syncstate")?;
                let values = account_scoped(values, params)?;
                let id = crate::processor::commit::insert_row(conn, tables::SYNCSTATE, &values)?;
                notifications.insert("syncstate".to_string());
                Ok(id)
            }
            Target::Instances | Target::Instance(_) => Err(Error::validation(
                "instances are derived rows; write to their task instead",
            )),
            Target::TaskSearch => Err(Error::validation("the search view is read-only")),
            Target::Task(_)
            | Target::List(_)
            | Target::Property(_)
            | Target::Category(_)
            | Target::Alarm(_)
            | Target::SyncStateItem(_) => {
                Err(Error::validation("cannot insert into an item path"))
            }
        }
    }

    fn update_in_tx(
        &self,
        conn: &Connection,
        resource: &Resource,
        values: &Values,
        selection: Option<&Selection>,
        notifications: &mut BTreeSet<String>,
    ) -> Result<usize> {
        let params = &resource.params;
        match resource.target {
            Target::Tasks
            | Target::Task(_)
            | Target::Lists
            | Target::List(_)
            | Target::Properties
            | Target::Property(_) => self.run_rows(
                conn,
                Operation::Update,
                resource,
                values,
                selection,
                notifications,
            ),
            Target::Categories | Target::Category(_) => {
                let count = plain_update(
                    conn,
                    tables::CATEGORIES,
                    schema::categories::ID,
                    item_id(resource.target),
                    values,
                    selection,
                )?;
                if count > 0 {
                    notifications.insert("categories".to_string());
                }
                Ok(count)
            }
            Target::Alarms | Target::Alarm(_) => {
                let count = plain_update(
                    conn,
                    tables::ALARMS,
                    schema::alarms::ALARM_ID,
                    item_id(resource.target),
                    values,
                    selection,
                )?;
                if count > 0 {
                    notifications.insert("alarms".to_string());
                }
                Ok(count)
            }
            Target::SyncState | Target::SyncStateItem(_) => {
                require_privileged(params, "syncstate")?;
                let count = plain_update(
                    conn,
                    tables::SYNCSTATE,
                    schema::syncstate::ID,
                    item_id(resource.target),
                    values,
                    selection,
                )?;
                if count > 0 {
                    notifications.insert("syncstate".to_string());
                }
                Ok(count)
            }
            Target::Instances | Target::Instance(_) => Err(Error::validation(
                "instances are derived rows; write to their task instead",
            )),
            Target::TaskSearch => Err(Error::validation("the search view is read-only")),
        }
    }

    fn delete_in_tx(
        &self,
        conn: &Connection,
        resource: &Resource,
        selection: Option<&Selection>,
        notifications: &mut BTreeSet<String>,
    ) -> Result<usize> {
        let params = &resource.params;
        match resource.target {
            Target::Tasks
            | Target::Task(_)
            | Target::Lists
            | Target::List(_)
            | Target::Properties
            | Target::Property(_) => self.run_rows(
                conn,
                Operation::Delete,
                resource,
                &Values::new(),
                selection,
                notifications,
            ),
            Target::Categories | Target::Category(_) => {
                let count = plain_delete(
                    conn,
                    tables::CATEGORIES,
                    schema::categories::ID,
                    item_id(resource.target),
                    selection,
                )?;
                if count > 0 {
                    notifications.insert("categories".to_string());
                }
                Ok(count)
            }
            Target::Alarms | Target::Alarm(_) => {
                let count = plain_delete(
                    conn,
                    tables::ALARMS,
                    schema::alarms::ALARM_ID,
                    item_id(resource.target),
                    selection,
                )?;
                if count > 0 {
                    notifications.insert("alarms".to_string());
                }
                Ok(count)
            }
            Target::SyncState | Target::SyncStateItem(_) => {
                require_privileged(params, "syncstate")?;
                let count = plain_delete(
                    conn,
                    tables::SYNCSTATE,
                    schema::syncstate::ID,
                    item_id(resource.target),
                    selection,
                )?;
                if count > 0 {
                    notifications.insert("syncstate".to_string());
                }
                Ok(count)
            }
            Target::Instances | Target::Instance(_) => Err(Error::validation(
                "instances are derived rows; write to their task instead",
            )),
            Target::TaskSearch => Err(Error::validation("the search view is read-only")),
        }
    }

    /// Load the addressed rows and run each through its pipeline.
    fn run_rows(
        &self,
        conn: &Connection,
        op: Operation,
        resource: &Resource,
        values: &Values,
        selection: Option<&Selection>,
        notifications: &mut BTreeSet<String>,
    ) -> Result<usize> {
        let params = &resource.params;
        let (table, id_column) = match resource.target {
            Target::Tasks | Target::Task(_) => (tables::TASKS, schema::tasks::ID),
            Target::Lists | Target::List(_) => (tables::LISTS, schema::lists::ID),
            Target::Properties | Target::Property(_) => {
                (tables::PROPERTIES, schema::properties::PROPERTY_ID)
            }
            _ => return Err(Error::consistency("run_rows on unsupported target")),
        };
        // unprivileged callers never see (or touch) soft-deleted tasks
        let visibility = match resource.target {
            Target::Tasks | Target::Task(_) if !params.privileged => {
                Some(format!("{} = 0", schema::tasks::DELETED))
            }
            _ => None,
        };
        let rows = load_rows(
            conn,
            table,
            id_column,
            item_id(resource.target),
            selection,
            visibility.as_deref(),
        )?;

        let mut count = 0;
        for row in rows {
            count += 1;
            if op == Operation::Update && values.is_empty() {
                // a no-op update still counts, but writes and notifies
                // nothing
                continue;
            }
            let mut ctx = self.context(params, notifications);
            match resource.target {
                Target::Tasks | Target::Task(_) => {
                    let mut task = TaskAdapter::for_row(row, values.clone())?;
                    self.pipeline.execute(conn, op, &mut task, &mut ctx)?;
                }
                Target::Lists | Target::List(_) => {
                    let mut list = ListAdapter::for_row(row, values.clone())?;
                    ListPipeline.execute(conn, op, &mut list, &mut ctx)?;
                }
                Target::Properties | Target::Property(_) => {
                    let mut property = PropertyAdapter::for_row(row, values.clone())?;
                    PropertyPipeline.execute(conn, op, &mut property, &mut ctx)?;
                }
                _ => unreachable!("filtered above"),
            }
        }
        Ok(count)
    }

    /// Query rows of a resource.
    ///
    /// Unprivileged callers never see soft-deleted rows. Task queries may
    /// join properties with `load_properties`; `tasks/search?q=` returns
    /// relevance-ranked rows with a `score` column.
    ///
    /// # Errors
    ///
    /// Returns a typed error on invalid targets or parameters.
    pub fn query(
        &self,
        resource: &Resource,
        selection: Option<&Selection>,
        order_by: Option<&str>,
    ) -> Result<Vec<Values>> {
        let conn = self.open()?;
        let params = &resource.params;
        let deleted_filter = if params.privileged {
            None
        } else {
            Some(format!("{} = 0", schema::tasks::DELETED))
        };
        match resource.target {
            Target::Tasks | Target::Task(_) => {
                let base = if params.load_properties {
                    format!(
                        "SELECT {tv}.*, {p}.* FROM {tv}
                         LEFT JOIN {p} ON ({tv}._id = {p}.task_id)",
                        tv = tables::TASK_VIEW,
                        p = tables::PROPERTIES,
                    )
                } else {
                    format!("SELECT * FROM {}", tables::TASK_VIEW)
                };
                query_with(
                    &conn,
                    &base,
                    &format!("{}.{}", tables::TASK_VIEW, schema::tasks::ID),
                    item_id(resource.target),
                    selection,
                    deleted_filter.as_deref(),
                    order_by,
                )
            }
            Target::TaskSearch => {
                let q = params
                    .q
                    .as_deref()
                    .ok_or_else(|| Error::validation("search needs a q parameter"))?;
                self.search(&conn, q)
            }
            Target::Instances | Target::Instance(_) => query_with(
                &conn,
                &format!("SELECT * FROM {}", tables::INSTANCE_VIEW),
                schema::instances::ID,
                item_id(resource.target),
                selection,
                deleted_filter.as_deref(),
                order_by,
            ),
            Target::Lists | Target::List(_) => {
                let scoped = account_selection(selection, params, "account_name", "account_type");
                query_with(
                    &conn,
                    &format!("SELECT * FROM {}", tables::LISTS),
                    schema::lists::ID,
                    item_id(resource.target),
                    scoped.as_ref().or(selection),
                    None,
                    order_by,
                )
            }
            Target::Properties | Target::Property(_) => query_with(
                &conn,
                &format!("SELECT * FROM {}", tables::PROPERTIES),
                schema::properties::PROPERTY_ID,
                item_id(resource.target),
                selection,
                None,
                order_by,
            ),
            Target::Categories | Target::Category(_) => {
                let scoped = account_selection(selection, params, "account_name", "account_type");
                query_with(
                    &conn,
                    &format!("SELECT * FROM {}", tables::CATEGORIES),
                    schema::categories::ID,
                    item_id(resource.target),
                    scoped.as_ref().or(selection),
                    None,
                    order_by,
                )
            }
            Target::Alarms | Target::Alarm(_) => query_with(
                &conn,
                &format!("SELECT * FROM {}", tables::ALARMS),
                schema::alarms::ALARM_ID,
                item_id(resource.target),
                selection,
                None,
                order_by,
            ),
            Target::SyncState | Target::SyncStateItem(_) => {
                require_privileged(params, "syncstate")?;
                if params.account_name.is_none() || params.account_type.is_none() {
                    return Err(Error::validation("syncstate queries need an account scope"));
                }
                let scoped = account_selection(selection, params, "account_name", "account_type");
                query_with(
                    &conn,
                    &format!("SELECT * FROM {}", tables::SYNCSTATE),
                    schema::syncstate::ID,
                    item_id(resource.target),
                    scoped.as_ref().or(selection),
                    None,
                    order_by,
                )
            }
        }
    }

    /// Relevance-ranked search over visible, non-deleted tasks.
    fn search(&self, conn: &Connection, q: &str) -> Result<Vec<Values>> {
        let scored = crate::fts::search_task_ids(conn, q)?;
        let mut results = Vec::with_capacity(scored.len());
        for (task_id, score) in scored {
            let rows = query_rows(
                conn,
                &format!("SELECT * FROM {} WHERE _id = ?1", tables::TASK_VIEW),
                [task_id],
            )?;
            if let Some(mut row) = rows.into_iter().next() {
                row.put("score", Value::Real(score));
                results.push(row);
            }
        }
        Ok(results)
    }
}

fn item_id(target: Target) -> Option<i64> {
    match target {
        Target::Task(id)
        | Target::List(id)
        | Target::Instance(id)
        | Target::Property(id)
        | Target::Category(id)
        | Target::Alarm(id)
        | Target::SyncStateItem(id) => Some(id),
        _ => None,
    }
}

fn require_privileged(params: &Params, what: &str) -> Result<()> {
    if params.privileged {
        Ok(())
    } else {
        Err(Error::permission(format!("{what} is restricted to sync adapters")))
    }
}

/// Merge account parameters into the staged values, requiring both.
fn account_scoped(mut values: Values, params: &Params) -> Result<Values> {
    if !values.contains("account_name") {
        if let Some(name) = &params.account_name {
            values.put_text("account_name", name.clone());
        }
    }
    if !values.contains("account_type") {
        if let Some(account_type) = &params.account_type {
            values.put_text("account_type", account_type.clone());
        }
    }
    if values.text("account_name")?.is_none() || values.text("account_type")?.is_none() {
        return Err(Error::validation("an account name and type are required"));
    }
    Ok(values)
}

/// An extra selection restricting rows to the parameters' account.
fn account_selection(
    base: Option<&Selection>,
    params: &Params,
    name_column: &str,
    type_column: &str,
) -> Option<Selection> {
    let (name, account_type) =
        (params.account_name.as_ref()?, params.account_type.as_ref()?);
    let mut clause = format!("{name_column} = ? AND {type_column} = ?");
    let mut args = vec![
        Value::Text(name.clone()),
        Value::Text(account_type.clone()),
    ];
    if let Some(base) = base {
        clause = format!("({}) AND ({clause})", base.clause);
        let mut merged = base.args.clone();
        merged.extend(args);
        args = merged;
    }
    Some(Selection::new(clause, args))
}

/// Load matching rows of a table for the pipeline.
fn load_rows(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: Option<i64>,
    selection: Option<&Selection>,
    visibility: Option<&str>,
) -> Result<Vec<Values>> {
    query_with(
        conn,
        &format!("SELECT * FROM {table}"),
        id_column,
        id,
        selection,
        visibility,
        None,
    )
}

fn query_with(
    conn: &Connection,
    base: &str,
    id_column: &str,
    id: Option<i64>,
    selection: Option<&Selection>,
    visibility: Option<&str>,
    order_by: Option<&str>,
) -> Result<Vec<Values>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    if let Some(id) = id {
        args.push(Value::Integer(id));
        clauses.push(format!("{id_column} = ?{}", args.len()));
    }
    if let Some(selection) = selection {
        if !selection.clause.is_empty() {
            clauses.push(format!("({})", selection.clause));
            args.extend(selection.args.iter().cloned());
        }
    }
    if let Some(visibility) = visibility {
        clauses.push(visibility.to_string());
    }
    let mut sql = base.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    if let Some(order_by) = order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }
    query_rows(conn, &sql, rusqlite::params_from_iter(args))
}

fn plain_update(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: Option<i64>,
    values: &Values,
    selection: Option<&Selection>,
) -> Result<usize> {
    if values.is_empty() {
        // still count the matching rows for the caller
        return Ok(load_rows(conn, table, id_column, id, selection, None)?.len());
    }
    let mut assignments: Vec<String> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    for (column, value) in values.iter() {
        args.push(value.clone());
        assignments.push(format!("{column} = ?{}", args.len()));
    }
    let mut clauses: Vec<String> = Vec::new();
    if let Some(id) = id {
        args.push(Value::Integer(id));
        clauses.push(format!("{id_column} = ?{}", args.len()));
    }
    let mut sql = format!("UPDATE {table} SET {}", assignments.join(", "));
    if let Some(selection) = selection {
        if !selection.clause.is_empty() {
            clauses.push(format!("({})", selection.clause));
            args.extend(selection.args.iter().cloned());
        }
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    Ok(conn.execute(&sql, rusqlite::params_from_iter(args))?)
}

fn plain_delete(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: Option<i64>,
    selection: Option<&Selection>,
) -> Result<usize> {
    let mut clauses: Vec<String> = Vec::new();
    let mut args: Vec<Value> = Vec::new();
    if let Some(id) = id {
        args.push(Value::Integer(id));
        clauses.push(format!("{id_column} = ?{}", args.len()));
    }
    if let Some(selection) = selection {
        if !selection.clause.is_empty() {
            clauses.push(format!("({})", selection.clause));
            args.extend(selection.args.iter().cloned());
        }
    }
    let mut sql = format!("DELETE FROM {table}");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    Ok(conn.execute(&sql, rusqlite::params_from_iter(args))?)
}
