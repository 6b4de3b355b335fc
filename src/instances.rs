//! The recurrence instantiation engine.
//!
//! Recomputes the derived instance rows of a task and syncs them into the
//! instances table in place: unchanged occurrences keep their row ids, so
//! external identifiers referencing an instance stay stable across
//! unrelated edits. The instance set of a master task is the disjoint
//! union, keyed by occurrence time, of master-derived rows and rows taken
//! from its overrides; an occurrence consumed by an override never also
//! gets a master-derived row.

use crate::error::{Error, Result};
use crate::model::{InstanceAdapter, TaskAdapter};
use crate::rows::{load_row, query_rows};
use crate::schema::{instances as icols, tables, tasks as tcols};
use crate::time::TaskTime;
use crate::values::Values;
use chrono_tz::Tz;
use rusqlite::Connection;
use std::collections::BTreeMap;

/// The computed data of one expected instance row.
#[derive(Debug, Clone)]
struct InstanceData {
    task_id: i64,
    start: Option<TaskTime>,
    due: Option<TaskTime>,
    original_time: Option<i64>,
    closed: bool,
}

impl InstanceData {
    /// The row values, including the sort surrogates, without the distance.
    fn values(&self, local: Tz) -> Values {
        let mut values = Values::new();
        values.put_integer(icols::TASK_ID, self.task_id);
        values.put_opt_integer(icols::INSTANCE_START, self.start.map(|t| t.timestamp()));
        values.put_opt_integer(
            icols::INSTANCE_START_SORTING,
            self.start.map(|t| t.sort_key(local)),
        );
        values.put_opt_integer(icols::INSTANCE_DUE, self.due.map(|t| t.timestamp()));
        values.put_opt_integer(icols::INSTANCE_DUE_SORTING, self.due.map(|t| t.sort_key(local)));
        values.put_opt_integer(
            icols::INSTANCE_DURATION,
            match (self.start, self.due) {
                (Some(start), Some(due)) => Some(due.timestamp() - start.timestamp()),
                _ => None,
            },
        );
        values.put_opt_integer(icols::INSTANCE_ORIGINAL_TIME, self.original_time);
        values
    }

    /// The diff key; instances without an original time sort first.
    fn key(&self) -> i64 {
        self.original_time.unwrap_or(i64::MIN)
    }
}

/// The single instance a task describes with its own fields.
fn own_instance_data(task: &TaskAdapter, task_id: i64) -> Result<InstanceData> {
    let start = task.dtstart()?;
    let due = match task.due()? {
        Some(due) => Some(due),
        None => match (start, task.duration()?) {
            (Some(start), Some(duration)) => Some(start.plus_millis(duration.as_millis())),
            _ => None,
        },
    };
    Ok(InstanceData {
        task_id,
        start,
        due,
        original_time: task.original_time()?.map(|t| t.timestamp()),
        closed: task.status()?.is_closed(),
    })
}

/// The full expected instance set of a master (or single, or dangling
/// override) task, sorted by occurrence time.
fn expected_instances(
    conn: &Connection,
    master: &TaskAdapter,
    master_id: i64,
) -> Result<Vec<InstanceData>> {
    // overrides contribute their own values at their declared time
    let override_rows = query_rows(
        conn,
        &format!(
            "SELECT * FROM {} WHERE {} = ?1 AND {} = 0 ORDER BY {}",
            tables::TASKS,
            tcols::ORIGINAL_INSTANCE_ID,
            tcols::DELETED,
            tcols::ORIGINAL_INSTANCE_TIME
        ),
        [master_id],
    )?;
    let mut overrides: BTreeMap<i64, InstanceData> = BTreeMap::new();
    for row in override_rows {
        let adapter = TaskAdapter::for_row(row, Values::new())?;
        let id = adapter.id().unwrap_or_default();
        let data = own_instance_data(&adapter, id)?;
        if let Some(time) = data.original_time {
            overrides.insert(time, data);
        }
    }

    if master.deleted()? {
        // a soft-deleted master contributes no occurrences of its own
        return Ok(overrides.into_values().collect());
    }

    let recurrence = master.recurrence_set()?;
    if !recurrence.is_recurring() {
        let mut expected: Vec<InstanceData> = overrides.into_values().collect();
        expected.push(own_instance_data(master, master_id)?);
        expected.sort_by_key(InstanceData::key);
        return Ok(expected);
    }

    let start = master.dtstart()?.ok_or_else(|| {
        Error::consistency("recurring task has no start to expand from")
    })?;
    let duration_millis = match master.duration()? {
        Some(duration) => Some(duration.as_millis()),
        None => master.due()?.map(|due| due.timestamp() - start.timestamp()),
    };
    let closed = master.status()?.is_closed();

    let mut expected: BTreeMap<i64, InstanceData> = BTreeMap::new();
    for occurrence in recurrence.occurrences(start)? {
        let time = occurrence.timestamp();
        let data = overrides.remove(&time).unwrap_or_else(|| InstanceData {
            task_id: master_id,
            start: Some(occurrence),
            due: duration_millis.map(|d| occurrence.plus_millis(d)),
            original_time: Some(time),
            closed,
        });
        expected.insert(time, data);
    }
    // overrides at times outside the recurrence set are tolerated
    expected.extend(overrides);
    Ok(expected.into_values().collect())
}

/// Sync the instance rows of a master (or single) task in place.
///
/// Returns whether any row was inserted, updated or deleted.
///
/// # Errors
///
/// Returns a consistency error when expansion fails and a database error
/// when the sync itself does.
pub fn sync_master_instances(
    conn: &Connection,
    master: &TaskAdapter,
    local: Tz,
) -> Result<bool> {
    let master_id = master
        .id()
        .ok_or_else(|| Error::consistency("cannot instantiate a task without a row id"))?;

    let expected = expected_instances(conn, master, master_id)?;

    // assign distances in occurrence order: closed occurrences before the
    // first open one get -1, the first open one 0, everything after counts up
    let mut rows: Vec<Values> = Vec::with_capacity(expected.len());
    let mut distance: i64 = -1;
    for data in &expected {
        let assigned = if distance >= 0 {
            distance + 1
        } else if data.closed {
            -1
        } else {
            0
        };
        if assigned >= 0 {
            distance = assigned;
        }
        let mut values = data.values(local);
        values.put_integer(icols::DISTANCE_FROM_CURRENT, assigned);
        rows.push(values);
    }

    let existing: Vec<InstanceAdapter> = query_rows(
        conn,
        &format!(
            "SELECT * FROM {table} WHERE {task} = ?1
             OR {task} IN (SELECT {id} FROM {tasks} WHERE {orig} = ?1)
             ORDER BY {time}",
            table = tables::INSTANCES,
            task = icols::TASK_ID,
            id = tcols::ID,
            tasks = tables::TASKS,
            orig = tcols::ORIGINAL_INSTANCE_ID,
            time = icols::INSTANCE_ORIGINAL_TIME,
        ),
        [master_id],
    )?
    .into_iter()
    .map(InstanceAdapter::for_row)
    .collect::<Result<_>>()?;

    let mut changed = false;
    let mut new_iter = expected.iter().zip(rows).peekable();
    let mut old_iter = existing.into_iter().peekable();

    loop {
        let advance = match (new_iter.peek(), old_iter.peek()) {
            (None, None) => break,
            (Some(_), None) => Advance::Insert,
            (None, Some(_)) => Advance::Delete,
            (Some((data, _)), Some(old)) => {
                let old_key = old.original_time()?.unwrap_or(i64::MIN);
                match data.key().cmp(&old_key) {
                    std::cmp::Ordering::Less => Advance::Insert,
                    std::cmp::Ordering::Greater => Advance::Delete,
                    std::cmp::Ordering::Equal => Advance::Update,
                }
            }
        };
        match advance {
            Advance::Insert => {
                let (_, values) = new_iter.next().expect("peeked");
                insert_instance(conn, &values)?;
                changed = true;
            }
            Advance::Delete => {
                let old = old_iter.next().expect("peeked");
                conn.execute(
                    &format!("DELETE FROM {} WHERE {} = ?1", tables::INSTANCES, icols::ID),
                    [old.id()],
                )?;
                changed = true;
            }
            Advance::Update => {
                let (_, values) = new_iter.next().expect("peeked");
                let old = old_iter.next().expect("peeked");
                changed |= update_instance(conn, &values, &old)?;
            }
        }
    }
    Ok(changed)
}

enum Advance {
    Insert,
    Delete,
    Update,
}

fn insert_instance(conn: &Connection, values: &Values) -> Result<()> {
    let columns: Vec<&str> = values.columns().collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        tables::INSTANCES,
        columns.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, rusqlite::params_from_iter(values.iter().map(|(_, v)| v.clone())))?;
    Ok(())
}

/// Update only the columns that actually differ; returns whether anything
/// was written.
fn update_instance(conn: &Connection, new: &Values, old: &InstanceAdapter) -> Result<bool> {
    let null = rusqlite::types::Value::Null;
    let mut assignments = Vec::new();
    let mut args = Vec::new();
    for (column, value) in new.iter() {
        let old_value = old.row().get(column).unwrap_or(&null);
        if old_value != value {
            args.push(value.clone());
            assignments.push(format!("{} = ?{}", column, args.len()));
        }
    }
    if assignments.is_empty() {
        return Ok(false);
    }
    args.push(rusqlite::types::Value::Integer(old.id()));
    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?{}",
        tables::INSTANCES,
        assignments.join(", "),
        icols::ID,
        args.len()
    );
    conn.execute(&sql, rusqlite::params_from_iter(args))?;
    Ok(true)
}

/// Sync instances for any task: overrides delegate to their master's set.
///
/// # Errors
///
/// Returns a consistency error when expansion fails and a database error
/// when the sync itself does.
pub fn sync_task_instances(conn: &Connection, task: &TaskAdapter, local: Tz) -> Result<bool> {
    if task.is_override()? {
        if let Some(master_id) = task.original_instance_id()? {
            if let Some(row) = load_row(conn, tables::TASKS, tcols::ID, master_id)? {
                let master = TaskAdapter::for_row(row, Values::new())?;
                return sync_master_instances(conn, &master, local);
            }
        }
        // dangling override, tolerated: it owns its single instance
    }
    sync_master_instances(conn, task, local)
}

/// Remove every instance row of a task.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub fn delete_task_instances(conn: &Connection, task_id: i64) -> Result<usize> {
    Ok(conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", tables::INSTANCES, icols::TASK_ID),
        [task_id],
    )?)
}
