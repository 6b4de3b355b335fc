//! Privileged maintenance operations.
//!
//! These recompute derived state that depends on "now" or on the local
//! timezone: instance distances, sort surrogates and the next wake-up
//! time. A process-wide lock serializes them so at most one runs at a
//! time; long-running work can be pushed to a background worker thread
//! whose effects become visible only once its own transaction commits.

use crate::error::Result;
use crate::instances::sync_master_instances;
use crate::model::TaskAdapter;
use crate::provider::TaskProvider;
use crate::rows::query_rows;
use crate::schema::{tables, tasks as tcols, LOCAL_ACCOUNT_TYPE};
use crate::values::Values;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::thread::JoinHandle;

/// Serializes maintenance work process-wide.
static MAINTENANCE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// An account known to the account registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// The account name.
    pub name: String,
    /// The account type.
    pub account_type: String,
}

impl TaskProvider {
    /// Recompute "now"-dependent instance state.
    ///
    /// This re-evaluates `distance_from_current` and the closed-occurrence
    /// classification of every task's instance set and reschedules the
    /// next wake-up. Occurrence existence never changes here.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh transaction fails; nothing is
    /// committed in that case.
    ///
    /// # Panics
    ///
    /// Panics if the maintenance lock is poisoned.
    pub fn refresh_now(&self) -> Result<()> {
        let _guard = MAINTENANCE_LOCK.lock().unwrap();
        self.resync_all_instances()
    }

    /// Run [`TaskProvider::refresh_now`] on a background worker.
    ///
    /// The calling thread is not blocked; the worker commits (or rolls
    /// back) its own transaction.
    #[must_use]
    pub fn refresh_in_background(&self) -> JoinHandle<()> {
        let provider = self.clone();
        std::thread::spawn(move || {
            if let Err(error) = provider.refresh_now() {
                log::warn!("background refresh failed: {error}");
            }
        })
    }

    /// Switch the local timezone and resort all instances.
    ///
    /// Sort surrogates of timed occurrences depend on the local zone, so
    /// the whole instances table is recomputed under the new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the resort transaction fails.
    ///
    /// # Panics
    ///
    /// Panics if the maintenance lock is poisoned.
    pub fn set_local_timezone(&self, tz: Tz) -> Result<()> {
        let _guard = MAINTENANCE_LOCK.lock().unwrap();
        self.swap_local_timezone(tz);
        self.resync_all_instances()
    }

    /// The next upcoming start or due timestamp across all open instances.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub fn next_wakeup(&self) -> Result<Option<i64>> {
        let conn = self.open()?;
        next_wakeup_at(&conn, self.clock_now())
    }

    /// Drop lists (and, via the cascades, their tasks) whose account no
    /// longer exists in the registry. Local-only lists are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup transaction fails.
    pub fn prune_lists(&self, accounts: &[Account]) -> Result<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let doomed = query_rows(
            &tx,
            &format!(
                "SELECT _id, account_name, account_type FROM {} WHERE account_type != ?1",
                tables::LISTS
            ),
            [LOCAL_ACCOUNT_TYPE],
        )?;
        let mut removed = 0;
        for row in doomed {
            let name = row.text("account_name")?.unwrap_or_default();
            let account_type = row.text("account_type")?.unwrap_or_default();
            let known = accounts
                .iter()
                .any(|a| a.name == name && a.account_type == account_type);
            if known {
                continue;
            }
            if let Some(id) = row.integer("_id")? {
                log::info!("pruning list {id} of vanished account {name}/{account_type}");
                tx.execute(&format!("DELETE FROM {} WHERE _id = ?1", tables::LISTS), [id])?;
                removed += 1;
            }
        }
        tx.commit()?;
        if removed > 0 {
            let notifications: BTreeSet<String> =
                ["lists", "tasks", "instances"].iter().map(ToString::to_string).collect();
            self.deliver(&notifications);
        }
        Ok(removed)
    }

    /// Resync every task's instance set in one transaction.
    fn resync_all_instances(&self) -> Result<()> {
        let local = self.local_timezone();
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let masters = query_rows(
            &tx,
            &format!(
                "SELECT * FROM {} WHERE {} IS NULL",
                tables::TASKS,
                tcols::ORIGINAL_INSTANCE_ID
            ),
            [],
        )?;
        let mut changed = false;
        for row in masters {
            let master = TaskAdapter::for_row(row, Values::new())?;
            changed |= sync_master_instances(&tx, &master, local)?;
        }
        tx.commit()?;
        if changed {
            let notifications: BTreeSet<String> =
                std::iter::once("instances".to_string()).collect();
            self.deliver(&notifications);
        }
        if let Err(error) = reschedule_wakeup(self, &conn) {
            log::warn!("wake-up rescheduling failed: {error}");
        }
        Ok(())
    }
}

/// Report the next wake-up time to the scheduler, if one is attached.
pub(crate) fn reschedule_wakeup(provider: &TaskProvider, conn: &Connection) -> Result<()> {
    let Some(scheduler) = provider.scheduler() else {
        return Ok(());
    };
    if let Some(at) = next_wakeup_at(conn, provider.clock_now())? {
        scheduler.schedule(at);
    }
    Ok(())
}

/// The earliest future start or due over open, visible instances.
fn next_wakeup_at(conn: &Connection, now: i64) -> Result<Option<i64>> {
    let next: Option<i64> = conn.query_row(
        &format!(
            "SELECT min(t) FROM (
                 SELECT instance_start AS t FROM {view}
                 WHERE is_closed = 0 AND _deleted = 0 AND instance_start > ?1
                 UNION ALL
                 SELECT instance_due AS t FROM {view}
                 WHERE is_closed = 0 AND _deleted = 0 AND instance_due > ?1
             )",
            view = tables::INSTANCE_VIEW
        ),
        [now],
        |row| row.get(0),
    )?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, Selection, Target};
    use crate::traits::{FixedClock, RecordingScheduler};
    use rusqlite::types::Value;
    use std::sync::Arc;
    use tempfile::TempDir;

    const DAY0: i64 = 1_700_006_400_000;

    fn provider() -> (TempDir, TaskProvider) {
        let dir = TempDir::new().unwrap();
        let provider = TaskProvider::new(dir.path().join("tasks.sqlite3"))
            .unwrap()
            .with_clock(Arc::new(FixedClock(DAY0 - 1000)));
        (dir, provider)
    }

    fn local_list(provider: &TaskProvider) -> i64 {
        let mut values = Values::new();
        values
            .put_text("account_name", "me")
            .put_text("account_type", LOCAL_ACCOUNT_TYPE)
            .put_text("list_name", "inbox");
        provider.insert(&Resource::of(Target::Lists), values).unwrap()
    }

    #[test]
    fn test_next_wakeup_picks_earliest_open_time() {
        let (_dir, provider) = provider();
        let list = local_list(&provider);

        let mut due_later = Values::new();
        due_later.put_integer("list_id", list).put_text("title", "later").put_integer(
            "due",
            DAY0 + 5000,
        );
        provider.insert(&Resource::of(Target::Tasks), due_later).unwrap();

        let mut due_soon = Values::new();
        due_soon.put_integer("list_id", list).put_text("title", "soon").put_integer(
            "due",
            DAY0 + 1000,
        );
        provider.insert(&Resource::of(Target::Tasks), due_soon).unwrap();

        assert_eq!(provider.next_wakeup().unwrap(), Some(DAY0 + 1000));
    }

    #[test]
    fn test_commits_feed_the_scheduler() {
        let (_dir, base) = provider();
        let scheduler = Arc::new(RecordingScheduler::new());
        let provider = base.with_scheduler(Arc::clone(&scheduler) as Arc<dyn crate::traits::Scheduler>);
        let list = local_list(&provider);

        let mut values = Values::new();
        values.put_integer("list_id", list).put_text("title", "wake me").put_integer(
            "due",
            DAY0 + 1000,
        );
        provider.insert(&Resource::of(Target::Tasks), values).unwrap();
        assert_eq!(scheduler.last_scheduled(), Some(DAY0 + 1000));
    }

    #[test]
    fn test_prune_lists_keeps_local_and_known_accounts() {
        let (_dir, provider) = provider();
        let local = local_list(&provider);

        let mut synced = Values::new();
        synced
            .put_text("account_name", "bob")
            .put_text("account_type", "com.example.caldav")
            .put_text("list_name", "remote");
        let remote =
            provider.insert(&Resource::of(Target::Lists).privileged(), synced).unwrap();

        let mut orphaned = Values::new();
        orphaned
            .put_text("account_name", "eve")
            .put_text("account_type", "com.example.caldav")
            .put_text("list_name", "stale");
        provider.insert(&Resource::of(Target::Lists).privileged(), orphaned).unwrap();

        let removed = provider
            .prune_lists(&[Account {
                name: "bob".to_string(),
                account_type: "com.example.caldav".to_string(),
            }])
            .unwrap();
        assert_eq!(removed, 1);

        let remaining = provider.query(&Resource::of(Target::Lists), None, None).unwrap();
        let ids: Vec<i64> =
            remaining.iter().map(|r| r.integer("_id").unwrap().unwrap()).collect();
        assert!(ids.contains(&local));
        assert!(ids.contains(&remote));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_timezone_switch_resorts_instances() {
        let (_dir, provider) = provider();
        let list = local_list(&provider);

        let mut values = Values::new();
        values
            .put_integer("list_id", list)
            .put_text("title", "timed")
            .put_integer("dtstart", DAY0)
            .put_text("tz", "UTC");
        let task = provider.insert(&Resource::of(Target::Tasks), values).unwrap();

        let sorting_utc: i64 = {
            let rows = provider
                .query(
                    &Resource::of(Target::Instances),
                    Some(&Selection::new("task_id = ?", vec![Value::Integer(task)])),
                    None,
                )
                .unwrap();
            rows[0].integer("instance_start_sorting").unwrap().unwrap()
        };

        provider.set_local_timezone(crate::time::parse_tz("Asia/Tokyo").unwrap()).unwrap();

        let rows = provider
            .query(
                &Resource::of(Target::Instances),
                Some(&Selection::new("task_id = ?", vec![Value::Integer(task)])),
                None,
            )
            .unwrap();
        let sorting_tokyo = rows[0].integer("instance_start_sorting").unwrap().unwrap();
        // Tokyo wall clock is nine hours ahead of UTC
        assert_eq!(sorting_tokyo - sorting_utc, 9 * 3_600_000);
    }
}
