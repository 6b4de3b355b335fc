//! End-to-end tests for the task provider.

use std::sync::Arc;
use taskvault::provider::{BatchOperation, BatchResult, TaskProvider};
use taskvault::resource::{Resource, Selection, Target};
use taskvault::traits::{FixedClock, RecordingSink};
use taskvault::values::Values;
use taskvault::{Error, Status};
use tempfile::TempDir;

const MILLIS_PER_DAY: i64 = 86_400_000;
/// A midnight-aligned reference time.
const DAY0: i64 = 1_700_006_400_000;
const NOW: i64 = DAY0 - 3_600_000;

fn provider() -> (TempDir, TaskProvider, Arc<RecordingSink>) {
    let dir = TempDir::new().unwrap();
    let sink = Arc::new(RecordingSink::new());
    let provider = TaskProvider::new(dir.path().join("tasks.sqlite3"))
        .unwrap()
        .with_clock(Arc::new(FixedClock(NOW)))
        .with_change_sink(Arc::clone(&sink) as Arc<dyn taskvault::ChangeSink>);
    (dir, provider, sink)
}

fn local_list(provider: &TaskProvider) -> i64 {
    let mut values = Values::new();
    values
        .put_text("account_name", "me")
        .put_text("account_type", "LOCAL")
        .put_text("list_name", "inbox");
    provider.insert(&Resource::of(Target::Lists), values).unwrap()
}

fn insert_task(provider: &TaskProvider, list: i64, build: impl FnOnce(&mut Values)) -> i64 {
    let mut values = Values::new();
    values.put_integer("list_id", list);
    build(&mut values);
    provider.insert(&Resource::of(Target::Tasks), values).unwrap()
}

fn task_instances(provider: &TaskProvider, task: i64) -> Vec<Values> {
    // the master's own rows plus rows contributed by its overrides
    provider
        .query(
            &Resource::of(Target::Instances),
            Some(&Selection::new(
                "task_id = ? OR original_instance_id = ?",
                vec![task.into(), task.into()],
            )),
            Some("instance_original_time"),
        )
        .unwrap()
}

#[test]
fn test_plain_task_gets_one_empty_instance() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "Buy milk");
    });

    let instances = task_instances(&provider, task);
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].integer("instance_start").unwrap(), None);
    assert_eq!(instances[0].integer("instance_due").unwrap(), None);
    assert_eq!(instances[0].integer("distance_from_current").unwrap(), Some(0));
}

#[test]
fn test_completing_sets_percent_and_timestamp() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "Buy milk");
    });

    let mut change = Values::new();
    change.put_integer("status", Status::Completed.as_i64());
    let affected =
        provider.update(&Resource::of(Target::Task(task)), change, None).unwrap();
    assert_eq!(affected, 1);

    let rows = provider.query(&Resource::of(Target::Task(task)), None, None).unwrap();
    assert_eq!(rows[0].integer("percent_complete").unwrap(), Some(100));
    assert_eq!(rows[0].integer("completed").unwrap(), Some(NOW));
    assert_eq!(rows[0].integer("is_closed").unwrap(), Some(1));
}

#[test]
fn test_daily_count_three_instances() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "water the plants")
            .put_text("rrule", "FREQ=DAILY;COUNT=3")
            .put_integer("dtstart", DAY0);
    });

    let instances = task_instances(&provider, task);
    let starts: Vec<i64> =
        instances.iter().map(|r| r.integer("instance_start").unwrap().unwrap()).collect();
    assert_eq!(starts, vec![DAY0, DAY0 + MILLIS_PER_DAY, DAY0 + 2 * MILLIS_PER_DAY]);
}

#[test]
fn test_override_wins_only_its_occurrence() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let master = insert_task(&provider, list, |v| {
        v.put_text("title", "Buy milk")
            .put_text("rrule", "FREQ=DAILY;COUNT=3")
            .put_integer("dtstart", DAY0);
    });
    let rdate_before: Option<String> = {
        let rows = provider.query(&Resource::of(Target::Task(master)), None, None).unwrap();
        rows[0].text("rdate").unwrap().map(ToString::to_string)
    };

    insert_task(&provider, list, |v| {
        v.put_text("title", "Buy milk (urgent)")
            .put_integer("dtstart", DAY0 + MILLIS_PER_DAY)
            .put_integer("original_instance_id", master)
            .put_integer("original_instance_time", DAY0 + MILLIS_PER_DAY);
    });

    let instances = task_instances(&provider, master);
    assert_eq!(instances.len(), 3);
    let titles: Vec<String> =
        instances.iter().map(|r| r.text("title").unwrap().unwrap().to_string()).collect();
    assert_eq!(titles, vec!["Buy milk", "Buy milk (urgent)", "Buy milk"]);

    // overriding an occurrence of an already-recurring master leaves its
    // recurrence fields alone
    let rows = provider.query(&Resource::of(Target::Task(master)), None, None).unwrap();
    assert_eq!(rows[0].text("rdate").unwrap().map(ToString::to_string), rdate_before);
}

#[test]
fn test_deleting_override_restores_master_occurrence() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let master = insert_task(&provider, list, |v| {
        v.put_text("title", "Buy milk")
            .put_text("rrule", "FREQ=DAILY;COUNT=3")
            .put_integer("dtstart", DAY0);
    });
    let override_id = insert_task(&provider, list, |v| {
        v.put_text("title", "Buy milk (urgent)")
            .put_integer("dtstart", DAY0 + MILLIS_PER_DAY)
            .put_integer("original_instance_id", master)
            .put_integer("original_instance_time", DAY0 + MILLIS_PER_DAY);
    });

    // the sync adapter removes the override for real
    provider
        .delete(&Resource::of(Target::Task(override_id)).privileged(), None)
        .unwrap();

    let instances = task_instances(&provider, master);
    let titles: Vec<String> =
        instances.iter().map(|r| r.text("title").unwrap().unwrap().to_string()).collect();
    assert_eq!(titles, vec!["Buy milk", "Buy milk", "Buy milk"]);
}

#[test]
fn test_due_and_duration_round_trips() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);

    let with_due = insert_task(&provider, list, |v| {
        v.put_text("title", "due").put_integer("due", DAY0);
    });
    let rows = provider.query(&Resource::of(Target::Task(with_due)), None, None).unwrap();
    assert_eq!(rows[0].integer("due").unwrap(), Some(DAY0));
    assert_eq!(rows[0].text("duration").unwrap(), None);

    let with_duration = insert_task(&provider, list, |v| {
        v.put_text("title", "duration").put_integer("dtstart", DAY0).put_text("duration", "P2D");
    });
    let instances = task_instances(&provider, with_duration);
    assert_eq!(instances[0].integer("instance_due").unwrap(), Some(DAY0 + 2 * MILLIS_PER_DAY));
    // duration is never exposed on the instance projection
    assert_eq!(instances[0].text("duration").unwrap(), None);
    assert_eq!(instances[0].integer("duration").unwrap(), None);
}

#[test]
fn test_conflicting_due_and_duration_rejected() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let mut values = Values::new();
    values
        .put_integer("list_id", list)
        .put_integer("dtstart", DAY0)
        .put_integer("due", DAY0 + 1000)
        .put_text("duration", "P1D");
    let result = provider.insert(&Resource::of(Target::Tasks), values);
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn test_version_is_monotonic() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "versioned");
    });

    let mut last = -1;
    for title in ["one", "two", "three"] {
        let mut change = Values::new();
        change.put_text("title", title);
        provider.update(&Resource::of(Target::Task(task)), change, None).unwrap();
        let rows = provider.query(&Resource::of(Target::Task(task)), None, None).unwrap();
        let version = rows[0].integer("version").unwrap().unwrap();
        assert!(version > last, "version {version} did not grow past {last}");
        last = version;
    }
}

#[test]
fn test_search_round_trip_and_delete() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "Fix the leaky kitchen faucet");
    });

    let found = provider
        .query(&Resource::parse("tasks/search?q=faucet").unwrap(), None, None)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].integer("_id").unwrap(), Some(task));
    let score = match found[0].get("score") {
        Some(rusqlite::types::Value::Real(score)) => *score,
        other => panic!("missing score column: {other:?}"),
    };
    assert!(score >= 0.33);

    provider.delete(&Resource::of(Target::Task(task)), None).unwrap();
    let found = provider
        .query(&Resource::parse("tasks/search?q=faucet").unwrap(), None, None)
        .unwrap();
    assert!(found.is_empty());
}

#[test]
fn test_soft_delete_hides_rows_from_ordinary_callers() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "shy");
    });

    let affected = provider.delete(&Resource::of(Target::Task(task)), None).unwrap();
    assert_eq!(affected, 1);

    // invisible to ordinary reads, still there for the sync adapter
    assert!(provider.query(&Resource::of(Target::Task(task)), None, None).unwrap().is_empty());
    let privileged =
        provider.query(&Resource::of(Target::Task(task)).privileged(), None, None).unwrap();
    assert_eq!(privileged.len(), 1);
    assert_eq!(privileged[0].integer("_deleted").unwrap(), Some(1));

    // deleting the invisible row again affects nothing
    assert_eq!(provider.delete(&Resource::of(Target::Task(task)), None).unwrap(), 0);
}

#[test]
fn test_zero_affected_rows_is_success() {
    let (_dir, provider, _sink) = provider();
    let mut change = Values::new();
    change.put_text("title", "nobody");
    assert_eq!(
        provider.update(&Resource::of(Target::Task(4711)), change, None).unwrap(),
        0
    );
    assert_eq!(provider.delete(&Resource::of(Target::Task(4711)), None).unwrap(), 0);
}

#[test]
fn test_empty_update_counts_but_does_not_notify() {
    let (_dir, provider, sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "quiet");
    });
    sink.clear();

    let affected =
        provider.update(&Resource::of(Target::Task(task)), Values::new(), None).unwrap();
    assert_eq!(affected, 1);
    assert!(sink.notifications().is_empty());
}

#[test]
fn test_notifications_deduplicated_per_transaction() {
    let (_dir, provider, sink) = provider();
    let list = local_list(&provider);
    sink.clear();

    insert_task(&provider, list, |v| {
        v.put_text("title", "one")
            .put_text("rrule", "FREQ=DAILY;COUNT=5")
            .put_integer("dtstart", DAY0);
    });
    // five instance rows, one logical change: each resource exactly once
    assert_eq!(sink.notifications(), vec!["instances".to_string(), "tasks".to_string()]);
}

#[test]
fn test_rollback_notifies_nothing() {
    let (_dir, provider, sink) = provider();
    let list = local_list(&provider);
    sink.clear();

    let mut values = Values::new();
    values.put_integer("list_id", list).put_text("rrule", "FREQ=BROKEN").put_integer(
        "dtstart",
        DAY0,
    );
    assert!(provider.insert(&Resource::of(Target::Tasks), values).is_err());
    assert!(sink.notifications().is_empty());
}

#[test]
fn test_unprivileged_sync_field_write_denied() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let mut values = Values::new();
    values.put_integer("list_id", list).put_text("_sync_id", "mine-now");
    assert!(matches!(
        provider.insert(&Resource::of(Target::Tasks), values),
        Err(Error::Permission(_))
    ));
}

#[test]
fn test_syncstate_requires_privilege_and_account() {
    let (_dir, provider, _sink) = provider();
    let mut values = Values::new();
    values.put_text("data", "opaque");
    let unprivileged = Resource::parse("syncstate?account_name=bob&account_type=x").unwrap();
    assert!(matches!(
        provider.insert(&unprivileged, values.clone()),
        Err(Error::Permission(_))
    ));

    let privileged = Resource::parse(
        "syncstate?account_name=bob&account_type=x&caller_is_privileged=true",
    )
    .unwrap();
    provider.insert(&privileged, values).unwrap();
    let rows = provider.query(&privileged, None, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("account_name").unwrap(), Some("bob"));
}

#[test]
fn test_instances_are_read_only() {
    let (_dir, provider, _sink) = provider();
    let mut values = Values::new();
    values.put_integer("task_id", 1);
    assert!(provider.insert(&Resource::of(Target::Instances), values.clone()).is_err());
    assert!(provider.update(&Resource::of(Target::Instance(1)), values, None).is_err());
    assert!(provider.delete(&Resource::of(Target::Instance(1)), None).is_err());
}

#[test]
fn test_batch_without_yield_points_aborts() {
    let (_dir, provider, sink) = provider();
    let list = local_list(&provider);
    sink.clear();

    let operations: Vec<BatchOperation> = (0..501)
        .map(|i| {
            let mut values = Values::new();
            values.put_integer("list_id", list).put_text("title", format!("task {i}"));
            BatchOperation::Insert {
                resource: Resource::of(Target::Tasks),
                values,
                yield_allowed: false,
            }
        })
        .collect();

    assert!(matches!(
        provider.apply_batch(&operations),
        Err(Error::Contention { max_operations: 500 })
    ));

    // the whole batch rolled back and nobody was notified
    let tasks = provider.query(&Resource::of(Target::Tasks), None, None).unwrap();
    assert!(tasks.is_empty());
    assert!(sink.notifications().is_empty());
}

#[test]
fn test_batch_with_yield_points_commits_atomically() {
    let (_dir, provider, sink) = provider();
    let list = local_list(&provider);
    sink.clear();

    let operations: Vec<BatchOperation> = (0..501)
        .map(|i| {
            let mut values = Values::new();
            values.put_integer("list_id", list).put_text("title", format!("task {i}"));
            BatchOperation::Insert {
                resource: Resource::of(Target::Tasks),
                values,
                yield_allowed: i == 400,
            }
        })
        .collect();

    let results = provider.apply_batch(&operations).unwrap();
    assert_eq!(results.len(), 501);
    assert!(matches!(results[0], BatchResult::Inserted(_)));

    let tasks = provider.query(&Resource::of(Target::Tasks), None, None).unwrap();
    assert_eq!(tasks.len(), 501);
    // one transaction, one notification per resource
    assert_eq!(sink.notifications(), vec!["instances".to_string(), "tasks".to_string()]);
}

#[test]
fn test_load_properties_joins_property_rows() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "with notes");
    });
    let mut property = Values::new();
    property
        .put_integer("task_id", task)
        .put_text("mimetype", "vnd.taskvault.property/comment")
        .put_text("data0", "the fine print");
    provider.insert(&Resource::of(Target::Properties), property).unwrap();

    let resource = Resource::parse(&format!("tasks/{task}?load_properties=true")).unwrap();
    let rows = provider.query(&resource, None, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].text("mimetype").unwrap(), Some("vnd.taskvault.property/comment"));
    assert_eq!(rows[0].text("data0").unwrap(), Some("the fine print"));
    assert_eq!(rows[0].integer("has_properties").unwrap(), Some(1));
}

#[test]
fn test_reopening_completed_task_clears_completed() {
    let (_dir, provider, _sink) = provider();
    let list = local_list(&provider);
    let task = insert_task(&provider, list, |v| {
        v.put_text("title", "flip flop");
    });

    let mut complete = Values::new();
    complete.put_integer("percent_complete", 100);
    provider.update(&Resource::of(Target::Task(task)), complete, None).unwrap();
    let rows = provider.query(&Resource::of(Target::Task(task)), None, None).unwrap();
    assert_eq!(rows[0].integer("status").unwrap(), Some(Status::Completed.as_i64()));

    let mut reopen = Values::new();
    reopen.put_integer("status", Status::NeedsAction.as_i64());
    provider.update(&Resource::of(Target::Task(task)), reopen, None).unwrap();
    let rows = provider.query(&Resource::of(Target::Task(task)), None, None).unwrap();
    assert_eq!(rows[0].integer("completed").unwrap(), None);
    assert_eq!(rows[0].integer("is_new").unwrap(), Some(1));
}
