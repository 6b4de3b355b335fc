//! The task entity adapter.

use crate::error::{Error, Result};
use crate::model::types::{Classification, Status};
use crate::model::Staged;
use crate::recur::{parse_datetime_list, RecurrenceRule, RecurrenceSet};
use crate::schema::tasks as cols;
use crate::time::{parse_tz, TaskDuration, TaskTime};
use crate::values::Values;
use chrono_tz::Tz;

/// A task row staged for a write: an immutable snapshot plus the pending
/// column changes.
#[derive(Debug, Clone, Default)]
pub struct TaskAdapter {
    id: Option<i64>,
    staged: Staged,
}

impl TaskAdapter {
    /// An adapter for a new task, staged entirely from caller values.
    #[must_use]
    pub fn new(pending: Values) -> Self {
        Self { id: None, staged: Staged { snapshot: Values::new(), pending } }
    }

    /// An adapter over an existing row snapshot with pending changes.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the snapshot has no row id.
    pub fn for_row(snapshot: Values, pending: Values) -> Result<Self> {
        let id = snapshot
            .integer(cols::ID)?
            .ok_or_else(|| Error::validation("task snapshot is missing a row id"))?;
        Ok(Self { id: Some(id), staged: Staged { snapshot, pending } })
    }

    /// The row id, once known.
    #[must_use]
    pub const fn id(&self) -> Option<i64> {
        self.id
    }

    /// Record the row id assigned on insert.
    pub fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Whether the column has a pending write.
    #[must_use]
    pub fn is_updated(&self, column: &str) -> bool {
        self.staged.is_updated(column)
    }

    /// Whether any of the columns has a pending write.
    #[must_use]
    pub fn any_updated(&self, columns: &[&str]) -> bool {
        columns.iter().any(|c| self.is_updated(c))
    }

    /// The pending changes.
    #[must_use]
    pub const fn pending(&self) -> &Values {
        &self.staged.pending
    }

    /// The pending changes, for staging writes.
    pub fn pending_mut(&mut self) -> &mut Values {
        &mut self.staged.pending
    }

    /// The stored snapshot.
    #[must_use]
    pub const fn snapshot(&self) -> &Values {
        &self.staged.snapshot
    }

    /// Effective text value of a column, pending-first.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn text(&self, column: &str) -> Result<Option<&str>> {
        self.staged.text(column)
    }

    /// Effective integer value of a column, pending-first.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn integer(&self, column: &str) -> Result<Option<i64>> {
        self.staged.integer(column)
    }

    /// Effective boolean value of a column, pending-first.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn flag(&self, column: &str) -> Result<Option<bool>> {
        self.staged.flag(column)
    }

    /// The owning list id.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn list_id(&self) -> Result<Option<i64>> {
        self.integer(cols::LIST_ID)
    }

    /// The effective status, defaulting to needs-action.
    ///
    /// # Errors
    ///
    /// Returns a validation error on an invalid status code.
    pub fn status(&self) -> Result<Status> {
        self.integer(cols::STATUS)?.map_or(Ok(Status::NeedsAction), |code| {
            Status::from_i64(code).map_err(|e| Error::validation(e.to_string()))
        })
    }

    /// The status recorded in the snapshot, if the row existed before.
    ///
    /// # Errors
    ///
    /// Returns a validation error on an invalid status code.
    pub fn snapshot_status(&self) -> Result<Option<Status>> {
        self.staged
            .snapshot
            .integer(cols::STATUS)?
            .map(|code| Status::from_i64(code).map_err(|e| Error::validation(e.to_string())))
            .transpose()
    }

    /// The effective classification, if set.
    ///
    /// # Errors
    ///
    /// Returns a validation error on an invalid classification code.
    pub fn classification(&self) -> Result<Option<Classification>> {
        self.integer(cols::CLASSIFICATION)?
            .map(|code| {
                Classification::from_i64(code).map_err(|e| Error::validation(e.to_string()))
            })
            .transpose()
    }

    /// The effective percent complete, if set.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn percent_complete(&self) -> Result<Option<i64>> {
        self.integer(cols::PERCENT_COMPLETE)
    }

    /// Whether start/due are all-day values.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn is_allday(&self) -> Result<bool> {
        Ok(self.flag(cols::IS_ALLDAY)?.unwrap_or(false))
    }

    /// The effective timezone, if any.
    ///
    /// # Errors
    ///
    /// Returns a validation error on an unknown timezone identifier.
    pub fn timezone(&self) -> Result<Option<Tz>> {
        self.text(cols::TZ)?.map(parse_tz).transpose()
    }

    fn time_at(&self, column: &str) -> Result<Option<TaskTime>> {
        let Some(millis) = self.integer(column)? else {
            return Ok(None);
        };
        let tz = self.text(cols::TZ)?;
        Ok(Some(TaskTime::from_columns(millis, tz, self.is_allday()?)?))
    }

    /// The effective start time.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a malformed time triple.
    pub fn dtstart(&self) -> Result<Option<TaskTime>> {
        self.time_at(cols::DTSTART)
    }

    /// The effective due time.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a malformed time triple.
    pub fn due(&self) -> Result<Option<TaskTime>> {
        self.time_at(cols::DUE)
    }

    /// The effective duration.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a malformed duration.
    pub fn duration(&self) -> Result<Option<TaskDuration>> {
        self.text(cols::DURATION)?.map(TaskDuration::parse).transpose()
    }

    /// The parsed recurrence set (RRULE, RDATE, EXDATE).
    ///
    /// # Errors
    ///
    /// Returns a validation error on malformed recurrence fields.
    pub fn recurrence_set(&self) -> Result<RecurrenceSet> {
        let tz = self.timezone()?;
        let all_day = self.is_allday()?;
        let rule = self.text(cols::RRULE)?.map(RecurrenceRule::parse).transpose()?;
        let rdates = self
            .text(cols::RDATE)?
            .map_or_else(|| Ok(Vec::new()), |t| parse_datetime_list(t, tz, all_day))?;
        let exdates = self
            .text(cols::EXDATE)?
            .map_or_else(|| Ok(Vec::new()), |t| parse_datetime_list(t, tz, all_day))?;
        Ok(RecurrenceSet { rule, rdates, exdates })
    }

    /// Whether the task carries recurrence fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn is_recurring(&self) -> Result<bool> {
        Ok(self.text(cols::RRULE)?.is_some_and(|t| !t.is_empty())
            || self.text(cols::RDATE)?.is_some_and(|t| !t.is_empty()))
    }

    /// Whether the task is an override of a master's occurrence.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn is_override(&self) -> Result<bool> {
        Ok(self.integer(cols::ORIGINAL_INSTANCE_ID)?.is_some()
            || self.text(cols::ORIGINAL_INSTANCE_SYNC_ID)?.is_some())
    }

    /// The master's row id, for overrides.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn original_instance_id(&self) -> Result<Option<i64>> {
        self.integer(cols::ORIGINAL_INSTANCE_ID)
    }

    /// The overridden occurrence time, for overrides.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a malformed time triple.
    pub fn original_time(&self) -> Result<Option<TaskTime>> {
        let Some(millis) = self.integer(cols::ORIGINAL_INSTANCE_TIME)? else {
            return Ok(None);
        };
        let all_day =
            self.flag(cols::ORIGINAL_INSTANCE_ALLDAY)?.map_or_else(|| self.is_allday(), Ok)?;
        let tz = self.text(cols::TZ)?;
        Ok(Some(TaskTime::from_columns(millis, tz, all_day)?))
    }

    /// Whether the task is soft-deleted.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn deleted(&self) -> Result<bool> {
        Ok(self.flag(cols::DELETED)?.unwrap_or(false))
    }

    /// The effective parent task id.
    ///
    /// # Errors
    ///
    /// Returns a validation error on a type mismatch.
    pub fn parent_id(&self) -> Result<Option<i64>> {
        self.integer(cols::PARENT_ID)
    }

    /// Stage a status write.
    pub fn set_status(&mut self, status: Status) {
        self.staged.pending.put_integer(cols::STATUS, status.as_i64());
    }

    /// Stage a percent-complete write.
    pub fn set_percent_complete(&mut self, percent: Option<i64>) {
        self.staged.pending.put_opt_integer(cols::PERCENT_COMPLETE, percent);
    }

    /// Stage a completion timestamp write.
    pub fn set_completed(&mut self, completed: Option<i64>, all_day: bool) {
        self.staged.pending.put_opt_integer(cols::COMPLETED, completed);
        self.staged.pending.put_bool(cols::COMPLETED_IS_ALLDAY, all_day);
    }

    /// Stage a sibling sort key write.
    pub fn set_sorting(&mut self, sorting: i64) {
        self.staged.pending.put_integer(cols::SORTING, sorting);
    }

    /// Stage an override master id write.
    pub fn set_original_instance_id(&mut self, id: i64) {
        self.staged.pending.put_integer(cols::ORIGINAL_INSTANCE_ID, id);
    }

    /// Stage an override master sync id write.
    pub fn set_original_instance_sync_id(&mut self, sync_id: &str) {
        self.staged.pending.put_text(cols::ORIGINAL_INSTANCE_SYNC_ID, sync_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::types::Value;

    fn pending(entries: &[(&str, Value)]) -> Values {
        let mut values = Values::new();
        for (column, value) in entries {
            values.put((*column).to_string(), value.clone());
        }
        values
    }

    #[test]
    fn test_pending_shadows_snapshot() {
        let mut snapshot = Values::new();
        snapshot.put_integer(cols::ID, 7).put_text(cols::TITLE, "old").put_integer(cols::STATUS, 0);
        let adapter =
            TaskAdapter::for_row(snapshot, pending(&[(cols::TITLE, Value::from("new".to_string()))]))
                .unwrap();
        assert_eq!(adapter.id(), Some(7));
        assert_eq!(adapter.text(cols::TITLE).unwrap(), Some("new"));
        assert!(adapter.is_updated(cols::TITLE));
        assert!(!adapter.is_updated(cols::STATUS));
        assert_eq!(adapter.status().unwrap(), Status::NeedsAction);
    }

    #[test]
    fn test_snapshot_without_id_is_rejected() {
        assert!(TaskAdapter::for_row(Values::new(), Values::new()).is_err());
    }

    #[test]
    fn test_time_triple_combines_tz_and_allday() {
        let mut values = Values::new();
        values
            .put_integer(cols::DTSTART, 1_700_000_000_000)
            .put_text(cols::TZ, "Europe/Berlin")
            .put_bool(cols::IS_ALLDAY, false);
        let adapter = TaskAdapter::new(values);
        let start = adapter.dtstart().unwrap().unwrap();
        assert_eq!(start.timestamp(), 1_700_000_000_000);
        assert_eq!(start.tz_name(), Some("Europe/Berlin"));
    }

    #[test]
    fn test_recurrence_set_parses() {
        let mut values = Values::new();
        values
            .put_text(cols::RRULE, "FREQ=DAILY;COUNT=3")
            .put_text(cols::EXDATE, "20240216T090000");
        let adapter = TaskAdapter::new(values);
        let set = adapter.recurrence_set().unwrap();
        assert!(set.is_recurring());
        assert_eq!(set.exdates.len(), 1);
        assert!(adapter.is_recurring().unwrap());
    }

    #[test]
    fn test_malformed_rrule_is_rejected() {
        let mut values = Values::new();
        values.put_text(cols::RRULE, "FREQ=NEVERMORE");
        assert!(TaskAdapter::new(values).recurrence_set().is_err());
    }

    #[test]
    fn test_override_detection() {
        let mut values = Values::new();
        values.put_integer(cols::ORIGINAL_INSTANCE_ID, 4);
        assert!(TaskAdapter::new(values).is_override().unwrap());
        assert!(!TaskAdapter::new(Values::new()).is_override().unwrap());
    }
}
