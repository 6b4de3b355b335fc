//! The list pipeline: validation and commit.
//!
//! Lists have far fewer invariants than tasks, so their pipeline is just
//! the validating and committing halves in one place.

use crate::error::{Error, Result};
use crate::model::ListAdapter;
use crate::processor::commit::{insert_row, update_row};
use crate::processor::{Operation, WriteContext};
use crate::schema::{lists as cols, tables, LOCAL_ACCOUNT_TYPE};
use rusqlite::Connection;

/// Runs list writes through validation and commit.
pub struct ListPipeline;

impl ListPipeline {
    /// Run the operation.
    ///
    /// # Errors
    ///
    /// Propagates the first error, aborting the transaction.
    pub fn execute(
        &self,
        conn: &Connection,
        op: Operation,
        list: &mut ListAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        Self::validate(op, list, ctx)?;
        Self::commit(conn, op, list, ctx)
    }

    fn validate(op: Operation, list: &ListAdapter, ctx: &WriteContext<'_>) -> Result<()> {
        if op == Operation::Delete {
            return Ok(());
        }
        for column in list.pending().columns() {
            if !cols::ALL.contains(&column) {
                return Err(Error::validation(format!("unknown list column '{column}'")));
            }
            if cols::READ_ONLY.contains(&column) {
                return Err(Error::validation(format!("list column '{column}' is read-only")));
            }
            if !ctx.privileged && cols::SYNC_ONLY.contains(&column) {
                return Err(Error::permission(format!(
                    "list column '{column}' is writable by sync adapters only"
                )));
            }
        }
        match op {
            Operation::Insert => {
                let (name, account_type) = list.account()?;
                if name.is_none() || account_type.is_none() {
                    return Err(Error::validation("a list needs an account name and type"));
                }
                if !ctx.privileged && account_type != Some(LOCAL_ACCOUNT_TYPE) {
                    return Err(Error::permission(format!(
                        "only sync adapters may create non-{LOCAL_ACCOUNT_TYPE} lists"
                    )));
                }
            }
            Operation::Update => {
                // the account identity is write-once
                for column in [cols::ACCOUNT_NAME, cols::ACCOUNT_TYPE] {
                    if list.is_updated(column)
                        && list.pending().text(column)? != list.snapshot().text(column)?
                    {
                        return Err(Error::validation(format!(
                            "list column '{column}' is write-once"
                        )));
                    }
                }
            }
            Operation::Delete => {}
        }
        Ok(())
    }

    fn commit(
        conn: &Connection,
        op: Operation,
        list: &mut ListAdapter,
        ctx: &mut WriteContext<'_>,
    ) -> Result<()> {
        match op {
            Operation::Insert => {
                let id = insert_row(conn, tables::LISTS, list.pending())?;
                list.set_id(id);
            }
            Operation::Update => {
                let id = list
                    .id()
                    .ok_or_else(|| Error::consistency("list update without a target row"))?;
                let extra = if ctx.privileged {
                    vec![]
                } else {
                    vec![format!("{d} = {d} + 1", d = cols::DIRTY)]
                };
                update_row(conn, tables::LISTS, cols::ID, id, list.pending(), &extra)?;
            }
            Operation::Delete => {
                let id = list
                    .id()
                    .ok_or_else(|| Error::consistency("list delete without a target row"))?;
                conn.execute(
                    &format!("DELETE FROM {} WHERE {} = ?1", tables::LISTS, cols::ID),
                    [id],
                )?;
                // the cascade takes the list's tasks and instances with it
                ctx.post_notify("tasks");
                ctx.post_notify("instances");
            }
        }
        ctx.post_notify("lists");
        Ok(())
    }
}
