//! Small row-loading helpers shared by the pipeline and the provider.

use crate::error::Result;
use crate::values::Values;
use rusqlite::{Connection, Params};

/// Run a query and collect every result row into a [`Values`] map.
pub(crate) fn query_rows<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Values>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Values::from_row(row))?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Load a single row by id.
pub(crate) fn load_row(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: i64,
) -> Result<Option<Values>> {
    Ok(query_rows(conn, &format!("SELECT * FROM {table} WHERE {id_column} = ?1"), [id])?
        .into_iter()
        .next())
}

/// Whether a row with the given id exists.
pub(crate) fn row_exists(
    conn: &Connection,
    table: &str,
    id_column: &str,
    id: i64,
) -> Result<bool> {
    let found: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE {id_column} = ?1)"),
        [id],
        |row| row.get(0),
    )?;
    Ok(found)
}
