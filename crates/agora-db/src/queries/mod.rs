mod members;
mod messages;
mod posts;
mod reactions;
mod relations;

use std::str::FromStr;

use anyhow::Result;
use rusqlite::Row;
use rusqlite::types::Type;

use agora_types::api::MemberSummary;
use agora_types::paging::PageWindow;

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// The five summary columns of the members table behind `alias`.
fn summary_columns(alias: &str) -> String {
    format!("{alias}.id, {alias}.username, {alias}.first_name, {alias}.last_name, {alias}.avatar_url")
}

/// Read the columns produced by [`summary_columns`] starting at `start`.
fn summary_at(row: &Row<'_>, start: usize) -> rusqlite::Result<MemberSummary> {
    Ok(MemberSummary {
        id: row.get(start)?,
        username: row.get(start + 1)?,
        first_name: row.get(start + 2)?,
        last_name: row.get(start + 3)?,
        avatar_url: row.get(start + 4)?,
    })
}

/// Parse a TEXT column into one of our enums, surfacing bad values as a
/// conversion failure on that column.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn count_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

/// LIMIT/OFFSET values as SQLite integers.
fn bounds(window: PageWindow) -> (i64, i64) {
    (
        i64::from(window.limit),
        i64::try_from(window.offset).unwrap_or(i64::MAX),
    )
}

/// `?{first}, ?{first+1}, ...` for `n` values.
fn placeholders(first: usize, n: usize) -> String {
    (first..first + n)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
