//! Row decoding helpers shared by the PostgreSQL repositories.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

/// Reads one column, mapping decode failures to `DatabaseError`.
pub(super) fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name).map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Failed to get {}: {}", name, e),
        )
    })
}

pub(super) fn timestamp(row: &PgRow, name: &str) -> Result<Timestamp, DomainError> {
    column::<DateTime<Utc>>(row, name).map(Timestamp::from_datetime)
}

pub(super) fn optional_timestamp(row: &PgRow, name: &str) -> Result<Option<Timestamp>, DomainError> {
    Ok(column::<Option<DateTime<Utc>>>(row, name)?.map(Timestamp::from_datetime))
}

/// Maps a query failure to `DatabaseError` with context.
pub(super) fn db_error(action: &str) -> impl FnOnce(sqlx::Error) -> DomainError + '_ {
    move |e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Failed to {}: {}", action, e),
        )
    }
}
