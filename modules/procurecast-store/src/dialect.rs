//! Backend capability: the few places Postgres and SQLite disagree.
//!
//! One dialect is chosen from the connection URL at startup and every query
//! is assembled through it, so no query text branches on the backend.

use std::fmt::Debug;

use crate::error::StoreError;

pub trait SqlDialect: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Bind marker for the `n`th parameter (1-based).
    fn placeholder(&self, n: usize) -> String;

    /// Insert that is a no-op when `conflict_key` already exists.
    fn insert_ignoring_conflict(
        &self,
        table: &str,
        columns: &str,
        values: &str,
        conflict_key: &str,
    ) -> String;

    fn case_insensitive_like(&self, column: &str, param: &str) -> String;

    /// ISO `YYYY-MM-DD` text parameter as a date value.
    fn text_to_date(&self, param: &str) -> String;

    /// `YYYY-MM-DD HH:MM:SS` text parameter as a timestamp value.
    fn text_to_timestamp(&self, param: &str) -> String;

    /// Serialized JSON text parameter as the backend's JSON value.
    fn text_to_json(&self, param: &str) -> String;

    /// Comma-joined text parameter as the backend's list value.
    fn text_list(&self, param: &str) -> String;

    /// Column read back as text (dates, timestamps, JSON).
    fn as_text(&self, column: &str) -> String;

    /// Remove every row and reset the id sequence.
    fn truncate(&self, table: &str) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn placeholder(&self, n: usize) -> String {
        format!("${n}")
    }

    fn insert_ignoring_conflict(
        &self,
        table: &str,
        columns: &str,
        values: &str,
        conflict_key: &str,
    ) -> String {
        format!("INSERT INTO {table} ({columns}) VALUES ({values}) ON CONFLICT ({conflict_key}) DO NOTHING")
    }

    fn case_insensitive_like(&self, column: &str, param: &str) -> String {
        format!("{column} ILIKE {param}")
    }

    fn text_to_date(&self, param: &str) -> String {
        format!("CAST({param} AS DATE)")
    }

    fn text_to_timestamp(&self, param: &str) -> String {
        format!("CAST({param} AS TIMESTAMP)")
    }

    fn text_to_json(&self, param: &str) -> String {
        format!("CAST({param} AS JSONB)")
    }

    fn text_list(&self, param: &str) -> String {
        format!("string_to_array({param}, ',')")
    }

    fn as_text(&self, column: &str) -> String {
        format!("CAST({column} AS TEXT)")
    }

    fn truncate(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {table} RESTART IDENTITY")
    }
}

/// SQLite keeps dates, timestamps, JSON and keyword lists as plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn placeholder(&self, _n: usize) -> String {
        "?".to_string()
    }

    fn insert_ignoring_conflict(
        &self,
        table: &str,
        columns: &str,
        values: &str,
        _conflict_key: &str,
    ) -> String {
        format!("INSERT OR IGNORE INTO {table} ({columns}) VALUES ({values})")
    }

    fn case_insensitive_like(&self, column: &str, param: &str) -> String {
        // LIKE is already case-insensitive for ASCII in SQLite
        format!("{column} LIKE {param}")
    }

    fn text_to_date(&self, param: &str) -> String {
        param.to_string()
    }

    fn text_to_timestamp(&self, param: &str) -> String {
        param.to_string()
    }

    fn text_to_json(&self, param: &str) -> String {
        param.to_string()
    }

    fn text_list(&self, param: &str) -> String {
        param.to_string()
    }

    fn as_text(&self, column: &str) -> String {
        column.to_string()
    }

    fn truncate(&self, table: &str) -> String {
        format!("DELETE FROM {table}")
    }
}

/// Pick the dialect for a connection URL.
pub fn dialect_for_url(url: &str) -> Result<Box<dyn SqlDialect>, StoreError> {
    let scheme = url.split(':').next().unwrap_or_default();
    match scheme {
        "postgres" | "postgresql" => Ok(Box::new(Postgres)),
        "sqlite" => Ok(Box::new(Sqlite)),
        _ => Err(StoreError::UnsupportedBackend(scheme.to_string())),
    }
}
