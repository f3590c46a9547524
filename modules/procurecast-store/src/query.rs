//! Typed query pieces shared by every `SqlStore` method.
//!
//! `Params` hands out dialect placeholders while recording the bound value,
//! so marker numbering and bind order can't drift apart.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::any::{Any, AnyArguments};
use sqlx::query::{Query, QueryAs};

use crate::dialect::SqlDialect;
use crate::error::{StoreError, StoreResult};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A value crossing the driver boundary. Dates travel as text.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Int(i64),
    OptInt(Option<i64>),
    Float(f64),
    OptFloat(Option<f64>),
    Text(String),
    OptText(Option<String>),
    Bool(bool),
}

impl From<i64> for Bind {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Option<i64>> for Bind {
    fn from(v: Option<i64>) -> Self {
        Self::OptInt(v)
    }
}

impl From<f64> for Bind {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<Option<f64>> for Bind {
    fn from(v: Option<f64>) -> Self {
        Self::OptFloat(v)
    }
}

impl From<String> for Bind {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Bind {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Option<String>> for Bind {
    fn from(v: Option<String>) -> Self {
        Self::OptText(v)
    }
}

impl From<bool> for Bind {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Placeholders must be pushed in the order they appear in the SQL text;
/// SQLite markers are positional.
pub struct Params<'d> {
    dialect: &'d dyn SqlDialect,
    binds: Vec<Bind>,
}

impl<'d> Params<'d> {
    pub fn new(dialect: &'d dyn SqlDialect) -> Self {
        Self {
            dialect,
            binds: Vec::new(),
        }
    }

    /// Record a value and return its placeholder.
    pub fn push(&mut self, value: impl Into<Bind>) -> String {
        self.binds.push(value.into());
        self.dialect.placeholder(self.binds.len())
    }

    pub fn push_date(&mut self, date: NaiveDate) -> String {
        let p = self.push(format_date(date));
        self.dialect.text_to_date(&p)
    }

    pub fn push_timestamp(&mut self, ts: DateTime<Utc>) -> String {
        let p = self.push(format_timestamp(ts));
        self.dialect.text_to_timestamp(&p)
    }

    pub fn push_opt_timestamp(&mut self, ts: Option<DateTime<Utc>>) -> String {
        let p = self.push(ts.map(format_timestamp));
        self.dialect.text_to_timestamp(&p)
    }

    pub fn push_json(&mut self, value: &serde_json::Value) -> StoreResult<String> {
        let p = self.push(serde_json::to_string(value)?);
        Ok(self.dialect.text_to_json(&p))
    }

    pub fn push_text_list(&mut self, values: &[String]) -> String {
        let p = self.push(values.join(","));
        self.dialect.text_list(&p)
    }

    /// Comma-separated placeholder list for an `IN (...)` clause.
    pub fn push_list(&mut self, values: &[i64]) -> String {
        values
            .iter()
            .map(|v| self.push(*v))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.binds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binds.is_empty()
    }

    pub fn bind<'q>(self, query: Query<'q, Any, AnyArguments<'q>>) -> Query<'q, Any, AnyArguments<'q>> {
        self.binds.into_iter().fold(query, |q, b| match b {
            Bind::Int(v) => q.bind(v),
            Bind::OptInt(v) => q.bind(v),
            Bind::Float(v) => q.bind(v),
            Bind::OptFloat(v) => q.bind(v),
            Bind::Text(v) => q.bind(v),
            Bind::OptText(v) => q.bind(v),
            Bind::Bool(v) => q.bind(v),
        })
    }

    pub fn bind_as<'q, O>(
        self,
        query: QueryAs<'q, Any, O, AnyArguments<'q>>,
    ) -> QueryAs<'q, Any, O, AnyArguments<'q>> {
        self.binds.into_iter().fold(query, |q, b| match b {
            Bind::Int(v) => q.bind(v),
            Bind::OptInt(v) => q.bind(v),
            Bind::Float(v) => q.bind(v),
            Bind::OptFloat(v) => q.bind(v),
            Bind::Text(v) => q.bind(v),
            Bind::OptText(v) => q.bind(v),
            Bind::Bool(v) => q.bind(v),
        })
    }
}

enum OnConflict {
    Fail,
    Ignore(&'static str),
    Update {
        key: &'static str,
        columns: Vec<&'static str>,
    },
}

/// `INSERT` assembled column by column with the value expression for each.
pub struct InsertQuery {
    table: &'static str,
    columns: Vec<&'static str>,
    values: Vec<String>,
    on_conflict: OnConflict,
}

impl InsertQuery {
    pub fn into_table(table: &'static str) -> Self {
        Self {
            table,
            columns: Vec::new(),
            values: Vec::new(),
            on_conflict: OnConflict::Fail,
        }
    }

    pub fn value(mut self, column: &'static str, expr: String) -> Self {
        self.columns.push(column);
        self.values.push(expr);
        self
    }

    /// Skip the row when `key` already exists.
    pub fn ignore_conflict_on(mut self, key: &'static str) -> Self {
        self.on_conflict = OnConflict::Ignore(key);
        self
    }

    /// Overwrite `columns` when `key` already exists.
    pub fn update_conflict_on(mut self, key: &'static str, columns: &[&'static str]) -> Self {
        self.on_conflict = OnConflict::Update {
            key,
            columns: columns.to_vec(),
        };
        self
    }

    pub fn to_sql(&self, dialect: &dyn SqlDialect) -> String {
        let columns = self.columns.join(", ");
        let values = self.values.join(", ");
        match &self.on_conflict {
            OnConflict::Fail => {
                format!("INSERT INTO {} ({columns}) VALUES ({values})", self.table)
            }
            OnConflict::Ignore(key) => {
                dialect.insert_ignoring_conflict(self.table, &columns, &values, key)
            }
            OnConflict::Update { key, columns: updated } => {
                let assignments = updated
                    .iter()
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "INSERT INTO {} ({columns}) VALUES ({values}) ON CONFLICT ({key}) DO UPDATE SET {assignments}",
                    self.table
                )
            }
        }
    }
}

// --- Value codecs ---

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_date(column: &'static str, text: &str) -> StoreResult<NaiveDate> {
    let head = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(head, DATE_FORMAT).map_err(|_| StoreError::Decode {
        column,
        value: text.to_string(),
    })
}

/// Accepts the forms both backends hand back: space or `T` separated,
/// optional fraction, optional offset.
pub fn parse_timestamp(column: &'static str, text: &str) -> StoreResult<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(StoreError::Decode {
        column,
        value: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Postgres, Sqlite};
    use chrono::TimeZone;

    #[test]
    fn params_number_postgres_markers_in_push_order() {
        let dialect = Postgres;
        let mut params = Params::new(&dialect);
        let a = params.push(1_i64);
        let b = params.push_date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let list = params.push_list(&[7, 8]);
        assert_eq!(a, "$1");
        assert_eq!(b, "CAST($2 AS DATE)");
        assert_eq!(list, "$3, $4");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn insert_ignoring_conflict_goes_through_dialect() {
        let dialect = Sqlite;
        let mut params = Params::new(&dialect);
        let sql = InsertQuery::into_table("historical_solicitations")
            .value("url", params.push("https://sam.gov/opp/1"))
            .value("title", params.push("Signal upgrades"))
            .ignore_conflict_on("url")
            .to_sql(&dialect);
        assert_eq!(
            sql,
            "INSERT OR IGNORE INTO historical_solicitations (url, title) VALUES (?, ?)"
        );
    }

    #[test]
    fn upsert_assigns_from_excluded() {
        let dialect = Postgres;
        let mut params = Params::new(&dialect);
        let sql = InsertQuery::into_table("backtest_results")
            .value("simulation_date", params.push_date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()))
            .value("agency_id", params.push(3_i64))
            .value("predicted_prob_12m", params.push(0.4))
            .update_conflict_on("simulation_date, agency_id", &["predicted_prob_12m"])
            .to_sql(&dialect);
        assert!(sql.ends_with(
            "ON CONFLICT (simulation_date, agency_id) DO UPDATE SET predicted_prob_12m = excluded.predicted_prob_12m"
        ));
    }

    #[test]
    fn timestamps_parse_from_either_backend() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        for text in [
            "2024-05-06 07:08:09",
            "2024-05-06 07:08:09.000123",
            "2024-05-06T07:08:09Z",
            "2024-05-06 07:08:09+00",
        ] {
            let parsed = parse_timestamp("scraped_date", text).unwrap();
            assert_eq!(parsed.timestamp(), expected.timestamp(), "{text}");
        }
        assert!(parse_timestamp("scraped_date", "yesterday").is_err());
    }

    #[test]
    fn dates_tolerate_trailing_time() {
        let date = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(parse_date("release_date", "2023-12-31").unwrap(), date);
        assert_eq!(parse_date("release_date", "2023-12-31 00:00:00").unwrap(), date);
        assert!(parse_date("release_date", "12/31/2023").is_err());
    }
}
