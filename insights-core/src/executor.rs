//! Execution of assembled queries.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row, TypeInfo};
use tracing::debug;

use crate::shaper::{ColumnValue, InsightRow};
use crate::sql::{SqlParam, SqlQuery};

/// Runs a parameterized query and returns its rows.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch(&self, query: &SqlQuery) -> Result<Vec<InsightRow>>;
}

// ------------------------------------------------------------------ //
//  PostgreSQL                                                         //
// ------------------------------------------------------------------ //

pub struct PgQueryExecutor {
    pool: PgPool,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    async fn fetch(&self, query: &SqlQuery) -> Result<Vec<InsightRow>> {
        let rows = bind_all(sqlx::query(&query.text), &query.params)
            .fetch_all(&self.pool)
            .await
            .context("insights query failed")?;
        debug!(rows = rows.len(), "insights query returned");

        rows.iter().map(decode_row).collect()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Text(s) => query.bind(s.clone()),
            SqlParam::Int(i) => query.bind(*i),
            SqlParam::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

/// Decoding strategy for a PostgreSQL column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    TimestampTz,
    Timestamp,
}

impl ColumnKind {
    fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ColumnKind::Text,
            "INT2" => ColumnKind::Int2,
            "INT4" => ColumnKind::Int4,
            "INT8" => ColumnKind::Int8,
            "FLOAT4" => ColumnKind::Float4,
            "FLOAT8" => ColumnKind::Float8,
            "TIMESTAMPTZ" => ColumnKind::TimestampTz,
            "TIMESTAMP" => ColumnKind::Timestamp,
            _ => return None,
        })
    }
}

fn decode_row(row: &PgRow) -> Result<InsightRow> {
    let mut out = InsightRow::with_capacity(row.columns().len());
    for column in row.columns() {
        let name = column.name();
        let type_name = column.type_info().name();
        let kind = ColumnKind::from_type_name(type_name)
            .ok_or_else(|| anyhow!("column `{name}` has unsupported type {type_name}"))?;
        let idx = column.ordinal();

        let value = match kind {
            ColumnKind::Text => row.try_get::<Option<String>, _>(idx)?.map(ColumnValue::Text),
            ColumnKind::Int2 => row
                .try_get::<Option<i16>, _>(idx)?
                .map(|v| ColumnValue::Int(i64::from(v))),
            ColumnKind::Int4 => row
                .try_get::<Option<i32>, _>(idx)?
                .map(|v| ColumnValue::Int(i64::from(v))),
            ColumnKind::Int8 => row.try_get::<Option<i64>, _>(idx)?.map(ColumnValue::Int),
            ColumnKind::Float4 => row
                .try_get::<Option<f32>, _>(idx)?
                .map(|v| ColumnValue::Float(f64::from(v))),
            ColumnKind::Float8 => row.try_get::<Option<f64>, _>(idx)?.map(ColumnValue::Float),
            ColumnKind::TimestampTz => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)?
                .map(ColumnValue::Timestamp),
            ColumnKind::Timestamp => row
                .try_get::<Option<NaiveDateTime>, _>(idx)?
                .map(|v| ColumnValue::Timestamp(v.and_utc())),
        };
        out.insert(name.to_string(), value.unwrap_or(ColumnValue::Null));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_projection_types() {
        assert_eq!(ColumnKind::from_type_name("TEXT"), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::from_type_name("VARCHAR"), Some(ColumnKind::Text));
        assert_eq!(ColumnKind::from_type_name("INT8"), Some(ColumnKind::Int8));
        assert_eq!(ColumnKind::from_type_name("FLOAT8"), Some(ColumnKind::Float8));
        assert_eq!(ColumnKind::from_type_name("TIMESTAMPTZ"), Some(ColumnKind::TimestampTz));
    }

    #[test]
    fn rejects_undecodable_types() {
        assert_eq!(ColumnKind::from_type_name("NUMERIC"), None);
        assert_eq!(ColumnKind::from_type_name("JSONB"), None);
    }
}
