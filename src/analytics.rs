//! Best-effort recording of request lifecycle timestamps.
//!
//! Lifecycle rows never gate the order flow: every failure here is logged
//! by the caller and swallowed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, Iden, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, sqlx::Error>;

/// Analytics table schema.
#[derive(Iden)]
pub enum Analytics {
    Table,
    #[iden = "request_id"]
    RequestId,
    #[iden = "served_id"]
    ServedId,
    #[iden = "request_kind"]
    RequestKind,
    #[iden = "start_time"]
    StartTime,
    #[iden = "end_time"]
    EndTime,
    #[iden = "total_duration_ms"]
    TotalDurationMs,
}

/// SQL for creating the analytics table.
pub const CREATE_ANALYTICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS analytics (
    request_id TEXT NOT NULL PRIMARY KEY,
    served_id TEXT NOT NULL,
    request_kind TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    total_duration_ms INTEGER
);
"#;

/// A persisted lifecycle row, as read back for inspection.
#[derive(Debug, Clone)]
pub struct LifecycleRecord {
    pub request_id: String,
    pub served_id: String,
    pub request_kind: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub total_duration_ms: Option<i64>,
}

/// Recorder for request lifecycle timestamps.
#[async_trait]
pub trait LifecycleStore: Send + Sync {
    /// Insert the start-of-request row.
    async fn record_start(
        &self,
        request_id: &str,
        served_id: &str,
        request_kind: &str,
        start_time: DateTime<Utc>,
    ) -> Result<()>;

    /// Fill in end time and total duration for a previously started request.
    async fn record_end(
        &self,
        request_id: &str,
        end_time: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()>;
}

/// SQLite-backed lifecycle store.
pub struct SqliteLifecycleStore {
    pool: SqlitePool,
}

impl SqliteLifecycleStore {
    /// Create a new SQLite lifecycle store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_ANALYTICS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Read back one lifecycle row, for dashboards and tests.
    pub async fn fetch(&self, request_id: &str) -> Result<Option<LifecycleRecord>> {
        let sql = Query::select()
            .columns([
                Analytics::RequestId,
                Analytics::ServedId,
                Analytics::RequestKind,
                Analytics::StartTime,
                Analytics::EndTime,
                Analytics::TotalDurationMs,
            ])
            .from(Analytics::Table)
            .and_where(Expr::col(Analytics::RequestId).eq(request_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| LifecycleRecord {
            request_id: r.get("request_id"),
            served_id: r.get("served_id"),
            request_kind: r.get("request_kind"),
            start_time: r.get("start_time"),
            end_time: r.get("end_time"),
            total_duration_ms: r.get("total_duration_ms"),
        }))
    }
}

#[async_trait]
impl LifecycleStore for SqliteLifecycleStore {
    async fn record_start(
        &self,
        request_id: &str,
        served_id: &str,
        request_kind: &str,
        start_time: DateTime<Utc>,
    ) -> Result<()> {
        let sql = Query::insert()
            .into_table(Analytics::Table)
            .columns([
                Analytics::RequestId,
                Analytics::ServedId,
                Analytics::RequestKind,
                Analytics::StartTime,
            ])
            .values_panic([
                request_id.into(),
                served_id.into(),
                request_kind.into(),
                start_time.to_rfc3339().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn record_end(
        &self,
        request_id: &str,
        end_time: DateTime<Utc>,
        duration_ms: i64,
    ) -> Result<()> {
        let sql = Query::update()
            .table(Analytics::Table)
            .value(Analytics::EndTime, end_time.to_rfc3339())
            .value(Analytics::TotalDurationMs, duration_ms)
            .and_where(Expr::col(Analytics::RequestId).eq(request_id))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}
