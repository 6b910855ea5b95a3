//! SQLite implementation of the inventory ledger.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::schema::{Items, CREATE_ITEMS_TABLE};
use super::{Ledger, LedgerError, Result};

/// SQLite-backed inventory ledger.
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    /// Create a new SQLite ledger.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_ITEMS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Set an item's stock level, creating the row if needed. Seeding and
    /// test setup only; order flow goes through reserve/credit.
    pub async fn set_quantity(&self, item: &str, quantity: i64) -> Result<()> {
        let sql = Query::insert()
            .into_table(Items::Table)
            .columns([Items::Name, Items::Quantity])
            .values_panic([item.into(), quantity.into()])
            .on_conflict(
                OnConflict::column(Items::Name)
                    .update_column(Items::Quantity)
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Check and deduct within an already-started transaction.
    async fn check_and_deduct(
        conn: &mut SqliteConnection,
        items: &BTreeMap<String, u32>,
    ) -> Result<()> {
        for (item, &requested) in items {
            let sql = Query::select()
                .column(Items::Quantity)
                .from(Items::Table)
                .and_where(Expr::col(Items::Name).eq(item.as_str()))
                .to_string(SqliteQueryBuilder);

            let row = sqlx::query(&sql).fetch_optional(&mut *conn).await?;
            let available: i64 = row.map(|r| r.get(0)).unwrap_or(0);

            if available < i64::from(requested) {
                // The caller rolls back; nothing was deducted.
                return Err(LedgerError::Insufficient {
                    item: item.clone(),
                    requested,
                    available,
                });
            }
        }

        for (item, &requested) in items {
            let sql = Query::update()
                .table(Items::Table)
                .value(
                    Items::Quantity,
                    Expr::col(Items::Quantity).sub(i64::from(requested)),
                )
                .and_where(Expr::col(Items::Name).eq(item.as_str()))
                .to_string(SqliteQueryBuilder);

            sqlx::query(&sql).execute(&mut *conn).await?;
        }

        Ok(())
    }

    /// Add quantities back within an already-started transaction.
    async fn add_quantities(
        conn: &mut SqliteConnection,
        items: &BTreeMap<String, u32>,
    ) -> Result<()> {
        for (item, &quantity) in items {
            let sql = Query::update()
                .table(Items::Table)
                .value(
                    Items::Quantity,
                    Expr::col(Items::Quantity).add(i64::from(quantity)),
                )
                .and_where(Expr::col(Items::Name).eq(item.as_str()))
                .to_string(SqliteQueryBuilder);

            sqlx::query(&sql).execute(&mut *conn).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn reserve(&self, items: &BTreeMap<String, u32>) -> Result<()> {
        // One write transaction: the check and every deduction commit
        // together, so two concurrent reservations cannot both observe
        // stock only one can satisfy.
        //
        // BEGIN IMMEDIATE acquires the write lock upfront, so concurrent
        // reservations queue on the busy timeout instead of failing when
        // deferred transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::check_and_deduct(&mut conn, items).await {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn credit(&self, items: &BTreeMap<String, u32>) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::add_quantities(&mut conn, items).await {
            Ok(()) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn quantity(&self, item: &str) -> Result<Option<i64>> {
        let sql = Query::select()
            .column(Items::Quantity)
            .from(Items::Table)
            .and_where(Expr::col(Items::Name).eq(item))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get(0)))
    }
}
