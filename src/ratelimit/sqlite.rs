//! Rate limit counters kept in sqlite, shared by every process on the database.

use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait, QueryFilter,
    Statement, StatementBuilder,
};

use super::{RateLimitConfig, RateLimitStore, StoreError};
use crate::clock::Clock;
use crate::db::entities::rate_limits;

/// Counters in the `rate_limits` table. Times are unix milliseconds.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    db: Arc<DatabaseConnection>,
}

impl SqliteStore {
    /// A store over an already-migrated connection.
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>, db: Arc<DatabaseConnection>) -> Self {
        Self { config, clock, db }
    }

    fn now_millis(&self) -> i64 {
        self.clock.utc_now().timestamp_millis()
    }

    /// One upsert: insert a fresh window, restart an expired one, or count
    /// into the current one if it still has room. When the window is full
    /// the `WHERE` leaves the row alone and `RETURNING` yields nothing.
    fn consume_statement(&self, client_key: &str, now: i64) -> Statement {
        let window = i64::try_from(self.config.window.as_millis()).unwrap_or(i64::MAX);
        let reset_at = now.saturating_add(window);
        let current_count = Expr::col((rate_limits::Entity, rate_limits::Column::Count));
        let current_reset = Expr::col((rate_limits::Entity, rate_limits::Column::WindowResetAt));
        let expired = current_reset.clone().lte(now);

        let upsert = Query::insert()
            .into_table(rate_limits::Entity)
            .columns([
                rate_limits::Column::ClientKey,
                rate_limits::Column::Count,
                rate_limits::Column::WindowResetAt,
            ])
            .values_panic([client_key.into(), 1i64.into(), reset_at.into()])
            .on_conflict(
                OnConflict::column(rate_limits::Column::ClientKey)
                    .value(
                        rate_limits::Column::Count,
                        Expr::case(expired.clone(), 1i64).finally(current_count.clone().add(1i64)),
                    )
                    .value(
                        rate_limits::Column::WindowResetAt,
                        Expr::case(expired.clone(), reset_at).finally(current_reset),
                    )
                    .action_and_where(
                        expired.or(current_count.lt(i64::from(self.config.max_requests))),
                    )
                    .to_owned(),
            )
            .returning_col(rate_limits::Column::Count)
            .to_owned();

        StatementBuilder::build(&upsert, &DatabaseBackend::Sqlite)
    }
}

#[async_trait]
impl RateLimitStore for SqliteStore {
    async fn check_and_consume(&self, client_key: &str) -> Result<bool, StoreError> {
        let stmt = self.consume_statement(client_key, self.now_millis());
        Ok(self.db.query_one(stmt).await?.is_some())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = rate_limits::Entity::delete_many()
            .filter(rate_limits::Column::WindowResetAt.lte(self.now_millis()))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
