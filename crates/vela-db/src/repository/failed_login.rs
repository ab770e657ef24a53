//! SurrealDB implementation of [`FailedLoginRepository`].
//!
//! One row per attempt key, addressed directly by the key string so
//! writes are upserts rather than scan-and-update.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use vela_core::error::VelaResult;
use vela_core::models::lockout::{AttemptKey, FailedLoginCounter};
use vela_core::repository::FailedLoginRepository;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CounterRow {
    key: String,
    count: u32,
    window_start: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
}

fn parse_key(s: &str) -> Result<AttemptKey, DbError> {
    match s.split_once(':') {
        Some(("identity", rest)) => Ok(AttemptKey::Identity(rest.to_string())),
        Some(("ip", rest)) => Ok(AttemptKey::Ip(rest.to_string())),
        _ => Err(DbError::Migration(format!("unknown attempt key: {s}"))),
    }
}

/// SurrealDB implementation of the failed-login counter store.
#[derive(Clone)]
pub struct SurrealFailedLoginRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealFailedLoginRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> FailedLoginRepository for SurrealFailedLoginRepository<C> {
    async fn get(&self, key: &AttemptKey) -> VelaResult<Option<FailedLoginCounter>> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('failed_login', $id)")
            .bind(("id", key.storage_key()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CounterRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(FailedLoginCounter {
                key: parse_key(&row.key)?,
                count: row.count,
                window_start: row.window_start,
                locked_until: row.locked_until,
            })),
            None => Ok(None),
        }
    }

    async fn put(&self, counter: FailedLoginCounter) -> VelaResult<()> {
        self.db
            .query(
                "UPSERT type::record('failed_login', $id) SET \
                 key = $key, \
                 count = $count, \
                 window_start = $window_start, \
                 locked_until = $locked_until",
            )
            .bind(("id", counter.key.storage_key()))
            .bind(("key", counter.key.storage_key()))
            .bind(("count", counter.count))
            .bind(("window_start", counter.window_start))
            .bind(("locked_until", counter.locked_until))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self, key: &AttemptKey) -> VelaResult<()> {
        self.db
            .query("DELETE type::record('failed_login', $id)")
            .bind(("id", key.storage_key()))
            .await
            .map_err(DbError::from)?;

        Ok(())
    }
}
