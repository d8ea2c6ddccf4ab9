use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tempo_types::{ReachedTimer, ScheduledTimer, Timer, TimerKey};
use tracing::info;

use crate::error::{StoreError, StoreOperation};
use crate::store::TimerStore;

const SCHEMA: &str = include_str!("schema.sql");

/// Reference [`TimerStore`] over an embedded SQLite database.
///
/// One row per [`TimerKey`]; the state column discriminates the aggregate
/// variant and `reached_at` is populated exactly when the state is
/// `Reached`. Instants are stored as fixed-width RFC 3339 TEXT
/// (millisecond precision, `Z` suffix), so lexicographic comparison in
/// SQL matches chronological order.
#[derive(Clone)]
pub struct SqliteTimerStore {
    pool: SqlitePool,
}

impl SqliteTimerStore {
    /// Connect to `database_url` (e.g. `sqlite://tempo.db`), creating the
    /// file when missing. Foreign keys are enforced on every connection.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::new(StoreOperation::Connect, e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::new(StoreOperation::Connect, e.to_string()))?;
        info!(database_url, "connected to sqlite timer store");
        Ok(Self { pool })
    }

    /// Private in-memory database, pinned to a single pooled connection
    /// so the database lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::new(StoreOperation::Connect, e.to_string()))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::new(StoreOperation::Connect, e.to_string()))?;
        Ok(Self { pool })
    }

    /// Apply the embedded DDL. Idempotent; the entry point runs this at
    /// startup and test fixtures run it per database.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::new(StoreOperation::Migrate, e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn encode_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_instant(text: &str, operation: StoreOperation) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::new(operation, format!("corrupt instant {text:?}: {e}")))
}

fn decode_key(row: &SqliteRow, operation: StoreOperation) -> Result<TimerKey, StoreError> {
    let tenant_id: String = row
        .try_get("tenant_id")
        .map_err(|e| StoreError::new(operation, e.to_string()))?;
    let service_call_id: String = row
        .try_get("service_call_id")
        .map_err(|e| StoreError::new(operation, e.to_string()))?;
    Ok(TimerKey::new(
        tenant_id
            .parse()
            .map_err(|e| StoreError::new(operation, format!("{e}")))?,
        service_call_id
            .parse()
            .map_err(|e| StoreError::new(operation, format!("{e}")))?,
    ))
}

fn decode_scheduled(row: &SqliteRow, operation: StoreOperation) -> Result<ScheduledTimer, StoreError> {
    let key = decode_key(row, operation)?;
    let correlation_id: Option<String> = row
        .try_get("correlation_id")
        .map_err(|e| StoreError::new(operation, e.to_string()))?;
    let due_at: String = row
        .try_get("due_at")
        .map_err(|e| StoreError::new(operation, e.to_string()))?;
    let registered_at: String = row
        .try_get("registered_at")
        .map_err(|e| StoreError::new(operation, e.to_string()))?;
    Ok(ScheduledTimer::schedule(
        key,
        decode_instant(&due_at, operation)?,
        decode_instant(&registered_at, operation)?,
        correlation_id
            .map(|id| id.parse::<tempo_types::CorrelationId>())
            .transpose()
            .map_err(|e| StoreError::new(operation, format!("{e}")))?,
    ))
}

fn decode_timer(row: &SqliteRow, operation: StoreOperation) -> Result<Timer, StoreError> {
    let scheduled = decode_scheduled(row, operation)?;
    let state: String = row
        .try_get("state")
        .map_err(|e| StoreError::new(operation, e.to_string()))?;
    match state.as_str() {
        "Scheduled" => Ok(Timer::Scheduled(scheduled)),
        "Reached" => {
            let reached_at: Option<String> = row
                .try_get("reached_at")
                .map_err(|e| StoreError::new(operation, e.to_string()))?;
            let reached_at = reached_at.ok_or_else(|| {
                StoreError::new(operation, "Reached row without reached_at")
            })?;
            Ok(Timer::Reached(ReachedTimer {
                reached_at: decode_instant(&reached_at, operation)?,
                tenant_id: scheduled.tenant_id,
                service_call_id: scheduled.service_call_id,
                due_at: scheduled.due_at,
                registered_at: scheduled.registered_at,
                correlation_id: scheduled.correlation_id,
            }))
        }
        other => Err(StoreError::new(
            operation,
            format!("unknown timer state {other:?}"),
        )),
    }
}

#[async_trait]
impl TimerStore for SqliteTimerStore {
    async fn save(&self, timer: &ScheduledTimer) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO timer_schedules (
                tenant_id, service_call_id, correlation_id, due_at, registered_at, state
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'Scheduled')
            ON CONFLICT (tenant_id, service_call_id) DO UPDATE SET
                correlation_id = excluded.correlation_id,
                due_at = excluded.due_at,
                registered_at = excluded.registered_at
            "#,
        )
        .bind(timer.tenant_id.to_string())
        .bind(timer.service_call_id.to_string())
        .bind(timer.correlation_id.map(|id| id.to_string()))
        .bind(encode_instant(timer.due_at))
        .bind(encode_instant(timer.registered_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::new(StoreOperation::Save, e.to_string()))?;
        Ok(())
    }

    async fn find(&self, key: TimerKey) -> Result<Option<Timer>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, service_call_id, correlation_id, due_at, registered_at, reached_at, state
            FROM timer_schedules
            WHERE tenant_id = ?1 AND service_call_id = ?2
            "#,
        )
        .bind(key.tenant_id.to_string())
        .bind(key.service_call_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::new(StoreOperation::Find, e.to_string()))?;

        row.map(|row| decode_timer(&row, StoreOperation::Find))
            .transpose()
    }

    async fn find_scheduled(&self, key: TimerKey) -> Result<Option<ScheduledTimer>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, service_call_id, correlation_id, due_at, registered_at
            FROM timer_schedules
            WHERE tenant_id = ?1 AND service_call_id = ?2 AND state = 'Scheduled'
            "#,
        )
        .bind(key.tenant_id.to_string())
        .bind(key.service_call_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::new(StoreOperation::FindScheduled, e.to_string()))?;

        row.map(|row| decode_scheduled(&row, StoreOperation::FindScheduled))
            .transpose()
    }

    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTimer>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, service_call_id, correlation_id, due_at, registered_at
            FROM timer_schedules
            WHERE state = 'Scheduled' AND due_at <= ?1
            ORDER BY due_at ASC
            "#,
        )
        .bind(encode_instant(now))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::new(StoreOperation::FindDue, e.to_string()))?;

        rows.iter()
            .map(|row| decode_scheduled(row, StoreOperation::FindDue))
            .collect()
    }

    async fn mark_fired(&self, key: TimerKey, reached_at: DateTime<Utc>) -> Result<(), StoreError> {
        // The state guard makes the transition atomic and idempotent: a
        // row that already reached keeps its original reached_at, and a
        // missing row matches nothing.
        sqlx::query(
            r#"
            UPDATE timer_schedules
            SET state = 'Reached', reached_at = ?3
            WHERE tenant_id = ?1 AND service_call_id = ?2 AND state = 'Scheduled'
            "#,
        )
        .bind(key.tenant_id.to_string())
        .bind(key.service_call_id.to_string())
        .bind(encode_instant(reached_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::new(StoreOperation::MarkFired, e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: TimerKey) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM timer_schedules WHERE tenant_id = ?1 AND service_call_id = ?2",
        )
        .bind(key.tenant_id.to_string())
        .bind(key.service_call_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::new(StoreOperation::Delete, e.to_string()))?;
        Ok(())
    }
}
