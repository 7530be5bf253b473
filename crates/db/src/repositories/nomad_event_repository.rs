use chrono::Utc;
use jobtrail_core::{EventUid, NomadEvent};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbError;
use crate::models::{index_to_db, NomadEventRow};

const SELECT_EVENTS: &str = r#"
    SELECT e.uid, e.topic, e.type AS event_type, e.key, e.filter_keys, e."index" AS "index",
           e.payload, m.handled
    FROM nomad_events e
    JOIN nomad_event_marks m ON m.uid = e.uid
"#;

/// Append-only store of Nomad events.
///
/// Event bodies are insert-only; the `handled` marker is kept in a separate
/// table and is the only state that changes after an event is recorded.
#[derive(Clone)]
pub struct NomadEventRepository {
    pool: SqlitePool,
}

impl NomadEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Records an event, or fetches the stored copy if its uid is already known.
    ///
    /// The returned event is the persisted row, so a redelivered event comes back
    /// with the `handled` state of the first delivery.
    pub async fn save(&self, event: &NomadEvent) -> Result<NomadEvent, DbError> {
        let index = index_to_db(event.index)?;
        let filter_keys = serde_json::to_string(&event.filter_keys)?;
        let payload = serde_json::to_string(&event.payload)?;
        let uid = event.uid.to_hex();

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO nomad_events (uid, topic, type, key, filter_keys, "index", payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (uid) DO NOTHING
            "#,
        )
        .bind(&uid)
        .bind(&event.topic)
        .bind(&event.event_type)
        .bind(&event.key)
        .bind(&filter_keys)
        .bind(index)
        .bind(&payload)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            "INSERT INTO nomad_event_marks (uid, handled) VALUES (?, 0) ON CONFLICT (uid) DO NOTHING",
        )
        .bind(&uid)
        .execute(&mut *tx)
        .await?;

        let stored = Self::find_by_uid(&mut *tx, &event.uid)
            .await?
            .ok_or(DbError::EventNotFound(event.uid))?;

        tx.commit().await?;

        debug!(
            uid = %event.uid,
            index = event.index,
            duplicate = inserted == 0,
            "Saved nomad event"
        );

        Ok(stored)
    }

    /// Persists the `handled` flag of an already recorded event.
    pub async fn update(&self, event: &NomadEvent) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE nomad_event_marks SET handled = ? WHERE uid = ?")
            .bind(event.handled)
            .bind(event.uid.to_hex())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::EventNotFound(event.uid));
        }

        Ok(())
    }

    async fn find_by_uid(
        conn: &mut SqliteConnection,
        uid: &EventUid,
    ) -> Result<Option<NomadEvent>, DbError> {
        let row: Option<NomadEventRow> =
            sqlx::query_as(&format!("{SELECT_EVENTS} WHERE e.uid = ?"))
                .bind(uid.to_hex())
                .fetch_optional(conn)
                .await?;

        row.map(NomadEventRow::try_into_domain).transpose()
    }

    /// All events with the given processing state, in no particular order.
    pub async fn get_by_handled(&self, handled: bool) -> Result<Vec<NomadEvent>, DbError> {
        let rows: Vec<NomadEventRow> =
            sqlx::query_as(&format!("{SELECT_EVENTS} WHERE m.handled = ?"))
                .bind(handled)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(NomadEventRow::try_into_domain)
            .collect()
    }

    /// Highest stored event index, or 0 for an empty store.
    pub async fn get_last_nomad_event_index(&self) -> Result<u64, DbError> {
        let (index,): (i64,) =
            sqlx::query_as(r#"SELECT COALESCE(MAX("index"), 0) FROM nomad_events"#)
                .fetch_one(&self.pool)
                .await?;

        u64::try_from(index)
            .map_err(|_| DbError::InvalidData(format!("negative nomad event index {index}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use serde_json::json;

    async fn setup_test_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn job_event(index: u64) -> NomadEvent {
        NomadEvent::new("Job", "JobRegistered", "job-1", index, json!({"Job": {"ID": "job-1"}}))
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let pool = setup_test_db().await;
        let repo = NomadEventRepository::new(pool.clone());

        let event = job_event(1);
        let first = repo.save(&event).await.unwrap();
        let second = repo.save(&event).await.unwrap();

        assert_eq!(first.uid, second.uid);
        assert_eq!(first.handled, second.handled);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nomad_events")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_redelivery_returns_persisted_handled_flag() {
        let pool = setup_test_db().await;
        let repo = NomadEventRepository::new(pool);

        let mut event = repo.save(&job_event(1)).await.unwrap();
        assert!(!event.handled);

        event.handled = true;
        repo.update(&event).await.unwrap();

        // a retry carries handled = false, the stored row wins
        let redelivered = repo.save(&job_event(1)).await.unwrap();
        assert!(redelivered.handled);
    }

    #[tokio::test]
    async fn test_save_normalizes_filter_keys() {
        let pool = setup_test_db().await;
        let repo = NomadEventRepository::new(pool.clone());

        repo.save(&job_event(1)).await.unwrap();
        let (raw,): (String,) = sqlx::query_as("SELECT filter_keys FROM nomad_events")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(raw, "[]");

        let tagged = job_event(2).with_filter_keys(vec!["b".into(), "a".into()]);
        let saved = repo.save(&tagged).await.unwrap();
        assert_eq!(saved.filter_keys, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_update_unknown_event_fails() {
        let pool = setup_test_db().await;
        let repo = NomadEventRepository::new(pool);

        let err = repo.update(&job_event(9)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_event_bodies_are_append_only() {
        let pool = setup_test_db().await;
        let repo = NomadEventRepository::new(pool.clone());
        repo.save(&job_event(1)).await.unwrap();

        let result = sqlx::query("UPDATE nomad_events SET topic = 'Node'")
            .execute(&pool)
            .await;
        assert!(result.is_err());

        let result = sqlx::query("DELETE FROM nomad_events").execute(&pool).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_by_handled() {
        let pool = setup_test_db().await;
        let repo = NomadEventRepository::new(pool);

        for index in 1..=3 {
            repo.save(&job_event(index)).await.unwrap();
        }
        let mut done = repo.save(&job_event(2)).await.unwrap();
        done.handled = true;
        repo.update(&done).await.unwrap();

        let pending = repo.get_by_handled(false).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|e| e.index != 2));

        let handled = repo.get_by_handled(true).await.unwrap();
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].uid, done.uid);
    }

    #[tokio::test]
    async fn test_last_index() {
        let pool = setup_test_db().await;
        let repo = NomadEventRepository::new(pool);

        assert_eq!(repo.get_last_nomad_event_index().await.unwrap(), 0);

        for index in [3, 1, 7, 2] {
            repo.save(&job_event(index)).await.unwrap();
        }
        assert_eq!(repo.get_last_nomad_event_index().await.unwrap(), 7);
    }
}
