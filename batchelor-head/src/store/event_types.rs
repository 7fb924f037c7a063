//! `AVAILABLE_EVENT_TYPES` table: which event types have a worker currently
//! reporting availability, and when it last did.

use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone)]
pub struct EventTypeStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventTypeRecord {
    pub event_type: String,
    pub last_heartbeat_ts: i64,
}

impl EventTypeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, event_type: &str, now_ts: i64) -> Result<(), sqlx::Error> {
        let existing = sqlx::query("SELECT EVENT_TYPE FROM AVAILABLE_EVENT_TYPES WHERE EVENT_TYPE = ?")
            .bind(event_type)
            .fetch_optional(&self.pool)
            .await?;

        if existing.is_some() {
            sqlx::query("UPDATE AVAILABLE_EVENT_TYPES SET LAST_HEARTBEAT_TS = ? WHERE EVENT_TYPE = ?")
                .bind(now_ts)
                .bind(event_type)
                .execute(&self.pool)
                .await?;
        } else {
            sqlx::query("INSERT INTO AVAILABLE_EVENT_TYPES (EVENT_TYPE, LAST_HEARTBEAT_TS) VALUES (?, ?)")
                .bind(event_type)
                .bind(now_ts)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn load_all(&self) -> Result<Vec<EventTypeRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT EVENT_TYPE, LAST_HEARTBEAT_TS FROM AVAILABLE_EVENT_TYPES")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| EventTypeRecord {
                event_type: row.get("EVENT_TYPE"),
                last_heartbeat_ts: row.get("LAST_HEARTBEAT_TS"),
            })
            .collect())
    }

    /// Event types still within the zombie timeout (`cutoff_ts` is
    /// `now - zombie_ttl`), used by `runTask`'s admission check and
    /// `loadEventTypes` — a worker that stopped heartbeating is no longer
    /// "available" even if its row hasn't been pruned yet.
    pub async fn load_live(&self, cutoff_ts: i64) -> Result<Vec<EventTypeRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT EVENT_TYPE, LAST_HEARTBEAT_TS FROM AVAILABLE_EVENT_TYPES WHERE LAST_HEARTBEAT_TS >= ?")
            .bind(cutoff_ts)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| EventTypeRecord {
                event_type: row.get("EVENT_TYPE"),
                last_heartbeat_ts: row.get("LAST_HEARTBEAT_TS"),
            })
            .collect())
    }

    pub async fn is_live(&self, event_type: &str, cutoff_ts: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM AVAILABLE_EVENT_TYPES WHERE EVENT_TYPE = ? AND LAST_HEARTBEAT_TS >= ?")
            .bind(event_type)
            .bind(cutoff_ts)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn prune_stale(&self, cutoff_ts: i64) -> Result<u64, sqlx::Error> {
        let deleted = sqlx::query("DELETE FROM AVAILABLE_EVENT_TYPES WHERE LAST_HEARTBEAT_TS < ?")
            .bind(cutoff_ts)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> EventTypeStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::store::schema::migrate(&pool).await.unwrap();
        EventTypeStore::new(pool)
    }

    #[tokio::test]
    async fn upsert_then_update() {
        let store = memory_store().await;
        store.upsert("build", 100).await.unwrap();
        store.upsert("build", 200).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].last_heartbeat_ts, 200);
    }

    #[tokio::test]
    async fn prune_stale_removes_old_entries() {
        let store = memory_store().await;
        store.upsert("build", 100).await.unwrap();
        store.upsert("deploy", 900).await.unwrap();

        let deleted = store.prune_stale(500).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.load_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_type, "deploy");
    }

    #[tokio::test]
    async fn load_live_excludes_stale_heartbeats() {
        let store = memory_store().await;
        store.upsert("build", 100).await.unwrap();
        store.upsert("deploy", 900).await.unwrap();

        let live = store.load_live(500).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].event_type, "deploy");
    }

    #[tokio::test]
    async fn is_live_checks_single_event_type() {
        let store = memory_store().await;
        store.upsert("build", 100).await.unwrap();

        assert!(store.is_live("build", 50).await.unwrap());
        assert!(!store.is_live("build", 500).await.unwrap());
        assert!(!store.is_live("missing", 0).await.unwrap());
    }
}
