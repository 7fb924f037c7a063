//! Task persistence against the `TASKS` table, grounded in `Dao.cpp`'s
//! `saveTask`/`loadTaskById`/`loadTasks`/`cleanup` family.

use std::collections::BTreeMap;

use batchelor_shared::model::{Task, TaskState};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

fn encode_map(map: &BTreeMap<String, String>) -> Vec<u8> {
    serde_json::to_vec(map).expect("BTreeMap<String, String> always serializes")
}

fn decode_map(blob: &[u8]) -> BTreeMap<String, String> {
    serde_json::from_slice(blob).unwrap_or_default()
}

fn encode_signals(signals: &[String]) -> String {
    signals.join(",")
}

fn decode_signals(text: &str) -> Vec<String> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split(',').map(|s| s.to_string()).collect()
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Task {
    let state_str: String = row.get("STATE");
    Task {
        task_id: row.get("TASK_ID"),
        crc32: row.get::<i64, _>("CRC32") as u32,
        priority: row.get("PRIORITY"),
        priority_ts: row.get("PRIORITY_TS"),
        event_type: row.get("EVENT_TYPE"),
        settings: decode_map(row.get::<Vec<u8>, _>("SETTINGS").as_slice()),
        metrics: decode_map(row.get::<Vec<u8>, _>("METRICS").as_slice()),
        signals: decode_signals(&row.get::<String, _>("SIGNALS")),
        condition: row.get("CONDITION"),
        created_ts: row.get("CREATED_TS"),
        begin_ts: row.get("BEGIN_TS"),
        end_ts: row.get("END_TS"),
        last_heartbeat_ts: row.get("LAST_HEARTBEAT_TS"),
        state: TaskState::from_str_opt(&state_str).unwrap_or(TaskState::Zombie),
        return_code: row.get("RETURN_CODE"),
        message: row.get("MESSAGE"),
    }
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, task: &Task) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO TASKS (
                TASK_ID, CRC32, PRIORITY, PRIORITY_TS, EVENT_TYPE, SETTINGS, METRICS,
                SIGNALS, CONDITION, CREATED_TS, BEGIN_TS, END_TS, LAST_HEARTBEAT_TS,
                STATE, RETURN_CODE, MESSAGE
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.task_id)
        .bind(task.crc32 as i64)
        .bind(task.priority)
        .bind(task.priority_ts)
        .bind(&task.event_type)
        .bind(encode_map(&task.settings))
        .bind(encode_map(&task.metrics))
        .bind(encode_signals(&task.signals))
        .bind(&task.condition)
        .bind(task.created_ts)
        .bind(&task.begin_ts)
        .bind(&task.end_ts)
        .bind(task.last_heartbeat_ts)
        .bind(task.state.as_str())
        .bind(task.return_code)
        .bind(&task.message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_by_id(&self, task_id: &str) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM TASKS WHERE TASK_ID = ?")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_task))
    }

    /// Most recently created task for an event type with the given
    /// fingerprint, regardless of state — used by `runTask`'s dedup check.
    pub async fn load_latest_by_fingerprint(
        &self,
        event_type: &str,
        crc32: u32,
    ) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT * FROM TASKS WHERE EVENT_TYPE = ? AND CRC32 = ? ORDER BY CREATED_TS DESC LIMIT 1",
        )
        .bind(event_type)
        .bind(crc32 as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_task))
    }

    /// Tasks queued for an event type, used by `fetchTask`'s candidate
    /// selection.
    pub async fn load_queued_by_event_type(&self, event_type: &str) -> Result<Vec<Task>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM TASKS WHERE EVENT_TYPE = ? AND STATE = 'queued'")
            .bind(event_type)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    pub async fn load_all(&self) -> Result<Vec<Task>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM TASKS ORDER BY CREATED_TS DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    pub async fn load_by_state(&self, state: TaskState) -> Result<Vec<Task>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM TASKS WHERE STATE = ? ORDER BY CREATED_TS DESC")
            .bind(state.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    pub async fn update_state(
        &self,
        task_id: &str,
        state: TaskState,
        return_code: Option<i32>,
        message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE TASKS SET STATE = ?, RETURN_CODE = ?, MESSAGE = ? WHERE TASK_ID = ?")
            .bind(state.as_str())
            .bind(return_code)
            .bind(message)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_running(&self, task_id: &str, begin_ts: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE TASKS SET STATE = 'running', BEGIN_TS = ? WHERE TASK_ID = ?")
            .bind(begin_ts)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_ended(
        &self,
        task_id: &str,
        state: TaskState,
        end_ts: &str,
        return_code: Option<i32>,
        message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE TASKS SET STATE = ?, END_TS = ?, RETURN_CODE = ?, MESSAGE = ? WHERE TASK_ID = ?")
            .bind(state.as_str())
            .bind(end_ts)
            .bind(return_code)
            .bind(message)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn touch_heartbeat(&self, task_id: &str, now_ts: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE TASKS SET LAST_HEARTBEAT_TS = ? WHERE TASK_ID = ?")
            .bind(now_ts)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn append_signal(&self, task_id: &str, signal: &str) -> Result<(), sqlx::Error> {
        if let Some(mut task) = self.load_by_id(task_id).await? {
            task.signals.push(signal.to_string());
            sqlx::query("UPDATE TASKS SET SIGNALS = ? WHERE TASK_ID = ?")
                .bind(encode_signals(&task.signals))
                .bind(task_id)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn clear_signals(&self, task_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE TASKS SET SIGNALS = '' WHERE TASK_ID = ?")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Zombie sweep: `queued`/`running` tasks whose heartbeat is older than
    /// `zombie_cutoff_ts` are promoted to `zombie`. Any task (terminal or
    /// not) whose heartbeat is older than `delete_cutoff_ts` is
    /// hard-deleted. Returns (promoted, deleted).
    pub async fn sweep(&self, zombie_cutoff_ts: i64, delete_cutoff_ts: i64) -> Result<(u64, u64), sqlx::Error> {
        let promoted = sqlx::query(
            "UPDATE TASKS SET STATE = 'zombie' WHERE STATE IN ('queued', 'running') AND LAST_HEARTBEAT_TS < ?",
        )
        .bind(zombie_cutoff_ts)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let deleted = sqlx::query("DELETE FROM TASKS WHERE LAST_HEARTBEAT_TS < ?")
            .bind(delete_cutoff_ts)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok((promoted, deleted))
    }

    /// Refreshes an existing task's admission parameters on a dedup hit
    /// (`runTask` step 3): priority, condition, and the priority timestamp
    /// restart so aging recomputes from the resubmission.
    pub async fn update_for_dedup(
        &self,
        task_id: &str,
        priority: i64,
        condition: &str,
        priority_ts: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE TASKS SET PRIORITY = ?, CONDITION = ?, PRIORITY_TS = ? WHERE TASK_ID = ?")
            .bind(priority)
            .bind(condition)
            .bind(priority_ts)
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchelor_shared::model::fingerprint;

    async fn memory_store() -> TaskStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::store::schema::migrate(&pool).await.unwrap();
        TaskStore::new(pool)
    }

    fn sample_task(id: &str, event_type: &str, state: TaskState) -> Task {
        let settings = BTreeMap::new();
        let metrics = BTreeMap::new();
        Task {
            task_id: id.to_string(),
            crc32: fingerprint(&settings, &metrics),
            priority: 0,
            priority_ts: 0,
            event_type: event_type.to_string(),
            settings,
            metrics,
            signals: Vec::new(),
            condition: String::new(),
            created_ts: 0,
            begin_ts: None,
            end_ts: None,
            last_heartbeat_ts: 0,
            state,
            return_code: None,
            message: None,
        }
    }

    #[tokio::test]
    async fn insert_and_load_round_trips() {
        let store = memory_store().await;
        let task = sample_task("t1", "build", TaskState::Queued);
        store.insert(&task).await.unwrap();

        let loaded = store.load_by_id("t1").await.unwrap().unwrap();
        assert_eq!(loaded.task_id, "t1");
        assert_eq!(loaded.event_type, "build");
        assert_eq!(loaded.state, TaskState::Queued);
    }

    #[tokio::test]
    async fn load_queued_by_event_type_filters_state() {
        let store = memory_store().await;
        store.insert(&sample_task("t1", "build", TaskState::Queued)).await.unwrap();
        store.insert(&sample_task("t2", "build", TaskState::Running)).await.unwrap();

        let queued = store.load_queued_by_event_type("build").await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].task_id, "t1");
    }

    #[tokio::test]
    async fn sweep_promotes_stale_running_and_deletes_old_by_heartbeat() {
        let store = memory_store().await;
        let mut running = sample_task("t1", "build", TaskState::Running);
        running.last_heartbeat_ts = 100;
        store.insert(&running).await.unwrap();

        let mut done = sample_task("t2", "build", TaskState::Done);
        done.last_heartbeat_ts = 100;
        store.insert(&done).await.unwrap();

        let (promoted, deleted) = store.sweep(1_000, 1_000).await.unwrap();
        assert_eq!(promoted, 1);
        assert_eq!(deleted, 1);

        let t1 = store.load_by_id("t1").await.unwrap().unwrap();
        assert_eq!(t1.state, TaskState::Zombie);
        assert!(store.load_by_id("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sweep_promotes_stale_queued_too() {
        let store = memory_store().await;
        let mut queued = sample_task("t1", "build", TaskState::Queued);
        queued.last_heartbeat_ts = 100;
        store.insert(&queued).await.unwrap();

        let (promoted, _deleted) = store.sweep(1_000, 0).await.unwrap();
        assert_eq!(promoted, 1);
        let t1 = store.load_by_id("t1").await.unwrap().unwrap();
        assert_eq!(t1.state, TaskState::Zombie);
    }

    #[tokio::test]
    async fn sweep_delete_ignores_state() {
        let store = memory_store().await;
        let mut running = sample_task("t1", "build", TaskState::Running);
        running.last_heartbeat_ts = 100;
        store.insert(&running).await.unwrap();

        let (_promoted, deleted) = store.sweep(0, 1_000).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.load_by_id("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_for_dedup_refreshes_priority_and_condition() {
        let store = memory_store().await;
        store.insert(&sample_task("t1", "build", TaskState::Queued)).await.unwrap();

        store.update_for_dedup("t1", 7, "${ENV} == \"prod\"", 500).await.unwrap();

        let task = store.load_by_id("t1").await.unwrap().unwrap();
        assert_eq!(task.priority, 7);
        assert_eq!(task.condition, "${ENV} == \"prod\"");
        assert_eq!(task.priority_ts, 500);
    }

    #[tokio::test]
    async fn append_signal_accumulates() {
        let store = memory_store().await;
        store.insert(&sample_task("t1", "build", TaskState::Running)).await.unwrap();
        store.append_signal("t1", "CANCEL").await.unwrap();
        let task = store.load_by_id("t1").await.unwrap().unwrap();
        assert_eq!(task.signals, vec!["CANCEL".to_string()]);
    }
}
