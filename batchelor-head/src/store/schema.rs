//! Exact DDL from the original `Dao.cpp`, translated column-for-column.

pub const CREATE_TASKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS TASKS(
    TASK_ID TEXT,
    CRC32 INTEGER,
    PRIORITY INTEGER,
    PRIORITY_TS INTEGER,
    EVENT_TYPE TEXT,
    SETTINGS BLOB,
    METRICS BLOB,
    SIGNALS TEXT,
    CONDITION TEXT,
    CREATED_TS INTEGER,
    BEGIN_TS TEXT,
    END_TS TEXT,
    LAST_HEARTBEAT_TS INTEGER,
    STATE TEXT,
    RETURN_CODE INTEGER,
    MESSAGE TEXT
)
"#;

pub const CREATE_AVAILABLE_EVENT_TYPES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS AVAILABLE_EVENT_TYPES(
    EVENT_TYPE TEXT,
    LAST_HEARTBEAT_TS INTEGER
)
"#;

pub async fn migrate(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_TASKS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_AVAILABLE_EVENT_TYPES_TABLE).execute(pool).await?;
    Ok(())
}
