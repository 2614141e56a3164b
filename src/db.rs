// ==========================================
// 车队排班导入系统 - SQLite 连接与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 / busy_timeout）
// - 建表幂等，可在每次启动时执行
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER NOT NULL,
    applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id    TEXT NOT NULL,
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS import_batch (
    batch_id           TEXT PRIMARY KEY,
    workspace_id       TEXT NOT NULL,
    status             TEXT NOT NULL,
    import_type        TEXT NOT NULL,
    file_name          TEXT NOT NULL,
    file_size_bytes    INTEGER NOT NULL,
    file_hash          TEXT NOT NULL,
    mapping_json       TEXT NOT NULL,
    preview_json       TEXT NOT NULL,
    diff_summary_json  TEXT,
    source_rows_json   TEXT,
    error_log_json     TEXT NOT NULL DEFAULT '[]',
    created_by         TEXT NOT NULL,
    decided_by         TEXT,
    rolled_back_by     TEXT,
    created_at         TEXT NOT NULL,
    applied_at         TEXT,
    declined_at        TEXT,
    rolled_back_at     TEXT
);

CREATE INDEX IF NOT EXISTS idx_import_batch_workspace
    ON import_batch (workspace_id, created_at);

-- 同工作区同内容：仅允许一个“非可重导”状态的批次
CREATE UNIQUE INDEX IF NOT EXISTS uq_import_batch_active_hash
    ON import_batch (workspace_id, file_hash)
    WHERE status NOT IN ('DECLINED', 'ROLLED_BACK', 'FAILED');

CREATE TABLE IF NOT EXISTS import_change_set (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    change_set_id  TEXT NOT NULL UNIQUE,
    batch_id       TEXT NOT NULL REFERENCES import_batch (batch_id),
    entity_type    TEXT NOT NULL,
    entity_id      TEXT NOT NULL,
    action         TEXT NOT NULL,
    row_number     INTEGER,
    before_json    TEXT,
    after_json     TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    UNIQUE (batch_id, entity_type, entity_id)
);

CREATE TABLE IF NOT EXISTS vehicle (
    id            TEXT PRIMARY KEY,
    workspace_id  TEXT NOT NULL,
    plate         TEXT NOT NULL,
    make          TEXT,
    model         TEXT,
    year          INTEGER,
    mileage_km    INTEGER,
    fuel_type     TEXT,
    archived      INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (workspace_id, plate)
);

CREATE TABLE IF NOT EXISTS shift (
    id             TEXT PRIMARY KEY,
    workspace_id   TEXT NOT NULL,
    shift_ref      TEXT NOT NULL,
    staff_name     TEXT NOT NULL,
    role           TEXT,
    location       TEXT,
    starts_at      TEXT NOT NULL,
    ends_at        TEXT NOT NULL,
    break_minutes  INTEGER,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    UNIQUE (workspace_id, shift_ref)
);

CREATE TABLE IF NOT EXISTS audit_log (
    event_id       TEXT PRIMARY KEY,
    workspace_id   TEXT NOT NULL,
    batch_id       TEXT NOT NULL,
    action         TEXT NOT NULL,
    actor          TEXT NOT NULL,
    at             TEXT NOT NULL,
    metadata_json  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_log_batch ON audit_log (batch_id, at);
"#;

/// 建表（幂等）并登记 schema_version
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    if read_schema_version(conn)?.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

/// 打开数据库、建表，并包装为共享连接
pub fn open_shared_database(db_path: &str) -> rusqlite::Result<Arc<Mutex<Connection>>> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 读取 schema_version（若表不存在或为空则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_active_hash_index_ignores_reimportable_statuses() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let insert = |id: &str, status: &str| {
            conn.execute(
                "INSERT INTO import_batch (batch_id, workspace_id, status, import_type, file_name,
                     file_size_bytes, file_hash, mapping_json, preview_json, created_by, created_at)
                 VALUES (?1, 'ws', ?2, 'FLEET', 'f.csv', 1, 'h', '{}', '{}', 'u', '2025-01-01')",
                [id, status],
            )
        };

        insert("b1", "DECLINED").unwrap();
        insert("b2", "PREVIEW").unwrap();
        assert!(insert("b3", "APPLIED").is_err());
    }
}
