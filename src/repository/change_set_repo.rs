// ==========================================
// 车队排班导入系统 - 变更集仓储
// ==========================================
// 对齐: import_change_set 表
// 红线: 只增不删（回滚后依然保留）
// 说明: 写入必须与实体变更处于同一事务，故写入接口接收调用方的连接/事务
// ==========================================

use crate::domain::import_batch::ImportChangeSet;
use crate::domain::types::{ChangeAction, EntityType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

struct ChangeSetRow {
    change_set_id: String,
    batch_id: String,
    entity_type: String,
    entity_id: String,
    action: String,
    row_number: Option<i64>,
    before_json: Option<String>,
    after_json: String,
    created_at: DateTime<Utc>,
}

impl ChangeSetRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            change_set_id: row.get(0)?,
            batch_id: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            action: row.get(4)?,
            row_number: row.get(5)?,
            before_json: row.get(6)?,
            after_json: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_change_set(self) -> RepositoryResult<ImportChangeSet> {
        let entity_type =
            EntityType::parse(&self.entity_type).ok_or_else(|| RepositoryError::FieldValueError {
                field: "entity_type".to_string(),
                message: format!("未知实体类型: {}", self.entity_type),
            })?;
        let action = ChangeAction::parse(&self.action).ok_or_else(|| RepositoryError::FieldValueError {
            field: "action".to_string(),
            message: format!("未知变更动作: {}", self.action),
        })?;
        let before = match self.before_json {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };

        Ok(ImportChangeSet {
            change_set_id: self.change_set_id,
            batch_id: self.batch_id,
            entity_type,
            entity_id: self.entity_id,
            action,
            row_number: self.row_number.map(|n| n as usize),
            before,
            after: serde_json::from_str(&self.after_json)?,
            created_at: self.created_at,
        })
    }
}

const CHANGE_SET_COLUMNS: &str = r#"
    change_set_id, batch_id, entity_type, entity_id, action,
    row_number, before_json, after_json, created_at
"#;

// ==========================================
// ChangeSetRepository
// ==========================================
pub struct ChangeSetRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ChangeSetRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 事务内操作（调用方持有连接）
    // ==========================================

    /// 在事务中插入变更集
    pub fn insert_tx(conn: &Connection, change_set: &ImportChangeSet) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO import_change_set (
                change_set_id, batch_id, entity_type, entity_id, action,
                row_number, before_json, after_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                change_set.change_set_id,
                change_set.batch_id,
                change_set.entity_type.to_db_str(),
                change_set.entity_id,
                change_set.action.to_db_str(),
                change_set.row_number.map(|n| n as i64),
                change_set
                    .before
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                serde_json::to_string(&change_set.after)?,
                change_set.created_at,
            ],
        )?;
        Ok(())
    }

    /// 查询 (batch, entity) 是否已有变更集
    pub fn find_for_entity_tx(
        conn: &Connection,
        batch_id: &str,
        entity_type: EntityType,
        entity_id: &str,
    ) -> RepositoryResult<Option<ImportChangeSet>> {
        let sql = format!(
            r#"
            SELECT {} FROM import_change_set
            WHERE batch_id = ?1 AND entity_type = ?2 AND entity_id = ?3
            "#,
            CHANGE_SET_COLUMNS
        );
        let row = conn
            .query_row(
                &sql,
                params![batch_id, entity_type.to_db_str(), entity_id],
                ChangeSetRow::from_row,
            )
            .optional()?;
        row.map(ChangeSetRow::into_change_set).transpose()
    }

    /// 按创建顺序列出批次变更集
    pub fn list_by_batch_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<Vec<ImportChangeSet>> {
        let sql = format!(
            "SELECT {} FROM import_change_set WHERE batch_id = ?1 ORDER BY seq",
            CHANGE_SET_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![batch_id], ChangeSetRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ChangeSetRow::into_change_set).collect()
    }

    // ==========================================
    // 独立查询（自行加锁）
    // ==========================================

    pub fn list_by_batch(&self, batch_id: &str) -> RepositoryResult<Vec<ImportChangeSet>> {
        let conn = self.get_conn()?;
        Self::list_by_batch_tx(&conn, batch_id)
    }

    pub fn count_by_batch(&self, batch_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_change_set WHERE batch_id = ?1",
            params![batch_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
