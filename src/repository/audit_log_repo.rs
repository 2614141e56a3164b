// ==========================================
// 车队排班导入系统 - 审计日志仓储
// ==========================================
// 对齐: audit_log 表
// 红线: 上传 / 映射更新 / 应用 / 拒绝 / 回滚 均需写入
// ==========================================

use crate::domain::audit::{AuditAction, AuditEvent};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// AuditSink Trait
// ==========================================
// 实现者: SqliteAuditSink（也可替换为外部审计服务）
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> RepositoryResult<()>;
}

// ==========================================
// SqliteAuditSink
// ==========================================
pub struct SqliteAuditSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditSink {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批次审计轨迹（按时间）
    ///
    /// # 返回
    /// - (action, actor, metadata) 列表
    pub fn list_by_batch(
        &self,
        batch_id: &str,
    ) -> RepositoryResult<Vec<(String, String, serde_json::Value)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT action, actor, metadata_json FROM audit_log
            WHERE batch_id = ?1
            ORDER BY at, rowid
            "#,
        )?;
        let rows = stmt
            .query_map(params![batch_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(action, actor, metadata)| Ok((action, actor, serde_json::from_str(&metadata)?)))
            .collect()
    }

    /// 统计批次某类动作次数
    pub fn count_actions(&self, batch_id: &str, action: AuditAction) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE batch_id = ?1 AND action = ?2",
            params![batch_id, action.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, event: &AuditEvent) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO audit_log (
                event_id, workspace_id, batch_id, action, actor, at, metadata_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                event.event_id,
                event.workspace_id,
                event.batch_id,
                event.action.to_string(),
                event.actor,
                event.at,
                event.metadata.to_string(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::audit::Actor;
    use serde_json::json;

    #[test]
    fn test_record_and_list() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let sink = SqliteAuditSink::new(Arc::new(Mutex::new(conn)));
        let actor = Actor::new("alice", "ws");

        sink.record(&AuditEvent::new(&actor, "b1", AuditAction::ImportUpload, json!({"rows": 3})))
            .unwrap();
        sink.record(&AuditEvent::new(&actor, "b1", AuditAction::ImportAccept, json!({})))
            .unwrap();

        let trail = sink.list_by_batch("b1").unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].0, "IMPORT_UPLOAD");
        assert_eq!(trail[0].2["rows"], 3);
        assert_eq!(sink.count_actions("b1", AuditAction::ImportAccept).unwrap(), 1);
    }
}
