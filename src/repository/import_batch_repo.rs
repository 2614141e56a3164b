// ==========================================
// 车队排班导入系统 - 导入批次仓储
// ==========================================
// 对齐: import_batch 表
// 红线: 状态写入一律 compare-and-set（WHERE status = 期望状态）
// 红线: 批次不物理删除
// ==========================================

use crate::domain::diff::DiffSummary;
use crate::domain::import_batch::{ColumnMapping, ImportBatch, PreviewInfo, RowFailure};
use crate::domain::types::{BatchStatus, ImportType};
use crate::importer::file_parser::RawRow;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

const BATCH_COLUMNS: &str = r#"
    batch_id, workspace_id, status, import_type, file_name, file_size_bytes,
    file_hash, mapping_json, preview_json, diff_summary_json, error_log_json,
    created_by, decided_by, rolled_back_by,
    created_at, applied_at, declined_at, rolled_back_at
"#;

/// 分析阶段结果（上传分析 / 映射重算共用）
#[derive(Debug)]
pub struct AnalysisRecord<'a> {
    pub mapping: &'a ColumnMapping,
    pub preview: &'a PreviewInfo,
    pub diff_summary: Option<&'a DiffSummary>,
    pub source_rows: Option<&'a [RawRow]>,
}

// 数据库原始行（JSON 尚未解码）
struct BatchRow {
    batch_id: String,
    workspace_id: String,
    status: String,
    import_type: String,
    file_name: String,
    file_size_bytes: i64,
    file_hash: String,
    mapping_json: String,
    preview_json: String,
    diff_summary_json: Option<String>,
    error_log_json: String,
    created_by: String,
    decided_by: Option<String>,
    rolled_back_by: Option<String>,
    created_at: DateTime<Utc>,
    applied_at: Option<DateTime<Utc>>,
    declined_at: Option<DateTime<Utc>>,
    rolled_back_at: Option<DateTime<Utc>>,
}

impl BatchRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            batch_id: row.get(0)?,
            workspace_id: row.get(1)?,
            status: row.get(2)?,
            import_type: row.get(3)?,
            file_name: row.get(4)?,
            file_size_bytes: row.get(5)?,
            file_hash: row.get(6)?,
            mapping_json: row.get(7)?,
            preview_json: row.get(8)?,
            diff_summary_json: row.get(9)?,
            error_log_json: row.get(10)?,
            created_by: row.get(11)?,
            decided_by: row.get(12)?,
            rolled_back_by: row.get(13)?,
            created_at: row.get(14)?,
            applied_at: row.get(15)?,
            declined_at: row.get(16)?,
            rolled_back_at: row.get(17)?,
        })
    }

    fn into_batch(self) -> RepositoryResult<ImportBatch> {
        let status = BatchStatus::parse(&self.status).ok_or_else(|| RepositoryError::FieldValueError {
            field: "status".to_string(),
            message: format!("未知批次状态: {}", self.status),
        })?;
        let import_type =
            ImportType::parse(&self.import_type).ok_or_else(|| RepositoryError::FieldValueError {
                field: "import_type".to_string(),
                message: format!("未知导入类型: {}", self.import_type),
            })?;

        let diff_summary = match self.diff_summary_json {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };

        Ok(ImportBatch {
            batch_id: self.batch_id,
            workspace_id: self.workspace_id,
            status,
            import_type,
            file_name: self.file_name,
            file_size_bytes: self.file_size_bytes,
            file_hash: self.file_hash,
            mapping: serde_json::from_str(&self.mapping_json)?,
            preview: serde_json::from_str(&self.preview_json)?,
            diff_summary,
            error_log: serde_json::from_str(&self.error_log_json)?,
            created_by: self.created_by,
            decided_by: self.decided_by,
            rolled_back_by: self.rolled_back_by,
            created_at: self.created_at,
            applied_at: self.applied_at,
            declined_at: self.declined_at,
            rolled_back_at: self.rolled_back_at,
        })
    }
}

// ==========================================
// ImportBatchRepository
// ==========================================
pub struct ImportBatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportBatchRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入新批次
    ///
    /// # 返回
    /// - Err(UniqueConstraintViolation): 同工作区已有同哈希的活动批次
    pub fn insert(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO import_batch (
                batch_id, workspace_id, status, import_type, file_name, file_size_bytes,
                file_hash, mapping_json, preview_json, diff_summary_json, error_log_json,
                created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                batch.batch_id,
                batch.workspace_id,
                batch.status.to_db_str(),
                batch.import_type.to_db_str(),
                batch.file_name,
                batch.file_size_bytes,
                batch.file_hash,
                serde_json::to_string(&batch.mapping)?,
                serde_json::to_string(&batch.preview)?,
                batch
                    .diff_summary
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                serde_json::to_string(&batch.error_log)?,
                batch.created_by,
                batch.created_at,
            ],
        )?;

        Ok(())
    }

    /// 纯状态转换（CAS）
    ///
    /// # 返回
    /// - Ok(true): 转换成功
    /// - Ok(false): 当前状态已不是 from（被并发调用方抢先）
    pub fn compare_and_set_status(
        &self,
        batch_id: &str,
        from: BatchStatus,
        to: BatchStatus,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE import_batch SET status = ?1 WHERE batch_id = ?2 AND status = ?3",
            params![to.to_db_str(), batch_id, from.to_db_str()],
        )?;
        Ok(rows == 1)
    }

    /// 写入分析结果并转换状态（ANALYZING → PREVIEW/FAILED，或 PREVIEW → PREVIEW 重映射）
    pub fn record_analysis(
        &self,
        batch_id: &str,
        from: BatchStatus,
        to: BatchStatus,
        analysis: &AnalysisRecord<'_>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let diff_json = analysis.diff_summary.map(serde_json::to_string).transpose()?;
        let rows_json = analysis.source_rows.map(serde_json::to_string).transpose()?;

        let rows = conn.execute(
            r#"
            UPDATE import_batch
            SET status = ?1,
                mapping_json = ?2,
                preview_json = ?3,
                diff_summary_json = ?4,
                source_rows_json = COALESCE(?5, source_rows_json)
            WHERE batch_id = ?6 AND status = ?7
            "#,
            params![
                to.to_db_str(),
                serde_json::to_string(analysis.mapping)?,
                serde_json::to_string(analysis.preview)?,
                diff_json,
                rows_json,
                batch_id,
                from.to_db_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    /// PREVIEW → APPLYING，记录决策人
    pub fn begin_apply(&self, batch_id: &str, decided_by: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE import_batch SET status = ?1, decided_by = ?2
            WHERE batch_id = ?3 AND status = ?4
            "#,
            params![
                BatchStatus::Applying.to_db_str(),
                decided_by,
                batch_id,
                BatchStatus::Preview.to_db_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    /// APPLYING → APPLIED，写入行级失败日志
    pub fn mark_applied(
        &self,
        batch_id: &str,
        applied_at: DateTime<Utc>,
        error_log: &[RowFailure],
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE import_batch SET status = ?1, applied_at = ?2, error_log_json = ?3
            WHERE batch_id = ?4 AND status = ?5
            "#,
            params![
                BatchStatus::Applied.to_db_str(),
                applied_at,
                serde_json::to_string(error_log)?,
                batch_id,
                BatchStatus::Applying.to_db_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    /// PREVIEW → DECLINED
    pub fn mark_declined(
        &self,
        batch_id: &str,
        decided_by: &str,
        declined_at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE import_batch SET status = ?1, decided_by = ?2, declined_at = ?3
            WHERE batch_id = ?4 AND status = ?5
            "#,
            params![
                BatchStatus::Declined.to_db_str(),
                decided_by,
                declined_at,
                batch_id,
                BatchStatus::Preview.to_db_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    /// APPLIED → ROLLED_BACK，回滚失败追加到既有日志之后
    pub fn mark_rolled_back(
        &self,
        batch_id: &str,
        rolled_back_by: &str,
        rolled_back_at: DateTime<Utc>,
        error_log: &[RowFailure],
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            r#"
            UPDATE import_batch
            SET status = ?1, rolled_back_by = ?2, rolled_back_at = ?3, error_log_json = ?4
            WHERE batch_id = ?5 AND status = ?6
            "#,
            params![
                BatchStatus::RolledBack.to_db_str(),
                rolled_back_by,
                rolled_back_at,
                serde_json::to_string(error_log)?,
                batch_id,
                BatchStatus::Applied.to_db_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<ImportBatch>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM import_batch WHERE batch_id = ?1", BATCH_COLUMNS);
        let row = conn
            .query_row(&sql, params![batch_id], BatchRow::from_row)
            .optional()?;
        row.map(BatchRow::into_batch).transpose()
    }

    /// 查找同工作区同哈希的活动批次（非 DECLINED / ROLLED_BACK / FAILED）
    pub fn find_active_by_hash(
        &self,
        workspace_id: &str,
        file_hash: &str,
    ) -> RepositoryResult<Option<ImportBatch>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM import_batch
            WHERE workspace_id = ?1 AND file_hash = ?2
              AND status NOT IN ('DECLINED', 'ROLLED_BACK', 'FAILED')
            LIMIT 1
            "#,
            BATCH_COLUMNS
        );
        let row = conn
            .query_row(&sql, params![workspace_id, file_hash], BatchRow::from_row)
            .optional()?;
        row.map(BatchRow::into_batch).transpose()
    }

    /// 工作区批次列表（最新在前）
    pub fn list_by_workspace(
        &self,
        workspace_id: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<ImportBatch>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT {} FROM import_batch
            WHERE workspace_id = ?1
            ORDER BY created_at DESC, batch_id
            LIMIT ?2
            "#,
            BATCH_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![workspace_id, limit as i64], BatchRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(BatchRow::into_batch).collect()
    }

    /// 读取解析后的原始行（仅映射重算使用）
    pub fn load_source_rows(&self, batch_id: &str) -> RepositoryResult<Option<Vec<RawRow>>> {
        let conn = self.get_conn()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT source_rows_json FROM import_batch WHERE batch_id = ?1",
                params![batch_id],
                |row| row.get(0),
            )
            .optional()?;

        match raw.flatten() {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, init_schema};
    use chrono::TimeZone;

    fn setup() -> ImportBatchRepository {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        ImportBatchRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn batch(id: &str, hash: &str) -> ImportBatch {
        ImportBatch {
            batch_id: id.to_string(),
            workspace_id: "ws1".to_string(),
            status: BatchStatus::Uploading,
            import_type: ImportType::Fleet,
            file_name: "fleet.csv".to_string(),
            file_size_bytes: 42,
            file_hash: hash.to_string(),
            mapping: ColumnMapping::default(),
            preview: PreviewInfo::default(),
            diff_summary: None,
            error_log: Vec::new(),
            created_by: "alice".to_string(),
            decided_by: None,
            rolled_back_by: None,
            created_at: Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap(),
            applied_at: None,
            declined_at: None,
            rolled_back_at: None,
        }
    }

    #[test]
    fn test_insert_and_find_roundtrip() {
        let repo = setup();
        let original = batch("b1", "h1");
        repo.insert(&original).unwrap();

        let loaded = repo.find_by_id("b1").unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(repo.find_by_id("missing").unwrap().is_none());
    }

    #[test]
    fn test_compare_and_set_only_wins_once() {
        let repo = setup();
        repo.insert(&batch("b1", "h1")).unwrap();

        assert!(repo
            .compare_and_set_status("b1", BatchStatus::Uploading, BatchStatus::Analyzing)
            .unwrap());
        assert!(!repo
            .compare_and_set_status("b1", BatchStatus::Uploading, BatchStatus::Analyzing)
            .unwrap());
    }

    #[test]
    fn test_record_analysis_keeps_source_rows_on_remap() {
        let repo = setup();
        repo.insert(&batch("b1", "h1")).unwrap();
        repo.compare_and_set_status("b1", BatchStatus::Uploading, BatchStatus::Analyzing)
            .unwrap();

        let rows: Vec<RawRow> = vec![[("plate".to_string(), "AB1".to_string())].into_iter().collect()];
        let mapping = ColumnMapping::default();
        let preview = PreviewInfo::default();
        let diff = DiffSummary::default();
        assert!(repo
            .record_analysis(
                "b1",
                BatchStatus::Analyzing,
                BatchStatus::Preview,
                &AnalysisRecord {
                    mapping: &mapping,
                    preview: &preview,
                    diff_summary: Some(&diff),
                    source_rows: Some(&rows),
                },
            )
            .unwrap());

        // 重映射不携带原始行
        assert!(repo
            .record_analysis(
                "b1",
                BatchStatus::Preview,
                BatchStatus::Preview,
                &AnalysisRecord {
                    mapping: &mapping,
                    preview: &preview,
                    diff_summary: Some(&diff),
                    source_rows: None,
                },
            )
            .unwrap());

        assert_eq!(repo.load_source_rows("b1").unwrap(), Some(rows));
    }

    #[test]
    fn test_find_active_by_hash_ignores_declined() {
        let repo = setup();
        repo.insert(&batch("b1", "h1")).unwrap();
        repo.compare_and_set_status("b1", BatchStatus::Uploading, BatchStatus::Analyzing)
            .unwrap();
        repo.compare_and_set_status("b1", BatchStatus::Analyzing, BatchStatus::Preview)
            .unwrap();

        assert!(repo.find_active_by_hash("ws1", "h1").unwrap().is_some());
        assert!(repo.find_active_by_hash("ws2", "h1").unwrap().is_none());

        repo.mark_declined("b1", "bob", Utc::now()).unwrap();
        assert!(repo.find_active_by_hash("ws1", "h1").unwrap().is_none());

        // 同哈希可再次插入
        repo.insert(&batch("b2", "h1")).unwrap();
    }
}
