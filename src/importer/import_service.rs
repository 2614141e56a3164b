// ==========================================
// 车队排班导入系统 - 导入服务
// ==========================================
// 职责: 批次生命周期编排（上传 → 分析 → 预览 → 应用/拒绝 → 回滚）
// 流程: 幂等校验 → 解析 → 映射 → 差异分类 → 持久化预览
// 红线: 状态转换先校验后执行，非法转换不产生任何副作用
// 红线: 批次只对所属工作区可见
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::audit::{Actor, AuditAction, AuditEvent};
use crate::domain::diff::DiffSummary;
use crate::domain::import_batch::{ColumnMapping, ImportBatch, ImportChangeSet, PreviewInfo};
use crate::domain::schema::schema_for;
use crate::domain::types::{BatchStatus, ImportType};
use crate::engine::{ApplyEngine, ApplyReport, DiffEngine, RollbackEngine, RollbackReport, ScopeLocks};
use crate::importer::column_mapper::{find_template, ColumnMapper};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_hash::sha256_hex;
use crate::importer::file_parser::{FileParser, RawRow, UniversalFileParser, UploadedFile};
use crate::repository::{
    repository_for, AnalysisRecord, AuditSink, ChangeSetRepository, ImportBatchRepository,
    RepositoryError, SqliteAuditSink,
};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// 请求 / 结果
// ==========================================

/// 上传请求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub import_type: ImportType,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
    pub sheet_name: Option<String>,
    pub mapping: ColumnMapping,
}

/// accept 结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOutcome {
    pub batch: ImportBatch,
    pub report: ApplyReport,
}

/// rollback 结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub batch: ImportBatch,
    pub report: RollbackReport,
}

// 分析结果（上传与重映射共用）
struct Analysis {
    diff: DiffSummary,
    mapping_warnings: Vec<String>,
}

// ==========================================
// ImportService
// ==========================================
pub struct ImportService<C>
where
    C: ImportConfigReader,
{
    conn: Arc<Mutex<Connection>>,
    batches: ImportBatchRepository,
    change_sets: ChangeSetRepository,

    // 配置读取器
    config: C,

    audit: Box<dyn AuditSink>,
    file_parser: Box<dyn FileParser>,
    scope_locks: ScopeLocks,
}

impl<C> ImportService<C>
where
    C: ImportConfigReader,
{
    /// 创建导入服务
    ///
    /// # 参数
    /// - conn: 共享连接（已完成建表）
    /// - config: 配置读取器
    /// - audit: 审计输出
    /// - file_parser: 文件解析器
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        config: C,
        audit: Box<dyn AuditSink>,
        file_parser: Box<dyn FileParser>,
    ) -> Self {
        Self {
            batches: ImportBatchRepository::new(conn.clone()),
            change_sets: ChangeSetRepository::new(conn.clone()),
            conn,
            config,
            audit,
            file_parser,
            scope_locks: ScopeLocks::new(),
        }
    }

    /// 默认组件：SQLite 审计 + 通用文件解析器
    pub fn with_defaults(conn: Arc<Mutex<Connection>>, config: C) -> Self {
        let audit = Box::new(SqliteAuditSink::new(conn.clone()));
        Self::new(conn, config, audit, Box::new(UniversalFileParser))
    }

    fn lock_conn(&self) -> ImportResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ImportError::Repository(RepositoryError::LockError(e.to_string())))
    }

    // ==========================================
    // 上传
    // ==========================================

    /// 上传文件并生成预览
    ///
    /// # 返回
    /// - Ok(batch): PREVIEW 或 FAILED（解析失败 / 超限）
    /// - Err(DuplicateImport): 同内容活动批次已存在
    #[instrument(skip(self, actor, request), fields(
        workspace_id = %actor.workspace_id,
        import_type = %request.import_type,
        file_name = %request.file_name,
        batch_id
    ))]
    pub async fn upload(&self, actor: &Actor, request: UploadRequest) -> ImportResult<ImportBatch> {
        let workspace_id = actor.workspace_id.as_str();

        // === 步骤 1: 幂等校验（先于解析） ===
        let file_hash = sha256_hex(&request.bytes);
        if let Some(existing) = self.batches.find_active_by_hash(workspace_id, &file_hash)? {
            warn!(existing_batch_id = %existing.batch_id, status = %existing.status, "重复导入被拒绝");
            return Err(ImportError::DuplicateImport {
                existing_batch_id: existing.batch_id,
                status: existing.status,
            });
        }

        // === 步骤 2: 配置与映射模板 ===
        let max_file_size = self.config.get_max_file_size_bytes(workspace_id).await?;
        let max_rows = self.config.get_max_rows(workspace_id).await?;
        let mut mapping = request.mapping;
        if mapping.template.is_none() {
            mapping.template = self
                .config
                .get_default_template(workspace_id, request.import_type)
                .await?;
        }
        if let Some(name) = &mapping.template {
            find_template(name, request.import_type)?;
        }

        // === 步骤 3: 创建批次 ===
        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());

        let batch = ImportBatch {
            batch_id: batch_id.clone(),
            workspace_id: workspace_id.to_string(),
            status: BatchStatus::Uploading,
            import_type: request.import_type,
            file_name: request.file_name.clone(),
            file_size_bytes: request.bytes.len() as i64,
            file_hash: file_hash.clone(),
            mapping: mapping.clone(),
            preview: PreviewInfo::default(),
            diff_summary: None,
            error_log: Vec::new(),
            created_by: actor.user_id.clone(),
            decided_by: None,
            rolled_back_by: None,
            created_at: Utc::now(),
            applied_at: None,
            declined_at: None,
            rolled_back_at: None,
        };

        match self.batches.insert(&batch) {
            Ok(()) => {}
            Err(RepositoryError::UniqueConstraintViolation(msg)) => {
                // 并发上传同一文件：唯一索引兜底
                return match self.batches.find_active_by_hash(workspace_id, &file_hash)? {
                    Some(existing) => Err(ImportError::DuplicateImport {
                        existing_batch_id: existing.batch_id,
                        status: existing.status,
                    }),
                    None => Err(RepositoryError::UniqueConstraintViolation(msg).into()),
                };
            }
            Err(e) => return Err(e.into()),
        }
        info!(file_size_bytes = batch.file_size_bytes, "批次已创建");

        self.emit_audit(
            actor,
            &batch_id,
            AuditAction::ImportUpload,
            json!({
                "fileName": request.file_name,
                "fileSizeBytes": batch.file_size_bytes,
                "fileHash": file_hash,
                "importType": request.import_type.to_db_str(),
            }),
        );

        if let Err(e) = self.transition(&batch_id, BatchStatus::Uploading, BatchStatus::Analyzing) {
            self.abandon_upload(&batch_id, &mapping, &PreviewInfo::default(), &e);
            return Err(e);
        }

        // === 步骤 4: 解析 ===
        let mut preview = PreviewInfo::default();
        let mut source_rows: Vec<RawRow> = Vec::new();

        if request.bytes.len() as u64 > max_file_size {
            preview.errors.push(format!(
                "文件大小 {} 字节超过上限 {} 字节",
                request.bytes.len(),
                max_file_size
            ));
        } else {
            let parsed = self.file_parser.parse(&UploadedFile {
                file_name: &request.file_name,
                mime_type: request.mime_type.as_deref(),
                bytes: &request.bytes,
                sheet_name: request.sheet_name.as_deref(),
            });
            debug!(
                rows = parsed.rows.len(),
                errors = parsed.errors.len(),
                warnings = parsed.warnings.len(),
                "文件解析完成"
            );

            preview.format = parsed.format.map(|f| f.to_string());
            preview.headers = parsed.headers;
            preview.row_count = parsed.rows.len();
            preview.errors = parsed.errors;
            preview.warnings = parsed.warnings;
            preview.sheet_name = parsed.sheet_name;
            source_rows = parsed.rows;

            if preview.errors.is_empty() && source_rows.len() > max_rows {
                preview
                    .errors
                    .push(format!("数据行数 {} 超过上限 {}", source_rows.len(), max_rows));
            }
        }

        if !preview.errors.is_empty() {
            return self.finish_failed(actor, &batch_id, &mapping, preview);
        }

        // === 步骤 5: 映射 + 差异分类 ===
        let analysis = match self.analyze(workspace_id, request.import_type, &preview.headers, &source_rows, &mapping) {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, "差异分析失败");
                preview.errors.push(format!("差异分析失败: {}", e));
                return self.finish_failed(actor, &batch_id, &mapping, preview);
            }
        };
        preview.mapping_warnings = analysis.mapping_warnings;

        let recorded = match self.batches.record_analysis(
            &batch_id,
            BatchStatus::Analyzing,
            BatchStatus::Preview,
            &AnalysisRecord {
                mapping: &mapping,
                preview: &preview,
                diff_summary: Some(&analysis.diff),
                source_rows: Some(&source_rows),
            },
        ) {
            Ok(recorded) => recorded,
            Err(e) => {
                let e = ImportError::from(e);
                self.abandon_upload(&batch_id, &mapping, &preview, &e);
                return Err(e);
            }
        };
        if !recorded {
            return Err(self.transition_error(&batch_id, BatchStatus::Preview));
        }

        info!(
            creates = analysis.diff.creates,
            updates = analysis.diff.updates,
            archives = analysis.diff.archives,
            skips = analysis.diff.skips,
            errors = analysis.diff.errors,
            "预览已生成"
        );
        self.require_batch(actor, &batch_id)
    }

    fn finish_failed(
        &self,
        actor: &Actor,
        batch_id: &str,
        mapping: &ColumnMapping,
        preview: PreviewInfo,
    ) -> ImportResult<ImportBatch> {
        warn!(errors = ?preview.errors, "批次分析失败");
        let recorded = self.batches.record_analysis(
            batch_id,
            BatchStatus::Analyzing,
            BatchStatus::Failed,
            &AnalysisRecord {
                mapping,
                preview: &preview,
                diff_summary: None,
                source_rows: None,
            },
        )?;
        if !recorded {
            return Err(self.transition_error(batch_id, BatchStatus::Failed));
        }
        self.require_batch(actor, batch_id)
    }

    /// 上传中途出错：尽力把批次落到 FAILED，释放文件指纹
    ///
    /// 自身失败只记日志，调用方返回原始错误
    fn abandon_upload(
        &self,
        batch_id: &str,
        mapping: &ColumnMapping,
        preview: &PreviewInfo,
        cause: &ImportError,
    ) {
        let mut preview = preview.clone();
        preview.errors.push(format!("批次分析中断: {}", cause));

        match self.try_mark_failed(batch_id, mapping, &preview) {
            Ok(true) => warn!(error = %cause, "批次已标记为 FAILED"),
            Ok(false) => warn!(error = %cause, "批次状态已变化，未标记 FAILED"),
            Err(e) => error!(error = %cause, mark_error = %e, "批次无法标记为 FAILED"),
        }
    }

    fn try_mark_failed(
        &self,
        batch_id: &str,
        mapping: &ColumnMapping,
        preview: &PreviewInfo,
    ) -> ImportResult<bool> {
        let Some(current) = self.batches.find_by_id(batch_id)? else {
            return Ok(false);
        };
        // UPLOADING 只能经由 ANALYZING 到达 FAILED
        if current.status == BatchStatus::Uploading {
            self.batches
                .compare_and_set_status(batch_id, BatchStatus::Uploading, BatchStatus::Analyzing)?;
        }
        Ok(self.batches.record_analysis(
            batch_id,
            BatchStatus::Analyzing,
            BatchStatus::Failed,
            &AnalysisRecord {
                mapping,
                preview,
                diff_summary: None,
                source_rows: None,
            },
        )?)
    }

    /// 映射 + 差异分类
    fn analyze(
        &self,
        workspace_id: &str,
        import_type: ImportType,
        headers: &[String],
        rows: &[RawRow],
        mapping: &ColumnMapping,
    ) -> ImportResult<Analysis> {
        let schema = schema_for(import_type);
        let outcome = ColumnMapper::new(schema).apply(headers, rows, mapping)?;

        let mut mapping_warnings = outcome.warnings;
        if !outcome.resolved.values().any(|field| field == schema.natural_key) {
            mapping_warnings.push(format!(
                "没有列映射到自然键 {}，所有行都将报错",
                schema.natural_key
            ));
        }

        let existing = {
            let conn = self.lock_conn()?;
            repository_for(import_type).load_by_natural_key(&conn, workspace_id)?
        };

        let diff = DiffEngine::for_schema(schema).classify(&outcome.rows, &existing);
        Ok(Analysis {
            diff,
            mapping_warnings,
        })
    }

    // ==========================================
    // 映射更新（PREVIEW → PREVIEW）
    // ==========================================

    #[instrument(skip(self, actor, mapping), fields(workspace_id = %actor.workspace_id, batch_id = %batch_id))]
    pub async fn update_mapping(
        &self,
        actor: &Actor,
        batch_id: &str,
        mapping: ColumnMapping,
    ) -> ImportResult<ImportBatch> {
        let batch = self.require_batch(actor, batch_id)?;
        Self::guard(&batch, BatchStatus::Preview, BatchStatus::Preview)?;

        // 与 accept 互斥：应用中的批次不能再换差异快照
        let _scope = self
            .scope_locks
            .acquire(&batch.workspace_id, batch.entity_type())
            .await;

        let batch = self.require_batch(actor, batch_id)?;
        Self::guard(&batch, BatchStatus::Preview, BatchStatus::Preview)?;

        let source_rows = self
            .batches
            .load_source_rows(batch_id)?
            .ok_or_else(|| ImportError::CorruptBatch {
                batch_id: batch_id.to_string(),
                message: "缺少解析结果，无法重新映射".to_string(),
            })?;

        let analysis = self.analyze(
            &batch.workspace_id,
            batch.import_type,
            &batch.preview.headers,
            &source_rows,
            &mapping,
        )?;

        let mut preview = batch.preview.clone();
        preview.mapping_warnings = analysis.mapping_warnings;

        let recorded = self.batches.record_analysis(
            batch_id,
            BatchStatus::Preview,
            BatchStatus::Preview,
            &AnalysisRecord {
                mapping: &mapping,
                preview: &preview,
                diff_summary: Some(&analysis.diff),
                source_rows: None,
            },
        )?;
        if !recorded {
            return Err(self.transition_error(batch_id, BatchStatus::Preview));
        }

        info!(
            creates = analysis.diff.creates,
            updates = analysis.diff.updates,
            errors = analysis.diff.errors,
            "映射已更新，预览已重算"
        );
        self.emit_audit(
            actor,
            batch_id,
            AuditAction::ImportMappingUpdate,
            json!({
                "template": mapping.template,
                "explicitColumns": mapping.columns.len(),
                "creates": analysis.diff.creates,
                "updates": analysis.diff.updates,
                "archives": analysis.diff.archives,
                "errors": analysis.diff.errors,
            }),
        );
        self.require_batch(actor, batch_id)
    }

    // ==========================================
    // 接受（PREVIEW → APPLYING → APPLIED）
    // ==========================================

    /// 接受并应用预览
    ///
    /// APPLYING 状态下再次调用视为崩溃恢复：已有变更集的记录跳过。
    #[instrument(skip(self, actor), fields(workspace_id = %actor.workspace_id, batch_id = %batch_id))]
    pub async fn accept(&self, actor: &Actor, batch_id: &str) -> ImportResult<AcceptOutcome> {
        let batch = self.require_batch(actor, batch_id)?;
        Self::guard_accept(&batch)?;

        let _scope = self
            .scope_locks
            .acquire(&batch.workspace_id, batch.entity_type())
            .await;

        // 持锁后重读，防止等待期间状态被改变
        let batch = self.require_batch(actor, batch_id)?;
        Self::guard_accept(&batch)?;

        let batch = if batch.status == BatchStatus::Preview {
            if !self.batches.begin_apply(batch_id, &actor.user_id)? {
                return Err(self.transition_error(batch_id, BatchStatus::Applying));
            }
            info!("开始应用批次");
            // 进入 APPLYING 后差异快照冻结，以此时的存储为准
            self.require_batch(actor, batch_id)?
        } else {
            info!("恢复中断的应用");
            batch
        };

        let diff = batch.diff_summary.clone().ok_or_else(|| ImportError::CorruptBatch {
            batch_id: batch_id.to_string(),
            message: "缺少差异快照".to_string(),
        })?;

        let report = {
            let conn = self.lock_conn()?;
            ApplyEngine::new(repository_for(batch.import_type)).apply(&conn, &batch, &diff)
        };

        if !self.batches.mark_applied(batch_id, Utc::now(), &report.failures)? {
            return Err(self.transition_error(batch_id, BatchStatus::Applied));
        }

        self.emit_audit(
            actor,
            batch_id,
            AuditAction::ImportAccept,
            json!({
                "created": report.created,
                "updated": report.updated,
                "archived": report.archived,
                "alreadyApplied": report.already_applied,
                "failures": report.failures.len(),
            }),
        );

        Ok(AcceptOutcome {
            batch: self.require_batch(actor, batch_id)?,
            report,
        })
    }

    fn guard_accept(batch: &ImportBatch) -> ImportResult<()> {
        match batch.status {
            BatchStatus::Preview | BatchStatus::Applying => Ok(()),
            other => Err(ImportError::InvalidStateTransition {
                batch_id: batch.batch_id.clone(),
                from: other,
                to: BatchStatus::Applying,
            }),
        }
    }

    // ==========================================
    // 拒绝（PREVIEW → DECLINED）
    // ==========================================

    #[instrument(skip(self, actor), fields(workspace_id = %actor.workspace_id, batch_id = %batch_id))]
    pub async fn decline(&self, actor: &Actor, batch_id: &str) -> ImportResult<ImportBatch> {
        let batch = self.require_batch(actor, batch_id)?;
        Self::guard(&batch, BatchStatus::Preview, BatchStatus::Declined)?;

        if !self
            .batches
            .mark_declined(batch_id, &actor.user_id, Utc::now())?
        {
            return Err(self.transition_error(batch_id, BatchStatus::Declined));
        }
        info!("批次已拒绝");

        self.emit_audit(
            actor,
            batch_id,
            AuditAction::ImportDecline,
            json!({ "fileName": batch.file_name }),
        );
        self.require_batch(actor, batch_id)
    }

    // ==========================================
    // 回滚（APPLIED → ROLLED_BACK）
    // ==========================================

    #[instrument(skip(self, actor), fields(workspace_id = %actor.workspace_id, batch_id = %batch_id))]
    pub async fn rollback(&self, actor: &Actor, batch_id: &str) -> ImportResult<RollbackOutcome> {
        let batch = self.require_batch(actor, batch_id)?;
        Self::guard(&batch, BatchStatus::Applied, BatchStatus::RolledBack)?;

        let _scope = self
            .scope_locks
            .acquire(&batch.workspace_id, batch.entity_type())
            .await;

        let batch = self.require_batch(actor, batch_id)?;
        Self::guard(&batch, BatchStatus::Applied, BatchStatus::RolledBack)?;

        let report = {
            let conn = self.lock_conn()?;
            let change_sets = ChangeSetRepository::list_by_batch_tx(&conn, batch_id)?;
            RollbackEngine::new(repository_for(batch.import_type)).rollback(&conn, &batch, &change_sets)
        };

        let mut error_log = batch.error_log.clone();
        error_log.extend(report.failures.iter().cloned());

        if !self
            .batches
            .mark_rolled_back(batch_id, &actor.user_id, Utc::now(), &error_log)?
        {
            return Err(self.transition_error(batch_id, BatchStatus::RolledBack));
        }

        self.emit_audit(
            actor,
            batch_id,
            AuditAction::ImportRollback,
            json!({
                "deleted": report.deleted,
                "restored": report.restored,
                "alreadyAbsent": report.already_absent,
                "failures": report.failures.len(),
            }),
        );

        Ok(RollbackOutcome {
            batch: self.require_batch(actor, batch_id)?,
            report,
        })
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 读取批次（仅限调用方工作区）
    pub fn get_batch(&self, actor: &Actor, batch_id: &str) -> ImportResult<ImportBatch> {
        self.require_batch(actor, batch_id)
    }

    pub fn list_batches(&self, actor: &Actor, limit: usize) -> ImportResult<Vec<ImportBatch>> {
        Ok(self.batches.list_by_workspace(&actor.workspace_id, limit)?)
    }

    pub fn list_change_sets(&self, actor: &Actor, batch_id: &str) -> ImportResult<Vec<ImportChangeSet>> {
        self.require_batch(actor, batch_id)?;
        Ok(self.change_sets.list_by_batch(batch_id)?)
    }

    // ==========================================
    // 内部工具
    // ==========================================

    fn require_batch(&self, actor: &Actor, batch_id: &str) -> ImportResult<ImportBatch> {
        match self.batches.find_by_id(batch_id)? {
            Some(batch) if batch.workspace_id == actor.workspace_id => Ok(batch),
            _ => Err(ImportError::BatchNotFound(batch_id.to_string())),
        }
    }

    /// 校验当前状态为 from 且 from → to 合法
    fn guard(batch: &ImportBatch, from: BatchStatus, to: BatchStatus) -> ImportResult<()> {
        if batch.status == from && from.can_transition_to(to) {
            Ok(())
        } else {
            Err(ImportError::InvalidStateTransition {
                batch_id: batch.batch_id.clone(),
                from: batch.status,
                to,
            })
        }
    }

    fn transition(&self, batch_id: &str, from: BatchStatus, to: BatchStatus) -> ImportResult<()> {
        if !from.can_transition_to(to) || !self.batches.compare_and_set_status(batch_id, from, to)? {
            return Err(self.transition_error(batch_id, to));
        }
        debug!(from = %from, to = %to, "批次状态转换");
        Ok(())
    }

    /// CAS 失败时按最新状态构造错误
    fn transition_error(&self, batch_id: &str, to: BatchStatus) -> ImportError {
        match self.batches.find_by_id(batch_id) {
            Ok(Some(current)) => ImportError::InvalidStateTransition {
                batch_id: batch_id.to_string(),
                from: current.status,
                to,
            },
            Ok(None) => ImportError::BatchNotFound(batch_id.to_string()),
            Err(e) => e.into(),
        }
    }

    /// 审计写入失败只告警，不影响主流程
    fn emit_audit(&self, actor: &Actor, batch_id: &str, action: AuditAction, metadata: serde_json::Value) {
        let event = AuditEvent::new(actor, batch_id, action, metadata);
        if let Err(e) = self.audit.record(&event) {
            warn!(action = %action, error = %e, "审计事件写入失败");
        }
    }
}
