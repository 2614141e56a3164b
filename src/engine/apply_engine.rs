// ==========================================
// 车队排班导入系统 - 应用引擎
// ==========================================
// 职责: 按差异快照逐条落库，每条实体变更 + 变更集同一事务
// 红线: 行级失败只记入 error_log，绝不中断整批
// 红线: 只信任 PREVIEW 时冻结的差异快照，不重新分类
// 恢复: 已有变更集的实体视为已应用（崩溃后重新 accept 安全）
// ==========================================

use crate::domain::diff::{DiffRecord, DiffSummary};
use crate::domain::entity::EntitySnapshot;
use crate::domain::import_batch::{ImportBatch, ImportChangeSet, RowFailure};
use crate::domain::types::ChangeAction;
use crate::repository::change_set_repo::ChangeSetRepository;
use crate::repository::entity_repo::EntityRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 应用结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub archived: usize,
    /// 恢复路径上跳过的已应用记录
    pub already_applied: usize,
    pub failures: Vec<RowFailure>,
}

impl ApplyReport {
    pub fn applied(&self) -> usize {
        self.created + self.updated + self.archived
    }
}

enum RecordOutcome {
    Applied(ChangeAction),
    AlreadyApplied,
}

// ==========================================
// ApplyEngine
// ==========================================
pub struct ApplyEngine<'a> {
    entities: &'a dyn EntityRepository,
}

impl<'a> ApplyEngine<'a> {
    pub fn new(entities: &'a dyn EntityRepository) -> Self {
        Self { entities }
    }

    /// 应用批次差异
    ///
    /// # 参数
    /// - conn: 调用方持有的连接（调用方同时持有作用域锁）
    /// - batch: APPLYING 状态的批次
    /// - diff: 批次冻结的差异快照
    #[instrument(skip(self, conn, batch, diff), fields(
        batch_id = %batch.batch_id,
        pending = diff.pending_mutations()
    ))]
    pub fn apply(&self, conn: &Connection, batch: &ImportBatch, diff: &DiffSummary) -> ApplyReport {
        let mut report = ApplyReport::default();

        for record in &diff.records {
            let Some(action) = record.action.change_action() else {
                continue; // skip / error 不落库
            };

            let now = Utc::now();
            match self.apply_record(conn, batch, record, action, now) {
                Ok(RecordOutcome::Applied(ChangeAction::Create)) => report.created += 1,
                Ok(RecordOutcome::Applied(ChangeAction::Update)) => report.updated += 1,
                Ok(RecordOutcome::Applied(ChangeAction::Archive)) => report.archived += 1,
                Ok(RecordOutcome::AlreadyApplied) => {
                    debug!(row = ?record.row_number, key = ?record.natural_key, "已存在变更集，跳过");
                    report.already_applied += 1;
                }
                Err(e) => {
                    warn!(
                        row = ?record.row_number,
                        key = ?record.natural_key,
                        error = %e,
                        "行级应用失败"
                    );
                    report.failures.push(RowFailure {
                        phase: "apply".to_string(),
                        row_number: record.row_number,
                        entity_id: record.entity_id.clone(),
                        natural_key: record.natural_key.clone(),
                        message: e.to_string(),
                        at: now,
                    });
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            archived = report.archived,
            already_applied = report.already_applied,
            failures = report.failures.len(),
            "批次应用完成"
        );
        report
    }

    fn apply_record(
        &self,
        conn: &Connection,
        batch: &ImportBatch,
        record: &DiffRecord,
        action: ChangeAction,
        now: DateTime<Utc>,
    ) -> RepositoryResult<RecordOutcome> {
        let tx = conn.unchecked_transaction()?;

        let (before, after) = match action {
            ChangeAction::Create => match self.prepare_create(&tx, batch, record, now)? {
                Some(entity) => {
                    self.entities.insert(&tx, &entity)?;
                    (None, entity)
                }
                None => return Ok(RecordOutcome::AlreadyApplied),
            },
            ChangeAction::Update | ChangeAction::Archive => {
                let entity_id = record.entity_id.as_deref().ok_or_else(|| {
                    RepositoryError::InternalError("差异记录缺少 entity_id".to_string())
                })?;

                if ChangeSetRepository::find_for_entity_tx(&tx, &batch.batch_id, batch.entity_type(), entity_id)?
                    .is_some()
                {
                    return Ok(RecordOutcome::AlreadyApplied);
                }

                // before 取应用时刻的实体状态
                let current = self
                    .entities
                    .find_by_id(&tx, &batch.workspace_id, entity_id)?
                    .ok_or_else(|| RepositoryError::NotFound {
                        entity: batch.entity_type().to_string(),
                        id: entity_id.to_string(),
                    })?;

                let mut next = current.clone();
                if action == ChangeAction::Archive {
                    next.archive(now).map_err(|message| field_error("archived", message))?;
                } else {
                    for change in &record.changes {
                        next.set_field(&change.field, &change.after)
                            .map_err(|message| field_error(&change.field, message))?;
                    }
                    next.touch(now);
                }
                next.validate()
                    .map_err(|message| field_error("entity", message))?;

                self.entities.update(&tx, &next)?;
                (Some(current), next)
            }
        };

        let change_set = ImportChangeSet {
            change_set_id: Uuid::new_v4().to_string(),
            batch_id: batch.batch_id.clone(),
            entity_type: batch.entity_type(),
            entity_id: after.id().to_string(),
            action,
            row_number: record.row_number,
            before,
            after,
            created_at: now,
        };
        ChangeSetRepository::insert_tx(&tx, &change_set)?;

        tx.commit()?;
        Ok(RecordOutcome::Applied(action))
    }

    /// 构造待新建实体；None 表示该行已由本批次先前的应用创建
    fn prepare_create(
        &self,
        conn: &Connection,
        batch: &ImportBatch,
        record: &DiffRecord,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Option<EntitySnapshot>> {
        let key = record.natural_key.as_deref().ok_or_else(|| {
            RepositoryError::InternalError("新建记录缺少自然键".to_string())
        })?;

        if let Some(existing) = self
            .entities
            .find_by_natural_key(conn, &batch.workspace_id, key)?
        {
            let ours = ChangeSetRepository::find_for_entity_tx(
                conn,
                &batch.batch_id,
                batch.entity_type(),
                existing.id(),
            )?;
            if ours.is_some() {
                return Ok(None);
            }
            return Err(RepositoryError::UniqueConstraintViolation(format!(
                "自然键 {} 已存在（预览之后被创建）",
                key
            )));
        }

        let entity = EntitySnapshot::build(
            batch.entity_type(),
            Uuid::new_v4().to_string(),
            batch.workspace_id.clone(),
            &record.values,
            now,
        )
        .map_err(|message| field_error("values", message))?;
        entity
            .validate()
            .map_err(|message| field_error("entity", message))?;

        Ok(Some(entity))
    }
}

fn field_error(field: &str, message: String) -> RepositoryError {
    RepositoryError::FieldValueError {
        field: field.to_string(),
        message,
    }
}
