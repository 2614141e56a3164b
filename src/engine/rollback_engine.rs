// ==========================================
// 车队排班导入系统 - 回滚引擎
// ==========================================
// 职责: 按变更集逆序撤销批次
// 规则: create → 按 ID 删除（已不存在视为已撤销）
//       update / archive → 用 before 快照整行覆写（时间戳一并还原）
// 红线: 变更集不删除；单实体失败记入 error_log，继续后续实体
// ==========================================

use crate::domain::import_batch::{ImportBatch, ImportChangeSet, RowFailure};
use crate::domain::types::ChangeAction;
use crate::repository::entity_repo::EntityRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// 回滚结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackReport {
    pub deleted: usize,
    pub restored: usize,
    /// 回滚时实体已不存在的 create 记录（计入已撤销）
    pub already_absent: usize,
    pub failures: Vec<RowFailure>,
}

impl RollbackReport {
    pub fn reverted(&self) -> usize {
        self.deleted + self.restored + self.already_absent
    }
}

enum RevertOutcome {
    Deleted,
    AlreadyAbsent,
    Restored,
}

// ==========================================
// RollbackEngine
// ==========================================
pub struct RollbackEngine<'a> {
    entities: &'a dyn EntityRepository,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(entities: &'a dyn EntityRepository) -> Self {
        Self { entities }
    }

    /// 撤销批次全部变更集
    ///
    /// # 参数
    /// - change_sets: 按创建顺序排列（本函数逆序处理）
    #[instrument(skip(self, conn, batch, change_sets), fields(
        batch_id = %batch.batch_id,
        change_sets = change_sets.len()
    ))]
    pub fn rollback(
        &self,
        conn: &Connection,
        batch: &ImportBatch,
        change_sets: &[ImportChangeSet],
    ) -> RollbackReport {
        let mut report = RollbackReport::default();

        for change_set in change_sets.iter().rev() {
            match self.revert(conn, batch, change_set) {
                Ok(RevertOutcome::Deleted) => report.deleted += 1,
                Ok(RevertOutcome::Restored) => report.restored += 1,
                Ok(RevertOutcome::AlreadyAbsent) => {
                    debug!(entity_id = %change_set.entity_id, "新建实体已不存在");
                    report.already_absent += 1;
                }
                Err(e) => {
                    warn!(
                        entity_id = %change_set.entity_id,
                        action = %change_set.action,
                        error = %e,
                        "实体回滚失败"
                    );
                    report.failures.push(RowFailure {
                        phase: "rollback".to_string(),
                        row_number: change_set.row_number,
                        entity_id: Some(change_set.entity_id.clone()),
                        natural_key: Some(change_set.after.natural_key().to_string()),
                        message: e.to_string(),
                        at: Utc::now(),
                    });
                }
            }
        }

        info!(
            deleted = report.deleted,
            restored = report.restored,
            already_absent = report.already_absent,
            failures = report.failures.len(),
            "批次回滚完成"
        );
        report
    }

    fn revert(
        &self,
        conn: &Connection,
        batch: &ImportBatch,
        change_set: &ImportChangeSet,
    ) -> RepositoryResult<RevertOutcome> {
        let tx = conn.unchecked_transaction()?;

        let outcome = match change_set.action {
            ChangeAction::Create => {
                if self
                    .entities
                    .delete(&tx, &batch.workspace_id, &change_set.entity_id)?
                {
                    RevertOutcome::Deleted
                } else {
                    RevertOutcome::AlreadyAbsent
                }
            }
            ChangeAction::Update | ChangeAction::Archive => {
                let before = change_set.before.as_ref().ok_or_else(|| {
                    RepositoryError::InternalError(format!(
                        "变更集 {} 缺少 before 快照",
                        change_set.change_set_id
                    ))
                })?;
                match self.entities.update(&tx, before) {
                    Ok(()) => {}
                    // 被外部删除的实体按快照重建
                    Err(RepositoryError::NotFound { .. }) => self.entities.insert(&tx, before)?,
                    Err(e) => return Err(e),
                }
                RevertOutcome::Restored
            }
        };

        tx.commit()?;
        Ok(outcome)
    }
}
