// ==========================================
// 车队排班导入系统 - 导入批次 / 变更集领域模型
// ==========================================
// 对齐: import_batch / import_change_set 表
// 红线: 批次不物理删除；变更集只增不删（永久审计轨迹）
// ==========================================

use crate::domain::diff::DiffSummary;
use crate::domain::entity::EntitySnapshot;
use crate::domain::types::{BatchStatus, ChangeAction, EntityType, ImportType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ColumnMapping - 列映射（mapping_json）
// ==========================================
// PREVIEW 状态下可修改
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    /// 使用的模板名（None = 仅显式映射 + 同名直通）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// 源表头 → 标准字段（空字符串表示忽略该列）
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
}

// ==========================================
// PreviewInfo - 解析预览（preview_json）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInfo {
    pub format: Option<String>,
    pub headers: Vec<String>,
    pub row_count: usize,
    /// 致命解析错误（非空即 FAILED）
    #[serde(default)]
    pub errors: Vec<String>,
    /// 解析阶段非致命告警（跳过的记录等）
    #[serde(default)]
    pub warnings: Vec<String>,
    /// 映射阶段告警（未识别列、重复目标），重映射时整体替换
    #[serde(default)]
    pub mapping_warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

// ==========================================
// RowFailure - 应用/回滚阶段的行级失败（error_log_json）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    /// apply / rollback
    pub phase: String,
    pub row_number: Option<usize>,
    pub entity_id: Option<String>,
    pub natural_key: Option<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

// ==========================================
// ImportBatch - 导入批次
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    pub batch_id: String,
    pub workspace_id: String,
    pub status: BatchStatus,
    pub import_type: ImportType,
    pub file_name: String,
    pub file_size_bytes: i64,
    /// 原始字节 SHA-256（幂等校验）
    pub file_hash: String,
    pub mapping: ColumnMapping,
    pub preview: PreviewInfo,
    pub diff_summary: Option<DiffSummary>,
    pub error_log: Vec<RowFailure>,
    pub created_by: String,
    pub decided_by: Option<String>,
    pub rolled_back_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

impl ImportBatch {
    pub fn entity_type(&self) -> EntityType {
        self.import_type.entity_type()
    }
}

// ==========================================
// ImportChangeSet - 变更集
// ==========================================
// 约束: (batch_id, entity_type, entity_id) 唯一
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportChangeSet {
    pub change_set_id: String,
    pub batch_id: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: ChangeAction,
    pub row_number: Option<usize>,
    /// create 为 None
    pub before: Option<EntitySnapshot>,
    pub after: EntitySnapshot,
    pub created_at: DateTime<Utc>,
}
