// ==========================================
// 车队排班导入系统 - 差异摘要模型
// ==========================================
// 职责: DiffEngine 输出（持久化为 diff_summary_json）
// 红线: 批次离开 PREVIEW 后不可变，Apply 只信任此快照
// ==========================================

use crate::domain::entity::{EntitySnapshot, FieldValue};
use crate::domain::types::DiffAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// FieldChange - 字段级差异
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub before: FieldValue,
    pub after: FieldValue,
}

// ==========================================
// DiffRecord - 单条分类结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffRecord {
    /// 源文件数据行号（1 起；归档记录为 None）
    pub row_number: Option<usize>,
    pub action: DiffAction,
    pub natural_key: Option<String>,
    /// 匹配到的现有实体 ID（update / skip / archive）
    pub entity_id: Option<String>,
    /// update: 字段级差异
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    /// update / archive / skip: 现有实体快照
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<EntitySnapshot>,
    /// create: 新实体字段值
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DiffRecord {
    pub fn error(row_number: usize, natural_key: Option<String>, message: String) -> Self {
        Self {
            row_number: Some(row_number),
            action: DiffAction::Error,
            natural_key,
            entity_id: None,
            changes: Vec::new(),
            before: None,
            values: BTreeMap::new(),
            error: Some(message),
        }
    }
}

// ==========================================
// DiffSummary - 差异汇总
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub total_rows: usize,
    pub creates: usize,
    pub updates: usize,
    pub archives: usize,
    pub skips: usize,
    pub errors: usize,
    pub records: Vec<DiffRecord>,
}

impl DiffSummary {
    /// 由分类记录汇总计数
    pub fn from_records(total_rows: usize, records: Vec<DiffRecord>) -> Self {
        let mut summary = DiffSummary {
            total_rows,
            ..Default::default()
        };
        for record in &records {
            match record.action {
                DiffAction::Create => summary.creates += 1,
                DiffAction::Update => summary.updates += 1,
                DiffAction::Archive => summary.archives += 1,
                DiffAction::Skip => summary.skips += 1,
                DiffAction::Error => summary.errors += 1,
            }
        }
        summary.records = records;
        summary
    }

    /// 需要落库的记录数（create + update + archive）
    pub fn pending_mutations(&self) -> usize {
        self.creates + self.updates + self.archives
    }
}
