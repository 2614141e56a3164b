// ==========================================
// 车队排班导入系统 - 领域类型定义
// ==========================================
// 职责: 导入类型 / 实体类型 / 批次状态 / 变更动作
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 导入类型 (Import Type)
// ==========================================
// 决定: 目标实体 / 自然键 / 归档策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportType {
    Fleet,  // 车队全量同步（缺席车辆归档）
    Shifts, // 排班增量导入（只增改）
}

impl ImportType {
    /// 目标实体类型
    pub fn entity_type(&self) -> EntityType {
        match self {
            ImportType::Fleet => EntityType::Vehicle,
            ImportType::Shifts => EntityType::Shift,
        }
    }

    /// 是否全量同步（上传中缺席的实体将被归档）
    pub fn is_full_sync(&self) -> bool {
        matches!(self, ImportType::Fleet)
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ImportType::Fleet => "FLEET",
            ImportType::Shifts => "SHIFTS",
        }
    }

    /// 从字符串解析导入类型
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "FLEET" => Some(ImportType::Fleet),
            "SHIFTS" => Some(ImportType::Shifts),
            _ => None,
        }
    }
}

impl fmt::Display for ImportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 实体类型 (Entity Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Vehicle,
    Shift,
}

impl EntityType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            EntityType::Vehicle => "vehicle",
            EntityType::Shift => "shift",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "vehicle" => Some(EntityType::Vehicle),
            "shift" => Some(EntityType::Shift),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 批次状态 (Batch Status)
// ==========================================
// 状态机: UPLOADING → ANALYZING → PREVIEW | FAILED
//         PREVIEW → APPLYING → APPLIED → ROLLED_BACK
//         PREVIEW → DECLINED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Uploading,
    Analyzing,
    Preview,
    Applying,
    Applied,
    Declined,
    RolledBack,
    Failed,
}

impl BatchStatus {
    /// 状态转换是否合法
    ///
    /// PREVIEW → PREVIEW 为映射更新；APPLYING → APPLYING 为崩溃后重新 accept。
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Uploading, Analyzing)
                | (Analyzing, Preview)
                | (Analyzing, Failed)
                | (Preview, Preview)
                | (Preview, Applying)
                | (Preview, Declined)
                | (Applying, Applying)
                | (Applying, Applied)
                | (Applied, RolledBack)
        )
    }

    /// 终态（无需操作员继续处理）
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Declined | BatchStatus::RolledBack | BatchStatus::Failed
        )
    }

    /// 同一文件可再次导入的状态（与终态一致）
    pub fn allows_reimport(&self) -> bool {
        self.is_terminal()
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            BatchStatus::Uploading => "UPLOADING",
            BatchStatus::Analyzing => "ANALYZING",
            BatchStatus::Preview => "PREVIEW",
            BatchStatus::Applying => "APPLYING",
            BatchStatus::Applied => "APPLIED",
            BatchStatus::Declined => "DECLINED",
            BatchStatus::RolledBack => "ROLLED_BACK",
            BatchStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "UPLOADING" => Some(BatchStatus::Uploading),
            "ANALYZING" => Some(BatchStatus::Analyzing),
            "PREVIEW" => Some(BatchStatus::Preview),
            "APPLYING" => Some(BatchStatus::Applying),
            "APPLIED" => Some(BatchStatus::Applied),
            "DECLINED" => Some(BatchStatus::Declined),
            "ROLLED_BACK" => Some(BatchStatus::RolledBack),
            "FAILED" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 差异分类 (Diff Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffAction {
    Create,
    Update,
    Archive,
    Skip,
    Error,
}

impl DiffAction {
    /// 对应的变更动作（skip / error 不产生变更集）
    pub fn change_action(&self) -> Option<ChangeAction> {
        match self {
            DiffAction::Create => Some(ChangeAction::Create),
            DiffAction::Update => Some(ChangeAction::Update),
            DiffAction::Archive => Some(ChangeAction::Archive),
            DiffAction::Skip | DiffAction::Error => None,
        }
    }
}

// ==========================================
// 变更动作 (Change Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Archive,
}

impl ChangeAction {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Archive => "archive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "create" => Some(ChangeAction::Create),
            "update" => Some(ChangeAction::Update),
            "archive" => Some(ChangeAction::Archive),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}
