// ==========================================
// 车队排班导入系统 - 审计事件与调用方身份
// ==========================================
// 红线: 上传 / 映射更新 / 应用 / 拒绝 / 回滚 必须记录
// 说明: 权限校验由外部完成，引擎只信任传入的 Actor
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

// ==========================================
// Actor - 已授权的调用方
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    pub workspace_id: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            workspace_id: workspace_id.into(),
        }
    }
}

// ==========================================
// AuditAction - 审计动作
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ImportUpload,
    ImportMappingUpdate,
    ImportAccept,
    ImportDecline,
    ImportRollback,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditAction::ImportUpload => "IMPORT_UPLOAD",
            AuditAction::ImportMappingUpdate => "IMPORT_MAPPING_UPDATE",
            AuditAction::ImportAccept => "IMPORT_ACCEPT",
            AuditAction::ImportDecline => "IMPORT_DECLINE",
            AuditAction::ImportRollback => "IMPORT_ROLLBACK",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// AuditEvent - 审计事件
// ==========================================
// 对齐: audit_log 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub workspace_id: String,
    pub batch_id: String,
    pub action: AuditAction,
    pub actor: String,
    pub at: DateTime<Utc>,
    /// 简短元数据（计数、文件名等）
    pub metadata: JsonValue,
}

impl AuditEvent {
    pub fn new(actor: &Actor, batch_id: &str, action: AuditAction, metadata: JsonValue) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            workspace_id: actor.workspace_id.clone(),
            batch_id: batch_id.to_string(),
            action,
            actor: actor.user_id.clone(),
            at: Utc::now(),
            metadata,
        }
    }
}
