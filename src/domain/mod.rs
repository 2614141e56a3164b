// ==========================================
// 车队排班导入系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、批次与变更集模型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod audit;
pub mod diff;
pub mod entity;
pub mod import_batch;
pub mod schema;
pub mod types;

// 重导出核心类型
pub use audit::{Actor, AuditAction, AuditEvent};
pub use diff::{DiffRecord, DiffSummary, FieldChange};
pub use entity::{EntitySnapshot, ExistingByKey, FieldValue, Shift, Vehicle};
pub use import_batch::{ColumnMapping, ImportBatch, ImportChangeSet, PreviewInfo, RowFailure};
pub use schema::{schema_for, EntitySchema, FieldKind, FieldSpec};
pub use types::{BatchStatus, ChangeAction, DiffAction, EntityType, ImportType};
