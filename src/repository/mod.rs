// ==========================================
// 车队排班导入系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod audit_log_repo;
pub mod change_set_repo;
pub mod entity_repo;
pub mod error;
pub mod import_batch_repo;

// 重导出核心仓储
pub use audit_log_repo::{AuditSink, SqliteAuditSink};
pub use change_set_repo::ChangeSetRepository;
pub use entity_repo::{repository_for, EntityRepository, ShiftRepository, VehicleRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use import_batch_repo::{AnalysisRecord, ImportBatchRepository};
