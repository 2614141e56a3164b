// ==========================================
// 车队排班导入系统 - 引擎层
// ==========================================
// 职责: 差异分类 / 应用 / 回滚 / 作用域互斥
// 红线: DiffEngine 为纯函数；Apply / Rollback 行级失败不中断整批
// ==========================================

pub mod apply_engine;
pub mod diff_engine;
pub mod rollback_engine;
pub mod scope_lock;

// 重导出核心引擎
pub use apply_engine::{ApplyEngine, ApplyReport};
pub use diff_engine::{ArchivePolicy, DiffEngine};
pub use rollback_engine::{RollbackEngine, RollbackReport};
pub use scope_lock::{ScopeGuard, ScopeLocks};
