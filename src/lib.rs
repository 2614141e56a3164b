// ==========================================
// 车队排班导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 导入对账引擎（预览 → 人工确认 → 应用 → 可回滚）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 差异 / 应用 / 回滚
pub mod engine;

// 导入层 - 解析 / 映射 / 批次编排
pub mod importer;

// 配置层 - 导入限额与默认模板
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BatchStatus, ChangeAction, DiffAction, EntityType, ImportType};

// 领域实体
pub use domain::{
    Actor, ColumnMapping, DiffSummary, EntitySnapshot, ImportBatch, ImportChangeSet, Shift,
    Vehicle,
};

// 引擎
pub use engine::{ApplyEngine, DiffEngine, RollbackEngine, ScopeLocks};

// 导入服务
pub use importer::{ImportError, ImportResult, ImportService, UploadRequest};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "车队排班导入系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
