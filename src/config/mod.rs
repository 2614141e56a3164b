// ==========================================
// 车队排班导入系统 - 配置层
// ==========================================
// 职责: 导入限额 / 默认模板，支持工作区覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ConfigScope};
pub use import_config_trait::ImportConfigReader;
