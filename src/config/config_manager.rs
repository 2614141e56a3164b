// ==========================================
// 车队排班导入系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 查找顺序: 工作区 scope → global → 编译期默认值
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::types::ImportType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// 配置键
pub mod config_keys {
    pub const MAX_FILE_SIZE_BYTES: &str = "import.max_file_size_bytes";
    pub const MAX_ROWS: &str = "import.max_rows";
    /// 前缀，后接导入类型（如 import.default_template/FLEET）
    pub const DEFAULT_TEMPLATE_PREFIX: &str = "import.default_template/";

    pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
    pub const DEFAULT_MAX_ROWS: usize = 5_000;
}

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Workspace(String),
}

impl ConfigScope {
    pub fn scope_id(&self) -> &str {
        match self {
            ConfigScope::Global => "global",
            ConfigScope::Workspace(id) => id,
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取指定作用域的配置值
    pub fn get_config_value(&self, scope: &ConfigScope, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![scope.scope_id(), key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 工作区优先，回退 global
    pub fn get_effective_value(&self, workspace_id: &str, key: &str) -> RepositoryResult<Option<String>> {
        if let Some(v) = self.get_config_value(&ConfigScope::Workspace(workspace_id.to_string()), key)? {
            return Ok(Some(v));
        }
        self.get_config_value(&ConfigScope::Global, key)
    }

    /// 写入配置（UPSERT）
    pub fn set_config_value(&self, scope: &ConfigScope, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 删除配置（恢复回退）
    pub fn remove_config_value(&self, scope: &ConfigScope, key: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "DELETE FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope.scope_id(), key],
        )?;
        Ok(rows > 0)
    }

    /// 作用域内全部配置
    pub fn list_scope(&self, scope: &ConfigScope) -> RepositoryResult<BTreeMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![scope.scope_id()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(rows)
    }

    fn get_parsed_or_default<T>(&self, workspace_id: &str, key: &str, default: T) -> RepositoryResult<T>
    where
        T: std::str::FromStr + Copy,
    {
        let Some(raw) = self.get_effective_value(workspace_id, key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置值格式错误，使用默认值");
                Ok(default)
            }
        }
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_max_file_size_bytes(&self, workspace_id: &str) -> RepositoryResult<u64> {
        self.get_parsed_or_default(
            workspace_id,
            config_keys::MAX_FILE_SIZE_BYTES,
            config_keys::DEFAULT_MAX_FILE_SIZE_BYTES,
        )
    }

    async fn get_max_rows(&self, workspace_id: &str) -> RepositoryResult<usize> {
        self.get_parsed_or_default(workspace_id, config_keys::MAX_ROWS, config_keys::DEFAULT_MAX_ROWS)
    }

    async fn get_default_template(
        &self,
        workspace_id: &str,
        import_type: ImportType,
    ) -> RepositoryResult<Option<String>> {
        let key = format!("{}{}", config_keys::DEFAULT_TEMPLATE_PREFIX, import_type.to_db_str());
        Ok(self
            .get_effective_value(workspace_id, &key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}
