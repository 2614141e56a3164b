// ==========================================
// 车队排班导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入服务所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::ImportType;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 上传限额与默认模板
// 实现者: ConfigManager（从 config_kv 表读取，工作区 → global → 默认值）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 单文件大小上限（字节）
    ///
    /// # 默认值
    /// - 10485760（10 MiB）
    async fn get_max_file_size_bytes(&self, workspace_id: &str) -> RepositoryResult<u64>;

    /// 单批次数据行上限
    ///
    /// # 默认值
    /// - 5000
    async fn get_max_rows(&self, workspace_id: &str) -> RepositoryResult<usize>;

    /// 上传未指定模板时使用的默认模板
    ///
    /// # 返回
    /// - None: 未配置（仅显式映射 + 同名直通）
    async fn get_default_template(
        &self,
        workspace_id: &str,
        import_type: ImportType,
    ) -> RepositoryResult<Option<String>>;
}
