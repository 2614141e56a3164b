// ==========================================
// 车队排班导入系统 - 导入模块错误类型
// ==========================================
// 分类: 解析错误 / 状态转换错误 / 重复导入错误 / 持久化错误
// 说明: 行级校验错误不走此类型，记入差异记录或 error_log
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::BatchStatus;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件格式不支持: {0}（支持 csv/xlsx/xls/ods/json/txt/tsv）")]
    UnsupportedFormat(String),

    #[error("文件解析失败: {0}")]
    ParseError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 映射错误 =====
    #[error("映射模板不存在: {name}（导入类型 {import_type}）")]
    UnknownTemplate { name: String, import_type: String },

    // ===== 批次状态错误 =====
    #[error("批次不存在: {0}")]
    BatchNotFound(String),

    #[error("批次状态不允许该操作: batch_id={batch_id}, 当前状态={from}, 目标状态={to}")]
    InvalidStateTransition {
        batch_id: String,
        from: BatchStatus,
        to: BatchStatus,
    },

    #[error("重复导入: 相同文件已存在批次 {existing_batch_id}（状态 {status}）")]
    DuplicateImport {
        existing_batch_id: String,
        status: BatchStatus,
    },

    #[error("批次数据损坏 (batch_id={batch_id}): {message}")]
    CorruptBatch { batch_id: String, message: String },

    // ===== 数据库错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
