// ==========================================
// 车队排班导入系统 - 导入层
// ==========================================
// 职责: 文件解析 / 列映射 / 文件指纹 / 批次生命周期编排
// 支持: CSV, Excel/ODS, JSON, 分隔文本
// ==========================================

// 模块声明
pub mod column_mapper;
pub mod error;
pub mod file_hash;
pub mod file_parser;
pub mod import_service;

// 重导出核心类型
pub use column_mapper::{find_template, templates, ColumnMapper, MappedRow, MappingTemplate};
pub use error::{ImportError, ImportResult};
pub use file_hash::sha256_hex;
pub use file_parser::{
    CsvParser, DelimitedTextParser, ExcelParser, FileFormat, FileParser, JsonParser, ParsedFile,
    RawRow, UniversalFileParser, UploadedFile,
};
pub use import_service::{AcceptOutcome, ImportService, RollbackOutcome, UploadRequest};
