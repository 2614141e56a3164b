// ==========================================
// 车队排班导入系统 - 仓储层错误类型
// ==========================================
// 说明: 引擎按行捕获此类错误写入 error_log，服务层向上传播
// 工具: thiserror 派生宏
// ==========================================

use crate::domain::types::EntityType;
use rusqlite::ErrorCode;
use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库操作失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    // ===== 数据内容错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    #[error("实体类型不匹配: 期望 {expected}，实际 {actual}")]
    EntityTypeMismatch {
        expected: EntityType,
        actual: EntityType,
    },

    #[error("快照序列化失败: {0}")]
    SerializationError(String),

    #[error("内部错误: {0}")]
    InternalError(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, msg) if failure.code == ErrorCode::ConstraintViolation => {
                let detail = msg.clone().unwrap_or_else(|| err.to_string());
                match failure.extended_code {
                    // SQLITE_CONSTRAINT_UNIQUE / SQLITE_CONSTRAINT_PRIMARYKEY
                    2067 | 1555 => RepositoryError::UniqueConstraintViolation(detail),
                    // SQLITE_CONSTRAINT_FOREIGNKEY
                    787 => RepositoryError::ForeignKeyViolation(detail),
                    _ => RepositoryError::DatabaseQueryError(detail),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "row".to_string(),
                id: "-".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::SerializationError(err.to_string())
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_constraint_violations_are_classified() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (k TEXT PRIMARY KEY);
             CREATE TABLE child (k TEXT NOT NULL REFERENCES parent (k), plate TEXT UNIQUE);
             INSERT INTO parent VALUES ('a');
             INSERT INTO child VALUES ('a', 'AB1');",
        )
        .unwrap();

        let err = conn.execute("INSERT INTO parent VALUES ('a')", []).unwrap_err();
        assert!(matches!(
            RepositoryError::from(err),
            RepositoryError::UniqueConstraintViolation(_)
        ));

        let err = conn
            .execute("INSERT INTO child VALUES ('a', 'AB1')", [])
            .unwrap_err();
        assert!(matches!(
            RepositoryError::from(err),
            RepositoryError::UniqueConstraintViolation(_)
        ));

        let err = conn
            .execute("INSERT INTO child VALUES ('missing', 'CD2')", [])
            .unwrap_err();
        assert!(matches!(
            RepositoryError::from(err),
            RepositoryError::ForeignKeyViolation(_)
        ));
    }
}
