// ==========================================
// 车队排班导入系统 - 作用域锁
// ==========================================
// 约束: 同一 (工作区, 实体类型) 同时只允许一个 Apply / Rollback 过程
// 说明: 锁在整个过程期间持有，不同作用域互不阻塞
// ==========================================

use crate::domain::types::EntityType;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type ScopeKey = (String, EntityType);

/// 作用域锁持有凭证（drop 即释放）
pub type ScopeGuard = OwnedMutexGuard<()>;

#[derive(Default, Clone)]
pub struct ScopeLocks {
    scopes: Arc<Mutex<HashMap<ScopeKey, Arc<Mutex<()>>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取作用域锁（等待前一个持有者释放）
    pub async fn acquire(&self, workspace_id: &str, entity_type: EntityType) -> ScopeGuard {
        let scope = {
            let mut scopes = self.scopes.lock().await;
            scopes
                .entry((workspace_id.to_string(), entity_type))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        debug!(workspace_id, entity_type = %entity_type, "等待作用域锁");
        scope.lock_owned().await
    }

    /// 非阻塞尝试获取
    pub async fn try_acquire(&self, workspace_id: &str, entity_type: EntityType) -> Option<ScopeGuard> {
        let scope = {
            let mut scopes = self.scopes.lock().await;
            scopes
                .entry((workspace_id.to_string(), entity_type))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        scope.try_lock_owned().ok()
    }
}
