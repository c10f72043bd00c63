//! 任务生命周期层
//!
//! Job 数据模型、可注入的存储抽象、按任务种类分表的注册中心与客户端轮询。

pub mod job;
pub mod poll;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub use job::{Job, JobId, JobKind, JobStatus, Phase, ProgressSnapshot};
pub use poll::{poll_until_terminal, PollOutcome};
pub use store::{InMemoryJobStore, JobStore};

/// 按任务种类分表的注册中心：每类一张独立任务表，语义相同
pub struct JobRegistry {
    stores: HashMap<JobKind, Arc<dyn JobStore>>,
}

impl JobRegistry {
    /// 为每个任务种类建一张内存表，使用同一过期窗口
    pub fn in_memory(expiry: Duration) -> Self {
        let stores = JobKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    Arc::new(InMemoryJobStore::new(expiry)) as Arc<dyn JobStore>,
                )
            })
            .collect();
        Self { stores }
    }

    pub fn store(&self, kind: JobKind) -> Arc<dyn JobStore> {
        // JobKind::ALL 建表，查不到属于构造错误
        Arc::clone(&self.stores[&kind])
    }

    /// 创建任务；顺带对所有表做一次机会式过期清理
    pub async fn create(&self, kind: JobKind) -> Job {
        for store in self.stores.values() {
            store.sweep_expired().await;
        }
        self.store(kind).create().await
    }
}
