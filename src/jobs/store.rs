//! 任务存储
//!
//! 显式可注入的存储抽象（create/get/update/delete/sweep），取代进程级全局表，
//! 生命周期与并发约束可单独测试。每个任务只有一个管线执行方在写；客户端轮询
//! 线程并发读。任务被客户端删除后，仍在执行的管线写入一律静默无操作。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::jobs::job::{Job, JobId, JobStatus, ProgressSnapshot};

/// 任务存储抽象
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 创建 pending 任务
    async fn create(&self) -> Job;

    /// pending -> running
    async fn start(&self, id: &str);

    /// 仅 running 时有效；整体覆盖进度快照
    async fn update_progress(&self, id: &str, snapshot: ProgressSnapshot);

    /// running -> completed；写入结果与终态 100% 快照
    async fn complete(&self, id: &str, result: Value);

    /// running -> failed；写入失败原因
    async fn fail(&self, id: &str, error: String);

    /// 按 id 查询；过期任务视同不存在
    async fn get(&self, id: &str) -> Option<Job>;

    /// 全量列出未过期任务（调试用）
    async fn list(&self) -> Vec<Job>;

    /// 幂等删除；存在并删除了返回 true
    async fn delete(&self, id: &str) -> bool;

    /// 清理超过过期窗口的任务（不论状态），返回清理条数
    async fn sweep_expired(&self) -> usize;
}

/// 内存版任务存储
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    expiry: Duration,
}

impl InMemoryJobStore {
    pub fn new(expiry: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            expiry,
        }
    }

    /// 创建时刻起超过过期窗口即过期，不论状态。读路径与清理共用同一判定，
    /// 过期任务在被 sweep 物理移除前就已从查询中消失
    fn expired(&self, job: &Job) -> bool {
        let window = chrono::Duration::from_std(self.expiry)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        Utc::now() - job.created_at >= window
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self) -> Job {
        let job = Job::new();
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        job
    }

    async fn start(&self, id: &str) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
                job.updated_at = Utc::now();
            }
        }
    }

    async fn update_progress(&self, id: &str, snapshot: ProgressSnapshot) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status == JobStatus::Running {
                job.progress = Some(snapshot);
                job.updated_at = Utc::now();
            }
        }
    }

    async fn complete(&self, id: &str, result: Value) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Completed;
                job.result = Some(result);
                job.progress = Some(ProgressSnapshot::complete());
                job.updated_at = Utc::now();
            }
        }
    }

    async fn fail(&self, id: &str, error: String) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(id) {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Failed;
                job.error = Some(error);
                job.updated_at = Utc::now();
            }
        }
    }

    async fn get(&self, id: &str) -> Option<Job> {
        self.jobs
            .read()
            .await
            .get(id)
            .filter(|job| !self.expired(job))
            .cloned()
    }

    async fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| !self.expired(job))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    async fn delete(&self, id: &str) -> bool {
        self.jobs.write().await.remove(id).is_some()
    }

    async fn sweep_expired(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let expired: Vec<JobId> = jobs
            .iter()
            .filter(|(_, job)| self.expired(job))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "swept expired jobs");
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> InMemoryJobStore {
        InMemoryJobStore::new(Duration::from_secs(30 * 60))
    }

    #[tokio::test]
    async fn test_job_lifecycle_complete() {
        let store = store();
        let job = store.create().await;
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.result.is_none() && job.error.is_none());

        store.start(&job.id).await;
        assert_eq!(store.get(&job.id).await.unwrap().status, JobStatus::Running);

        store
            .update_progress(&job.id, ProgressSnapshot::new(crate::jobs::Phase::Building, 2, 5))
            .await;
        let current = store.get(&job.id).await.unwrap();
        assert_eq!(current.progress.as_ref().unwrap().current, 2);

        store.complete(&job.id, json!({"meals": []})).await;
        let done = store.get(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.result.is_some());
        assert!(done.error.is_none());
        assert_eq!(done.progress.unwrap().phase, crate::jobs::Phase::Complete);
    }

    #[tokio::test]
    async fn test_terminal_state_is_sticky() {
        let store = store();
        let job = store.create().await;
        store.start(&job.id).await;
        store.fail(&job.id, "network down".to_string()).await;

        // 终态后的写入全部无效
        store.complete(&job.id, json!({})).await;
        store
            .update_progress(&job.id, ProgressSnapshot::complete())
            .await;
        let current = store.get(&job.id).await.unwrap();
        assert_eq!(current.status, JobStatus::Failed);
        assert_eq!(current.error.as_deref(), Some("network down"));
        assert!(current.result.is_none());
    }

    #[tokio::test]
    async fn test_progress_before_start_is_noop() {
        let store = store();
        let job = store.create().await;
        store
            .update_progress(&job.id, ProgressSnapshot::new(crate::jobs::Phase::Planning, 0, 1))
            .await;
        assert!(store.get(&job.id).await.unwrap().progress.is_none());
    }

    #[tokio::test]
    async fn test_update_on_missing_job_is_silent_noop() {
        let store = store();
        store.start("ghost").await;
        store.complete("ghost", json!({})).await;
        store.fail("ghost", "x".to_string()).await;
        store
            .update_progress("ghost", ProgressSnapshot::complete())
            .await;
        assert!(store.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store();
        let job = store.create().await;
        assert!(store.delete(&job.id).await);
        assert!(!store.delete(&job.id).await);
        assert!(store.get(&job.id).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_job_is_absent_from_get_without_sweep() {
        let store = InMemoryJobStore::new(Duration::from_millis(10));
        let job = store.create().await;
        assert!(store.get(&job.id).await.is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;
        // 没有任何 sweep 介入，过窗口后的读取就已经看不到该任务
        assert!(store.get(&job.id).await.is_none());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_regardless_of_status() {
        let store = InMemoryJobStore::new(Duration::from_millis(10));
        let done = store.create().await;
        store.start(&done.id).await;
        store.complete(&done.id, json!({})).await;
        let pending = store.create().await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        let swept = store.sweep_expired().await;
        assert_eq!(swept, 2);
        assert!(store.get(&done.id).await.is_none());
        assert!(store.get(&pending.id).await.is_none());
    }
}
