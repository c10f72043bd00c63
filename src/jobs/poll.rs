//! 客户端轮询
//!
//! 固定间隔轮询任务直到终态；轮询数达到上限视为客户端侧超时（与服务端过期
//! 无关）。取消令牌在每次等待之间检查，取消返回独立的 Cancelled 结果而非抛错。

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::jobs::job::{Job, JobStatus};
use crate::jobs::store::JobStore;

/// 轮询结束原因
#[derive(Debug)]
pub enum PollOutcome {
    Completed(Job),
    Failed(Job),
    /// 轮询预算用尽时任务仍未到终态
    TimedOut,
    /// 任务不存在（未创建、已删除或已过期）
    NotFound,
    Cancelled,
}

/// 轮询直到终态、超时或取消
pub async fn poll_until_terminal(
    store: &dyn JobStore,
    id: &str,
    interval: Duration,
    max_polls: usize,
    cancel_token: &CancellationToken,
) -> PollOutcome {
    for _ in 0..max_polls {
        if cancel_token.is_cancelled() {
            return PollOutcome::Cancelled;
        }

        match store.get(id).await {
            None => return PollOutcome::NotFound,
            Some(job) => match job.status {
                JobStatus::Completed => return PollOutcome::Completed(job),
                JobStatus::Failed => return PollOutcome::Failed(job),
                JobStatus::Pending | JobStatus::Running => {}
            },
        }

        tokio::select! {
            _ = cancel_token.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    PollOutcome::TimedOut
}
