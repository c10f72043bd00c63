//! 任务数据模型
//!
//! Job 表示一次长时生成请求：pending -> running -> completed | failed，
//! 终态后不再回转；result 与 error 互斥，到达终态前均为空。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 任务 ID（uuid v4，创建时分配，永不复用）
pub type JobId = String;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// 任务种类：每类各自独立的任务表，互不共享 id 空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Generation,
    GroceryPolish,
    Categorization,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::Generation,
        JobKind::GroceryPolish,
        JobKind::Categorization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Generation => "generation",
            JobKind::GroceryPolish => "grocery-polish",
            JobKind::Categorization => "categorization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generation" => Some(JobKind::Generation),
            "grocery-polish" => Some(JobKind::GroceryPolish),
            "categorization" => Some(JobKind::Categorization),
            _ => None,
        }
    }
}

/// 进度阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Building,
    Polishing,
    Merging,
    Complete,
}

/// 进度快照：每次更新整体覆盖，消费方只看到最新一份
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressSnapshot {
    pub fn new(phase: Phase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 终态 100% 快照
    pub fn complete() -> Self {
        Self::new(Phase::Complete, 1, 1)
    }
}

/// 一次长时生成任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: Option<ProgressSnapshot>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            progress: None,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}
