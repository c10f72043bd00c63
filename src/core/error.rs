//! 编排管线错误类型
//!
//! 与传播策略配合：单次调用阶段（规划、替换）向上冒泡使整个任务失败；
//! 批处理阶段在单批失败时降级为兜底结果，不向上传播；合并阶段失败静默退回未合并结果。

use thiserror::Error;

use crate::recovery::RecoveryError;

/// 编排过程中可能出现的错误（网络、空响应、JSON 修复失败、预算耗尽等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 传输层失败（网关内部已重试一次后仍失败）
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// 模型响应中没有可用内容（无 candidates 或 parts 为空）
    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    /// 迭代预算耗尽仍未得到最终回答
    #[error("Iteration budget exceeded ({0} calls)")]
    IterationBudgetExceeded(usize),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}
