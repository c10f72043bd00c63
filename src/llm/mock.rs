//! Mock 模型客户端（用于测试，无需 API）
//!
//! 按脚本顺序吐出预设轮次，并记录每次调用的工具模式，便于断言
//! 迭代预算与「JSON 恢复往返」只发生一次等行为。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::types::{Content, ModelTurn, ToolMode};
use crate::llm::ModelClient;

/// 脚本条目：一轮产出或一次失败
pub enum ScriptStep {
    Turn(ModelTurn),
    /// 模拟网关失败（重试后仍失败的最终结果）
    GatewayFailure(String),
}

/// Mock 客户端：脚本驱动，记录调用次数与每次是否带工具
#[derive(Default)]
pub struct MockModelClient {
    script: Mutex<VecDeque<ScriptStep>>,
    calls: AtomicUsize,
    json_mode_calls: AtomicUsize,
}

impl MockModelClient {
    pub fn scripted(steps: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            json_mode_calls: AtomicUsize::new(0),
        }
    }

    /// 便捷构造：每轮都是纯文本
    pub fn with_texts(texts: Vec<&str>) -> Self {
        Self::scripted(
            texts
                .into_iter()
                .map(|t| ScriptStep::Turn(ModelTurn::Text(t.to_string())))
                .collect(),
        )
    }

    /// 总调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 其中 JSON 输出模式（无工具）的调用次数
    pub fn json_mode_calls(&self) -> usize {
        self.json_mode_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(
        &self,
        _system: &str,
        _contents: &[Content],
        mode: &ToolMode,
    ) -> Result<ModelTurn, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if matches!(mode, ToolMode::JsonOnly) {
            self.json_mode_calls.fetch_add(1, Ordering::SeqCst);
        }

        let step = self
            .script
            .lock()
            .map_err(|_| AgentError::Gateway("mock script poisoned".to_string()))?
            .pop_front();

        match step {
            Some(ScriptStep::Turn(turn)) => Ok(turn),
            Some(ScriptStep::GatewayFailure(reason)) => Err(AgentError::Gateway(reason)),
            None => Err(AgentError::EmptyResponse),
        }
    }
}
