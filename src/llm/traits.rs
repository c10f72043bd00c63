//! 模型网关抽象
//!
//! 所有后端（HTTP / Mock）实现 ModelClient：complete 接收完整对话与工具模式，
//! 返回最终文本或一组工具调用。网关无状态，历史全部显式传入。

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::types::{Content, ModelTurn, ToolMode};

/// 模型客户端 trait：一次完成调用
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// 发送 system + 对话内容；mode 决定声明工具还是要求 JSON 输出
    async fn complete(
        &self,
        system: &str,
        contents: &[Content],
        mode: &ToolMode,
    ) -> Result<ModelTurn, AgentError>;
}
