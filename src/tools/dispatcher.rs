//! 工具派发器
//!
//! dispatch(name, args) 在超时内执行注册的工具；未知工具、参数错误、执行失败
//! 或超时都转为 {"error": ...} 结构化载荷而非异常——让模型知道工具失败了并
//! 自行调整，而不是让整个循环崩掉。每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::tools::ToolRegistry;

/// 工具派发器：对每次调用施加超时，失败统一降级为错误载荷
pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；任何失败都返回 {"error": ...} 载荷，绝不向调用方抛错
    pub async fn dispatch(&self, tool_name: &str, args: Value) -> Value {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match self.registry.get(tool_name) {
            Some(tool) => match timeout(self.timeout, tool.execute(args)).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(format!("tool '{}' failed: {}", tool_name, e)),
                Err(_) => Err(format!("tool '{}' timed out", tool_name)),
            },
            None => Err(format!(
                "unknown tool '{}', available: {:?}",
                tool_name,
                self.registry.tool_names()
            )),
        };

        let (ok, outcome) = match &result {
            Ok(_) => (true, "ok"),
            Err(e) => (false, e.as_str()),
        };
        let audit = json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": if ok { "ok" } else { outcome },
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(value) => value,
            Err(e) => json!({ "error": e }),
        }
    }

    /// 网关用的工具声明列表
    pub fn declarations(&self) -> Vec<crate::llm::FunctionDeclaration> {
        self.registry.declarations()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::Tool;
    use async_trait::async_trait;

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: Value) -> Result<Value, String> {
            Err("boom".to_string())
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_returns_error_payload() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::new(), 5);
        let out = dispatcher.dispatch("nope", json!({})).await;
        assert!(out["error"].as_str().unwrap().contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_tool_failure_returns_error_payload() {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool);
        let dispatcher = ToolDispatcher::new(registry, 5);
        let out = dispatcher.dispatch("broken", json!({})).await;
        assert!(out["error"].as_str().unwrap().contains("boom"));
    }
}
