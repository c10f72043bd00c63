//! 编排主循环
//!
//! 驱动一段有界的工具增强对话：发送完整对话与工具声明 -> 并发派发模型请求的
//! 工具调用 -> 结果写回对话 -> 下一轮；临近预算上限时注入升级式告警，最终
//! 返回模型原始文本（JSON 修复交给调用方）。模型的工具使用行为不可完全控制，
//! 硬迭代上限加带内告警是对失控循环的防线。

use futures_util::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::llm::{Content, FunctionResponse, ModelClient, ModelTurn, Part, ToolMode};
use crate::tools::ToolDispatcher;

/// 会话配置：模型客户端、工具派发器与取消令牌
pub struct AgentSession<'a> {
    pub client: &'a dyn ModelClient,
    pub dispatcher: &'a ToolDispatcher,
    pub cancel_token: CancellationToken,
}

impl<'a> AgentSession<'a> {
    pub fn new(client: &'a dyn ModelClient, dispatcher: &'a ToolDispatcher) -> Self {
        Self {
            client,
            dispatcher,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }
}

/// 执行编排循环，返回待修复的模型原始文本。
///
/// 每轮最多一次网关调用（唯一的例外是一次性 JSON 恢复往返）；超过
/// `max_iterations` 轮仍无最终回答则返回 IterationBudgetExceeded。
pub async fn run_loop(
    session: &AgentSession<'_>,
    system: &str,
    user_prompt: &str,
    max_iterations: usize,
) -> Result<String, AgentError> {
    let declarations = session.dispatcher.declarations();
    let mut contents = vec![Content::user_text(user_prompt)];

    for i in 0..max_iterations {
        if session.cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let turn = session
            .client
            .complete(system, &contents, &ToolMode::Declared(declarations.clone()))
            .await?;

        match turn {
            ModelTurn::Text(text) => {
                if looks_like_json(&text) {
                    return Ok(text);
                }
                // 模型在「出声思考」而不是给出约定格式。一次性恢复往返：
                // 把坏文本和只许输出 JSON 的指令追加进对话，用 JSON 模式
                // 再调一次，结果直接交回（成败由调用方的修复引擎判定）。
                tracing::debug!(step = i, "non-JSON answer, one-shot recovery round trip");
                contents.push(Content::model_parts(vec![Part::Text(text)]));
                contents.push(Content::user_text(
                    "Your previous reply was not JSON. Respond again with ONLY the \
                     JSON object, no prose, no markdown fences.",
                ));
                return match session
                    .client
                    .complete(system, &contents, &ToolMode::JsonOnly)
                    .await?
                {
                    ModelTurn::Text(recovered) => Ok(recovered),
                    ModelTurn::ToolCalls(_) => Err(AgentError::EmptyResponse),
                };
            }
            ModelTurn::ToolCalls(calls) => {
                // 同一轮内的工具调用都是独立只读查询，可并发派发；
                // 全部完成后才继续下一轮
                let dispatched = calls
                    .iter()
                    .map(|c| session.dispatcher.dispatch(&c.name, c.args.clone()));
                let results = join_all(dispatched).await;

                let response_parts: Vec<Part> = calls
                    .iter()
                    .zip(results)
                    .map(|(call, result)| {
                        // 协议不允许顶层数组的工具结果，包一层对象
                        let response = if result.is_array() {
                            json!({ "result": result })
                        } else {
                            result
                        };
                        Part::FunctionResponse(FunctionResponse {
                            name: call.name.clone(),
                            response,
                        })
                    })
                    .collect();

                contents.push(Content::model_parts(
                    calls.into_iter().map(Part::FunctionCall).collect(),
                ));
                contents.push(Content::user_parts(response_parts));
            }
        }

        if let Some(warning) = budget_warning(i + 1, max_iterations) {
            contents.push(Content::user_text(warning));
        }
    }

    Err(AgentError::IterationBudgetExceeded(max_iterations))
}

/// 粗略判断文本是否像 JSON（同时含 `{` 与 `"`）
fn looks_like_json(text: &str) -> bool {
    text.contains('{') && text.contains('"')
}

/// 预算告警：到 70%（向上取整）时软性提醒剩余调用数，
/// 到 max - 2 时要求立即用现有部分结果给出最终 JSON。
fn budget_warning(next_iteration: usize, max_iterations: usize) -> Option<String> {
    let urgent_at = max_iterations.saturating_sub(2);
    let soft_at = (max_iterations * 7 + 9) / 10;
    if next_iteration >= urgent_at {
        Some(
            "URGENT: you are out of tool-call budget. Stop calling tools and output \
             the final JSON answer NOW, using whatever partial results you have."
                .to_string(),
        )
    } else if next_iteration >= soft_at {
        let remaining = max_iterations - next_iteration;
        Some(format!(
            "Note: only {} model calls remain. Start wrapping up and prepare the final \
             JSON answer.",
            remaining
        ))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FunctionCall, MockModelClient, ScriptStep};
    use crate::tools::{ToolDispatcher, ToolRegistry};

    fn empty_dispatcher() -> ToolDispatcher {
        ToolDispatcher::new(ToolRegistry::new(), 5)
    }

    #[tokio::test]
    async fn test_json_answer_returned_directly() {
        let client = MockModelClient::with_texts(vec![r#"{"meals": []}"#]);
        let dispatcher = empty_dispatcher();
        let session = AgentSession::new(&client, &dispatcher);
        let out = run_loop(&session, "sys", "plan", 5).await.unwrap();
        assert_eq!(out, r#"{"meals": []}"#);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_prose_answer_triggers_single_recovery_round_trip() {
        let client =
            MockModelClient::with_texts(vec!["Let me think about this...", r#"{"meals": []}"#]);
        let dispatcher = empty_dispatcher();
        let session = AgentSession::new(&client, &dispatcher);
        let out = run_loop(&session, "sys", "plan", 5).await.unwrap();
        assert_eq!(out, r#"{"meals": []}"#);
        assert_eq!(client.calls(), 2);
        assert_eq!(client.json_mode_calls(), 1);
    }

    #[tokio::test]
    async fn test_tool_calls_are_dispatched_and_loop_continues() {
        let client = MockModelClient::scripted(vec![
            ScriptStep::Turn(ModelTurn::ToolCalls(vec![FunctionCall {
                name: "search_recipes".into(),
                args: serde_json::json!({"query": "soup"}),
            }])),
            ScriptStep::Turn(ModelTurn::Text(r#"{"meals": [1]}"#.into())),
        ]);
        let dispatcher = empty_dispatcher();
        let session = AgentSession::new(&client, &dispatcher);
        let out = run_loop(&session, "sys", "plan", 5).await.unwrap();
        assert_eq!(out, r#"{"meals": [1]}"#);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        // 模型每轮都要求调工具，永不收敛
        let steps: Vec<ScriptStep> = (0..10)
            .map(|_| {
                ScriptStep::Turn(ModelTurn::ToolCalls(vec![FunctionCall {
                    name: "search_recipes".into(),
                    args: serde_json::json!({}),
                }]))
            })
            .collect();
        let client = MockModelClient::scripted(steps);
        let dispatcher = empty_dispatcher();
        let session = AgentSession::new(&client, &dispatcher);
        let err = run_loop(&session, "sys", "plan", 4).await.unwrap_err();
        assert!(matches!(err, AgentError::IterationBudgetExceeded(4)));
        // 最多 max_iterations 次网关调用
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn test_cancellation_checked_between_iterations() {
        let client = MockModelClient::with_texts(vec![r#"{"meals": []}"#]);
        let dispatcher = empty_dispatcher();
        let token = CancellationToken::new();
        token.cancel();
        let session = AgentSession::new(&client, &dispatcher).with_cancel_token(token);
        let err = run_loop(&session, "sys", "plan", 5).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_budget_warning_thresholds() {
        // max = 10：第 7 轮起软性提醒，第 8 轮起紧急告警
        assert!(budget_warning(6, 10).is_none());
        assert!(budget_warning(7, 10).unwrap().contains("3 model calls"));
        assert!(budget_warning(8, 10).unwrap().contains("URGENT"));
        // 小预算直接进入紧急告警
        assert!(budget_warning(1, 3).unwrap().contains("URGENT"));
    }
}
