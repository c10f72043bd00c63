//! 购物清单润色管线
//!
//! 按批规范化条目名称与数量（批处理阶段，单批失败按原条目兜底），最后一次
//! 合并调用去重近似条目；合并失败静默退回未合并清单。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::jobs::{Phase, ProgressSnapshot};
use crate::llm::{Content, ModelClient, ModelTurn, ToolMode};
use crate::pipeline::batch::{merge_pass, process_in_batches, BatchFuture};
use crate::pipeline::send_progress;
use crate::pipeline::types::GroceryItem;
use crate::recovery::recover;

const POLISH_SYSTEM: &str = "You clean up grocery list items: normalize names to \
singular lowercase, fill in sensible quantities and units, keep the category if \
present. Answer with a JSON object {\"items\": [...]} with exactly one item per \
input item, in order, and nothing else.";

const MERGE_INSTRUCTION: &str = "Merge near-identical grocery items (same ingredient, \
compatible units) by summing quantities. Keep items separate when units are \
incompatible or the ingredients differ (e.g. red vs yellow onion). Answer with a \
JSON object {\"items\": [...]} and nothing else.";

/// 润色任务的请求参数
#[derive(Clone, Debug, Deserialize)]
pub struct GroceryPolishRequest {
    #[serde(default)]
    pub items: Vec<GroceryItem>,
}

/// 购物清单润色管线
pub struct GroceryPolishPipeline {
    client: Arc<dyn ModelClient>,
    batch_size: usize,
}

impl GroceryPolishPipeline {
    pub fn new(client: Arc<dyn ModelClient>, batch_size: usize) -> Self {
        Self { client, batch_size }
    }

    pub async fn run(
        &self,
        request: &GroceryPolishRequest,
        progress_tx: Option<&UnboundedSender<ProgressSnapshot>>,
        cancel_token: CancellationToken,
    ) -> Result<Value, AgentError> {
        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let total = request.items.len();
        let polished = process_in_batches(
            &request.items,
            self.batch_size,
            |chunk| self.polish_batch(chunk),
            |item| item.clone(),
            |done, _| {
                send_progress(
                    progress_tx,
                    ProgressSnapshot::new(Phase::Polishing, done, total),
                );
            },
        )
        .await?;

        send_progress(
            progress_tx,
            ProgressSnapshot::new(Phase::Merging, 0, 1).with_message("merging duplicates"),
        );
        let merged = merge_pass(
            self.client.as_ref(),
            POLISH_SYSTEM,
            MERGE_INSTRUCTION,
            "items",
            polished,
        )
        .await;
        send_progress(progress_tx, ProgressSnapshot::new(Phase::Merging, 1, 1));

        Ok(json!({ "items": merged }))
    }

    fn polish_batch<'a>(&'a self, chunk: &'a [GroceryItem]) -> BatchFuture<'a, GroceryItem> {
        Box::pin(async move {
            let items = serde_json::to_string(chunk)
                .map_err(|e| AgentError::Gateway(format!("serialize items: {}", e)))?;
            let prompt = format!("Polish these grocery items:\n{}", items);
            let turn = self
                .client
                .complete(
                    POLISH_SYSTEM,
                    &[Content::user_text(prompt)],
                    &ToolMode::JsonOnly,
                )
                .await?;
            let text = match turn {
                ModelTurn::Text(t) => t,
                ModelTurn::ToolCalls(_) => return Err(AgentError::EmptyResponse),
            };
            let value = recover(&text, "items")?;
            let polished: Vec<GroceryItem> =
                serde_json::from_value(value["items"].clone()).unwrap_or_default();
            Ok(polished)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModelClient, ScriptStep};

    fn items(names: &[&str]) -> Vec<GroceryItem> {
        names
            .iter()
            .map(|n| GroceryItem {
                name: n.to_string(),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_polish_and_merge() {
        let client = Arc::new(MockModelClient::with_texts(vec![
            r#"{"items": [{"name": "onion"}, {"name": "onion"}]}"#,
            r#"{"items": [{"name": "onion", "quantity": 2.0}]}"#,
        ]));
        let pipeline = GroceryPolishPipeline::new(client, 5);
        let request = GroceryPolishRequest {
            items: items(&["Onions", "onion"]),
        };
        let result = pipeline
            .run(&request, None, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_failure_keeps_original_items() {
        // 批量 1：第一批网关失败按原条目兜底，第二批成功；合并调用也失败
        // -> 退回未合并
        let client = Arc::new(MockModelClient::scripted(vec![
            ScriptStep::GatewayFailure("down".to_string()),
            ScriptStep::Turn(ModelTurn::Text(
                r#"{"items": [{"name": "carrot"}]}"#.to_string(),
            )),
            ScriptStep::GatewayFailure("down".to_string()),
        ]));
        let pipeline = GroceryPolishPipeline::new(client, 1);
        let request = GroceryPolishRequest {
            items: items(&["Onions", "carrot"]),
        };
        let result = pipeline
            .run(&request, None, CancellationToken::new())
            .await
            .unwrap();
        let out = result["items"].as_array().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["name"], "Onions");
        assert_eq!(out[1]["name"], "carrot");
    }

    #[tokio::test]
    async fn test_gateway_down_for_every_batch_fails_job() {
        let client = Arc::new(MockModelClient::scripted(vec![
            ScriptStep::GatewayFailure("down".to_string()),
            ScriptStep::GatewayFailure("down".to_string()),
        ]));
        let pipeline = GroceryPolishPipeline::new(client, 1);
        let request = GroceryPolishRequest {
            items: items(&["Onions", "carrot"]),
        };
        let err = pipeline
            .run(&request, None, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Gateway(_)));
    }
}
