//! 配料归类管线
//!
//! 按批把配料名归入门店分区；单批失败按「other」类兜底，输出条数恒等于输入。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::jobs::{Phase, ProgressSnapshot};
use crate::llm::{Content, ModelClient, ModelTurn, ToolMode};
use crate::pipeline::batch::{process_in_batches, BatchFuture};
use crate::pipeline::send_progress;
use crate::pipeline::types::CategorizedIngredient;
use crate::recovery::recover;

const CATEGORIZE_SYSTEM: &str = "You categorize grocery ingredients into store \
aisles (produce, dairy, meat, pantry, frozen, bakery, other). Answer with a JSON \
object {\"categories\": [{\"name\", \"category\"}]} with exactly one entry per \
input name, in order, and nothing else.";

/// 兜底类别
const FALLBACK_CATEGORY: &str = "other";

/// 归类任务的请求参数
#[derive(Clone, Debug, Deserialize)]
pub struct CategorizationRequest {
    #[serde(default)]
    pub ingredients: Vec<String>,
}

/// 配料归类管线
pub struct CategorizationPipeline {
    client: Arc<dyn ModelClient>,
    batch_size: usize,
}

impl CategorizationPipeline {
    pub fn new(client: Arc<dyn ModelClient>, batch_size: usize) -> Self {
        Self { client, batch_size }
    }

    pub async fn run(
        &self,
        request: &CategorizationRequest,
        progress_tx: Option<&UnboundedSender<ProgressSnapshot>>,
        cancel_token: CancellationToken,
    ) -> Result<Value, AgentError> {
        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let total = request.ingredients.len();
        let categories = process_in_batches(
            &request.ingredients,
            self.batch_size,
            |chunk| self.categorize_batch(chunk),
            |name| CategorizedIngredient {
                name: name.clone(),
                category: FALLBACK_CATEGORY.to_string(),
            },
            |done, _| {
                send_progress(
                    progress_tx,
                    ProgressSnapshot::new(Phase::Building, done, total),
                );
            },
        )
        .await?;

        Ok(json!({ "categories": categories }))
    }

    fn categorize_batch<'a>(&'a self, chunk: &'a [String]) -> BatchFuture<'a, CategorizedIngredient> {
        Box::pin(async move {
            let prompt = format!("Categorize these ingredients:\n{}", chunk.join("\n"));
            let turn = self
                .client
                .complete(
                    CATEGORIZE_SYSTEM,
                    &[Content::user_text(prompt)],
                    &ToolMode::JsonOnly,
                )
                .await?;
            let text = match turn {
                ModelTurn::Text(t) => t,
                ModelTurn::ToolCalls(_) => return Err(AgentError::EmptyResponse),
            };
            let value = recover(&text, "categories")?;
            let categories: Vec<CategorizedIngredient> =
                serde_json::from_value(value["categories"].clone()).unwrap_or_default();
            Ok(categories)
        })
    }
}
