//! 周计划生成管线
//!
//! 两段式：规划阶段用工具增强循环产出 N 餐概要（单次调用阶段，失败使整个
//! 任务失败）；构建阶段按批把概要展开为完整菜谱（批处理阶段，单批失败降级
//! 为概要兜底菜谱，所有批都死在网关时任务失败）。产出餐数恒等于概要数。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agent::{run_loop, AgentSession};
use crate::core::AgentError;
use crate::jobs::{Phase, ProgressSnapshot};
use crate::llm::{Content, ModelClient, ModelTurn, ToolMode};
use crate::pipeline::batch::{process_in_batches, BatchFuture};
use crate::pipeline::types::{MealOutline, Recipe};
use crate::pipeline::send_progress;
use crate::recovery::{recover, RecoveryError};
use crate::tools::ToolDispatcher;

const PLANNING_SYSTEM: &str = "You are a meal-planning assistant. Use the available \
recipe tools to ground your plan in the catalog, prefer pantry ingredients, honor \
the stated preferences, and answer with a JSON object {\"meals\": [{\"title\", \
\"description\", \"recipe_id\"?}]} and nothing else.";

const BUILDING_SYSTEM: &str = "You expand meal outlines into complete recipes. \
Answer with a JSON object {\"recipes\": [{\"title\", \"description\", \
\"ingredients\": [{\"name\", \"quantity\"?, \"unit\"?}], \"steps\", \"servings\"?}]} \
with exactly one recipe per outline, in order, and nothing else.";

/// 生成任务的请求参数
#[derive(Clone, Debug, Deserialize)]
pub struct GenerationRequest {
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default)]
    pub servings: Option<u32>,
    #[serde(default)]
    pub pantry: Vec<String>,
    #[serde(default)]
    pub preferences: Vec<String>,
}

fn default_days() -> u32 {
    7
}

/// 生成管线
pub struct GenerationPipeline {
    client: Arc<dyn ModelClient>,
    dispatcher: Arc<ToolDispatcher>,
    max_iterations: usize,
    batch_size: usize,
}

impl GenerationPipeline {
    pub fn new(
        client: Arc<dyn ModelClient>,
        dispatcher: Arc<ToolDispatcher>,
        max_iterations: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            client,
            dispatcher,
            max_iterations,
            batch_size,
        }
    }

    pub async fn run(
        &self,
        request: &GenerationRequest,
        progress_tx: Option<&UnboundedSender<ProgressSnapshot>>,
        cancel_token: CancellationToken,
    ) -> Result<Value, AgentError> {
        // 规划：单次调用阶段，失败向上冒泡
        send_progress(
            progress_tx,
            ProgressSnapshot::new(Phase::Planning, 0, 1).with_message("planning meals"),
        );
        let outlines = self.plan_outlines(request, cancel_token.clone()).await?;
        send_progress(progress_tx, ProgressSnapshot::new(Phase::Planning, 1, 1));

        if cancel_token.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        // 构建：批处理阶段，单批失败逐项降级为概要兜底菜谱
        let total = outlines.len();
        let servings = request.servings;
        let recipes = process_in_batches(
            &outlines,
            self.batch_size,
            |chunk| self.build_batch(chunk),
            |outline| fallback_recipe(outline, servings),
            |done, _| {
                send_progress(
                    progress_tx,
                    ProgressSnapshot::new(Phase::Building, done, total),
                );
            },
        )
        .await?;

        Ok(json!({ "meals": recipes }))
    }

    /// 规划阶段：工具增强循环 -> JSON 修复 -> 概要列表
    async fn plan_outlines(
        &self,
        request: &GenerationRequest,
        cancel_token: CancellationToken,
    ) -> Result<Vec<MealOutline>, AgentError> {
        let prompt = format!(
            "Plan {} dinners for {} people.\nPantry: {}\nPreferences: {}",
            request.days,
            request.servings.unwrap_or(2),
            request.pantry.join(", "),
            request.preferences.join(", "),
        );
        let session = AgentSession::new(self.client.as_ref(), self.dispatcher.as_ref())
            .with_cancel_token(cancel_token);
        let raw = run_loop(&session, PLANNING_SYSTEM, &prompt, self.max_iterations).await?;
        let value = recover(&raw, "meals")?;
        let outlines: Vec<MealOutline> =
            serde_json::from_value(value["meals"].clone()).unwrap_or_default();
        if outlines.is_empty() {
            return Err(RecoveryError::Unrecoverable {
                key: "meals".to_string(),
                sample: raw.chars().take(160).collect(),
            }
            .into());
        }
        Ok(outlines)
    }

    /// 构建阶段单批：无工具 JSON 调用 -> 修复 -> 菜谱列表
    fn build_batch<'a>(&'a self, chunk: &'a [MealOutline]) -> BatchFuture<'a, Recipe> {
        Box::pin(async move {
            let outlines = serde_json::to_string(chunk)
                .map_err(|e| AgentError::Gateway(format!("serialize outlines: {}", e)))?;
            let prompt = format!("Expand these meal outlines into recipes:\n{}", outlines);
            let turn = self
                .client
                .complete(
                    BUILDING_SYSTEM,
                    &[Content::user_text(prompt)],
                    &ToolMode::JsonOnly,
                )
                .await?;
            let text = match turn {
                ModelTurn::Text(t) => t,
                ModelTurn::ToolCalls(_) => return Err(AgentError::EmptyResponse),
            };
            let value = recover(&text, "recipes")?;
            let recipes: Vec<Recipe> =
                serde_json::from_value(value["recipes"].clone()).unwrap_or_default();
            Ok(recipes)
        })
    }
}

/// 兜底菜谱：由概要降级而来，形状与 AI 产出一致
fn fallback_recipe(outline: &MealOutline, servings: Option<u32>) -> Recipe {
    Recipe {
        title: outline.title.clone(),
        description: outline.description.clone(),
        ingredients: Vec::new(),
        steps: vec!["Recipe details could not be generated for this meal.".to_string()],
        servings,
        fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModelClient, ScriptStep};
    use crate::tools::{ToolDispatcher, ToolRegistry};

    fn request() -> GenerationRequest {
        GenerationRequest {
            days: 3,
            servings: Some(2),
            pantry: vec!["rice".into(), "eggs".into()],
            preferences: vec!["vegetarian".into()],
        }
    }

    #[tokio::test]
    async fn test_generation_happy_path() {
        let planning = r#"{"meals": [
            {"title": "Fried rice", "description": "quick"},
            {"title": "Omelette", "description": "fluffy"},
            {"title": "Congee", "description": "comfort"}
        ]}"#;
        let building = r#"{"recipes": [
            {"title": "Fried rice", "ingredients": [{"name": "rice"}], "steps": ["fry"]},
            {"title": "Omelette", "ingredients": [{"name": "eggs"}], "steps": ["whisk"]},
            {"title": "Congee", "ingredients": [{"name": "rice"}], "steps": ["simmer"]}
        ]}"#;
        let client = Arc::new(MockModelClient::with_texts(vec![planning, building]));
        let dispatcher = Arc::new(ToolDispatcher::new(ToolRegistry::new(), 5));
        let pipeline = GenerationPipeline::new(client, dispatcher, 6, 5);

        let result = pipeline
            .run(&request(), None, CancellationToken::new())
            .await
            .unwrap();
        let meals = result["meals"].as_array().unwrap();
        assert_eq!(meals.len(), 3);
        assert_eq!(meals[0]["title"], "Fried rice");
    }

    #[tokio::test]
    async fn test_building_failure_degrades_to_fallback() {
        let planning = r#"{"meals": [
            {"title": "Fried rice", "description": "quick"},
            {"title": "Omelette", "description": "fluffy"}
        ]}"#;
        let building_second = r#"{"recipes": [
            {"title": "Omelette", "ingredients": [{"name": "eggs"}], "steps": ["whisk"]}
        ]}"#;
        // 批量 1：第一批网关失败按概要兜底，第二批成功
        let client = Arc::new(MockModelClient::scripted(vec![
            ScriptStep::Turn(ModelTurn::Text(planning.to_string())),
            ScriptStep::GatewayFailure("down".to_string()),
            ScriptStep::Turn(ModelTurn::Text(building_second.to_string())),
        ]));
        let dispatcher = Arc::new(ToolDispatcher::new(ToolRegistry::new(), 5));
        let pipeline = GenerationPipeline::new(client, dispatcher, 6, 1);

        let result = pipeline
            .run(&request(), None, CancellationToken::new())
            .await
            .unwrap();
        let meals = result["meals"].as_array().unwrap();
        assert_eq!(meals.len(), 2);
        assert_eq!(meals[0]["fallback"], true);
        assert_eq!(meals[0]["title"], "Fried rice");
        assert_eq!(meals[1]["title"], "Omelette");
        assert!(meals[1].get("fallback").is_none());
    }

    #[tokio::test]
    async fn test_building_gateway_down_for_every_batch_fails_job() {
        let planning = r#"{"meals": [
            {"title": "Fried rice", "description": "quick"},
            {"title": "Omelette", "description": "fluffy"}
        ]}"#;
        let client = Arc::new(MockModelClient::scripted(vec![
            ScriptStep::Turn(ModelTurn::Text(planning.to_string())),
            ScriptStep::GatewayFailure("down".to_string()),
            ScriptStep::GatewayFailure("down".to_string()),
        ]));
        let dispatcher = Arc::new(ToolDispatcher::new(ToolRegistry::new(), 5));
        let pipeline = GenerationPipeline::new(client, dispatcher, 6, 1);

        let err = pipeline
            .run(&request(), None, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Gateway(_)));
    }

    #[tokio::test]
    async fn test_planning_failure_fails_whole_run() {
        let client = Arc::new(MockModelClient::scripted(vec![ScriptStep::GatewayFailure(
            "down".to_string(),
        )]));
        let dispatcher = Arc::new(ToolDispatcher::new(ToolRegistry::new(), 5));
        let pipeline = GenerationPipeline::new(client, dispatcher, 6, 5);

        let err = pipeline
            .run(&request(), None, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Gateway(_)));
    }
}
