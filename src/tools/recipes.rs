//! 菜谱查询工具
//!
//! 两个只读工具包装外部菜谱数据协作方（RecipeStore）：按条件搜索与按 id 批量
//! 获取。参数经 schema 校验解码，未知字段直接拒绝；结果截断到固定条数上限，
//! 控制对话体积。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tools::registry::Tool;

/// 单次工具调用返回的最大记录数
pub const MAX_RECORDS: usize = 20;

/// 搜索摘要条目
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time_minutes: Option<u32>,
}

/// 菜谱详情
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecipeDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub ingredients: Vec<IngredientLine>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
}

/// 配料行
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngredientLine {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// 搜索条件（search_recipes 的参数；未知字段拒绝而非忽略）
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchCriteria {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub max_total_time_minutes: Option<u32>,
}

/// get_recipes_by_ids 的参数
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeIdsArgs {
    pub ids: Vec<String>,
}

/// 菜谱数据协作方（域外实现；此处只定义契约）
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn search(&self, criteria: &SearchCriteria) -> Vec<RecipeSummary>;
    async fn by_ids(&self, ids: &[String]) -> Vec<RecipeDetail>;
}

/// search_recipes 工具
pub struct SearchRecipesTool {
    store: Arc<dyn RecipeStore>,
}

impl SearchRecipesTool {
    pub fn new(store: Arc<dyn RecipeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SearchRecipesTool {
    fn name(&self) -> &str {
        "search_recipes"
    }

    fn description(&self) -> &str {
        "Search the recipe catalog by free-text query, tags and max total time. \
         Returns at most 20 summaries."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "tags": { "type": "array", "items": { "type": "string" } },
                "max_total_time_minutes": { "type": "integer" }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let criteria: SearchCriteria =
            serde_json::from_value(args).map_err(|e| format!("invalid args: {}", e))?;
        let mut results = self.store.search(&criteria).await;
        results.truncate(MAX_RECORDS);
        // 协议不允许顶层数组结果，这里直接给出对象形式
        Ok(json!({ "recipes": results }))
    }
}

/// get_recipes_by_ids 工具
pub struct GetRecipesByIdsTool {
    store: Arc<dyn RecipeStore>,
}

impl GetRecipesByIdsTool {
    pub fn new(store: Arc<dyn RecipeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetRecipesByIdsTool {
    fn name(&self) -> &str {
        "get_recipes_by_ids"
    }

    fn description(&self) -> &str {
        "Fetch full recipe details (ingredients, steps) for a list of recipe ids. \
         Returns at most 20 records."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ids": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["ids"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let args: RecipeIdsArgs =
            serde_json::from_value(args).map_err(|e| format!("invalid args: {}", e))?;
        let mut results = self.store.by_ids(&args.ids).await;
        results.truncate(MAX_RECORDS);
        Ok(json!({ "recipes": results }))
    }
}

/// 内存版菜谱库（测试与演示用）
#[derive(Default)]
pub struct InMemoryRecipeStore {
    recipes: Vec<RecipeDetail>,
    tags: std::collections::HashMap<String, Vec<String>>,
}

impl InMemoryRecipeStore {
    pub fn new(recipes: Vec<RecipeDetail>) -> Self {
        Self {
            recipes,
            tags: Default::default(),
        }
    }

    pub fn with_tags(
        recipes: Vec<RecipeDetail>,
        tags: std::collections::HashMap<String, Vec<String>>,
    ) -> Self {
        Self { recipes, tags }
    }
}

#[async_trait]
impl RecipeStore for InMemoryRecipeStore {
    async fn search(&self, criteria: &SearchCriteria) -> Vec<RecipeSummary> {
        self.recipes
            .iter()
            .filter(|r| match &criteria.query {
                Some(q) => r.title.to_lowercase().contains(&q.to_lowercase()),
                None => true,
            })
            .filter(|r| {
                criteria.tags.is_empty()
                    || self
                        .tags
                        .get(&r.id)
                        .map(|t| criteria.tags.iter().all(|want| t.contains(want)))
                        .unwrap_or(false)
            })
            .map(|r| RecipeSummary {
                id: r.id.clone(),
                title: r.title.clone(),
                tags: self.tags.get(&r.id).cloned().unwrap_or_default(),
                total_time_minutes: None,
            })
            .collect()
    }

    async fn by_ids(&self, ids: &[String]) -> Vec<RecipeDetail> {
        self.recipes
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<dyn RecipeStore> {
        let recipes = (0..30)
            .map(|i| RecipeDetail {
                id: format!("r{}", i),
                title: format!("Tomato soup {}", i),
                ingredients: vec![],
                steps: vec![],
                servings: Some(2),
            })
            .collect();
        Arc::new(InMemoryRecipeStore::new(recipes))
    }

    #[tokio::test]
    async fn test_search_results_are_bounded() {
        let tool = SearchRecipesTool::new(store());
        let out = tool.execute(json!({"query": "tomato"})).await.unwrap();
        assert_eq!(out["recipes"].as_array().unwrap().len(), MAX_RECORDS);
    }

    #[tokio::test]
    async fn test_unknown_arg_field_is_rejected() {
        let tool = SearchRecipesTool::new(store());
        let err = tool.execute(json!({"cuisine": "thai"})).await.unwrap_err();
        assert!(err.contains("invalid args"));
    }

    #[tokio::test]
    async fn test_get_by_ids() {
        let tool = GetRecipesByIdsTool::new(store());
        let out = tool
            .execute(json!({"ids": ["r1", "r2"]}))
            .await
            .unwrap();
        assert_eq!(out["recipes"].as_array().unwrap().len(), 2);
    }
}
