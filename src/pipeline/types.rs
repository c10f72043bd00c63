//! 管线领域类型
//!
//! 模型产出的结构全部宽容反序列化（缺字段取默认值），兜底项与 AI 产出项
//! 形状一致，保证任何部分失败下输出 schema 仍然成立。

use serde::{Deserialize, Serialize};

use crate::tools::IngredientLine;

/// 规划阶段产出的一餐概要
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MealOutline {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// 引用菜谱库中既有菜谱时的 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_id: Option<String>,
}

/// 构建阶段产出的完整菜谱
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<IngredientLine>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    /// 兜底项标记：该餐未能由模型生成，由概要降级而来
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
}

/// 购物清单条目
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroceryItem {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// 归类结果条目
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategorizedIngredient {
    pub name: String,
    pub category: String,
}
