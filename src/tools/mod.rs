//! 工具层：注册表、派发器与菜谱查询工具

pub mod dispatcher;
pub mod recipes;
pub mod registry;

pub use dispatcher::ToolDispatcher;
pub use recipes::{
    GetRecipesByIdsTool, InMemoryRecipeStore, IngredientLine, RecipeDetail, RecipeStore,
    RecipeSummary, SearchCriteria, SearchRecipesTool,
};
pub use registry::{Tool, ToolRegistry};
