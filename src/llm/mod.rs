//! 模型网关层：客户端抽象与实现（HTTP / Mock）

pub mod gemini;
pub mod mock;
pub mod traits;
pub mod types;

pub use gemini::GeminiClient;
pub use mock::{MockModelClient, ScriptStep};
pub use traits::ModelClient;
pub use types::{
    Content, FunctionCall, FunctionDeclaration, FunctionResponse, ModelTurn, Part, Role, ToolMode,
};
