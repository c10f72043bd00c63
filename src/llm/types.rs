//! 生成模型服务的线格式类型
//!
//! 请求为 {systemInstruction, contents: [{role, parts}], tools?, generationConfig?}，
//! 响应为 {candidates: [{content: {parts}, finishReason}]}；工具结果以
//! {functionResponse: {name, response}} 形式回传。全部 camelCase。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色（与模型 API 一致，只有 user / model 两种）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 消息片段：文本、工具调用或工具结果（外部标签即线格式）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
}

/// 模型请求的工具调用
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// 工具执行结果（协议不允许顶层数组，数组结果需先包进对象）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// 一轮对话内容
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model_parts(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    pub fn user_parts(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }
}

/// 工具声明：名称、描述与参数 JSON Schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 本次调用的工具模式：声明可用工具，或要求结构化 JSON 输出（无工具）。
/// JSON 模式只是提示而非保证，下游仍需修复引擎兜底。
#[derive(Clone, Debug)]
pub enum ToolMode {
    Declared(Vec<FunctionDeclaration>),
    JsonOnly,
}

/// 模型一轮的产出：最终文本，或一组待执行的工具调用
#[derive(Clone, Debug)]
pub enum ModelTurn {
    Text(String),
    ToolCalls(Vec<FunctionCall>),
}

/// 出站请求体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDeclarations>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclarations {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
}

/// 入站响应体
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_part_wire_format() {
        let text = serde_json::to_value(Part::Text("hi".into())).unwrap();
        assert_eq!(text, json!({"text": "hi"}));

        let call = serde_json::to_value(Part::FunctionCall(FunctionCall {
            name: "search_recipes".into(),
            args: json!({"query": "soup"}),
        }))
        .unwrap();
        assert_eq!(
            call,
            json!({"functionCall": {"name": "search_recipes", "args": {"query": "soup"}}})
        );
    }

    #[test]
    fn test_candidate_parses_function_call() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"functionCall": {"name": "get_recipes_by_ids", "args": {"ids": [1]}}}
                ]},
                "finishReason": "STOP"
            }]
        });
        let resp: GenerateResponse = serde_json::from_value(raw).unwrap();
        let parts = &resp.candidates[0].content.as_ref().unwrap().parts;
        assert!(matches!(parts[0], Part::FunctionCall(_)));
    }
}
