//! 生成模型 HTTP 客户端
//!
//! 通过 reqwest 调用 generateContent 端点；传输层失败（网络错误与 5xx）固定
//! 短退避后重试一次，请求被拒绝（4xx 等）不重试直接上抛。无工具时请求
//! application/json 输出模式。

use std::time::Duration;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::types::{
    Candidate, Content, FunctionCall, GenerateRequest, GenerateResponse, GenerationConfig,
    ModelTurn, Part, SystemInstruction, ToolDeclarations, ToolMode,
};
use crate::llm::ModelClient;

/// 传输层重试前的固定退避
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// 发送失败分类：传输层失败瞬时可重试，请求被拒绝重试也不会变好
enum SendFailure {
    Transport(String),
    Rejected(String),
}

impl SendFailure {
    fn retryable(&self) -> bool {
        matches!(self, SendFailure::Transport(_))
    }

    fn into_error(self) -> AgentError {
        match self {
            SendFailure::Transport(e) | SendFailure::Rejected(e) => AgentError::Gateway(e),
        }
    }
}

/// 非成功状态分类：5xx 视为瞬时传输失败，其余（4xx 等）为请求被拒绝
fn classify_status(status: reqwest::StatusCode, body: &str) -> SendFailure {
    if status.is_server_error() {
        SendFailure::Transport(format!("server error: {}", status))
    } else {
        let preview: String = body.chars().take(200).collect();
        SendFailure::Rejected(format!("request rejected ({}): {}", status, preview))
    }
}

/// HTTP 客户端：持有端点、模型名与 API Key
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    fn build_request(system: &str, contents: &[Content], mode: &ToolMode) -> GenerateRequest {
        let (tools, generation_config) = match mode {
            ToolMode::Declared(decls) => (
                Some(vec![ToolDeclarations {
                    function_declarations: decls.clone(),
                }]),
                None,
            ),
            ToolMode::JsonOnly => (
                None,
                Some(GenerationConfig {
                    response_mime_type: "application/json".to_string(),
                }),
            ),
        };
        GenerateRequest {
            system_instruction: Some(SystemInstruction {
                parts: vec![Part::Text(system.to_string())],
            }),
            contents: contents.to_vec(),
            tools,
            generation_config,
        }
    }

    /// 发送一次请求；reqwest 错误与 5xx 视为瞬时传输失败，4xx 等视为拒绝
    async fn send_once(&self, body: &GenerateRequest) -> Result<GenerateResponse, SendFailure> {
        let resp = self
            .http
            .post(self.endpoint())
            .json(body)
            .send()
            .await
            .map_err(|e| SendFailure::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        resp.json::<GenerateResponse>()
            .await
            .map_err(|e| SendFailure::Transport(format!("bad response body: {}", e)))
    }
}

/// 从首个 candidate 提取模型轮次：有 functionCall 则返回工具调用，否则拼接文本
fn extract_turn(candidates: Vec<Candidate>) -> Result<ModelTurn, AgentError> {
    let parts = candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();
    if parts.is_empty() {
        return Err(AgentError::EmptyResponse);
    }

    let mut calls: Vec<FunctionCall> = Vec::new();
    let mut text = String::new();
    for part in parts {
        match part {
            Part::FunctionCall(call) => calls.push(call),
            Part::Text(t) => text.push_str(&t),
            Part::FunctionResponse(_) => {}
        }
    }
    if !calls.is_empty() {
        Ok(ModelTurn::ToolCalls(calls))
    } else if !text.trim().is_empty() {
        Ok(ModelTurn::Text(text))
    } else {
        Err(AgentError::EmptyResponse)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn complete(
        &self,
        system: &str,
        contents: &[Content],
        mode: &ToolMode,
    ) -> Result<ModelTurn, AgentError> {
        let body = Self::build_request(system, contents, mode);

        let response = match self.send_once(&body).await {
            Ok(r) => r,
            Err(failure) if failure.retryable() => {
                let first = failure.into_error();
                tracing::warn!(error = %first, "gateway transport failure, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.send_once(&body).await.map_err(SendFailure::into_error)?
            }
            Err(failure) => return Err(failure.into_error()),
        };

        extract_turn(response.candidates)
    }
}
