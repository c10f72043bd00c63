//! 任务控制协议（HTTP）
//!
//! 按任务种类参数化的同构协议：POST /jobs/{kind} 创建并调度，GET 轮询状态，
//! DELETE 幂等删除。创建立即返回 pending 任务 id，管线在后台执行；客户端删除
//! 后仍在执行的管线写入落空即可（静默无操作），不视为错误。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::jobs::{Job, JobKind, JobRegistry, JobStatus, ProgressSnapshot};
use crate::llm::ModelClient;
use crate::pipeline::{
    CategorizationPipeline, CategorizationRequest, GenerationPipeline, GenerationRequest,
    GroceryPolishPipeline, GroceryPolishRequest,
};
use crate::tools::ToolDispatcher;

/// 服务共享状态
pub struct AppState {
    pub registry: JobRegistry,
    pub client: Arc<dyn ModelClient>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub max_iterations: usize,
    pub batch_size: usize,
    /// 服务停机时取消所有在途管线
    pub shutdown: CancellationToken,
}

/// 状态响应：{id, status, progress?, result?, error?}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobView {
    id: String,
    status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<ProgressSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error: job.error,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/jobs/:kind", post(create_job).get(list_jobs))
        .route("/jobs/:kind/:id", get(get_job).delete(delete_job))
        .with_state(state)
}

fn parse_kind(kind: &str) -> Result<JobKind, (StatusCode, String)> {
    JobKind::parse(kind).ok_or((
        StatusCode::NOT_FOUND,
        format!("unknown job kind '{}'", kind),
    ))
}

/// 请求体按种类预校验，参数问题在创建时就以 400 暴露，而不是让任务失败
fn validate_payload(kind: JobKind, payload: &Value) -> Result<(), String> {
    let check = match kind {
        JobKind::Generation => {
            serde_json::from_value::<GenerationRequest>(payload.clone()).map(|_| ())
        }
        JobKind::GroceryPolish => {
            serde_json::from_value::<GroceryPolishRequest>(payload.clone()).map(|_| ())
        }
        JobKind::Categorization => {
            serde_json::from_value::<CategorizationRequest>(payload.clone()).map(|_| ())
        }
    };
    check.map_err(|e| format!("invalid request body: {}", e))
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(payload): Json<Value>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    validate_payload(kind, &payload).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let job = state.registry.create(kind).await;
    tracing::info!(kind = kind.as_str(), job_id = %job.id, "job created");

    let job_id = job.id.clone();
    tokio::spawn(execute_job(Arc::clone(&state), kind, job.id, payload));

    Ok(Json(json!({ "jobId": job_id })))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<JobView>, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    match state.registry.store(kind).get(&id).await {
        Some(job) => Ok(Json(job.into())),
        None => Err((StatusCode::NOT_FOUND, "job not found".to_string())),
    }
}

async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    state.registry.store(kind).delete(&id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<JobView>>, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    let jobs = state.registry.store(kind).list().await;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

/// 后台执行一个任务：start -> 管线（进度经通道转写存储）-> complete | fail
pub async fn execute_job(state: Arc<AppState>, kind: JobKind, id: String, payload: Value) {
    let store = state.registry.store(kind);
    store.start(&id).await;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressSnapshot>();
    let forwarder_store = Arc::clone(&store);
    let forwarder_id = id.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(snapshot) = progress_rx.recv().await {
            forwarder_store
                .update_progress(&forwarder_id, snapshot)
                .await;
        }
    });

    let result = run_pipeline(&state, kind, &payload, &progress_tx).await;
    drop(progress_tx);
    let _ = forwarder.await;

    match result {
        Ok(value) => {
            tracing::info!(kind = kind.as_str(), job_id = %id, "job completed");
            store.complete(&id, value).await;
        }
        Err(e) => {
            tracing::warn!(kind = kind.as_str(), job_id = %id, error = %e, "job failed");
            store.fail(&id, e.to_string()).await;
        }
    }
}

async fn run_pipeline(
    state: &AppState,
    kind: JobKind,
    payload: &Value,
    progress_tx: &mpsc::UnboundedSender<ProgressSnapshot>,
) -> Result<Value, AgentError> {
    let cancel_token = state.shutdown.child_token();
    match kind {
        JobKind::Generation => {
            let request: GenerationRequest = serde_json::from_value(payload.clone())
                .map_err(|e| AgentError::Config(e.to_string()))?;
            GenerationPipeline::new(
                Arc::clone(&state.client),
                Arc::clone(&state.dispatcher),
                state.max_iterations,
                state.batch_size,
            )
            .run(&request, Some(progress_tx), cancel_token)
            .await
        }
        JobKind::GroceryPolish => {
            let request: GroceryPolishRequest = serde_json::from_value(payload.clone())
                .map_err(|e| AgentError::Config(e.to_string()))?;
            GroceryPolishPipeline::new(Arc::clone(&state.client), state.batch_size)
                .run(&request, Some(progress_tx), cancel_token)
                .await
        }
        JobKind::Categorization => {
            let request: CategorizationRequest = serde_json::from_value(payload.clone())
                .map_err(|e| AgentError::Config(e.to_string()))?;
            CategorizationPipeline::new(Arc::clone(&state.client), state.batch_size)
                .run(&request, Some(progress_tx), cancel_token)
                .await
        }
    }
}
