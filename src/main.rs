//! Sous - 膳食计划 AI 编排服务
//!
//! 入口：初始化日志、加载配置、组装模型客户端 / 工具 / 任务注册表，启动 HTTP 服务。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use sous::config::load_config;
use sous::jobs::JobRegistry;
use sous::llm::GeminiClient;
use sous::tools::{
    GetRecipesByIdsTool, InMemoryRecipeStore, SearchRecipesTool, ToolDispatcher, ToolRegistry,
};
use sous::web::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sous::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    tracing::info!(model = %cfg.llm.model, "config loaded");

    let client = Arc::new(
        GeminiClient::new(
            &cfg.llm.base_url,
            &cfg.llm.model,
            &cfg.llm.resolve_api_key(),
            cfg.llm.request_timeout_secs,
        )
        .context("Failed to build model client")?,
    );

    // 菜谱工具：注册进工具箱，经派发器供编排循环调用
    let recipe_store: Arc<dyn sous::tools::RecipeStore> = Arc::new(InMemoryRecipeStore::default());
    let mut registry = ToolRegistry::new();
    registry.register(SearchRecipesTool::new(Arc::clone(&recipe_store)));
    registry.register(GetRecipesByIdsTool::new(recipe_store));
    let dispatcher = Arc::new(ToolDispatcher::new(registry, cfg.tools.tool_timeout_secs));

    let jobs = JobRegistry::in_memory(Duration::from_secs(cfg.jobs.expiry_minutes * 60));

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        registry: jobs,
        client,
        dispatcher,
        max_iterations: cfg.pipeline.max_iterations,
        batch_size: cfg.pipeline.batch_size,
        shutdown: shutdown.clone(),
    });

    let addr = format!("{}:{}", cfg.server.host, cfg.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, "sous listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    Ok(())
}
