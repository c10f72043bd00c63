//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SOUS__*` 覆盖（双下划线表示嵌套，
//! 如 `SOUS__LLM__MODEL=gemini-1.5-pro`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub jobs: JobsSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [server] 段：监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// [llm] 段：模型端点与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 未设置时回落到环境变量 GEMINI_API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl LlmSection {
    /// 配置值优先，其次 GEMINI_API_KEY 环境变量
    pub fn resolve_api_key(&self) -> String {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default()
    }
}

/// [jobs] 段：任务过期窗口
#[derive(Debug, Clone, Deserialize)]
pub struct JobsSection {
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: u64,
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            expiry_minutes: default_expiry_minutes(),
        }
    }
}

fn default_expiry_minutes() -> u64 {
    30
}

/// [pipeline] 段：迭代预算与批量
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// 编排循环的最大网关调用轮数
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_max_iterations() -> usize {
    10
}

fn default_batch_size() -> usize {
    3
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            llm: LlmSection::default(),
            jobs: JobsSection::default(),
            pipeline: PipelineSection::default(),
            tools: ToolsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 SOUS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SOUS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SOUS")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置（配置热更新：调用方决定是否用新配置重建组件）
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
