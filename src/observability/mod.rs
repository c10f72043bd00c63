//! 可观测性：tracing 初始化
//!
//! 默认其他依赖 info、本服务 debug（管线降级与修复细节都在 debug 级）；
//! 设置 RUST_LOG 时整体以环境变量为准。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sous=debug"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
