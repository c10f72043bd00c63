//! Sous - 膳食计划 AI 编排服务
//!
//! 模块划分：
//! - **agent**: 有界的智能体编排循环（模型 / 工具往返）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 统一错误类型
//! - **jobs**: 任务生命周期（pending/running/completed/failed）与存储
//! - **llm**: 模型网关抽象与实现（Gemini 线协议 / Mock）
//! - **pipeline**: 批处理骨架与三条领域管线（生成 / 润色 / 归类）
//! - **recovery**: 模型输出 JSON 修复引擎
//! - **tools**: 工具注册表、分发器与菜谱工具
//! - **web**: 任务控制 HTTP 协议（axum）

pub mod agent;
pub mod config;
pub mod core;
pub mod jobs;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod recovery;
pub mod tools;
pub mod web;
