//! 编排循环层：有界的工具增强对话

pub mod loop_;

pub use loop_::{run_loop, AgentSession};
