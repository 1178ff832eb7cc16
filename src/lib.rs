//! Scout - Rust 网络设备智能排查系统
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排状态机、会话状态、fan-out、设备调查、目标评估、输入校验
//! - **learning**: 跨会话学习的提炼与存储
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **oracle**: 推理 oracle（计划步骤 -> 工具调用）
//! - **plans**: 计划文档仓库与计划选择
//! - **prompts**: 各环节的 prompt 模板
//! - **report**: 最终报告合成（LLM 叙述 + Markdown 兜底）
//! - **tools**: 设备查询工具与执行器

pub mod config;
pub mod core;
pub mod learning;
pub mod llm;
pub mod oracle;
pub mod plans;
pub mod prompts;
pub mod report;
pub mod tools;

pub use crate::core::{InvestigateError, Orchestrator};
