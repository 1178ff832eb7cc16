//! 调查错误类型
//!
//! 分两层：InvestigateError 是会话级错误（非法目标、计划损坏等结构性问题，直接向调用方传播）；
//! ToolError 是单次工具调用的类型化失败，只记录进 ToolInvocation，永不中断控制循环。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 会话级错误：只有结构性/输入性问题才会从 submit 传播出去
#[derive(Error, Debug)]
pub enum InvestigateError {
    /// 用户请求未匹配到任何在册设备，立即失败，不重试
    #[error("No target device matched the request: {0}")]
    InvalidTarget(String),

    #[error("Plan not found for intent: {0}")]
    PlanNotFound(String),

    /// 计划文档损坏（JSON 非法、intent 与文件名不一致、steps 为空）
    #[error("Malformed plan document '{intent}': {reason}")]
    MalformedPlan { intent: String, reason: String },

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    /// 会话被取消或超时；部分结果保留在会话内，经 submit_session 可取
    #[error("Session cancelled")]
    Cancelled,
}

/// 工具调用的类型化失败：通信 / 认证 / 协议 / 参数校验
///
/// 执行器超时归入 Communication。可序列化，随 ToolInvocation 一起进入会话历史与报告。
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum ToolError {
    #[error("communication failure: {0}")]
    Communication(String),

    #[error("authentication failure: {0}")]
    Authentication(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid invocation: {0}")]
    Validation(String),
}
