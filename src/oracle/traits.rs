//! 推理 oracle 抽象
//!
//! 输入一条计划步骤与上下文，输出零或多条具体工具调用。
//! 编排核心只依赖该 trait，测试可用脚本化实现替代真实 LLM。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{InvestigateError, StepOutcome};

/// oracle 产出的一条待执行调用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedCall {
    pub function: String,
    #[serde(default)]
    pub params: Value,
}

/// 推理 oracle：步骤指令 + 目标 + 既有结果 + 重试反馈 -> 工具调用序列
///
/// 返回空序列表示「无可用工具」，是合法结果而非错误。
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn propose(
        &self,
        instruction: &str,
        objective: &str,
        prior: &[StepOutcome],
        feedback: Option<&str>,
    ) -> Result<Vec<ProposedCall>, InvestigateError>;
}
