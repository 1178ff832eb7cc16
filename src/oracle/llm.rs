//! LLM 推理 oracle
//!
//! 拼 system（工具目录）+ user（指令/目标/既有结果/反馈）调用 LLM，
//! parse_proposals 从文本中提取 JSON 数组并解析为 ProposedCall 列表；
//! 输出 NONE 或空数组均视为「无可用工具」。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{InvestigateError, StepOutcome};
use crate::llm::{LlmClient, Message};
use crate::oracle::{ProposedCall, ReasoningOracle};
use crate::prompts::ORACLE_PROMPT;

/// 历史结果注入 prompt 的最大字符数，超出时保留最近部分
const PRIOR_CONTEXT_MAX_CHARS: usize = 6000;

/// 解析 LLM 输出：```json 围栏或裸 [ ... ] 数组；NONE / 无数组 -> 空列表
pub fn parse_proposals(output: &str) -> Result<Vec<ProposedCall>, InvestigateError> {
    let trimmed = output.trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            &trimmed[start..=end]
        } else {
            return Ok(Vec::new());
        }
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        // 单个对象也接受，包成单元素列表
        let call: ProposedCall = serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| InvestigateError::JsonParse(format!("{}: {}", e, output)))?;
        return Ok(vec![call]);
    } else {
        return Ok(Vec::new());
    };

    if json_str.trim().eq_ignore_ascii_case("none") {
        return Ok(Vec::new());
    }

    serde_json::from_str::<Vec<ProposedCall>>(json_str)
        .map_err(|e| InvestigateError::JsonParse(format!("{}: {}", e, json_str)))
}

/// LLM oracle：持有客户端与工具目录（来自 ToolRegistry 的 schema JSON）
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    catalog: String,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>, catalog: impl Into<String>) -> Self {
        Self {
            llm,
            catalog: catalog.into(),
        }
    }

    fn build_user_message(
        &self,
        instruction: &str,
        objective: &str,
        prior: &[StepOutcome],
        feedback: Option<&str>,
    ) -> String {
        let mut prior_json =
            serde_json::to_string(prior).unwrap_or_else(|_| "[]".to_string());
        if prior_json.len() > PRIOR_CONTEXT_MAX_CHARS {
            let cut = prior_json.len() - PRIOR_CONTEXT_MAX_CHARS;
            // 按字符边界截断，避免切在多字节中间
            let boundary = prior_json
                .char_indices()
                .map(|(i, _)| i)
                .find(|&i| i >= cut)
                .unwrap_or(0);
            prior_json = format!("...(truncated){}", &prior_json[boundary..]);
        }

        let mut msg = format!(
            "Objective: {}\n\nInstruction for this step: {}\n\nResults of prior steps (JSON): {}",
            objective, instruction, prior_json
        );
        if let Some(fb) = feedback {
            msg.push_str("\n\nFeedback from the previous attempt: ");
            msg.push_str(fb);
        }
        msg
    }
}

#[async_trait]
impl ReasoningOracle for LlmOracle {
    async fn propose(
        &self,
        instruction: &str,
        objective: &str,
        prior: &[StepOutcome],
        feedback: Option<&str>,
    ) -> Result<Vec<ProposedCall>, InvestigateError> {
        let system = ORACLE_PROMPT.replace("{catalog}", &self.catalog);
        let user = self.build_user_message(instruction, objective, prior, feedback);
        let output = self
            .llm
            .complete(&[Message::system(system), Message::user(user)])
            .await
            .map_err(InvestigateError::LlmError)?;
        parse_proposals(&output)
    }
}
