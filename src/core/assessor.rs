//! 目标评估器：判定会话是否达成目标，决定接受 / 带反馈重试 / 带局限接受
//!
//! 语义比较（结果是否回答了目标）委托给 ObjectiveJudge（LLM 实现）；
//! 决策策略本身与判定实现无关，由本模块强制执行：
//! - 所有设备判定达成 -> 会话达成；
//! - 未达成但 limitations 表明重试无望 -> 该设备带局限定案；
//! - 未达成且还有重试额度 -> 为未达成设备生成反馈（计数由编排循环递增）；
//! - 重试额度耗尽 -> 无条件强制接受并注明，这是循环终止的保底出口。
//! 评估是对传入会话快照的纯计算，无隐藏状态。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::{DeviceInvestigation, InvestigateError, InvestigationSession};
use crate::llm::{LlmClient, Message};
use crate::prompts::JUDGE_PROMPT;

/// 单台设备的判定结果
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceVerdict {
    pub met: bool,
    pub retriable: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

/// 语义判定 trait：一台设备的调查结果是否满足其目标
#[async_trait]
pub trait ObjectiveJudge: Send + Sync {
    async fn judge(
        &self,
        user_query: &str,
        investigation: &DeviceInvestigation,
        learnings: Option<&str>,
    ) -> Result<DeviceVerdict, InvestigateError>;
}

/// LLM 判定实现：把设备调查序列化进 prompt，解析 {met, retriable, feedback}
pub struct LlmJudge {
    llm: Arc<dyn LlmClient>,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn parse_verdict(output: &str) -> Result<DeviceVerdict, InvestigateError> {
        let trimmed = output.trim();
        let json_str = if let Some(start) = trimmed.find("```json") {
            let rest = &trimmed[start + 7..];
            rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest)
        } else {
            let start = trimmed
                .find('{')
                .ok_or_else(|| InvestigateError::JsonParse(output.to_string()))?;
            let end = trimmed
                .rfind('}')
                .ok_or_else(|| InvestigateError::JsonParse(output.to_string()))?;
            &trimmed[start..=end]
        };
        serde_json::from_str(json_str)
            .map_err(|e| InvestigateError::JsonParse(format!("{}: {}", e, json_str)))
    }
}

#[async_trait]
impl ObjectiveJudge for LlmJudge {
    async fn judge(
        &self,
        user_query: &str,
        investigation: &DeviceInvestigation,
        learnings: Option<&str>,
    ) -> Result<DeviceVerdict, InvestigateError> {
        let serialized = serde_json::to_string_pretty(investigation)
            .map_err(|e| InvestigateError::JsonParse(e.to_string()))?;
        let prompt = JUDGE_PROMPT
            .replace("{query}", user_query)
            .replace("{investigation}", &serialized)
            .replace("{learnings}", learnings.unwrap_or("(none)"));
        let output = self
            .llm
            .complete(&[Message::user(prompt)])
            .await
            .map_err(InvestigateError::LlmError)?;
        Self::parse_verdict(&output)
    }
}

/// 评估结论：是否达成 + 报告备注 + 未达成设备的重试反馈 + 本轮定案设备及原因
#[derive(Debug, Clone)]
pub struct Assessment {
    pub objective_achieved: bool,
    pub notes: String,
    pub feedback: HashMap<String, String>,
    pub resolutions: HashMap<String, String>,
}

/// 判定失败时的兜底反馈（判定器没给出具体指导）
const FALLBACK_RETRY_GUIDANCE: &str = "The assessment did not yield specific guidance. \
Review what was gathered against the objective and try a different approach, \
focusing on gaps or incomplete areas.";

/// 目标评估器：持有判定器，按决策策略给出 Assessment
pub struct ObjectiveAssessor {
    judge: Arc<dyn ObjectiveJudge>,
}

impl ObjectiveAssessor {
    pub fn new(judge: Arc<dyn ObjectiveJudge>) -> Self {
        Self { judge }
    }

    /// 评估会话快照。已定案设备直接跳过，只判定未定案的。
    pub async fn assess(
        &self,
        session: &InvestigationSession,
        learnings: Option<&str>,
    ) -> Assessment {
        let mut feedback = HashMap::new();
        let mut resolutions = HashMap::new();
        let mut unmet: Vec<String> = Vec::new();
        let mut with_limitations = false;

        for device in session.unresolved() {
            let verdict = match self
                .judge
                .judge(&session.user_query, device, learnings)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    // 判定失败按未达成处理，给兜底反馈；额度耗尽时走下方强制接受
                    tracing::warn!(device = %device.device_name, "Judge failed: {e}");
                    DeviceVerdict {
                        met: false,
                        retriable: true,
                        feedback: Some(FALLBACK_RETRY_GUIDANCE.to_string()),
                    }
                }
            };

            if verdict.met {
                resolutions.insert(device.device_name.clone(), "objective met".to_string());
            } else if !verdict.retriable {
                // 工具/设备侧限制，重试无望：带局限接受
                with_limitations = true;
                let reason = format!(
                    "accepted with limitations: {}",
                    device
                        .limitations
                        .as_deref()
                        .or(verdict.feedback.as_deref())
                        .unwrap_or("further retries cannot help")
                );
                resolutions.insert(device.device_name.clone(), reason);
            } else {
                unmet.push(device.device_name.clone());
                feedback.insert(
                    device.device_name.clone(),
                    verdict
                        .feedback
                        .unwrap_or_else(|| FALLBACK_RETRY_GUIDANCE.to_string()),
                );
            }
        }

        if unmet.is_empty() {
            let notes = if with_limitations {
                "objective partially met; some devices accepted with limitations".to_string()
            } else {
                "objective met".to_string()
            };
            return Assessment {
                objective_achieved: true,
                notes,
                feedback: HashMap::new(),
                resolutions,
            };
        }

        if session.current_retries >= session.max_retries {
            // 强制接受：循环终止的保底出口
            for name in &unmet {
                resolutions.insert(
                    name.clone(),
                    format!("max retries ({}) reached", session.max_retries),
                );
            }
            return Assessment {
                objective_achieved: true,
                notes: format!(
                    "max retries ({}) reached; objective not fully achieved for: {}",
                    session.max_retries,
                    unmet.join(", ")
                ),
                feedback: HashMap::new(),
                resolutions,
            };
        }

        Assessment {
            objective_achieved: false,
            notes: format!("objective not yet achieved for: {}", unmet.join(", ")),
            feedback,
            resolutions,
        }
    }
}
