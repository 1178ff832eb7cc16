//! 计划选择器
//!
//! 为每台目标设备挑选计划并定制目标。LLM 实现根据用户请求、设备画像与历史学习
//! 输出 {intent, objective, steps}；解析失败或 intent 不存在时回退到仓库默认计划，
//! 只有仓库为空才是致命错误。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::validator::TargetDevice;
use crate::core::InvestigateError;
use crate::llm::{LlmClient, Message};
use crate::plans::PlanRepository;
use crate::prompts::PLANNER_PROMPT;

/// 选定的计划：intent + 为该设备定制的目标与步骤
#[derive(Debug, Clone)]
pub struct SelectedPlan {
    pub intent: String,
    pub objective: String,
    pub steps: Vec<String>,
}

/// 计划选择 trait：测试可用固定实现替代 LLM
#[async_trait]
pub trait PlanSelector: Send + Sync {
    async fn select(
        &self,
        user_query: &str,
        device: &TargetDevice,
        learnings: Option<&str>,
    ) -> Result<SelectedPlan, InvestigateError>;
}

/// LLM 输出的计划选择结果
#[derive(Debug, Deserialize)]
struct PlanChoice {
    intent: String,
    objective: String,
    #[serde(default)]
    steps: Vec<String>,
}

/// LLM 计划选择器：持有客户端、仓库与回退 intent
pub struct LlmPlanSelector {
    llm: Arc<dyn LlmClient>,
    repo: Arc<PlanRepository>,
    default_intent: Option<String>,
}

impl LlmPlanSelector {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        repo: Arc<PlanRepository>,
        default_intent: Option<String>,
    ) -> Self {
        Self {
            llm,
            repo,
            default_intent,
        }
    }

    /// 回退：默认 intent 或字典序第一个计划，目标取计划自身描述
    fn fallback(&self, device: &TargetDevice) -> Result<SelectedPlan, InvestigateError> {
        let intent = self
            .default_intent
            .clone()
            .or_else(|| self.repo.intents().into_iter().next())
            .ok_or_else(|| InvestigateError::PlanNotFound("(no plans loaded)".to_string()))?;
        let plan = self
            .repo
            .get(&intent)
            .ok_or_else(|| InvestigateError::PlanNotFound(intent.clone()))?;
        Ok(SelectedPlan {
            intent: plan.intent.clone(),
            objective: format!("{} on {}", plan.description, device.name),
            steps: plan.steps.clone(),
        })
    }

    fn parse_choice(&self, output: &str) -> Option<PlanChoice> {
        let trimmed = output.trim();
        let json_str = if let Some(start) = trimmed.find("```json") {
            let rest = &trimmed[start + 7..];
            rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest)
        } else {
            let start = trimmed.find('{')?;
            let end = trimmed.rfind('}')?;
            &trimmed[start..=end]
        };
        serde_json::from_str::<PlanChoice>(json_str).ok()
    }
}

#[async_trait]
impl PlanSelector for LlmPlanSelector {
    async fn select(
        &self,
        user_query: &str,
        device: &TargetDevice,
        learnings: Option<&str>,
    ) -> Result<SelectedPlan, InvestigateError> {
        if self.repo.is_empty() {
            return Err(InvestigateError::PlanNotFound("(no plans loaded)".to_string()));
        }

        let device_summary = format!(
            "name: {} / role: {} / profile: {}",
            device.name, device.role, device.profile
        );
        let prompt = PLANNER_PROMPT
            .replace("{plans}", &self.repo.summaries())
            .replace("{device}", &device_summary)
            .replace("{query}", user_query)
            .replace("{learnings}", learnings.unwrap_or("(none)"));

        let output = match self.llm.complete(&[Message::user(prompt)]).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!("Plan selection LLM call failed, using fallback plan: {e}");
                return self.fallback(device);
            }
        };

        match self.parse_choice(&output) {
            Some(choice) => match self.repo.get(&choice.intent) {
                Some(plan) => {
                    // LLM 可裁剪步骤；给空则用计划原始步骤
                    let steps = if choice.steps.is_empty() {
                        plan.steps.clone()
                    } else {
                        choice.steps
                    };
                    Ok(SelectedPlan {
                        intent: choice.intent,
                        objective: choice.objective,
                        steps,
                    })
                }
                None => {
                    tracing::warn!(
                        "Planner chose unknown intent '{}', using fallback plan",
                        choice.intent
                    );
                    self.fallback(device)
                }
            },
            None => {
                tracing::warn!("Unparseable planner output, using fallback plan");
                self.fallback(device)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use std::fs;

    fn repo_with_one_plan() -> Arc<PlanRepository> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("device_health_check.json"),
            r#"{"intent": "device_health_check", "description": "overall health check", "steps": ["collect facts", "check interfaces", "check routing"]}"#,
        )
        .unwrap();
        Arc::new(PlanRepository::load(dir.path()).unwrap())
    }

    fn target() -> TargetDevice {
        TargetDevice {
            name: "pe-1".to_string(),
            role: "pe".to_string(),
            profile: "mx204".to_string(),
        }
    }

    #[tokio::test]
    async fn test_select_parses_llm_choice() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"intent": "device_health_check", "objective": "verify pe-1 health", "steps": ["collect facts"]}"#,
        ]));
        let selector = LlmPlanSelector::new(llm, repo_with_one_plan(), None);
        let plan = selector.select("check pe-1", &target(), None).await.unwrap();
        assert_eq!(plan.intent, "device_health_check");
        assert_eq!(plan.objective, "verify pe-1 health");
        assert_eq!(plan.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back_to_repo_plan() {
        let llm = Arc::new(MockLlmClient::with_responses(vec!["I cannot decide."]));
        let selector = LlmPlanSelector::new(llm, repo_with_one_plan(), None);
        let plan = selector.select("check pe-1", &target(), None).await.unwrap();
        assert_eq!(plan.intent, "device_health_check");
        assert_eq!(plan.steps.len(), 3);
        assert!(plan.objective.contains("pe-1"));
    }

    #[tokio::test]
    async fn test_unknown_intent_falls_back() {
        let llm = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"intent": "no_such_plan", "objective": "x", "steps": []}"#,
        ]));
        let selector = LlmPlanSelector::new(llm, repo_with_one_plan(), None);
        let plan = selector.select("check pe-1", &target(), None).await.unwrap();
        assert_eq!(plan.intent, "device_health_check");
    }

    #[tokio::test]
    async fn test_empty_repo_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(PlanRepository::load(dir.path()).unwrap());
        let llm = Arc::new(MockLlmClient::new());
        let selector = LlmPlanSelector::new(llm, repo, None);
        let err = selector
            .select("check pe-1", &target(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, InvestigateError::PlanNotFound(_)));
    }
}
