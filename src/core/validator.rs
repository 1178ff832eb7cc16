//! 输入校验：把用户请求解析为具体的目标设备集合
//!
//! 只接受在册设备；解析结果为空即 InvalidTarget，立即失败不重试。
//! LLM 实现先做清单名称直接命中（请求中逐字出现设备名时无需调用模型），
//! 未命中再用 LLM 做模糊抽取（如「所有边缘路由器」按角色展开）。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::DeviceEntry;
use crate::core::InvestigateError;
use crate::llm::{LlmClient, Message};
use crate::prompts::DEVICE_EXTRACTION_PROMPT;

/// 一台已确认的目标设备
#[derive(Debug, Clone)]
pub struct TargetDevice {
    pub name: String,
    pub role: String,
    pub profile: String,
}

/// 目标解析 trait：用户请求 -> 目标设备集合
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(
        &self,
        user_query: &str,
        learnings: Option<&str>,
    ) -> Result<Vec<TargetDevice>, InvestigateError>;
}

/// LLM 抽取结果中的一条设备记录
#[derive(Debug, Deserialize)]
struct ExtractedDevice {
    device_name: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    profile: String,
}

/// LLM 目标解析器：持有客户端与设备清单
pub struct LlmTargetResolver {
    llm: Arc<dyn LlmClient>,
    inventory: Vec<DeviceEntry>,
}

impl LlmTargetResolver {
    pub fn new(llm: Arc<dyn LlmClient>, inventory: Vec<DeviceEntry>) -> Self {
        Self { llm, inventory }
    }

    fn entry(&self, name: &str) -> Option<&DeviceEntry> {
        self.inventory
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    fn to_target(&self, entry: &DeviceEntry) -> TargetDevice {
        TargetDevice {
            name: entry.name.clone(),
            role: entry.role.clone(),
            profile: entry.profile.clone(),
        }
    }

    /// 清单名称直接命中：请求文本包含设备名（不区分大小写）
    fn literal_matches(&self, user_query: &str) -> Vec<TargetDevice> {
        let query = user_query.to_lowercase();
        self.inventory
            .iter()
            .filter(|d| query.contains(&d.name.to_lowercase()))
            .map(|d| self.to_target(d))
            .collect()
    }

    fn inventory_listing(&self) -> String {
        self.inventory
            .iter()
            .map(|d| format!("- {} (role: {}, profile: {})", d.name, d.role, d.profile))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn parse_extraction(&self, output: &str) -> Result<Vec<ExtractedDevice>, InvestigateError> {
        let trimmed = output.trim();
        let json_str = if let Some(start) = trimmed.find("```json") {
            let rest = &trimmed[start + 7..];
            rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest)
        } else if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
            &trimmed[start..=end]
        } else {
            return Ok(Vec::new());
        };
        serde_json::from_str::<Vec<ExtractedDevice>>(json_str)
            .map_err(|e| InvestigateError::JsonParse(format!("{}: {}", e, json_str)))
    }
}

#[async_trait]
impl TargetResolver for LlmTargetResolver {
    async fn resolve(
        &self,
        user_query: &str,
        _learnings: Option<&str>,
    ) -> Result<Vec<TargetDevice>, InvestigateError> {
        if self.inventory.is_empty() {
            return Err(InvestigateError::InvalidTarget(
                "device inventory is empty".to_string(),
            ));
        }

        let literal = self.literal_matches(user_query);
        if !literal.is_empty() {
            tracing::info!(
                "Resolved {} target device(s) by literal inventory match",
                literal.len()
            );
            return Ok(literal);
        }

        let prompt = DEVICE_EXTRACTION_PROMPT
            .replace("{inventory}", &self.inventory_listing())
            .replace("{query}", user_query);
        let output = self
            .llm
            .complete(&[Message::user(prompt)])
            .await
            .map_err(InvestigateError::LlmError)?;

        // 只保留清单中确实存在的设备，角色/画像以清单为准
        let targets: Vec<TargetDevice> = self
            .parse_extraction(&output)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|d| self.entry(&d.device_name).map(|e| self.to_target(e)))
            .collect();

        if targets.is_empty() {
            return Err(InvestigateError::InvalidTarget(user_query.to_string()));
        }
        tracing::info!("Resolved {} target device(s) via extraction", targets.len());
        Ok(targets)
    }
}
