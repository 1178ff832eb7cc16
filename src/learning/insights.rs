//! 洞见提炼：会话结束后用 LLM 总结可复用的模式与设备关系
//!
//! 输出 {learned_patterns, device_relationships} 两个 markdown 字符串并写入存储。
//! 全程尽力而为：LLM 失败或输出不可解析时只记日志。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::InvestigationSession;
use crate::learning::LearningStore;
use crate::llm::{LlmClient, Message};
use crate::prompts::INSIGHTS_PROMPT;

#[derive(Debug, Deserialize)]
struct SessionInsights {
    #[serde(default)]
    learned_patterns: String,
    #[serde(default)]
    device_relationships: String,
}

fn parse_insights(output: &str) -> Option<SessionInsights> {
    let trimmed = output.trim();
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest)
    } else {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        &trimmed[start..=end]
    };
    serde_json::from_str(json_str).ok()
}

/// 提炼并落盘本次会话的洞见
pub async fn extract_and_record(
    llm: &Arc<dyn LlmClient>,
    store: &LearningStore,
    session: &InvestigationSession,
) {
    let serialized = match serde_json::to_string(session) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Cannot serialize session for insight extraction: {e}");
            return;
        }
    };

    let prompt = INSIGHTS_PROMPT.replace("{session}", &serialized);
    let output = match llm.complete(&[Message::user(prompt)]).await {
        Ok(o) => o,
        Err(e) => {
            tracing::warn!("Insight extraction LLM call failed: {e}");
            return;
        }
    };

    match parse_insights(&output) {
        Some(insights) => {
            store.record_patterns(&insights.learned_patterns);
            store.record_relationships(&insights.device_relationships);
            tracing::info!("Recorded session insights");
        }
        None => tracing::warn!("Unparseable insight extraction output"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[tokio::test]
    async fn test_insights_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path(), 4000);
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec![
            r#"{"learned_patterns": "PE uplink errors correlate with optics.", "device_relationships": "pe-1 uplinks to core-p1."}"#,
        ]));
        let session = InvestigationSession::new("check pe-1", 2);

        extract_and_record(&llm, &store, &session).await;

        let ctx = store.load_context().unwrap();
        assert!(ctx.contains("optics"));
        assert!(ctx.contains("core-p1"));
    }

    #[tokio::test]
    async fn test_unparseable_output_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = LearningStore::new(dir.path(), 4000);
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responses(vec!["no insights"]));
        let session = InvestigationSession::new("check pe-1", 2);

        extract_and_record(&llm, &store, &session).await;
        assert!(store.load_context().is_none());
    }
}
