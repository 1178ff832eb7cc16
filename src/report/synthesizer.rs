//! 报告合成器
//!
//! 优先用 LLM 把完整会话（含全部重试历史与评估备注）写成工程师可读的叙述；
//! LLM 不可用、失败或给空时回退到确定性 Markdown。合成永不失败会话。

use std::sync::Arc;

use crate::core::{InvestigationSession, SessionPhase};
use crate::llm::{LlmClient, Message};
use crate::prompts::REPORT_PROMPT;
use crate::report::markdown;

/// 报告合成器：可无 LLM 构造（纯 Markdown 模式）
pub struct ReportSynthesizer {
    llm: Option<Arc<dyn LlmClient>>,
}

impl ReportSynthesizer {
    pub fn new(llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self { llm }
    }

    /// 合成最终报告；被取消的会话直接走 Markdown（不再花钱也不再等待 LLM）
    pub async fn synthesize(&self, session: &InvestigationSession) -> String {
        if session.phase == SessionPhase::Cancelled {
            return markdown::render(session);
        }

        let Some(llm) = &self.llm else {
            return markdown::render(session);
        };

        let serialized = match serde_json::to_string_pretty(session) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Session serialization failed, using markdown fallback: {e}");
                return markdown::render(session);
            }
        };

        let prompt = REPORT_PROMPT.replace("{session}", &serialized);
        match llm.complete(&[Message::user(prompt)]).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => {
                tracing::warn!("LLM returned an empty report, using markdown fallback");
                markdown::render(session)
            }
            Err(e) => {
                tracing::warn!("LLM report generation failed, using markdown fallback: {e}");
                markdown::render(session)
            }
        }
    }
}
