//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按入队顺序依次返回预置回复，队列耗尽后固定返回 "NONE"。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// Mock 客户端：预置回复队列
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: Vec<impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        let mut queue = self.responses.lock().map_err(|e| e.to_string())?;
        Ok(queue.pop_front().unwrap_or_else(|| "NONE".to_string()))
    }
}
