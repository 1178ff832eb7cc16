//! 固定应答工具：返回预置 payload，用于联调与测试

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ToolError;
use crate::tools::DeviceTool;

/// 固定应答工具：无论参数为何，总是返回构造时给定的 payload
pub struct CannedTool {
    name: String,
    description: String,
    payload: Value,
}

impl CannedTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            payload,
        }
    }
}

#[async_trait]
impl DeviceTool for CannedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn query(&self, _device: &str, _args: Value) -> Result<Value, ToolError> {
        Ok(self.payload.clone())
    }
}
