//! 工具注册表
//!
//! 所有设备查询工具实现 DeviceTool trait（name / description / query），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时并统一映射 ToolError。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ToolError;

/// 设备查询工具 trait：名称、描述（供 oracle 理解）、参数 schema、异步执行
#[async_trait]
pub trait DeviceTool: Send + Sync {
    /// 工具名称（oracle 输出 JSON 中的 "function" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 oracle 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 oracle 生成正确的参数格式）
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 对目标设备执行查询
    async fn query(&self, device: &str, args: Value) -> Result<Value, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn DeviceTool>，支持 register / get / query / tool_names
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn DeviceTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl DeviceTool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DeviceTool>> {
        self.tools.get(name).cloned()
    }

    pub async fn query(&self, name: &str, device: &str, args: Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::Validation(format!("unknown function: {name}")))?;
        tool.query(device, args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 动态生成工具目录 JSON（含参数 schema），注入 oracle 的 system prompt
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
