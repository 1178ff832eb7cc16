//! RESTCONF 风格设备查询工具
//!
//! 通过 reqwest 访问在册设备的管理端点；GET 请求带超时与可选 Bearer Token。
//! 传输失败映射规则：连接/超时 -> Communication，401/403 -> Authentication，
//! 其它非 2xx 与非 JSON 响应 -> Protocol，设备未配置端点或参数非法 -> Validation。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::core::ToolError;
use crate::tools::DeviceTool;

/// RESTCONF 客户端：设备名 -> 管理端点映射，供各查询工具共享
pub struct RestconfClient {
    client: Client,
    endpoints: HashMap<String, String>,
    base_path: String,
    token: Option<String>,
}

impl RestconfClient {
    pub fn new(
        endpoints: HashMap<String, String>,
        base_path: impl Into<String>,
        timeout_secs: u64,
        token: Option<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoints,
            base_path: base_path.into(),
            token,
        }
    }

    /// 对设备端点发 GET；path 为 base_path 下的相对路径
    pub async fn get(
        &self,
        device: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ToolError> {
        let endpoint = self.endpoints.get(device).ok_or_else(|| {
            ToolError::Validation(format!("device '{device}' has no management endpoint"))
        })?;
        let url = format!(
            "{}{}/{}",
            endpoint.trim_end_matches('/'),
            self.base_path,
            path.trim_start_matches('/')
        );

        let mut request = self.client.get(&url).header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ToolError::Communication(format!("{device}: {e}"))
            } else {
                ToolError::Protocol(format!("{device}: {e}"))
            }
        })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ToolError::Authentication(format!(
                    "{device}: HTTP {}",
                    response.status()
                )));
            }
            status if !status.is_success() => {
                return Err(ToolError::Protocol(format!("{device}: HTTP {status}")));
            }
            _ => {}
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ToolError::Protocol(format!("{device}: invalid JSON body: {e}")))
    }
}

/// 设备基础信息：系统型号、软件版本、运行时间
pub struct DeviceFactsTool {
    client: Arc<RestconfClient>,
}

impl DeviceFactsTool {
    pub fn new(client: Arc<RestconfClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceTool for DeviceFactsTool {
    fn name(&self) -> &str {
        "get_device_facts"
    }

    fn description(&self) -> &str {
        "Fetch basic facts about the device: model, OS version, uptime, serial number"
    }

    async fn query(&self, device: &str, _args: Value) -> Result<Value, ToolError> {
        self.client.get(device, "system/facts", &[]).await
    }
}

/// 接口状态：全部或指定接口的 oper/admin 状态与计数器
pub struct InterfaceStatusTool {
    client: Arc<RestconfClient>,
}

impl InterfaceStatusTool {
    pub fn new(client: Arc<RestconfClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceTool for InterfaceStatusTool {
    fn name(&self) -> &str {
        "get_interface_status"
    }

    fn description(&self) -> &str {
        "Fetch operational state and error counters of interfaces; optionally a single interface"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "interface": {
                    "type": "string",
                    "description": "Interface name, e.g. ge-0/0/0. Omit for all interfaces."
                }
            },
            "required": []
        })
    }

    async fn query(&self, device: &str, args: Value) -> Result<Value, ToolError> {
        match args.get("interface").and_then(Value::as_str) {
            Some(ifname) if !ifname.is_empty() => {
                self.client
                    .get(device, "interfaces", &[("name", ifname)])
                    .await
            }
            _ => self.client.get(device, "interfaces", &[]).await,
        }
    }
}

/// 路由摘要：RIB 规模与各协议（BGP/ISIS/OSPF/static）的路由计数
pub struct RoutingSummaryTool {
    client: Arc<RestconfClient>,
}

impl RoutingSummaryTool {
    pub fn new(client: Arc<RestconfClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceTool for RoutingSummaryTool {
    fn name(&self) -> &str {
        "get_routing_summary"
    }

    fn description(&self) -> &str {
        "Fetch a routing table summary; optionally filtered by protocol (bgp, isis, ospf, static)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "protocol": {
                    "type": "string",
                    "description": "Protocol filter: bgp, isis, ospf or static. Omit for all."
                }
            },
            "required": []
        })
    }

    async fn query(&self, device: &str, args: Value) -> Result<Value, ToolError> {
        match args.get("protocol").and_then(Value::as_str) {
            Some(proto) if !proto.is_empty() => {
                self.client
                    .get(device, "routing/summary", &[("protocol", proto)])
                    .await
            }
            _ => self.client.get(device, "routing/summary", &[]).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_endpoint_is_validation_error() {
        let client = RestconfClient::new(HashMap::new(), "/restconf/data", 5, None);
        let err = client.get("unknown-device", "system/facts", &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_communication_error() {
        let mut endpoints = HashMap::new();
        // 不可路由地址，连接必然失败
        endpoints.insert("pe-1".to_string(), "http://127.0.0.1:1".to_string());
        let client = RestconfClient::new(endpoints, "/restconf/data", 1, None);
        let err = client.get("pe-1", "system/facts", &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::Communication(_)));
    }
}
