//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，
//! 如 `SCOUT__ORCHESTRATOR__MAX_RETRIES=3`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub plans: PlansSection,
    #[serde(default)]
    pub learning: LearningSection,
    #[serde(default)]
    pub inventory: InventorySection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            orchestrator: OrchestratorSection::default(),
            tools: ToolsSection::default(),
            plans: PlansSection::default(),
            learning: LearningSection::default(),
            inventory: InventorySection::default(),
        }
    }
}

/// [app] 段：应用名与工作目录（学习存储落在工作目录下）
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：后端与模型选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// [orchestrator] 段：重试上限、fan-out 并发上限、会话超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_fan_out_limit")]
    pub fan_out_limit: usize,
    /// 0 表示不限时
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            fan_out_limit: default_fan_out_limit(),
            session_timeout_secs: default_session_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_fan_out_limit() -> usize {
    3
}

fn default_session_timeout_secs() -> u64 {
    600
}

/// [tools] 段：单次工具调用超时与 RESTCONF 设置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_restconf_base_path")]
    pub restconf_base_path: String,
    /// 读取设备访问 Token 的环境变量名
    #[serde(default = "default_device_token_env")]
    pub device_token_env: String,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            restconf_base_path: default_restconf_base_path(),
            device_token_env: default_device_token_env(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_restconf_base_path() -> String {
    "/restconf/data".to_string()
}

fn default_device_token_env() -> String {
    "SCOUT_DEVICE_TOKEN".to_string()
}

/// [plans] 段：计划目录与回退 intent
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlansSection {
    /// 未设置时按 plans/、../plans/ 顺序查找
    pub dir: Option<PathBuf>,
    /// LLM 选择失败时回退的计划；未设置时取 intent 字典序第一个
    pub default_intent: Option<String>,
}

/// [learning] 段：跨会话学习存储
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LearningSection {
    #[serde(default = "default_learning_enabled")]
    pub enabled: bool,
    /// 注入 planner/assessor 上下文的最大字符数
    #[serde(default = "default_context_max_chars")]
    pub context_max_chars: usize,
}

impl Default for LearningSection {
    fn default() -> Self {
        Self {
            enabled: default_learning_enabled(),
            context_max_chars: default_context_max_chars(),
        }
    }
}

fn default_learning_enabled() -> bool {
    true
}

fn default_context_max_chars() -> usize {
    4000
}

/// [inventory] 段：在册设备清单
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InventorySection {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// 一台在册设备：名称、角色、型号画像与可选的管理端点
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub profile: String,
    pub endpoint: Option<String>,
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
