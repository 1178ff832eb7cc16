//! 计划加载器
//!
//! 从 plans/ 目录加载 *.json 计划文档并缓存。文件名（去扩展名）必须等于文档的 intent；
//! 不一致、JSON 非法或 steps 为空都按损坏处理，启动即失败，不进入会话。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::core::InvestigateError;

/// 计划文档：intent 唯一键 + 目标描述 + 有序自然语言步骤
#[derive(Debug, Clone, Deserialize)]
pub struct PlanDocument {
    pub intent: String,
    pub description: String,
    pub steps: Vec<String>,
}

/// 计划仓库：启动时全量加载并缓存，运行期只读
#[derive(Debug)]
pub struct PlanRepository {
    plans: HashMap<String, Arc<PlanDocument>>,
}

impl PlanRepository {
    /// 加载目录下所有 *.json 计划；任何一个损坏即整体失败
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, InvestigateError> {
        let dir = dir.as_ref();
        let mut plans = HashMap::new();

        if !dir.exists() {
            tracing::warn!("Plans directory {} does not exist", dir.display());
            return Ok(Self { plans });
        }

        let entries = std::fs::read_dir(dir).map_err(|e| {
            InvestigateError::ConfigError(format!("cannot read plans dir {}: {e}", dir.display()))
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let plan = Self::load_plan(&path)?;
            plans.insert(plan.intent.clone(), Arc::new(plan));
        }

        tracing::info!("Loaded {} investigation plans", plans.len());
        Ok(Self { plans })
    }

    /// 按默认位置查找 plans 目录
    pub fn from_default() -> Result<Self, InvestigateError> {
        let dirs = [PathBuf::from("plans"), PathBuf::from("../plans")];
        let dir = dirs
            .into_iter()
            .find(|d| d.exists())
            .unwrap_or_else(|| PathBuf::from("plans"));
        Self::load(dir)
    }

    fn load_plan(path: &Path) -> Result<PlanDocument, InvestigateError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let content = std::fs::read_to_string(path).map_err(|e| InvestigateError::MalformedPlan {
            intent: stem.clone(),
            reason: format!("unreadable: {e}"),
        })?;

        let plan: PlanDocument =
            serde_json::from_str(&content).map_err(|e| InvestigateError::MalformedPlan {
                intent: stem.clone(),
                reason: format!("invalid JSON: {e}"),
            })?;

        if plan.intent != stem {
            return Err(InvestigateError::MalformedPlan {
                intent: stem,
                reason: format!("intent '{}' does not match filename", plan.intent),
            });
        }
        if plan.steps.is_empty() {
            return Err(InvestigateError::MalformedPlan {
                intent: stem,
                reason: "plan has no steps".to_string(),
            });
        }

        Ok(plan)
    }

    pub fn get(&self, intent: &str) -> Option<Arc<PlanDocument>> {
        self.plans.get(intent).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn intents(&self) -> Vec<String> {
        let mut intents: Vec<String> = self.plans.keys().cloned().collect();
        intents.sort();
        intents
    }

    /// 全部计划的文本摘要，注入 planner prompt
    pub fn summaries(&self) -> String {
        let mut out = String::new();
        for intent in self.intents() {
            if let Some(plan) = self.plans.get(&intent) {
                out.push_str(&format!(
                    "--- plan: {} ---\n{}\nsteps:\n",
                    plan.intent, plan.description
                ));
                for (i, step) in plan.steps.iter().enumerate() {
                    out.push_str(&format!("  {}. {}\n", i + 1, step));
                }
                out.push_str(&format!("--- end plan: {} ---\n", plan.intent));
            }
        }
        out
    }
}
