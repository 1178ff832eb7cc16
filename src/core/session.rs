//! 会话状态：InvestigationSession 与每设备的 DeviceInvestigation
//!
//! 会话是根聚合，只由编排循环及其调用的评估器修改；每个 DeviceInvestigation
//! 由其调查 worker 独占持有（fan-out 期间移入任务，结束后合并回会话），
//! 因此跨设备无共享可变状态，也就不需要锁。
//! step_outcomes 跨重试只追加不删除，评估器与报告始终能看到完整历史。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::ToolError;

/// 一次具体的工具调用：执行后 result / error 恰好填充其一，均为空表示尚未执行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub function: String,
    pub params: Value,
    pub result: Option<Value>,
    pub error: Option<ToolError>,
}

impl ToolInvocation {
    pub fn pending(function: impl Into<String>, params: Value) -> Self {
        Self {
            function: function.into(),
            params,
            result: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_some()
    }
}

/// 单个计划步骤的执行结果；attempt 记录产生于第几轮（0 为首轮）
///
/// invocations 可为空（oracle 判定无可用工具，属于 limitation 而非错误），也可有多条。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_index: usize,
    pub attempt: u32,
    pub instruction: String,
    pub invocations: Vec<ToolInvocation>,
}

impl StepOutcome {
    pub fn new(step_index: usize, attempt: u32, instruction: impl Into<String>) -> Self {
        Self {
            step_index,
            attempt,
            instruction: instruction.into(),
            invocations: Vec::new(),
        }
    }

    /// 该步骤是否至少有一次成功调用
    pub fn has_success(&self) -> bool {
        self.invocations.iter().any(|inv| inv.succeeded())
    }
}

/// 每设备的调查状态：worker 独占所有权，fan-out 合并时整体替换回会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInvestigation {
    pub device_name: String,
    pub role: String,
    pub profile: String,
    pub objective: String,
    pub plan_intent: String,
    pub plan_steps: Vec<String>,
    /// 只追加；跨重试保留所有历史
    pub step_outcomes: Vec<StepOutcome>,
    /// 失败/空调用步骤的自由文本汇总，仅供评估与展示
    pub limitations: Option<String>,
    /// 评估器写入，下一轮调查时注入 oracle 上下文
    pub retry_feedback: Option<String>,
    /// 已定案的设备不再进入后续 fan-out 批次
    pub resolved: bool,
    pub resolution: Option<String>,
}

impl DeviceInvestigation {
    pub fn new(
        device_name: impl Into<String>,
        role: impl Into<String>,
        profile: impl Into<String>,
        objective: impl Into<String>,
        plan_intent: impl Into<String>,
        plan_steps: Vec<String>,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            role: role.into(),
            profile: profile.into(),
            objective: objective.into(),
            plan_intent: plan_intent.into(),
            plan_steps,
            step_outcomes: Vec::new(),
            limitations: None,
            retry_feedback: None,
            resolved: false,
            resolution: None,
        }
    }

    /// 追加一条 limitation 记录（换行分隔）
    pub fn note_limitation(&mut self, note: impl AsRef<str>) {
        let note = note.as_ref().trim();
        if note.is_empty() {
            return;
        }
        match &mut self.limitations {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(note);
            }
            None => self.limitations = Some(note.to_string()),
        }
    }

    /// 定案：记录原因，此后不再重试该设备
    pub fn resolve(&mut self, reason: impl Into<String>) {
        self.resolved = true;
        self.resolution = Some(reason.into());
        self.retry_feedback = None;
    }

    /// 指定轮次的 StepOutcome 数量
    pub fn outcomes_for_attempt(&self, attempt: u32) -> usize {
        self.step_outcomes
            .iter()
            .filter(|o| o.attempt == attempt)
            .count()
    }
}

/// 目标达成度：每轮评估从 Unknown 迁移到 Achieved / NotAchieved 恰好一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveStatus {
    Unknown,
    Achieved,
    NotAchieved,
}

/// 会话阶段；Cancelled 是独立终态，不与正常完成混用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Validating,
    Planning,
    Executing,
    Assessing,
    Reporting,
    Done,
    Cancelled,
}

/// 根聚合：一次用户请求对应一个会话，summary 写入后即为终态
#[derive(Debug, Clone, Serialize)]
pub struct InvestigationSession {
    pub id: Uuid,
    pub user_query: String,
    pub devices: Vec<DeviceInvestigation>,
    pub current_retries: u32,
    pub max_retries: u32,
    pub objective: ObjectiveStatus,
    pub assessor_notes: Option<String>,
    pub summary: Option<String>,
    pub phase: SessionPhase,
}

impl InvestigationSession {
    pub fn new(user_query: impl Into<String>, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_query: user_query.into(),
            devices: Vec::new(),
            current_retries: 0,
            max_retries,
            objective: ObjectiveStatus::Unknown,
            assessor_notes: None,
            summary: None,
            phase: SessionPhase::Validating,
        }
    }

    pub fn device(&self, name: &str) -> Option<&DeviceInvestigation> {
        self.devices.iter().find(|d| d.device_name == name)
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut DeviceInvestigation> {
        self.devices.iter_mut().find(|d| d.device_name == name)
    }

    /// 尚未定案的设备，即下一轮 fan-out 的批次
    pub fn unresolved(&self) -> Vec<&DeviceInvestigation> {
        self.devices.iter().filter(|d| !d.resolved).collect()
    }

    pub fn all_resolved(&self) -> bool {
        self.devices.iter().all(|d| d.resolved)
    }

    /// fan-out 结束后将 worker 持有的状态替换回会话。
    /// worker 的副本只会在原有 step_outcomes 之后追加，整体替换不会丢历史。
    pub fn merge_device(&mut self, finished: DeviceInvestigation) {
        debug_assert!(
            self.device(&finished.device_name)
                .map(|d| finished.step_outcomes.len() >= d.step_outcomes.len())
                .unwrap_or(true),
            "step_outcomes must never shrink"
        );
        match self.device_mut(&finished.device_name) {
            Some(slot) => *slot = finished,
            None => self.devices.push(finished),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, SessionPhase::Done | SessionPhase::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_exclusive_result_or_error() {
        let mut inv = ToolInvocation::pending("get_device_facts", json!({}));
        assert!(!inv.succeeded());
        inv.result = Some(json!({"uptime": 42}));
        assert!(inv.succeeded());
    }

    #[test]
    fn test_note_limitation_merges_lines() {
        let mut d = DeviceInvestigation::new("pe-1", "pe", "", "obj", "health", vec![]);
        d.note_limitation("step 0: no applicable tool");
        d.note_limitation("step 2: communication failure: timeout");
        let notes = d.limitations.unwrap();
        assert!(notes.contains("step 0"));
        assert!(notes.contains("step 2"));
        assert_eq!(notes.lines().count(), 2);
    }

    #[test]
    fn test_resolve_clears_feedback() {
        let mut d = DeviceInvestigation::new("pe-1", "pe", "", "obj", "health", vec![]);
        d.retry_feedback = Some("narrow the focus".into());
        d.resolve("objective met");
        assert!(d.resolved);
        assert!(d.retry_feedback.is_none());
        assert_eq!(d.resolution.as_deref(), Some("objective met"));
    }

    #[test]
    fn test_merge_device_appends_history() {
        let mut session = InvestigationSession::new("check pe-1", 2);
        let mut d = DeviceInvestigation::new("pe-1", "pe", "", "obj", "health", vec!["s1".into()]);
        d.step_outcomes.push(StepOutcome::new(0, 0, "s1"));
        session.devices.push(d.clone());

        d.step_outcomes.push(StepOutcome::new(0, 1, "s1"));
        session.merge_device(d);

        let merged = session.device("pe-1").unwrap();
        assert_eq!(merged.step_outcomes.len(), 2);
        assert_eq!(merged.outcomes_for_attempt(0), 1);
        assert_eq!(merged.outcomes_for_attempt(1), 1);
    }

    #[test]
    fn test_unresolved_filters_resolved_devices() {
        let mut session = InvestigationSession::new("q", 2);
        session
            .devices
            .push(DeviceInvestigation::new("a", "", "", "o", "p", vec![]));
        session
            .devices
            .push(DeviceInvestigation::new("b", "", "", "o", "p", vec![]));
        session.device_mut("a").unwrap().resolve("objective met");
        let pending = session.unresolved();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].device_name, "b");
        assert!(!session.all_resolved());
    }
}
