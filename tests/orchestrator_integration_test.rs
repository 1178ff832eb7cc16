//! 编排循环集成测试
//!
//! 用脚本化的 resolver / selector / oracle / judge / tool 驱动真实的编排器，
//! 覆盖：终止保证、强制接受、设备隔离、选择性重试、历史单调、取消收尾。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use scout::config::OrchestratorSection;
use scout::core::{
    DeviceVerdict, EngineComponents, InvestigateError, ObjectiveJudge, ObjectiveStatus,
    Orchestrator, SessionPhase, StepOutcome, TargetDevice, TargetResolver, ToolError,
};
use scout::core::{DeviceInvestigation, InvestigationSession};
use scout::oracle::{ProposedCall, ReasoningOracle};
use scout::plans::{PlanSelector, SelectedPlan};
use scout::tools::{DeviceTool, ToolExecutor, ToolRegistry};

/// 固定目标集合的 resolver
struct StaticResolver {
    devices: Vec<String>,
}

#[async_trait]
impl TargetResolver for StaticResolver {
    async fn resolve(
        &self,
        _user_query: &str,
        _learnings: Option<&str>,
    ) -> Result<Vec<TargetDevice>, InvestigateError> {
        Ok(self
            .devices
            .iter()
            .map(|name| TargetDevice {
                name: name.clone(),
                role: "edge".to_string(),
                profile: String::new(),
            })
            .collect())
    }
}

/// 固定步骤数的 selector；objective 带设备名，便于 oracle 按设备计数
struct StaticSelector {
    steps: usize,
}

#[async_trait]
impl PlanSelector for StaticSelector {
    async fn select(
        &self,
        _user_query: &str,
        device: &TargetDevice,
        _learnings: Option<&str>,
    ) -> Result<SelectedPlan, InvestigateError> {
        Ok(SelectedPlan {
            intent: "device_health_check".to_string(),
            objective: format!("objective for {}", device.name),
            steps: (0..self.steps).map(|i| format!("step {i}")).collect(),
        })
    }
}

/// 每步固定给一条 probe 调用的 oracle，按 objective（即设备）计数；
/// 可选地在第 cancel_after 次调用后触发取消
struct CountingOracle {
    counts: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl CountingOracle {
    fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    fn cancelling(after: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((after, token)),
            ..Self::new()
        }
    }

    fn count_for(&self, objective: &str) -> usize {
        *self.counts.lock().unwrap().get(objective).unwrap_or(&0)
    }
}

#[async_trait]
impl ReasoningOracle for CountingOracle {
    async fn propose(
        &self,
        _instruction: &str,
        objective: &str,
        _prior: &[StepOutcome],
        _feedback: Option<&str>,
    ) -> Result<Vec<ProposedCall>, InvestigateError> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(objective.to_string())
            .or_insert(0) += 1;
        let n = self.total.fetch_add(1, Ordering::SeqCst);
        if let Some((after, token)) = &self.cancel_after {
            if n + 1 >= *after {
                token.cancel();
            }
        }
        Ok(vec![ProposedCall {
            function: "probe".to_string(),
            params: json!({}),
        }])
    }
}

/// probe 工具：fail_devices 内的设备返回通信错误，其余成功
struct ProbeTool {
    fail_devices: Vec<String>,
}

#[async_trait]
impl DeviceTool for ProbeTool {
    fn name(&self) -> &str {
        "probe"
    }
    fn description(&self) -> &str {
        "scripted probe"
    }
    async fn query(&self, device: &str, _args: Value) -> Result<Value, ToolError> {
        if self.fail_devices.iter().any(|d| d == device) {
            Err(ToolError::Communication("connection refused".to_string()))
        } else {
            Ok(json!({"device": device, "status": "ok"}))
        }
    }
}

/// 按设备名出队预置判定的 judge；队列耗尽后返回 met=true
struct SeqJudge {
    verdicts: Mutex<HashMap<String, VecDeque<DeviceVerdict>>>,
}

impl SeqJudge {
    fn new(table: Vec<(&str, Vec<DeviceVerdict>)>) -> Self {
        Self {
            verdicts: Mutex::new(
                table
                    .into_iter()
                    .map(|(name, v)| (name.to_string(), v.into_iter().collect()))
                    .collect(),
            ),
        }
    }
}

fn met() -> DeviceVerdict {
    DeviceVerdict {
        met: true,
        retriable: true,
        feedback: None,
    }
}

fn unmet(feedback: &str) -> DeviceVerdict {
    DeviceVerdict {
        met: false,
        retriable: true,
        feedback: Some(feedback.to_string()),
    }
}

#[async_trait]
impl ObjectiveJudge for SeqJudge {
    async fn judge(
        &self,
        _user_query: &str,
        investigation: &DeviceInvestigation,
        _learnings: Option<&str>,
    ) -> Result<DeviceVerdict, InvestigateError> {
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .get_mut(&investigation.device_name)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(met))
    }
}

/// 永不满意的 judge：验证强制接受兜底
struct NeverSatisfiedJudge;

#[async_trait]
impl ObjectiveJudge for NeverSatisfiedJudge {
    async fn judge(
        &self,
        _user_query: &str,
        _investigation: &DeviceInvestigation,
        _learnings: Option<&str>,
    ) -> Result<DeviceVerdict, InvestigateError> {
        Ok(unmet("still not good enough"))
    }
}

/// 有 limitations 的设备按「重试无望」定案，其余视为达成
struct LimitationAwareJudge;

#[async_trait]
impl ObjectiveJudge for LimitationAwareJudge {
    async fn judge(
        &self,
        _user_query: &str,
        investigation: &DeviceInvestigation,
        _learnings: Option<&str>,
    ) -> Result<DeviceVerdict, InvestigateError> {
        if investigation.limitations.is_some() {
            Ok(DeviceVerdict {
                met: false,
                retriable: false,
                feedback: None,
            })
        } else {
            Ok(met())
        }
    }
}

fn probe_executor(fail_devices: Vec<&str>) -> Arc<ToolExecutor> {
    let mut registry = ToolRegistry::new();
    registry.register(ProbeTool {
        fail_devices: fail_devices.into_iter().map(String::from).collect(),
    });
    Arc::new(ToolExecutor::new(registry, 5))
}

fn orchestrator(
    devices: Vec<&str>,
    steps: usize,
    oracle: Arc<CountingOracle>,
    judge: Arc<dyn ObjectiveJudge>,
    executor: Arc<ToolExecutor>,
    max_retries: u32,
) -> Orchestrator {
    let components = EngineComponents {
        resolver: Arc::new(StaticResolver {
            devices: devices.into_iter().map(String::from).collect(),
        }),
        selector: Arc::new(StaticSelector { steps }),
        oracle,
        judge,
        executor,
        report_llm: None,
        learning: None,
        insight_llm: None,
    };
    Orchestrator::new(
        components,
        &OrchestratorSection {
            max_retries,
            fan_out_limit: 4,
            session_timeout_secs: 0,
        },
    )
}

fn device<'a>(session: &'a InvestigationSession, name: &str) -> &'a DeviceInvestigation {
    session.device(name).expect("device missing from session")
}

#[tokio::test]
async fn test_single_device_happy_path() {
    let oracle = Arc::new(CountingOracle::new());
    let orch = orchestrator(
        vec!["pe-1"],
        3,
        oracle.clone(),
        Arc::new(SeqJudge::new(vec![("pe-1", vec![met()])])),
        probe_executor(vec![]),
        2,
    );

    let session = orch.submit_session("check pe-1").await.unwrap();

    assert_eq!(session.phase, SessionPhase::Done);
    assert_eq!(session.objective, ObjectiveStatus::Achieved);
    assert_eq!(session.current_retries, 0);
    assert_eq!(session.assessor_notes.as_deref(), Some("objective met"));

    let pe1 = device(&session, "pe-1");
    assert_eq!(pe1.step_outcomes.len(), 3);
    assert!(pe1.step_outcomes.iter().all(|o| o.has_success()));
    assert!(pe1.limitations.is_none());
    assert!(pe1.resolved);

    assert!(!session.summary.as_deref().unwrap_or("").is_empty());
    assert_eq!(oracle.count_for("objective for pe-1"), 3);
}

#[tokio::test]
async fn test_forced_acceptance_after_exhausted_retries() {
    // 永不满意 + max_retries = 2：恰好 3 个执行轮次后仍到达 Done
    let oracle = Arc::new(CountingOracle::new());
    let orch = orchestrator(
        vec!["pe-1"],
        1,
        oracle.clone(),
        Arc::new(NeverSatisfiedJudge),
        probe_executor(vec![]),
        2,
    );

    let session = orch.submit_session("check pe-1").await.unwrap();

    assert_eq!(session.phase, SessionPhase::Done);
    assert_eq!(session.objective, ObjectiveStatus::Achieved);
    assert_eq!(session.current_retries, 2);
    assert!(session
        .assessor_notes
        .as_deref()
        .unwrap()
        .contains("max retries"));

    // 每个执行轮次 1 步 -> oracle 被问恰好 3 次
    assert_eq!(oracle.count_for("objective for pe-1"), 3);

    // 历史单调：三轮的 outcome 全部保留，attempt 递增
    let pe1 = device(&session, "pe-1");
    assert_eq!(pe1.step_outcomes.len(), 3);
    for attempt in 0..3 {
        assert_eq!(pe1.outcomes_for_attempt(attempt), 1);
    }
    assert!(pe1.resolution.as_deref().unwrap().contains("max retries"));
}

#[tokio::test]
async fn test_device_isolation_one_failing_one_healthy() {
    // edge-2 的所有工具调用都失败；edge-1 不受影响，会话照常到达 Reporting
    let oracle = Arc::new(CountingOracle::new());
    let orch = orchestrator(
        vec!["edge-1", "edge-2"],
        2,
        oracle,
        Arc::new(LimitationAwareJudge),
        probe_executor(vec!["edge-2"]),
        2,
    );

    let session = orch.submit_session("check the edge").await.unwrap();

    assert_eq!(session.phase, SessionPhase::Done);
    assert_eq!(session.objective, ObjectiveStatus::Achieved);

    let healthy = device(&session, "edge-1");
    assert_eq!(healthy.step_outcomes.len(), 2);
    assert!(healthy.step_outcomes.iter().all(|o| o.has_success()));
    assert!(healthy.limitations.is_none());
    assert_eq!(healthy.resolution.as_deref(), Some("objective met"));

    let failing = device(&session, "edge-2");
    assert!(failing.limitations.is_some());
    assert!(failing
        .step_outcomes
        .iter()
        .all(|o| !o.has_success() && !o.invocations.is_empty()));
    assert!(failing.resolution.as_deref().unwrap().contains("limitations"));

    assert!(!session.summary.unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_targets_only_unmet_devices() {
    // 第一轮评估：a 达成、b 未达成；第二轮评估：b 达成。
    // a 定案后不得再被调查：其 oracle 调用数停在第一轮。
    let oracle = Arc::new(CountingOracle::new());
    let judge = SeqJudge::new(vec![
        ("a", vec![met()]),
        ("b", vec![unmet("focus on the uplink interface"), met()]),
    ]);
    let orch = orchestrator(
        vec!["a", "b"],
        2,
        oracle.clone(),
        Arc::new(judge),
        probe_executor(vec![]),
        2,
    );

    let session = orch.submit_session("check a and b").await.unwrap();

    assert_eq!(session.phase, SessionPhase::Done);
    assert_eq!(session.current_retries, 1);

    // a 只跑了第一轮（2 步），b 跑了两轮（4 步）
    assert_eq!(oracle.count_for("objective for a"), 2);
    assert_eq!(oracle.count_for("objective for b"), 4);

    let a = device(&session, "a");
    let b = device(&session, "b");
    assert_eq!(a.step_outcomes.len(), 2);
    assert_eq!(b.step_outcomes.len(), 4);
    assert_eq!(b.outcomes_for_attempt(0), 2);
    assert_eq!(b.outcomes_for_attempt(1), 2);
    // 历史单调：重试追加而非覆盖
    assert_eq!(a.outcomes_for_attempt(0), 2);
    assert!(b.resolved && a.resolved);
}

#[tokio::test]
async fn test_cancellation_preserves_partial_results() {
    // 第二次 oracle 调用后触发取消：第一步的结果保留，会话以 Cancelled 终态收尾
    let cancel = CancellationToken::new();
    let oracle = Arc::new(CountingOracle::cancelling(2, cancel.clone()));
    let orch = orchestrator(
        vec!["pe-1"],
        3,
        oracle,
        Arc::new(NeverSatisfiedJudge),
        probe_executor(vec![]),
        2,
    );

    let session = orch
        .submit_with_cancel("check pe-1", cancel)
        .await
        .unwrap();

    assert_eq!(session.phase, SessionPhase::Cancelled);
    assert_eq!(session.objective, ObjectiveStatus::Unknown);
    assert_eq!(session.current_retries, 0);

    let pe1 = device(&session, "pe-1");
    // 第一步已完成并保留；后续步骤未执行
    assert!(!pe1.step_outcomes.is_empty());
    assert!(pe1.step_outcomes.len() < 3);
    assert!(pe1.step_outcomes[0].has_success());
    assert!(pe1.limitations.as_deref().unwrap().contains("cancelled"));

    let summary = session.summary.unwrap();
    assert!(summary.contains("cancelled"));
}

#[tokio::test]
async fn test_invalid_target_fails_fast() {
    struct EmptyResolver;

    #[async_trait]
    impl TargetResolver for EmptyResolver {
        async fn resolve(
            &self,
            user_query: &str,
            _learnings: Option<&str>,
        ) -> Result<Vec<TargetDevice>, InvestigateError> {
            Err(InvestigateError::InvalidTarget(user_query.to_string()))
        }
    }

    let components = EngineComponents {
        resolver: Arc::new(EmptyResolver),
        selector: Arc::new(StaticSelector { steps: 1 }),
        oracle: Arc::new(CountingOracle::new()),
        judge: Arc::new(NeverSatisfiedJudge),
        executor: probe_executor(vec![]),
        report_llm: None,
        learning: None,
        insight_llm: None,
    };
    let orch = Orchestrator::new(
        components,
        &OrchestratorSection {
            max_retries: 2,
            fan_out_limit: 4,
            session_timeout_secs: 0,
        },
    );

    let err = orch.submit("reboot the toaster").await.unwrap_err();
    assert!(matches!(err, InvestigateError::InvalidTarget(_)));
}
