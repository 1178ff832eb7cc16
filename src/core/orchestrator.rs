//! 调查编排器：主控状态机
//!
//! Validating -> Planning -> Executing(fan-out) -> Assessing -> {Executing(重试) | Reporting} -> Done。
//! 每次用户请求一个会话、一条编排循环；重试只重跑未定案设备；
//! current_retries 每次回跳严格加一且不超过 max_retries，评估器在额度耗尽时强制接受，
//! 因此循环至多 max_retries + 1 个执行轮次必然到达终态。
//! 取消（外部或会话超时）让在途 worker 尽快停下，已记录的结果保留，会话以 Cancelled 终态收尾。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, OrchestratorSection};
use crate::core::{
    DeviceInvestigation, DeviceInvestigator, FanOutCoordinator, InvestigateError,
    InvestigationSession, LlmJudge, LlmTargetResolver, ObjectiveAssessor, ObjectiveJudge,
    ObjectiveStatus, SessionPhase, TargetResolver,
};
use crate::learning::LearningStore;
use crate::llm::{LlmClient, OpenAiClient};
use crate::oracle::{LlmOracle, ReasoningOracle};
use crate::plans::{LlmPlanSelector, PlanRepository, PlanSelector};
use crate::report::ReportSynthesizer;
use crate::tools::{
    DeviceFactsTool, InterfaceStatusTool, RestconfClient, RoutingSummaryTool, ToolExecutor,
    ToolRegistry,
};

/// 编排器的全部协作组件；测试用脚本化实现替换任意一个
pub struct EngineComponents {
    pub resolver: Arc<dyn TargetResolver>,
    pub selector: Arc<dyn PlanSelector>,
    pub oracle: Arc<dyn ReasoningOracle>,
    pub judge: Arc<dyn ObjectiveJudge>,
    pub executor: Arc<ToolExecutor>,
    /// 最终报告用的 LLM；None 则只出 Markdown
    pub report_llm: Option<Arc<dyn LlmClient>>,
    pub learning: Option<Arc<LearningStore>>,
    /// 洞见提炼用的 LLM；None 则跳过提炼
    pub insight_llm: Option<Arc<dyn LlmClient>>,
}

/// 调查编排器：一次 submit 驱动一个会话走完状态机
pub struct Orchestrator {
    resolver: Arc<dyn TargetResolver>,
    selector: Arc<dyn PlanSelector>,
    investigator: Arc<DeviceInvestigator>,
    fanout: FanOutCoordinator,
    assessor: ObjectiveAssessor,
    reporter: ReportSynthesizer,
    learning: Option<Arc<LearningStore>>,
    insight_llm: Option<Arc<dyn LlmClient>>,
    max_retries: u32,
    session_timeout_secs: u64,
}

impl Orchestrator {
    pub fn new(components: EngineComponents, cfg: &OrchestratorSection) -> Self {
        Self {
            resolver: components.resolver,
            selector: components.selector,
            investigator: Arc::new(DeviceInvestigator::new(
                components.oracle,
                components.executor,
            )),
            fanout: FanOutCoordinator::new(cfg.fan_out_limit),
            assessor: ObjectiveAssessor::new(components.judge),
            reporter: ReportSynthesizer::new(components.report_llm),
            learning: components.learning,
            insight_llm: components.insight_llm,
            max_retries: cfg.max_retries,
            session_timeout_secs: cfg.session_timeout_secs,
        }
    }

    /// 会话入口：对调用方同步，内部并发。返回最终报告文本；
    /// 取消/超时以类型化错误区分于正常完成（完整会话可用 submit_session 拿到）。
    pub async fn submit(&self, user_query: &str) -> Result<String, InvestigateError> {
        let session = self.submit_session(user_query).await?;
        if session.phase == SessionPhase::Cancelled {
            return Err(InvestigateError::Cancelled);
        }
        Ok(session.summary.unwrap_or_default())
    }

    /// 同 submit，但返回完整会话（含全部历史），并施加配置的会话超时
    pub async fn submit_session(
        &self,
        user_query: &str,
    ) -> Result<InvestigationSession, InvestigateError> {
        let cancel = CancellationToken::new();
        let timer = if self.session_timeout_secs > 0 {
            let token = cancel.clone();
            let secs = self.session_timeout_secs;
            Some(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                tracing::warn!("Session timeout after {secs}s, cancelling in-flight work");
                token.cancel();
            }))
        } else {
            None
        };

        let result = self.submit_with_cancel(user_query, cancel).await;
        if let Some(timer) = timer {
            timer.abort();
        }
        result
    }

    /// 带外部取消令牌执行一个会话
    pub async fn submit_with_cancel(
        &self,
        user_query: &str,
        cancel: CancellationToken,
    ) -> Result<InvestigationSession, InvestigateError> {
        let mut session = InvestigationSession::new(user_query, self.max_retries);
        tracing::info!(session = %session.id, "Submitting investigation: {user_query}");

        let learnings = self.learning.as_ref().and_then(|s| s.load_context());

        // Validating：解析目标设备；无匹配即终止，不重试
        session.phase = SessionPhase::Validating;
        let targets = self
            .resolver
            .resolve(user_query, learnings.as_deref())
            .await?;
        if targets.is_empty() {
            return Err(InvestigateError::InvalidTarget(user_query.to_string()));
        }

        // Planning：逐设备选计划，建初始状态（无反馈、无历史）
        session.phase = SessionPhase::Planning;
        for target in &targets {
            let plan = self
                .selector
                .select(user_query, target, learnings.as_deref())
                .await?;
            tracing::info!(device = %target.name, intent = %plan.intent, "Planned investigation");
            session.devices.push(DeviceInvestigation::new(
                &target.name,
                &target.role,
                &target.profile,
                plan.objective,
                plan.intent,
                plan.steps,
            ));
        }

        // Executing / Assessing 循环
        loop {
            if cancel.is_cancelled() {
                return Ok(self.finish_cancelled(session).await);
            }

            session.phase = SessionPhase::Executing;
            let attempt = session.current_retries;
            // 只重跑未定案设备，已定案的不再进 fan-out 批次
            let jobs: Vec<DeviceInvestigation> = session
                .devices
                .iter()
                .filter(|d| !d.resolved)
                .cloned()
                .collect();
            tracing::info!(attempt, devices = jobs.len(), "Executing fan-out pass");
            let finished = self
                .fanout
                .run_all(Arc::clone(&self.investigator), jobs, attempt, &cancel)
                .await;
            for (_, investigation) in finished {
                session.merge_device(investigation);
            }

            if cancel.is_cancelled() {
                return Ok(self.finish_cancelled(session).await);
            }

            session.phase = SessionPhase::Assessing;
            let assessment = self.assessor.assess(&session, learnings.as_deref()).await;
            for (name, reason) in &assessment.resolutions {
                if let Some(device) = session.device_mut(name) {
                    device.resolve(reason.clone());
                }
            }
            session.assessor_notes = Some(assessment.notes.clone());

            if assessment.objective_achieved {
                session.objective = ObjectiveStatus::Achieved;
                break;
            }

            session.objective = ObjectiveStatus::NotAchieved;
            session.current_retries += 1;
            for (name, feedback) in assessment.feedback {
                if let Some(device) = session.device_mut(&name) {
                    device.retry_feedback = Some(feedback);
                }
            }
            tracing::info!(
                retry = session.current_retries,
                max = session.max_retries,
                "Objective not achieved, retrying unmet devices"
            );
        }

        // Reporting：合成最终报告后会话即为终态
        session.phase = SessionPhase::Reporting;
        let summary = self.reporter.synthesize(&session).await;
        session.summary = Some(summary);
        session.phase = SessionPhase::Done;
        tracing::info!(
            session = %session.id,
            retries = session.current_retries,
            "Investigation done"
        );

        // 跨会话学习：报告存档 + 洞见提炼，失败不影响会话
        if let Some(store) = &self.learning {
            if let Some(summary) = &session.summary {
                store.record_report(&session.user_query, summary);
            }
            if let Some(llm) = &self.insight_llm {
                crate::learning::extract_and_record(llm, store, &session).await;
            }
        }

        Ok(session)
    }

    /// 取消收尾：保留已记录的结果，Markdown 报告注明取消，会话进入 Cancelled 终态
    async fn finish_cancelled(&self, mut session: InvestigationSession) -> InvestigationSession {
        tracing::warn!(session = %session.id, "Session cancelled, preserving partial results");
        session.phase = SessionPhase::Cancelled;
        if session.assessor_notes.is_none() {
            session.assessor_notes = Some("session cancelled before completion".to_string());
        }
        let summary = self.reporter.synthesize(&session).await;
        session.summary = Some(summary);
        session
    }
}

/// 根据配置构建 OpenAI 兼容 LLM 客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let api_key = std::env::var(&cfg.llm.api_key_env).ok();
    tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
    Arc::new(OpenAiClient::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        api_key.as_deref(),
    ))
}

/// 组装完整编排器：LLM、RESTCONF 工具、计划仓库与学习存储全部从配置构建
pub fn create_orchestrator(cfg: &AppConfig) -> Result<Orchestrator, InvestigateError> {
    let llm = create_llm_from_config(cfg);

    let endpoints: HashMap<String, String> = cfg
        .inventory
        .devices
        .iter()
        .filter_map(|d| d.endpoint.clone().map(|e| (d.name.clone(), e)))
        .collect();
    let token = std::env::var(&cfg.tools.device_token_env).ok();
    let restconf = Arc::new(RestconfClient::new(
        endpoints,
        cfg.tools.restconf_base_path.clone(),
        cfg.tools.tool_timeout_secs,
        token,
    ));
    let mut registry = ToolRegistry::new();
    registry.register(DeviceFactsTool::new(Arc::clone(&restconf)));
    registry.register(InterfaceStatusTool::new(Arc::clone(&restconf)));
    registry.register(RoutingSummaryTool::new(restconf));
    let executor = Arc::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs));

    let repo = match &cfg.plans.dir {
        Some(dir) => PlanRepository::load(dir)?,
        None => PlanRepository::from_default()?,
    };
    let repo = Arc::new(repo);

    let workspace = cfg
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("workspace"));
    let learning = if cfg.learning.enabled {
        Some(Arc::new(LearningStore::new(
            &workspace,
            cfg.learning.context_max_chars,
        )))
    } else {
        None
    };

    let components = EngineComponents {
        resolver: Arc::new(LlmTargetResolver::new(
            llm.clone(),
            cfg.inventory.devices.clone(),
        )),
        selector: Arc::new(LlmPlanSelector::new(
            llm.clone(),
            repo,
            cfg.plans.default_intent.clone(),
        )),
        oracle: Arc::new(LlmOracle::new(llm.clone(), executor.schema_json())),
        judge: Arc::new(LlmJudge::new(llm.clone())),
        executor,
        report_llm: Some(llm.clone()),
        learning,
        insight_llm: Some(llm),
    };

    Ok(Orchestrator::new(components, &cfg.orchestrator))
}
