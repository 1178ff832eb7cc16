//! 设备调查器：单台设备跑完整个计划
//!
//! 步骤严格按计划顺序串行执行（后续步骤可能依赖前面结果，设备内不并行）；
//! 每步先问 oracle 得到工具调用序列，再逐条执行并记录 result / error。
//! 单步失败或无可用工具只记入 limitations，循环继续，绝不让一个坏步骤毁掉整台设备的调查。
//! 取消令牌在每个挂起点检查，取消时返回已有的部分结果，不回滚。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{DeviceInvestigation, StepOutcome, ToolInvocation};
use crate::oracle::ReasoningOracle;
use crate::tools::ToolExecutor;

/// 设备调查器：持有 oracle 与工具执行器，可被多个 worker 共享
pub struct DeviceInvestigator {
    oracle: Arc<dyn ReasoningOracle>,
    executor: Arc<ToolExecutor>,
}

impl DeviceInvestigator {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, executor: Arc<ToolExecutor>) -> Self {
        Self { oracle, executor }
    }

    /// 对单台设备执行一轮计划；attempt 为当前重试轮次，写入每条 StepOutcome。
    /// 永不失败：一切步骤级问题都记录进状态后返回。
    pub async fn run(
        &self,
        mut inv: DeviceInvestigation,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> DeviceInvestigation {
        let steps = inv.plan_steps.clone();
        let feedback = inv.retry_feedback.clone();

        tracing::info!(
            device = %inv.device_name,
            attempt,
            steps = steps.len(),
            "Starting device investigation"
        );

        'steps: for (idx, instruction) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                inv.note_limitation(format!("attempt {attempt}: cancelled before step {idx}"));
                break;
            }

            // select 只传出结果，取消分支不在 select 内改状态
            let proposed = tokio::select! {
                _ = cancel.cancelled() => None,
                r = self.oracle.propose(
                    instruction,
                    &inv.objective,
                    &inv.step_outcomes,
                    feedback.as_deref(),
                ) => Some(r),
            };
            let Some(proposed) = proposed else {
                inv.note_limitation(format!("attempt {attempt}: cancelled during step {idx}"));
                break;
            };

            let mut outcome = StepOutcome::new(idx, attempt, instruction.clone());

            match proposed {
                Err(e) => {
                    tracing::warn!(device = %inv.device_name, step = idx, "Oracle failed: {e}");
                    inv.note_limitation(format!("step {idx}: oracle failed: {e}"));
                }
                Ok(calls) if calls.is_empty() => {
                    tracing::debug!(device = %inv.device_name, step = idx, "No applicable tool");
                    inv.note_limitation(format!("step {idx}: no applicable tool"));
                }
                Ok(calls) => {
                    for call in calls {
                        let mut invocation = ToolInvocation::pending(call.function, call.params);
                        let executed = tokio::select! {
                            _ = cancel.cancelled() => None,
                            r = self.executor.execute(
                                &inv.device_name,
                                &invocation.function,
                                invocation.params.clone(),
                            ) => Some(r),
                        };
                        match executed {
                            Some(Ok(value)) => {
                                invocation.result = Some(value);
                                outcome.invocations.push(invocation);
                            }
                            Some(Err(e)) => {
                                inv.note_limitation(format!(
                                    "step {idx}: {} failed: {e}",
                                    invocation.function
                                ));
                                invocation.error = Some(e);
                                outcome.invocations.push(invocation);
                            }
                            None => {
                                // 未执行的调用两字段均空；部分结果入库后结束本轮
                                outcome.invocations.push(invocation);
                                inv.step_outcomes.push(outcome);
                                inv.note_limitation(format!(
                                    "attempt {attempt}: cancelled during step {idx}"
                                ));
                                break 'steps;
                            }
                        }
                    }
                }
            }

            inv.step_outcomes.push(outcome);
        }

        tracing::info!(
            device = %inv.device_name,
            attempt,
            outcomes = inv.step_outcomes.len(),
            "Device investigation finished"
        );
        inv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{InvestigateError, ToolError};
    use crate::oracle::ProposedCall;
    use crate::tools::{CannedTool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 第 fail_at 步返回解析错误，其余步骤给一条 probe 调用
    struct FlakyOracle {
        fail_at: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReasoningOracle for FlakyOracle {
        async fn propose(
            &self,
            _instruction: &str,
            _objective: &str,
            prior: &[StepOutcome],
            _feedback: Option<&str>,
        ) -> Result<Vec<ProposedCall>, InvestigateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prior.len() == self.fail_at {
                return Err(InvestigateError::JsonParse("bad output".to_string()));
            }
            Ok(vec![ProposedCall {
                function: "probe".to_string(),
                params: json!({}),
            }])
        }
    }

    fn executor() -> Arc<ToolExecutor> {
        let mut registry = ToolRegistry::new();
        registry.register(CannedTool::new("probe", "probe", json!({"status": "ok"})));
        Arc::new(ToolExecutor::new(registry, 5))
    }

    fn investigation(steps: usize) -> DeviceInvestigation {
        DeviceInvestigation::new(
            "pe-1",
            "pe",
            "mx204",
            "health check",
            "device_health_check",
            (0..steps).map(|i| format!("step {i}")).collect(),
        )
    }

    #[tokio::test]
    async fn test_all_steps_run_in_order() {
        let oracle = Arc::new(FlakyOracle {
            fail_at: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let investigator = DeviceInvestigator::new(oracle.clone(), executor());
        let result = investigator
            .run(investigation(3), 0, &CancellationToken::new())
            .await;

        assert_eq!(result.step_outcomes.len(), 3);
        for (i, outcome) in result.step_outcomes.iter().enumerate() {
            assert_eq!(outcome.step_index, i);
            assert!(outcome.has_success());
        }
        assert!(result.limitations.is_none());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_oracle_failure_does_not_abort_later_steps() {
        let oracle = Arc::new(FlakyOracle {
            fail_at: 1,
            calls: AtomicUsize::new(0),
        });
        let investigator = DeviceInvestigator::new(oracle, executor());
        let result = investigator
            .run(investigation(3), 0, &CancellationToken::new())
            .await;

        // 三步全部记录；第 1 步为空调用并留下 limitation
        assert_eq!(result.step_outcomes.len(), 3);
        assert!(result.step_outcomes[1].invocations.is_empty());
        assert!(result.step_outcomes[2].has_success());
        assert!(result.limitations.unwrap().contains("oracle failed"));
    }

    #[tokio::test]
    async fn test_tool_error_recorded_on_invocation() {
        struct BrokenTool;

        #[async_trait]
        impl crate::tools::DeviceTool for BrokenTool {
            fn name(&self) -> &str {
                "probe"
            }
            fn description(&self) -> &str {
                "always fails"
            }
            async fn query(
                &self,
                _device: &str,
                _args: serde_json::Value,
            ) -> Result<serde_json::Value, ToolError> {
                Err(ToolError::Communication("link down".to_string()))
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(BrokenTool);
        let investigator = DeviceInvestigator::new(
            Arc::new(FlakyOracle {
                fail_at: usize::MAX,
                calls: AtomicUsize::new(0),
            }),
            Arc::new(ToolExecutor::new(registry, 5)),
        );

        let result = investigator
            .run(investigation(2), 0, &CancellationToken::new())
            .await;
        assert_eq!(result.step_outcomes.len(), 2);
        let inv = &result.step_outcomes[0].invocations[0];
        assert!(inv.result.is_none());
        assert!(matches!(inv.error, Some(ToolError::Communication(_))));
        assert!(result.limitations.unwrap().contains("probe failed"));
    }

    #[tokio::test]
    async fn test_cancel_preserves_partial_outcomes() {
        let token = CancellationToken::new();
        token.cancel();
        let investigator = DeviceInvestigator::new(
            Arc::new(FlakyOracle {
                fail_at: usize::MAX,
                calls: AtomicUsize::new(0),
            }),
            executor(),
        );
        let result = investigator.run(investigation(3), 1, &token).await;
        assert!(result.step_outcomes.is_empty());
        assert!(result.limitations.unwrap().contains("cancelled"));
    }
}
