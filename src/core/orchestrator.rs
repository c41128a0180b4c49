//! 编排器：Planning → Executing → Verifying →（Retrying）→ Complete 状态机
//!
//! 每次 run 独占一个 Executor（及其 StepResult 序列）；ToolRegistry 与 ResultCache 通过 Arc 在并发运行间共享。
//! 状态经 watch 通道对外暴露，阶段事件经可选的 mpsc 通道发出。run 永不返回 Err。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::agents::{Agent, AgentStatus, Executor, Planner, VerificationReport, Verifier};
use crate::core::{AgentContext, AgentError, AgentState, OrchestratorState, PipelineEvent};
use crate::llm::{LlmClient, RetryConfig};
use crate::plan::{ExecutionPlan, FinalOutput, StepResult, VerificationStatus};
use crate::tools::ToolRegistry;

/// 默认重试轮数
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// 规划得到空计划时的错误信息
pub const NO_PLAN_MESSAGE: &str = "Could not create an execution plan for this task";

/// 一次运行的终态结果
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorResult {
    pub task_id: String,
    pub state: OrchestratorState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<FinalOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: f64,
}

impl OrchestratorResult {
    pub fn is_success(&self) -> bool {
        self.state == OrchestratorState::Complete
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn succeeded(results: &[StepResult]) -> usize {
    results.iter().filter(|r| r.succeeded()).count()
}

/// 编排器：持有 Planner / Verifier，每次运行新建 Executor
pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    planner: Planner,
    verifier: Verifier,
    executor_status: AgentStatus,
    max_retries: u32,
    state_tx: watch::Sender<OrchestratorState>,
    events: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>, max_retries: u32) -> Self {
        let (state_tx, _) = watch::channel(OrchestratorState::Idle);
        Self {
            planner: Planner::new(llm.clone(), registry.clone()),
            verifier: Verifier::new(llm),
            registry,
            executor_status: AgentStatus::new(),
            max_retries,
            state_tx,
            events: None,
        }
    }

    /// 规划阶段对不合格 LLM 输出的重新生成策略
    pub fn with_planner_retry(mut self, retry: RetryConfig) -> Self {
        self.planner = self.planner.with_retry(retry);
        self
    }

    pub fn with_planner_temperature(mut self, temperature: f32) -> Self {
        self.planner = self.planner.with_temperature(temperature);
        self
    }

    pub fn with_summary_temperature(mut self, temperature: f32) -> Self {
        self.verifier = self.verifier.with_temperature(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.planner = self.planner.with_max_tokens(max_tokens);
        self.verifier = self.verifier.with_max_tokens(max_tokens);
        self
    }

    /// 阶段事件接收端
    pub fn with_events(mut self, events: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn state(&self) -> OrchestratorState {
        *self.state_tx.borrow()
    }

    /// 订阅状态变化（CLI 进度展示 / HTTP 状态查询）
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state_tx.subscribe()
    }

    /// 编排器与各 Agent 的当前状态
    pub fn agent_states(&self) -> BTreeMap<&'static str, &'static str> {
        BTreeMap::from([
            ("orchestrator", self.state().as_str()),
            (self.planner.name(), self.planner.state().as_str()),
            ("executor", self.executor_status.get().as_str()),
            (self.verifier.name(), self.verifier.state().as_str()),
        ])
    }

    fn emit(&self, ctx: &AgentContext, event: PipelineEvent) {
        tracing::debug!(correlation_id = %ctx.correlation_id, phase = event.phase(), event = ?event, "Pipeline event");
        if let Some(tx) = &self.events {
            // 接收端已关闭时忽略
            let _ = tx.send(event);
        }
    }

    fn transition(&self, to: OrchestratorState, ctx: &AgentContext) {
        let from = self.state_tx.send_replace(to);
        if from != to {
            tracing::info!(correlation_id = %ctx.correlation_id, from = %from, to = %to, "State transition");
            self.emit(ctx, PipelineEvent::StateChanged { from, to });
        }
    }

    async fn verify(
        &self,
        plan: &ExecutionPlan,
        results: &[StepResult],
        task: &str,
        ctx: &AgentContext,
    ) -> VerificationReport {
        let start = Instant::now();
        let report = self.verifier.run(plan, results, task, ctx).await;
        self.emit(
            ctx,
            PipelineEvent::Verified {
                status: report.verification.status.as_str().to_string(),
                completeness_score: report.verification.completeness_score,
                duration_ms: elapsed_ms(start),
            },
        );
        report
    }

    /// 运行一个任务；所有失败都体现在结果的 state / error 中
    pub async fn run(&self, task: &str, ctx: Option<AgentContext>) -> OrchestratorResult {
        let ctx = ctx.unwrap_or_else(|| AgentContext::new(task));
        let start = Instant::now();
        self.state_tx.send_replace(OrchestratorState::Idle);
        self.executor_status.set(AgentState::Idle);

        let preview: String = task.chars().take(100).collect();
        tracing::info!(correlation_id = %ctx.correlation_id, task_id = %ctx.task_id, task = %preview, "Starting orchestration");

        let mut plan = None;
        let outcome = self.drive(task, &ctx, &mut plan).await;
        let execution_time_ms = elapsed_ms(start);

        let (state, output, error) = match outcome {
            Ok(output) => (OrchestratorState::Complete, Some(output), None),
            Err(e) => {
                let message = match e {
                    AgentError::PlanningFailed(msg) => msg,
                    other => other.to_string(),
                };
                tracing::error!(correlation_id = %ctx.correlation_id, error = %message, "Orchestration failed");
                (OrchestratorState::Error, None, Some(message))
            }
        };
        self.transition(state, &ctx);
        self.emit(
            &ctx,
            PipelineEvent::Finished {
                state,
                duration_ms: execution_time_ms,
            },
        );
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            state = %state,
            status = output.as_ref().map(|o| o.status.as_str()).unwrap_or("none"),
            duration_ms = execution_time_ms,
            "Orchestration finished"
        );

        OrchestratorResult {
            task_id: ctx.task_id.clone(),
            state,
            output,
            plan,
            error,
            execution_time_ms,
        }
    }

    async fn drive(
        &self,
        task: &str,
        ctx: &AgentContext,
        plan_slot: &mut Option<ExecutionPlan>,
    ) -> Result<FinalOutput, AgentError> {
        self.transition(OrchestratorState::Planning, ctx);
        let start = Instant::now();
        let plan = plan_slot.insert(self.planner.plan(task, ctx).await);
        self.emit(
            ctx,
            PipelineEvent::Planned {
                step_count: plan.steps.len(),
                tools: plan.tools_needed(),
                duration_ms: elapsed_ms(start),
            },
        );
        if plan.is_empty() {
            return Err(AgentError::PlanningFailed(NO_PLAN_MESSAGE.to_string()));
        }

        self.transition(OrchestratorState::Executing, ctx);
        let start = Instant::now();
        let mut executor =
            Executor::new(self.registry.clone()).with_status(self.executor_status.clone());
        let results = executor.run(plan, ctx).await;
        self.emit(
            ctx,
            PipelineEvent::Executed {
                attempted: results.len(),
                succeeded: succeeded(results),
                duration_ms: elapsed_ms(start),
            },
        );

        self.transition(OrchestratorState::Verifying, ctx);
        let mut report = self.verify(plan, executor.results(), task, ctx).await;

        let mut attempt = 0;
        while report.verification.status == VerificationStatus::Partial && attempt < self.max_retries {
            let steps = report.verification.retry_steps.clone();
            if steps.is_empty() {
                break;
            }
            attempt += 1;
            self.transition(OrchestratorState::Retrying, ctx);
            tracing::info!(
                correlation_id = %ctx.correlation_id,
                attempt,
                max_retries = self.max_retries,
                steps = ?steps,
                "Retrying failed steps"
            );

            let start = Instant::now();
            executor.retry_steps(&steps, plan, ctx).await;
            self.emit(
                ctx,
                PipelineEvent::Retried {
                    attempt,
                    steps,
                    duration_ms: elapsed_ms(start),
                },
            );

            self.transition(OrchestratorState::Verifying, ctx);
            report = self.verify(plan, executor.results(), task, ctx).await;
        }

        Ok(report.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::EchoTool;

    fn echo_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_mock_pipeline_completes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), echo_registry(), DEFAULT_MAX_RETRIES)
            .with_events(tx);

        let result = orchestrator.run("say hello", None).await;
        assert_eq!(result.state, OrchestratorState::Complete);
        assert!(result.error.is_none());
        let output = result.output.unwrap();
        assert!(output.data.contains_key("echo_say"));
        assert_eq!(orchestrator.state(), OrchestratorState::Complete);

        let mut phases = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            phases.push(ev.phase());
        }
        assert!(phases.contains(&"planning"));
        assert!(phases.contains(&"executing"));
        assert_eq!(phases.last(), Some(&"finished"));
        assert!(!phases.contains(&"retrying"));
    }

    #[tokio::test]
    async fn test_agent_states_after_run() {
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), echo_registry(), 0);
        assert_eq!(orchestrator.agent_states()["orchestrator"], "idle");
        orchestrator.run("ping", None).await;
        let states = orchestrator.agent_states();
        assert_eq!(states["orchestrator"], "complete");
        assert_eq!(states["planner"], "complete");
        assert_eq!(states["executor"], "complete");
        assert_eq!(states["verifier"], "complete");
    }

    #[tokio::test]
    async fn test_subscriber_sees_final_state() {
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), echo_registry(), 0);
        let rx = orchestrator.subscribe();
        let ctx = AgentContext::new("ping").with_task_id("abc12345");
        let result = orchestrator.run("ping", Some(ctx)).await;
        assert_eq!(result.task_id, "abc12345");
        assert_eq!(*rx.borrow(), OrchestratorState::Complete);
    }
}
