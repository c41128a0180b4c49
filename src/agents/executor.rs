//! Executor：按顺序执行计划步骤，遵守依赖关系，支持按步骤号定向重试
//!
//! 每个被尝试的步骤恰好调用一次注册表；调度层的任何错误（工具不存在、超时等）都记为失败的 StepResult，
//! 不会从 Executor 向外传播。

use std::collections::HashSet;
use std::sync::Arc;

use crate::agents::{Agent, AgentStatus};
use crate::core::{AgentContext, AgentState};
use crate::plan::{ExecutionPlan, PlanStep, StepResult};
use crate::tools::{ToolRegistry, ToolResult};

/// Executor：独占本次运行的 StepResult 序列
pub struct Executor {
    registry: Arc<ToolRegistry>,
    results: Vec<StepResult>,
    status: AgentStatus,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            results: Vec::new(),
            status: AgentStatus::new(),
        }
    }

    /// 与外部共享状态单元（Orchestrator 读取 agent_states 用）
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<StepResult> {
        self.results
    }

    /// 调用一次注册表；所有调度错误转为失败结果
    async fn invoke(&self, step: &PlanStep, ctx: &AgentContext) -> StepResult {
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            agent = self.name(),
            step = step.step_number,
            tool = %step.tool,
            action = %step.action,
            "Executing step"
        );

        let tool_result = match self
            .registry
            .execute(&step.tool, &step.action, &step.parameters)
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_tool_failure() => {
                tracing::warn!(correlation_id = %ctx.correlation_id, step = step.step_number, error = %e, "Step dispatch failed");
                ToolResult::failure(e.to_string())
            }
            Err(e) => {
                tracing::error!(correlation_id = %ctx.correlation_id, step = step.step_number, error = %e, "Unexpected dispatch error");
                ToolResult::failure(e.to_string())
            }
        };

        if tool_result.success {
            tracing::info!(
                correlation_id = %ctx.correlation_id,
                agent = self.name(),
                step = step.step_number,
                duration_ms = tool_result.execution_time_ms,
                cached = tool_result.cached,
                "Step completed"
            );
        } else {
            tracing::warn!(
                correlation_id = %ctx.correlation_id,
                agent = self.name(),
                step = step.step_number,
                error = tool_result.error.as_deref().unwrap_or(""),
                "Step failed"
            );
        }
        StepResult::new(step, tool_result)
    }

    /// 执行全部步骤：依赖未全部成功的步骤跳过且不产生结果
    pub async fn run(&mut self, plan: &ExecutionPlan, ctx: &AgentContext) -> &[StepResult] {
        self.status.set(AgentState::Executing);
        self.results.clear();
        tracing::info!(correlation_id = %ctx.correlation_id, agent = self.name(), steps = plan.steps.len(), "Starting execution");

        let mut completed: HashSet<u32> = HashSet::new();
        for step in &plan.steps {
            if !step.depends_on.iter().all(|d| completed.contains(d)) {
                tracing::warn!(
                    correlation_id = %ctx.correlation_id,
                    agent = self.name(),
                    step = step.step_number,
                    depends_on = ?step.depends_on,
                    "Skipping step: dependencies not met"
                );
                continue;
            }

            let result = self.invoke(step, ctx).await;
            if result.succeeded() {
                completed.insert(step.step_number);
            }
            self.results.push(result);
        }

        self.status.set(AgentState::Complete);
        let succeeded = self.results.iter().filter(|r| r.succeeded()).count();
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            agent = self.name(),
            succeeded,
            attempted = self.results.len(),
            "Execution complete"
        );
        &self.results
    }

    /// 按调用方给出的顺序重试指定步骤号（不再检查依赖）；新结果原位替换旧结果，没有旧结果则追加。
    /// 计划中不存在的步骤号忽略。返回本次新产生的结果。
    pub async fn retry_steps(
        &mut self,
        step_numbers: &[u32],
        plan: &ExecutionPlan,
        ctx: &AgentContext,
    ) -> Vec<StepResult> {
        self.status.set(AgentState::Executing);
        let mut fresh = Vec::with_capacity(step_numbers.len());

        for &number in step_numbers {
            let Some(step) = plan.step(number) else {
                tracing::warn!(correlation_id = %ctx.correlation_id, agent = self.name(), step = number, "Retry requested for unknown step");
                continue;
            };
            tracing::info!(correlation_id = %ctx.correlation_id, agent = self.name(), step = number, "Retrying step");

            let result = self.invoke(step, ctx).await;
            match self.results.iter_mut().find(|r| r.step_number == number) {
                Some(existing) => *existing = result.clone(),
                None => self.results.push(result.clone()),
            }
            fresh.push(result);
        }

        self.status.set(AgentState::Complete);
        fresh
    }
}

impl Agent for Executor {
    fn name(&self) -> &'static str {
        "executor"
    }

    fn role(&self) -> &'static str {
        "Executes plan steps by calling tools and APIs"
    }

    fn state(&self) -> AgentState {
        self.status.get()
    }
}
