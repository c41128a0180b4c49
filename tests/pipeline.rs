//! 流水线集成测试：脚本化 LLM + 计数工具驱动 Orchestrator

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use ops_assistant::core::{Orchestrator, OrchestratorState, PipelineEvent, NO_PLAN_MESSAGE};
use ops_assistant::llm::{LlmError, MockLlmClient, RetryConfig};
use ops_assistant::plan::OutputStatus;
use ops_assistant::tools::{CacheKey, ResultCache, Tool, ToolAction, ToolRegistry, ToolResult};

/// 按调用次序返回预置成败的工具；超出脚本后一律成功
struct CountingTool {
    name: &'static str,
    outcomes: Vec<bool>,
    calls: AtomicUsize,
}

impl CountingTool {
    fn new(name: &'static str, outcomes: Vec<bool>) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcomes,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "counting test tool"
    }

    fn actions(&self) -> Vec<ToolAction> {
        vec![ToolAction::new("run", "run once", vec![])]
    }

    async fn execute(&self, _action: &str, _parameters: &Map<String, Value>) -> ToolResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.outcomes.get(n).copied().unwrap_or(true) {
            ToolResult::success(json!({ "tool": self.name, "call": n }))
        } else {
            ToolResult::failure(format!("{} unavailable", self.name))
        }
    }
}

/// 通过共享缓存取数的工具
struct CachedTool {
    cache: Arc<ResultCache>,
    fetches: AtomicUsize,
}

#[async_trait]
impl Tool for CachedTool {
    fn name(&self) -> &str {
        "cached"
    }

    fn description(&self) -> &str {
        "cache-backed test tool"
    }

    fn actions(&self) -> Vec<ToolAction> {
        vec![ToolAction::new("run", "run once", vec![])]
    }

    async fn execute(&self, action: &str, parameters: &Map<String, Value>) -> ToolResult {
        let key = CacheKey::new("cached.run").arg(action).kwargs_from(parameters);
        let fetches = &self.fetches;
        match self
            .cache
            .get_or_fetch(&key, None, false, || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok::<Value, String>(json!({ "value": 42 }))
            })
            .await
        {
            Ok(fetched) => ToolResult::success(fetched.value).with_cached(fetched.cached),
            Err(e) => ToolResult::failure(e),
        }
    }
}

fn registry(tools: &[Arc<dyn Tool>]) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register_arc(tool.clone());
    }
    Arc::new(registry)
}

fn plan_json(steps: Value) -> Result<String, LlmError> {
    Ok(json!({
        "task_understanding": "test task",
        "steps": steps,
        "expected_output": "test output"
    })
    .to_string())
}

fn step(n: u32, tool: &str, depends_on: &[u32]) -> Value {
    json!({
        "step_number": n,
        "tool": tool,
        "action": "run",
        "parameters": {},
        "reasoning": "test",
        "depends_on": depends_on,
    })
}

fn orchestrator(llm: MockLlmClient, registry: Arc<ToolRegistry>, max_retries: u32) -> Orchestrator {
    Orchestrator::new(Arc::new(llm), registry, max_retries).with_planner_retry(RetryConfig::immediate(3))
}

#[tokio::test]
async fn scenario_a_independent_steps_succeed() {
    let a = CountingTool::new("alpha", vec![]);
    let b = CountingTool::new("beta", vec![]);
    let llm = MockLlmClient::with_responses(vec![plan_json(json!([step(1, "alpha", &[]), step(2, "beta", &[])]))]);
    let orch = orchestrator(llm, registry(&[a.clone(), b.clone()]), 2);

    let result = orch.run("two independent lookups", None).await;
    assert_eq!(result.state, OrchestratorState::Complete);
    let output = result.output.expect("output");
    assert_eq!(output.status, OutputStatus::Success);
    assert_eq!(output.execution_details.completeness_score, 1.0);
    assert_eq!(output.execution_details.steps_total, 2);
    assert!(output.data.contains_key("alpha_run"));
    assert!(output.data.contains_key("beta_run"));
    assert!(output.errors.is_empty());
    assert_eq!((a.calls(), b.calls()), (1, 1));
}

#[tokio::test]
async fn scenario_b_failed_dependency_skipped_then_retried() {
    let a = CountingTool::new("alpha", vec![false, true]);
    let b = CountingTool::new("beta", vec![]);
    let c = CountingTool::new("gamma", vec![]);
    let llm = MockLlmClient::with_responses(vec![plan_json(json!([
        step(1, "alpha", &[]),
        step(2, "beta", &[1]),
        step(3, "gamma", &[]),
    ]))]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orch = orchestrator(llm, registry(&[a.clone(), b.clone(), c.clone()]), 2).with_events(tx);

    let result = orch.run("dependent lookups", None).await;
    assert_eq!(result.state, OrchestratorState::Complete);

    // 第一次校验：尝试了 1 与 3，完成度 0.5
    let mut verified = Vec::new();
    let mut retried = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        match ev {
            PipelineEvent::Verified { completeness_score, .. } => verified.push(completeness_score),
            PipelineEvent::Retried { steps, .. } => retried.push(steps),
            _ => {}
        }
    }
    assert_eq!(verified, vec![0.5, 1.0]);
    assert_eq!(retried, vec![vec![1]]);

    let output = result.output.expect("output");
    assert_eq!(output.status, OutputStatus::Success);
    assert_eq!(output.execution_details.steps_total, 2);
    assert_eq!(b.calls(), 0);
    assert_eq!(a.calls(), 2);
    assert_eq!(c.calls(), 1);
}

#[tokio::test]
async fn scenario_c_malformed_plan_output_is_error() {
    let a = CountingTool::new("alpha", vec![]);
    let llm = MockLlmClient::always(Ok("Sure! I will get right on that.".to_string()));
    let orch = orchestrator(llm, registry(&[a.clone()]), 2);

    let result = orch.run("anything", None).await;
    assert_eq!(result.state, OrchestratorState::Error);
    assert!(result.error.as_deref().unwrap_or("").contains(NO_PLAN_MESSAGE));
    assert!(result.output.is_none());
    let plan = result.plan.expect("plan attached");
    assert!(plan.steps.is_empty());
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn scenario_d_retry_budget_exhausted_stays_partial() {
    let a = CountingTool::new("alpha", vec![false, false, false, false]);
    let b = CountingTool::new("beta", vec![]);
    let llm = MockLlmClient::with_responses(vec![plan_json(json!([step(1, "alpha", &[]), step(2, "beta", &[])]))]);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let orch = orchestrator(llm, registry(&[a.clone(), b.clone()]), 2).with_events(tx);

    let result = orch.run("flaky lookup", None).await;
    assert_eq!(result.state, OrchestratorState::Complete);
    assert!(result.error.is_none());
    let output = result.output.expect("output");
    assert_eq!(output.status, OutputStatus::Partial);
    assert_eq!(output.errors, vec!["alpha: alpha unavailable".to_string()]);
    assert_eq!(a.calls(), 3);
    assert_eq!(b.calls(), 1);

    let retries = std::iter::from_fn(|| rx.try_recv().ok())
        .filter(|ev| matches!(ev, PipelineEvent::Retried { .. }))
        .count();
    assert_eq!(retries, 2);
}

#[tokio::test]
async fn plan_with_only_unknown_tools_never_executes() {
    let a = CountingTool::new("alpha", vec![]);
    let llm = MockLlmClient::with_responses(vec![plan_json(json!([step(1, "jira", &[]), step(2, "slack", &[1])]))]);
    let orch = orchestrator(llm, registry(&[a.clone()]), 2);

    let result = orch.run("file a ticket", None).await;
    assert_eq!(result.state, OrchestratorState::Error);
    assert_eq!(result.error.as_deref(), Some(NO_PLAN_MESSAGE));
    assert_eq!(a.calls(), 0);
    assert_eq!(orch.agent_states()["executor"], "idle");
}

#[tokio::test]
async fn mostly_failed_run_does_not_retry() {
    let a = CountingTool::new("alpha", vec![false]);
    let b = CountingTool::new("beta", vec![]);
    let llm = MockLlmClient::with_responses(vec![plan_json(json!([step(1, "alpha", &[]), step(2, "beta", &[1])]))]);
    let orch = orchestrator(llm, registry(&[a.clone(), b.clone()]), 2);

    let result = orch.run("chained lookup", None).await;
    assert_eq!(result.state, OrchestratorState::Complete);
    let output = result.output.expect("output");
    assert_eq!(output.status, OutputStatus::Failed);
    assert_eq!(output.execution_details.steps_total, 1);
    assert!(output.summary.starts_with("Echo from Mock:"));
    assert_eq!((a.calls(), b.calls()), (1, 0));
}

#[tokio::test]
async fn zero_retry_budget_leaves_partial() {
    let a = CountingTool::new("alpha", vec![false]);
    let b = CountingTool::new("beta", vec![]);
    let llm = MockLlmClient::with_responses(vec![plan_json(json!([step(1, "alpha", &[]), step(2, "beta", &[])]))]);
    let orch = orchestrator(llm, registry(&[a.clone(), b.clone()]), 0);

    let result = orch.run("no retries", None).await;
    assert_eq!(result.output.expect("output").status, OutputStatus::Partial);
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn summary_llm_failure_uses_fallback() {
    let a = CountingTool::new("alpha", vec![]);
    let llm = MockLlmClient::with_responses(vec![
        plan_json(json!([step(1, "alpha", &[])])),
        Err(LlmError::ApiError("summary backend down".into())),
    ]);
    let orch = orchestrator(llm, registry(&[a]), 2);

    let output = orch.run("single lookup", None).await.output.expect("output");
    assert_eq!(output.status, OutputStatus::Success);
    assert!(output.summary.starts_with("Task: single lookup Successfully retrieved all requested information."));
}

#[tokio::test]
async fn concurrent_runs_share_cache() {
    let cache = Arc::new(ResultCache::default());
    let tool = Arc::new(CachedTool {
        cache: cache.clone(),
        fetches: AtomicUsize::new(0),
    });
    let registry = registry(&[tool.clone()]);

    let first = orchestrator(
        MockLlmClient::with_responses(vec![plan_json(json!([step(1, "cached", &[])]))]),
        registry.clone(),
        2,
    );
    let out = first.run("first", None).await.output.expect("output");
    assert_eq!(out.execution_details.cached_results, 0);

    let runs = (0..3).map(|i| {
        let registry = registry.clone();
        tokio::spawn(async move {
            let orch = orchestrator(
                MockLlmClient::with_responses(vec![plan_json(json!([step(1, "cached", &[])]))]),
                registry,
                2,
            );
            orch.run(&format!("run {i}"), None).await
        })
    });
    for handle in runs.collect::<Vec<_>>() {
        let result = handle.await.expect("join");
        assert_eq!(result.output.expect("output").execution_details.cached_results, 1);
    }

    assert_eq!(tool.fetches.load(Ordering::SeqCst), 1);
    let metrics = cache.metrics();
    assert_eq!((metrics.hits, metrics.misses, metrics.size), (3, 1, 1));
}
