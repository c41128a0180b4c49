//! Planner：自然语言任务 → ExecutionPlan
//!
//! 把全部工具 Schema 与一个示例拼进 prompt，要求 LLM 输出符合 ExecutionPlan 的 JSON；
//! 解析后修复工具名（别名表）、丢弃无法解析的步骤并重新编号。任何失败都降级为空计划。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crate::agents::prompts::planner_prompt;
use crate::agents::{Agent, AgentStatus};
use crate::core::{AgentContext, AgentState};
use crate::llm::{generate_structured, LlmClient, LlmRequest, RetryConfig};
use crate::plan::ExecutionPlan;
use crate::tools::ToolRegistry;

/// 规划用的采样温度（偏低以保证计划稳定）
pub const PLANNER_TEMPERATURE: f32 = 0.3;

/// 常见的工具名变体（小写匹配）
const TOOL_ALIASES: &[(&str, &str)] = &[
    ("github_tool", "github"),
    ("weather_tool", "weather"),
    ("news_tool", "news"),
    ("git", "github"),
    ("openweathermap", "weather"),
    ("newsapi", "news"),
];

fn resolve_tool(tool: &str, available: &HashSet<&str>) -> Option<String> {
    if available.contains(tool) {
        return Some(tool.to_string());
    }
    let lower = tool.to_lowercase();
    TOOL_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, target)| *target)
        .filter(|target| available.contains(target))
        .map(str::to_string)
}

/// 校验并修复计划：
/// - 工具名不在注册表中时按别名表映射，仍无法解析的步骤丢弃
/// - 依赖被丢弃步骤的步骤一并丢弃
/// - 幸存步骤按原顺序重编号为 1..N，depends_on 随之改写；指向从未存在的步骤号的依赖直接移除
pub fn validate_plan(mut plan: ExecutionPlan, available_tools: &[String]) -> ExecutionPlan {
    let available: HashSet<&str> = available_tools.iter().map(String::as_str).collect();
    let original_numbers: HashSet<u32> = plan.steps.iter().map(|s| s.step_number).collect();

    let mut dropped: HashSet<u32> = HashSet::new();
    let mut kept = Vec::with_capacity(plan.steps.len());
    for mut step in plan.steps.drain(..) {
        match resolve_tool(&step.tool, &available) {
            Some(tool) => {
                if tool != step.tool {
                    tracing::debug!(from = %step.tool, to = %tool, "Mapped tool alias");
                }
                step.tool = tool;
                kept.push(step);
            }
            None => {
                tracing::warn!(step = step.step_number, tool = %step.tool, "Dropping step with unknown tool");
                dropped.insert(step.step_number);
            }
        }
    }

    // 级联：依赖链上任何一环被丢弃，后继步骤都无法执行
    loop {
        let before = kept.len();
        kept.retain(|step| {
            let blocked = step.depends_on.iter().any(|d| dropped.contains(d));
            if blocked {
                tracing::warn!(step = step.step_number, "Dropping step whose dependency was dropped");
                dropped.insert(step.step_number);
            }
            !blocked
        });
        if kept.len() == before {
            break;
        }
    }

    let mut renumber: HashMap<u32, u32> = HashMap::new();
    for (i, step) in kept.iter().enumerate() {
        renumber.entry(step.step_number).or_insert(i as u32 + 1);
    }

    for (i, step) in kept.iter_mut().enumerate() {
        let old_number = step.step_number;
        step.step_number = i as u32 + 1;
        step.depends_on = step
            .depends_on
            .iter()
            .filter_map(|dep| match renumber.get(dep) {
                Some(new) => Some(*new),
                None => {
                    if !original_numbers.contains(dep) {
                        tracing::warn!(step = old_number, dependency = dep, "Removing dependency on nonexistent step");
                    }
                    None
                }
            })
            .collect();
    }

    plan.steps = kept;
    plan
}

/// 规划失败时的空计划
fn fallback_plan(task: &str, error: &str) -> ExecutionPlan {
    let preview: String = task.chars().take(200).collect();
    ExecutionPlan::empty(
        format!("Failed to fully understand task: {preview}"),
        format!("Unable to create plan due to error: {error}"),
    )
}

/// Planner：持有 LLM 与工具注册表
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    retry: RetryConfig,
    temperature: f32,
    max_tokens: u32,
    status: AgentStatus,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            llm,
            registry,
            retry: RetryConfig::default(),
            temperature: PLANNER_TEMPERATURE,
            max_tokens: 4096,
            status: AgentStatus::new(),
        }
    }

    /// 输出不合格时的重新生成策略
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn status(&self) -> AgentStatus {
        self.status.clone()
    }

    /// 生成计划；失败时返回空计划（不返回 Err）
    pub async fn plan(&self, task: &str, ctx: &AgentContext) -> ExecutionPlan {
        self.status.set(AgentState::Thinking);
        let start = Instant::now();
        let preview: String = task.chars().take(100).collect();
        tracing::info!(correlation_id = %ctx.correlation_id, agent = self.name(), task = %preview, "Planning task");

        let request = LlmRequest::new(planner_prompt(task, &self.registry.schemas()))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        match generate_structured::<ExecutionPlan>(self.llm.as_ref(), &self.retry, &request).await {
            Ok(plan) => {
                let plan = validate_plan(plan, &self.registry.tool_names());
                tracing::info!(
                    correlation_id = %ctx.correlation_id,
                    agent = self.name(),
                    step_count = plan.steps.len(),
                    tools_needed = ?plan.tools_needed(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Created plan"
                );
                self.status.set(AgentState::Complete);
                plan
            }
            Err(e) => {
                tracing::error!(correlation_id = %ctx.correlation_id, agent = self.name(), error = %e, "Planning failed");
                self.status.set(AgentState::Error);
                fallback_plan(task, &e.to_string())
            }
        }
    }
}

impl Agent for Planner {
    fn name(&self) -> &'static str {
        "planner"
    }

    fn role(&self) -> &'static str {
        "Converts natural language tasks into structured execution plans"
    }

    fn state(&self) -> AgentState {
        self.status.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::plan::PlanStep;
    use crate::tools::EchoTool;

    fn tools() -> Vec<String> {
        vec!["github".into(), "news".into(), "weather".into()]
    }

    #[test]
    fn test_alias_repair_and_resequence() {
        let plan = ExecutionPlan::new(
            "t",
            vec![
                PlanStep::new(1, "Weather_Tool", "get_current_weather"),
                PlanStep::new(2, "jira", "create_issue"),
                PlanStep::new(3, "git", "search_repositories"),
            ],
        );
        let plan = validate_plan(plan, &tools());
        let summary: Vec<(u32, &str)> = plan.steps.iter().map(|s| (s.step_number, s.tool.as_str())).collect();
        assert_eq!(summary, vec![(1, "weather"), (2, "github")]);
    }

    #[test]
    fn test_dependencies_rewritten_through_renumbering() {
        let plan = ExecutionPlan::new(
            "t",
            vec![
                PlanStep::new(1, "jira", "x"),
                PlanStep::new(2, "github", "search_repositories"),
                PlanStep::new(3, "news", "search_news").depends_on([2]),
            ],
        );
        let plan = validate_plan(plan, &tools());
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].step_number, 2);
        assert_eq!(plan.steps[1].depends_on, vec![1]);
    }

    #[test]
    fn test_dependency_on_dropped_step_cascades() {
        let plan = ExecutionPlan::new(
            "t",
            vec![
                PlanStep::new(1, "jira", "x"),
                PlanStep::new(2, "github", "get_user").depends_on([1]),
                PlanStep::new(3, "news", "search_news").depends_on([2]),
                PlanStep::new(4, "weather", "get_forecast"),
            ],
        );
        let plan = validate_plan(plan, &tools());
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, "weather");
        assert_eq!(plan.steps[0].step_number, 1);
    }

    #[test]
    fn test_dependency_on_nonexistent_step_removed() {
        let plan = ExecutionPlan::new(
            "t",
            vec![PlanStep::new(1, "weather", "get_forecast").depends_on([7])],
        );
        let plan = validate_plan(plan, &tools());
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.steps[0].depends_on.is_empty());
    }

    #[tokio::test]
    async fn test_plan_falls_back_to_empty_on_malformed_output() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let llm = Arc::new(MockLlmClient::always(Ok("I'd rather not".into())));
        let planner = Planner::new(llm.clone(), Arc::new(registry)).with_retry(RetryConfig::immediate(3));

        let plan = planner.plan("do something", &AgentContext::new("do something")).await;
        assert!(plan.is_empty());
        assert!(plan.task_understanding.starts_with("Failed to fully understand task"));
        assert_eq!(llm.call_count(), 3);
        assert_eq!(planner.state(), AgentState::Error);
    }

    #[tokio::test]
    async fn test_plan_llm_error_falls_back() {
        let registry = Arc::new(ToolRegistry::new());
        let llm = Arc::new(MockLlmClient::always(Err(LlmError::ApiError("down".into()))));
        let planner = Planner::new(llm, registry).with_retry(RetryConfig::immediate(1));
        let plan = planner.plan("x", &AgentContext::default()).await;
        assert!(plan.expected_output.contains("down"));
    }

    #[tokio::test]
    async fn test_plan_uses_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let planner = Planner::new(Arc::new(MockLlmClient::new()), Arc::new(registry));
        let plan = planner.plan("hello there", &AgentContext::default()).await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].tool, "echo");
        assert_eq!(planner.state(), AgentState::Complete);
    }
}
