//! Verifier：完成度评分、状态分级，并汇总为 FinalOutput
//!
//! 摘要优先由 LLM 生成；LLM 失败时使用确定性的模板摘要。

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::agents::prompts::summary_prompt;
use crate::agents::{Agent, AgentStatus};
use crate::core::{AgentContext, AgentState};
use crate::llm::{LlmClient, LlmError, LlmRequest};
use crate::plan::{
    ExecutionDetails, ExecutionPlan, FinalOutput, OutputStatus, StepResult, VerificationResult,
    VerificationStatus,
};

/// 摘要的采样温度
pub const SUMMARY_TEMPERATURE: f32 = 0.5;

const MAX_MISSING: usize = 5;
const MAX_ISSUES: usize = 5;
const MAX_SUGGESTIONS: usize = 3;
const MAX_RETRY_STEPS: usize = 3;
const MAX_HIGHLIGHTS: usize = 3;

/// 按已尝试步骤的成功率评分
pub fn verify_results(results: &[StepResult]) -> VerificationResult {
    if results.is_empty() {
        return VerificationResult {
            status: VerificationStatus::Failed,
            completeness_score: 0.0,
            missing_data: vec!["No steps were executed".to_string()],
            quality_issues: vec!["Empty execution results".to_string()],
            suggestions: vec![
                "Verify the task can be understood and appropriate tools are available".to_string(),
            ],
            retry_steps: Vec::new(),
        };
    }

    let succeeded = results.iter().filter(|r| r.succeeded()).count();
    let completeness = succeeded as f64 / results.len() as f64;

    let mut missing_data = Vec::new();
    let mut quality_issues = Vec::new();
    let mut failed_steps = Vec::new();
    for r in results {
        if !r.succeeded() {
            missing_data.push(format!(
                "Step {} ({}.{}) failed: {}",
                r.step_number,
                r.tool,
                r.action,
                r.tool_result.error.as_deref().unwrap_or("unknown error")
            ));
            failed_steps.push(r.step_number);
        } else if r.tool_result.is_empty_success() {
            quality_issues.push(format!("Step {} returned empty data", r.step_number));
        }
    }

    let mut suggestions = Vec::new();
    if !failed_steps.is_empty() {
        suggestions.push(format!("Consider retrying failed steps: {failed_steps:?}"));
    }
    if completeness < 1.0 {
        suggestions.push("Some data may be incomplete - results are partial".to_string());
    }

    missing_data.truncate(MAX_MISSING);
    quality_issues.truncate(MAX_ISSUES);
    suggestions.truncate(MAX_SUGGESTIONS);
    failed_steps.truncate(MAX_RETRY_STEPS);

    VerificationResult {
        status: VerificationStatus::from_score(completeness),
        completeness_score: completeness,
        missing_data,
        quality_issues,
        suggestions,
        retry_steps: failed_steps,
    }
}

/// 成功且数据非空的步骤结果，键为 "<tool>_<action>"，按步骤顺序排列（同键后者覆盖前者，位置不变）
pub fn collect_data(results: &[StepResult]) -> Map<String, Value> {
    let mut data = Map::new();
    for r in results {
        if !r.succeeded() {
            continue;
        }
        if let Some(value) = r.tool_result.data.as_ref().filter(|v| !v.is_null()) {
            data.insert(r.data_key(), value.clone());
        }
    }
    data
}

/// LLM 不可用时的模板摘要
pub fn fallback_summary(task: &str, data: &Map<String, Value>, status: VerificationStatus) -> String {
    let mut parts = vec![format!("Task: {task}")];
    parts.push(
        match status {
            VerificationStatus::Complete => "Successfully retrieved all requested information.",
            VerificationStatus::Partial => "Partially completed. Some information could not be retrieved.",
            VerificationStatus::Failed => "Failed to complete the task.",
        }
        .to_string(),
    );

    for (key, value) in data.iter().take(MAX_HIGHLIGHTS) {
        let Some(obj) = value.as_object() else {
            parts.push(format!("{key}: {}", display(value)));
            continue;
        };
        if let Some(city) = obj.get("city") {
            parts.push(format!(
                "Weather for {}: {}°",
                display(city),
                obj.get("temperature").map(display).unwrap_or_else(|| "null".to_string())
            ));
        } else if let Some(repos) = obj.get("repositories").and_then(|v| v.as_array()) {
            parts.push(format!("Found {} repositories", repos.len()));
        } else if let Some(articles) = obj.get("articles").and_then(|v| v.as_array()) {
            parts.push(format!("Found {} news articles", articles.len()));
        } else {
            parts.push(format!("{key}: {} fields", obj.len()));
        }
    }

    parts.join(" ")
}

/// 字符串去掉引号，其他值按 JSON 文本
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 一次校验的完整产物
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub verification: VerificationResult,
    pub output: FinalOutput,
}

/// Verifier：持有 LLM（只用于摘要）
pub struct Verifier {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    max_tokens: u32,
    status: AgentStatus,
}

impl Verifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            temperature: SUMMARY_TEMPERATURE,
            max_tokens: 4096,
            status: AgentStatus::new(),
        }
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

    async fn generate_summary(&self, task: &str, data: &Map<String, Value>) -> Result<String, LlmError> {
        let request = LlmRequest::new(summary_prompt(task, data))
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        let text = self.llm.generate(&request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    /// 汇总为 FinalOutput
    pub async fn format_output(
        &self,
        task: &str,
        results: &[StepResult],
        verification: &VerificationResult,
        ctx: &AgentContext,
    ) -> FinalOutput {
        let data = collect_data(results);

        let summary = match self.generate_summary(task, &data).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(correlation_id = %ctx.correlation_id, agent = self.name(), error = %e, "Failed to generate LLM summary");
                fallback_summary(task, &data, verification.status)
            }
        };

        let errors = results
            .iter()
            .filter(|r| !r.succeeded())
            .filter_map(|r| r.tool_result.error.as_ref().map(|e| format!("{}: {}", r.tool, e)))
            .collect();

        let total_time_ms: f64 = results.iter().map(|r| r.tool_result.execution_time_ms).sum();
        let steps_succeeded = results.iter().filter(|r| r.succeeded()).count();
        let execution_details = ExecutionDetails {
            steps_total: results.len(),
            steps_succeeded,
            steps_failed: results.len() - steps_succeeded,
            total_time_ms: (total_time_ms * 100.0).round() / 100.0,
            cached_results: results.iter().filter(|r| r.tool_result.cached).count(),
            completeness_score: verification.completeness_score,
            task_id: ctx.task_id.clone(),
        };

        FinalOutput {
            task: task.to_string(),
            status: OutputStatus::from(verification.status),
            summary,
            data,
            execution_details,
            errors,
        }
    }

    /// 校验并汇总（plan 目前只用于日志）
    pub async fn run(
        &self,
        plan: &ExecutionPlan,
        results: &[StepResult],
        task: &str,
        ctx: &AgentContext,
    ) -> VerificationReport {
        self.status.set(AgentState::Thinking);
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            agent = self.name(),
            planned = plan.steps.len(),
            attempted = results.len(),
            "Verifying execution results"
        );

        let verification = verify_results(results);
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            agent = self.name(),
            status = verification.status.as_str(),
            completeness = %format!("{:.0}%", verification.completeness_score * 100.0),
            "Verification complete"
        );

        let output = self.format_output(task, results, &verification, ctx).await;
        self.status.set(AgentState::Complete);
        VerificationReport { verification, output }
    }
}

impl Agent for Verifier {
    fn name(&self) -> &'static str {
        "verifier"
    }

    fn role(&self) -> &'static str {
        "Validates results and produces final structured output"
    }

    fn state(&self) -> AgentState {
        self.status.get()
    }
}
