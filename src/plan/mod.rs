//! 计划与结果数据模型
//!
//! ExecutionPlan / PlanStep 由 Planner 产出（同时用于生成给 LLM 的 JSON Schema），
//! StepResult 由 Executor 产出，VerificationResult / FinalOutput 由 Verifier 产出。

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tools::ToolResult;

/// 执行计划中的单个步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlanStep {
    /// 步骤序号，从 1 开始
    pub step_number: u32,
    /// 使用的工具名
    pub tool: String,
    /// 工具上的具体动作
    pub action: String,
    /// 动作参数
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// 为什么需要这一步
    #[serde(default)]
    pub reasoning: String,
    /// 依赖的步骤序号
    #[serde(default)]
    pub depends_on: Vec<u32>,
}

impl PlanStep {
    pub fn new(step_number: u32, tool: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            step_number,
            tool: tool.into(),
            action: action.into(),
            parameters: Map::new(),
            reasoning: String::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = u32>) -> Self {
        self.depends_on = deps.into_iter().collect();
        self
    }
}

/// Planner 输出的完整计划；steps 为空表示规划失败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionPlan {
    /// 对任务的理解
    pub task_understanding: String,
    /// 有序步骤
    pub steps: Vec<PlanStep>,
    /// 最终输出应包含的内容
    #[serde(default)]
    pub expected_output: String,
}

impl ExecutionPlan {
    pub fn new(task_understanding: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            task_understanding: task_understanding.into(),
            steps,
            expected_output: String::new(),
        }
    }

    /// 规划失败时的空计划
    pub fn empty(task_understanding: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            task_understanding: task_understanding.into(),
            steps: Vec::new(),
            expected_output: expected_output.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, step_number: u32) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    /// 计划中用到的工具（去重、按名排序）
    pub fn tools_needed(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|s| s.tool.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// 单步执行结果：Executor 每尝试一个步骤记录一条，重试时原位替换
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_number: u32,
    pub tool: String,
    pub action: String,
    pub tool_result: ToolResult,
    pub completed_at: DateTime<Utc>,
}

impl StepResult {
    pub fn new(step: &PlanStep, tool_result: ToolResult) -> Self {
        Self {
            step_number: step.step_number,
            tool: step.tool.clone(),
            action: step.action.clone(),
            tool_result,
            completed_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.tool_result.success
    }

    /// FinalOutput.data 中使用的键："<tool>_<action>"
    pub fn data_key(&self) -> String {
        format!("{}_{}", self.tool, self.action)
    }
}

/// 校验结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Complete,
    Partial,
    Failed,
}

impl VerificationStatus {
    /// 按完成度分级：>=0.9 complete，[0.5, 0.9) partial，其余 failed
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            VerificationStatus::Complete
        } else if score >= 0.5 {
            VerificationStatus::Partial
        } else {
            VerificationStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Complete => "complete",
            VerificationStatus::Partial => "partial",
            VerificationStatus::Failed => "failed",
        }
    }
}

/// 单次校验结果（不持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub completeness_score: f64,
    #[serde(default)]
    pub missing_data: Vec<String>,
    #[serde(default)]
    pub quality_issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub retry_steps: Vec<u32>,
}

/// 返回给调用方的总体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Success,
    Partial,
    Failed,
}

impl OutputStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStatus::Success => "success",
            OutputStatus::Partial => "partial",
            OutputStatus::Failed => "failed",
        }
    }
}

impl From<VerificationStatus> for OutputStatus {
    fn from(status: VerificationStatus) -> Self {
        match status {
            VerificationStatus::Complete => OutputStatus::Success,
            VerificationStatus::Partial => OutputStatus::Partial,
            VerificationStatus::Failed => OutputStatus::Failed,
        }
    }
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 执行统计
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionDetails {
    pub steps_total: usize,
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    pub total_time_ms: f64,
    pub cached_results: usize,
    pub completeness_score: f64,
    pub task_id: String,
}

/// 最终输出：一次运行的终态产物
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub task: String,
    pub status: OutputStatus,
    pub summary: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub execution_details: ExecutionDetails,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_thresholds() {
        assert_eq!(VerificationStatus::from_score(1.0), VerificationStatus::Complete);
        assert_eq!(VerificationStatus::from_score(0.9), VerificationStatus::Complete);
        assert_eq!(VerificationStatus::from_score(0.89), VerificationStatus::Partial);
        assert_eq!(VerificationStatus::from_score(0.5), VerificationStatus::Partial);
        assert_eq!(VerificationStatus::from_score(0.49), VerificationStatus::Failed);
        assert_eq!(VerificationStatus::from_score(0.0), VerificationStatus::Failed);
    }

    #[test]
    fn test_output_status_mapping() {
        assert_eq!(OutputStatus::from(VerificationStatus::Complete), OutputStatus::Success);
        assert_eq!(OutputStatus::from(VerificationStatus::Partial), OutputStatus::Partial);
        assert_eq!(OutputStatus::from(VerificationStatus::Failed), OutputStatus::Failed);
    }

    #[test]
    fn test_plan_deserializes_with_defaults() {
        let raw = r#"{
            "task_understanding": "weather",
            "steps": [{"step_number": 1, "tool": "weather", "action": "get_current_weather", "reasoning": "r"}],
            "expected_output": "temp"
        }"#;
        let plan: ExecutionPlan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert!(plan.steps[0].parameters.is_empty());
        assert!(plan.steps[0].depends_on.is_empty());
    }

    #[test]
    fn test_plan_missing_required_field_rejected() {
        let raw = r#"{"task_understanding": "x", "steps": [{"step_number": 1, "tool": "weather"}], "expected_output": ""}"#;
        assert!(serde_json::from_str::<ExecutionPlan>(raw).is_err());
    }

    #[test]
    fn test_tools_needed_dedup() {
        let plan = ExecutionPlan::new(
            "t",
            vec![
                PlanStep::new(1, "weather", "get_current_weather"),
                PlanStep::new(2, "github", "search_repositories"),
                PlanStep::new(3, "weather", "get_forecast"),
            ],
        );
        assert_eq!(plan.tools_needed(), vec!["github".to_string(), "weather".to_string()]);
        assert_eq!(plan.step(2).map(|s| s.tool.as_str()), Some("github"));
        assert!(plan.step(9).is_none());
    }
}
