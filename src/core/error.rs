//! 流水线错误类型
//!
//! AgentError 覆盖规划、工具调度、LLM、配置与编排阶段；除 Orchestration 外，
//! 其余错误都会在各自的 Agent 内部被降级为状态字段（空计划 / 失败的 StepResult / 兜底摘要）。

use thiserror::Error;

use crate::llm::LlmError;

/// 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    /// 注册表中不存在该工具；available 为当前已注册的工具名
    #[error("Tool '{name}' not found. Available: {available:?}")]
    ToolNotFound { name: String, available: Vec<String> },

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    ConfigError(String),

    /// 编排阶段未被捕获的失败，Orchestrator 会把它转为 ERROR 状态
    #[error("Orchestration failed: {0}")]
    Orchestration(String),
}

impl AgentError {
    /// 是否属于单步工具失败（Executor 将其记为失败的 StepResult 而不是向上传播）
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            AgentError::ToolNotFound { .. }
                | AgentError::ToolTimeout(_)
                | AgentError::ToolExecutionFailed(_)
        )
    }
}
