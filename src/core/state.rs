//! 状态定义：编排器状态机与各 Agent 的运行状态
//!
//! OrchestratorState 通过 watch 通道对外暴露，CLI / HTTP 层轮询即可展示进度。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 编排器状态机；Idle 为初始状态，Complete / Error 为单次运行的终态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Planning,
    Executing,
    Verifying,
    Retrying,
    Complete,
    Error,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Planning => "planning",
            OrchestratorState::Executing => "executing",
            OrchestratorState::Verifying => "verifying",
            OrchestratorState::Retrying => "retrying",
            OrchestratorState::Complete => "complete",
            OrchestratorState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorState::Complete | OrchestratorState::Error)
    }

    /// 进度提示文案（CLI spinner 使用）
    pub fn progress_label(&self) -> &'static str {
        match self {
            OrchestratorState::Planning => "Planning...",
            OrchestratorState::Executing => "Executing steps...",
            OrchestratorState::Verifying => "Verifying results...",
            OrchestratorState::Retrying => "Retrying failed steps...",
            _ => "Processing...",
        }
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个 Agent 的运行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Thinking,
    Executing,
    Waiting,
    Complete,
    Error,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Thinking => "thinking",
            AgentState::Executing => "executing",
            AgentState::Waiting => "waiting",
            AgentState::Complete => "complete",
            AgentState::Error => "error",
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        AgentState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(OrchestratorState::Complete.is_terminal());
        assert!(OrchestratorState::Error.is_terminal());
        assert!(!OrchestratorState::Retrying.is_terminal());
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let s = serde_json::to_string(&OrchestratorState::Verifying).unwrap();
        assert_eq!(s, "\"verifying\"");
        assert_eq!(AgentState::default().as_str(), "idle");
    }
}
