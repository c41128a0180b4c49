//! 三个协作 Agent：Planner（规划）、Executor（执行）、Verifier（校验与汇总）

pub mod executor;
pub mod planner;
pub mod prompts;
pub mod verifier;

use std::sync::{Arc, RwLock};

use crate::core::AgentState;

pub use executor::Executor;
pub use planner::{validate_plan, Planner};
pub use verifier::{fallback_summary, verify_results, VerificationReport, Verifier};

/// Agent 的公共外观：名称、职责、当前状态
pub trait Agent {
    fn name(&self) -> &'static str;

    fn role(&self) -> &'static str;

    fn state(&self) -> AgentState;
}

/// 可共享的 Agent 状态单元，Orchestrator 借此在运行中读取各 Agent 状态
#[derive(Debug, Clone, Default)]
pub struct AgentStatus(Arc<RwLock<AgentState>>);

impl AgentStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, state: AgentState) {
        let mut guard = self.0.write().unwrap_or_else(|e| e.into_inner());
        *guard = state;
    }

    pub fn get(&self) -> AgentState {
        *self.0.read().unwrap_or_else(|e| e.into_inner())
    }
}
