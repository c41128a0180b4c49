//! 核心编排层：错误、状态机、任务上下文、阶段事件、组件构建与主控编排

pub mod builder;
pub mod context;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod state;

pub use builder::{create_agent_builder, create_llm_from_config, AgentBuilder, AgentComponents};
pub use context::{short_id, AgentContext};
pub use error::AgentError;
pub use events::PipelineEvent;
pub use orchestrator::{Orchestrator, OrchestratorResult, DEFAULT_MAX_RETRIES, NO_PLAN_MESSAGE};
pub use state::{AgentState, OrchestratorState};
