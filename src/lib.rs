//! ops-assistant - 多智能体运维助手
//!
//! 模块划分：
//! - **agents**: Planner（规划）、Executor（执行）、Verifier（校验与汇总）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排状态机、错误、上下文、阶段事件、组件构建
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与结构化输出
//! - **observability**: 日志初始化
//! - **plan**: 计划、步骤结果与最终输出的数据模型
//! - **tools**: 工具注册表、结果缓存与 weather / github / news / echo 工具

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod tools;

pub use crate::core::{Orchestrator, OrchestratorResult, OrchestratorState};
