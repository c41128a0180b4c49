//! 流水线过程事件：每个阶段结束时发出一次，供 CLI / HTTP 层展示进度

use serde::Serialize;

use crate::core::OrchestratorState;

/// 阶段事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// 状态迁移
    StateChanged {
        from: OrchestratorState,
        to: OrchestratorState,
    },
    /// 规划完成
    Planned {
        step_count: usize,
        tools: Vec<String>,
        duration_ms: f64,
    },
    /// 首轮执行完成
    Executed {
        attempted: usize,
        succeeded: usize,
        duration_ms: f64,
    },
    /// 一次校验完成
    Verified {
        status: String,
        completeness_score: f64,
        duration_ms: f64,
    },
    /// 一次重试完成
    Retried {
        attempt: u32,
        steps: Vec<u32>,
        duration_ms: f64,
    },
    /// 运行结束
    Finished {
        state: OrchestratorState,
        duration_ms: f64,
    },
}

impl PipelineEvent {
    /// 事件对应的阶段名（用于结构化日志字段）
    pub fn phase(&self) -> &'static str {
        match self {
            PipelineEvent::StateChanged { .. } => "transition",
            PipelineEvent::Planned { .. } => "planning",
            PipelineEvent::Executed { .. } => "executing",
            PipelineEvent::Verified { .. } => "verifying",
            PipelineEvent::Retried { .. } => "retrying",
            PipelineEvent::Finished { .. } => "finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_json() {
        let ev = PipelineEvent::Retried {
            attempt: 1,
            steps: vec![2, 3],
            duration_ms: 12.5,
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "retried");
        assert_eq!(v["steps"], serde_json::json!([2, 3]));
        assert_eq!(ev.phase(), "retrying");
    }
}
