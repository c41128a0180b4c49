//! 任务上下文：一次运行内在各 Agent 之间共享的只读信息

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 8 位短 ID（task_id / correlation_id 共用）
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 任务上下文：原始任务、关联 ID、开始时间与附加元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub task_id: String,
    pub original_task: String,
    pub correlation_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
}

impl AgentContext {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task_id: short_id(),
            original_task: task.into(),
            correlation_id: short_id(),
            metadata: HashMap::new(),
            started_at: Utc::now(),
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 自 started_at 起经过的毫秒数
    pub fn elapsed_ms(&self) -> f64 {
        let elapsed = Utc::now() - self.started_at;
        elapsed.num_microseconds().unwrap_or(0) as f64 / 1000.0
    }
}

impl Default for AgentContext {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_short_and_distinct() {
        let a = AgentContext::new("weather in Paris");
        let b = AgentContext::new("weather in Paris");
        assert_eq!(a.task_id.len(), 8);
        assert_eq!(a.correlation_id.len(), 8);
        assert_ne!(a.task_id, b.task_id);
        assert!(a.elapsed_ms() >= 0.0);
    }
}
