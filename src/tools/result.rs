//! 工具调用的原始结果

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 工具调用结果：预期内的失败以 success=false 表达，而不是 Err
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub execution_time_ms: f64,
    #[serde(default)]
    pub cached: bool,
}

impl ToolResult {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time_ms: 0.0,
            cached: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time_ms: 0.0,
            cached: false,
        }
    }

    /// 由 Ok / Err 构造，并以 start 计时
    pub fn timed(start: Instant, outcome: Result<Value, String>) -> Self {
        match outcome {
            Ok(data) => Self::success(data),
            Err(e) => Self::failure(e),
        }
        .with_elapsed(start)
    }

    pub fn with_elapsed(mut self, start: Instant) -> Self {
        self.execution_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        self
    }

    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    /// 成功但没有数据（Verifier 记为质量问题）
    pub fn is_empty_success(&self) -> bool {
        self.success && matches!(self.data, None | Some(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timed_failure() {
        let r = ToolResult::timed(Instant::now(), Err("boom".to_string()));
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.execution_time_ms >= 0.0);
        assert!(!r.cached);
    }

    #[test]
    fn test_empty_success() {
        assert!(ToolResult::success(Value::Null).is_empty_success());
        assert!(!ToolResult::success(serde_json::json!({"a": 1})).is_empty_success());
        assert!(!ToolResult::failure("x").is_empty_success());
    }
}
