//! Echo 工具（离线 / 测试用）

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::tools::registry::unknown_action;
use crate::tools::{Tool, ToolAction, ToolParameter, ToolResult};

/// Echo 工具：回显文本
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo text back (offline, for testing)"
    }

    fn actions(&self) -> Vec<ToolAction> {
        vec![ToolAction::new(
            "say",
            "Return the given text",
            vec![ToolParameter::required("text", "string", "Text to echo")],
        )]
    }

    async fn execute(&self, action: &str, parameters: &Map<String, Value>) -> ToolResult {
        let start = Instant::now();
        if action != "say" {
            return unknown_action(&self.actions(), action).with_elapsed(start);
        }
        let text = parameters
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("(empty)");
        ToolResult::timed(start, Ok(serde_json::json!({ "text": text })))
    }
}
