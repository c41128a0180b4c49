//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / actions / execute），由 ToolRegistry 按名注册与查找；
//! execute 统一加超时并输出结构化审计日志，未知工具返回可区分的 ToolNotFound。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolAction, ToolResult, ToolSchema};

/// 工具 trait：名称、描述（供 LLM 理解）、动作列表、异步执行
///
/// 实现方须把预期内的失败（HTTP 错误、参数缺失、未知动作）表达为 `success=false`，
/// 并保证相同参数的调用可以安全缓存。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（计划中 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 选择工具）
    fn description(&self) -> &str;

    /// 可用动作及参数
    fn actions(&self) -> Vec<ToolAction>;

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description(), self.actions())
    }

    /// 执行动作
    async fn execute(&self, action: &str, parameters: &Map<String, Value>) -> ToolResult;
}

/// 未知动作时的统一失败结果
pub fn unknown_action(actions: &[ToolAction], action: &str) -> ToolResult {
    let available: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
    ToolResult::failure(format!(
        "Unknown action: {action}. Available: {available:?}"
    ))
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / execute / schemas
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单次调用超时
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 已注册工具名（排序后返回，保证 prompt 稳定）
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 所有工具的 Schema（按名称排序）
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.schema())
            .collect()
    }

    /// 按名分发；未知工具返回 ToolNotFound，超时返回 ToolTimeout；每次调用输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_name: &str,
        action: &str,
        parameters: &Map<String, Value>,
    ) -> Result<ToolResult, AgentError> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| AgentError::ToolNotFound {
                name: tool_name.to_string(),
                available: self.tool_names(),
            })?;

        let start = Instant::now();
        let result = timeout(self.timeout, tool.execute(action, parameters)).await;

        let outcome = match &result {
            Ok(r) if r.success => "ok",
            Ok(_) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "action": action,
            "outcome": outcome,
            "cached": result.as_ref().map(|r| r.cached).unwrap_or(false),
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(parameters),
        });
        tracing::info!(audit = %audit, "tool");

        result.map_err(|_| AgentError::ToolTimeout(format!("{tool_name}.{action}")))
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
