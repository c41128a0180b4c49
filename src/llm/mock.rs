//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预置响应；用完后回退到默认行为：规划请求回显为一个 echo 计划，其他请求回显文本，
//! 便于本地离线跑通整条流水线。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, LlmRequest};

/// 规划 prompt 中以此开头的行携带任务原文
const TASK_LINE_PREFIX: &str = "Task: ";

#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    /// 每次调用都返回同一个响应
    fixed: Option<Result<String, LlmError>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回 responses，用完后走默认回显
    pub fn with_responses(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn always(response: Result<String, LlmError>) -> Self {
        Self {
            fixed: Some(response),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 收到过的 prompt（按调用顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn default_response(prompt: &str) -> String {
        let task_line = prompt
            .lines()
            .rev()
            .find_map(|l| l.trim().strip_prefix(TASK_LINE_PREFIX));

        match task_line {
            Some(task) if prompt.contains("\"steps\"") => serde_json::json!({
                "task_understanding": format!("Echo the task: {task}"),
                "steps": [{
                    "step_number": 1,
                    "tool": "echo",
                    "action": "say",
                    "parameters": {"text": task},
                    "reasoning": "Offline mode echoes the task back",
                    "depends_on": []
                }],
                "expected_output": "The task text echoed back"
            })
            .to_string(),
            _ => {
                let last_line = prompt
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("(no input)")
                    .trim();
                format!("Echo from Mock: {last_line}")
            }
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }

        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }
        let scripted = self
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        match scripted {
            Some(response) => response,
            None => Ok(Self::default_response(&request.prompt)),
        }
    }

    fn is_offline(&self) -> bool {
        true
    }
}
