//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::generate：prompt 进，文本出。
//! 传输层失败由 RetryingLlmClient 按有界指数退避重试。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Failed to parse JSON from response: {0}")]
    JsonParse(String),

    #[error("Response does not match schema: {0}")]
    SchemaValidation(String),
}

impl LlmError {
    /// 传输层错误：值得原样重发请求
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::ApiError(_)
                | LlmError::NetworkError(_)
                | LlmError::RateLimited { .. }
                | LlmError::EmptyResponse
        )
    }

    /// 结构化输出错误：模型输出不合格，可重新生成
    pub fn is_malformed_output(&self) -> bool {
        matches!(self, LlmError::JsonParse(_) | LlmError::SchemaValidation(_))
    }
}

/// 单次生成请求
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式生成，返回模型文本
    async fn generate(&self, request: &LlmRequest) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }

    /// 离线后端（不访问任何模型服务）
    fn is_offline(&self) -> bool {
        false
    }
}

/// 有界重试策略：max_attempts 次尝试，退避从 min_backoff 起翻倍，封顶 max_backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// 只尝试一次
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 不等待的重试（测试用）
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// 第 attempt 次失败（从 1 开始）后的等待时间
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.min_backoff
            .saturating_mul(factor)
            .clamp(self.min_backoff, self.max_backoff.max(self.min_backoff))
    }

    /// 重试 op，直到成功、错误不可重试或次数用尽；返回最后一次的错误
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        should_retry: impl Fn(&LlmError) -> bool,
        mut op: F,
    ) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && should_retry(&e) => {
                    let wait = match &e {
                        LlmError::RateLimited { retry_after_ms } => {
                            Duration::from_millis(*retry_after_ms).min(self.max_backoff)
                        }
                        _ => self.backoff(attempt),
                    };
                    tracing::warn!(
                        operation,
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "LLM call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 为任意 LlmClient 加上传输层重试
pub struct RetryingLlmClient<C: ?Sized> {
    inner: Arc<C>,
    retry: RetryConfig,
}

impl<C: LlmClient + ?Sized> RetryingLlmClient<C> {
    pub fn new(inner: Arc<C>, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl<C: LlmClient + ?Sized> LlmClient for RetryingLlmClient<C> {
    async fn generate(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.retry
            .run("generate", LlmError::is_transient, || self.inner.generate(request))
            .await
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }

    fn is_offline(&self) -> bool {
        self.inner.is_offline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_backoff_clamped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(1), Duration::from_secs(1));
        assert_eq!(retry.backoff(2), Duration::from_secs(2));
        assert_eq!(retry.backoff(3), Duration::from_secs(4));
        assert_eq!(retry.backoff(10), Duration::from_secs(10));
    }

    #[test]
    fn test_error_classes() {
        assert!(LlmError::NetworkError("reset".into()).is_transient());
        assert!(LlmError::RateLimited { retry_after_ms: 10 }.is_transient());
        assert!(!LlmError::JsonParse("x".into()).is_transient());
        assert!(LlmError::SchemaValidation("x".into()).is_malformed_output());
    }

    #[tokio::test]
    async fn test_retrying_client_recovers_from_transient() {
        let mock = Arc::new(MockLlmClient::with_responses(vec![
            Err(LlmError::NetworkError("reset".into())),
            Ok("hello".to_string()),
        ]));
        let client = RetryingLlmClient::new(mock.clone(), RetryConfig::immediate(3));
        let out = client.generate(&LlmRequest::new("hi")).await.unwrap();
        assert_eq!(out, "hello");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retrying_client_gives_up_after_max_attempts() {
        let mock = Arc::new(MockLlmClient::always(Err(LlmError::ApiError("503".into()))));
        let client = RetryingLlmClient::new(mock.clone(), RetryConfig::immediate(3));
        let err = client.generate(&LlmRequest::new("hi")).await.unwrap_err();
        assert_eq!(err, LlmError::ApiError("503".into()));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_transient_not_retried() {
        let mock = Arc::new(MockLlmClient::always(Err(LlmError::JsonParse("bad".into()))));
        let client = RetryingLlmClient::new(mock.clone(), RetryConfig::immediate(3));
        assert!(client.generate(&LlmRequest::new("hi")).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }
}
