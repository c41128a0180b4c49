//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与结构化输出

pub mod mock;
pub mod openai;
pub mod structured;
pub mod traits;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use structured::{extract_json, generate_structured, parse_structured};
pub use traits::{LlmClient, LlmError, LlmRequest, RetryConfig, RetryingLlmClient};
