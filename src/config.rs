//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `OPS__*` 覆盖（双下划线表示嵌套，如 `OPS__LLM__PROVIDER=openai`）。
//! 工具的 API Key 另外读取各自的标准环境变量（OPENWEATHERMAP_API_KEY / GITHUB_TOKEN / NEWSAPI_KEY）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::RetryConfig;
use crate::tools::github::DEFAULT_GITHUB_URL;
use crate::tools::news::DEFAULT_NEWS_URL;
use crate::tools::weather::DEFAULT_WEATHER_URL;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub cache: CacheSection,
}

/// [app] 段：应用名、重试轮数、日志级别
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 校验 → 重试的最大轮数
    pub max_retries: u32,
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "ops-assistant".to_string(),
            max_retries: 2,
            log_level: "info".to_string(),
        }
    }
}

/// [llm] 段：后端选择、采样参数与传输层重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / mock；无对应 API Key 时回退到 mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub planner_temperature: f32,
    pub summary_temperature: f32,
    pub max_tokens: u32,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            base_url: None,
            planner_temperature: 0.3,
            summary_temperature: 0.5,
            max_tokens: 4096,
            retry: LlmRetrySection::default(),
        }
    }
}

/// [llm.retry] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff_ms: 1000,
            max_backoff_ms: 10_000,
        }
    }
}

impl LlmRetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            min_backoff: Duration::from_millis(self.min_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// [tools] 段：超时、各 API 的地址与密钥
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 单次 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
    pub weather_base_url: String,
    pub github_base_url: String,
    pub news_base_url: String,
    pub openweathermap_api_key: Option<String>,
    pub github_token: Option<String>,
    pub newsapi_key: Option<String>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            request_timeout_secs: 30,
            weather_base_url: DEFAULT_WEATHER_URL.to_string(),
            github_base_url: DEFAULT_GITHUB_URL.to_string(),
            news_base_url: DEFAULT_NEWS_URL.to_string(),
            openweathermap_api_key: None,
            github_token: None,
            newsapi_key: None,
        }
    }
}

fn key_or_env(configured: &Option<String>, var: &str) -> Option<String> {
    configured
        .clone()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var(var).ok().filter(|k| !k.is_empty()))
}

impl ToolsSection {
    pub fn weather_key(&self) -> Option<String> {
        key_or_env(&self.openweathermap_api_key, "OPENWEATHERMAP_API_KEY")
    }

    pub fn github_token(&self) -> Option<String> {
        key_or_env(&self.github_token, "GITHUB_TOKEN")
    }

    pub fn news_key(&self) -> Option<String> {
        key_or_env(&self.newsapi_key, "NEWSAPI_KEY")
    }
}

/// [cache] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub default_ttl_secs: u64,
    pub max_size: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            max_size: 1000,
        }
    }
}

/// 从 config 目录加载配置，环境变量 OPS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 OPS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("OPS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时记录警告并使用默认配置
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
