//! 构建器：统一的组件初始化逻辑
//!
//! CLI 与 HTTP 服务共用同一套 LLM 选择、工具注册与缓存配置；
//! 注册表与缓存是进程级共享状态，每个任务从 AgentComponents 新建一个 Orchestrator。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{load_config_or_default, AppConfig};
use crate::core::Orchestrator;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, RetryingLlmClient};
use crate::tools::{EchoTool, GithubTool, NewsTool, ResultCache, ToolRegistry, WeatherTool};

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

fn env_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.is_empty())
}

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / DeepSeek / Mock）；真实后端外包一层传输重试
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let openai_key = env_key("OPENAI_API_KEY");
    let deepseek_key = env_key("DEEPSEEK_API_KEY");
    let retry = cfg.llm.retry.to_retry_config();

    if provider == "mock" {
        tracing::info!("Using Mock LLM");
        return Arc::new(MockLlmClient::new());
    }

    // deepseek 时 OpenAI Key 也可用于 DeepSeek 兼容端点；其他 provider 仅在没有 OpenAI Key 时退到 DeepSeek
    let use_deepseek = if provider == "deepseek" {
        deepseek_key.is_some() || openai_key.is_some()
    } else {
        openai_key.is_none() && deepseek_key.is_some()
    };

    if use_deepseek {
        let client = OpenAiClient::deepseek(cfg.llm.model.as_deref());
        tracing::info!("Using DeepSeek LLM ({})", client.model());
        Arc::new(RetryingLlmClient::new(Arc::new(client), retry))
    } else if let Some(key) = openai_key {
        let model = cfg.llm.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
        tracing::info!("Using OpenAI LLM ({})", model);
        let client = OpenAiClient::new(cfg.llm.base_url.as_deref(), model, Some(&key));
        Arc::new(RetryingLlmClient::new(Arc::new(client), retry))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// 构建器：按配置创建 LLM、缓存、工具注册表与编排器
pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config, llm: None }
    }

    /// 指定 LLM 客户端（测试或嵌入场景），不再按配置选择
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn build_cache(&self) -> Arc<ResultCache> {
        Arc::new(ResultCache::new(
            Duration::from_secs(self.config.cache.default_ttl_secs),
            self.config.cache.max_size,
        ))
    }

    fn http_client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.tools.request_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("HTTP client build failed ({}), using defaults", e);
                reqwest::Client::new()
            })
    }

    /// 构建工具注册表：所有 HTTP 工具共享同一个缓存与 HTTP 客户端；
    /// echo 只给离线（Mock）后端使用，不出现在真实模型的规划提示里
    pub fn build_tool_registry(&self, cache: Arc<ResultCache>, offline: bool) -> ToolRegistry {
        let tools_cfg = &self.config.tools;
        let client = self.http_client();
        let mut tools = ToolRegistry::new().with_timeout(tools_cfg.tool_timeout_secs);

        if offline {
            tools.register(EchoTool);
        }
        tools.register(
            WeatherTool::new(tools_cfg.weather_key(), cache.clone())
                .with_base_url(&tools_cfg.weather_base_url)
                .with_client(client.clone()),
        );
        tools.register(
            GithubTool::new(tools_cfg.github_token(), cache.clone())
                .with_base_url(&tools_cfg.github_base_url)
                .with_client(client.clone()),
        );
        tools.register(
            NewsTool::new(tools_cfg.news_key(), cache)
                .with_base_url(&tools_cfg.news_base_url)
                .with_client(client),
        );

        tracing::info!(tools = ?tools.tool_names(), "Registered tools");
        tools
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        match &self.llm {
            Some(llm) => llm.clone(),
            None => create_llm_from_config(&self.config),
        }
    }

    /// 构建可在多个任务间共享的组件
    pub fn build_components(&self) -> AgentComponents {
        let llm = self.build_llm();
        let cache = self.build_cache();
        let registry = Arc::new(self.build_tool_registry(cache.clone(), llm.is_offline()));
        AgentComponents {
            llm,
            registry,
            cache,
            config: self.config.clone(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 预构建的组件：LLM、工具注册表、结果缓存；可多任务共享
#[derive(Clone)]
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub registry: Arc<ToolRegistry>,
    pub cache: Arc<ResultCache>,
    pub config: AppConfig,
}

impl AgentComponents {
    /// 为一个任务新建编排器（状态各自独立，注册表与缓存共享）
    pub fn orchestrator(&self) -> Orchestrator {
        let llm_cfg = &self.config.llm;
        Orchestrator::new(self.llm.clone(), self.registry.clone(), self.config.app.max_retries)
            .with_planner_retry(llm_cfg.retry.to_retry_config())
            .with_planner_temperature(llm_cfg.planner_temperature)
            .with_summary_temperature(llm_cfg.summary_temperature)
            .with_max_tokens(llm_cfg.max_tokens)
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// 便捷函数：从默认路径（或指定文件）加载配置并创建构建器
pub fn create_agent_builder(config_path: Option<PathBuf>) -> AgentBuilder {
    AgentBuilder::new(load_config_or_default(config_path))
}
