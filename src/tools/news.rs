//! 新闻工具（NewsAPI）：头条与关键词检索

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::params::{get_json, optional_str, pick_or, required_str, skip_cache, str_or, u64_or};
use crate::tools::registry::unknown_action;
use crate::tools::{CacheKey, Fetched, ResultCache, Tool, ToolAction, ToolParameter, ToolResult};

pub const DEFAULT_NEWS_URL: &str = "https://newsapi.org/v2";

const NEWS_TTL: Duration = Duration::from_secs(900);
const MAX_ARTICLES: u64 = 20;

pub struct NewsTool {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cache: Arc<ResultCache>,
}

impl NewsTool {
    pub fn new(api_key: Option<String>, cache: Arc<ResultCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_NEWS_URL.to_string(),
            api_key,
            cache,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// NewsAPI 以 status 字段表示业务失败（HTTP 200 也可能 status=error）
    async fn fetch(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<Value, String> {
        let request = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(&[("apiKey", self.api_key.as_deref().unwrap_or_default())])
            .query(query);
        let data = get_json(request).await?;
        if data.get("status").and_then(|s| s.as_str()) != Some("ok") {
            let message = data
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown NewsAPI error");
            return Err(message.to_string());
        }
        Ok(data)
    }

    fn format_articles(data: &Value, limit: usize) -> Vec<Value> {
        data.get("articles")
            .and_then(|a| a.as_array())
            .into_iter()
            .flatten()
            .take(limit)
            .map(|a| {
                json!({
                    "title": pick_or(a, "/title", json!("Untitled")),
                    "description": pick_or(a, "/description", json!("No description")),
                    "source": pick_or(a, "/source/name", json!("Unknown")),
                    "author": pick_or(a, "/author", json!("Unknown")),
                    "url": pick_or(a, "/url", json!("")),
                    "published_at": pick_or(a, "/publishedAt", json!("")),
                    "image_url": pick_or(a, "/urlToImage", json!("")),
                })
            })
            .collect()
    }

    async fn top_headlines(&self, params: &Map<String, Value>) -> Result<Fetched<Value>, String> {
        let category = optional_str(params, "category");
        let country = str_or(params, "country", "us");
        let limit = u64_or(params, "limit", 5).clamp(1, MAX_ARTICLES);
        let key = CacheKey::new("news.get_top_headlines")
            .kwarg("category", category.as_deref().unwrap_or(""))
            .kwarg("country", &country)
            .kwarg("limit", limit);

        self.cache
            .get_or_fetch(&key, Some(NEWS_TTL), skip_cache(params), || async move {
                let page_size = limit.to_string();
                let mut query = vec![("country", country.as_str()), ("pageSize", page_size.as_str())];
                if let Some(c) = category.as_deref() {
                    query.push(("category", c));
                }
                let data = self.fetch("top-headlines", &query).await?;
                let articles = Self::format_articles(&data, limit as usize);
                let category = category.as_deref().unwrap_or("general");
                tracing::info!(count = articles.len(), category, country = %country, "Retrieved headlines");

                Ok::<Value, String>(json!({
                    "category": category,
                    "country": country,
                    "total_results": pick_or(&data, "/totalResults", json!(0)),
                    "articles": articles,
                }))
            })
            .await
    }

    async fn search_news(&self, params: &Map<String, Value>) -> Result<Fetched<Value>, String> {
        let query = required_str(params, "query")?;
        let sort_by = str_or(params, "sort_by", "publishedAt");
        let limit = u64_or(params, "limit", 5).clamp(1, MAX_ARTICLES);
        let key = CacheKey::new("news.search_news")
            .kwarg("query", &query)
            .kwarg("sort_by", &sort_by)
            .kwarg("limit", limit);

        self.cache
            .get_or_fetch(&key, Some(NEWS_TTL), skip_cache(params), || async move {
                let page_size = limit.to_string();
                let data = self
                    .fetch(
                        "everything",
                        &[
                            ("q", query.as_str()),
                            ("sortBy", sort_by.as_str()),
                            ("pageSize", page_size.as_str()),
                            ("language", "en"),
                        ],
                    )
                    .await?;
                let articles = Self::format_articles(&data, limit as usize);
                tracing::info!(count = articles.len(), query = %query, "Found articles");

                Ok::<Value, String>(json!({
                    "query": query,
                    "sort_by": sort_by,
                    "total_results": pick_or(&data, "/totalResults", json!(0)),
                    "articles": articles,
                }))
            })
            .await
    }
}

#[async_trait]
impl Tool for NewsTool {
    fn name(&self) -> &str {
        "news"
    }

    fn description(&self) -> &str {
        "Get top news headlines and search for articles on specific topics"
    }

    fn actions(&self) -> Vec<ToolAction> {
        let limit = || ToolParameter::optional("limit", "integer", "Max articles (1-20)").with_default(json!(5));
        vec![
            ToolAction::new(
                "get_top_headlines",
                "Get top news headlines, optionally filtered by category or country",
                vec![
                    ToolParameter::optional("category", "string", "News category").with_enum(&[
                        "business",
                        "entertainment",
                        "general",
                        "health",
                        "science",
                        "sports",
                        "technology",
                    ]),
                    ToolParameter::optional("country", "string", "2-letter country code (e.g., 'us', 'gb', 'in')")
                        .with_default(json!("us")),
                    limit(),
                ],
            ),
            ToolAction::new(
                "search_news",
                "Search for news articles by keyword or phrase",
                vec![
                    ToolParameter::required("query", "string", "Search query (keywords or phrases)"),
                    ToolParameter::optional("sort_by", "string", "Sort order")
                        .with_default(json!("publishedAt"))
                        .with_enum(&["relevancy", "popularity", "publishedAt"]),
                    limit(),
                ],
            ),
        ]
    }

    async fn execute(&self, action: &str, parameters: &Map<String, Value>) -> ToolResult {
        let start = Instant::now();
        let outcome = match action {
            "get_top_headlines" => self.top_headlines(parameters).await,
            "search_news" => self.search_news(parameters).await,
            _ => return unknown_action(&self.actions(), action).with_elapsed(start),
        };
        match outcome {
            Ok(fetched) => ToolResult::success(fetched.value)
                .with_cached(fetched.cached)
                .with_elapsed(start),
            Err(e) => {
                tracing::warn!(action, error = %e, "News API error");
                ToolResult::failure(e).with_elapsed(start)
            }
        }
    }
}
