//! GitHub 工具：仓库搜索、仓库详情、用户信息

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::params::{get_json, pick, pick_or, required_str, skip_cache, str_or, u64_or};
use crate::tools::registry::unknown_action;
use crate::tools::{CacheKey, Fetched, ResultCache, Tool, ToolAction, ToolParameter, ToolResult};

pub const DEFAULT_GITHUB_URL: &str = "https://api.github.com";

const GITHUB_TTL: Duration = Duration::from_secs(300);
const MAX_SEARCH_RESULTS: u64 = 30;
const USER_AGENT: &str = "ops-assistant";

pub struct GithubTool {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    cache: Arc<ResultCache>,
}

impl GithubTool {
    pub fn new(token: Option<String>, cache: Arc<ResultCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_GITHUB_URL.to_string(),
            token: token.filter(|t| !t.is_empty()),
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

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT);
        match &self.token {
            Some(token) => request.header("Authorization", format!("token {token}")),
            None => request,
        }
    }

    async fn search_repositories(&self, params: &Map<String, Value>) -> Result<Fetched<Value>, String> {
        let query = required_str(params, "query")?;
        let sort = str_or(params, "sort", "stars");
        let limit = u64_or(params, "limit", 5).clamp(1, MAX_SEARCH_RESULTS);
        let key = CacheKey::new("github.search_repositories")
            .kwarg("query", &query)
            .kwarg("sort", &sort)
            .kwarg("limit", limit);

        self.cache
            .get_or_fetch(&key, Some(GITHUB_TTL), skip_cache(params), || async move {
                let per_page = limit.to_string();
                let request = self.get("/search/repositories").query(&[
                    ("q", query.as_str()),
                    ("sort", sort.as_str()),
                    ("order", "desc"),
                    ("per_page", per_page.as_str()),
                ]);
                let data = get_json(request).await?;
                let items = pick_or(&data, "/items", json!([]));

                let mut repos = Vec::new();
                for item in items.as_array().into_iter().flatten().take(limit as usize) {
                    repos.push(json!({
                        "name": pick(item, "/full_name")?,
                        "description": pick_or(item, "/description", json!("No description")),
                        "stars": pick(item, "/stargazers_count")?,
                        "forks": pick(item, "/forks_count")?,
                        "language": pick_or(item, "/language", json!("Unknown")),
                        "url": pick(item, "/html_url")?,
                        "updated_at": pick(item, "/updated_at")?,
                    }));
                }
                tracing::info!(query = %query, count = repos.len(), "Found repositories");

                Ok::<Value, String>(json!({
                    "query": query,
                    "total_count": pick_or(&data, "/total_count", json!(0)),
                    "repositories": repos,
                }))
            })
            .await
    }

    async fn get_repository(&self, params: &Map<String, Value>) -> Result<Fetched<Value>, String> {
        let owner = required_str(params, "owner")?;
        let repo = required_str(params, "repo")?;
        let key = CacheKey::new("github.get_repository")
            .kwarg("owner", &owner)
            .kwarg("repo", &repo);

        self.cache
            .get_or_fetch(&key, Some(GITHUB_TTL), skip_cache(params), || async move {
                let data = get_json(self.get(&format!("/repos/{owner}/{repo}"))).await?;
                Ok::<Value, String>(json!({
                    "name": pick(&data, "/full_name")?,
                    "description": pick_or(&data, "/description", json!("No description")),
                    "stars": pick(&data, "/stargazers_count")?,
                    "forks": pick(&data, "/forks_count")?,
                    "watchers": pick(&data, "/watchers_count")?,
                    "language": pick_or(&data, "/language", json!("Unknown")),
                    "topics": pick_or(&data, "/topics", json!([])),
                    "created_at": pick(&data, "/created_at")?,
                    "updated_at": pick(&data, "/updated_at")?,
                    "open_issues": pick(&data, "/open_issues_count")?,
                    "license": pick_or(&data, "/license/name", json!("None")),
                    "url": pick(&data, "/html_url")?,
                }))
            })
            .await
    }

    async fn get_user(&self, params: &Map<String, Value>) -> Result<Fetched<Value>, String> {
        let username = required_str(params, "username")?;
        let key = CacheKey::new("github.get_user").kwarg("username", &username);

        self.cache
            .get_or_fetch(&key, Some(GITHUB_TTL), skip_cache(params), || async move {
                let data = get_json(self.get(&format!("/users/{username}"))).await?;
                Ok::<Value, String>(json!({
                    "username": pick(&data, "/login")?,
                    "name": pick_or(&data, "/name", json!("Unknown")),
                    "bio": pick_or(&data, "/bio", json!("")),
                    "company": pick_or(&data, "/company", json!("")),
                    "location": pick_or(&data, "/location", json!("")),
                    "public_repos": pick(&data, "/public_repos")?,
                    "followers": pick(&data, "/followers")?,
                    "following": pick(&data, "/following")?,
                    "created_at": pick(&data, "/created_at")?,
                    "profile_url": pick(&data, "/html_url")?,
                }))
            })
            .await
    }
}

#[async_trait]
impl Tool for GithubTool {
    fn name(&self) -> &str {
        "github"
    }

    fn description(&self) -> &str {
        "Search GitHub repositories, get repository details, and fetch user information"
    }

    fn actions(&self) -> Vec<ToolAction> {
        vec![
            ToolAction::new(
                "search_repositories",
                "Search for GitHub repositories by query",
                vec![
                    ToolParameter::required(
                        "query",
                        "string",
                        "Search query (e.g., 'machine learning', 'language:python')",
                    ),
                    ToolParameter::optional("sort", "string", "Sort by: stars, forks, updated")
                        .with_default(json!("stars"))
                        .with_enum(&["stars", "forks", "updated"]),
                    ToolParameter::optional("limit", "integer", "Max results (1-30)").with_default(json!(5)),
                ],
            ),
            ToolAction::new(
                "get_repository",
                "Get detailed information about a specific repository",
                vec![
                    ToolParameter::required("owner", "string", "Repository owner username"),
                    ToolParameter::required("repo", "string", "Repository name"),
                ],
            ),
            ToolAction::new(
                "get_user",
                "Get GitHub user profile information",
                vec![ToolParameter::required("username", "string", "GitHub username")],
            ),
        ]
    }

    async fn execute(&self, action: &str, parameters: &Map<String, Value>) -> ToolResult {
        let start = Instant::now();
        let outcome = match action {
            "search_repositories" => self.search_repositories(parameters).await,
            "get_repository" => self.get_repository(parameters).await,
            "get_user" => self.get_user(parameters).await,
            _ => return unknown_action(&self.actions(), action).with_elapsed(start),
        };
        match outcome {
            Ok(fetched) => ToolResult::success(fetched.value)
                .with_cached(fetched.cached)
                .with_elapsed(start),
            Err(e) => {
                tracing::warn!(action, error = %e, "GitHub API error");
                ToolResult::failure(e).with_elapsed(start)
            }
        }
    }
}
