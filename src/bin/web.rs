//! ops-assistant HTTP API
//!
//! 启动: cargo run --bin ops-web --features web
//! 默认监听 0.0.0.0:8000，可用 OPS_WEB_PORT 覆盖

#![cfg(feature = "web")]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use ops_assistant::core::{create_agent_builder, short_id, AgentComponents, AgentContext, Orchestrator};
use ops_assistant::observability;
use ops_assistant::plan::{ExecutionPlan, FinalOutput};
use ops_assistant::tools::CacheMetrics;

const TASK_MIN_CHARS: usize = 3;
const TASK_MAX_CHARS: usize = 1000;

/// 共享状态：组件、任务结果存储（内存）、最近一次运行的编排器
struct AppState {
    components: AgentComponents,
    tasks: RwLock<HashMap<String, TaskResponse>>,
    latest: RwLock<Option<Arc<Orchestrator>>>,
}

#[derive(Debug, Deserialize)]
struct TaskRequest {
    task: String,
    #[serde(default)]
    context: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
struct TaskResponse {
    task_id: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<FinalOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<ExecutionPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    execution_time_ms: f64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    actions: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ToolsResponse {
    tools: Vec<ToolInfo>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct CacheClearResponse {
    cleared: usize,
    message: String,
}

type ApiError = (StatusCode, String);

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(api_health))
        .route("/api/v1/tools", get(api_tools_list))
        .route("/api/v1/task", post(api_task_submit))
        .route("/api/v1/task/:id", get(api_task_get))
        .route("/api/v1/cache/stats", get(api_cache_stats))
        .route("/api/v1/cache/clear", post(api_cache_clear))
        .route("/api/v1/agents/status", get(api_agents_status))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let builder = create_agent_builder(None);
    observability::init_json(&builder.config().app.log_level);

    let state = Arc::new(AppState {
        components: builder.build_components(),
        tasks: RwLock::new(HashMap::new()),
        latest: RwLock::new(None),
    });

    let port = std::env::var("OPS_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("ops-assistant API: http://{}/api/v1/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// GET /api/v1/health
async fn api_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

/// GET /api/v1/tools：工具及其动作名
async fn api_tools_list(State(state): State<Arc<AppState>>) -> Json<ToolsResponse> {
    let tools: Vec<ToolInfo> = state
        .components
        .registry
        .schemas()
        .into_iter()
        .map(|schema| ToolInfo {
            name: schema.name,
            description: schema.description,
            actions: schema.actions,
        })
        .collect();
    let count = tools.len();
    Json(ToolsResponse { tools, count })
}

/// POST /api/v1/task：同步执行任务并保存结果
async fn api_task_submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = req.task.trim().to_string();
    let len = task.chars().count();
    if !(TASK_MIN_CHARS..=TASK_MAX_CHARS).contains(&len) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("task must be {TASK_MIN_CHARS}..={TASK_MAX_CHARS} characters, got {len}"),
        ));
    }

    let task_id = short_id();
    let preview: String = task.chars().take(100).collect();
    tracing::info!(task_id = %task_id, task = %preview, "Received task");

    let mut ctx = AgentContext::new(&task).with_task_id(&task_id);
    for (key, value) in req.context.unwrap_or_default() {
        ctx = ctx.with_metadata(key, value);
    }

    let orchestrator = Arc::new(state.components.orchestrator());
    *state.latest.write().await = Some(orchestrator.clone());
    let result = orchestrator.run(&task, Some(ctx)).await;

    let status = result
        .output
        .as_ref()
        .map(|o| o.status.to_string())
        .unwrap_or_else(|| "failed".to_string());
    let response = TaskResponse {
        task_id: task_id.clone(),
        status,
        result: result.output,
        plan: result.plan,
        error: result.error,
        execution_time_ms: result.execution_time_ms,
        created_at: Utc::now(),
    };
    tracing::info!(task_id = %task_id, status = %response.status, "Task completed");

    state.tasks.write().await.insert(task_id, response.clone());
    Ok(Json(response))
}

/// GET /api/v1/task/:id
async fn api_task_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    state
        .tasks
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Task {id} not found")))
}

/// GET /api/v1/cache/stats
async fn api_cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheMetrics> {
    Json(state.components.cache.metrics())
}

/// POST /api/v1/cache/clear
async fn api_cache_clear(State(state): State<Arc<AppState>>) -> Json<CacheClearResponse> {
    let cleared = state.components.cache.clear();
    Json(CacheClearResponse {
        cleared,
        message: format!("Cleared {cleared} cached entries"),
    })
}

/// GET /api/v1/agents/status：最近一次运行的各 Agent 状态（尚无运行时全部为 idle）
async fn api_agents_status(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<&'static str, &'static str>> {
    let latest = state.latest.read().await.clone();
    let states = match latest {
        Some(orchestrator) => orchestrator.agent_states(),
        None => state.components.orchestrator().agent_states(),
    };
    Json(states)
}
