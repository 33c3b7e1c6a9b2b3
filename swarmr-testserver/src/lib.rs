use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HEALTH: &str = "/health";
pub const PATH_TODOS: &str = "/todos";
pub const PATH_TODO_ITEM: &str = "/todos/{id}";
pub const PATH_STATS: &str = "/stats";

/// Behaviour knobs for failure-injection tests.
#[derive(Debug, Clone)]
pub struct TestServerOptions {
    pub instance: String,
    /// When false, `/health` answers 503.
    pub healthy: bool,
    /// Added to every handler before it responds.
    pub latency: Duration,
}

impl Default for TestServerOptions {
    fn default() -> Self {
        Self {
            instance: "testserver".to_string(),
            healthy: true,
            latency: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    health: Arc<AtomicU64>,
    list: Arc<AtomicU64>,
    create: Arc<AtomicU64>,
    update: Arc<AtomicU64>,
    delete: Arc<AtomicU64>,
    stats: Arc<AtomicU64>,
}

impl TestServerStats {
    fn hit(&self, counter: &AtomicU64) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn health(&self) -> u64 {
        self.health.load(Ordering::Relaxed)
    }

    pub fn list(&self) -> u64 {
        self.list.load(Ordering::Relaxed)
    }

    pub fn create(&self) -> u64 {
        self.create.load(Ordering::Relaxed)
    }

    pub fn update(&self) -> u64 {
        self.update.load(Ordering::Relaxed)
    }

    pub fn delete(&self) -> u64 {
        self.delete.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> u64 {
        self.stats.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize)]
struct Todo {
    id: u64,
    title: String,
    completed: bool,
    created_at: u64,
}

#[derive(Debug, Deserialize)]
struct CreateTodo {
    title: Option<String>,
    #[serde(default)]
    completed: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateTodo {
    title: Option<String>,
    completed: Option<bool>,
}

#[derive(Clone)]
struct AppState {
    options: Arc<TestServerOptions>,
    stats: TestServerStats,
    todos: Arc<Mutex<BTreeMap<u64, Todo>>>,
    next_id: Arc<AtomicU64>,
}

impl AppState {
    async fn delay(&self) {
        if !self.options.latency.is_zero() {
            sleep(self.options.latency).await;
        }
    }

    fn with_todos<R>(&self, f: impl FnOnce(&mut BTreeMap<u64, Todo>) -> R) -> R {
        let mut guard = self
            .todos
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

async fn handle_health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    state.stats.hit(&state.stats.health);
    state.delay().await;

    if !state.options.healthy {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "instance": state.options.instance })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "instance": state.options.instance,
            "timestamp": now_ms(),
        })),
    )
}

async fn handle_list(State(state): State<AppState>) -> Json<Value> {
    state.stats.hit(&state.stats.list);
    state.delay().await;

    let data: Vec<Todo> = state.with_todos(|todos| todos.values().rev().cloned().collect());
    Json(json!({
        "source": "memory",
        "instance": state.options.instance,
        "data": data,
    }))
}

async fn handle_create(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    state.stats.hit(&state.stats.create);
    state.delay().await;

    let Ok(req) = serde_json::from_slice::<CreateTodo>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Title is required" })),
        );
    };
    let Some(title) = req.title.filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Title is required" })),
        );
    };

    let id = state.next_id.fetch_add(1, Ordering::Relaxed) + 1;
    let todo = Todo {
        id,
        title,
        completed: req.completed,
        created_at: now_ms(),
    };
    state.with_todos(|todos| todos.insert(id, todo.clone()));

    (
        StatusCode::CREATED,
        Json(json!({ "instance": state.options.instance, "data": todo })),
    )
}

async fn handle_update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<UpdateTodo>,
) -> (StatusCode, Json<Value>) {
    state.stats.hit(&state.stats.update);
    state.delay().await;

    let updated = state.with_todos(|todos| {
        let todo = todos.get_mut(&id)?;
        if let Some(title) = req.title {
            todo.title = title;
        }
        if let Some(completed) = req.completed {
            todo.completed = completed;
        }
        Some(todo.clone())
    });

    match updated {
        Some(todo) => (
            StatusCode::OK,
            Json(json!({ "instance": state.options.instance, "data": todo })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Todo not found" })),
        ),
    }
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> (StatusCode, Json<Value>) {
    state.stats.hit(&state.stats.delete);
    state.delay().await;

    match state.with_todos(|todos| todos.remove(&id)) {
        Some(_) => (
            StatusCode::OK,
            Json(json!({ "instance": state.options.instance, "message": "Todo deleted" })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Todo not found" })),
        ),
    }
}

async fn handle_stats(State(state): State<AppState>) -> Json<Value> {
    state.stats.hit(&state.stats.stats);
    state.delay().await;

    let (total, completed) = state.with_todos(|todos| {
        let completed = todos.values().filter(|t| t.completed).count();
        (todos.len(), completed)
    });
    Json(json!({
        "instance": state.options.instance,
        "total": total,
        "completed": completed,
        "pending": total - completed,
    }))
}

pub fn router(options: TestServerOptions, stats: TestServerStats) -> Router {
    let state = AppState {
        options: Arc::new(options),
        stats,
        todos: Arc::new(Mutex::new(BTreeMap::new())),
        next_id: Arc::new(AtomicU64::new(0)),
    };

    Router::new()
        .route(PATH_HEALTH, get(handle_health))
        .route(PATH_TODOS, get(handle_list).post(handle_create))
        .route(PATH_TODO_ITEM, patch(handle_update).delete(handle_delete))
        .route(PATH_STATS, get(handle_stats))
        .with_state(state)
}

pub struct TestServer {
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerOptions::default()).await
    }

    pub async fn start_with(options: TestServerOptions) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(options, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
