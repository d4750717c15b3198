//! notekeep-api - HTTP API server for notekeep

mod handlers;

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use governor::{Quota, RateLimiter};
use sqlx::PgPool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use notekeep_api::services::{CacheSettings, NoteService, RedisStore};
use notekeep_core::defaults::{
    DATABASE_URL, RATE_LIMIT_PERIOD_SECS, RATE_LIMIT_REQUESTS, SERVER_PORT,
};
use notekeep_db::{log_pool_metrics, Database, PoolConfig};

use handlers::{
    create_note, get_note, hard_delete_note, list_notes, recently_viewed, restore_note,
    soft_delete_note, update_note,
};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    service: NoteService,
    /// Database pool, reported on by the health check (None in tests).
    pool: Option<PgPool>,
    /// Whether the Redis note cache is connected.
    cache_connected: bool,
    /// Global rate limiter (None if rate limiting is disabled).
    rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

/// Build the global limiter allowing `requests` per `period`.
///
/// Returns None when either value is zero.
fn build_rate_limiter(requests: u64, period: Duration) -> Option<Arc<GlobalRateLimiter>> {
    let burst = NonZeroU32::new(u32::try_from(requests).unwrap_or(u32::MAX))?;
    let quota = Quota::with_period(period / burst.get())?.allow_burst(burst);
    Some(Arc::new(RateLimiter::direct(quota)))
}

/// Parse allowed CORS origins from `ALLOWED_ORIGINS` (comma-separated).
fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str =
        std::env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:3000".to_string());

    if origins_str.trim().is_empty() {
        return vec![HeaderValue::from_static("http://localhost:3000")];
    }

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Notes
        .route("/api/v1/notes", post(create_note).get(list_notes))
        .route("/api/v1/notes/recent", get(recently_viewed))
        .route("/api/v1/notes/softdelete/:id", delete(soft_delete_note))
        .route("/api/v1/notes/restore/:id", post(restore_note))
        .route(
            "/api/v1/notes/:id",
            get(get_note).put(update_note).delete(hard_delete_note),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parse_allowed_origins()))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .max_age(Duration::from_secs(3600)),
        )
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "notekeep_api=debug,tower_http=info")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notekeep_api=debug,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("notekeep-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            // no ANSI in files unless asked for
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DATABASE_URL.to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(SERVER_PORT);

    let rate_limit_requests: u64 = std::env::var("RATE_LIMIT_REQUESTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(RATE_LIMIT_REQUESTS);
    let rate_limit_period_secs: u64 = std::env::var("RATE_LIMIT_PERIOD_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(RATE_LIMIT_PERIOD_SECS);
    let rate_limit_enabled: bool = std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let rate_limiter = if rate_limit_enabled {
        let limiter = build_rate_limiter(
            rate_limit_requests,
            Duration::from_secs(rate_limit_period_secs),
        );
        if limiter.is_none() {
            warn!("Rate limit values must be non-zero, rate limiting disabled");
        }
        limiter
    } else {
        None
    };

    info!(
        "Rate limiting: {} ({} requests per {} seconds)",
        if rate_limiter.is_some() {
            "enabled"
        } else {
            "disabled"
        },
        rate_limit_requests,
        rate_limit_period_secs
    );

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    info!("Database connected");

    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Key-value backend for note snapshots and recency lists
    let redis = RedisStore::from_env().await;
    let cache_settings = CacheSettings::from_env();
    info!(
        cache_connected = redis.is_connected(),
        note_ttl_secs = cache_settings.note_ttl.as_secs(),
        recent_limit = cache_settings.recent_limit,
        "Note cache configured"
    );

    let state = AppState {
        service: NoteService::new(
            Arc::new(db.notes.clone()),
            Arc::new(redis.clone()),
            cache_settings,
        ),
        pool: Some(db.pool.clone()),
        cache_connected: redis.is_connected(),
        rate_limiter,
    };

    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// RATE LIMITING MIDDLEWARE
// =============================================================================

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            warn!(path = %request.uri().path(), "Rate limit exceeded");
            return Err(ApiError::TooManyRequests(
                "Too many requests. Please wait before retrying.".to_string(),
            ));
        }
    }
    Ok(next.run(request).await)
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.pool.as_ref().map(log_pool_metrics);
    let cache = if state.cache_connected {
        "connected"
    } else {
        "disabled"
    };
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "cache": cache,
        "database": database,
    }))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Database(notekeep_core::Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    TooManyRequests(String),
}

impl From<notekeep_core::Error> for ApiError {
    fn from(err: notekeep_core::Error) -> Self {
        match err {
            notekeep_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            notekeep_core::Error::NoteNotFound(_) => ApiError::NotFound("Note not found".into()),
            notekeep_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            notekeep_core::Error::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Database(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Database(err) => {
                error!(error = %err, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notekeep_api::services::MemoryKvStore;
    use notekeep_core::Note;
    use notekeep_db::MemoryNoteStore;
    use serde_json::json;

    struct TestServer {
        base_url: String,
        store: MemoryNoteStore,
        kv: MemoryKvStore,
        client: reqwest::Client,
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("{}/api/v1/notes{}", self.base_url, path)
        }
    }

    async fn spawn_test_server(rate_limiter: Option<Arc<GlobalRateLimiter>>) -> TestServer {
        let store = MemoryNoteStore::new();
        let kv = MemoryKvStore::new();
        let state = AppState {
            service: NoteService::new(
                Arc::new(store.clone()),
                Arc::new(kv.clone()),
                CacheSettings::default(),
            ),
            pool: None,
            cache_connected: true,
            rate_limiter,
        };
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        TestServer {
            base_url,
            store,
            kv,
            client: reqwest::Client::new(),
        }
    }

    async fn create(server: &TestServer, body: serde_json::Value) -> reqwest::Response {
        server
            .client
            .post(server.url(""))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    #[test]
    fn test_api_error_mapping() {
        use notekeep_core::Error;
        assert!(matches!(
            ApiError::from(Error::NoteNotFound(1)),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(Error::Conflict("dup".into())),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(Error::InvalidInput("bad".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(Error::Database(sqlx::Error::PoolTimedOut)),
            ApiError::Database(_)
        ));
    }

    #[test]
    fn test_rate_limiter_rejects_zero_values() {
        assert!(build_rate_limiter(0, Duration::from_secs(600)).is_none());
        assert!(build_rate_limiter(100, Duration::ZERO).is_none());
        assert!(build_rate_limiter(100, Duration::from_secs(600)).is_some());
    }

    #[tokio::test]
    async fn test_note_lifecycle_over_http() {
        let server = spawn_test_server(None).await;

        let resp = create(&server, json!({"title": "T1", "content": "C1"})).await;
        assert_eq!(resp.status(), 201);
        let note: Note = resp.json().await.unwrap();
        assert_eq!(note.id, 1);

        let resp = server
            .client
            .get(server.url("/1?user_id=u1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let recent: Vec<Note> = server
            .client
            .get(server.url("/recent?user_id=u1"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, 1);

        let resp = server
            .client
            .delete(server.url("/softdelete/1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);

        let resp = server.client.get(server.url("/1")).send().await.unwrap();
        assert_eq!(resp.status(), 404);

        let resp = server
            .client
            .post(server.url("/restore/1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let restored: Note = resp.json().await.unwrap();
        assert_eq!(restored.title, "T1");
        assert_eq!(restored.content, "C1");
        assert!(restored.deleted_at.is_none());

        // Restoring an active note is rejected
        let resp = server
            .client
            .post(server.url("/restore/1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_create_conflict_and_validation() {
        let server = spawn_test_server(None).await;
        assert_eq!(
            create(&server, json!({"title": "T1", "content": "C1"}))
                .await
                .status(),
            201
        );

        let resp = create(&server, json!({"title": "T1", "content": "other"})).await;
        assert_eq!(resp.status(), 409);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("T1"));

        let resp = create(&server, json!({"title": "x".repeat(101), "content": "C"})).await;
        assert_eq!(resp.status(), 400);

        let resp = create(
            &server,
            json!({"title": "T2", "content": "C", "tags": ["y".repeat(31)]}),
        )
        .await;
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_update_over_http() {
        let server = spawn_test_server(None).await;
        create(
            &server,
            json!({"title": "T1", "content": "C1", "tags": ["a"]}),
        )
        .await;

        let resp = server
            .client
            .put(server.url("/1"))
            .json(&json!({"content": "C2", "tags": null}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let updated: Note = resp.json().await.unwrap();
        assert_eq!(updated.content, "C2");
        assert_eq!(updated.tags, None);
        assert_eq!(updated.title, "T1");

        let resp = server
            .client
            .put(server.url("/1"))
            .json(&json!({}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = server
            .client
            .put(server.url("/99"))
            .json(&json!({"content": "C"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_list_filters_over_http() {
        let server = spawn_test_server(None).await;
        create(
            &server,
            json!({"title": "A", "content": "a", "tags": ["work"], "is_public": true}),
        )
        .await;
        create(
            &server,
            json!({"title": "B", "content": "b", "tags": ["home"]}),
        )
        .await;
        server
            .client
            .delete(server.url("/softdelete/2"))
            .send()
            .await
            .unwrap();

        let notes: Vec<Note> = server
            .client
            .get(server.url(""))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);

        let notes: Vec<Note> = server
            .client
            .get(server.url("?tags=home,other&show_deleted=true"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, 2);

        let resp = server
            .client
            .get(server.url("?limit=0"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_recent_requires_user_id() {
        let server = spawn_test_server(None).await;
        let resp = server
            .client
            .get(server.url("/recent"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_hard_delete_over_http() {
        let server = spawn_test_server(None).await;
        create(&server, json!({"title": "T1", "content": "C1"})).await;

        let resp = server.client.delete(server.url("/1")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert!(server.kv.peek("note:1").await.is_none());

        let resp = server.client.delete(server.url("/1")).send().await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_reads_survive_cache_outage() {
        let server = spawn_test_server(None).await;
        create(&server, json!({"title": "T1", "content": "C1"})).await;
        server.kv.set_unavailable(true);

        let resp = server
            .client
            .get(server.url("/1?user_id=u1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = server
            .client
            .get(server.url("/recent?user_id=u1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let recent: Vec<Note> = resp.json().await.unwrap();
        assert!(recent.is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_is_internal_error() {
        let server = spawn_test_server(None).await;
        server.store.set_unavailable(true);

        let resp = server.client.get(server.url("/1")).send().await.unwrap();
        assert_eq!(resp.status(), 500);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429() {
        let limiter = build_rate_limiter(2, Duration::from_secs(600));
        let server = spawn_test_server(limiter).await;

        for _ in 0..2 {
            let resp = server
                .client
                .get(format!("{}/health", server.base_url))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
        }
        let resp = server
            .client
            .get(format!("{}/health", server.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 429);
    }

    #[tokio::test]
    async fn test_health_reports_cache_and_request_id() {
        let server = spawn_test_server(None).await;
        let resp = server
            .client
            .get(format!("{}/health", server.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.headers().contains_key("x-request-id"));
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["cache"], "connected");
    }
}
