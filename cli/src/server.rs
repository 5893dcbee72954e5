use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::NaiveDate;
use axum::{
    Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use habitlog_core::db::Database;
use habitlog_core::models::{Identity, RemoteRow};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

/// Identity served when authentication is disabled.
const LOCAL_IDENTITY: &str = "local";

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    api_key: Option<String>,
    user_id: String,
}

impl AppState {
    fn new(db: Database, api_key: Option<String>) -> Self {
        let user_id = api_key
            .as_deref()
            .map_or_else(|| LOCAL_IDENTITY.to_string(), identity_for_key);
        Self {
            db: Arc::new(Mutex::new(db)),
            api_key,
            user_id,
        }
    }

    fn db(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Stable principal id derived from an API key: the first 16 hex digits of
/// its SHA-256.
fn identity_for_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hash.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct UpsertRowRequest {
    #[serde(default)]
    payload: serde_json::Value,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized,
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid or missing API key".to_string(),
            ),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

/// Row keys are calendar dates; payloads are stored as given.
fn check_date_key(date: &str) -> Result<(), ApiError> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{date}'. Use YYYY-MM-DD")))
}

async fn get_identity(State(state): State<AppState>) -> Json<Identity> {
    Json(Identity { id: state.user_id })
}

async fn list_rows(State(state): State<AppState>) -> Result<Json<Vec<RemoteRow>>, ApiError> {
    let rows = state
        .db()
        .list_remote_rows(&state.user_id)
        .context("failed to list rows")?;
    Ok(Json(rows))
}

async fn upsert_row(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Json(req): Json<UpsertRowRequest>,
) -> Result<Json<RemoteRow>, ApiError> {
    check_date_key(&date)?;
    let row = RemoteRow {
        date,
        payload: req.payload,
        updated_at: req.updated_at,
    };
    state
        .db()
        .upsert_remote_row(&state.user_id, &row)
        .context("failed to upsert row")?;
    Ok(Json(row))
}

async fn delete_row(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<StatusCode, ApiError> {
    check_date_key(&date)?;
    let deleted = state
        .db()
        .delete_remote_row(&state.user_id, &date)
        .context("failed to delete row")?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No entry for {date}")))
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/me", get(get_identity))
        .route("/api/entries", get(list_rows))
        .route("/api/entries/{date}", put(upsert_row).delete(delete_row))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    port: u16,
    bind: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState::new(db, api_key.clone());
    let identity = state.user_id.clone();
    let app = build_router(state);

    if let Some(ref key) = api_key {
        eprintln!(
            "API key: {}...{} (see api_key file in data directory)",
            key.get(..4).unwrap_or_default(),
            key.get(key.len().saturating_sub(4)..).unwrap_or_default(),
        );
    } else {
        warn!("authentication disabled (--no-auth)");
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
        if bind != "127.0.0.1" && bind != "localhost" {
            eprintln!(
                "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
            );
        }
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(%bind, port, %identity, "row store listening");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Serve a fresh in-memory row store on an ephemeral loopback port.
#[cfg(test)]
pub(crate) async fn spawn_ephemeral(api_key: Option<&str>) -> std::net::SocketAddr {
    let state = AppState::new(
        Database::open_in_memory().unwrap(),
        api_key.map(str::to_string),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    const KEY: &str = "test-key-abc123";

    fn test_state(api_key: Option<&str>) -> AppState {
        AppState::new(
            Database::open_in_memory().unwrap(),
            api_key.map(str::to_string),
        )
    }

    fn test_app(api_key: Option<&str>) -> Router {
        build_router(test_state(api_key))
    }

    fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
        builder.header("Authorization", format!("Bearer {KEY}"))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    fn put_row(date: &str, body: &serde_json::Value) -> axum::http::Request<Body> {
        authed(axum::http::Request::put(format!("/api/entries/{date}")))
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn identity_is_key_hash_prefix() {
        let id = identity_for_key(KEY);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, identity_for_key(KEY));
        assert_ne!(id, identity_for_key("other-key"));
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some(KEY));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_wrong_key_returns_401() {
        let app = test_app(Some(KEY));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/entries")
                    .header("Authorization", "Bearer wrong-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_returns_key_identity() {
        let app = test_app(Some(KEY));

        let response = app
            .oneshot(
                authed(axum::http::Request::get("/api/me"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["id"], identity_for_key(KEY));
    }

    #[tokio::test]
    async fn no_auth_mode_serves_local_identity() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["id"], "local");
    }

    #[tokio::test]
    async fn security_headers_on_auth_failure() {
        let app = test_app(Some("secret"));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/entries")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn upsert_then_list_ordered_by_date() {
        let app = test_app(Some(KEY));

        for (date, weight) in [("2025-01-03", 98.0), ("2025-01-01", 100.0)] {
            let body = json!({
                "payload": { "date": date, "weight": weight },
                "updated_at": format!("{date}T08:00:00.000Z"),
            });
            let response = app.clone().oneshot(put_row(date, &body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .oneshot(
                authed(axum::http::Request::get("/api/entries"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        let rows = json.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["date"], "2025-01-01");
        assert_eq!(rows[0]["payload"]["weight"], 100.0);
        assert_eq!(rows[1]["updated_at"], "2025-01-03T08:00:00.000Z");
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_replaces() {
        let state = test_state(Some(KEY));
        let app = build_router(state.clone());

        let first = json!({ "payload": { "weight": 100.0 }, "updated_at": null });
        let second = json!({ "payload": { "weight": 99.0 }, "updated_at": "2025-01-02T00:00:00Z" });
        for body in [&first, &first, &second] {
            let response = app
                .clone()
                .oneshot(put_row("2025-01-01", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let rows = state.db().list_remote_rows(&state.user_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].payload["weight"], 99.0);
    }

    #[tokio::test]
    async fn payload_is_stored_without_validation() {
        let state = test_state(None);
        let app = build_router(state.clone());

        let body = json!({ "payload": { "whatever": [1, 2, 3] } });
        let response = app.oneshot(put_row("2025-01-01", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let rows = state.db().list_remote_rows("local").unwrap();
        assert_eq!(rows[0].payload["whatever"][2], 3);
        assert!(rows[0].updated_at.is_none());
    }

    #[tokio::test]
    async fn non_date_key_returns_400() {
        let state = test_state(None);
        let app = build_router(state.clone());

        let body = json!({ "payload": {} });
        let response = app.oneshot(put_row("not-a-date", &body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("not-a-date"));
        assert!(state.db().list_remote_rows("local").unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_row_then_404() {
        let app = test_app(Some(KEY));
        let body = json!({ "payload": {}, "updated_at": null });
        app.clone()
            .oneshot(put_row("2025-01-01", &body))
            .await
            .unwrap();

        let delete = || {
            authed(axum::http::Request::delete("/api/entries/2025-01-01"))
                .body(Body::empty())
                .unwrap()
        };

        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app.oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rows_are_scoped_per_key() {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let app_for = |key: &str| {
            build_router(AppState {
                db: db.clone(),
                api_key: Some(key.to_string()),
                user_id: identity_for_key(key),
            })
        };

        let body = json!({ "payload": { "weight": 80.0 } });
        app_for(KEY)
            .oneshot(put_row("2025-01-01", &body))
            .await
            .unwrap();

        let response = app_for("other-key")
            .oneshot(
                axum::http::Request::get("/api/entries")
                    .header("Authorization", "Bearer other-key")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(json.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let app = test_app(None);
        let big = "x".repeat(BODY_LIMIT + 1);
        let body = json!({ "payload": { "notes": big } });

        let response = app
            .oneshot(
                axum::http::Request::put("/api/entries/2025-01-01")
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
