//! api-server — HTTP front end for the link registry.
//!
//! Every handler is a thin caller of one registry operation: shorten, search
//! by URL, info, update, delete and the redirect itself. State lives in a
//! single in-memory `LinkRegistry` constructed at startup and shared through
//! axum state.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # JSON logs, 8-symbol codes
//! LOG_FORMAT=json CODE_LENGTH=8 cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use domain::code::RandomCodeGenerator;
use domain::registry::LinkRegistry;
use domain::{CoreError, ExpiryUpdate, LinkRecord, LinkUpdate, NewLink, ShortCode, SystemClock};
use serde::{Deserialize, Deserializer, Serialize};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Registry = LinkRegistry<RandomCodeGenerator, SystemClock>;

#[derive(Clone)]
struct AppState {
    registry: Arc<Registry>,
    shortlink_domain: Option<String>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);

    let state = AppState {
        registry: Arc::new(LinkRegistry::with_config(
            RandomCodeGenerator::new(),
            SystemClock,
            cfg.registry,
        )),
        shortlink_domain: cfg.shortlink_domain.clone(),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = routes()
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    info!(%addr, code_length = cfg.registry.code_length, "api-server listening");
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/links", get(list_links))
        .route("/links/shorten", post(create_link))
        .route("/links/search", get(search_links))
        .route(
            "/links/:code",
            get(get_link_info).put(update_link).delete(delete_link),
        )
        .route("/:code", get(redirect_to_original))
}

#[derive(Deserialize)]
struct CreateLinkReq {
    original_url: String,
    #[serde(default)]
    custom_alias: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
}

#[derive(Deserialize)]
struct UpdateLinkReq {
    original_url: String,
    /// Absent keeps the expiration, `null` clears it, a timestamp sets it.
    #[serde(default, deserialize_with = "deserialize_some")]
    expires_at: Option<Option<String>>,
}

// Lets `Option<Option<T>>` tell a missing field from an explicit null.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct SearchQuery {
    original_url: String,
}

#[derive(Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LinkOut {
    short_code: String,
    short_url: String,
    original_url: String,
    created_at: String,
    expires_at: Option<String>,
    clicks: u64,
    last_accessed: Option<String>,
}

#[derive(Serialize)]
struct ListOut {
    links: Vec<LinkOut>,
    count: usize,
}

fn link_to_out(link: LinkRecord, headers: &HeaderMap, shortlink_domain: &Option<String>) -> LinkOut {
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    LinkOut {
        short_url: http_common::build_short_url(
            shortlink_domain.as_deref(),
            host,
            link.short_code.as_str(),
        ),
        short_code: link.short_code.as_str().to_string(),
        original_url: link.original_url,
        created_at: http_common::system_time_to_rfc3339(link.created_at),
        expires_at: link.expires_at.map(http_common::system_time_to_rfc3339),
        clicks: link.clicks,
        last_accessed: link.last_accessed.map(http_common::system_time_to_rfc3339),
    }
}

/// Map a registry error to a status code and structured body.
fn error_response(err: &CoreError) -> Response {
    let (status, body) = match err {
        CoreError::InvalidUrl(_) | CoreError::InvalidCode(_) => (
            StatusCode::BAD_REQUEST,
            http_common::json_error_with_message("invalid_request", &err.to_string()),
        ),
        CoreError::AliasConflict(_) => (
            StatusCode::BAD_REQUEST,
            http_common::json_err("alias_conflict"),
        ),
        CoreError::UrlConflict(_) => (
            StatusCode::CONFLICT,
            http_common::json_error_with_message("conflict", &err.to_string()),
        ),
        CoreError::NotFound => (StatusCode::NOT_FOUND, http_common::json_err("not_found")),
        CoreError::Expired => (StatusCode::NOT_FOUND, http_common::json_err("expired")),
        CoreError::CapacityExhausted => (
            StatusCode::SERVICE_UNAVAILABLE,
            http_common::json_err("unavailable"),
        ),
        CoreError::Storage(_) => {
            error!(err = %err, "registry failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                http_common::json_err("internal"),
            )
        }
    };
    (status, Json(body)).into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(http_common::json_error_with_message("invalid_request", message)),
    )
        .into_response()
}

/// Codes outside the code alphabet can never be stored, so they are a miss.
fn parse_code(raw: String) -> Result<ShortCode, Response> {
    ShortCode::new(raw).map_err(|_| {
        warn!("bad short code in path");
        error_response(&CoreError::NotFound)
    })
}

async fn root() -> &'static str {
    "hello from link-shortener"
}

async fn create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLinkReq>,
) -> Response {
    let expires_at = match body.expires_at.as_deref().map(http_common::parse_timestamp) {
        None => None,
        Some(Ok(t)) => Some(t),
        Some(Err(_)) => return bad_request("expires_at must be an ISO-8601 timestamp"),
    };

    let input = NewLink {
        original_url: body.original_url,
        custom_alias: body.custom_alias,
        expires_at,
    };
    match state.registry.create_or_get(input) {
        Ok(link) => {
            info!(code = %link.short_code, url = %link.original_url, "shorten ok");
            (
                StatusCode::OK,
                Json(link_to_out(link, &headers, &state.shortlink_domain)),
            )
                .into_response()
        }
        Err(e) => {
            warn!(err = %e, "shorten rejected");
            error_response(&e)
        }
    }
}

async fn search_links(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<SearchQuery>,
) -> Response {
    match state.registry.find_by_url(&q.original_url) {
        Ok(link) => (
            StatusCode::OK,
            Json(link_to_out(link, &headers, &state.shortlink_domain)),
        )
            .into_response(),
        Err(e) => {
            warn!(url = %q.original_url, err = %e, "search miss");
            error_response(&e)
        }
    }
}

async fn list_links(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<ListQuery>,
) -> Response {
    let limit = match q.limit {
        Some(n) if (1..=500).contains(&n) => n,
        Some(_) => return bad_request("limit must be between 1 and 500"),
        None => 50, // default
    };
    match state.registry.list(limit) {
        Ok(items) => {
            let links: Vec<LinkOut> = items
                .into_iter()
                .map(|l| link_to_out(l, &headers, &state.shortlink_domain))
                .collect();
            let count = links.len();
            (StatusCode::OK, Json(ListOut { links, count })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn get_link_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.registry.get_info(&code) {
        Ok(link) => (
            StatusCode::OK,
            Json(link_to_out(link, &headers, &state.shortlink_domain)),
        )
            .into_response(),
        Err(e) => {
            warn!(code = %code, err = %e, "info miss");
            error_response(&e)
        }
    }
}

async fn update_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(body): Json<UpdateLinkReq>,
) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let expires_at = match body.expires_at {
        None => ExpiryUpdate::Keep,
        Some(None) => ExpiryUpdate::Clear,
        Some(Some(s)) => match http_common::parse_timestamp(&s) {
            Ok(t) => ExpiryUpdate::Set(t),
            Err(_) => return bad_request("expires_at must be an ISO-8601 timestamp or null"),
        },
    };

    let update = LinkUpdate {
        original_url: body.original_url,
        expires_at,
    };
    match state.registry.update(&code, update) {
        Ok(link) => {
            info!(code = %code, url = %link.original_url, "update ok");
            (
                StatusCode::OK,
                Json(link_to_out(link, &headers, &state.shortlink_domain)),
            )
                .into_response()
        }
        Err(e) => {
            warn!(code = %code, err = %e, "update rejected");
            error_response(&e)
        }
    }
}

async fn delete_link(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.registry.delete(&code) {
        Ok(_) => {
            info!(code = %code, "delete ok");
            (
                StatusCode::OK,
                Json(http_common::json_message("Link deleted successfully")),
            )
                .into_response()
        }
        Err(e) => {
            warn!(code = %code, err = %e, "delete rejected");
            error_response(&e)
        }
    }
}

async fn redirect_to_original(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Response {
    let code = match parse_code(code) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match state.registry.resolve_and_track(&code) {
        Ok(link) => {
            info!(code = %code, redirect_to = %link.original_url, clicks = link.clicks, "resolve ok");
            Redirect::temporary(&link.original_url).into_response()
        }
        Err(e) => {
            warn!(code = %code, err = %e, "resolve miss");
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::util::ServiceExt;

    fn app() -> Router {
        let state = AppState {
            registry: Arc::new(LinkRegistry::new(RandomCodeGenerator::new(), SystemClock)),
            shortlink_domain: None,
        };
        routes().with_state(state)
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = router
            .clone()
            .oneshot(req.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn shorten(router: &Router, body: Value) -> (StatusCode, Value) {
        send(router, "POST", "/links/shorten", Some(body)).await
    }

    #[tokio::test]
    async fn root_says_hello() {
        let router = app();
        let resp = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"hello from link-shortener");
    }

    #[tokio::test]
    async fn create_returns_fresh_record() {
        let router = app();
        let (status, data) =
            shorten(&router, serde_json::json!({"original_url": "https://example.com/test"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["original_url"], "https://example.com/test");
        assert_eq!(data["clicks"], 0);
        assert!(data["last_accessed"].is_null());
        assert!(data["expires_at"].is_null());
        assert_eq!(data["short_code"].as_str().unwrap().len(), 6);

        let (_, again) =
            shorten(&router, serde_json::json!({"original_url": "https://example.com/test"})).await;
        assert_eq!(again["short_code"], data["short_code"]);
    }

    #[tokio::test]
    async fn alias_conflict_is_bad_request() {
        let router = app();
        let (status, data) = shorten(
            &router,
            serde_json::json!({"original_url": "https://example.com/test", "custom_alias": "mytest"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["short_code"], "mytest");

        let (status, data) = shorten(
            &router,
            serde_json::json!({"original_url": "https://example.com/another", "custom_alias": "mytest"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(data["error"]["message"], "Custom alias already in use");
    }

    #[tokio::test]
    async fn route_names_cannot_be_aliases() {
        let router = app();
        for alias in ["links", "search", "shorten"] {
            let (status, data) = shorten(
                &router,
                serde_json::json!({"original_url": "https://example.com/r", "custom_alias": alias}),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "alias {}", alias);
            assert_eq!(data["error"]["code"], "invalid_request");
        }

        // The list route still answers, and nothing was registered.
        let (status, data) = send(&router, "GET", "/links", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["count"], 0);
    }

    #[tokio::test]
    async fn invalid_input_is_bad_request() {
        let router = app();
        let (status, _) = shorten(&router, serde_json::json!({"original_url": "not a url"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = shorten(
            &router,
            serde_json::json!({"original_url": "https://example.com", "expires_at": "soon"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_with_expiration_echoes_it() {
        let router = app();
        let (status, data) = shorten(
            &router,
            serde_json::json!({"original_url": "https://example.com/test", "expires_at": "2999-01-01T00:00:00"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["expires_at"], "2999-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn info_update_delete_flow() {
        let router = app();
        let (_, created) =
            shorten(&router, serde_json::json!({"original_url": "https://example.com/test"})).await;
        let code = created["short_code"].as_str().unwrap().to_string();

        let (status, info) = send(&router, "GET", &format!("/links/{}", code), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["short_code"], code.as_str());
        assert_eq!(info["original_url"], "https://example.com/test");

        let (status, updated) = send(
            &router,
            "PUT",
            &format!("/links/{}", code),
            Some(serde_json::json!({"original_url": "https://example.com/updated"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["original_url"], "https://example.com/updated");

        let (_, info) = send(&router, "GET", &format!("/links/{}", code), None).await;
        assert_eq!(info["original_url"], "https://example.com/updated");

        let (status, msg) = send(&router, "DELETE", &format!("/links/{}", code), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(msg["message"], "Link deleted successfully");

        let (status, err) = send(&router, "GET", &format!("/links/{}", code), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["error"]["message"], "Link not found");

        let (status, _) = send(&router, "DELETE", &format!("/links/{}", code), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_expiration_null_clears_it() {
        let router = app();
        let (_, created) = shorten(
            &router,
            serde_json::json!({"original_url": "https://example.com/e", "expires_at": "2999-01-01T00:00:00Z"}),
        )
        .await;
        let uri = format!("/links/{}", created["short_code"].as_str().unwrap());

        let (_, kept) = send(
            &router,
            "PUT",
            &uri,
            Some(serde_json::json!({"original_url": "https://example.com/e"})),
        )
        .await;
        assert_eq!(kept["expires_at"], "2999-01-01T00:00:00Z");

        let (_, cleared) = send(
            &router,
            "PUT",
            &uri,
            Some(serde_json::json!({"original_url": "https://example.com/e", "expires_at": null})),
        )
        .await;
        assert!(cleared["expires_at"].is_null());
    }

    #[tokio::test]
    async fn missing_link_is_not_found() {
        let router = app();
        let (status, data) = send(&router, "GET", "/links/nonexistent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(data["error"]["message"], "Link not found");

        let (status, _) = send(
            &router,
            "PUT",
            "/links/nonexistent",
            Some(serde_json::json!({"original_url": "https://example.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn search_by_original_url() {
        let router = app();
        let url = "https://example.com/searchtest";
        let (_, created) = shorten(&router, serde_json::json!({"original_url": url})).await;

        let (status, data) =
            send(&router, "GET", &format!("/links/search?original_url={}", url), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["short_code"], created["short_code"]);
        assert_eq!(data["original_url"], url);

        let (status, data) = send(
            &router,
            "GET",
            "/links/search?original_url=https://example.com/nonexistent",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(data["error"]["message"], "Link not found");
    }

    #[tokio::test]
    async fn redirect_tracks_clicks() {
        let router = app();
        let url = "https://example.com/redirect-test";
        let (_, created) = shorten(&router, serde_json::json!({"original_url": url})).await;
        let code = created["short_code"].as_str().unwrap().to_string();

        let resp = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/{}", code))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), url);

        let (_, stats) = send(&router, "GET", &format!("/links/{}", code), None).await;
        assert_eq!(stats["clicks"], 1);
        assert!(!stats["last_accessed"].is_null());
    }

    #[tokio::test]
    async fn expired_link_reports_expiry_then_vanishes() {
        let router = app();
        let (status, created) = shorten(
            &router,
            serde_json::json!({"original_url": "https://example.com/expired", "expires_at": "2000-01-01T00:00:00"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let code = created["short_code"].as_str().unwrap().to_string();

        let (status, data) = send(&router, "GET", &format!("/{}", code), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(data["error"]["message"], "Link has expired");

        let (status, data) = send(&router, "GET", &format!("/links/{}", code), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(data["error"]["message"], "Link not found");
    }

    #[tokio::test]
    async fn list_returns_live_links() {
        let router = app();
        for i in 0..3 {
            shorten(
                &router,
                serde_json::json!({"original_url": format!("https://example.com/{}", i)}),
            )
            .await;
        }
        let (status, data) = send(&router, "GET", "/links?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data["count"], 2);

        let (status, _) = send(&router, "GET", "/links?limit=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
