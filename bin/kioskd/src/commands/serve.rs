//! JSON-over-HTTP gateway exposing the session broker.
//!
//! Every foreground call comes back as a structured status body; the single
//! translation boundary from error kinds to responses lives in
//! [`error_body`].

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use kioskd_core::{Config, CookieRecord, Error, Paths};
use kioskd_driver::ChromeLauncher;
use kioskd_session::{Action, SessionBroker, StartOutcome, StateStore, StopOutcome};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[derive(Clone)]
struct GatewayState {
    broker: Arc<SessionBroker>,
}

pub async fn run(
    host: Option<String>,
    port: Option<u16>,
    url: Option<String>,
) -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;
    if url.is_some() {
        config.session.target_url = url;
    }

    let store = StateStore::open(config.state_file(&paths));
    let launcher = Arc::new(ChromeLauncher {
        browser_path: config.session.browser_path.clone(),
        window: Some((config.session.window_width, config.session.window_height)),
    });
    let broker = SessionBroker::new(
        config.session.clone(),
        store,
        config.profile_root(&paths),
        launcher,
    );

    let state = GatewayState { broker };

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/session/start", post(handle_start))
        .route("/session/stop", post(handle_stop))
        .route("/session/screenshot", get(handle_screenshot))
        .route("/session/navigate", post(handle_navigate))
        .route("/session/interact", post(handle_interact))
        .route(
            "/session/cookies",
            get(handle_cookies_get).post(handle_cookies_set),
        )
        .layer(CorsLayer::permissive())
        .with_state(state);

    let host = host.unwrap_or(config.gateway.host);
    let port = port.unwrap_or(config.gateway.port);
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("kioskd gateway listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn error_body(e: &Error) -> Json<Value> {
    Json(json!({"status": "error", "message": e.to_string()}))
}

async fn handle_health(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "session": state.broker.status(),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct StartRequest {
    url: Option<String>,
}

async fn handle_start(
    State(state): State<GatewayState>,
    body: Option<Json<StartRequest>>,
) -> impl IntoResponse {
    let url = body.and_then(|Json(req)| req.url);
    match state.broker.start(url).await {
        Ok(StartOutcome::Started) => Json(json!({"status": "started"})),
        Ok(StartOutcome::AlreadyRunning) => Json(json!({"status": "already_running"})),
        Err(e) => error_body(&e),
    }
}

async fn handle_stop(State(state): State<GatewayState>) -> impl IntoResponse {
    match state.broker.stop().await {
        Ok(StopOutcome::Stopped) => Json(json!({"status": "stopped"})),
        Ok(StopOutcome::NotRunning) => Json(json!({"status": "not_running"})),
        Err(e) => error_body(&e),
    }
}

async fn handle_screenshot(State(state): State<GatewayState>) -> impl IntoResponse {
    match state.broker.screenshot() {
        Some(frame) => Json(json!({"image": frame.image_base64})),
        None => Json(json!({"error": "not available"})),
    }
}

#[derive(Debug, Deserialize)]
struct NavigateRequest {
    url: String,
}

async fn handle_navigate(
    State(state): State<GatewayState>,
    Json(req): Json<NavigateRequest>,
) -> impl IntoResponse {
    match state.broker.navigate(&req.url).await {
        Ok(current_url) => Json(json!({"status": "success", "current_url": current_url})),
        Err(e) => error_body(&e),
    }
}

async fn handle_interact(
    State(state): State<GatewayState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let action: Action = match serde_json::from_value(body) {
        Ok(action) => action,
        Err(e) => {
            return Json(json!({
                "status": "error",
                "message": format!("invalid interaction: {}", e),
            }))
        }
    };
    match state.broker.interact(&action).await {
        Ok(()) => Json(json!({"status": "success"})),
        Err(e) => error_body(&e),
    }
}

async fn handle_cookies_get(State(state): State<GatewayState>) -> impl IntoResponse {
    match state.broker.cookies().await {
        Ok(cookies) => Json(json!(cookies)),
        Err(e) => error_body(&e),
    }
}

#[derive(Debug, Deserialize)]
struct SetCookiesRequest {
    #[serde(default)]
    cookies: Vec<CookieRecord>,
}

async fn handle_cookies_set(
    State(state): State<GatewayState>,
    Json(req): Json<SetCookiesRequest>,
) -> impl IntoResponse {
    match state.broker.set_cookies(&req.cookies).await {
        Ok(()) => Json(json!({"status": "success"})),
        Err(e) => error_body(&e),
    }
}
