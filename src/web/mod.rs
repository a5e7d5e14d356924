pub mod chat;
pub mod page;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use eyre::Result;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chat::session_store::SessionStore;

const SESSION_COOKIE: &str = "gemini_chat_session";

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionStore>,
    model: Arc<str>,
}

impl AppState {
    pub fn new(sessions: SessionStore, model: &str) -> Self {
        Self {
            sessions: Arc::new(sessions),
            model: Arc::from(model),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatForm {
    #[serde(default)]
    prompt: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", post(submit_chat))
        .route("/clear", post(clear_chat))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Gemini Chat listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let (id, handle) = state.sessions.get_or_create(session_id(&headers));

    let body = {
        let mut session = handle.lock().await;
        let error = session.take_pending_error();
        page::render_page(&state.model, session.messages(), error.as_deref())
    };

    with_session_cookie(Html(body).into_response(), id)
}

async fn submit_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Response {
    let (id, handle) = state.sessions.get_or_create(session_id(&headers));

    let input = form.prompt.trim();
    if input.is_empty() {
        debug!(session = %id, "Ignoring empty submission");
        return with_session_cookie(redirect_home(), id);
    }

    let mut session = handle.lock().await;
    match session.submit(input).await {
        Ok(_) => debug!(session = %id, "Turn completed"),
        Err(e) => warn!(session = %id, "Turn failed: {}", e),
    }
    drop(session);

    with_session_cookie(redirect_home(), id)
}

async fn clear_chat(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(id) = session_id(&headers) {
        state.sessions.remove(&id);
    }
    redirect_home()
}

fn redirect_home() -> Response {
    (StatusCode::SEE_OTHER, [(LOCATION, "/")]).into_response()
}

/// Reads the session id from the request's `Cookie` header(s).
fn session_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

/// No `Max-Age`: the cookie, and so the conversation, ends with the browser session.
fn with_session_cookie(mut response: Response, id: Uuid) -> Response {
    let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, id);
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().insert(SET_COOKIE, value);
        }
        Err(e) => warn!("Failed to build session cookie: {}", e),
    }
    response
}
