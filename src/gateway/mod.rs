//! Axum HTTP gateway: account pages, shared notes, and the translator.
//!
//! - Request body size limits (64KB default)
//! - Request timeouts that outlast the translate retry budget
//! - Cookie sessions checked by [`require_session`] on protected routes

pub mod error;
pub mod pages;

use crate::auth::{self, MemorySessionStore, SessionCookie, SessionStore};
use crate::config::Config;
use crate::store::{self, DocumentStore, NewUser};
use crate::translate::{self, GoogleTranslator, Translator};
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::FormRejection, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::get,
    Extension, Form, Router,
};
use error::AppError;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub cookie: Arc<SessionCookie>,
    pub translator: Arc<dyn Translator>,
    /// Attempts per translate request before the fallback message is shown.
    pub translate_max_attempts: u32,
}

impl AppState {
    /// Live session named by the request's cookie, if any.
    fn session_user(&self, headers: &HeaderMap) -> Option<SessionUser> {
        let token = self.cookie.token_from_headers(headers)?;
        let user_id = self.sessions.user_id(&token)?;
        Some(SessionUser { user_id, token })
    }
}

/// Identity attached to requests that passed [`require_session`].
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: String,
    pub token: String,
}

/// Run the HTTP gateway until Ctrl+C or SIGTERM.
pub async fn run_gateway(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let store = store::create_store(&config)?;

    let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(
        config.session.idle_ttl_secs.max(1),
    )));

    let secret = match config.session.secret {
        Some(ref s) => s.as_bytes().to_vec(),
        None => {
            tracing::warn!("No session secret configured, using a per-process random key");
            rand::random::<[u8; 32]>().to_vec()
        }
    };
    let cookie = Arc::new(SessionCookie::new(&config.session.cookie_name, &secret)?);

    let translator: Arc<dyn Translator> =
        Arc::new(GoogleTranslator::from_config(&config.translate)?);

    // Periodic idle-session sweep
    let sessions_for_sweep = Arc::clone(&sessions);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(auth::session::SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let removed = sessions_for_sweep.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "Swept idle sessions");
            }
        }
    });

    let state = AppState {
        store,
        sessions,
        cookie,
        translator,
        translate_max_attempts: config.translate.max_attempts,
    };

    let app = app(state, &config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let display_addr = listener.local_addr()?;

    println!("Lingobook listening on http://{display_addr}");
    println!("  GET  /signup     — create an account");
    println!("  GET  /login      — sign in");
    println!("  GET  /index      — home (session required)");
    println!("  GET  /notes      — shared notes (session required)");
    println!("  GET  /add-note   — add a note (session required)");
    println!("  GET  /translate  — translator (session required)");
    println!("  GET  /logout     — end the session");
    println!("  GET  /about      — about page");
    println!("  GET  /health     — health check");
    println!("  Press Ctrl+C to stop.\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down");
    Ok(())
}

/// Router wrapped in tracing, body-limit and timeout layers.
pub fn app(state: AppState, config: &Config) -> Router {
    router(state)
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
}

/// Build the router without the outer layers (see [`app`]).
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(handle_root))
        .route("/index", get(handle_index))
        .route("/notes", get(handle_notes))
        .route("/add-note", get(handle_add_note_page).post(handle_add_note))
        .route(
            "/translate",
            get(handle_translate_page).post(handle_translate),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(protected)
        .route("/signup", get(handle_signup_page).post(handle_signup))
        .route("/login", get(handle_login_page).post(handle_login))
        .route("/logout", get(handle_logout))
        .route("/about", get(handle_about))
        .route("/health", get(handle_health))
        .route("/static/style.css", get(handle_stylesheet))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AUTH GATE
// ══════════════════════════════════════════════════════════════════════════════

/// Let the request through when it carries a live session, otherwise
/// redirect to `/login` without running the handler.
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match state.session_user(request.headers()) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => Redirect::to("/login").into_response(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// FORMS
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct SignupForm {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct NoteForm {
    pub title: String,
    pub content: String,
}

/// Missing fields are sent to the translator as empty strings; the page
/// always renders.
#[derive(Debug, Deserialize)]
pub struct TranslateForm {
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "targetLanguage")]
    pub target_language: String,
}

fn form<T>(form: Result<Form<T>, FormRejection>) -> Result<T, AppError> {
    form.map(|Form(f)| f)
        .map_err(|e| AppError::MalformedForm(e.body_text()))
}

// ══════════════════════════════════════════════════════════════════════════════
// ACCOUNT HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /: gated; forwards to the home page.
async fn handle_root() -> Redirect {
    Redirect::to("/index")
}

async fn handle_signup_page() -> Html<String> {
    Html(pages::render_signup())
}

/// POST /signup: create an account unless the email is taken.
///
/// The existence check and the insert are separate store calls, so two
/// concurrent signups for one email can both succeed.
async fn handle_signup(
    State(state): State<AppState>,
    body: Result<Form<SignupForm>, FormRejection>,
) -> Result<Redirect, AppError> {
    let body = form(body)?;

    let existing = state
        .store
        .find_user_by_email(&body.email)
        .await
        .context("Error signing up")?;
    if existing.is_some() {
        return Err(AppError::UserExists);
    }

    let password_hash = auth::hash_password(&body.password).context("Error signing up")?;
    let user_id = state
        .store
        .create_user(&NewUser {
            name: body.name,
            phone: body.phone,
            email: body.email,
            password_hash,
        })
        .await
        .context("Error signing up")?;

    tracing::info!(user_id = %user_id, "User signed up");
    Ok(Redirect::to("/login"))
}

async fn handle_login_page() -> Html<String> {
    Html(pages::render_login())
}

/// POST /login: verify credentials and start a session.
async fn handle_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Form<LoginForm>, FormRejection>,
) -> Result<Response, AppError> {
    let body = form(body)?;

    let user = state
        .store
        .find_user_by_email(&body.email)
        .await
        .context("Error logging in")?
        .ok_or(AppError::UserNotFound)?;

    if !auth::verify_password(&body.password, &user.password_hash).context("Error logging in")? {
        return Err(AppError::IncorrectPassword);
    }

    // A fresh token per login; drop whatever session the browser had.
    if let Some(previous) = state.cookie.token_from_headers(&headers) {
        state
            .sessions
            .destroy(&previous)
            .context("Error logging in")?;
    }
    let token = state.sessions.create(&user.id).context("Error logging in")?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok((
        [(header::SET_COOKIE, state.cookie.set_cookie(&token))],
        Redirect::to("/index"),
    )
        .into_response())
}

/// GET /logout: destroy the current session, if any. Not gated.
async fn handle_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(token) = state.cookie.token_from_headers(&headers) {
        state
            .sessions
            .destroy(&token)
            .context("Error destroying session")?;
    }

    Ok((
        [(header::SET_COOKIE, state.cookie.clear_cookie())],
        Redirect::to("/login"),
    )
        .into_response())
}

async fn handle_index() -> Html<String> {
    Html(pages::render_index())
}

// ══════════════════════════════════════════════════════════════════════════════
// NOTES HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /notes: every note in the store, no limit.
async fn handle_notes(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let notes = state
        .store
        .list_notes()
        .await
        .context("Error getting notes")?;
    Ok(Html(pages::render_notes(&notes)))
}

async fn handle_add_note_page() -> Html<String> {
    Html(pages::render_add_note())
}

/// POST /add-note: store a shared note. Empty fields are accepted.
async fn handle_add_note(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    body: Result<Form<NoteForm>, FormRejection>,
) -> Result<Redirect, AppError> {
    let body = form(body)?;
    let note_id = state
        .store
        .add_note(&body.title, &body.content)
        .await
        .context("Error adding note")?;
    tracing::debug!(note_id = %note_id, user_id = %user.user_id, "Note added");
    Ok(Redirect::to("/notes"))
}

// ══════════════════════════════════════════════════════════════════════════════
// TRANSLATE HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

async fn handle_translate_page() -> Html<String> {
    Html(pages::render_translate("", "", None))
}

/// POST /translate: always 200; shows the translation or the fixed
/// failure message.
async fn handle_translate(
    State(state): State<AppState>,
    body: Result<Form<TranslateForm>, FormRejection>,
) -> Result<Html<String>, AppError> {
    let body = form(body)?;
    let translated = translate::translate_or_fallback(
        state.translator.as_ref(),
        &body.text,
        &body.target_language,
        state.translate_max_attempts,
    )
    .await;
    Ok(Html(pages::render_translate(
        &body.text,
        &body.target_language,
        Some(&translated),
    )))
}

// ══════════════════════════════════════════════════════════════════════════════
// PUBLIC PAGES
// ══════════════════════════════════════════════════════════════════════════════

async fn handle_about(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    Html(pages::render_about(state.session_user(&headers).is_some()))
}

/// GET /health: always public (no secrets leaked)
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "store": state.store.name(),
    }))
}

async fn handle_stylesheet() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        pages::stylesheet(),
    )
}
