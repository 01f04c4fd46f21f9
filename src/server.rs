//! HTTP report viewer.
//!
//! Serves one viewer session for a run: a header with the run name and a
//! download command, one tab per published report, and a content pane that
//! renders the selected report in a sandboxed frame.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Viewer page |
//! | `GET`/`POST` | `/tabs/{key}` | Select a tab, then redirect to `/` |
//! | `GET`  | `/reports/{key}` | The report's document |
//! | `GET`  | `/api/view` | The current view model as JSON |
//! | `GET`  | `/health` | Health check (returns version and state) |
//!
//! # Concurrency
//!
//! The session's [`TabController`] sits behind one async mutex. Handlers hold
//! the lock only to apply a transition; content is fetched with the lock
//! released while the controller reports `Loading`, so a selection that
//! arrives mid-fetch is ignored rather than queued.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "no report with key: abc" } }
//! ```

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use publish_report_core::cache::fetch_content;
use publish_report_core::catalog::build_catalog;
use publish_report_core::models::{Environment, ItemKey};
use publish_report_core::store::AttachmentStore;
use publish_report_core::tabs::{Selection, TabController, TabState};
use publish_report_core::view::{Pane, Severity, ViewModel};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Shared viewer state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn AttachmentStore>,
    env: Arc<Environment>,
    controller: Arc<Mutex<TabController>>,
}

impl AppState {
    pub fn new(store: Arc<dyn AttachmentStore>, env: Environment) -> Self {
        Self {
            store,
            env: Arc::new(env),
            controller: Arc::new(Mutex::new(TabController::new())),
        }
    }

    /// Build the catalog and load the first report.
    pub async fn load(&self) {
        let result = build_catalog(self.store.as_ref(), &self.env).await;
        let selection = {
            let mut controller = self.controller.lock().await;
            match result {
                Ok(items) => {
                    tracing::info!(count = items.len(), run = %self.env.name, "report catalog loaded");
                    controller.catalog_loaded(items)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "report catalog failed");
                    controller.catalog_failed(&err);
                    Selection::Ignored
                }
            }
        };
        self.run(selection).await;
    }

    /// Select `key`. Returns `false` if the selection was ignored.
    async fn select(&self, key: &ItemKey) -> Result<bool, AppError> {
        let selection = {
            let mut controller = self.controller.lock().await;
            if controller.item(key).is_none() {
                return Err(not_found(format!("no report with key: {}", key)));
            }
            controller.select(key)
        };
        let accepted = selection != Selection::Ignored;
        self.run(selection).await;
        Ok(accepted)
    }

    async fn run(&self, selection: Selection) {
        if let Selection::Fetch(item) = selection {
            let result = fetch_content(self.store.as_ref(), &self.env, &item).await;
            self.controller.lock().await.apply_fetch(&item.key, result);
        }
    }

    async fn view(&self) -> ViewModel {
        let controller = self.controller.lock().await;
        ViewModel::project(&controller, &self.env.name)
    }
}

/// Build the viewer router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/tabs/{key}", get(handle_select).post(handle_select))
        .route("/reports/{key}", get(handle_report))
        .route("/api/view", get(handle_view))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the viewer on `bind`.
///
/// The catalog loads in the background; the page shows the loading state
/// until it completes.
pub async fn run_server(
    bind: &str,
    store: Arc<dyn AttachmentStore>,
    env: Environment,
) -> anyhow::Result<()> {
    let state = AppState::new(store, env);
    let loader = state.clone();
    tokio::spawn(async move { loader.load().await });

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("report viewer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn busy(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "busy".to_string(),
        message: message.into(),
    }
}

fn fetch_failed(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "fetch_failed".to_string(),
        message: message.into(),
    }
}

// ============ Handlers ============

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&state.view().await))
}

async fn handle_select(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Redirect, AppError> {
    let key = ItemKey::from(key);
    if !state.select(&key).await? {
        tracing::debug!(key = %key, "selection ignored while loading");
    }
    Ok(Redirect::to("/"))
}

async fn handle_report(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Html<String>, AppError> {
    let key = ItemKey::from(key);
    {
        let controller = state.controller.lock().await;
        match controller.item(&key) {
            None => return Err(not_found(format!("no report with key: {}", key))),
            Some(item) if item.has_content() => {
                return Ok(Html(item.content.clone().unwrap_or_default()))
            }
            Some(_) => {}
        }
    }

    if !state.select(&key).await? {
        return Err(busy("another report is loading"));
    }

    let controller = state.controller.lock().await;
    match (controller.state(), controller.item(&key)) {
        (TabState::Ready(_), Some(item)) if item.has_content() => {
            Ok(Html(item.content.clone().unwrap_or_default()))
        }
        (TabState::Error(message), _) => Err(fetch_failed(message.clone())),
        _ => Err(busy("report is not loaded")),
    }
}

async fn handle_view(State(state): State<AppState>) -> Json<ViewModel> {
    Json(state.view().await)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    state: &'static str,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let label = match state.controller.lock().await.state() {
        TabState::Loading => "loading",
        TabState::Ready(_) => "ready",
        TabState::Empty(_) => "empty",
        TabState::Error(_) => "error",
    };
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        state: label,
    })
}

// ============ Rendering ============

const STYLE: &str = "body{margin:0;font-family:system-ui,sans-serif;color:#222}\
header{display:flex;align-items:center;justify-content:space-between;padding:12px 20px;border-bottom:1px solid #ddd}\
header h1{font-size:20px;margin:0}\
.command{padding:6px 12px;border:1px solid #0078d4;border-radius:2px;color:#0078d4;text-decoration:none}\
nav{display:flex;gap:4px;padding:8px 20px;border-bottom:1px solid #eee}\
nav form{margin:0}\
nav button{border:0;background:none;padding:6px 10px;cursor:pointer;border-bottom:2px solid transparent}\
nav button.selected{border-bottom-color:#0078d4;font-weight:600}\
main{padding:12px 20px}\
iframe{width:100%;height:calc(100vh - 140px);border:1px solid #eee}\
.loading{color:#666}\
.message{padding:10px 14px;border-left:4px solid}\
.message.info{border-color:#0078d4}.message.warning{border-color:#d48f00;background:#fff8e6}\
.message.error{border-color:#c50f1f;background:#fdf3f4}";

/// Render the viewer page for `view`.
pub fn render_page(view: &ViewModel) -> String {
    let loading = matches!(view.pane, Pane::Loading { .. });
    let title = escape_html(&view.title);

    let mut page = String::new();
    page.push_str("<!doctype html>\n<html><head><meta charset=\"utf-8\">");
    if loading {
        page.push_str("<meta http-equiv=\"refresh\" content=\"1\">");
    }
    page.push_str(&format!("<title>{}</title><style>{}</style></head><body>\n", title, STYLE));

    page.push_str(&format!("<header><h1>{}</h1>", title));
    if let Some(download) = &view.download {
        page.push_str(&format!(
            "<a class=\"command\" href=\"{}\" target=\"_blank\" rel=\"noopener\">{}</a>",
            escape_html(&download.url),
            escape_html(&download.label)
        ));
    }
    page.push_str("</header>\n<nav>");

    for tab in &view.tabs {
        page.push_str(&format!(
            "<form method=\"post\" action=\"/tabs/{}\"><button id=\"tab-{}\" class=\"tab{}\"{}>{}</button></form>",
            escape_html(&tab.id),
            escape_html(&tab.id),
            if tab.selected { " selected" } else { "" },
            if loading { " disabled" } else { "" },
            escape_html(&tab.label)
        ));
    }
    page.push_str("</nav>\n<main>");

    match &view.pane {
        Pane::Loading { label } => {
            page.push_str(&format!("<div class=\"loading\">{}</div>", escape_html(label)));
        }
        Pane::Document { html } => {
            page.push_str(&format!(
                "<iframe sandbox=\"allow-scripts allow-popups\" srcdoc=\"{}\"></iframe>",
                escape_html(html)
            ));
        }
        Pane::Message { text, severity } => {
            let class = match severity {
                Severity::Info => "info",
                Severity::Warning => "warning",
                Severity::Error => "error",
            };
            page.push_str(&format!(
                "<div class=\"message {}\">{}</div>",
                class,
                escape_html(text)
            ));
        }
    }
    page.push_str("</main>\n</body></html>\n");
    page
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
