use axum::{
    Router,
    extract::State,
    http::{HeaderMap, Method, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use url::Url;

use crate::{
    error::HttpError,
    render::{RenderJob, render},
    state::AppState,
    store::{ConnectOptions, Record, save},
};

pub const GREETING: &str = "hello world - axum";
pub const STORE_GREETING: &str = "hello world - mongodb";

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/", get(hello))
        .route("/phantomjs", get(phantomjs))
        .route("/mongodb", get(mongodb_write))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn hello() -> &'static str {
    GREETING
}

/// Render this server's own front page to PDF and send it as a download.
async fn phantomjs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let origin = request_origin(&headers)?;
    let job = RenderJob::new(origin, &state.config.render);

    let session = state.sessions.acquire(&state.shutdown).await?;
    let rendered = render(
        session.as_ref(),
        &job,
        state.config.render.step_timeout,
        &state.shutdown,
    )
    .await?
    .ok_or(HttpError::NotFound)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", job.file_name),
            ),
        ],
        rendered.pdf,
    )
        .into_response())
}

async fn mongodb_write(State(state): State<AppState>) -> Result<&'static str, HttpError> {
    let options = ConnectOptions {
        app_name: Some(env!("CARGO_PKG_NAME").to_string()),
        connect_timeout: Some(state.store.timeout()),
    };
    let store = state.store.acquire(&options, &state.shutdown).await?;

    let saved = save(
        store.as_ref(),
        Some(Record::new("hello world")),
        state.store.timeout(),
        &state.shutdown,
    )
    .await?;
    tracing::debug!(id = ?saved.id, "saved record");

    Ok(STORE_GREETING)
}

/// `<scheme>://<host>` of the incoming request, honouring `X-Forwarded-Proto`.
fn request_origin(headers: &HeaderMap) -> Result<Url, HttpError> {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| HttpError::BadRequest(anyhow::anyhow!("missing Host header")))?;

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .filter(|proto| matches!(*proto, "http" | "https"))
        .unwrap_or("http");

    Url::parse(&format!("{}://{}", scheme, host)).map_err(|e| {
        HttpError::BadRequest(anyhow::anyhow!("invalid Host header {:?}: {}", host, e))
    })
}
