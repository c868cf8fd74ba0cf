use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::bounded::Interrupted;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(#[source] anyhow::Error),

    #[error("failed to open page: {0}")]
    Page(#[source] anyhow::Error),

    #[error("failed to load {url}: {source}")]
    Navigation {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to print page to pdf: {0}")]
    Capture(#[source] anyhow::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The page could not be closed after `cause`.
    #[error("{cause} (closing the page also failed: {cleanup})")]
    Cleanup {
        #[source]
        cause: Box<RenderError>,
        cleanup: anyhow::Error,
    },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to connect to document store: {0}")]
    Connection(#[source] anyhow::Error),

    #[error("failed to write record: {0}")]
    Write(#[source] anyhow::Error),

    #[error("invalid record: {0}")]
    InvalidInput(&'static str),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

pub enum HttpError {
    BadRequest(anyhow::Error),
    NotFound,
    InternalServerError(anyhow::Error),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        match self {
            HttpError::BadRequest(err) => {
                (StatusCode::BAD_REQUEST, format!("Bad Request: {}", err)).into_response()
            }
            HttpError::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
            HttpError::InternalServerError(err) => {
                tracing::error!("Internal Server Error: {:#}", err);

                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}

// Lets handlers use `?` on anything convertible to `anyhow::Error`, which covers
// `RenderError`, `StoreError` and io errors.
impl<E> From<E> for HttpError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}
