use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio_util::sync::CancellationToken;

use crate::{
    bounded::{Interrupted, bounded},
    cnfg::RenderConfig,
    error::RenderError,
    render_session::{NavigationStatus, RenderPage, RenderSession},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// A single page-to-PDF request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub viewport: Viewport,
    pub url: String,
    pub file_name: String,
    pub output_dir: PathBuf,
    /// Time the page gets to settle after loading, before it is printed.
    pub delay: Duration,
}

impl RenderJob {
    pub fn new(url: impl Into<String>, config: &RenderConfig) -> Self {
        Self {
            viewport: config.viewport,
            url: url.into(),
            file_name: config.file_name.clone(),
            output_dir: config.output_dir.clone(),
            delay: config.delay,
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }
}

/// A printed page: the file it was written to and the bytes written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPdf {
    pub path: PathBuf,
    pub pdf: Vec<u8>,
}

/// Load `job.url` into a fresh page and print it to `job.output_path()`.
///
/// Returns `Ok(None)` when the page does not load. The returned bytes are the
/// ones this call captured, so a concurrent render overwriting the same file
/// cannot change them. The page is closed exactly once whatever happens; if
/// closing fails after another error, both are reported through
/// [`RenderError::Cleanup`].
pub async fn render(
    session: &dyn RenderSession,
    job: &RenderJob,
    step_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<RenderedPdf>, RenderError> {
    let mut page = bounded(cancel, "page creation", step_timeout, session.new_page())
        .await?
        .map_err(RenderError::Page)?;

    let captured = capture(page.as_mut(), job, step_timeout, cancel).await;

    // Cleanup runs even after cancellation, so only the timeout applies.
    let closed = match tokio::time::timeout(step_timeout, page.close()).await {
        Ok(res) => res,
        Err(_) => Err(Interrupted::TimedOut {
            step: "page close",
            limit: step_timeout,
        }
        .into()),
    };

    let pdf = match (captured, closed) {
        (Ok(pdf), Ok(())) => pdf,
        (Ok(pdf), Err(e)) => {
            tracing::warn!(url = %job.url, "failed to close page: {:#}", e);
            pdf
        }
        (Err(cause), Ok(())) => return Err(cause),
        (Err(cause), Err(cleanup)) => {
            return Err(RenderError::Cleanup {
                cause: Box::new(cause),
                cleanup,
            });
        }
    };

    let Some(pdf) = pdf else {
        return Ok(None);
    };

    let path = job.output_path();
    write_pdf(&path, &pdf)
        .await
        .map_err(|source| RenderError::Write {
            path: path.clone(),
            source,
        })?;

    tracing::debug!(path = %path.display(), bytes = pdf.len(), "rendered pdf");
    Ok(Some(RenderedPdf { path, pdf }))
}

async fn capture(
    page: &mut dyn RenderPage,
    job: &RenderJob,
    step_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>, RenderError> {
    bounded(cancel, "viewport", step_timeout, page.set_viewport(job.viewport))
        .await?
        .map_err(RenderError::Page)?;

    let status = bounded(cancel, "navigation", step_timeout, page.open(&job.url))
        .await?
        .map_err(|source| RenderError::Navigation {
            url: job.url.clone(),
            source,
        })?;

    if let NavigationStatus::Failed(reason) = status {
        tracing::debug!(url = %job.url, %reason, "page did not load");
        return Ok(None);
    }

    tokio::select! {
        _ = cancel.cancelled() => return Err(Interrupted::Cancelled { step: "render delay" }.into()),
        _ = tokio::time::sleep(job.delay) => {}
    }

    let pdf = bounded(cancel, "pdf capture", step_timeout, page.print_pdf())
        .await?
        .map_err(RenderError::Capture)?;

    Ok(Some(pdf))
}

async fn write_pdf(path: &Path, pdf: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, pdf).await
}
