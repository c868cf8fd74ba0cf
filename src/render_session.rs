use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
    error::CdpError,
    cdp::browser_protocol::{
        emulation::SetDeviceMetricsOverrideParams, page::PrintToPdfParamsBuilder,
    },
};
use futures::StreamExt;
use tokio::{
    sync::{Mutex, OnceCell},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{bounded::bounded, error::RenderError, render::Viewport};

/// Startup switches passed to every browser launch.
pub const BROWSER_SWITCHES: [&str; 2] = ["--ignore-certificate-errors", "--ssl-version-min=tls1"];

/// Outcome of loading a URL into a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationStatus {
    Success,
    Failed(String),
}

/// Starts browser processes.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, switches: &[String]) -> Result<Arc<dyn RenderSession>>;
}

/// A running browser that hands out pages.
#[async_trait]
pub trait RenderSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait RenderPage: Send {
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    /// A page that the browser could not load is [`NavigationStatus::Failed`].
    /// `Err` is kept for a broken connection to the browser itself.
    async fn open(&mut self, url: &str) -> Result<NavigationStatus>;

    async fn print_pdf(&mut self) -> Result<Vec<u8>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Owns at most one render session for the life of the server.
pub struct SessionManager {
    launcher: Box<dyn SessionLauncher>,
    switches: Vec<String>,
    launch_timeout: Duration,
    session: OnceCell<Arc<dyn RenderSession>>,
}

impl SessionManager {
    pub fn new(launcher: Box<dyn SessionLauncher>, launch_timeout: Duration) -> Self {
        Self {
            launcher,
            switches: BROWSER_SWITCHES.iter().map(|s| s.to_string()).collect(),
            launch_timeout,
            session: OnceCell::new(),
        }
    }

    /// Return the running session, launching it first if needed.
    ///
    /// Concurrent callers share a single launch. A failed launch leaves the
    /// manager empty, so the next call tries again.
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn RenderSession>, RenderError> {
        if let Some(session) = self.session.get() {
            tracing::debug!("render session already exists");
            return Ok(Arc::clone(session));
        }

        let session = self
            .session
            .get_or_try_init(|| async move {
                let session = bounded(
                    cancel,
                    "browser launch",
                    self.launch_timeout,
                    self.launcher.launch(&self.switches),
                )
                .await?
                .map_err(RenderError::Launch)?;

                tracing::info!(switches = ?self.switches, "render session launched");
                Ok::<_, RenderError>(session)
            })
            .await?;

        Ok(Arc::clone(session))
    }

    pub fn is_running(&self) -> bool {
        self.session.initialized()
    }

    /// Close the session if one was ever launched.
    pub async fn shutdown(&self) {
        let Some(session) = self.session.get() else {
            return;
        };

        match tokio::time::timeout(self.launch_timeout, session.close()).await {
            Ok(Ok(())) => tracing::info!("render session closed"),
            Ok(Err(e)) => tracing::warn!("failed to close render session: {:#}", e),
            Err(_) => tracing::warn!("timed out closing render session"),
        }
    }
}

/// Launches headless Chromium through chromiumoxide.
pub struct ChromeLauncher;

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self, switches: &[String]) -> Result<Arc<dyn RenderSession>> {
        let config = BrowserConfig::builder()
            .viewport(None) // the viewport is set per page
            .args(switches.iter().cloned())
            .build()
            .map_err(|e| anyhow::anyhow!("invalid browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config).await?;

        // The handler drives the CDP connection and must be polled for the
        // browser to make progress. Individual event errors are not fatal.
        let handler = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser handler event error: {}", e);
                }
            }
        });

        Ok(Arc::new(ChromeSession {
            browser: Mutex::new(browser),
            handler,
        }))
    }
}

pub struct ChromeSession {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>> {
        let page = self.browser.lock().await.new_page("about:blank").await?;
        Ok(Box::new(ChromePage { page }))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("closing browser")?;
        browser.wait().await.context("waiting for browser exit")?;
        self.handler.abort();
        Ok(())
    }
}

pub struct ChromePage {
    page: Page,
}

#[async_trait]
impl RenderPage for ChromePage {
    async fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        self.page.execute(params).await?;
        Ok(())
    }

    async fn open(&mut self, url: &str) -> Result<NavigationStatus> {
        navigation_outcome(self.page.goto(url).await.map(|_| ()))
    }

    async fn print_pdf(&mut self) -> Result<Vec<u8>> {
        let params = PrintToPdfParamsBuilder::default()
            .print_background(true)
            .build();

        Ok(self.page.pdf(params).await?)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.page.close().await?;
        Ok(())
    }
}

/// Split `goto` errors into load failures and browser transport errors.
fn navigation_outcome(result: Result<(), CdpError>) -> Result<NavigationStatus> {
    match result {
        Ok(()) => Ok(NavigationStatus::Success),
        Err(
            e @ (CdpError::Ws(_)
            | CdpError::NoResponse
            | CdpError::Timeout
            | CdpError::ChannelSendError(_)),
        ) => Err(anyhow::Error::new(e).context("browser connection lost during navigation")),
        Err(e) => Ok(NavigationStatus::Failed(e.to_string())),
    }
}
