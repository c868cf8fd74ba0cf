use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use mongodb::bson::oid::ObjectId;
use tower::ServiceExt;

use helloworld_render::{
    cnfg::{self, AppConfig},
    render::Viewport,
    render_session::{NavigationStatus, RenderPage, RenderSession, SessionLauncher},
    routes,
    state::AppState,
    store::{ConnectOptions, DocumentStore, Record, StoreConnector},
};

pub const PDF: &[u8] = b"%PDF-1.4 hello world";

/// How pages opened by [`FakeLauncher`] behave.
#[derive(Clone, Copy)]
pub enum Page {
    Loads,
    DoesNotLoad,
    CaptureFails,
}

#[derive(Default)]
pub struct Browser {
    pub launches: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub urls: Mutex<Vec<String>>,
}

pub struct FakeLauncher {
    pub page: Page,
    pub refuse: bool,
    pub close_fails: bool,
    pub browser: Arc<Browser>,
}

impl FakeLauncher {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            refuse: false,
            close_fails: false,
            browser: Arc::new(Browser::default()),
        }
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self, _switches: &[String]) -> Result<Arc<dyn RenderSession>> {
        self.browser.launches.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            anyhow::bail!("could not find chrome executable");
        }
        Ok(Arc::new(FakeSession {
            page: self.page,
            close_fails: self.close_fails,
            browser: Arc::clone(&self.browser),
        }))
    }
}

struct FakeSession {
    page: Page,
    close_fails: bool,
    browser: Arc<Browser>,
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>> {
        Ok(Box::new(FakePage {
            page: self.page,
            browser: Arc::clone(&self.browser),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.browser.sessions_closed.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            anyhow::bail!("browser process already gone");
        }
        Ok(())
    }
}

struct FakePage {
    page: Page,
    browser: Arc<Browser>,
}

#[async_trait]
impl RenderPage for FakePage {
    async fn set_viewport(&mut self, _viewport: Viewport) -> Result<()> {
        Ok(())
    }

    async fn open(&mut self, url: &str) -> Result<NavigationStatus> {
        self.browser.urls.lock().unwrap().push(url.to_string());
        match self.page {
            Page::DoesNotLoad => Ok(NavigationStatus::Failed("net::ERR_CONNECTION_REFUSED".into())),
            _ => Ok(NavigationStatus::Success),
        }
    }

    async fn print_pdf(&mut self) -> Result<Vec<u8>> {
        match self.page {
            Page::CaptureFails => anyhow::bail!("Printing failed"),
            _ => Ok(PDF.to_vec()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.browser.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct Database {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub records: Mutex<Vec<Record>>,
}

#[derive(Default)]
pub struct FakeConnector {
    pub refuse: bool,
    pub reject_writes: bool,
    pub close_fails: bool,
    pub database: Arc<Database>,
}

#[async_trait]
impl StoreConnector for FakeConnector {
    async fn connect(&self, _options: &ConnectOptions) -> Result<Arc<dyn DocumentStore>> {
        self.database.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            anyhow::bail!("connection refused");
        }
        Ok(Arc::new(FakeStore {
            reject_writes: self.reject_writes,
            close_fails: self.close_fails,
            database: Arc::clone(&self.database),
        }))
    }
}

struct FakeStore {
    reject_writes: bool,
    close_fails: bool,
    database: Arc<Database>,
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn insert(&self, record: &Record) -> Result<ObjectId> {
        if self.reject_writes {
            anyhow::bail!("not primary");
        }
        let id = ObjectId::new();
        let mut stored = record.clone();
        stored.id = Some(id);
        self.database.records.lock().unwrap().push(stored);
        Ok(id)
    }

    async fn close(&self) -> Result<()> {
        self.database.closes.fetch_add(1, Ordering::SeqCst);
        if self.close_fails {
            anyhow::bail!("connection pool already closed");
        }
        Ok(())
    }
}

/// Default configuration writing into `output_dir` with no render delay.
pub fn test_config(output_dir: &Path) -> AppConfig {
    let mut config = cnfg::load_config(|_| None);
    config.render.output_dir = output_dir.to_path_buf();
    config.render.delay = Duration::ZERO;
    config.render.step_timeout = Duration::from_secs(5);
    config.store.timeout = Duration::from_secs(5);
    config
}

pub fn build_test_state(output_dir: &Path, launcher: FakeLauncher, connector: FakeConnector) -> AppState {
    AppState::new(
        Arc::new(test_config(output_dir)),
        Box::new(launcher),
        Box::new(connector),
    )
}

pub fn build_test_app(output_dir: &Path, launcher: FakeLauncher, connector: FakeConnector) -> Router {
    routes::app(build_test_state(output_dir, launcher, connector))
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("host", "localhost:1337")
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}
