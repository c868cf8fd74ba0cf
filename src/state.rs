use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    cnfg::AppConfig,
    render_session::{SessionLauncher, SessionManager},
    store::{StoreConnector, StoreManager},
};

/// Shared state handed to every handler through `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionManager>,
    pub store: Arc<StoreManager>,
    /// Cancelled when the server starts shutting down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        launcher: Box<dyn SessionLauncher>,
        connector: Box<dyn StoreConnector>,
    ) -> Self {
        let sessions = SessionManager::new(launcher, config.render.step_timeout);
        let store = StoreManager::new(connector, config.store.timeout);

        Self {
            config,
            sessions: Arc::new(sessions),
            store: Arc::new(store),
            shutdown: CancellationToken::new(),
        }
    }

    /// Best-effort close of the browser and the store connection.
    pub async fn close(&self) {
        self.shutdown.cancel();
        tokio::join!(self.sessions.shutdown(), self.store.shutdown());
    }
}
