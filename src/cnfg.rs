use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use dotenv::dotenv;
use once_cell::sync::Lazy;

use crate::render::Viewport;

pub const DEFAULT_PORT: u16 = 1337;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum AppEnv {
    #[default]
    Development,
    Production,
}

impl AppEnv {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(self) -> &'static str {
        match self {
            AppEnv::Development => "helloworld_render=debug,tower_http=debug",
            AppEnv::Production => "helloworld_render=info,tower_http=info",
        }
    }
}

impl FromStr for AppEnv {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "production" | "prod" => Ok(AppEnv::Production),
            other => Err(format!("unknown APP_ENV {:?}", other)),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct AppConfig {
    pub env: AppEnv,
    pub port: u16,
    pub render: RenderConfig,
    pub store: StoreConfig,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RenderConfig {
    pub viewport: Viewport,
    pub file_name: String,
    pub output_dir: PathBuf,
    pub delay: Duration,
    /// Upper bound for each browser call: launch, page, navigation, capture.
    pub step_timeout: Duration,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct StoreConfig {
    pub host: String,
    pub database: String,
    pub collection: String,
    /// Upper bound for opening the connection and for each write.
    pub timeout: Duration,
}

impl StoreConfig {
    pub fn uri(&self) -> String {
        format!("mongodb://{}/{}", self.host, self.database)
    }
}

static CONFIG: Lazy<Arc<AppConfig>> = Lazy::new(|| {
    dotenv().ok();
    Arc::new(load_config(|key| std::env::var(key).ok()))
});

/// Build the configuration from a variable lookup, falling back to defaults
/// for anything unset or unparsable.
pub fn load_config(var: impl Fn(&str) -> Option<String>) -> AppConfig {
    let env = var("APP_ENV")
        .and_then(|v| {
            v.parse::<AppEnv>()
                .map_err(|e| tracing::warn!("{}, using development", e))
                .ok()
        })
        .unwrap_or_default();

    // Some hosts export the port in lowercase.
    let port = parsed(&var, "PORT")
        .or_else(|| parsed(&var, "port"))
        .unwrap_or(DEFAULT_PORT);

    let render = RenderConfig {
        viewport: Viewport {
            width: 1575,
            height: 1650,
        },
        file_name: "helloworld.pdf".to_string(),
        output_dir: var("OUTPUT_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./tmp/")),
        delay: Duration::from_millis(parsed(&var, "RENDER_DELAY_MS").unwrap_or(1000)),
        step_timeout: Duration::from_secs(parsed(&var, "STEP_TIMEOUT_SECS").unwrap_or(30)),
    };

    let store = StoreConfig {
        host: var("DB_PORT_27017_TCP_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "localhost".to_string()),
        database: "helloworld".to_string(),
        collection: "mongooses".to_string(),
        timeout: Duration::from_secs(parsed(&var, "STORE_TIMEOUT_SECS").unwrap_or(10)),
    };

    AppConfig {
        env,
        port,
        render,
        store,
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

pub fn get() -> Arc<AppConfig> {
    Arc::clone(&CONFIG)
}
