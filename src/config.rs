use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BrowserBackend {
    /// Headless Chrome tabs; needed for storefronts rendered client-side.
    Chrome,
    /// Plain HTTP fetches of the search page.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    pub backend: BrowserBackend,
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_agent: String,
    /// Seconds.
    pub request_timeout: u64,
}

impl BrowserConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub deadline_ms: u64,
    pub results_poll_interval_ms: u64,
}

impl SearchConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn results_poll_interval(&self) -> Duration {
        Duration::from_millis(self.results_poll_interval_ms)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 15_000,
            results_poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<PathBuf>,
}

impl AppConfig {
    /// Loads layered configuration. `explicit` replaces `config/default`
    /// as the base file when given.
    pub fn load(explicit: Option<&str>) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name(explicit.unwrap_or("config/default")))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, ignored by git
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("SHELFSCAN").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.browser.chrome_path.is_none() {
            config.browser.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if Url::parse(&self.server.base_url).is_err() {
            return Err(ConfigError::Message("Invalid base URL format".into()));
        }

        if self.browser.request_timeout == 0 {
            return Err(ConfigError::Message("Browser request_timeout must be greater than 0".into()));
        }

        if self.browser.user_agent.trim().is_empty() {
            return Err(ConfigError::Message("Browser user_agent cannot be empty".into()));
        }

        if self.search.deadline_ms == 0 {
            return Err(ConfigError::Message("Search deadline_ms must be greater than 0".into()));
        }

        if self.search.results_poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Search results_poll_interval_ms must be greater than 0".into(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(ConfigError::Message("Storage max_connections must be greater than 0".into()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        if self.metrics.enabled && self.metrics.port == self.server.port {
            return Err(ConfigError::Message("Metrics port must differ from the server port".into()));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
