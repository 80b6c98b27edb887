//! Configuration for copydeskd

use copydesk_compliance::ComplianceSettings;
use copydesk_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Approval chain and identity policy
    #[serde(default)]
    pub workflow: EngineConfig,

    /// Evaluator configuration
    #[serde(default)]
    pub compliance: ComplianceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: true,
            request_timeout_secs: 30,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// PostgreSQL storage
    Postgres {
        /// Connection URL
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Evaluator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    /// Upper bound for retrieval and reasoning calls, in seconds
    #[serde(default = "default_evaluator_timeout")]
    pub evaluator_timeout_secs: u64,

    /// Passages of policy context handed to the reasoning backend
    #[serde(default = "default_top_k")]
    pub retrieval_top_k: usize,

    /// Install the demo rule set when no rules exist yet
    #[serde(default = "default_true")]
    pub seed_demo_rules: bool,

    /// Optional OpenAI-compatible reasoning backend
    #[serde(default)]
    pub backend: Option<ReasoningBackendConfig>,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            evaluator_timeout_secs: default_evaluator_timeout(),
            retrieval_top_k: default_top_k(),
            seed_demo_rules: true,
            backend: None,
        }
    }
}

impl ComplianceConfig {
    pub fn settings(&self) -> ComplianceSettings {
        ComplianceSettings {
            evaluator_timeout: Duration::from_secs(self.evaluator_timeout_secs),
            retrieval_top_k: self.retrieval_top_k,
        }
    }
}

/// Reasoning backend endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningBackendConfig {
    /// Base URL or full chat-completions URL
    pub endpoint: String,

    pub model: String,

    /// Environment variable holding the API key; the key itself never lives in config
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    30
}

fn default_pool_size() -> u32 {
    10
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_evaluator_timeout() -> u64 {
    10
}

fn default_top_k() -> usize {
    4
}

fn default_api_key_env() -> String {
    "COPYDESK_LLM_API_KEY".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then `COPYDESK_` env vars.
    ///
    /// Nested keys use a double underscore, e.g. `COPYDESK_SERVER__LISTEN_ADDR`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("COPYDESK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
