use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Pressmarket realtime server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(
    name = "pressmarket-server",
    version,
    about = "Realtime presence and notification server for the pressing marketplace"
)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PRESSMARKET_PORT", default_value = "8090")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "PRESSMARKET_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./pressmarket.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "PRESSMARKET_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// HS256 secret shared with the token-issuing marketplace API
    #[arg(long, env = "PRESSMARKET_JWT_SECRET", default_value = "change-me")]
    pub jwt_secret: String,

    /// Seconds between liveness sweep cycles
    #[arg(long, env = "PRESSMARKET_SWEEP_INTERVAL_SECS", default_value = "30")]
    pub sweep_interval_secs: u64,

    /// Push-notification collaborator (loaded from [push] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub push: Option<PushConfig>,
}

/// Configuration for the external push-notification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Whether outbound push delivery is enabled (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the push service (default: "http://127.0.0.1:9090")
    #[serde(default = "default_push_base_url")]
    pub base_url: String,

    /// Bearer token for the push service, if it requires one
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds (default: 10)
    #[serde(default = "default_push_timeout")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_push_base_url(),
            api_key: None,
            timeout_secs: default_push_timeout(),
        }
    }
}

fn default_push_base_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_push_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8090,
            bind_address: "0.0.0.0".to_string(),
            config: "./pressmarket.toml".to_string(),
            json_logs: false,
            generate_config: false,
            jwt_secret: "change-me".to_string(),
            sweep_interval_secs: 30,
            push: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (PRESSMARKET_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("PRESSMARKET_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Pressmarket Realtime Server Configuration
# Place this file at ./pressmarket.toml or specify with --config <path>
# All settings can be overridden via environment variables (PRESSMARKET_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8090)
# port = 8090

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# HS256 secret shared with the token-issuing marketplace API.
# Must match the API's session-token signing secret.
# jwt_secret = "change-me"

# Seconds between liveness sweep cycles (default: 30)
# A connection that misses one full cycle without answering the probe
# is terminated.
# sweep_interval_secs = 30

# ---- Push Notifications ----
# [push]

# Whether outbound web-push delivery is enabled (default: false)
# enabled = false

# Base URL of the push-notification service
# base_url = "http://127.0.0.1:9090"

# Bearer token for the push service, if it requires one
# api_key = ""

# Request timeout in seconds (default: 10)
# timeout_secs = 10
"#
    .to_string()
}
