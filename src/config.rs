// src/config.rs
//
// Server configuration from CLI flags with environment fallbacks.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "portscope", about = "Multi-channel serial port monitoring server")]
pub struct ServerConfig {
    /// HTTP/WebSocket listen port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory for persistent macro and profile stores
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Serial port hot-plug poll interval
    #[arg(long, env = "PORT_POLL_INTERVAL_MS", default_value_t = 2000)]
    pub poll_interval_ms: u64,

    /// Comma-separated decoder keys to enable (default: all builtins)
    #[arg(long, env = "DECODERS")]
    pub decoders: Option<String>,

    /// Require HTTP Basic credentials on the REST surface
    #[arg(long, env = "AUTH_ENABLED", default_value_t = false)]
    pub auth_enabled: bool,

    #[arg(long, env = "AUTH_USER")]
    pub auth_user: Option<String>,

    #[arg(long, env = "AUTH_PASS")]
    pub auth_pass: Option<String>,

    /// TLS termination is delegated to a fronting proxy; these are accepted
    /// so deployments can keep one environment file
    #[arg(long, env = "TLS_ENABLED", default_value_t = false)]
    pub tls_enabled: bool,

    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<PathBuf>,
}

impl ServerConfig {
    /// Decoder keys from the comma list, or `None` for all builtins.
    pub fn decoder_keys(&self) -> Option<Vec<String>> {
        self.decoders.as_ref().map(|list| {
            list.split(',')
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect()
        })
    }

    pub fn macros_path(&self) -> PathBuf {
        self.data_dir.join("macros.json")
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir.join("profiles.json")
    }
}

// ============================================================================
// Tests
// ============================================================================
