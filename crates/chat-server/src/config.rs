//! Environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use relay_core::DEFAULT_HISTORY_WINDOW;

pub const DEFAULT_WORKER_URL: &str = "http://localhost:4000";
pub const DEFAULT_AGENT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TOOL_OUTPUT_CAP: usize = 500;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub worker_url: String,
    /// `None` disables the agent deadline
    pub agent_timeout: Option<Duration>,
    pub history_window: usize,
    pub tool_output_cap: usize,
    pub archive_on_disconnect: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".chat-data"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            worker_url: DEFAULT_WORKER_URL.to_string(),
            agent_timeout: Some(Duration::from_secs(DEFAULT_AGENT_TIMEOUT_SECS)),
            history_window: DEFAULT_HISTORY_WINDOW,
            tool_output_cap: DEFAULT_TOOL_OUTPUT_CAP,
            archive_on_disconnect: true,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for unset
    /// variables
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = match lookup("CHAT_BIND_ADDR") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid CHAT_BIND_ADDR '{}': {}", raw, e))?,
            None => defaults.bind_addr,
        };

        let agent_timeout = match lookup("AGENT_TIMEOUT_SECS") {
            Some(raw) => match parse_number::<u64>("AGENT_TIMEOUT_SECS", &raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => defaults.agent_timeout,
        };

        let history_window = match lookup("CHAT_HISTORY_WINDOW") {
            Some(raw) => parse_number("CHAT_HISTORY_WINDOW", &raw)?,
            None => defaults.history_window,
        };

        let tool_output_cap = match lookup("CHAT_TOOL_OUTPUT_CAP") {
            Some(raw) => parse_number("CHAT_TOOL_OUTPUT_CAP", &raw)?,
            None => defaults.tool_output_cap,
        };

        Ok(Self {
            data_dir: lookup("CHAT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            bind_addr,
            worker_url: lookup("AGENT_WORKER_URL").unwrap_or(defaults.worker_url),
            agent_timeout,
            history_window,
            tool_output_cap,
            archive_on_disconnect: lookup("CHAT_ARCHIVE_ON_DISCONNECT")
                .and_then(|raw| parse_flag(&raw))
                .unwrap_or(defaults.archive_on_disconnect),
        })
    }
}

/// Parse a boolean flag; `None` for unrecognised values
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T>(name: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", name, raw, e))
}
