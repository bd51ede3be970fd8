use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::warn;

use crate::{
    errors::Error,
    normalize::parse_channel_list,
    pacing::Pacing,
    ratelimit::WindowConfig,
    supervisor::load_session_token,
    Result,
};

/// Typed configuration for the monitor, read from the process environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Platform identity
    pub api_id: i32,
    pub api_hash: String,
    pub phone: Option<String>,
    /// `SESSION_STRING` if set, else the token saved in `session_file`.
    pub session_string: Option<String>,
    pub session_file: PathBuf,

    // Session gateway
    pub bridge_url: String,
    pub bridge_timeout: Duration,

    // Storage / HTTP
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,

    // Rate limiting
    pub max_calls_per_minute: u32,
    pub pacing_enabled: bool,

    // Polling
    pub poll_enabled: bool,
    pub poll_interval: Duration,
    pub poll_limit: usize,
    pub monitor_channels: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let str_of = |keys: &[&str]| keys.iter().find_map(|k| get(k).and_then(non_empty));

        let api_id_raw = str_of(&["TELEGRAM_API_ID", "API_ID"]).ok_or_else(|| {
            Error::Config("TELEGRAM_API_ID environment variable is required".to_string())
        })?;
        let api_id = api_id_raw
            .trim()
            .parse::<i32>()
            .map_err(|_| Error::Config(format!("TELEGRAM_API_ID is not a number: {api_id_raw}")))?;
        let api_hash = str_of(&["TELEGRAM_API_HASH", "API_HASH"]).ok_or_else(|| {
            Error::Config("TELEGRAM_API_HASH environment variable is required".to_string())
        })?;
        let phone = str_of(&["TELEGRAM_PHONE", "PHONE"]);

        let session_file =
            PathBuf::from(str_of(&["SESSION_FILE"]).unwrap_or("telegram_session".to_string()));
        let session_string = match str_of(&["SESSION_STRING"]) {
            Some(s) => Some(s),
            None => match load_session_token(&session_file) {
                Ok(v) => v,
                Err(e) => {
                    warn!(path = %session_file.display(), error = %e, "Ignoring unreadable session file");
                    None
                }
            },
        };
        if phone.is_none() && session_string.is_none() {
            return Err(Error::Config(
                "either TELEGRAM_PHONE or SESSION_STRING is required".to_string(),
            ));
        }

        let bridge_url = str_of(&["TELEGRAM_BRIDGE_URL"])
            .unwrap_or("http://127.0.0.1:8081".to_string())
            .trim_end_matches('/')
            .to_string();
        let bridge_timeout = Duration::from_secs(parse_or(&get, "BRIDGE_TIMEOUT_SECS", 30));

        let db_path = PathBuf::from(str_of(&["DB_PATH"]).unwrap_or("telegram_data.db".to_string()));
        let host = str_of(&["HOST"]).unwrap_or("0.0.0.0".to_string());
        let port = parse_or(&get, "PORT", 8000u16);

        let max_calls_per_minute = parse_or(&get, "MAX_CALLS_PER_MINUTE", 20u32).max(1);
        let pacing_enabled = bool_or(&get, "PACING_ENABLED", true);

        let poll_enabled = bool_or(&get, "POLL_ENABLED", true);
        let poll_interval = Duration::from_secs(parse_or(&get, "POLL_INTERVAL_SECS", 1800u64).max(1));
        let poll_limit = parse_or(&get, "POLL_LIMIT", 50usize).max(1);
        let monitor_channels = parse_channel_list(&get("MONITOR_CHANNELS").unwrap_or_default());

        Ok(Self {
            api_id,
            api_hash,
            phone,
            session_string,
            session_file,
            bridge_url,
            bridge_timeout,
            db_path,
            host,
            port,
            max_calls_per_minute,
            pacing_enabled,
            poll_enabled,
            poll_interval,
            poll_limit,
            monitor_channels,
        })
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            max_calls: self.max_calls_per_minute,
            ..WindowConfig::default()
        }
    }

    pub fn pacing(&self) -> Pacing {
        if self.pacing_enabled {
            Pacing::default()
        } else {
            Pacing::none()
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    get(key)
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn bool_or(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    get(key)
        .map(|s| {
            matches!(
                s.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

/// Existing environment variables win over the file.
fn load_dotenv_if_present(path: &Path) {
    match dotenvy::from_path(path) {
        Ok(()) => {}
        Err(e) if e.not_found() => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unreadable .env file"),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
