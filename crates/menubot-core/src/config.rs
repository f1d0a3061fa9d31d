use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, security::is_valid_secret_token, session::SessionPolicy, Result};

/// Route Telegram posts updates to.
pub const WEBHOOK_PATH: &str = "/webhook";

/// Typed configuration, read from the environment (and `.env` when present).
///
/// Credentials are opaque to the core: they are handed to the Telegram
/// adapter and never logged (`Debug` redacts them).
#[derive(Clone)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub webhook_secret: Option<String>,
    pub public_url: Option<String>,
    pub register_webhook_on_start: bool,
    pub request_timeout: Duration,

    // HTTP server
    pub host: String,
    pub port: u16,

    // Menu + sessions
    pub menu_file: Option<PathBuf>,
    pub session_ttl: Duration,
    pub max_sessions: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Different deployments used different names for the token.
        let telegram_bot_token = ["TELEGRAM_BOT_TOKEN", "BOT_TOKEN", "TELEGRAM_TOKEN"]
            .into_iter()
            .find_map(|k| get(k))
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;

        let webhook_secret = get("WEBHOOK_SECRET");
        if let Some(secret) = &webhook_secret {
            if !is_valid_secret_token(secret) {
                return Err(Error::Config(
                    "WEBHOOK_SECRET must be 1-256 characters of A-Z, a-z, 0-9, _ and -"
                        .to_string(),
                ));
            }
        }

        let public_url = get("PUBLIC_URL")
            .or_else(|| get("VERCEL_URL").map(|host| format!("https://{host}")))
            .map(|u| u.trim_end_matches('/').to_string());
        if let Some(url) = &public_url {
            if !url.starts_with("https://") {
                return Err(Error::Config(format!(
                    "PUBLIC_URL must be an https:// URL (Telegram requirement), got `{url}`"
                )));
            }
        }

        let register_webhook_on_start =
            parse_bool(get("REGISTER_WEBHOOK_ON_START")).unwrap_or(false);
        if register_webhook_on_start && public_url.is_none() {
            return Err(Error::Config(
                "REGISTER_WEBHOOK_ON_START needs PUBLIC_URL (or VERCEL_URL)".to_string(),
            ));
        }

        let request_timeout =
            Duration::from_secs(parse_num(&get, "TELEGRAM_REQUEST_TIMEOUT_SECS")?.unwrap_or(10));

        let host = get("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_num::<u16>(&get, "PORT")?.unwrap_or(5000);

        let menu_file = get("MENU_FILE").map(PathBuf::from);
        let session_ttl = Duration::from_secs(parse_num(&get, "SESSION_TTL_SECS")?.unwrap_or(86_400));
        let max_sessions = parse_num(&get, "MAX_SESSIONS")?.unwrap_or(10_000);
        if max_sessions == 0 {
            return Err(Error::Config("MAX_SESSIONS must be at least 1".to_string()));
        }

        Ok(Self {
            telegram_bot_token,
            webhook_secret,
            public_url,
            register_webhook_on_start,
            request_timeout,
            host,
            port,
            menu_file,
            session_ttl,
            max_sessions,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            ttl: self.session_ttl,
            max_sessions: self.max_sessions,
            sweep_interval: (self.session_ttl / 4).min(Duration::from_secs(60)),
        }
    }

    /// Public webhook URL, when `PUBLIC_URL` (or `VERCEL_URL`) is set.
    pub fn webhook_url(&self) -> Option<String> {
        self.public_url
            .as_ref()
            .map(|base| format!("{base}{WEBHOOK_PATH}"))
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_bot_token", &"<redacted>")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("public_url", &self.public_url)
            .field("register_webhook_on_start", &self.register_webhook_on_start)
            .field("request_timeout", &self.request_timeout)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("menu_file", &self.menu_file)
            .field("session_ttl", &self.session_ttl)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_bool(v: Option<String>) -> Option<bool> {
    v.map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key} must be a number, got `{raw}`"))),
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
