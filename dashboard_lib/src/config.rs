use anyhow::{Error, format_err};
use itertools::Itertools;
use log::warn;
use serde::Deserialize;
use stack_string::{StackString, format_sstr};
use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use gcal_lib::{
    credential::{GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI, redirect_uri},
    gcal_instance::GOOGLE_CALENDAR_API_BASE,
};

use crate::timezone::TimeZone;

const APP_NAME: &str = "household_dashboard_rust";

#[derive(Debug, Deserialize)]
pub struct ConfigInner {
    #[serde(default = "default_database_url")]
    pub database_url: StackString,
    pub telegram_bot_token: Option<StackString>,
    #[serde(default)]
    pub authorized_users: StackString,
    #[serde(default)]
    pub google_client_id: StackString,
    #[serde(default)]
    pub google_client_secret: StackString,
    #[serde(default = "default_calendar_id")]
    pub google_calendar_id: StackString,
    #[serde(default = "default_host", alias = "backend_host")]
    pub host: StackString,
    #[serde(default = "default_port", alias = "backend_port")]
    pub port: u32,
    #[serde(default = "default_frontend_url")]
    pub frontend_url: StackString,
    #[serde(default = "default_gcal_token_file")]
    pub gcal_token_file: PathBuf,
    #[serde(default = "default_gcal_auth_uri")]
    pub gcal_auth_uri: StackString,
    #[serde(default = "default_gcal_token_uri")]
    pub gcal_token_uri: StackString,
    #[serde(default = "default_gcal_api_base")]
    pub gcal_api_base: StackString,
    #[serde(default = "default_gcal_timeout_secs")]
    pub gcal_timeout_secs: u64,
    pub default_time_zone: Option<TimeZone>,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            telegram_bot_token: None,
            authorized_users: StackString::new(),
            google_client_id: StackString::new(),
            google_client_secret: StackString::new(),
            google_calendar_id: default_calendar_id(),
            host: default_host(),
            port: default_port(),
            frontend_url: default_frontend_url(),
            gcal_token_file: default_gcal_token_file(),
            gcal_auth_uri: default_gcal_auth_uri(),
            gcal_token_uri: default_gcal_token_uri(),
            gcal_api_base: default_gcal_api_base(),
            gcal_timeout_secs: default_gcal_timeout_secs(),
            default_time_zone: None,
        }
    }
}

#[derive(Default, Debug, Clone)]
pub struct Config(Arc<ConfigInner>);

fn default_database_url() -> StackString {
    "sqlite:///./dashboard.db".into()
}
fn default_calendar_id() -> StackString {
    "primary".into()
}
fn default_host() -> StackString {
    "0.0.0.0".into()
}
fn default_port() -> u32 {
    8000
}
fn default_frontend_url() -> StackString {
    "http://localhost:5173".into()
}
fn default_gcal_token_file() -> PathBuf {
    dirs::config_dir().map_or_else(
        || PathBuf::from("google_token.json"),
        |d| d.join(APP_NAME).join("google_token.json"),
    )
}
fn default_gcal_auth_uri() -> StackString {
    GOOGLE_AUTH_URI.into()
}
fn default_gcal_token_uri() -> StackString {
    GOOGLE_TOKEN_URI.into()
}
fn default_gcal_api_base() -> StackString {
    GOOGLE_CALENDAR_API_BASE.into()
}
fn default_gcal_timeout_secs() -> u64 {
    10
}

impl ConfigInner {
    /// Telegram user ids allowed to drive the bot. Entries that are not
    /// integers are skipped.
    pub fn authorized_user_ids(&self) -> Vec<i64> {
        self.authorized_users
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse() {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("ignoring authorized user {s}: {e}");
                    None
                }
            })
            .collect()
    }

    pub fn telegram_bot_token(&self) -> Option<&str> {
        self.telegram_bot_token
            .as_ref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn allowed_origins(&self) -> Vec<StackString> {
        [
            self.frontend_url.as_str(),
            "http://localhost:5173",
            "http://localhost:3000",
            "http://127.0.0.1:5173",
            "http://127.0.0.1:3000",
        ]
        .into_iter()
        .map(|s| s.trim_end_matches('/'))
        .filter(|s| !s.is_empty())
        .unique()
        .map(Into::into)
        .collect()
    }

    pub fn redirect_uri(&self) -> StackString {
        redirect_uri(&self.host, self.port)
    }

    /// Filesystem location of the database named by `database_url`.
    ///
    /// # Errors
    /// Return error if the url names a non-sqlite scheme
    pub fn sqlite_path(&self) -> Result<PathBuf, Error> {
        sqlite_path(&self.database_url)
    }
}

fn sqlite_path(database_url: &str) -> Result<PathBuf, Error> {
    let path = if let Some(p) = database_url.strip_prefix("sqlite:///") {
        p
    } else if let Some(p) = database_url.strip_prefix("sqlite://") {
        p
    } else if let Some(p) = database_url.strip_prefix("sqlite:") {
        p
    } else if database_url.contains("://") {
        return Err(format_err!("unsupported database url {database_url}"));
    } else {
        database_url
    };
    if path.is_empty() {
        return Err(format_err!("empty database path in {database_url}"));
    }
    Ok(PathBuf::from(path))
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Return error if the environment cannot be deserialized
    pub fn init_config() -> Result<Self, Error> {
        let fname = Path::new("config.env");
        let config_dir = dirs::config_dir().ok_or_else(|| format_err!("No CONFIG directory"))?;
        let default_fname = config_dir.join(APP_NAME).join("config.env");

        let env_file = if fname.exists() {
            fname
        } else {
            &default_fname
        };

        dotenvy::dotenv().ok();

        if env_file.exists() {
            dotenvy::from_path(env_file).ok();
        }

        let conf: ConfigInner = envy::from_env()?;

        Ok(Self(Arc::new(conf)))
    }

    pub fn summary(&self) -> StackString {
        format_sstr!(
            "listening on {}:{} calendar {} bot {}",
            self.host,
            self.port,
            self.google_calendar_id,
            if self.telegram_bot_token().is_some() {
                "enabled"
            } else {
                "disabled"
            },
        )
    }
}

impl From<ConfigInner> for Config {
    fn from(item: ConfigInner) -> Self {
        Self(Arc::new(item))
    }
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
