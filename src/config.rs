//! Configuration: credentials and rules files, plus environment settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::ConfigError;

fn default_instance_name() -> String {
    "AI Instance".to_string()
}

/// On-disk shape of the credentials file.
#[derive(Deserialize)]
struct RawCredentials {
    homeserver: String,
    #[serde(default)]
    user_id: String,
    access_token: String,
    room_id: String,
    #[serde(default = "default_instance_name")]
    instance_name: String,
}

/// Channel credentials, loaded from a JSON file.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub homeserver: String,
    pub user_id: String,
    pub access_token: SecretString,
    pub room_id: String,
    pub instance_name: String,
}

impl Credentials {
    /// Load credentials from a JSON file.
    ///
    /// A missing file, invalid JSON, or an empty required field is fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let raw: RawCredentials =
            serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let creds = Self {
            homeserver: raw.homeserver.trim_end_matches('/').to_string(),
            user_id: raw.user_id,
            access_token: SecretString::from(raw.access_token),
            room_id: raw.room_id,
            instance_name: raw.instance_name,
        };
        creds.validate()?;
        Ok(creds)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        let required = [
            ("homeserver", self.homeserver.as_str()),
            ("user_id", self.user_id.as_str()),
            ("access_token", self.access_token.expose_secret()),
            ("room_id", self.room_id.as_str()),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: key.to_string(),
                    hint: "Set it in the credentials file.".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Lowercase, hyphenated instance identifier ("Aria Nova" → "aria-nova").
    pub fn instance_id(&self) -> String {
        instance_id(&self.instance_name)
    }
}

/// Lowercase, hyphenated form of an instance display name.
///
/// Only `[a-z0-9-]` survives; runs of anything else become a single `-`. The
/// result is embedded in session IDs, which double as file names.
pub fn instance_id(instance_name: &str) -> String {
    let mut id = String::with_capacity(instance_name.len());
    for c in instance_name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            id.push(c);
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    let id = id.trim_matches('-');
    if id.is_empty() {
        instance_id(&default_instance_name())
    } else {
        id.to_string()
    }
}

/// Optional overrides for the rule table and allow-list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RulesFile {
    /// Extra allow-list entries (exact identities or prefixes).
    #[serde(default)]
    pub allowed_senders: Vec<String>,
    /// Replaces the built-in topical keyword set when non-empty.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Extra direct-mention tokens.
    #[serde(default)]
    pub mention_tokens: Vec<String>,
}

impl RulesFile {
    /// Load the rules file. A missing file yields the empty default.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// What to do with a session when every worker slot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPolicy {
    /// Wait for a free slot (the poll loop is never blocked).
    Queue,
    /// Record the session as failed immediately.
    Reject,
}

impl std::str::FromStr for AdmissionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::InvalidValue {
                key: "DISPATCH_ADMISSION".to_string(),
                message: format!("expected 'queue' or 'reject', got '{other}'"),
            }),
        }
    }
}

/// Dispatcher settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub credentials_path: PathBuf,
    pub rules_path: PathBuf,
    pub log_path: PathBuf,
    pub sessions_dir: PathBuf,
    pub context_path: PathBuf,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub fetch_limit: usize,
    pub allowed_senders: Vec<String>,
    pub max_sessions: usize,
    pub admission: AdmissionPolicy,
    /// Worker program followed by its fixed arguments; the prompt is appended last.
    pub worker_command: Vec<String>,
    pub announce: bool,
}

impl DispatcherConfig {
    /// Build config from environment variables, defaulting paths to the install root.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(install_root(), |key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(root: PathBuf, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path_or = |key: &str, default: PathBuf| {
            lookup(key)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default)
        };

        let number = |key: &str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("expected a non-negative integer, got '{raw}'"),
                }),
                None => Ok(default),
            }
        };

        let allowed_senders: Vec<String> = lookup("DISPATCH_ALLOWED_SENDERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let admission = match lookup("DISPATCH_ADMISSION") {
            Some(raw) => raw.parse()?,
            None => AdmissionPolicy::Queue,
        };

        let worker_command: Vec<String> = lookup("DISPATCH_WORKER_CMD")
            .unwrap_or_else(|| "claude --print".to_string())
            .split_whitespace()
            .map(String::from)
            .collect();
        if worker_command.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "DISPATCH_WORKER_CMD".to_string(),
                message: "worker command is empty".to_string(),
            });
        }

        let at_least_one = |key: &str, default: u64| -> Result<u64, ConfigError> {
            let value = number(key, default)?;
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            Ok(value)
        };

        let max_sessions = at_least_one("DISPATCH_MAX_SESSIONS", 4)? as usize;
        let fetch_limit = at_least_one("DISPATCH_FETCH_LIMIT", 10)? as usize;
        let poll_interval_secs = at_least_one("DISPATCH_POLL_INTERVAL_SECS", 5)?;

        let announce = lookup("DISPATCH_ANNOUNCE")
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            credentials_path: path_or(
                "DISPATCH_CREDENTIALS",
                root.join("config/matrix-credentials.json"),
            ),
            rules_path: path_or("DISPATCH_RULES", root.join("config/dispatch-rules.json")),
            log_path: path_or("DISPATCH_LOG", root.join("logs/dispatcher.log")),
            sessions_dir: path_or("DISPATCH_SESSIONS_DIR", root.join("sessions")),
            context_path: path_or("DISPATCH_CONTEXT_FILE", root.join("config/continuity.md")),
            poll_interval: Duration::from_secs(poll_interval_secs),
            retry_delay: Duration::from_secs(number("DISPATCH_RETRY_DELAY_SECS", 10)?),
            fetch_limit,
            allowed_senders,
            max_sessions,
            admission,
            worker_command,
            announce,
        })
    }
}

/// Install root: the parent of the directory holding the executable.
fn install_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
