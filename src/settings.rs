use std::collections::HashMap;
use std::env;

use thiserror::Error;

#[derive(Clone, Debug)]
pub struct TemplateSettings {
    pub dir: String,
    pub debug: bool,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub debug: bool,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Path prefix every route is mounted under, e.g. `/resourcehub`. Empty mounts at the root.
    pub mount_prefix: String,
    pub migrations_dir: Option<String>,
    pub template: TemplateSettings,
    pub other: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{key} must be a valid port number, got `{value}`")]
    InvalidPort { key: String, value: String },

    #[error("{key} must be a boolean (true/false/1/0), got `{value}`")]
    InvalidBool { key: String, value: String },
}

const ENV_PREFIX: &str = "RESOURCEHUB_";

impl Default for Settings {
    fn default() -> Self {
        Settings {
            debug: false,
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_url: "sqlite://resourcehub.db".to_string(),
            mount_prefix: "/resourcehub".to_string(),
            migrations_dir: None,
            template: TemplateSettings {
                dir: "templates".to_string(),
                debug: false,
            },
            other: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load settings from `RESOURCEHUB_*` environment variables, reading a `.env` file first if present.
    pub fn from_env() -> Result<Self, SettingsError> {
        let _ = dotenvy::dotenv();

        let mut settings = Settings::default();
        let mut other = HashMap::new();
        for (key, value) in env::vars() {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "HOST" => settings.host = value,
                "PORT" => {
                    settings.port = value.parse().map_err(|_| SettingsError::InvalidPort {
                        key: key.clone(),
                        value: value.clone(),
                    })?
                }
                "DEBUG" => settings.debug = parse_bool(&key, &value)?,
                "DATABASE_URL" => settings.database_url = value,
                "MOUNT_PREFIX" => settings.mount_prefix = normalize_prefix(&value),
                "MIGRATIONS_DIR" if !value.trim().is_empty() => {
                    settings.migrations_dir = Some(value)
                }
                "TEMPLATE_DIR" => settings.template.dir = value,
                "TEMPLATE_DEBUG" => settings.template.debug = parse_bool(&key, &value)?,
                _ => {
                    other.insert(name.to_string(), value);
                }
            }
        }
        settings.other = other;
        Ok(settings)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(SettingsError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// `resourcehub/` and `/resourcehub/` both become `/resourcehub`; `/` becomes empty.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
