use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub web: WebConfig,
    pub database_path: String,
    pub media_path: String,
    pub media_public_url: String,
    pub allowed_origins: String,
    pub log_level: String,
    pub session_secret_key: String,
    pub admin_url_prefix: String,
    pub use_secure_cookies: bool,
    pub session_ttl_hours: i64,
    pub max_upload_size_mb: usize,
}

fn required_var(name: &str) -> Result<String, config::ConfigError> {
    env::var(name).map_err(|_| {
        config::ConfigError::Message(format!(
            "FATAL: Environment variable '{}' is not set in your .env file.",
            name
        ))
    })
}

fn require_absolute(name: &str, value: &str) -> Result<(), config::ConfigError> {
    if Path::new(value).is_relative() {
        return Err(config::ConfigError::Message(format!(
            "FATAL: The '{}' in your .env file is a relative path ('{}'). It MUST be an absolute path.",
            name, value
        )));
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, config::ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| {
            config::ConfigError::Message(format!("FATAL: '{}' has an invalid value ('{}').", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env(env_path: &Path) -> Result<Self, config::ConfigError> {
        dotenvy::from_path(env_path).map_err(|e| {
            config::ConfigError::Message(format!(
                "FATAL: Failed to load .env file from '{}'. Error: {}",
                env_path.display(),
                e
            ))
        })?;

        let database_path = required_var("DATABASE_PATH")?;
        let media_path = required_var("MEDIA_PATH")?;
        require_absolute("DATABASE_PATH", &database_path)?;
        require_absolute("MEDIA_PATH", &media_path)?;

        let session_secret_key = required_var("SESSION_SECRET_KEY")?;
        // 128 hex characters decode to the 64-byte cookie key.
        if session_secret_key.len() != 128 || !session_secret_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_SECRET_KEY' must be 128 hexadecimal characters long (64 bytes).".to_string(),
            ));
        }

        let admin_url_prefix = required_var("ADMIN_URL_PREFIX")?;
        if admin_url_prefix.is_empty()
            || !admin_url_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(config::ConfigError::Message(
                "FATAL: 'ADMIN_URL_PREFIX' must not be empty and can only contain letters, numbers, underscores, and hyphens.".to_string(),
            ));
        }

        let media_public_url =
            env::var("MEDIA_PUBLIC_URL").unwrap_or_else(|_| "http://localhost:8080/media/".to_string());
        url::Url::parse(&media_public_url).map_err(|e| {
            config::ConfigError::Message(format!("FATAL: 'MEDIA_PUBLIC_URL' is not a valid URL: {}", e))
        })?;

        let allowed_origins = env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let use_secure_cookies = env::var("USE_SECURE_COOKIES")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let session_ttl_hours: i64 = parse_var("SESSION_TTL_HOURS", 72)?;
        if session_ttl_hours <= 0 {
            return Err(config::ConfigError::Message(
                "FATAL: 'SESSION_TTL_HOURS' must be a positive number of hours.".to_string(),
            ));
        }
        let max_upload_size_mb: usize = parse_var("MAX_UPLOAD_SIZE_MB", 5)?;

        let builder = config::Config::builder()
            .add_source(config::File::new("config/default.toml", config::FileFormat::Toml))
            .set_override("database_path", database_path)?
            .set_override("media_path", media_path)?
            .set_override("media_public_url", media_public_url)?
            .set_override("session_secret_key", session_secret_key)?
            .set_override("allowed_origins", allowed_origins)?
            .set_override("log_level", log_level)?
            .set_override("use_secure_cookies", use_secure_cookies)?
            .set_override("admin_url_prefix", admin_url_prefix)?
            .set_override("session_ttl_hours", session_ttl_hours)?
            .set_override("max_upload_size_mb", max_upload_size_mb as i64)?
            .build()?;

        builder.try_deserialize()
    }

    /// Users and sessions live in their own SQLite file.
    pub fn identity_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("identity").join("identity.db")
    }

    /// Posts, categories and role grants.
    pub fn content_db_path(&self) -> PathBuf {
        PathBuf::from(&self.database_path).join("content").join("content.redb")
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}
