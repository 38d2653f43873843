use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Minimum HS256 secret length, matching the gateway's token policy.
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(AppError::Config(format!(
                "STORAGE_BACKEND must be 'postgres' or 'memory', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub enum JwtKey {
    /// HS256 shared secret
    Secret(String),
    /// RS256 public key (PEM)
    PublicKeyPem(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt: JwtKey,
    pub typing_sweep_interval: Duration,
    pub typing_stale_after: Duration,
    pub log_format: LogFormat,
}

impl Config {
    fn env_u64(key: &str, default: u64) -> u64 {
        env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default)
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let storage = match env::var("STORAGE_BACKEND") {
            Ok(value) => StorageBackend::parse(&value)?,
            Err(_) => StorageBackend::Postgres,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config("DATABASE_URL missing".into()));
        }

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let jwt = Self::jwt_from_env()?;

        let log_format = match env::var("LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            port,
            storage,
            database_url,
            db_max_connections: Self::env_u64("DB_MAX_CONNECTIONS", 10) as u32,
            jwt,
            typing_sweep_interval: Duration::from_millis(Self::env_u64(
                "TYPING_SWEEP_INTERVAL_MS",
                1500,
            )),
            typing_stale_after: Duration::from_millis(Self::env_u64("TYPING_STALE_AFTER_MS", 5000)),
            log_format,
        })
    }

    fn jwt_from_env() -> Result<JwtKey, AppError> {
        if let Ok(pem) = env::var("JWT_PUBLIC_KEY_PEM") {
            if !pem.trim().is_empty() {
                return Ok(JwtKey::PublicKeyPem(pem));
            }
        }

        let secret = env::var("JWT_SECRET").map_err(|_| {
            AppError::Config("JWT_SECRET or JWT_PUBLIC_KEY_PEM must be set".into())
        })?;
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AppError::Config(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }
        Ok(JwtKey::Secret(secret))
    }

    /// In-memory configuration used by unit and integration tests.
    pub fn test_defaults() -> Self {
        Self {
            port: 0,
            storage: StorageBackend::Memory,
            database_url: None,
            db_max_connections: 1,
            jwt: JwtKey::Secret("test-secret-key-that-is-at-least-32-bytes!".to_string()),
            typing_sweep_interval: Duration::from_millis(1500),
            typing_stale_after: Duration::from_millis(5000),
            log_format: LogFormat::Text,
        }
    }
}
