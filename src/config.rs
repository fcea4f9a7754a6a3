// src/config.rs - Configuration management
use anyhow::{Context, Result};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub watcher: WatcherConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub keep_alive: u64,
    pub client_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub max_request_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub console_enabled: bool,
}

/// Stock-feed poller settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
            keep_alive: 30,
            client_timeout: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:pos.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
            idle_timeout: 600,
        }
    }
}

// Dummy secret for tests only; real deployments set JWT_SECRET.
impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dummy_32_chars_for_tests_only!!!".to_string(),
            token_expiration_hours: 24,
            bcrypt_cost: 10,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_request_size: 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_enabled: true,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 500,
            debounce_ms: 1000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

pub fn generate_jwt_secret() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

pub fn load_env_file() -> Result<()> {
    if let Ok(env_file) = env::var("ENV_FILE") {
        dotenvy::from_filename(&env_file)
            .with_context(|| format!("Failed to load environment file: {}", env_file))?;
    } else if Path::new(".env").exists() {
        dotenvy::dotenv().context("Failed to load .env file")?;
    }
    Ok(())
}

impl Config {
    pub fn load() -> Result<Config> {
        load_env_file()?;

        let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
            let config_str = fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {}", config_file))?;
            toml::from_str(&config_str)
                .with_context(|| format!("Failed to parse config file: {}", config_file))?
        } else {
            Config::default()
        };

        config.override_with_env();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    fn override_with_env(&mut self) {
        if let Ok(host) = env::var("BIND_ADDRESS") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("POS_PORT").map(|v| v.parse::<u16>()) {
            if let Ok(port) = port {
                self.server.port = port;
            }
        }
        if let Ok(workers) = env::var("POS_WORKERS").map(|v| v.parse::<usize>()) {
            if let Ok(workers) = workers {
                self.server.workers = Some(workers);
            }
        }
        if let Ok(jwt_secret) = env::var("JWT_SECRET") {
            self.auth.jwt_secret = jwt_secret;
        }
        if let Ok(expiration) = env::var("AUTH_TOKEN_EXPIRATION_HOURS").map(|v| v.parse::<i64>()) {
            if let Ok(expiration) = expiration {
                self.auth.token_expiration_hours = expiration;
            }
        }
        if let Ok(cost) = env::var("AUTH_BCRYPT_COST").map(|v| v.parse::<u32>()) {
            if let Ok(cost) = cost {
                self.auth.bcrypt_cost = cost;
            }
        }
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(max_conn) = env::var("DATABASE_MAX_CONNECTIONS").map(|v| v.parse::<u32>()) {
            if let Ok(max_conn) = max_conn {
                self.database.max_connections = max_conn;
            }
        }
        if let Ok(origins) = env::var("ALLOWED_ORIGINS") {
            self.security.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(level) = env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long (current: {})",
                self.auth.jwt_secret.len()
            ));
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(anyhow::anyhow!(
                "max_connections ({}) must be >= min_connections ({})",
                self.database.max_connections,
                self.database.min_connections
            ));
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("watcher poll_interval_ms must be positive"));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        env::var("POS_ENV").map(|v| v == "production").unwrap_or(false)
    }

    pub fn print_startup_info(&self) {
        log::info!("POS backend starting up");
        log::info!("Server: {}:{}", self.server.host, self.server.port);
        log::info!("Database: {}", self.database.url);
        log::info!("Auth: JWT ({}h expiration)", self.auth.token_expiration_hours);
        log::info!("Logging: {} level", self.logging.level);
        log::info!(
            "Stock feed: {}",
            if self.watcher.enabled { "enabled" } else { "disabled" }
        );

        if !self.is_production() {
            log::warn!("Running in development mode");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.watcher.enabled);
        assert!(config.auth.jwt_secret.len() >= 32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());

        config.auth.jwt_secret = "a".repeat(32);
        assert!(config.validate().is_ok());

        config.database.max_connections = 1;
        config.database.min_connections = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_loading() {
        let toml_content = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [auth]
        jwt_secret = "test_secret_123456789012345678901234567890"
        "#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.auth.jwt_secret,
            "test_secret_123456789012345678901234567890"
        );
        // Sections absent from the file fall back to defaults.
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_generate_jwt_secret() {
        let secret = generate_jwt_secret();
        assert_eq!(secret.len(), 64);
        assert_ne!(secret, generate_jwt_secret());
    }
}
