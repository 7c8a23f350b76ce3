//! Configuration system for keyward.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `keyward.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `KEYWARD_SERVER_HOST` - Server bind address
//! - `KEYWARD_SERVER_PORT` - Server port
//! - `KEYWARD_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `KEYWARD_DATABASE_URL` - Database connection URL (routed by scheme)
//! - `KEYWARD_DATABASE_MAX_CONNECTIONS` - Connection pool size
//! - `KEYWARD_LOGGING_ENABLED` - Enable logging
//! - `KEYWARD_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `KEYWARD_ADMIN_SECRET` - Admin credential (`env:OTHER_VAR` reads it from `OTHER_VAR`)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::credential::AdminSecret;
use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<KeywardConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywardConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Admin credential configuration
    pub admin: AdminConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://keyward.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/keyward".to_string(),
            max_connections: 5,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// Admin credential configuration.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Shared admin secret (use `env:VAR_NAME` to read from environment)
    pub secret: String,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("secret_set", &!self.secret.is_empty())
            .finish()
    }
}

impl AdminConfig {
    /// Resolve the configured secret, following an `env:` indirection.
    ///
    /// Returns `None` when nothing usable is configured.
    pub fn resolve_secret(&self) -> Option<AdminSecret> {
        match self.secret.strip_prefix("env:") {
            Some(var) => env::var(var).ok().and_then(AdminSecret::new),
            None => AdminSecret::new(self.secret.clone()),
        }
    }
}

impl KeywardConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `keyward.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let builder = Config::builder()
            // Start with defaults
            .set_default("server.host", "127.0.0.1")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("server.port", 8080)
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("database.db_type", "sqlite")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("database.sqlite_url", "sqlite://keyward.db?mode=rwc")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("database.postgres_url", "postgres://localhost/keyward")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("database.max_connections", 5)
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("logging.enabled", true)
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("logging.level", "info")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_default("admin.secret", "")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            // Load from keyward.toml (optional)
            .add_source(config::File::with_name("keyward").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("KEYWARD_SERVER_HOST").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "server.port",
                env::var("KEYWARD_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option("database.db_type", env::var("KEYWARD_DATABASE_TYPE").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.sqlite_url",
                env::var("KEYWARD_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.postgres_url",
                env::var("KEYWARD_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.max_connections",
                env::var("KEYWARD_DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option(
                "logging.enabled",
                env::var("KEYWARD_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option("logging.level", env::var("KEYWARD_LOG_LEVEL").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .set_override_option("admin.secret", env::var("KEYWARD_ADMIN_SECRET").ok())
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(LicenseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }

    /// The admin secret, or a configuration error if none is set.
    pub fn require_admin_secret(&self) -> LicenseResult<AdminSecret> {
        self.admin.resolve_secret().ok_or_else(|| {
            LicenseError::ConfigError(
                "admin.secret is required (set KEYWARD_ADMIN_SECRET)".to_string(),
            )
        })
    }

    /// Connection URL for the configured backend.
    pub fn database_url(&self) -> &str {
        match self.database.db_type.as_str() {
            "postgres" => &self.database.postgres_url,
            _ => &self.database.sqlite_url,
        }
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static KeywardConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = KeywardConfig::load()?;
    config.validate()?;

    // Another thread may have won; either value is equivalent.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| LicenseError::ConfigError("configuration was not initialized".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KeywardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database_url(), "sqlite://keyward.db?mode=rwc");
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = KeywardConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = KeywardConfig::default();
        config.database.db_type = "mysql".to_string();
        assert!(config.validate().is_err());

        let mut config = KeywardConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = KeywardConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_admin_secret_is_config_error() {
        let config = KeywardConfig::default();
        assert!(matches!(
            config.require_admin_secret(),
            Err(LicenseError::ConfigError(_))
        ));
    }

    #[test]
    fn literal_admin_secret_resolves() {
        let mut config = KeywardConfig::default();
        config.admin.secret = "plain-secret".to_string();
        let secret = config.require_admin_secret().unwrap();
        assert!(secret.verify("plain-secret"));
    }

    #[test]
    fn env_indirection_resolves_through_variable() {
        env::set_var("KEYWARD_UNIT_INDIRECT_SECRET", "from-indirect-var");
        let admin = AdminConfig {
            secret: "env:KEYWARD_UNIT_INDIRECT_SECRET".to_string(),
        };

        let secret = admin.resolve_secret().unwrap();
        assert!(secret.verify("from-indirect-var"));

        env::remove_var("KEYWARD_UNIT_INDIRECT_SECRET");
        assert!(admin.resolve_secret().is_none());
    }

    #[test]
    fn admin_config_debug_hides_secret() {
        let admin = AdminConfig {
            secret: "plain-secret".to_string(),
        };
        assert!(!format!("{admin:?}").contains("plain-secret"));
    }

    #[test]
    fn postgres_url_selected_for_postgres() {
        let mut config = KeywardConfig::default();
        config.database.db_type = "postgres".to_string();
        assert_eq!(config.database_url(), "postgres://localhost/keyward");
    }
}
