use std::env;

use crate::error::PdoflowError;

/// PostgreSQL connection parameters, read from environment variables.
///
/// Precedence (highest first), matching the original's
/// `pdoflow.io` module:
///
/// 1. `DATABASE_URL`, used as-is if set.
/// 2. The discrete `POSTGRES_{HOST,PORT,DB,USER,PASSWORD}` variables,
///    each with a documented default except `POSTGRES_PASSWORD`
///    (defaults to empty, matching local-trust-auth development setups).
///
/// There is deliberately no third "configuration file" tier the way the
/// original had — `spec.md` §6 scopes schema bootstrap and connection
/// configuration out of the core, and a config file format is exactly
/// the kind of thing that belongs in that excluded bootstrap layer.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: String::new(),
        }
    }
}

impl DbConfig {
    /// Build from environment variables, falling fast with
    /// [`PdoflowError::Config`] rather than silently binding an
    /// unconfigured session.
    pub fn from_env() -> Result<Self, PdoflowError> {
        let defaults = Self::default();
        let port = match env::var("POSTGRES_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| PdoflowError::Config(format!("invalid POSTGRES_PORT: {raw}")))?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            host: env::var("POSTGRES_HOST").unwrap_or(defaults.host),
            port,
            database: env::var("POSTGRES_DB").unwrap_or(defaults.database),
            username: env::var("POSTGRES_USER").unwrap_or(defaults.username),
            password: env::var("POSTGRES_PASSWORD").unwrap_or(defaults.password),
        })
    }

    /// Render a `postgres://` connection string sqlx can connect with.
    pub fn to_connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// `DATABASE_URL` if set, otherwise [`DbConfig::from_env`] rendered
    /// as a connection string.
    pub fn resolve_connection_string() -> Result<String, PdoflowError> {
        if let Ok(url) = env::var("DATABASE_URL") {
            return Ok(url);
        }
        Ok(Self::from_env()?.to_connection_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize these tests
    // so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "DATABASE_URL",
            "POSTGRES_HOST",
            "POSTGRES_PORT",
            "POSTGRES_DB",
            "POSTGRES_USER",
            "POSTGRES_PASSWORD",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = DbConfig::from_env().unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "postgres");
    }

    #[test]
    fn database_url_takes_precedence() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("DATABASE_URL", "postgres://x:y@z:1/db");
        env::set_var("POSTGRES_HOST", "ignored");
        let resolved = DbConfig::resolve_connection_string().unwrap();
        assert_eq!(resolved, "postgres://x:y@z:1/db");
        clear_env();
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("POSTGRES_PORT", "not-a-number");
        let err = DbConfig::from_env().unwrap_err();
        assert!(matches!(err, PdoflowError::Config(_)));
        clear_env();
    }
}
