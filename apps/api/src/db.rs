use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

use crate::config::Config;

/// Five pooled connections plus two overflow.
const MAX_CONNECTIONS: u32 = 7;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);

/// Result of probing the database.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub status: String,
    pub database: Option<String>,
    pub user: Option<String>,
    pub version: Option<String>,
    pub error: Option<String>,
}

/// Builds connect options from `DATABASE_URL` or the discrete `DB_*` settings.
pub fn connect_options(config: &Config) -> Result<PgConnectOptions> {
    if let Some(url) = &config.database_url {
        return url
            .parse::<PgConnectOptions>()
            .context("DATABASE_URL is not a valid Postgres connection string");
    }

    let mut options = PgConnectOptions::new()
        .host(&config.db_host)
        .port(config.db_port)
        .username(&config.db_user)
        .database(&config.db_name);
    if let Some(password) = &config.db_password {
        options = options.password(password);
    }
    Ok(options)
}

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    info!(instance = %config.instance_uri(), db = %config.db_name, "Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .max_lifetime(MAX_LIFETIME)
        .connect_with(connect_options(config)?)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Reports server version, current role and database. Never fails; errors are
/// folded into the returned status.
pub async fn check_connection(pool: &PgPool) -> ConnectionInfo {
    let probe: Result<(String, String, String), sqlx::Error> =
        sqlx::query_as("SELECT version(), current_user::text, current_database()::text")
            .fetch_one(pool)
            .await;

    match probe {
        Ok((version, user, database)) => ConnectionInfo {
            status: "connected".to_string(),
            database: Some(database),
            user: Some(user),
            version: Some(truncate_version(&version)),
            error: None,
        },
        Err(e) => {
            tracing::warn!("Connection probe failed: {e}");
            ConnectionInfo {
                status: "error".to_string(),
                database: None,
                user: None,
                version: None,
                error: Some(e.to_string()),
            }
        }
    }
}

fn truncate_version(version: &str) -> String {
    if version.chars().count() > 50 {
        let head: String = version.chars().take(50).collect();
        format!("{head}...")
    } else {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn test_connect_options_from_discrete_settings() {
        let config = config_from(&[
            ("PROJECT_ID", "p"),
            ("DB_USER", "me@example.com"),
            ("DB_PORT", "6543"),
        ]);
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "127.0.0.1");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_username(), "me@example.com");
        assert_eq!(options.get_database(), Some("cymbalflix"));
    }

    #[test]
    fn test_database_url_takes_precedence() {
        let config = config_from(&[
            ("DB_USER", "ignored"),
            ("DATABASE_URL", "postgres://alice@db.internal:5433/films"),
        ]);
        let options = connect_options(&config).unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_username(), "alice");
        assert_eq!(options.get_database(), Some("films"));
    }

    #[test]
    fn test_truncate_version_keeps_short_strings() {
        assert_eq!(truncate_version("PostgreSQL 15.5"), "PostgreSQL 15.5");
        let long = "x".repeat(60);
        assert_eq!(truncate_version(&long), format!("{}...", "x".repeat(50)));
    }
}
