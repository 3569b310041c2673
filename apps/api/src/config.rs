use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

const DEFAULT_REGION: &str = "us-central1";
const DEFAULT_CLUSTER_ID: &str = "cymbalflix-cluster";
const DEFAULT_INSTANCE_ID: &str = "cymbalflix-primary";
const DEFAULT_DB_NAME: &str = "cymbalflix";
const DEFAULT_EMBEDDING_MODEL: &str = "gemini-embedding-001";
const NOT_SET: &str = "(not set)";

/// Application configuration loaded from environment variables.
///
/// Missing database settings do not fail startup: the service comes up
/// unconfigured and data routes answer `503 NOT_CONFIGURED`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: String,
    pub region: String,
    pub cluster_id: String,
    pub instance_id: String,
    pub db_name: String,
    /// IAM principal used as the Postgres role.
    pub db_user: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_password: Option<String>,
    /// Full connection string; takes precedence over the discrete settings.
    pub database_url: Option<String>,
    pub embedding_model: String,
    /// JSON seed for the in-memory catalog. When set, no database is used.
    pub catalog_seed: Option<PathBuf>,
    pub port: u16,
    pub rust_log: String,
}

/// Masked view of the configuration, safe to return from the status route.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigStatus {
    pub project_id: String,
    pub region: String,
    pub cluster_id: String,
    pub instance_id: String,
    pub db_name: String,
    pub db_user: String,
    pub instance_uri: String,
    pub is_configured: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            project_id: or_default("PROJECT_ID", ""),
            region: or_default("REGION", DEFAULT_REGION),
            cluster_id: or_default("CLUSTER_ID", DEFAULT_CLUSTER_ID),
            instance_id: or_default("INSTANCE_ID", DEFAULT_INSTANCE_ID),
            db_name: or_default("DB_NAME", DEFAULT_DB_NAME),
            db_user: or_default("DB_USER", ""),
            db_host: or_default("DB_HOST", "127.0.0.1"),
            db_port: or_default("DB_PORT", "5432")
                .parse::<u16>()
                .context("DB_PORT must be a valid port number")?,
            db_password: var("DB_PASSWORD"),
            database_url: var("DATABASE_URL"),
            embedding_model: or_default("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            catalog_seed: var("CATALOG_SEED").map(PathBuf::from),
            port: or_default("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: or_default("RUST_LOG", "info"),
        })
    }

    /// `projects/{project}/locations/{region}/clusters/{cluster}/instances/{instance}`
    pub fn instance_uri(&self) -> String {
        format!(
            "projects/{}/locations/{}/clusters/{}/instances/{}",
            self.project_id, self.region, self.cluster_id, self.instance_id
        )
    }

    /// True when enough is set to open a database connection.
    pub fn is_configured(&self) -> bool {
        self.database_url.is_some() || (!self.project_id.is_empty() && !self.db_user.is_empty())
    }

    pub fn status(&self) -> ConfigStatus {
        ConfigStatus {
            project_id: or_not_set(&self.project_id),
            region: self.region.clone(),
            cluster_id: self.cluster_id.clone(),
            instance_id: self.instance_id.clone(),
            db_name: self.db_name.clone(),
            db_user: mask_principal(&self.db_user),
            instance_uri: if self.project_id.is_empty() {
                "(incomplete)".to_string()
            } else {
                self.instance_uri()
            },
            is_configured: self.is_configured(),
        }
    }
}

fn or_not_set(value: &str) -> String {
    if value.is_empty() {
        NOT_SET.to_string()
    } else {
        value.to_string()
    }
}

/// Keeps the first 20 characters of a principal.
fn mask_principal(user: &str) -> String {
    if user.is_empty() {
        return NOT_SET.to_string();
    }
    if user.chars().count() > 20 {
        let head: String = user.chars().take(20).collect();
        format!("{head}...")
    } else {
        user.to_string()
    }
}
