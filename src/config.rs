use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{DEFAULT_HASH_COST, MAX_HASH_COST, MIN_HASH_COST};
use crate::store::{IN_MEMORY_PATH, StoreConfig};

const DEFAULT_DATABASE_PATH: &str = "forgeworks.db";
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:3000";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_path: PathBuf,
    pub http_bind_address: SocketAddr,
    pub busy_timeout_ms: u64,
    pub graceful_shutdown_timeout_secs: u64,
    pub password_hash_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            http_bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            graceful_shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            password_hash_cost: DEFAULT_HASH_COST,
        }
    }
}

impl ServerConfig {
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let CliArgs {
            config,
            database: cli_database,
            http_bind: cli_http_bind,
            busy_timeout_ms: cli_busy_timeout_ms,
            shutdown_timeout_secs: cli_shutdown_timeout_secs,
            password_cost: cli_password_cost,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            database: file_database,
            http_bind: file_http_bind,
            busy_timeout_ms: file_busy_timeout_ms,
            shutdown_timeout_secs: file_shutdown_timeout_secs,
            password_cost: file_password_cost,
        } = file_config;

        let database_path = cli_database
            .or(file_database)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let http_bind_address = match cli_http_bind.or(file_http_bind) {
            Some(addr) => addr,
            None => DEFAULT_HTTP_BIND
                .parse()
                .context("default bind address is not a socket address")?,
        };

        Ok(Self {
            database_path,
            http_bind_address,
            busy_timeout_ms: cli_busy_timeout_ms
                .or(file_busy_timeout_ms)
                .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
            graceful_shutdown_timeout_secs: cli_shutdown_timeout_secs
                .or(file_shutdown_timeout_secs)
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            password_hash_cost: cli_password_cost
                .or(file_password_cost)
                .unwrap_or(DEFAULT_HASH_COST),
        })
    }

    /// Configuration for a throwaway in-memory store.
    pub fn in_memory() -> Self {
        Self {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            ..Self::default()
        }
    }

    /// Rejects settings the server could only fail on later.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.database_path.as_os_str().is_empty(),
            "database path must not be empty"
        );
        if !self.is_in_memory() {
            anyhow::ensure!(
                !self.database_path.is_dir(),
                "database path {:?} is a directory",
                self.database_path
            );
        }
        anyhow::ensure!(
            self.busy_timeout_ms > 0,
            "busy timeout must be at least 1 ms"
        );
        anyhow::ensure!(
            (MIN_HASH_COST..=MAX_HASH_COST).contains(&self.password_hash_cost),
            "password hash cost {} is outside {}..={}",
            self.password_hash_cost,
            MIN_HASH_COST,
            MAX_HASH_COST
        );
        anyhow::ensure!(
            self.graceful_shutdown_timeout_secs <= 600,
            "graceful shutdown timeout {}s exceeds the 600s limit",
            self.graceful_shutdown_timeout_secs
        );
        Ok(())
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path == Path::new(IN_MEMORY_PATH)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            path: self.database_path.clone(),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

#[derive(Parser, Debug, Default, Clone)]
#[command(name = "forgeworks", about = "ForgeWorks storefront API server", version)]
pub struct CliArgs {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)",
        global = true
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "FORGEWORKS_DATABASE",
        value_name = "FILE",
        help = "SQLite database file, or :memory: for a throwaway store"
    )]
    pub database: Option<PathBuf>,

    #[arg(
        long,
        env = "FORGEWORKS_HTTP_BIND",
        value_name = "ADDR",
        help = "HTTP bind address"
    )]
    pub http_bind: Option<SocketAddr>,

    #[arg(
        long,
        env = "FORGEWORKS_BUSY_TIMEOUT_MS",
        value_name = "MS",
        help = "How long a statement waits on a locked database",
        value_parser = clap::value_parser!(u64)
    )]
    pub busy_timeout_ms: Option<u64>,

    #[arg(
        long,
        env = "FORGEWORKS_SHUTDOWN_TIMEOUT_SECS",
        value_name = "SECS",
        help = "Seconds allowed to drain connections, and again for shutdown handlers",
        value_parser = clap::value_parser!(u64)
    )]
    pub shutdown_timeout_secs: Option<u64>,

    #[arg(
        long,
        env = "FORGEWORKS_PASSWORD_COST",
        value_name = "COST",
        help = "bcrypt cost factor for stored passwords",
        value_parser = clap::value_parser!(u32)
    )]
    pub password_cost: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    database: Option<PathBuf>,
    http_bind: Option<SocketAddr>,
    busy_timeout_ms: Option<u64>,
    shutdown_timeout_secs: Option<u64>,
    password_cost: Option<u32>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
