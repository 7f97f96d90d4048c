use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024 * 1024;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Header carrying the authenticated user id.
    pub user_header: String,
    /// Header carrying the display name.
    pub name_header: String,
    /// User ids granted administrator rights.
    pub admins: Vec<String>,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Hierarchical file drive over HTTP")]
pub struct Args {
    /// Host to bind to (overrides DRIVE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DRIVE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where file payloads are stored (overrides DRIVE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides DRIVE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Identity header set by the proxy (overrides DRIVE_USER_HEADER)
    #[arg(long)]
    pub user_header: Option<String>,

    /// Display name header set by the proxy (overrides DRIVE_NAME_HEADER)
    #[arg(long)]
    pub name_header: Option<String>,

    /// Comma separated administrator ids (overrides DRIVE_ADMINS)
    #[arg(long)]
    pub admins: Option<String>,

    /// Largest accepted request body (overrides DRIVE_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("DRIVE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_env("DRIVE_PORT", 3000u16)?;
        let env_storage =
            env::var("DRIVE_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("DRIVE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/drive.db".into());
        let env_user_header =
            env::var("DRIVE_USER_HEADER").unwrap_or_else(|_| "x-forwarded-user".into());
        let env_name_header = env::var("DRIVE_NAME_HEADER")
            .unwrap_or_else(|_| "x-forwarded-preferred-username".into());
        let env_admins = env::var("DRIVE_ADMINS").unwrap_or_default();
        let env_max_upload = parse_env("DRIVE_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            user_header: args.user_header.unwrap_or(env_user_header),
            name_header: args.name_header.unwrap_or(env_name_header),
            admins: split_list(&args.admins.unwrap_or(env_admins)),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
