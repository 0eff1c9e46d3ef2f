//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use crate::ServerConfig;
use crate::auth::hash_password;
use crate::db::Database;
use crate::distance::UpstreamConfig;
use crate::rate_limit::RateLimitSettings;
use clap::Parser;
use tracing::{error, info, warn};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Environment variable holding the password for `--add-user`.
pub const PASSWORD_ENV: &str = "PINDISTANCE_PASSWORD";

pub const DEFAULT_MAPS_URL: &str = "https://maps.googleapis.com/maps/api";
pub const DEFAULT_REGISTRY_URL: &str =
    "https://api.data.gov.in/resource/5c2f62fe-5afa-4119-a499-fec9d604d5bd";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pindistance",
    about = "Distance between Indian pincodes behind JWT authentication"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE", default_value = "pindistance.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Google Maps API key; enables /api/pincode/distance
    #[arg(long, env = "MAPS_API_KEY", hide_env_values = true)]
    pub maps_api_key: Option<String>,

    /// Post-office registry API key; enables /api/pincode/distancev2
    #[arg(long, env = "REGISTRY_API_KEY", hide_env_values = true)]
    pub registry_api_key: Option<String>,

    /// Base URL of the Google Maps web services
    #[arg(long, default_value = DEFAULT_MAPS_URL, value_parser = validate_url)]
    pub maps_url: String,

    /// Resource URL of the post-office registry
    #[arg(long, default_value = DEFAULT_REGISTRY_URL, value_parser = validate_url)]
    pub registry_url: String,

    /// Timeout for each outbound API call, in seconds
    #[arg(long, default_value = "10")]
    pub upstream_timeout_secs: u64,

    /// Requests allowed per client per minute (0 disables the rule)
    #[arg(long, default_value = "5")]
    pub rate_limit_per_minute: u32,

    /// Requests allowed per client per five minutes (0 disables the rule)
    #[arg(long, default_value = "20")]
    pub rate_limit_per_five_minutes: u32,

    /// Client IPs exempt from rate limiting, comma separated
    #[arg(long, value_delimiter = ',', default_value = "127.0.0.1")]
    pub rate_limit_whitelist: Vec<String>,

    /// Use the X-Real-IP header as the client address (only behind a proxy that sets it)
    #[arg(long)]
    pub trust_real_ip: bool,

    /// Create or update a user with the password from PINDISTANCE_PASSWORD, then exit
    #[arg(long, value_name = "USERNAME")]
    pub add_user: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_url(s: &str) -> Result<String, String> {
    let url = Url::parse(s).map_err(|e| format!("Invalid URL '{}': {}", s, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("URL must use http or https: {}", s));
    }
    Ok(s.to_string())
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // SAFETY: called during startup before the runtime spawns any task
        // that reads the environment.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Handle the --add-user flag: create the user, or reset their password if
/// they already exist. Exits the process either way.
pub async fn handle_add_user(db: &Database, username: &str) {
    let username = username.trim();
    if username.is_empty() {
        error!("Username must not be blank");
        std::process::exit(1);
    }

    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.trim().is_empty() => {
            // SAFETY: called during startup before the server starts.
            unsafe { std::env::remove_var(PASSWORD_ENV) };
            password
        }
        _ => {
            error!("Set {} to the new user's password", PASSWORD_ENV);
            std::process::exit(1);
        }
    };

    let hash = match hash_password(&password) {
        Ok(hash) => hash,
        Err(e) => {
            error!(error = %e, "Failed to hash password");
            std::process::exit(1);
        }
    };

    match store_user(db, username, &hash).await {
        Ok(outcome) => {
            info!(username = %username, "{}", outcome);
            println!("{}: {}", outcome, username);
            std::process::exit(0);
        }
        Err(e) => {
            error!(username = %username, error = %e, "Failed to store user");
            std::process::exit(1);
        }
    }
}

/// Create the user, or replace an existing user's password and sign out
/// every session they hold.
async fn store_user(
    db: &Database,
    username: &str,
    hash: &str,
) -> Result<&'static str, sqlx::Error> {
    if db.users().get_by_username(username).await?.is_none() {
        db.users().create(username, hash).await?;
        return Ok("User created");
    }

    db.users().set_password_hash(username, hash).await?;
    let revoked = db.refresh_tokens().revoke_all(username).await?;
    info!(username = %username, revoked, "Revoked refresh tokens after password change");
    Ok("Password updated")
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: Args, db: Database, jwt_secret: String) -> ServerConfig {
    let maps = non_empty(args.maps_api_key).map(|key| UpstreamConfig::new(args.maps_url, key));
    let registry =
        non_empty(args.registry_api_key).map(|key| UpstreamConfig::new(args.registry_url, key));

    if maps.is_none() {
        warn!("No maps API key configured, /api/pincode/distance is disabled");
    }
    if registry.is_none() {
        warn!("No registry API key configured, /api/pincode/distancev2 is disabled");
    }

    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        maps,
        registry,
        upstream_timeout: Duration::from_secs(args.upstream_timeout_secs),
        rate_limit: RateLimitSettings {
            per_minute: args.rate_limit_per_minute,
            per_five_minutes: args.rate_limit_per_five_minutes,
            whitelist: args
                .rate_limit_whitelist
                .into_iter()
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty())
                .collect(),
        },
        trust_real_ip: args.trust_real_ip,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
