use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::Duration;

/// Runtime configuration read from the environment (and `.env` when present).
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub session_key: Vec<u8>,
    pub bind_addr: String,
    pub app_env: String,
    pub allowed_email_domain: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub bootstrap_password: String,
    pub db_max_connections: u32,
    /// Honour `X-Forwarded-For` for client addresses; only behind a trusted proxy.
    pub trust_proxy: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let session_key = general_purpose::STANDARD
            .decode(require("SESSION_KEY")?.trim())
            .context("SESSION_KEY must be base64")?;
        if session_key.len() < 32 {
            bail!("SESSION_KEY must decode to at least 32 bytes");
        }

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| {
            let port = lookup("PORT").unwrap_or_else(|| "3000".to_string());
            format!("0.0.0.0:{port}")
        });

        let access_hours: i64 = parse_or(&lookup, "ACCESS_TOKEN_TTL_HOURS", 24)?;
        let refresh_days: i64 = parse_or(&lookup, "REFRESH_TOKEN_TTL_DAYS", 7)?;

        Ok(Config {
            database_url: require("DATABASE_URL")?,
            session_key,
            bind_addr,
            app_env: lookup("APP_ENV")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or_else(|| "development".to_string()),
            allowed_email_domain: lookup("ALLOWED_EMAIL_DOMAIN")
                .map(|v| v.trim().trim_start_matches('@').to_lowercase())
                .unwrap_or_else(|| "ug.edu.ec".to_string()),
            access_token_ttl: Duration::hours(access_hours),
            refresh_token_ttl: Duration::days(refresh_days),
            bootstrap_password: lookup("BOOTSTRAP_PASSWORD")
                .unwrap_or_else(|| "password123".to_string()),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            trust_proxy: parse_or(&lookup, "TRUST_PROXY", false)?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// Institutional addresses only, e.g. `alumno@ug.edu.ec`.
    pub fn email_allowed(&self, email: &str) -> bool {
        email
            .rsplit_once('@')
            .map(|(local, domain)| !local.is_empty() && domain == self.allowed_email_domain)
            .unwrap_or(false)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
