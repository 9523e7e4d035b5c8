use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;

pub const DEFAULT_AUTH_PATH_PREFIX: &str = "/api/auth/";
pub const DEFAULT_SIEM_VENDOR: &str = "HotelSystem";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Vendor column written into CEF export lines.
    pub siem_vendor: String,
    /// Path prefix of the authentication endpoints watched for enumeration.
    pub auth_path_prefix: String,
    pub export_max_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/watchtower".to_string(),
            database_max_connections: 10,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            jwt_secret: "your-secret-key-change-this-in-production".to_string(),
            siem_vendor: DEFAULT_SIEM_VENDOR.to_string(),
            auth_path_prefix: DEFAULT_AUTH_PATH_PREFIX.to_string(),
            export_max_limit: 1000,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Config::default();

        let database_url = env::var("DATABASE_URL").unwrap_or(defaults.database_url);

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|value| value.parse().ok())
            .filter(|value| *value > 0)
            .unwrap_or(defaults.database_max_connections);

        let bind_addr = match env::var("BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| anyhow!("Invalid BIND_ADDR value: {}", raw))?,
            Err(_) => defaults.bind_addr,
        };

        let jwt_secret = env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret);
        let siem_vendor = env::var("SIEM_VENDOR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(defaults.siem_vendor);

        let auth_path_prefix = env::var("AUTH_PATH_PREFIX").unwrap_or(defaults.auth_path_prefix);
        if !auth_path_prefix.starts_with('/') {
            return Err(anyhow!(
                "AUTH_PATH_PREFIX must start with '/': {}",
                auth_path_prefix
            ));
        }

        let export_max_limit = env::var("EXPORT_MAX_LIMIT")
            .unwrap_or_else(|_| defaults.export_max_limit.to_string())
            .parse::<i64>()
            .ok()
            .filter(|value| *value > 0)
            .unwrap_or(defaults.export_max_limit);

        Ok(Config {
            database_url,
            database_max_connections,
            bind_addr,
            jwt_secret,
            siem_vendor,
            auth_path_prefix,
            export_max_limit,
        })
    }
}
