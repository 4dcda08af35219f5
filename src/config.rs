use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
}

/// Reads the service configuration from the environment.
/// `bootstrap::init_env` loads `.env` beforehand so local runs only need a file.
pub fn load() -> Result<Config> {
    let database = DatabaseConfig {
        url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
    };

    let service = ServiceConfig {
        bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
    };

    let auth = AuthConfig {
        jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
        token_ttl_minutes: env::var("TOKEN_TTL_MINUTES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(720),
    };

    Ok(Config {
        service,
        database,
        auth,
    })
}
