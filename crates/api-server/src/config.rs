use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Allow any origin, for a browser front end served elsewhere.
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            cors_allow_any: true,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT").unwrap_or_else(|_| "5000".to_string());

        Ok(Self {
            bind_addr: format!("{}:{}", host, port)
                .parse()
                .with_context(|| format!("Invalid HOST/PORT combination {}:{}", host, port))?,
            cors_allow_any: env::var("CORS_ALLOW_ANY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("CORS_ALLOW_ANY must be true or false")?,
        })
    }
}
