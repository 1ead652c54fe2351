use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use axum::http::HeaderValue;

#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigins {
    Any,
    List(Vec<HeaderValue>),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub cors_origins: CorsOrigins,
    /// built SPA; served when the directory exists
    pub frontend_dir: PathBuf,
    pub status_push: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            cors_origins: CorsOrigins::Any,
            frontend_dir: PathBuf::from("frontend/build"),
            status_push: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // BIND_ADDR wins over PORT
        let bind_addr = match (get("BIND_ADDR"), get("PORT")) {
            (Some(addr), _) => addr.trim().parse().context("invalid BIND_ADDR")?,
            (None, Some(port)) => {
                let port: u16 = port.trim().parse().context("invalid PORT")?;
                SocketAddr::from(([0, 0, 0, 0], port))
            }
            (None, None) => d.bind_addr,
        };

        let cors_origins = match get("CORS_ORIGINS") {
            Some(v) => parse_origins(&v)?,
            None => d.cors_origins,
        };

        let status_push = match get("STATUS_PUSH_SECS") {
            Some(v) => {
                let secs: u64 = v.trim().parse().context("invalid STATUS_PUSH_SECS")?;
                if secs == 0 {
                    bail!("STATUS_PUSH_SECS must be positive");
                }
                Duration::from_secs(secs)
            }
            None => d.status_push,
        };

        Ok(Self {
            bind_addr,
            cors_origins,
            frontend_dir: get("FRONTEND_DIR").map(PathBuf::from).unwrap_or(d.frontend_dir),
            status_push,
        })
    }
}

fn parse_origins(raw: &str) -> Result<CorsOrigins> {
    if raw.trim() == "*" {
        return Ok(CorsOrigins::Any);
    }

    let list = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| HeaderValue::from_str(s).with_context(|| format!("invalid CORS origin: {}", s)))
        .collect::<Result<Vec<_>>>()?;

    if list.is_empty() {
        bail!("CORS_ORIGINS is empty");
    }
    Ok(CorsOrigins::List(list))
}
