// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read once from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Root directory for the database and audit log | `./data` |
//! | `JWKS_URL` | JWKS endpoint for JWT verification | Required unless built with `dev` |
//! | `JWT_ISSUER` | Expected JWT issuer claim | Optional |
//! | `JWT_AUDIENCE` | Expected JWT audience claim | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `DEFAULT_CUSTOM_ROLE_LIMIT` | Custom role limit of new stores | `5` |
//! | `CONTEXT_CACHE_CAPACITY` | Cached user contexts | `1024` |
//! | `CONTEXT_CACHE_TTL_SECS` | Cached context lifetime | `60` |
//! | `SEED_SUPER_ADMIN` | User ID granted super-admin at startup | Optional |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::state::{DEFAULT_CONTEXT_CACHE_CAPACITY, DEFAULT_CONTEXT_CACHE_TTL};
use crate::storage::paths::DATA_ROOT;
use crate::storage::{DEFAULT_CUSTOM_ROLE_LIMIT, MAX_CUSTOM_ROLE_LIMIT};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const JWKS_URL_ENV: &str = "JWKS_URL";
pub const JWT_ISSUER_ENV: &str = "JWT_ISSUER";
pub const JWT_AUDIENCE_ENV: &str = "JWT_AUDIENCE";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const DEFAULT_CUSTOM_ROLE_LIMIT_ENV: &str = "DEFAULT_CUSTOM_ROLE_LIMIT";
pub const CONTEXT_CACHE_CAPACITY_ENV: &str = "CONTEXT_CACHE_CAPACITY";
pub const CONTEXT_CACHE_TTL_ENV: &str = "CONTEXT_CACHE_TTL_SECS";
pub const SEED_SUPER_ADMIN_ENV: &str = "SEED_SUPER_ADMIN";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("{0} must be at most {MAX_CUSTOM_ROLE_LIMIT}")]
    LimitTooHigh(&'static str),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub jwks_url: Option<String>,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
    pub log_format: LogFormat,
    pub default_custom_role_limit: u32,
    pub context_cache_capacity: usize,
    pub context_cache_ttl: Duration,
    pub seed_super_admin: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port: u16 = parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: HOST_ENV,
                value: host.clone(),
            })?;

        let log_format = match get(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: LOG_FORMAT_ENV,
                value: raw,
            })?,
            None => LogFormat::default(),
        };

        let default_custom_role_limit = parse_or(
            get(DEFAULT_CUSTOM_ROLE_LIMIT_ENV),
            DEFAULT_CUSTOM_ROLE_LIMIT_ENV,
            DEFAULT_CUSTOM_ROLE_LIMIT,
        )?;
        if default_custom_role_limit > MAX_CUSTOM_ROLE_LIMIT {
            return Err(ConfigError::LimitTooHigh(DEFAULT_CUSTOM_ROLE_LIMIT_ENV));
        }

        let ttl_secs = parse_or(
            get(CONTEXT_CACHE_TTL_ENV),
            CONTEXT_CACHE_TTL_ENV,
            DEFAULT_CONTEXT_CACHE_TTL.as_secs(),
        )?;

        Ok(Self {
            bind_addr,
            data_dir: get(DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DATA_ROOT)),
            jwks_url: get(JWKS_URL_ENV),
            jwt_issuer: get(JWT_ISSUER_ENV),
            jwt_audience: get(JWT_AUDIENCE_ENV),
            log_format,
            default_custom_role_limit,
            context_cache_capacity: parse_or(
                get(CONTEXT_CACHE_CAPACITY_ENV),
                CONTEXT_CACHE_CAPACITY_ENV,
                DEFAULT_CONTEXT_CACHE_CAPACITY,
            )?,
            context_cache_ttl: Duration::from_secs(ttl_secs),
            seed_super_admin: get(SEED_SUPER_ADMIN_ENV),
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.default_custom_role_limit, 5);
        assert_eq!(config.context_cache_capacity, 1024);
        assert_eq!(config.context_cache_ttl, Duration::from_secs(60));
        assert!(config.jwks_url.is_none());
        assert!(config.seed_super_admin.is_none());
    }

    #[test]
    fn overrides() {
        let config = config_from(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("DATA_DIR", "/srv/access"),
            ("JWKS_URL", "https://auth.example.com/jwks.json"),
            ("LOG_FORMAT", "JSON"),
            ("DEFAULT_CUSTOM_ROLE_LIMIT", "10"),
            ("CONTEXT_CACHE_TTL_SECS", "5"),
            ("SEED_SUPER_ADMIN", "user_root"),
            ("JWT_AUDIENCE", "  "),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.data_dir, PathBuf::from("/srv/access"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_custom_role_limit, 10);
        assert_eq!(config.context_cache_ttl, Duration::from_secs(5));
        assert_eq!(config.seed_super_admin.as_deref(), Some("user_root"));
        assert!(config.jwt_audience.is_none());
    }

    #[test]
    fn invalid_values() {
        assert_eq!(
            config_from(&[("PORT", "eighty")]).unwrap_err(),
            ConfigError::Invalid {
                name: PORT_ENV,
                value: "eighty".to_string()
            }
        );
        assert!(config_from(&[("LOG_FORMAT", "xml")]).is_err());
        assert_eq!(
            config_from(&[("DEFAULT_CUSTOM_ROLE_LIMIT", "51")]).unwrap_err(),
            ConfigError::LimitTooHigh(DEFAULT_CUSTOM_ROLE_LIMIT_ENV)
        );
    }
}
