//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::room::RoomConfig;
use crate::game::state::{DEFAULT_MAP_HEIGHT, DEFAULT_MAP_WIDTH};

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Name of the only room type clients may join
    pub room_name: String,
    /// Map dimensions replicated to clients
    pub map_width: f32,
    pub map_height: f32,
    /// Host loop wake-up interval for each room
    pub room_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:2567".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            room_name: env::var("ROOM_NAME").unwrap_or_else(|_| "race_room".to_string()),
            map_width: parse_or("MAP_WIDTH", DEFAULT_MAP_WIDTH)?,
            map_height: parse_or("MAP_HEIGHT", DEFAULT_MAP_HEIGHT)?,
            room_interval: Duration::from_millis(parse_or("ROOM_INTERVAL_MS", 16u64)?),
        })
    }

    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            name: self.room_name.clone(),
            map_width: self.map_width,
            map_height: self.map_height,
            host_interval: self.room_interval,
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
