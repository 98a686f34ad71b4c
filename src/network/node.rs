// src/network/node.rs
//! Node address and login settings

use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings for reaching the job-providing node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node stratum address in `host:port` form (e.g. "127.0.0.1:3416")
    pub address: String,
    /// Login sent when the session opens
    pub login: String,
    /// Optional password sent with the login
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl NodeConfig {
    /// Parses [`address`](Self::address) into an [`Endpoint`]
    pub fn endpoint(&self) -> Result<Endpoint, MinerError> {
        self.address.parse()
    }
}

/// A `host:port` pair, resolved when connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl FromStr for Endpoint {
    type Err = MinerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || MinerError::ConfigError("Invalid node address. Use <host:port> format.".to_string());

        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
