// src/config/config.rs
use crate::{
    cli::StartOptions,
    network::{node::NodeConfig, supervisor::SessionConfig},
    types::AlgorithmType,
    utils::error::MinerError,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to run a mining session: the node to
/// connect to, the proof-of-work variant, solver threads, session timing
/// and statistics reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Cuckatoo variant to mine ("c31" or "c32")
    #[serde(default = "default_algorithm")]
    pub algorithm: AlgorithmType,

    /// Number of solver threads
    /// (0 = number of CPU cores)
    #[serde(default)]
    pub solver_threads: usize,

    /// Node connection settings; may also come from the command line
    #[serde(default)]
    pub node: Option<NodeConfig>,

    /// Reconnect, keep-alive and polling intervals
    #[serde(default)]
    pub session: SessionConfig,

    /// Statistics reporting
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Settings for the periodic status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Seconds between two status lines
    #[serde(default = "default_stats_interval")]
    pub interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            interval_secs: default_stats_interval(),
        }
    }
}

fn default_algorithm() -> AlgorithmType {
    AlgorithmType::C31
}

fn default_stats_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: default_algorithm(),
            solver_threads: 0,
            node: None,
            session: SessionConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(toml::from_str(&config_str)?)
    }

    /// Builds the configuration for `start`
    ///
    /// Loads the file named by `--config` when given, otherwise starts from
    /// defaults, then applies the command-line overrides and validates the
    /// result.
    ///
    /// # Returns
    /// * `Ok(Config)` - A configuration ready to mine with
    /// * `Err(MinerError::ConfigError)` - If any setting is missing or invalid
    pub fn resolve(opts: &StartOptions) -> Result<Self, MinerError> {
        let mut config = match &opts.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_overrides(opts);
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line options on top of the loaded values
    pub fn apply_overrides(&mut self, opts: &StartOptions) {
        if opts.node.is_some() || opts.login.is_some() || opts.pass.is_some() {
            let node = self.node.get_or_insert_with(|| NodeConfig {
                address: String::new(),
                login: String::new(),
                password: None,
            });
            if let Some(address) = &opts.node {
                node.address = address.clone();
            }
            if let Some(login) = &opts.login {
                node.login = login.clone();
            }
            if let Some(pass) = &opts.pass {
                node.password = Some(pass.clone());
            }
        }
        if let Some(algorithm) = opts.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(threads) = opts.threads {
            self.solver_threads = threads;
        }
    }

    /// Checks that the configuration can start a session
    ///
    /// # Errors
    /// Returns `MinerError::ConfigError` when the node is missing, its
    /// address is not `host:port`, the login is empty, or an interval is zero.
    pub fn validate(&self) -> Result<(), MinerError> {
        let node = self.node.as_ref().ok_or_else(|| {
            MinerError::ConfigError(
                "No node configured. Pass --node <host:port> and --login <login>.".to_string(),
            )
        })?;
        node.endpoint()?;
        if node.login.trim().is_empty() {
            return Err(MinerError::ConfigError("Login must not be empty".to_string()));
        }
        self.session.validate()?;
        if self.stats.interval_secs == 0 {
            return Err(MinerError::ConfigError(
                "stats.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Solver threads to start, resolving 0 to the number of CPU cores
    pub fn threads(&self) -> usize {
        match self.solver_threads {
            0 => num_cpus::get(),
            n => n,
        }
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let defaults = SessionConfig::default();
        let mut template = String::new();
        template.push_str("# Cuckatoo Miner Configuration\n\n");
        template.push_str("# Supported algorithms: c31, c32\n");
        template.push_str("algorithm = \"c31\"\n");
        template.push_str("# Number of solver threads (0 = auto-detect)\n");
        template.push_str("solver_threads = 0\n\n");

        template.push_str("# Node to mine against\n");
        template.push_str("[node]\n");
        template.push_str("address = \"127.0.0.1:3416\"\n");
        template.push_str("login = \"your_login\"\n");
        template.push_str("# password = \"\"\n\n");

        template.push_str("# Session timing\n");
        template.push_str("[session]\n");
        template.push_str(&format!(
            "reconnect_backoff_secs = {}\n",
            defaults.reconnect_backoff_secs
        ));
        template.push_str(&format!("keep_alive_secs = {}\n", defaults.keep_alive_secs));
        template.push_str(&format!("job_request_secs = {}\n", defaults.job_request_secs));
        template.push_str(&format!("idle_poll_ms = {}\n", defaults.idle_poll_ms));
        template.push_str(&format!("io_timeout_secs = {}\n", defaults.io_timeout_secs));
        template.push_str(&format!(
            "connect_timeout_secs = {}\n\n",
            defaults.connect_timeout_secs
        ));

        template.push_str("# Status line\n");
        template.push_str("[stats]\n");
        template.push_str(&format!("interval_secs = {}\n", default_stats_interval()));

        template
    }
}
