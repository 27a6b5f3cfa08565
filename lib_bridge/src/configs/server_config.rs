use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Config file looked up in the working directory when `--config-path` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "bridge_server.conf";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Every option is optional so layers can be merged; [`ServerConfig`] is the
/// resolved form.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Camera view bridge consumer server", version)]
#[serde(rename_all = "camelCase")]
pub struct ServerArgs {
    #[clap(long, env = "BRIDGE_HOST", help = "Address to bind.")]
    pub host: Option<String>,

    #[clap(long, env = "BRIDGE_PORT", help = "Port to listen on.")]
    pub port: Option<u16>,

    #[clap(long, env = "BRIDGE_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "BRIDGE_INPUT_DIR", help = "Directory for uploaded input assets.")]
    pub input_dir: Option<PathBuf>,

    #[clap(long, env = "BRIDGE_OUTPUT_DIR", help = "Directory for output assets.")]
    pub output_dir: Option<PathBuf>,

    #[clap(long, env = "BRIDGE_TEMP_DIR", help = "Directory for temporary assets.")]
    pub temp_dir: Option<PathBuf>,

    #[clap(long, env = "BRIDGE_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "BRIDGE_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "BRIDGE_MAX_BODY_MB", help = "Largest accepted request body in MiB.")]
    pub max_body_mb: Option<usize>,

    #[clap(long, env = "BRIDGE_PLACEHOLDER_SIZE", help = "Edge length of the black placeholder image.")]
    pub placeholder_size: Option<u32>,
}

impl ServerArgs {
    /// `other` wins wherever it has a value.
    pub fn merge(self, other: ServerArgs) -> ServerArgs {
        ServerArgs {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            input_dir: other.input_dir.or(self.input_dir),
            output_dir: other.output_dir.or(self.output_dir),
            temp_dir: other.temp_dir.or(self.temp_dir),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            max_body_mb: other.max_body_mb.or(self.max_body_mb),
            placeholder_size: other.placeholder_size.or(self.placeholder_size),
        }
    }

    pub fn defaults() -> ServerArgs {
        ServerArgs {
            host: Some("127.0.0.1".to_string()),
            port: Some(8188),
            config_path: None,
            input_dir: Some(PathBuf::from("./input")),
            output_dir: Some(PathBuf::from("./output")),
            temp_dir: Some(PathBuf::from("./temp")),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            max_body_mb: Some(64),
            placeholder_size: Some(512),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub max_body_mb: usize,
    pub placeholder_size: u32,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_mb.saturating_mul(1024 * 1024)
    }
}

impl TryFrom<ServerArgs> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: ServerArgs) -> Result<Self, Self::Error> {
        let defaults = ServerArgs::defaults();
        let args = defaults.merge(args);
        let missing = |name: &str| ConfigError::Invalid(format!("{name} is not set"));

        let config = ServerConfig {
            host: args.host.ok_or_else(|| missing("host"))?,
            port: args.port.ok_or_else(|| missing("port"))?,
            input_dir: args.input_dir.ok_or_else(|| missing("input_dir"))?,
            output_dir: args.output_dir.ok_or_else(|| missing("output_dir"))?,
            temp_dir: args.temp_dir.ok_or_else(|| missing("temp_dir"))?,
            log_dir: args.log_dir.ok_or_else(|| missing("log_dir"))?,
            log_level: args.log_level.ok_or_else(|| missing("log_level"))?,
            max_body_mb: args.max_body_mb.ok_or_else(|| missing("max_body_mb"))?,
            placeholder_size: args.placeholder_size.ok_or_else(|| missing("placeholder_size"))?,
        };
        if config.max_body_mb == 0 {
            return Err(ConfigError::Invalid("max_body_mb must be at least 1".to_string()));
        }
        if config.placeholder_size == 0 {
            return Err(ConfigError::Invalid("placeholder_size must be at least 1".to_string()));
        }
        Ok(config)
    }
}

/// Reads one JSON config layer. A missing file is not an error.
pub fn read_config_file(path: &Path) -> Result<Option<ServerArgs>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let args = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(args))
}

/// Candidate config files in lookup order.
fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => {
            let mut paths = vec![PathBuf::from(DEFAULT_CONFIG_FILE)];
            if let Some(dir) = dirs::config_dir() {
                paths.push(dir.join("bridge").join(DEFAULT_CONFIG_FILE));
            }
            paths
        }
    }
}

/// Resolves the server configuration: defaults, then the first config file
/// found, then `cli` (which already carries environment variables).
pub fn load_config(cli: ServerArgs) -> Result<ServerConfig, ConfigError> {
    let mut current = ServerArgs::defaults();

    let explicit = cli.config_path.clone();
    let mut loaded = false;
    for path in config_candidates(explicit.as_deref()) {
        match read_config_file(&path) {
            Ok(Some(file_args)) => {
                info!(path = %path.display(), "config file loaded");
                current = current.merge(file_args);
                loaded = true;
                break;
            }
            Ok(None) => {}
            // An explicitly named file must be usable; a stray default one is only warned about.
            Err(e) if explicit.is_some() => return Err(e),
            Err(e) => warn!(error = %e, "ignoring config file"),
        }
    }
    if !loaded {
        if let Some(path) = explicit {
            return Err(ConfigError::Invalid(format!("config file {} does not exist", path.display())));
        }
        info!("no config file found, using defaults and environment/CLI values");
    }

    ServerConfig::try_from(current.merge(cli))
}
