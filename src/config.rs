//! Server and output configuration.
//!
//! Settings come from an optional TOML file and are overridden by whatever
//! was given on the command line. The image directory itself is always a
//! command-line argument and lives in [`crate::paths::ResolvedPaths`].
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! public_url = "http://labeler.local:8080"
//!
//! [output]
//! path = "./samples.txt"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Base URL placed in `/images/random` responses instead of the
    /// request's `Host` header.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

fn default_output_path() -> PathBuf {
    PathBuf::from("./samples.txt")
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub output_file: Option<PathBuf>,
    pub public_url: Option<String>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Build the effective configuration: defaults, then the optional file,
/// then command-line overrides.
pub fn build_config(path: Option<&Path>, overrides: Overrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    if let Some(host) = overrides.host {
        config.server.host = host;
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if let Some(public_url) = overrides.public_url {
        config.server.public_url = Some(public_url);
    }
    if let Some(output_file) = overrides.output_file {
        config.output.path = output_file;
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.server.host.trim().is_empty() {
        anyhow::bail!("server.host must not be empty");
    }
    if config.server.port == 0 {
        anyhow::bail!("server.port must be > 0");
    }
    if let Some(url) = &config.server.public_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("server.public_url must start with http:// or https://, got '{}'", url);
        }
    }
    if config.output.path.as_os_str().is_empty() {
        anyhow::bail!("output.path must not be empty");
    }
    Ok(())
}
