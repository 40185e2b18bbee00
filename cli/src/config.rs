use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// location of the config file, relative to $HOME
const CONFIG_PATH: &str = ".config/georocket/config.toml";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 63020;

/// Settings read from the config file. All of them are optional.
#[derive(Deserialize, Default, Debug, PartialEq, Eq)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl FileConfig {
    /// Load the config file from the given location. A missing file yields
    /// an empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match std::fs::read_to_string(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("unable to read configuration file at {:?}", path))
            }
        };
        toml::from_str(&file).context("configuration malformed")
    }

    /// Load the config file from `$HOME/.config/georocket/config.toml`
    pub fn load_default() -> Result<Self> {
        match std::env::var_os("HOME") {
            Some(home) => Self::load(&PathBuf::from(home).join(CONFIG_PATH)),
            None => Ok(Self::default()),
        }
    }
}

/// The address of the GeoRocket server
#[derive(Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Use the values given on the command line or in the environment and
    /// fall back to the config file and then to the defaults
    pub fn resolve(host: Option<String>, port: Option<u16>, file: FileConfig) -> Self {
        Self {
            host: host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: port.or(file.port).unwrap_or(DEFAULT_PORT),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
