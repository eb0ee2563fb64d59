//! # Config Loader
//!
//! Locates configuration files on disk and deserializes them.
//!
//! ```no_run
//! use config_loader::{find_config_file, load_json};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Ports {
//!     rtp: u16,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let path = find_config_file("t140.json")?;
//!     let ports: Ports = load_json(&path)?;
//!     println!("RTP port {}", ports.rtp);
//!     Ok(())
//! }
//! ```

pub mod error;

pub use error::{ConfigError, Result};

use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the search locations.
pub const CONFIG_PATH_ENV: &str = "T140_CONFIG_PATH";

/// Reads a configuration file into a string without interpreting it.
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))
}

/// Searches, in order:
/// 1. the path in `T140_CONFIG_PATH`
/// 2. `./config/{filename}`
/// 3. `./{filename}`
pub fn find_config_file(filename: &str) -> Result<PathBuf> {
    let env_path = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    find_in(filename, env_path, Path::new("."))
}

fn find_in(filename: &str, env_path: Option<PathBuf>, base: &Path) -> Result<PathBuf> {
    let candidates = env_path
        .into_iter()
        .chain([base.join("config").join(filename), base.join(filename)]);

    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found. Searched: ${}, ./config/{}, ./{}",
        filename, CONFIG_PATH_ENV, filename, filename
    )))
}

/// Parses JSON text into `T`.
pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(serde_json::from_str(content)?)
}

/// Reads and parses a JSON configuration file.
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let content = load_config_file(path)?;
    parse_json(&content)
}

/// Finds `filename` in the usual locations and parses it.
pub fn find_and_load<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = find_config_file(filename)?;
    load_json(path)
}
