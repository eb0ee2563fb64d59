use std::fmt;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    /// No file at the given path, or none of the search locations matched.
    FileNotFound(String),

    /// The file exists but could not be read.
    ReadError(String),

    /// The content is not valid JSON for the requested type.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Configuration file not found: {}", path),
            ConfigError::ReadError(msg) => write!(f, "Failed to read configuration file: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(format!(
            "{} (line {}, column {})",
            err,
            err.line(),
            err.column()
        ))
    }
}
