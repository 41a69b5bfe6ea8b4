//! Manager configuration management

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Upper bound on transport attempts per request, first attempt included
    pub max_attempts: u32,
    /// Where completion sinks run
    pub completion_queue: CompletionQueue,
    /// Headers sent with every request (call headers override them)
    pub default_headers: BTreeMap<String, String>,
    /// Base URL relative addresses are joined with
    pub base_url: Option<String>,
    /// Value for the `user-agent` header
    pub user_agent: Option<String>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Where completion sinks are invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionQueue {
    /// On a fresh task spawned on the manager's runtime
    #[default]
    Spawn,
    /// On whichever runtime worker finalized the request
    Inline,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (overridden by `RUST_LOG`)
    pub level: String,
    /// Enable structured (JSON) logging
    pub structured: bool,
    /// Output destination
    pub output: LogOutput,
}

/// Log output destination
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    /// Standard error
    #[default]
    Stderr,
    /// Standard output
    Stdout,
    /// Logging disabled
    None,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            completion_queue: CompletionQueue::default(),
            default_headers: BTreeMap::new(),
            base_url: None,
            user_agent: Some(concat!("turbofetch/", env!("CARGO_PKG_VERSION")).to_string()),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
            output: LogOutput::Stderr,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ManagerConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The file format is auto-detected from the file extension. Environment
    /// variables with the `TURBOFETCH_` prefix override file settings, with
    /// `__` separating nested keys (`TURBOFETCH_LOGGING__LEVEL=debug`).
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use turbofetch::ManagerConfig;
    ///
    /// let config = ManagerConfig::from_file("turbofetch.toml").expect("Failed to load config");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, "TURBOFETCH")
    }

    /// Load configuration from a file with custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`ManagerConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `max_attempts` is zero or
    /// `base_url` is not an absolute URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(base) = &self.base_url {
            url::Url::parse(base)
                .map_err(|e| ConfigError::Invalid(format!("base_url '{base}': {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.completion_queue, CompletionQueue::Spawn);
        assert!(config.user_agent.unwrap().starts_with("turbofetch/"));
        assert_eq!(config.logging.level, "info");
        assert!(ManagerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let file = write_config(
            ".toml",
            r#"
max_attempts = 5
completion_queue = "inline"
base_url = "https://api.example.com/v2/"

[default_headers]
accept = "application/json"

[logging]
level = "debug"
structured = true
"#,
        );

        let config = ManagerConfig::from_file_with_prefix(file.path(), "TURBOFETCH_TEST_TOML").unwrap();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.completion_queue, CompletionQueue::Inline);
        assert_eq!(config.base_url.as_deref(), Some("https://api.example.com/v2/"));
        assert_eq!(
            config.default_headers.get("accept").map(String::as_str),
            Some("application/json")
        );
        assert!(config.logging.structured);
        assert_eq!(config.logging.output, LogOutput::Stderr);
    }

    #[test]
    fn test_from_json() {
        let file = write_config(".json", r#"{"max_attempts": 2, "user_agent": "tests/1.0"}"#);
        let config = ManagerConfig::from_file_with_prefix(file.path(), "TURBOFETCH_TEST_JSON").unwrap();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.user_agent.as_deref(), Some("tests/1.0"));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            ManagerConfig::from_file("/definitely/not/here.toml"),
            Err(ConfigError::FileNotFound(_))
        ));

        let ini = write_config(".ini", "max_attempts=1");
        assert!(matches!(
            ManagerConfig::from_file(ini.path()),
            Err(ConfigError::UnsupportedFormat)
        ));

        let zero = write_config(".json", r#"{"max_attempts": 0}"#);
        assert!(matches!(
            ManagerConfig::from_file_with_prefix(zero.path(), "TURBOFETCH_TEST_ZERO"),
            Err(ConfigError::Invalid(_))
        ));

        let malformed = write_config(".json", "{ not json");
        assert!(matches!(
            ManagerConfig::from_file_with_prefix(malformed.path(), "TURBOFETCH_TEST_BAD"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_validate_base_url() {
        let config = ManagerConfig {
            base_url: Some("relative/path".into()),
            ..ManagerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
