//! Server configuration
//!
//! Settings come from an optional TOML file, then environment variables,
//! then command-line flags (applied by the binary).
//!
//! ## Environment Variables
//!
//! - `DOCSTREAM_HOST` - Listen host
//! - `DOCSTREAM_PORT` - Listen port
//! - `DOCSTREAM_FORMAT` - Frame payload encoding (`msgpack` or `json`)
//! - `DOCSTREAM_REQUEST_TIMEOUT_MS` - Per-request timeout in milliseconds
//!
//! These can be set in a `.env` file in the working directory.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::ServerOptions;
use crate::driver::protocol::WireFormat;
use crate::driver::wrapper::read_only_wrappers;
use crate::error::ServerError;

pub const ENV_HOST: &str = "DOCSTREAM_HOST";
pub const ENV_PORT: &str = "DOCSTREAM_PORT";
pub const ENV_FORMAT: &str = "DOCSTREAM_FORMAT";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "DOCSTREAM_REQUEST_TIMEOUT_MS";

pub const DEFAULT_PORT: u16 = 6790;
pub const DEFAULT_STREAM_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub format: WireFormat,
    /// In-memory databases created at startup
    pub databases: Vec<String>,
    /// Refuse every write method
    pub read_only: bool,
    pub request_timeout_ms: Option<u64>,
    /// Capacity of each stream's request and response channels
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            format: WireFormat::default(),
            databases: Vec::new(),
            read_only: false,
            request_timeout_ms: None,
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ServerError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ServerError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<(), ServerError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored; unparsable
    /// ones are configuration errors.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(host) = var(ENV_HOST) {
            self.host = host;
        }

        if let Some(port) = var(ENV_PORT) {
            self.port = port
                .parse()
                .map_err(|_| ServerError::Config(format!("{} must be a port number", ENV_PORT)))?;
        }

        if let Some(format) = var(ENV_FORMAT) {
            self.format = format.parse().map_err(ServerError::Config)?;
        }

        if let Some(ms) = var(ENV_REQUEST_TIMEOUT_MS) {
            let ms = ms.parse().map_err(|_| {
                ServerError::Config(format!("{} must be milliseconds", ENV_REQUEST_TIMEOUT_MS))
            })?;
            self.request_timeout_ms = Some(ms);
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Server options described by this configuration
    pub fn to_options(&self) -> ServerOptions {
        let wrapper_functions = if self.read_only {
            read_only_wrappers()
        } else {
            Default::default()
        };

        ServerOptions {
            wrapper_functions,
            request_timeout: self.request_timeout(),
            stream_buffer: self.stream_buffer,
            format: self.format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:6790");
        assert_eq!(config.format, WireFormat::Msgpack);
        assert_eq!(config.stream_buffer, 64);
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "port = 7000\nformat = \"json\"\ndatabases = [\"db1\", \"db2\"]\nread_only = true\nrequest_timeout_ms = 250"
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7000);
        assert_eq!(config.format, WireFormat::Json);
        assert_eq!(config.databases, vec!["db1", "db2"]);
        assert!(config.read_only);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"high\"").unwrap();
        assert!(matches!(
            ServerConfig::load(Some(file.path())),
            Err(ServerError::Config(_))
        ));

        let missing = Path::new("/nonexistent/docstream.toml");
        assert!(matches!(
            ServerConfig::load(Some(missing)),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            (ENV_HOST, "0.0.0.0"),
            (ENV_PORT, "7100"),
            (ENV_FORMAT, "JSON"),
            (ENV_REQUEST_TIMEOUT_MS, "1500"),
        ]);
        let mut config = ServerConfig::default();
        config.apply_env_from(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.bind_addr(), "0.0.0.0:7100");
        assert_eq!(config.format, WireFormat::Json);
        assert_eq!(config.request_timeout_ms, Some(1500));
    }

    #[test]
    fn test_env_empty_ignored_and_invalid_rejected() {
        let mut config = ServerConfig::default();
        let vars = env(&[(ENV_HOST, "")]);
        config.apply_env_from(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.host, "127.0.0.1");

        let vars = env(&[(ENV_PORT, "not-a-port")]);
        assert!(config.apply_env_from(|k| vars.get(k).cloned()).is_err());

        let vars = env(&[(ENV_FORMAT, "xml")]);
        assert!(config.apply_env_from(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_read_only_options() {
        let config = ServerConfig {
            read_only: true,
            request_timeout_ms: Some(10),
            ..Default::default()
        };
        let options = config.to_options();
        assert_eq!(
            options.wrapper_functions.methods(),
            vec!["bulkDocs", "put", "post", "remove"]
        );
        assert_eq!(options.request_timeout, Some(Duration::from_millis(10)));

        assert!(ServerConfig::default().to_options().wrapper_functions.is_empty());
    }
}
