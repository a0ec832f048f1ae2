//! Configuration management for Confstore Server

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

/// Default request body limit for uploads: 50MB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSON snapshot of the record index
    pub snapshot_path: PathBuf,
    /// Directory holding one `<identifier>_v<N>.zip` per stored version
    pub blob_dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("TLS_CERT_FILE and TLS_KEY_FILE must be set together")]
    IncompleteTls,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                tls: None,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            storage: StorageConfig {
                snapshot_path: PathBuf::from("file_status.json"),
                blob_dir: PathBuf::from("storedconfs"),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let tls = match (lookup("TLS_CERT_FILE"), lookup("TLS_KEY_FILE")) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_file: PathBuf::from(cert),
                key_file: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_or("SERVER_PORT", lookup("SERVER_PORT"), defaults.server.port)?,
                tls,
                max_upload_bytes: parse_or(
                    "MAX_UPLOAD_BYTES",
                    lookup("MAX_UPLOAD_BYTES"),
                    defaults.server.max_upload_bytes,
                )?,
            },
            storage: StorageConfig {
                snapshot_path: lookup("SNAPSHOT_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.snapshot_path),
                blob_dir: lookup("BLOB_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.blob_dir),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.tls.is_none());
        assert_eq!(config.storage.snapshot_path, PathBuf::from("file_status.json"));
        assert_eq!(config.storage.blob_dir, PathBuf::from("storedconfs"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("SERVER_PORT", "9443"),
            ("TLS_CERT_FILE", "/etc/confstore/cert.pem"),
            ("TLS_KEY_FILE", "/etc/confstore/key.pem"),
            ("BLOB_DIR", "/var/lib/confstore/blobs"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 9443);
        let tls = config.server.tls.unwrap();
        assert_eq!(tls.key_file, PathBuf::from("/etc/confstore/key.pem"));
        assert_eq!(config.storage.blob_dir, PathBuf::from("/var/lib/confstore/blobs"));
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(lookup_from(&[("SERVER_PORT", "eighty")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name: "SERVER_PORT", .. })
        ));
    }

    #[test]
    fn test_half_configured_tls() {
        let result = Config::from_lookup(lookup_from(&[("TLS_CERT_FILE", "cert.pem")]));
        assert!(matches!(result, Err(ConfigError::IncompleteTls)));
    }
}
