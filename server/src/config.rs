//! Startup configuration read from `CLOUDLET_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

const DB_FILE: &str = "cloudlet.db";
const OBJECTS_FILE: &str = "objects.db";
const CURRENT_DIR: &str = "./";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_SIGN_CONCURRENCY: usize = 16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {name}")]
    Invalid { name: &'static str, value: String },
}

/// Access to the storage account. All three parts are mandatory.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    S3 {
        bucket: String,
        endpoint: Option<String>,
    },
    Local {
        objects_file: PathBuf,
    },
}

/// Whether listings show every record under a parent or only the caller's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    Shared,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub grace_secs: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            grace_secs: 300,
            batch_size: 100,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: StorageCredentials,
    pub backend: Backend,
    pub session_secret: String,
    pub db_file: PathBuf,
    pub port: u16,
    pub public_url: String,
    pub sign_concurrency: usize,
    pub list_scope: ListScope,
    pub purge: PurgeConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let credentials = StorageCredentials {
            region: required("CLOUDLET_AWS_REGION")?,
            access_key_id: required("CLOUDLET_AWS_ACCESS_KEY_ID")?,
            secret_access_key: required("CLOUDLET_AWS_SECRET_ACCESS_KEY")?,
        };
        let session_secret = required("CLOUDLET_SESSION_SECRET")?;

        let dir = PathBuf::from(lookup("CLOUDLET_DATA_DIR").unwrap_or_else(|| CURRENT_DIR.into()));

        let backend = match lookup("CLOUDLET_OBJECT_STORE").as_deref() {
            None | Some("s3") => Backend::S3 {
                bucket: required("CLOUDLET_AWS_S3_BUCKET")?,
                endpoint: lookup("CLOUDLET_S3_ENDPOINT").filter(|v| !v.is_empty()),
            },
            Some("local") => Backend::Local {
                objects_file: dir.join(
                    lookup("CLOUDLET_OBJECTS_FILE").unwrap_or_else(|| OBJECTS_FILE.into()),
                ),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CLOUDLET_OBJECT_STORE",
                    value: other.to_owned(),
                })
            }
        };

        let list_scope = match lookup("CLOUDLET_LIST_SCOPE").as_deref() {
            None | Some("shared") => ListScope::Shared,
            Some("owner") => ListScope::Owner,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CLOUDLET_LIST_SCOPE",
                    value: other.to_owned(),
                })
            }
        };

        let port = parse_or(&lookup, "CLOUDLET_PORT", DEFAULT_PORT)?;
        let public_url = lookup("CLOUDLET_PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"));

        let sign_concurrency =
            parse_or(&lookup, "CLOUDLET_SIGN_CONCURRENCY", DEFAULT_SIGN_CONCURRENCY)?;
        if sign_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "CLOUDLET_SIGN_CONCURRENCY",
                value: "0".to_owned(),
            });
        }

        let defaults = PurgeConfig::default();
        let purge = PurgeConfig {
            enabled: parse_or(&lookup, "CLOUDLET_PURGE_ENABLED", defaults.enabled)?,
            interval_secs: parse_or(&lookup, "CLOUDLET_PURGE_INTERVAL_SECS", defaults.interval_secs)?
                .max(1),
            grace_secs: parse_or(&lookup, "CLOUDLET_PURGE_GRACE_SECS", defaults.grace_secs)?,
            batch_size: parse_or(&lookup, "CLOUDLET_PURGE_BATCH", defaults.batch_size)?,
            max_attempts: parse_or(&lookup, "CLOUDLET_PURGE_MAX_ATTEMPTS", defaults.max_attempts)?,
        };

        Ok(Self {
            credentials,
            backend,
            session_secret,
            db_file: dir.join(lookup("CLOUDLET_DATA_FILE").unwrap_or_else(|| DB_FILE.into())),
            port,
            public_url,
            sign_concurrency,
            list_scope,
            purge,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("CLOUDLET_AWS_REGION", "eu-central-1"),
            ("CLOUDLET_AWS_ACCESS_KEY_ID", "access"),
            ("CLOUDLET_AWS_SECRET_ACCESS_KEY", "secret"),
            ("CLOUDLET_AWS_S3_BUCKET", "files"),
            ("CLOUDLET_SESSION_SECRET", "session"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|name| vars.get(name).map(|v| (*v).to_owned()))
    }

    #[test]
    fn defaults() {
        // Act
        let config = load(&base()).unwrap();

        // Assert
        assert_eq!(config.port, 5000);
        assert_eq!(config.public_url, "http://localhost:5000");
        assert_eq!(config.db_file, PathBuf::from("./cloudlet.db"));
        assert_eq!(config.sign_concurrency, 16);
        assert_eq!(config.list_scope, ListScope::Shared);
        assert_eq!(config.purge, PurgeConfig::default());
        assert_eq!(
            config.backend,
            Backend::S3 {
                bucket: "files".to_owned(),
                endpoint: None
            }
        );
    }

    #[rstest]
    #[case("CLOUDLET_AWS_REGION")]
    #[case("CLOUDLET_AWS_ACCESS_KEY_ID")]
    #[case("CLOUDLET_AWS_SECRET_ACCESS_KEY")]
    #[case("CLOUDLET_SESSION_SECRET")]
    #[case("CLOUDLET_AWS_S3_BUCKET")]
    #[trace]
    fn missing_required(#[case] name: &'static str) {
        // Arrange
        let mut vars = base();
        vars.remove(name);

        // Act
        let result = load(&vars);

        // Assert
        assert_eq!(result.unwrap_err(), ConfigError::Missing(name));
    }

    #[test]
    fn empty_required_is_missing() {
        // Arrange
        let mut vars = base();
        vars.insert("CLOUDLET_AWS_REGION", "");

        // Act
        let result = load(&vars);

        // Assert
        assert_eq!(result.unwrap_err(), ConfigError::Missing("CLOUDLET_AWS_REGION"));
    }

    #[test]
    fn local_backend_does_not_need_bucket() {
        // Arrange
        let mut vars = base();
        vars.remove("CLOUDLET_AWS_S3_BUCKET");
        vars.insert("CLOUDLET_OBJECT_STORE", "local");
        vars.insert("CLOUDLET_DATA_DIR", "/var/lib/cloudlet");
        vars.insert("CLOUDLET_PORT", "8080");

        // Act
        let config = load(&vars).unwrap();

        // Assert
        assert_eq!(
            config.backend,
            Backend::Local {
                objects_file: PathBuf::from("/var/lib/cloudlet/objects.db")
            }
        );
        assert_eq!(config.public_url, "http://localhost:8080");
    }

    #[rstest]
    #[case("CLOUDLET_OBJECT_STORE", "gcs")]
    #[case("CLOUDLET_LIST_SCOPE", "everyone")]
    #[case("CLOUDLET_PORT", "http")]
    #[case("CLOUDLET_SIGN_CONCURRENCY", "0")]
    #[case("CLOUDLET_PURGE_ENABLED", "sometimes")]
    #[trace]
    fn invalid_values(#[case] name: &'static str, #[case] value: &'static str) {
        // Arrange
        let mut vars = base();
        vars.insert(name, value);

        // Act
        let result = load(&vars);

        // Assert
        assert!(matches!(result, Err(ConfigError::Invalid { name: n, .. }) if n == name));
    }

    #[test]
    fn owner_scope_and_purge_tuning() {
        // Arrange
        let mut vars = base();
        vars.insert("CLOUDLET_LIST_SCOPE", "owner");
        vars.insert("CLOUDLET_PURGE_ENABLED", "false");
        vars.insert("CLOUDLET_PURGE_GRACE_SECS", "0");
        vars.insert("CLOUDLET_PURGE_MAX_ATTEMPTS", "2");

        // Act
        let config = load(&vars).unwrap();

        // Assert
        assert_eq!(config.list_scope, ListScope::Owner);
        assert!(!config.purge.enabled);
        assert_eq!(config.purge.grace_secs, 0);
        assert_eq!(config.purge.max_attempts, 2);
    }
}
