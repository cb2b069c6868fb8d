//! Run settings: built-in defaults, then an optional TOML file, then `RANK_*`
//! environment variables (`RANK_DATA_DIR`, `RANK_RETRY__MAX_ATTEMPTS`, ...).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "rank_crawler.toml";
const ENV_PREFIX: &str = "RANK";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub retry_parse_failures: bool,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(self.base_delay_secs),
            retry_parse_failures: self.retry_parse_failures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub model: String,
    pub max_tokens: u32,
    /// Stocks taken from the top of each category.
    pub per_category: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub docs_dir: PathBuf,
    pub readme_path: PathBuf,
    /// Prefix for snapshot links in the README. Empty means repo-relative.
    pub repo_blob_url: String,
    /// Prefix for dashboard links in the README.
    pub pages_url: String,
    /// Pause between independent fetches.
    pub request_delay_secs: u64,
    /// Per-attempt fetch timeout.
    pub timeout_secs: u64,
    pub retry: RetrySettings,
    pub analysis: AnalysisSettings,
}

impl Default for Settings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Settings {
            data_dir: PathBuf::from("data"),
            docs_dir: PathBuf::from("docs"),
            readme_path: PathBuf::from("README.md"),
            repo_blob_url: String::new(),
            pages_url: "docs".to_string(),
            request_delay_secs: 2,
            timeout_secs: 60,
            retry: RetrySettings {
                max_attempts: retry.max_attempts,
                base_delay_secs: retry.base_delay.as_secs(),
                retry_parse_failures: retry.retry_parse_failures,
            },
            analysis: AnalysisSettings {
                model: "claude-3-haiku-20240307".to_string(),
                max_tokens: 2000,
                per_category: 10,
            },
        }
    }
}

impl Settings {
    /// Load from the process environment. A missing file is fine unless it was
    /// named explicitly.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        Self::load_from(path, None)
    }

    fn load_from(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Settings, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir must not be empty".into()));
        }
        if self.docs_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("docs_dir must not be empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if self.analysis.per_category == 0 {
            return Err(ConfigError::Invalid("analysis.per_category must be positive".into()));
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs(self.request_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_without_file_or_env() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("none.toml");
        // An explicitly named file must exist.
        assert!(Settings::load_from(Some(&missing), env(&[])).is_err());

        let path = tmp.path().join("empty.toml");
        std::fs::write(&path, "").unwrap();
        let s = Settings::load_from(Some(&path), env(&[])).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.retry.policy(), RetryPolicy::default());
    }

    #[test]
    fn file_then_env_override() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rank.toml");
        std::fs::write(
            &path,
            "data_dir = \"snapshots\"\nrequest_delay_secs = 7\n\n[retry]\nmax_attempts = 5\n",
        )
        .unwrap();

        let s = Settings::load_from(
            Some(&path),
            env(&[
                ("RANK_REQUEST_DELAY_SECS", "1"),
                ("RANK_RETRY__RETRY_PARSE_FAILURES", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(s.data_dir, PathBuf::from("snapshots"));
        assert_eq!(s.request_delay_secs, 1);
        assert_eq!(s.retry.max_attempts, 5);
        assert!(s.retry.retry_parse_failures);
        assert_eq!(s.retry.base_delay_secs, 5);
    }

    #[test]
    fn zero_attempts_rejected() {
        let mut s = Settings::default();
        s.retry.max_attempts = 0;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid(_))));
    }
}
