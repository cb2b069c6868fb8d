use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a single listing fetch produced no records.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("extraction returned no records")]
    EmptyExtraction,
    #[error("payload is not valid structured data: {0}")]
    Parse(String),
}

impl FetchError {
    /// Short tag used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::EmptyExtraction => "empty",
            FetchError::Parse(_) => "parse",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Parse(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Parse(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snapshot {path} is not valid json: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.into(),
            source,
        }
    }
}

/// Run-level failures raised before any fetching starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    MissingCredential(&'static str),
    #[error("invalid settings: {0}")]
    Invalid(String),
    #[error("unknown source '{0}'")]
    UnknownSource(String),
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("scoring request failed: {0}")]
    Request(String),
    #[error("scoring response could not be parsed: {0}")]
    Response(String),
    #[error("no stock data available for analysis")]
    NoInput,
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        AnalysisError::Request(e.to_string())
    }
}
