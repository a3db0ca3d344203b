//! Custom error types for analyst

use thiserror::Error;

/// Main error type for analyst operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding gateway unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Text-generation gateway unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Schema index build failed: {0}")]
    IndexBuild(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Backend execution failed: {0}")]
    BackendExecution(String),

    #[error("Query generation exhausted after {attempts} attempts: {reason}")]
    GenerationExhausted {
        attempts: u32,
        /// Last attempted query text, for diagnostics. Never executed.
        query: Option<String>,
        reason: String,
    },

    #[error("Query execution exhausted after {attempts} attempts: {reason}")]
    ExecutionExhausted {
        attempts: u32,
        /// Last query submitted to the backend.
        query: Option<String>,
        reason: String,
    },

    #[error("Narration unavailable: {0}")]
    NarrationUnavailable(String),

    #[error("Workflow cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl Error {
    /// Whether this error terminates a workflow rather than degrading it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::GenerationExhausted { .. } | Error::ExecutionExhausted { .. } | Error::Cancelled
        )
    }
}

/// Result type alias for analyst
pub type Result<T> = std::result::Result<T, Error>;
