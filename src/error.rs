use thiserror::Error;

/// Main error type for the agent pipeline
#[derive(Error, Debug)]
pub enum HedgeflowError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Insufficient price history: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },

    // Bus errors
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    // Agent errors
    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("Agent panicked: {0}")]
    AgentPanicked(String),

    // Collaborator errors
    #[error("Execution gateway error: {0}")]
    Gateway(String),

    #[error("Text generation failed: {0}")]
    TextGeneration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for HedgeflowError
pub type Result<T> = std::result::Result<T, HedgeflowError>;

impl HedgeflowError {
    /// Turn a caught panic payload into an error value
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let reason = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        HedgeflowError::AgentPanicked(reason)
    }
}
