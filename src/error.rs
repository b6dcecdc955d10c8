// src/error.rs
use serde_json::Value;
use thiserror::Error;

pub type Result<T, E = AaError> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error {code}: {message}")]
    Backend {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Invalid Chain: {0}")]
    UnsupportedChain(u64),

    #[error("User rejected the request: {0}")]
    UserRejected(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Pending confirmation was replaced by a newer transaction")]
    ConfirmationSuperseded,

    #[error("Address store error: {0}")]
    Storage(String),
}

impl AaError {
    pub fn user_rejected(reason: impl Into<String>) -> Self {
        AaError::UserRejected(reason.into())
    }
}

impl From<reqwest::Error> for AaError {
    fn from(e: reqwest::Error) -> Self {
        AaError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for AaError {
    fn from(e: serde_json::Error) -> Self {
        AaError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for AaError {
    fn from(e: std::io::Error) -> Self {
        AaError::Storage(e.to_string())
    }
}

impl From<ethers::signers::WalletError> for AaError {
    fn from(e: ethers::signers::WalletError) -> Self {
        AaError::Signing(e.to_string())
    }
}

impl From<ethers::providers::ProviderError> for AaError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        AaError::Provider(e.to_string())
    }
}
