use thiserror::Error;

/// Client-side precondition failures, raised before any network call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("not enough items: requested {requested}, available {available}")]
    ExceedsAvailable { requested: i64, available: i64 },

    #[error("not enough money: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    #[error("not enough premium currency: required {required}, available {available}")]
    InsufficientPremium { required: i64, available: i64 },

    #[error("select {0} first")]
    MissingSelection(&'static str),

    #[error("invalid {field}: {input}")]
    Malformed { field: &'static str, input: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("network error: {0}")]
    Network(String),

    /// Structured rejection from the backend; `message` is the server detail
    /// when one was sent.
    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("session expired")]
    Unauthorized,

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("operation already in progress")]
    InFlight,

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub const NETWORK_ERROR_MESSAGE: &str = "Network error, please try again";

impl ClientError {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        ClientError::Server {
            status,
            message: message.into(),
        }
    }

    /// Text shown to the player. Server details are passed through verbatim,
    /// everything without one falls back to `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Validation(v) => v.to_string(),
            ClientError::Server { message, .. } if !message.trim().is_empty() => message.clone(),
            ClientError::Network(_) => NETWORK_ERROR_MESSAGE.to_string(),
            ClientError::InFlight => self.to_string(),
            _ => fallback.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
