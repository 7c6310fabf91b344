//! Error types for the paygate library.
//!
//! Every fallible operation in the crate returns [`GatewayError`]. Messages are
//! safe to log: they never carry private keys, shared secrets or the raw
//! canonical string that was signed.

use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A field that every well-formed response carries was absent
    #[error("Missing required key: {0}")]
    MissingKey(String),

    /// Response or notification body could not be parsed
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// An outbound required parameter was empty; nothing was submitted
    #[error("Invalid parameter: {0} must not be empty")]
    InvalidParameter(String),

    /// Inbound signature did not match the recomputed one
    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    /// A notification reported a trade status other than paid
    #[error("Trade not paid: status '{0}'")]
    NotPaid(String),

    /// The gateway refused to confirm the notify id
    #[error("Notify id rejected by gateway: {0}")]
    NotifyIdInvalid(String),

    /// Network or transport level failure
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// The gateway answered with a business error code
    #[error("Gateway rejected request: {code} {msg} ({sub_code}: {sub_msg})")]
    GatewayRejected {
        /// Top level result code (e.g. "40004")
        code: String,
        /// Top level message
        msg: String,
        /// Detailed error code
        sub_code: String,
        /// Detailed error message
        sub_msg: String,
    },

    /// Key material could not be decoded
    #[error("Key error: {0}")]
    KeyError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GatewayError {
    /// Returns true when repeating the same call may succeed.
    ///
    /// Only transport failures qualify; parse and protocol errors indicate a
    /// version mismatch that a retry will not fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::TransportFailure(_))
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::MalformedPayload(err.to_string())
    }
}

impl From<quick_xml::Error> for GatewayError {
    fn from(err: quick_xml::Error) -> Self {
        GatewayError::MalformedPayload(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        // Strip the URL: query strings may carry signed parameters.
        GatewayError::TransportFailure(err.without_url().to_string())
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(err: url::ParseError) -> Self {
        GatewayError::ConfigError(format!("invalid url: {}", err))
    }
}

impl From<base64::DecodeError> for GatewayError {
    fn from(err: base64::DecodeError) -> Self {
        GatewayError::KeyError(format!("invalid base64: {}", err))
    }
}
