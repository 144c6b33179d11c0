//! Error types for the component runtime.

use thiserror::Error;

use crate::address::ParseAddressError;

/// Result alias used throughout the crate.
pub type Result<T, E = ComponentError> = std::result::Result<T, E>;

/// Component runtime errors.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// The TCP connection to the server could not be established
    #[error("Connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// IO error on an established connection
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed XML or a stanza with an unrecognised structure
    #[error("XML parse error: {0}")]
    XmlParse(String),

    /// A stanza could not be serialized
    #[error("XML encode error: {0}")]
    XmlEncode(String),

    /// The server rejected the handshake
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The server sent a stream-level error
    #[error("Stream error: {condition}{}", .text.as_deref().map(|t| format!(" ({t})")).unwrap_or_default())]
    StreamError {
        /// Defined condition element name (e.g. `host-unknown`)
        condition: String,
        /// Optional human-readable text
        text: Option<String>,
    },

    /// The peer sent an element that is not valid at this point of the stream
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An address attribute failed validation
    #[error("Invalid address: {0}")]
    Address(#[from] ParseAddressError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The runtime has been shut down
    #[error("Component is closed")]
    Closed,

    /// `start()` was called more than once
    #[error("Component already started")]
    AlreadyStarted,

    /// A user handler failed
    #[error("Handler error: {0}")]
    Handler(#[from] anyhow::Error),
}

impl ComponentError {
    /// Create a new XML parse error.
    pub fn xml_parse(msg: impl Into<String>) -> Self {
        Self::XmlParse(msg.into())
    }

    /// Create a new XML encode error.
    pub fn xml_encode(msg: impl Into<String>) -> Self {
        Self::XmlEncode(msg.into())
    }

    /// Create a new authentication error.
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthFailed(msg.into())
    }

    /// Create a new protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Stanza error conditions (RFC 6120 Section 8.3.3) a component typically returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaErrorCondition {
    BadRequest,
    FeatureNotImplemented,
    Forbidden,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAllowed,
    NotAuthorized,
    RecipientUnavailable,
    ServiceUnavailable,
    UndefinedCondition,
}

impl StanzaErrorCondition {
    /// Get the element name for this condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::FeatureNotImplemented => "feature-not-implemented",
            Self::Forbidden => "forbidden",
            Self::InternalServerError => "internal-server-error",
            Self::ItemNotFound => "item-not-found",
            Self::JidMalformed => "jid-malformed",
            Self::NotAllowed => "not-allowed",
            Self::NotAuthorized => "not-authorized",
            Self::RecipientUnavailable => "recipient-unavailable",
            Self::ServiceUnavailable => "service-unavailable",
            Self::UndefinedCondition => "undefined-condition",
        }
    }

    /// Parse a condition element name. Unknown names map to `UndefinedCondition`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "bad-request" => Self::BadRequest,
            "feature-not-implemented" => Self::FeatureNotImplemented,
            "forbidden" => Self::Forbidden,
            "internal-server-error" => Self::InternalServerError,
            "item-not-found" => Self::ItemNotFound,
            "jid-malformed" => Self::JidMalformed,
            "not-allowed" => Self::NotAllowed,
            "not-authorized" => Self::NotAuthorized,
            "recipient-unavailable" => Self::RecipientUnavailable,
            "service-unavailable" => Self::ServiceUnavailable,
            _ => Self::UndefinedCondition,
        }
    }

    /// The error type RFC 6120 recommends for this condition.
    pub fn default_type(&self) -> StanzaErrorType {
        match self {
            Self::BadRequest | Self::JidMalformed => StanzaErrorType::Modify,
            Self::Forbidden | Self::NotAuthorized => StanzaErrorType::Auth,
            Self::InternalServerError | Self::RecipientUnavailable => StanzaErrorType::Wait,
            _ => StanzaErrorType::Cancel,
        }
    }
}

impl std::fmt::Display for StanzaErrorCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stanza error types (RFC 6120 Section 8.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaErrorType {
    /// Retry after providing credentials
    Auth,
    /// Do not retry (unrecoverable error)
    Cancel,
    /// Proceed (the condition was only a warning)
    Continue,
    /// Retry after changing the data sent
    Modify,
    /// Retry after waiting (temporary error)
    Wait,
}

impl StanzaErrorType {
    /// Get the type attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Cancel => "cancel",
            Self::Continue => "continue",
            Self::Modify => "modify",
            Self::Wait => "wait",
        }
    }

    /// Parse a type attribute value.
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "auth" => Some(Self::Auth),
            "cancel" => Some(Self::Cancel),
            "continue" => Some(Self::Continue),
            "modify" => Some(Self::Modify),
            "wait" => Some(Self::Wait),
            _ => None,
        }
    }
}

impl std::fmt::Display for StanzaErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_error_display() {
        let err = ComponentError::StreamError {
            condition: "host-unknown".to_string(),
            text: None,
        };
        assert_eq!(err.to_string(), "Stream error: host-unknown");

        let err = ComponentError::StreamError {
            condition: "conflict".to_string(),
            text: Some("Replaced by new connection".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Stream error: conflict (Replaced by new connection)"
        );
    }

    #[test]
    fn test_handler_error_from_anyhow() {
        let err: ComponentError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, ComponentError::Handler(_)));
        assert_eq!(err.to_string(), "Handler error: boom");
    }

    #[test]
    fn test_stanza_error_conditions() {
        assert_eq!(StanzaErrorCondition::BadRequest.as_str(), "bad-request");
        assert_eq!(
            StanzaErrorCondition::from_name("service-unavailable"),
            StanzaErrorCondition::ServiceUnavailable
        );
        assert_eq!(
            StanzaErrorCondition::from_name("resource-constraint"),
            StanzaErrorCondition::UndefinedCondition
        );
        assert_eq!(
            StanzaErrorCondition::NotAuthorized.default_type(),
            StanzaErrorType::Auth
        );
        assert_eq!(StanzaErrorType::from_attr("wait"), Some(StanzaErrorType::Wait));
        assert_eq!(StanzaErrorType::from_attr("later"), None);
    }
}
