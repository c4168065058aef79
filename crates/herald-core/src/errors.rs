/// Publisher input rejected before anything is sent. Shown inline until the
/// operator corrects it.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter an announcement text")]
    EmptyText,
    #[error("Please select at least one language")]
    NoLanguages,
}

/// Failures on the real-time channel, including the hub refusing a request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The hub answered with an `error` event. The message is shown verbatim.
    #[error("{0}")]
    Rejected(String),
    #[error("not connected to hub")]
    NotConnected,
    #[error("socket error: {0}")]
    Socket(String),
}

impl TransportError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::NotConnected => "not_connected",
            Self::Socket(_) => "socket",
        }
    }
}

/// Audio could not start. Automatic plays only log it; an explicit play
/// from history reports it to the operator.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    #[error("player unavailable: {0}")]
    Unavailable(String),
    #[error("no audio recorded for {id} in {language}")]
    NoClip { id: String, language: String },
    #[error("playback failed for {reference}: {reason}")]
    Failed { reference: String, reason: String },
}

/// History query or clear failed. The displayed history stays as it was.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("hub error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("hub refused: {0}")]
    Refused(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("cancelled by operator")]
    Cancelled,
}

impl QueryError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Unauthorized(_) => "unauthorized",
            Self::Status { .. } => "status",
            Self::Refused(_) => "refused",
            Self::Decode(_) => "decode",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(body),
            _ => Self::Status { status, body },
        }
    }
}

/// An inbound frame that cannot be accepted. The frame is dropped.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("announcement has no variants")]
    NoVariants,
    #[error("duplicate language in variant set: {0}")]
    DuplicateLanguage(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages() {
        assert_eq!(ValidationError::EmptyText.to_string(), "Please enter an announcement text");
        assert_eq!(ValidationError::NoLanguages.to_string(), "Please select at least one language");
    }

    #[test]
    fn rejected_transport_error_is_verbatim() {
        let err = TransportError::Rejected("Announcement text cannot be empty".into());
        assert_eq!(err.to_string(), "Announcement text cannot be empty");
        assert_eq!(err.error_kind(), "rejected");
    }

    #[test]
    fn query_error_from_status() {
        assert!(matches!(
            QueryError::from_status(401, "login required".into()),
            QueryError::Unauthorized(_)
        ));
        assert!(matches!(
            QueryError::from_status(403, "forbidden".into()),
            QueryError::Unauthorized(_)
        ));
        assert_eq!(
            QueryError::from_status(500, "boom".into()),
            QueryError::Status { status: 500, body: "boom".into() }
        );
    }

    #[test]
    fn query_error_kinds() {
        assert_eq!(QueryError::Cancelled.error_kind(), "cancelled");
        assert_eq!(QueryError::Network("eof".into()).error_kind(), "network");
        assert_eq!(QueryError::Unauthorized("x".into()).error_kind(), "unauthorized");
    }

    #[test]
    fn protocol_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }
}
