use std::time::Duration;

/// Typed error hierarchy for provider adapter operations.
/// Classifies errors as fatal (don't retry), transient (retry with backoff),
/// malformed (don't retry, the model's own output is untrustworthy), or
/// operational.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProviderError {
    // Fatal — don't retry
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("unsupported model: {0}")]
    UnsupportedModel(String),
    #[error("context window exceeded: {actual} > {limit}")]
    ContextWindowExceeded { limit: usize, actual: usize },
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Malformed response — don't retry
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    // Transient
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("provider overloaded")]
    ProviderOverloaded,
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    // Operational
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::ProviderOverloaded
                | Self::NetworkError(_)
                | Self::StreamInterrupted(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::UnsupportedModel(_)
                | Self::ContextWindowExceeded { .. }
                | Self::InvalidRequest(_)
        )
    }

    pub fn suggested_delay(&self) -> Option<Duration> {
        if let Self::RateLimited { retry_after } = self {
            *retry_after
        } else {
            None
        }
    }

    /// Short classification string for logging and event payloads.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::UnsupportedModel(_) => "unsupported_model",
            Self::ContextWindowExceeded { .. } => "context_window_exceeded",
            Self::InvalidRequest(_) => "invalid_request",
            Self::MalformedResponse(_) => "malformed_response",
            Self::RateLimited { .. } => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::ProviderOverloaded => "provider_overloaded",
            Self::NetworkError(_) => "network_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 => Self::InvalidRequest(body),
            404 => Self::UnsupportedModel(body),
            429 => Self::RateLimited { retry_after: None },
            529 => Self::ProviderOverloaded,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited { retry_after: None }.is_transient());
        assert!(ProviderError::ServerError { status: 500, body: "err".into() }.is_transient());
        assert!(ProviderError::ProviderOverloaded.is_transient());
        assert!(ProviderError::NetworkError("tcp".into()).is_transient());
        assert!(ProviderError::StreamInterrupted("eof".into()).is_transient());
    }

    #[test]
    fn fatal_classification() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_fatal());
        assert!(ProviderError::UnsupportedModel("gpt-0".into()).is_fatal());
        assert!(ProviderError::ContextWindowExceeded { limit: 200_000, actual: 250_000 }.is_fatal());
        assert!(ProviderError::InvalidRequest("bad".into()).is_fatal());
    }

    #[test]
    fn malformed_is_neither_transient_nor_fatal() {
        let err = ProviderError::MalformedResponse("bad tool json".into());
        assert!(!err.is_transient());
        assert!(!err.is_fatal());
        assert_eq!(err.error_kind(), "malformed_response");
    }

    #[test]
    fn not_transient_and_not_fatal() {
        let timeout = ProviderError::Timeout(Duration::from_secs(30));
        assert!(!timeout.is_transient());
        assert!(!timeout.is_fatal());

        let cancelled = ProviderError::Cancelled;
        assert!(!cancelled.is_transient());
        assert!(!cancelled.is_fatal());
    }

    #[test]
    fn suggested_delay_only_for_rate_limit() {
        let rl = ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(rl.suggested_delay(), Some(Duration::from_secs(5)));

        let se = ProviderError::ServerError { status: 500, body: "err".into() };
        assert_eq!(se.suggested_delay(), None);
    }

    #[test]
    fn from_status_mapping() {
        assert!(ProviderError::from_status(401, "unauthorized".into()).is_fatal());
        assert!(ProviderError::from_status(403, "forbidden".into()).is_fatal());
        assert!(ProviderError::from_status(400, "bad request".into()).is_fatal());
        assert!(ProviderError::from_status(404, "no such model".into()).is_fatal());
        assert!(ProviderError::from_status(429, "rate limited".into()).is_transient());
        assert!(ProviderError::from_status(529, "overloaded".into()).is_transient());
        assert!(ProviderError::from_status(500, "internal".into()).is_transient());
        assert!(ProviderError::from_status(502, "bad gateway".into()).is_transient());
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ProviderError::Cancelled.error_kind(), "cancelled");
        assert_eq!(ProviderError::ProviderOverloaded.error_kind(), "provider_overloaded");
        assert_eq!(
            ProviderError::RateLimited { retry_after: None }.error_kind(),
            "rate_limited"
        );
    }
}
