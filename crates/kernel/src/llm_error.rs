use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The broad family a concrete [`LlmError`] variant belongs to.
///
/// Several variants are modeled as subtypes of another kind (`AccessDenied`
/// of `Authentication`, `Network` of `ProviderUnavailable`, `QuotaExceeded`
/// of `RateLimit`) so that application code can match on either the precise
/// kind or the broader family, without relying on class inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    RateLimit,
    Authentication,
    AccessDenied,
    ContextLength,
    ContentFilter,
    InvalidRequest,
    NotFound,
    ProviderUnavailable,
    Network,
    Timeout,
    Stream,
    Abort,
    InvalidToolCall,
    Configuration,
    QuotaExceeded,
}

impl ErrorKind {
    /// The broader family this kind is also catchable as, if any.
    pub fn superkind(&self) -> Option<ErrorKind> {
        match self {
            ErrorKind::AccessDenied => Some(ErrorKind::Authentication),
            ErrorKind::Network => Some(ErrorKind::ProviderUnavailable),
            ErrorKind::QuotaExceeded => Some(ErrorKind::RateLimit),
            _ => None,
        }
    }

    /// Default retryability for this kind, per the taxonomy's closed policy.
    /// `QuotaExceeded` is a `RateLimit` subtype but defaults to
    /// non-retryable: quota exhaustion does not resolve itself by waiting.
    fn default_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit
                | ErrorKind::ProviderUnavailable
                | ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::Stream
        )
    }
}

/// Structured LLM/provider error taxonomy with retryability flags.
///
/// Every variant carries `provider` (the provider name, when known) and a
/// `retryable` flag. `retryable` defaults to [`ErrorKind::default_retryable`]
/// for the variant's kind but may be overridden at construction (e.g. a
/// provider-specific 5xx known to never succeed on retry).
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LlmError {
    #[error("rate limited by {provider}{}", retry_after.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimit {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
        retry_after: Option<f64>,
    },

    #[error("authentication failed for {provider}")]
    Authentication {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("access denied by {provider}")]
    AccessDenied {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("context length exceeded for {provider}")]
    ContextLength {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("content filtered by {provider}")]
    ContentFilter {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("invalid request to {provider}")]
    InvalidRequest {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("resource not found at {provider}")]
    NotFound {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("{provider} is unavailable")]
    ProviderUnavailable {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("network error calling {provider}")]
    Network {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("request to {provider} timed out")]
    Timeout {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("stream from {provider} failed")]
    Stream {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("request to {provider} was aborted")]
    Abort {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("invalid tool call '{tool_name}' from {provider}")]
    InvalidToolCall {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
        tool_name: String,
        raw_arguments: String,
    },

    #[error("invalid configuration for {provider}")]
    Configuration {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },

    #[error("quota exceeded for {provider}")]
    QuotaExceeded {
        provider: String,
        status_code: Option<u16>,
        retryable: bool,
    },
}

impl LlmError {
    /// Constructs a variant from a classification with default retryability
    /// for that kind, and no status code / retry-after known.
    pub fn from_kind(kind: ErrorKind, provider: impl Into<String>) -> Self {
        Self::from_kind_with_status(kind, provider, None)
    }

    pub fn from_kind_with_status(
        kind: ErrorKind,
        provider: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        let provider = provider.into();
        let retryable = kind.default_retryable();
        match kind {
            ErrorKind::RateLimit => LlmError::RateLimit {
                provider,
                status_code,
                retryable,
                retry_after: None,
            },
            ErrorKind::Authentication => LlmError::Authentication {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::AccessDenied => LlmError::AccessDenied {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::ContextLength => LlmError::ContextLength {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::ContentFilter => LlmError::ContentFilter {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::InvalidRequest => LlmError::InvalidRequest {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::NotFound => LlmError::NotFound {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::ProviderUnavailable => LlmError::ProviderUnavailable {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::Network => LlmError::Network {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::Timeout => LlmError::Timeout {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::Stream => LlmError::Stream {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::Abort => LlmError::Abort {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::InvalidToolCall => LlmError::InvalidToolCall {
                provider,
                status_code,
                retryable,
                tool_name: String::new(),
                raw_arguments: String::new(),
            },
            ErrorKind::Configuration => LlmError::Configuration {
                provider,
                status_code,
                retryable,
            },
            ErrorKind::QuotaExceeded => LlmError::QuotaExceeded {
                provider,
                status_code,
                retryable,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::RateLimit { .. } => ErrorKind::RateLimit,
            LlmError::Authentication { .. } => ErrorKind::Authentication,
            LlmError::AccessDenied { .. } => ErrorKind::AccessDenied,
            LlmError::ContextLength { .. } => ErrorKind::ContextLength,
            LlmError::ContentFilter { .. } => ErrorKind::ContentFilter,
            LlmError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            LlmError::NotFound { .. } => ErrorKind::NotFound,
            LlmError::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            LlmError::Network { .. } => ErrorKind::Network,
            LlmError::Timeout { .. } => ErrorKind::Timeout,
            LlmError::Stream { .. } => ErrorKind::Stream,
            LlmError::Abort { .. } => ErrorKind::Abort,
            LlmError::InvalidToolCall { .. } => ErrorKind::InvalidToolCall,
            LlmError::Configuration { .. } => ErrorKind::Configuration,
            LlmError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
        }
    }

    /// True if `self`'s kind is, or is a subtype of, `other`.
    pub fn is_kind_or_subtype_of(&self, other: ErrorKind) -> bool {
        let mut kind = Some(self.kind());
        while let Some(k) = kind {
            if k == other {
                return true;
            }
            kind = k.superkind();
        }
        false
    }

    pub fn retryable(&self) -> bool {
        match self {
            LlmError::RateLimit { retryable, .. }
            | LlmError::Authentication { retryable, .. }
            | LlmError::AccessDenied { retryable, .. }
            | LlmError::ContextLength { retryable, .. }
            | LlmError::ContentFilter { retryable, .. }
            | LlmError::InvalidRequest { retryable, .. }
            | LlmError::NotFound { retryable, .. }
            | LlmError::ProviderUnavailable { retryable, .. }
            | LlmError::Network { retryable, .. }
            | LlmError::Timeout { retryable, .. }
            | LlmError::Stream { retryable, .. }
            | LlmError::Abort { retryable, .. }
            | LlmError::InvalidToolCall { retryable, .. }
            | LlmError::Configuration { retryable, .. }
            | LlmError::QuotaExceeded { retryable, .. } => *retryable,
        }
    }

    pub fn retry_after(&self) -> Option<f64> {
        match self {
            LlmError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            LlmError::RateLimit { provider, .. }
            | LlmError::Authentication { provider, .. }
            | LlmError::AccessDenied { provider, .. }
            | LlmError::ContextLength { provider, .. }
            | LlmError::ContentFilter { provider, .. }
            | LlmError::InvalidRequest { provider, .. }
            | LlmError::NotFound { provider, .. }
            | LlmError::ProviderUnavailable { provider, .. }
            | LlmError::Network { provider, .. }
            | LlmError::Timeout { provider, .. }
            | LlmError::Stream { provider, .. }
            | LlmError::Abort { provider, .. }
            | LlmError::InvalidToolCall { provider, .. }
            | LlmError::Configuration { provider, .. }
            | LlmError::QuotaExceeded { provider, .. } => provider,
        }
    }
}

/// Classifies a raw error message and optional HTTP status code into an
/// [`ErrorKind`]. Status codes 401/403/404/413/429/5xx resolve unambiguously;
/// 400/422 and any other code fall through to lowercase substring matching.
pub fn classify(message: &str, status_code: Option<u16>) -> ErrorKind {
    if let Some(code) = status_code {
        match code {
            401 => return ErrorKind::Authentication,
            403 => return ErrorKind::AccessDenied,
            404 => return ErrorKind::NotFound,
            413 => return ErrorKind::ContextLength,
            429 => return ErrorKind::RateLimit,
            500..=599 => return ErrorKind::ProviderUnavailable,
            _ => {}
        }
    }

    let lower = message.to_lowercase();
    if lower.contains("context length") || lower.contains("context_length") {
        ErrorKind::ContextLength
    } else if lower.contains("rate limit") {
        ErrorKind::RateLimit
    } else if lower.contains("unauthorized") {
        ErrorKind::Authentication
    } else if lower.contains("not found") {
        ErrorKind::NotFound
    } else if lower.contains("content filter") || lower.contains("safety") || lower.contains("blocked")
    {
        ErrorKind::ContentFilter
    } else {
        ErrorKind::InvalidRequest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retryable_matches_taxonomy() {
        assert!(ErrorKind::RateLimit.default_retryable());
        assert!(ErrorKind::ProviderUnavailable.default_retryable());
        assert!(ErrorKind::Network.default_retryable());
        assert!(ErrorKind::Timeout.default_retryable());
        assert!(ErrorKind::Stream.default_retryable());
        assert!(!ErrorKind::Authentication.default_retryable());
        assert!(!ErrorKind::QuotaExceeded.default_retryable());
    }

    #[test]
    fn subtype_is_catchable_as_supertype() {
        let err = LlmError::from_kind(ErrorKind::AccessDenied, "openai");
        assert!(err.is_kind_or_subtype_of(ErrorKind::AccessDenied));
        assert!(err.is_kind_or_subtype_of(ErrorKind::Authentication));
        assert!(!err.is_kind_or_subtype_of(ErrorKind::RateLimit));
    }

    #[test]
    fn network_is_catchable_as_provider_unavailable() {
        let err = LlmError::from_kind(ErrorKind::Network, "anthropic");
        assert!(err.is_kind_or_subtype_of(ErrorKind::ProviderUnavailable));
    }

    #[test]
    fn quota_exceeded_defaults_non_retryable_despite_ratelimit_superkind() {
        let err = LlmError::from_kind(ErrorKind::QuotaExceeded, "openai");
        assert!(err.is_kind_or_subtype_of(ErrorKind::RateLimit));
        assert!(!err.retryable());
    }

    #[test]
    fn classify_status_codes_unambiguous() {
        assert_eq!(classify("", Some(401)), ErrorKind::Authentication);
        assert_eq!(classify("", Some(403)), ErrorKind::AccessDenied);
        assert_eq!(classify("", Some(404)), ErrorKind::NotFound);
        assert_eq!(classify("", Some(413)), ErrorKind::ContextLength);
        assert_eq!(classify("", Some(429)), ErrorKind::RateLimit);
        assert_eq!(classify("", Some(503)), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn classify_falls_through_to_substring_match() {
        assert_eq!(
            classify("Error: context length exceeded", Some(400)),
            ErrorKind::ContextLength
        );
        assert_eq!(
            classify("You are being rate limited", None),
            ErrorKind::RateLimit
        );
        assert_eq!(
            classify("401 Unauthorized: bad key", Some(422)),
            ErrorKind::Authentication
        );
        assert_eq!(
            classify("model not found", Some(400)),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify("Response blocked by safety system", None),
            ErrorKind::ContentFilter
        );
    }

    #[test]
    fn classify_default_is_invalid_request() {
        assert_eq!(classify("something odd happened", Some(418)), ErrorKind::InvalidRequest);
    }

    #[test]
    fn display_messages_are_human_readable() {
        let err = LlmError::RateLimit {
            provider: "openai".to_string(),
            status_code: Some(429),
            retryable: true,
            retry_after: Some(1.5),
        };
        assert_eq!(err.to_string(), "rate limited by openai (retry after 1.5s)");
    }

    #[test]
    fn serde_round_trip() {
        let err = LlmError::from_kind(ErrorKind::Timeout, "ollama");
        let json = serde_json::to_string(&err).unwrap();
        let back: LlmError = serde_json::from_str(&json).unwrap();
        assert_eq!(err.provider(), back.provider());
        assert_eq!(err.kind(), back.kind());
    }
}
