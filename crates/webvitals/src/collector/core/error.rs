//! Error types for the collector with context and recovery information

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while collecting web-performance telemetry
///
/// Only [`CollectorError::Configuration`] is allowed to abort a batch. Every
/// other variant is converted into a per-URL [`Failure`](super::result::Failure)
/// by the batch coordinator and reported as data.
#[derive(Error, Debug)]
pub enum CollectorError {
    /// Invalid or inconsistent configuration (fatal, fails fast)
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
        suggestion: Option<String>,
    },

    /// HTTP transport errors with context
    #[error("HTTP request to '{url}' failed")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status outside the measurement path (sitemaps)
    #[error("Request to '{url}' returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: u16,
    },

    /// Network timeout
    #[error("Request to '{url}' timed out after {duration_secs}s")]
    NetworkTimeout {
        url: String,
        duration_secs: u64,
    },

    /// URL parsing errors with helpful suggestions
    #[error("Invalid URL '{url}': {suggestion}")]
    InvalidUrl {
        url: String,
        suggestion: String,
        #[source]
        source: url::ParseError,
    },

    /// File system I/O errors with file context
    #[error("File operation failed on '{path}' while {operation}")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// The upstream kept answering 429 until the attempt budget ran out
    #[error("Gave up on '{url}' after {attempts} throttled attempts")]
    ThrottleRetriesExhausted {
        url: String,
        attempts: u32,
    },

    /// The payload could not be decoded into the expected response shape
    #[error("Malformed payload for '{url}': {reason}")]
    MalformedPayload {
        url: String,
        reason: String,
    },

    /// The payload decoded but carried no measurement record
    #[error("No measurement record for '{url}'")]
    EmptyRecord {
        url: String,
    },

    /// Work stopped by a cancellation request
    #[error("Collection cancelled: {reason}")]
    Cancelled {
        reason: String,
        url: Option<String>,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, PartialEq)]
pub enum FileOperation {
    Read,
    Write,
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, CollectorError>;

impl CollectorError {
    /// Shorthand for a configuration error naming the offending field
    pub fn config<M: Into<String>, F: Into<String>>(message: M, field: F) -> Self {
        CollectorError::Configuration {
            message: message.into(),
            field: Some(field.into()),
            suggestion: None,
        }
    }

    /// Convert a failed request, keeping the timeout it was sent with
    pub fn request(url: &str, timeout: Duration, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            CollectorError::NetworkTimeout {
                url: url.to_string(),
                duration_secs: timeout.as_secs(),
            }
        } else {
            CollectorError::HttpRequest {
                url: url.to_string(),
                source: error,
            }
        }
    }

    /// Check if error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        match self {
            CollectorError::HttpRequest { source, .. } => {
                source.status().map_or(true, |status| status.is_server_error() || status == 429)
            }
            CollectorError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            CollectorError::NetworkTimeout { .. } => true,
            CollectorError::FileSystem { source, .. } => {
                matches!(source.kind(),
                    std::io::ErrorKind::Interrupted |
                    std::io::ErrorKind::TimedOut |
                    std::io::ErrorKind::WouldBlock
                )
            }
            CollectorError::ThrottleRetriesExhausted { .. } => false, // Already exhausted retries
            CollectorError::Configuration { .. } => false,
            CollectorError::InvalidUrl { .. } => false,
            CollectorError::MalformedPayload { .. } => false,
            CollectorError::EmptyRecord { .. } => false,
            CollectorError::Cancelled { .. } => false,
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            CollectorError::Configuration { .. } => "configuration",
            CollectorError::HttpRequest { .. } => "http_request",
            CollectorError::HttpStatus { .. } => "http_status",
            CollectorError::NetworkTimeout { .. } => "network_timeout",
            CollectorError::InvalidUrl { .. } => "invalid_url",
            CollectorError::FileSystem { .. } => "file_system",
            CollectorError::ThrottleRetriesExhausted { .. } => "throttle_retries_exhausted",
            CollectorError::MalformedPayload { .. } => "malformed_payload",
            CollectorError::EmptyRecord { .. } => "empty_record",
            CollectorError::Cancelled { .. } => "cancelled",
        }
    }

    /// Get severity level for error prioritization
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CollectorError::Configuration { .. } => ErrorSeverity::Critical,
            CollectorError::HttpRequest { .. } => ErrorSeverity::Medium,
            CollectorError::HttpStatus { .. } => ErrorSeverity::Medium,
            CollectorError::NetworkTimeout { .. } => ErrorSeverity::Medium,
            CollectorError::InvalidUrl { .. } => ErrorSeverity::High,
            CollectorError::FileSystem { .. } => ErrorSeverity::High,
            CollectorError::ThrottleRetriesExhausted { .. } => ErrorSeverity::High,
            CollectorError::MalformedPayload { .. } => ErrorSeverity::High,
            CollectorError::EmptyRecord { .. } => ErrorSeverity::Low,
            CollectorError::Cancelled { .. } => ErrorSeverity::Low,
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            CollectorError::Configuration { suggestion, .. } => suggestion.as_deref(),
            CollectorError::InvalidUrl { suggestion, .. } => Some(suggestion),
            CollectorError::NetworkTimeout { .. } => {
                Some("Check your internet connection or try increasing the timeout value")
            }
            CollectorError::ThrottleRetriesExhausted { .. } => {
                Some("Lower the concurrency or the rate limit, or raise the throttle retry budget")
            }
            CollectorError::EmptyRecord { .. } => {
                Some("The page probably has too little real-user traffic to be reported")
            }
            _ => None,
        }
    }

    /// Create a detailed error report for debugging
    pub fn detailed_report(&self) -> String {
        let mut report = format!("Error: {}\n", self);
        report.push_str(&format!("Category: {}\n", self.category()));
        report.push_str(&format!("Severity: {:?}\n", self.severity()));
        report.push_str(&format!("Recoverable: {}\n", self.is_recoverable()));

        if let Some(suggestion) = self.suggestion() {
            report.push_str(&format!("Suggestion: {}\n", suggestion));
        }

        if let Some(source) = self.source() {
            report.push_str(&format!("Root cause: {}\n", source));
        }

        report
    }
}

/// Error severity levels for prioritization
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<url::ParseError> for CollectorError {
    fn from(error: url::ParseError) -> Self {
        let suggestion = match error {
            url::ParseError::EmptyHost => "URL must have a valid hostname",
            url::ParseError::InvalidPort => "Port number must be between 1 and 65535",
            url::ParseError::RelativeUrlWithoutBase => "URL must be absolute (include http:// or https://)",
            _ => "Check URL format and try again",
        }.to_string();

        CollectorError::InvalidUrl {
            url: "<unparseable>".to_string(),
            suggestion,
            source: error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_is_critical_and_not_recoverable() {
        let err = CollectorError::config("max_queries must be greater than zero", "rate_limit.max_queries");
        assert_eq!(err.category(), "configuration");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_http_status_recoverability() {
        let throttled = CollectorError::HttpStatus { url: "https://a.example/".into(), status: 429 };
        let missing = CollectorError::HttpStatus { url: "https://a.example/".into(), status: 404 };
        assert!(throttled.is_recoverable());
        assert!(!missing.is_recoverable());
    }

    #[test]
    fn test_detailed_report_includes_suggestion() {
        let err = CollectorError::ThrottleRetriesExhausted { url: "https://a.example/".into(), attempts: 5 };
        let report = err.detailed_report();
        assert!(report.contains("throttle_retries_exhausted"));
        assert!(report.contains("Suggestion:"));
    }

    #[test]
    fn test_url_parse_error_conversion() {
        let err: CollectorError = url::Url::parse("not a url").unwrap_err().into();
        match err {
            CollectorError::InvalidUrl { suggestion, .. } => {
                assert!(suggestion.contains("absolute"));
            }
            other => panic!("Expected InvalidUrl, got {:?}", other),
        }
    }
}
