//! Error types for lifecycle operations.
//!
//! Provider failures are classified into a small set of classes so the
//! harness can decide between retrying, treating a failure as proof of
//! absence, and giving up. Everything the harness reports to its caller
//! carries enough context (address, step, raw provider code) to diagnose
//! a failed run without re-running it.

use crate::types::RecordedState;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classes of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// The resource does not exist
    NotFound,
    /// Throttling or service unavailability (retryable)
    Transient,
    /// Anything else
    Fatal,
}

impl ErrorClass {
    /// Whether this class is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Whether this class confirms the resource is gone.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Get a user-friendly description of this class.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::Transient => "Transient provider failure",
            Self::Fatal => "Provider error",
        }
    }

    /// Get actionable advice for this class.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "No action needed - the resource does not exist",
            Self::Transient => "Retry later or raise the retry budget",
            Self::Fatal => "Inspect the provider error code and message",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not-found"),
            Self::Transient => write!(f, "transient"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// A failure reported by a provider for a live query or mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ProviderError {
    /// Provider-specific error code (e.g. "InvalidLaunchConfiguration.NotFound")
    pub code: String,
    /// Human-readable message from the provider
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Code used when a query fails before the provider answers.
    pub fn unknown(kind: &str, message: impl Into<String>) -> Self {
        Self::new(format!("{kind}.Unknown"), message)
    }
}

/// Failure of a raw kind query.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// The provider answered with an error code
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Timeout, connection failure, or malformed response
    #[error("transport error: {message}")]
    Transport {
        /// What went wrong on the wire
        message: String,
    },
}

/// A live fetch did not produce an answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Caller contract violation: fetch requested with an empty ID
    #[error("empty id passed to live fetch for kind {kind}")]
    EmptyId {
        /// Kind the fetch was for
        kind: String,
    },

    /// The provider reported an error (transport failures included)
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Transient errors persisted through every retry
    #[error("{error} (after {attempts} attempts)")]
    Exhausted { error: ProviderError, attempts: u32 },
}

/// The apply component could not bring a configuration into existence.
#[derive(Debug, Clone, Error)]
pub struct ApplyError {
    /// Address of the resource that failed, if known
    pub address: Option<String>,
    /// What went wrong
    pub message: String,
    /// Resources that were created before the failure
    pub partial: RecordedState,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{address}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl ApplyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            address: None,
            message: message.into(),
            partial: RecordedState::new(),
        }
    }

    /// Attach the address of the failing resource.
    pub fn at(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Attach the state created before the failure.
    pub fn with_partial(mut self, partial: RecordedState) -> Self {
        self.partial = partial;
        self
    }
}

/// One resource that could not be destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyItemError {
    pub address: String,
    pub message: String,
}

/// Teardown did not complete for every resource.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub struct DestroyError {
    pub failures: Vec<DestroyItemError>,
}

impl fmt::Display for DestroyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items = self
            .failures
            .iter()
            .map(|i| format!("{} ({})", i.address, i.message))
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "failed to destroy {items}")
    }
}

/// A check predicate's expectation did not match observed state.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{predicate}: {message}")]
pub struct CheckFailure {
    /// Name of the leaf predicate that failed
    pub predicate: String,
    /// What was expected and what was observed
    pub message: String,
}

impl CheckFailure {
    pub fn new(predicate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            predicate: predicate.into(),
            message: message.into(),
        }
    }

    /// An attribute held a different value than expected.
    pub fn mismatch(
        predicate: impl Into<String>,
        attribute: &str,
        expected: &str,
        observed: Option<&str>,
    ) -> Self {
        let observed = match observed {
            Some(value) => format!("{value:?}"),
            None => "<unset>".to_string(),
        };
        Self::new(
            predicate,
            format!("attribute {attribute:?}: expected {expected:?}, observed {observed}"),
        )
    }
}

/// Destroy verification could not confirm absence.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DestroyFailure {
    /// The resource is still present after destroy
    #[error("{address} ({kind}) still exists with id {id}")]
    LifecycleViolation {
        address: String,
        kind: String,
        id: String,
    },

    /// A fatal provider error left absence undecidable
    #[error("cannot tell whether {address} (id {id}) is gone: {error}")]
    ClassificationAmbiguous {
        address: String,
        id: String,
        error: ProviderError,
    },

    /// Transient errors persisted through every retry
    #[error("{address} (id {id}) still unverified after {attempts} attempts: {error}")]
    RetriesExhausted {
        address: String,
        id: String,
        attempts: u32,
        error: ProviderError,
    },

    /// A record with an empty ID reached verification
    #[error("{address} has no recorded id")]
    MissingId { address: String },
}

/// Harness-level errors (caller contract violations and setup mistakes).
#[derive(Debug, Error)]
pub enum Error {
    /// Resource kind is not registered
    #[error("resource kind not registered: {0}")]
    UnknownKind(String),

    /// Resource kind registered twice
    #[error("resource kind registered twice: {0}")]
    DuplicateKind(String),

    /// Classifier pattern is blank
    #[error("empty error code pattern")]
    EmptyPattern,

    /// Classifier pattern does not compile
    #[error("invalid error code pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Thread pool or other runtime setup failure
    #[error("{0}")]
    Other(String),
}

/// Result type for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_retryable() {
        assert!(ErrorClass::Transient.is_retryable());
        assert!(!ErrorClass::NotFound.is_retryable());
        assert!(!ErrorClass::Fatal.is_retryable());
    }

    #[test]
    fn test_error_class_absence() {
        assert!(ErrorClass::NotFound.is_absence());
        assert!(!ErrorClass::Fatal.is_absence());
    }

    #[test]
    fn test_provider_error_unknown_code() {
        let err = ProviderError::unknown("aws_launch_configuration", "timed out");
        assert_eq!(err.code, "aws_launch_configuration.Unknown");
        assert_eq!(err.to_string(), "aws_launch_configuration.Unknown: timed out");
    }

    #[test]
    fn test_mismatch_names_both_values() {
        let failure = CheckFailure::mismatch("attr", "image_id", "ami-1", Some("ami-2"));
        assert!(failure.message.contains("image_id"));
        assert!(failure.message.contains("ami-1"));
        assert!(failure.message.contains("ami-2"));

        let unset = CheckFailure::mismatch("attr", "image_id", "ami-1", None);
        assert!(unset.message.contains("<unset>"));
    }

    #[test]
    fn test_apply_error_display() {
        let err = ApplyError::new("missing attribute").at("aws_launch_configuration.bar");
        assert_eq!(
            err.to_string(),
            "aws_launch_configuration.bar: missing attribute"
        );
        assert_eq!(ApplyError::new("boom").to_string(), "boom");
    }

    #[test]
    fn test_destroy_error_lists_items() {
        let err = DestroyError {
            failures: vec![
                DestroyItemError {
                    address: "a.x".into(),
                    message: "denied".into(),
                },
                DestroyItemError {
                    address: "a.y".into(),
                    message: "busy".into(),
                },
            ],
        };
        assert_eq!(err.to_string(), "failed to destroy a.x (denied), a.y (busy)");
    }
}
