//! Error taxonomy shared across the pipeline.
//!
//! Retryability is carried as a property of the error value, not as type
//! identity: workflow retry policies consult [`Error::kind`] against their
//! non-retryable sets and [`Error::is_retryable`] for the default posture.

use thiserror::Error;

/// Result type used across the sitrep crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Union of failure kinds produced by the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed config, invalid domain/hostname/IP, invalid CPE or CVE id,
    /// missing required environment variable. Never retried.
    #[error("bad input: {0}")]
    BadInput(String),

    /// Connection refused, timeout, HTTP 5xx. Retried with back-off.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// HTTP 429 from a rate-limited API. Retryable once the mandated
    /// post-request delay has been honoured.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Non-zero exit (or empty output where output is required) from an
    /// external enumeration tool. Never retried at the workflow level.
    #[error("enumeration tool failed: {0}")]
    EnumerationTool(String),

    /// A subdomain merge produced an empty set. Never retried.
    #[error("no domains found: {0}")]
    NoDomainsFound(String),

    /// Graph-store deadlock or transient cluster error. Retryable.
    #[error("transient store failure: {0}")]
    StoreTransient(String),

    /// Uniqueness/constraint violation in the graph store. Surfaces to the
    /// caller as bad input.
    #[error("store constraint violation: {0}")]
    StoreConstraint(String),

    /// Creating a schedule whose id already exists. Informational.
    #[error("schedule already running: {0}")]
    ScheduleAlreadyRunning(String),
}

impl Error {
    /// Stable kind name used by retry policies' non-retryable sets.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadInput(_) => "BadInput",
            Error::TransientNetwork(_) => "TransientNetwork",
            Error::RateLimited(_) => "RateLimited",
            Error::EnumerationTool(_) => "EnumerationToolError",
            Error::NoDomainsFound(_) => "NoDomainsFoundError",
            Error::StoreTransient(_) => "StoreTransient",
            Error::StoreConstraint(_) => "StoreConstraint",
            Error::ScheduleAlreadyRunning(_) => "ScheduleAlreadyRunning",
        }
    }

    /// Default retry posture when no policy overrides it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransientNetwork(_) | Error::RateLimited(_) | Error::StoreTransient(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::BadInput(format!("JSON decode failed: {err}"))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::BadInput(format!("YAML decode failed: {err}"))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::StoreTransient(format!("redis: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::EnumerationTool(format!("process I/O failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(Error::BadInput("x".into()).kind(), "BadInput");
        assert_eq!(
            Error::EnumerationTool("x".into()).kind(),
            "EnumerationToolError"
        );
        assert_eq!(
            Error::NoDomainsFound("x".into()).kind(),
            "NoDomainsFoundError"
        );
    }

    #[test]
    fn test_retryability() {
        assert!(Error::TransientNetwork("t".into()).is_retryable());
        assert!(Error::RateLimited("t".into()).is_retryable());
        assert!(Error::StoreTransient("t".into()).is_retryable());
        assert!(!Error::BadInput("t".into()).is_retryable());
        assert!(!Error::EnumerationTool("t".into()).is_retryable());
        assert!(!Error::NoDomainsFound("t".into()).is_retryable());
        assert!(!Error::StoreConstraint("t".into()).is_retryable());
    }
}
