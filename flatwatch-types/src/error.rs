use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for the flatwatch workspace.
///
/// Wraps portal-tagged adapter failures, store failures, filter validation
/// errors, not-found conditions, and configuration problems. Variants carry
/// enough context to log with a source tag and nothing more; message bodies
/// and tokens never travel inside errors.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FlatwatchError {
    /// A portal adapter failed for this run.
    #[error("{adapter} failed: {msg}")]
    Source {
        /// Adapter name that failed (e.g. "kufar").
        adapter: String,
        /// Human-readable error message.
        msg: String,
    },

    /// A portal adapter exceeded its per-source timeout.
    #[error("source timed out: {adapter}")]
    SourceTimeout {
        /// Adapter name that timed out.
        adapter: String,
    },

    /// The remote SQL store failed; callers degrade rather than abort.
    #[error("store error: {0}")]
    Store(String),

    /// A subscriber filter is malformed or violates an accept-time bound.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// A resource could not be found (short-link code, city slug, ...).
    #[error("not found: {what}")]
    NotFound {
        /// Description of the missing resource, e.g. "short link a1b2c3".
        what: String,
    },

    /// Outbound delivery failed after local retries were exhausted.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Startup configuration is missing or unparseable.
    #[error("config error: {0}")]
    Config(String),
}

impl FlatwatchError {
    /// Helper: build a `Source` error with the adapter name and message.
    pub fn source(adapter: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Source {
            adapter: adapter.into(),
            msg: msg.into(),
        }
    }

    /// Helper: build a `SourceTimeout` error.
    pub fn source_timeout(adapter: impl Into<String>) -> Self {
        Self::SourceTimeout {
            adapter: adapter.into(),
        }
    }

    /// Helper: build a `Store` error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Helper: build a `NotFound` error for a description of the missing resource.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Helper: build an `InvalidFilter` error.
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Helper: build a `Config` error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns true when the failure is expected to clear on its own and a
    /// later tick should simply retry from scratch.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SourceTimeout { .. } | Self::Store(_) | Self::Delivery(_)
        )
    }
}
