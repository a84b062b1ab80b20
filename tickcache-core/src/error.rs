//! Structured error kinds shared by the fetch client and the orchestrator.
//!
//! Every upstream failure is one of four kinds. Each carries a human-readable
//! message plus an optional details map so callers can log a consistent shape
//! while still matching on the kind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Free-form structured context attached to an [`ApiError`].
pub type Details = BTreeMap<String, String>;

/// Upstream API failure.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiError {
    /// The upstream explicitly signaled throttling. Recoverable, reported as a warning.
    #[error("rate limited: {message}")]
    RateLimit { message: String, details: Details },

    /// Connectivity or timeout failures exhausted every retry.
    #[error("network error: {message}")]
    Network { message: String, details: Details },

    /// Credentials rejected. Retrying never fixes this.
    #[error("authentication failed: {message}")]
    Authentication { message: String, details: Details },

    /// The upstream answered but the payload was unusable.
    #[error("data retrieval failed: {message}")]
    DataRetrieval { message: String, details: Details },
}

/// Discriminant of [`ApiError`], handy for counters and log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    RateLimit,
    Network,
    Authentication,
    DataRetrieval,
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Authentication => "authentication",
            Self::DataRetrieval => "data_retrieval",
        };
        f.write_str(s)
    }
}

impl ApiError {
    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            details: Details::new(),
        }
    }

    pub fn data_retrieval(message: impl Into<String>) -> Self {
        Self::DataRetrieval {
            message: message.into(),
            details: Details::new(),
        }
    }

    /// Attach one detail entry, replacing any previous value for `key`.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details_mut().insert(key.into(), value.to_string());
        self
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::RateLimit { .. } => ApiErrorKind::RateLimit,
            Self::Network { .. } => ApiErrorKind::Network,
            Self::Authentication { .. } => ApiErrorKind::Authentication,
            Self::DataRetrieval { .. } => ApiErrorKind::DataRetrieval,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::RateLimit { message, .. }
            | Self::Network { message, .. }
            | Self::Authentication { message, .. }
            | Self::DataRetrieval { message, .. } => message,
        }
    }

    pub fn details(&self) -> &Details {
        match self {
            Self::RateLimit { details, .. }
            | Self::Network { details, .. }
            | Self::Authentication { details, .. }
            | Self::DataRetrieval { details, .. } => details,
        }
    }

    fn details_mut(&mut self) -> &mut Details {
        match self {
            Self::RateLimit { details, .. }
            | Self::Network { details, .. }
            | Self::Authentication { details, .. }
            | Self::DataRetrieval { details, .. } => details,
        }
    }

    /// Rate limits are warnings; everything else is a failure.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::RateLimit { .. })
    }

    /// HTTP status an outer request layer should answer with for this error.
    ///
    /// Rate limits map to 200 so callers still receive whatever data is cached.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimit { .. } => 200,
            Self::Network { .. } => 503,
            Self::Authentication { .. } => 401,
            Self::DataRetrieval { .. } => 500,
        }
    }
}
