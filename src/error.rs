//! Error kinds surfaced by the remix pipeline.
//!
//! Every stage reports its own kind; the pipeline never recovers across
//! stages, so the first error is what the caller sees.

use std::fmt;
use thiserror::Error;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lyrics,
    Generation,
    Synthesis,
    Mix,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Lyrics => "lyrics",
            Stage::Generation => "generation",
            Stage::Synthesis => "synthesis",
            Stage::Mix => "mix",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RemixError {
    /// No matching track (or no usable lyrics) after all lookup attempts.
    #[error("lyrics not found: {0}")]
    NotFound(String),

    /// Network, timeout or rate-limit failure while retrieving lyrics.
    #[error("lyrics fetch failed: {message}")]
    Fetch { message: String, retryable: bool },

    /// LLM call failed, timed out or returned nothing usable.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Audio backend failure, timeout or quota.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    /// Audio assembly failure.
    #[error("mix failed: {0}")]
    Mix(String),
}

impl RemixError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            RemixError::NotFound(_) | RemixError::Fetch { .. } => Stage::Lyrics,
            RemixError::Generation(_) => Stage::Generation,
            RemixError::Synthesis(_) => Stage::Synthesis,
            RemixError::Mix(_) => Stage::Mix,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RemixError::Fetch { retryable: true, .. })
    }

    /// One-line message naming the failing stage, for user display.
    pub fn user_message(&self) -> String {
        format!("[{}] {}", self.stage(), self)
    }
}

/// Map a reqwest failure during lyrics retrieval. Timeouts and connection
/// failures are worth retrying by the caller; anything else is not.
pub fn fetch_error(context: &str, e: reqwest::Error) -> RemixError {
    RemixError::Fetch {
        message: format!("{context}: {e}"),
        retryable: e.is_timeout() || e.is_connect(),
    }
}

pub type Result<T> = std::result::Result<T, RemixError>;
