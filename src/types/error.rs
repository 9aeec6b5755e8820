//! Unified Error Type System
//!
//! Centralized error taxonomy for the entire pipeline. Every error carries
//! enough context (phase, prompt key, violation code) to surface a useful
//! user-visible message, and classifies itself for retry/quarantine routing:
//!
//! - **InvalidJsonLine**: a malformed artifact line: quarantine and continue
//! - **SchemaViolation**: malformed LLM output after repair: retry, then quarantine
//! - **Provider**: transport failure: retry when retryable, else quarantine
//! - **PolicyViolation**: a decision, never fatal
//! - **Invariant**: hierarchy invariant broken: fatal within its phase
//! - **Configuration / ResumePointUnknown**: fail fast, pre-flight

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Provider Error Categories
// =============================================================================

/// Classification of LLM provider failures for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Rate limited or transient server issue - retry with backoff
    Transient,
    /// Request timed out - retry with backoff
    Timeout,
    /// Authentication / bad request - do not retry
    Permanent,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Permanent => write!(f, "PERMANENT"),
        }
    }
}

impl ProviderErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::Timeout)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum TaxonomyError {
    // -------------------------------------------------------------------------
    // System errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // -------------------------------------------------------------------------
    // Record-level errors (quarantine, continue)
    // -------------------------------------------------------------------------
    /// A single artifact line failed to parse.
    #[error("invalid JSON at {path}:{line}: {detail}")]
    InvalidJsonLine {
        path: String,
        line: usize,
        detail: String,
    },

    /// LLM output did not match the prompt schema even after repair.
    #[error("schema violation for prompt '{prompt}': {detail}")]
    SchemaViolation { prompt: String, detail: String },

    /// LLM provider transport failure.
    #[error("provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    /// Operation exceeded its deadline.
    #[error("timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Decision-level errors (surfaced, never fatal)
    // -------------------------------------------------------------------------
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    // -------------------------------------------------------------------------
    // Phase-fatal errors
    // -------------------------------------------------------------------------
    /// A hierarchy/graph invariant was broken.
    #[error("invariant violation [{code}]: {detail}")]
    Invariant { code: String, detail: String },

    /// A phase failed in a way local recovery cannot absorb.
    #[error("pipeline error in phase {phase}: {message}")]
    Phase { phase: String, message: String },

    // -------------------------------------------------------------------------
    // Pre-flight errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown resume phase: {0}")]
    ResumePointUnknown(String),

    #[error("entity validation failed: {0}")]
    Entity(String),
}

impl TaxonomyError {
    /// Create a provider error with retry classification.
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Create a phase-scoped error.
    pub fn phase(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Phase {
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Create an invariant violation with a stable code.
    pub fn invariant(code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Invariant {
            code: code.into(),
            detail: detail.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether the failing operation may be retried in place.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { kind, .. } => kind.is_retryable(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Whether the error should quarantine a single record rather than
    /// abort the phase.
    pub fn is_record_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidJsonLine { .. }
                | Self::SchemaViolation { .. }
                | Self::Provider { .. }
                | Self::PolicyViolation(_)
        )
    }

    /// Stable quarantine reason for record-local failures.
    pub fn quarantine_reason(&self) -> &'static str {
        match self {
            Self::InvalidJsonLine { .. } => "invalid_json",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::Provider { .. } => "provider_error",
            Self::PolicyViolation(_) => "policy_violation",
            _ => "error",
        }
    }
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;

// =============================================================================
// Tests
// =============================================================================
