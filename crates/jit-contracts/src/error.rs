//! The error taxonomy (§7) shared across every `jit-core` trait boundary.
//!
//! Adapter crates map their own failure types into `JitError` at the
//! boundary; no adapter-specific error type crosses a trait defined in
//! `jit-core`.

use thiserror::Error;

/// The unified error type for the JIT access engine.
#[derive(Debug, Error)]
pub enum JitError {
    /// The upstream identity-aware proxy did not attach a verified user
    /// identifier. Never raised by the core directly (§7) — present so
    /// adapters have a slot to report it through the same taxonomy.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The caller is ineligible, not a listed reviewer, or the
    /// justification failed the configured policy.
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    /// The referenced resource is absent.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// A binding with identical (member, role, condition) already exists.
    /// `approve` treats this as success when caused by a concurrent
    /// approval race (§4.3, §9 Open Question 3).
    #[error("already exists: {what}")]
    AlreadyExists { what: String },

    /// An out-of-range duration, reviewer count, batch size, or a start
    /// time in the past.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The provisioner exhausted its etag-conflict retry budget.
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// Signature mismatch, wrong algorithm, issuer/audience mismatch, or
    /// an expired token.
    #[error("token invalid: {reason}")]
    TokenInvalid { reason: String },

    /// A transport-level failure from an outbound collaborator. The
    /// caller MAY retry.
    #[error("transient error: {reason}")]
    Transient { reason: String },

    /// Startup configuration failed validation.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the JIT access engine crates.
pub type JitResult<T> = Result<T, JitError>;
