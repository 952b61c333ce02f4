//! Error Types
//!
//! The single error enum used throughout the crate. All public APIs that can
//! fail return [`Result<T>`], an alias for `std::result::Result<T, HeliosError>`.

use thiserror::Error;

/// The main error type for the Helios framework.
#[derive(Error, Debug)]
pub enum HeliosError {
    // ========================================================================
    // Lifecycle & API misuse
    // ========================================================================
    /// An operation was attempted in a state that forbids it, e.g. committing
    /// a transaction twice or executing a task graph before finalizing it.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// An argument belongs to a different owner than the one it was handed
    /// to, e.g. destroying a material through a foreign manager.
    #[error("incompatible argument: {0}")]
    IncompatibleArgument(&'static str),

    // ========================================================================
    // Resources
    // ========================================================================
    /// A non-blocking allocation failed and the caller opted out of waiting.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),

    /// A lookup before the resource was created, e.g. a pipeline that was
    /// never built for a material.
    #[error("not found: {0}")]
    NotFound(&'static str),

    // ========================================================================
    // Device
    // ========================================================================
    /// A failure reported by the underlying device. Fatal to the current
    /// frame.
    #[error("device error: {0}")]
    Device(String),
}

/// Alias for `Result<T, HeliosError>`.
pub type Result<T> = std::result::Result<T, HeliosError>;
