//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`BufferError`] covers:
//! - Invalid-state access (mutating a destroyed buffer)
//! - Disposal subscriber failures, reported individually and in aggregate
//! - Device backend failures raised by the binding layer
//!
//! # Usage
//!
//! Fallible APIs return [`Result<T>`], an alias for `std::result::Result<T, BufferError>`.
//!
//! ```rust,ignore
//! use databuffer::errors::{BufferError, Result};
//!
//! fn refresh(buffer: &DataBuffer) -> Result<u64> {
//!     buffer.update(None)
//! }
//! ```

use thiserror::Error;

use crate::resources::{BufferId, ContextId, SubscriberId};

/// The main error type for buffer bookkeeping and device binding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The buffer was destroyed and its CPU data released.
    #[error("Buffer {id} has been destroyed")]
    Destroyed {
        /// Identity of the destroyed buffer
        id: BufferId,
    },

    // ========================================================================
    // Disposal Errors
    // ========================================================================
    /// A disposal subscriber reported a failure.
    #[error("Dispose listener for context {context} failed: {reason}")]
    Listener {
        /// Context owning the failing listener
        context: ContextId,
        /// Human readable failure
        reason: String,
    },

    /// A disposal subscriber panicked while being notified.
    #[error("Dispose listener {subscriber} panicked: {message}")]
    ListenerPanicked {
        /// Subscriber that panicked
        subscriber: SubscriberId,
        /// Panic payload, if it was a string
        message: String,
    },

    /// One or more subscribers failed during a disposal broadcast.
    #[error("Disposing buffer {id} reported {} failure(s)", .failures.len())]
    DisposeFailed {
        /// Identity of the disposed buffer
        id: BufferId,
        /// Individual failures, in notification order
        failures: Vec<BufferError>,
    },

    /// One or more buffers failed to release while a context was torn down.
    #[error("Disposing context {context} reported {} failure(s)", .failures.len())]
    ContextDisposeFailed {
        /// Context being torn down
        context: ContextId,
        /// Individual failures
        failures: Vec<BufferError>,
    },

    // ========================================================================
    // Device Binding Errors
    // ========================================================================
    /// The device backend rejected an operation.
    #[error("Device backend error on context {context}: {reason}")]
    Backend {
        /// Context whose backend failed
        context: ContextId,
        /// Backend supplied reason
        reason: String,
    },

    /// The buffer is not tracked by the queried context.
    #[error("Buffer {id} is not tracked by this context")]
    UnknownBuffer {
        /// Identity of the untracked buffer
        id: BufferId,
    },
}

impl BufferError {
    /// Shorthand for a backend failure.
    pub fn backend(context: ContextId, reason: impl Into<String>) -> Self {
        Self::Backend {
            context,
            reason: reason.into(),
        }
    }

    /// Shorthand for a listener failure.
    pub fn listener(context: ContextId, reason: impl Into<String>) -> Self {
        Self::Listener {
            context,
            reason: reason.into(),
        }
    }
}

/// Alias for `Result<T, BufferError>`.
pub type Result<T> = std::result::Result<T, BufferError>;
