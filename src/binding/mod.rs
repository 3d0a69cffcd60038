//! Device binding layer.
//!
//! Consumes [`DataBuffer`](crate::resources::DataBuffer)s on behalf of one
//! device context: allocates a device buffer on first use, re-uploads when
//! the revision moves, and releases the device buffer when the CPU buffer
//! broadcasts its disposal.
//!
//! The actual device calls sit behind [`DeviceBackend`], so this module stays
//! graphics-API agnostic. [`mock::MockBackend`] records calls for tests.

pub mod manager;
pub mod mock;

use std::fmt;

use crate::resources::{BufferKind, BufferUsage};

pub use manager::ContextBufferManager;

/// Parameters handed to [`DeviceBackend::create_buffer`].
#[derive(Debug, Clone, Copy)]
pub struct UploadDesc<'a> {
    pub label: &'a str,
    pub bytes: &'a [u8],
    pub kind: BufferKind,
    pub usage: BufferUsage,
}

/// The device calls a context needs to mirror CPU buffers.
pub trait DeviceBackend: Send + 'static {
    /// Device-side buffer handle.
    type Handle: Clone + fmt::Debug + Send + Sync + 'static;
    type Error: fmt::Display;

    /// Allocates a device buffer initialised with `desc.bytes`.
    fn create_buffer(&mut self, desc: &UploadDesc<'_>) -> Result<Self::Handle, Self::Error>;

    /// Overwrites the start of an existing device buffer.
    fn write_buffer(&mut self, handle: &Self::Handle, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Frees a device buffer.
    fn release_buffer(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;
}

/// Per-context manager configuration.
///
/// ```rust,ignore
/// let settings = ManagerSettings {
///     label: "offscreen".into(),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Name used in log messages.
    pub label: String,
    /// Reallocate the device buffer when the payload shrinks, not only when
    /// it grows past the current capacity.
    pub recreate_on_shrink: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            label: "context".to_string(),
            recreate_on_shrink: false,
        }
    }
}

/// Result of [`ContextBufferManager::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsureResult {
    /// Revision the device copy now reflects.
    pub revision: u64,
    /// The device buffer was just allocated or reallocated.
    pub was_recreated: bool,
    /// Bytes were pushed to the device during this call.
    pub uploaded: bool,
}

impl EnsureResult {
    #[inline]
    #[must_use]
    pub fn existing(revision: u64) -> Self {
        Self {
            revision,
            was_recreated: false,
            uploaded: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn written(revision: u64) -> Self {
        Self {
            revision,
            was_recreated: false,
            uploaded: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn created(revision: u64) -> Self {
        Self {
            revision,
            was_recreated: true,
            uploaded: true,
        }
    }
}
