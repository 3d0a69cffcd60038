//! CPU-side GPU data buffers.
//!
//! A [`DataBuffer`] owns a typed numeric payload and a revision counter.
//! Device-binding layers compare the revision against the last one they
//! uploaded to decide when to push data again, and park their per-context
//! device handles in the buffer's [`ContextResources`]. Disposing the buffer
//! broadcasts to every subscribed context so each can free its device copy.
//!
//! ```rust,ignore
//! use databuffer::{BufferRef, ContextBufferManager, ContextId, ManagerSettings};
//!
//! let positions = BufferRef::from_data(vec![0.0_f32, 1.0, 0.0]);
//! let manager = ContextBufferManager::new(ContextId(0), backend, ManagerSettings::default());
//!
//! manager.prepare(&positions)?;          // allocates + uploads
//! positions.update_with(vec![1.0_f32, 1.0, 0.0])?;
//! manager.prepare(&positions)?;          // revision moved: re-uploads
//! positions.destroy();                   // manager releases its handle
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod binding;
pub mod errors;
pub mod resources;

pub use binding::{ContextBufferManager, DeviceBackend, EnsureResult, ManagerSettings, UploadDesc};
pub use errors::{BufferError, Result};
pub use resources::{
    BufferData, BufferDesc, BufferId, BufferKind, BufferRef, BufferUsage, ContextId,
    ContextResources, DataBuffer, DisposeReport, IdAllocator, SubscriberId,
};
