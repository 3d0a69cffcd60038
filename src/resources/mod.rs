//! CPU-side buffer resources.
//!
//! Everything here is device agnostic:
//! - [`DataBuffer`]: payload, revision, identity, disposal broadcast
//! - [`BufferData`]: canonical typed numeric payload
//! - [`DisposeRunner`]: ordered, failure-isolated disposal listeners
//! - [`ContextResources`]: per-context handle slots hosted by a buffer
//! - [`IdAllocator`]: buffer identity counter

pub mod buffer;
pub mod context;
pub mod data;
pub mod dispose;
pub mod id;

pub use buffer::{BufferDesc, BufferKind, BufferRef, BufferUsage, DataBuffer, WeakBufferRef};
pub use context::{ContextId, ContextResources};
pub use data::{BufferData, ElementType};
pub use dispose::{DisposeListener, DisposeReport, DisposeRunner, SubscriberId};
pub use id::{BufferId, IdAllocator};
