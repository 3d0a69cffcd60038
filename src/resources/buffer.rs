use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use crate::errors::{BufferError, Result};

use super::context::ContextResources;
use super::data::BufferData;
use super::dispose::{DisposeListener, DisposeReport, DisposeRunner, SubscriberId};
use super::id::{BufferId, IdAllocator};

/// How often the payload is expected to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Written rarely, drawn often.
    #[default]
    Static,
    /// Rewritten frequently.
    Dynamic,
}

/// Semantics of the payload for device-binding collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferKind {
    /// Generic or per-vertex data.
    #[default]
    Vertex,
    /// Element indices.
    Index,
}

/// Construction parameters for a [`DataBuffer`].
#[derive(Debug, Clone, Default)]
pub struct BufferDesc {
    /// Initial payload. `None` allocates a one-element placeholder.
    pub data: Option<BufferData>,
    /// Expected update frequency. Defaults to [`BufferUsage::Static`].
    pub usage: BufferUsage,
    /// Index or vertex semantics. Defaults to [`BufferKind::Vertex`].
    pub kind: BufferKind,
    /// Debug label. `None` uses `"DataBuffer"`.
    pub label: Option<String>,
}

/// CPU-side copy of a device buffer.
///
/// Holds the raw payload and a revision counter bumped on every
/// [`update`](Self::update). Device-binding layers cache the last revision
/// they uploaded and compare against [`revision`](Self::revision) to decide
/// whether to re-upload. The buffer never talks to a device itself.
#[derive(Debug)]
pub struct DataBuffer {
    id: BufferId,
    label: String,
    usage: BufferUsage,
    kind: BufferKind,
    revision: AtomicU64,
    // Raised before the destroy broadcast, so it is visible to anyone racing it.
    destroyed: AtomicBool,
    data: RwLock<Option<BufferData>>,
    context_resources: ContextResources,
    dispose_runner: DisposeRunner,
}

impl DataBuffer {
    /// Builds a buffer with an id from the process-wide allocator.
    #[must_use]
    pub fn new(desc: BufferDesc) -> Self {
        Self::with_allocator(desc, IdAllocator::global())
    }

    /// Builds a buffer with an id drawn from `ids`.
    #[must_use]
    pub fn with_allocator(desc: BufferDesc, ids: &IdAllocator) -> Self {
        let id = ids.next_id();
        let label = desc.label.unwrap_or_else(|| "DataBuffer".to_string());
        let data = desc.data.unwrap_or_else(BufferData::placeholder);

        log::debug!(
            "Created buffer {} {:?} ({} bytes, {:?}, {:?})",
            id,
            label,
            data.byte_len(),
            desc.usage,
            desc.kind
        );

        Self {
            id,
            label,
            usage: desc.usage,
            kind: desc.kind,
            revision: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            data: RwLock::new(Some(data)),
            context_resources: ContextResources::new(),
            dispose_runner: DisposeRunner::new(),
        }
    }

    /// Static vertex buffer around `data`.
    ///
    /// Plain `f32` sequences become the canonical `F32` payload; typed
    /// payloads are kept as they are.
    #[must_use]
    pub fn from_data(data: impl Into<BufferData>) -> Self {
        Self::new(BufferDesc {
            data: Some(data.into()),
            ..Default::default()
        })
    }

    #[must_use]
    pub fn into_ref(self) -> BufferRef {
        BufferRef(Arc::new(self))
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current revision. Starts at 0.
    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.usage == BufferUsage::Static
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.kind == BufferKind::Index
    }

    /// Read access to the payload, or `None` once destroyed.
    #[must_use]
    pub fn data(&self) -> Option<MappedRwLockReadGuard<'_, BufferData>> {
        RwLockReadGuard::try_map(self.data.read(), Option::as_ref).ok()
    }

    /// Payload size in bytes, 0 once destroyed.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.read().as_ref().map_or(0, BufferData::byte_len)
    }

    /// True from the moment [`destroy`](Self::destroy) starts.
    ///
    /// Lock-free, so disposal listeners may call it while `destroy` runs.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Slots where device contexts park their handles for this buffer.
    #[inline]
    #[must_use]
    pub fn context_resources(&self) -> &ContextResources {
        &self.context_resources
    }

    // === Updates ===

    /// Replaces the payload (if `data` is `Some`) and bumps the revision.
    ///
    /// The revision is bumped even when `data` is `None` or equal to the
    /// current payload, which lets callers force a re-upload. Returns the new
    /// revision. Fails with [`BufferError::Destroyed`] after
    /// [`destroy`](Self::destroy), leaving the revision untouched.
    pub fn update(&self, data: Option<BufferData>) -> Result<u64> {
        let mut slot = self.data.write();
        let Some(current) = slot.as_mut().filter(|_| !self.is_destroyed()) else {
            return Err(BufferError::Destroyed { id: self.id });
        };
        if let Some(data) = data {
            *current = data;
        }
        // Bumped while the write lock is held so readers never see a new
        // revision paired with the old payload.
        Ok(self.revision.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// [`update`](Self::update) with a fresh payload.
    pub fn update_with(&self, data: impl Into<BufferData>) -> Result<u64> {
        self.update(Some(data.into()))
    }

    /// Marks the buffer dirty without touching its payload.
    pub fn touch(&self) -> Result<u64> {
        self.update(None)
    }

    // === Disposal ===

    /// Registers a disposal listener, see [`DisposeRunner::subscribe`].
    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&DataBuffer, bool) -> Result<()> + Send + Sync + 'static,
    {
        self.dispose_runner.subscribe(listener)
    }

    pub fn subscribe_arc(&self, listener: DisposeListener) -> SubscriberId {
        self.dispose_runner.subscribe_arc(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.dispose_runner.unsubscribe(id)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.dispose_runner.len()
    }

    /// Asks every subscribed context to release its device resources.
    ///
    /// The CPU payload is kept. Safe to call repeatedly: each call
    /// broadcasts again and listeners treat missing entries as no-ops.
    pub fn dispose(&self) -> DisposeReport {
        self.dispose_runner.emit(self, false)
    }

    /// Disposes device resources, then releases the CPU payload.
    ///
    /// The buffer is terminal afterwards: [`update`](Self::update) fails.
    /// The destroyed flag is raised before the broadcast, so a context that
    /// races the broadcast sees it and backs out instead of allocating.
    pub fn destroy(&self) -> DisposeReport {
        self.destroyed.store(true, Ordering::SeqCst);
        let report = self.dispose();
        if self.data.write().take().is_some() {
            log::debug!("Destroyed buffer {} {:?}", self.id, self.label);
        }
        report
    }
}

impl Default for DataBuffer {
    fn default() -> Self {
        Self::new(BufferDesc::default())
    }
}

/// Shared handle to a [`DataBuffer`]. Equality and hashing go by id.
#[derive(Debug, Clone)]
pub struct BufferRef(Arc<DataBuffer>);

impl PartialEq for BufferRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for BufferRef {}

impl std::hash::Hash for BufferRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl BufferRef {
    #[must_use]
    pub fn new(desc: BufferDesc) -> Self {
        DataBuffer::new(desc).into_ref()
    }

    #[must_use]
    pub fn from_data(data: impl Into<BufferData>) -> Self {
        DataBuffer::from_data(data).into_ref()
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakBufferRef {
        WeakBufferRef(Arc::downgrade(&self.0))
    }
}

impl std::ops::Deref for BufferRef {
    type Target = DataBuffer;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<DataBuffer> for BufferRef {
    fn from(buffer: DataBuffer) -> Self {
        buffer.into_ref()
    }
}

/// Non-owning counterpart of [`BufferRef`].
#[derive(Debug, Clone)]
pub struct WeakBufferRef(Weak<DataBuffer>);

impl WeakBufferRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<BufferRef> {
        self.0.upgrade().map(BufferRef)
    }

    /// False once every [`BufferRef`] to the buffer has been dropped.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_none_keeps_data() {
        let buffer = DataBuffer::from_data(vec![1.0_f32, 2.0]);
        assert_eq!(buffer.update(None), Ok(1));
        assert_eq!(buffer.data().unwrap().as_f32(), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn test_update_after_destroy_fails() {
        let buffer = DataBuffer::from_data(vec![1.0_f32]);
        buffer.update(None).unwrap();
        buffer.destroy();

        assert_eq!(
            buffer.update_with(vec![2.0_f32]),
            Err(BufferError::Destroyed { id: buffer.id() })
        );
        assert_eq!(buffer.revision(), 1);
        assert!(buffer.data().is_none());
        assert_eq!(buffer.byte_len(), 0);
    }

    #[test]
    fn test_buffer_ref_identity() {
        let a = BufferRef::from_data(vec![0.0_f32]);
        let b = a.clone();
        let c = BufferRef::from_data(vec![0.0_f32]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let weak = a.downgrade();
        drop(a);
        assert!(weak.upgrade().is_some());
        drop(b);
        assert!(weak.upgrade().is_none());
        assert!(!weak.is_alive());
    }

    #[test]
    fn test_destroyed_flag_is_visible_during_broadcast() {
        let buffer = DataBuffer::from_data(vec![1.0_f32]);
        let seen = Arc::new(AtomicBool::new(false));
        let seen_in_listener = seen.clone();
        buffer.subscribe(move |b: &DataBuffer, _| {
            seen_in_listener.store(b.is_destroyed() && b.update(None).is_err(), Ordering::SeqCst);
            Ok(())
        });

        buffer.destroy();
        assert!(seen.load(Ordering::SeqCst));
    }
}
