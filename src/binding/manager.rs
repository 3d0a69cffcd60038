//! Per-context buffer cache.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::{BufferError, Result};
use crate::resources::{
    BufferData, BufferId, BufferRef, ContextId, DataBuffer, SubscriberId, WeakBufferRef,
};

use super::{DeviceBackend, EnsureResult, ManagerSettings, UploadDesc};

/// Device copy of one CPU buffer.
#[derive(Debug)]
struct GpuBuffer<H> {
    handle: H,
    capacity: usize,
    last_uploaded_revision: u64,
    subscription: SubscriberId,
    source: WeakBufferRef,
}

struct ManagerState<B: DeviceBackend> {
    backend: B,
    gpu_buffers: FxHashMap<BufferId, GpuBuffer<B::Handle>>,
}

/// Mirrors [`DataBuffer`]s into one device context.
///
/// On first [`prepare`](Self::prepare) of a buffer the manager allocates a
/// device buffer, parks its handle in the buffer's
/// [`ContextResources`](crate::resources::ContextResources) under this
/// context's id, and subscribes to the buffer's disposal broadcast. Later
/// calls re-upload only when the buffer's revision moved.
///
/// Dropping the manager treats the context as lost: entries are unlinked from
/// their buffers without releasing device handles.
pub struct ContextBufferManager<B: DeviceBackend> {
    context: ContextId,
    settings: ManagerSettings,
    state: Arc<Mutex<ManagerState<B>>>,
}

impl<B: DeviceBackend> ContextBufferManager<B> {
    #[must_use]
    pub fn new(context: ContextId, backend: B, settings: ManagerSettings) -> Self {
        log::debug!("Buffer manager {:?} bound to {}", settings.label, context);
        Self {
            context,
            settings,
            state: Arc::new(Mutex::new(ManagerState {
                backend,
                gpu_buffers: FxHashMap::default(),
            })),
        }
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> ContextId {
        self.context
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Makes sure the device copy of `buffer` is current.
    ///
    /// Fails with [`BufferError::Destroyed`] once the buffer's
    /// [`destroy`](DataBuffer::destroy) has started, including when it starts
    /// while this call is allocating.
    pub fn prepare(&self, buffer: &BufferRef) -> Result<EnsureResult> {
        let id = buffer.id();
        let data = match buffer.data() {
            Some(data) if !buffer.is_destroyed() => data,
            _ => return Err(BufferError::Destroyed { id }),
        };
        let revision = buffer.revision();

        let mut state = self.state.lock();
        let ManagerState {
            backend,
            gpu_buffers,
        } = &mut *state;

        if let Some(gpu_buf) = gpu_buffers.get_mut(&id) {
            if gpu_buf.last_uploaded_revision == revision {
                return Ok(EnsureResult::existing(revision));
            }

            let len = data.byte_len();
            let must_recreate = len > gpu_buf.capacity
                || (self.settings.recreate_on_shrink && len < gpu_buf.capacity);

            if must_recreate {
                log::debug!(
                    "[{}] Resizing buffer {} {:?} from {} to {} bytes",
                    self.settings.label,
                    id,
                    buffer.label(),
                    gpu_buf.capacity,
                    len
                );
                let handle = self.create(backend, buffer, &data)?;
                let old = std::mem::replace(&mut gpu_buf.handle, handle.clone());
                if let Err(err) = release_handle(backend, self.context, old) {
                    log::error!(
                        "[{}] Failed to release replaced device buffer for {}: {}",
                        self.settings.label,
                        id,
                        err
                    );
                }
                gpu_buf.capacity = len;
                gpu_buf.last_uploaded_revision = revision;
                buffer.context_resources().insert(self.context, handle);
                return Ok(EnsureResult::created(revision));
            }

            backend
                .write_buffer(&gpu_buf.handle, data.as_bytes())
                .map_err(|e| BufferError::backend(self.context, e.to_string()))?;
            gpu_buf.last_uploaded_revision = revision;
            log::trace!("[{}] Uploaded buffer {} at revision {}", self.settings.label, id, revision);
            return Ok(EnsureResult::written(revision));
        }

        let handle = self.create(backend, buffer, &data)?;
        let subscription = buffer.subscribe(dispose_listener(Arc::downgrade(&self.state), self.context));

        // A destroy that started after the check above may have broadcast
        // before the subscription existed. Back out instead of leaking.
        if buffer.is_destroyed() {
            buffer.unsubscribe(subscription);
            log::debug!(
                "[{}] Buffer {} destroyed while being created, releasing",
                self.settings.label,
                id
            );
            if let Err(err) = release_handle(backend, self.context, handle) {
                log::error!("[{}] Failed to release buffer {}: {}", self.settings.label, id, err);
            }
            return Err(BufferError::Destroyed { id });
        }

        buffer.context_resources().insert(self.context, handle.clone());
        gpu_buffers.insert(
            id,
            GpuBuffer {
                handle,
                capacity: data.byte_len(),
                last_uploaded_revision: revision,
                subscription,
                source: buffer.downgrade(),
            },
        );

        Ok(EnsureResult::created(revision))
    }

    fn create(&self, backend: &mut B, buffer: &DataBuffer, data: &BufferData) -> Result<B::Handle> {
        let desc = UploadDesc {
            label: buffer.label(),
            bytes: data.as_bytes(),
            kind: buffer.kind(),
            usage: buffer.usage(),
        };
        backend
            .create_buffer(&desc)
            .map_err(|e| BufferError::backend(self.context, e.to_string()))
    }

    /// Device handle currently held for `id`.
    #[must_use]
    pub fn handle_for(&self, id: BufferId) -> Option<B::Handle> {
        self.state.lock().gpu_buffers.get(&id).map(|b| b.handle.clone())
    }

    /// Last revision pushed to the device for `id`.
    pub fn uploaded_revision(&self, id: BufferId) -> Result<u64> {
        self.state
            .lock()
            .gpu_buffers
            .get(&id)
            .map(|b| b.last_uploaded_revision)
            .ok_or(BufferError::UnknownBuffer { id })
    }

    /// Whether `buffer` has changed since this context last uploaded it.
    #[must_use]
    pub fn is_stale(&self, buffer: &DataBuffer) -> bool {
        self.state
            .lock()
            .gpu_buffers
            .get(&buffer.id())
            .is_none_or(|b| b.last_uploaded_revision != buffer.revision())
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.state.lock().gpu_buffers.len()
    }

    /// Runs `f` against the backend.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.state.lock().backend)
    }

    /// Releases device copies whose CPU buffer has been dropped.
    ///
    /// Entries whose every [`BufferRef`] is gone are removed and their
    /// handles released. Returns how many entries were removed. Release
    /// failures are logged and returned in aggregate; the entries are removed
    /// regardless.
    pub fn prune(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let ManagerState {
            backend,
            gpu_buffers,
        } = &mut *state;

        let mut orphans = Vec::new();
        gpu_buffers.retain(|id, gpu_buf| {
            if gpu_buf.source.is_alive() {
                return true;
            }
            orphans.push((*id, gpu_buf.handle.clone()));
            false
        });

        if orphans.is_empty() {
            return Ok(0);
        }
        log::debug!(
            "[{}] Pruning {} buffer(s) with no CPU owner",
            self.settings.label,
            orphans.len()
        );

        let pruned = orphans.len();
        let mut failures = Vec::new();
        for (id, handle) in orphans {
            if let Err(err) = release_handle(backend, self.context, handle) {
                log::error!("[{}] Failed to release buffer {}: {}", self.settings.label, id, err);
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(pruned)
        } else {
            Err(BufferError::ContextDisposeFailed {
                context: self.context,
                failures,
            })
        }
    }

    /// Drops every tracked buffer from this context.
    ///
    /// With `context_lost` set the device handles are considered already
    /// invalid and are not released. Failures are logged and returned in
    /// aggregate after every buffer has been processed.
    pub fn dispose_all(&self, context_lost: bool) -> Result<()> {
        let tracked: Vec<(BufferId, WeakBufferRef)> = self
            .state
            .lock()
            .gpu_buffers
            .iter()
            .map(|(id, b)| (*id, b.source.clone()))
            .collect();

        log::debug!(
            "[{}] Disposing {} buffer(s) (context_lost: {})",
            self.settings.label,
            tracked.len(),
            context_lost
        );

        let mut failures = Vec::new();
        for (id, source) in tracked {
            let outcome = match source.upgrade() {
                Some(buffer) => on_dispose(&self.state, self.context, &buffer, context_lost),
                // The CPU buffer is gone, only the device side is left.
                None => release_orphan(&self.state, self.context, id, context_lost),
            };
            if let Err(err) = outcome {
                log::error!("[{}] Failed to release buffer {}: {}", self.settings.label, id, err);
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BufferError::ContextDisposeFailed {
                context: self.context,
                failures,
            })
        }
    }
}

impl<B: DeviceBackend> Drop for ContextBufferManager<B> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose_all(true) {
            log::warn!("[{}] Errors while dropping buffer manager: {}", self.settings.label, err);
        }
    }
}

impl<B: DeviceBackend> fmt::Debug for ContextBufferManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextBufferManager")
            .field("context", &self.context)
            .field("label", &self.settings.label)
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

fn dispose_listener<B: DeviceBackend>(
    state: Weak<Mutex<ManagerState<B>>>,
    context: ContextId,
) -> impl Fn(&DataBuffer, bool) -> Result<()> + Send + Sync + 'static {
    move |buffer: &DataBuffer, context_lost: bool| match state.upgrade() {
        Some(state) => on_dispose(&state, context, buffer, context_lost),
        None => Ok(()),
    }
}

/// Unlinks `buffer` from this context and frees its device copy.
fn on_dispose<B: DeviceBackend>(
    state: &Mutex<ManagerState<B>>,
    context: ContextId,
    buffer: &DataBuffer,
    context_lost: bool,
) -> Result<()> {
    let mut state = state.lock();
    let Some(gpu_buf) = state.gpu_buffers.remove(&buffer.id()) else {
        return Ok(());
    };

    buffer.context_resources().remove(context);
    buffer.unsubscribe(gpu_buf.subscription);

    if context_lost {
        return Ok(());
    }

    log::debug!("Releasing device buffer for {} on {}", buffer.id(), context);
    release_handle(&mut state.backend, context, gpu_buf.handle)
}

fn release_orphan<B: DeviceBackend>(
    state: &Mutex<ManagerState<B>>,
    context: ContextId,
    id: BufferId,
    context_lost: bool,
) -> Result<()> {
    let mut state = state.lock();
    let Some(gpu_buf) = state.gpu_buffers.remove(&id) else {
        return Ok(());
    };
    if context_lost {
        return Ok(());
    }
    release_handle(&mut state.backend, context, gpu_buf.handle)
}

fn release_handle<B: DeviceBackend>(
    backend: &mut B,
    context: ContextId,
    handle: B::Handle,
) -> Result<()> {
    backend
        .release_buffer(handle)
        .map_err(|e| BufferError::backend(context, e.to_string()))
}
