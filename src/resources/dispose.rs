//! Disposal broadcast.
//!
//! Each [`DataBuffer`] owns a [`DisposeRunner`]: an ordered list of
//! listeners, usually one per device context that allocated something for the
//! buffer. [`DisposeRunner::emit`] calls every listener synchronously, in
//! registration order, with `(buffer, context_lost)`.
//!
//! A failing listener never stops the broadcast. Errors and panics are caught
//! per listener, logged, and collected into a [`DisposeReport`].

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::errors::{BufferError, Result};

use super::DataBuffer;
use super::id::BufferId;

/// Callback invoked on disposal. The flag is `true` when the owning context
/// is already gone and the device handle must not be released.
pub type DisposeListener = Arc<dyn Fn(&DataBuffer, bool) -> Result<()> + Send + Sync>;

/// Registration token returned by [`DisposeRunner::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisposeReport {
    /// Number of listeners that were invoked.
    pub notified: usize,
    /// Listeners that returned an error or panicked, in notification order.
    pub failures: Vec<(SubscriberId, BufferError)>,
}

impl DisposeReport {
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds the failures into a single [`BufferError::DisposeFailed`].
    pub fn into_result(self, id: BufferId) -> Result<usize> {
        if self.failures.is_empty() {
            Ok(self.notified)
        } else {
            Err(BufferError::DisposeFailed {
                id,
                failures: self.failures.into_iter().map(|(_, e)| e).collect(),
            })
        }
    }
}

/// Ordered listener list with failure-isolated fan-out.
#[derive(Default)]
pub struct DisposeRunner {
    listeners: Mutex<SmallVec<[(SubscriberId, DisposeListener); 4]>>,
    next_subscriber: AtomicU64,
}

impl DisposeRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. Listeners are notified in registration order.
    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&DataBuffer, bool) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_arc(Arc::new(listener))
    }

    pub fn subscribe_arc(&self, listener: DisposeListener) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut listeners = self.listeners.lock();
        match listeners.iter().position(|(sid, _)| *sid == id) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    /// Notifies every listener registered at the time of the call.
    ///
    /// The list is snapshotted first, so listeners may (un)subscribe from
    /// inside the callback without deadlocking.
    pub fn emit(&self, buffer: &DataBuffer, context_lost: bool) -> DisposeReport {
        let snapshot: SmallVec<[(SubscriberId, DisposeListener); 4]> =
            self.listeners.lock().iter().cloned().collect();

        log::trace!(
            "Broadcasting dispose of buffer {} to {} listener(s) (context_lost: {})",
            buffer.id(),
            snapshot.len(),
            context_lost
        );

        let mut report = DisposeReport {
            notified: 0,
            failures: Vec::new(),
        };

        for (sid, listener) in snapshot {
            report.notified += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(buffer, context_lost)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(payload) => BufferError::ListenerPanicked {
                    subscriber: sid,
                    message: panic_message(payload.as_ref()),
                },
            };
            log::warn!("Dispose listener {} for buffer {} failed: {}", sid, buffer.id(), failure);
            report.failures.push((sid, failure));
        }

        report
    }
}

impl fmt::Debug for DisposeRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeRunner")
            .field("listeners", &self.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
