//! Per-context resource slots hosted by a buffer.
//!
//! A buffer may be uploaded by several independent device contexts (one per
//! surface, renderer, ...). Each context keeps its own device handle for the
//! same logical buffer under its [`ContextId`]. The buffer only hosts the map;
//! entries are written and removed by the context that owns them.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Identifier of a device-binding context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

type OpaqueHandle = Arc<dyn Any + Send + Sync>;

/// Context id → opaque handle map.
#[derive(Default)]
pub struct ContextResources {
    entries: RwLock<FxHashMap<ContextId, OpaqueHandle>>,
}

impl ContextResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handle` for `context`, returning `true` if it replaced an entry.
    pub fn insert<T: Any + Send + Sync>(&self, context: ContextId, handle: T) -> bool {
        self.entries
            .write()
            .insert(context, Arc::new(handle))
            .is_some()
    }

    /// Returns the handle for `context` if present and of type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, context: ContextId) -> Option<Arc<T>> {
        let entry = self.entries.read().get(&context).cloned()?;
        entry.downcast::<T>().ok()
    }

    /// Removes the entry for `context`. Missing entries are a no-op.
    pub fn remove(&self, context: ContextId) -> bool {
        self.entries.write().remove(&context).is_some()
    }

    #[must_use]
    pub fn contains(&self, context: ContextId) -> bool {
        self.entries.read().contains_key(&context)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for ContextResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut contexts: Vec<ContextId> = self.entries.read().keys().copied().collect();
        contexts.sort();
        f.debug_struct("ContextResources")
            .field("contexts", &contexts)
            .finish()
    }
}
