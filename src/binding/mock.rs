//! Mock device backend (no GPU required).
//!
//! Hands out integer handles and records every call, so buffer managers can
//! be tested without a graphics device. Individual operations can be told to
//! fail.

use std::fmt;

use rustc_hash::FxHashMap;

use super::{DeviceBackend, UploadDesc};

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Create { handle: u64, label: String, size: usize },
    Write { handle: u64, size: usize },
    Release(u64),
}

#[derive(Default)]
pub struct MockBackend {
    next_handle: u64,
    live: FxHashMap<u64, Vec<u8>>,
    calls: Vec<MockCall>,
    pub fail_create: bool,
    pub fail_write: bool,
    pub fail_release: bool,
    /// Runs inside every successful `create_buffer`, after allocation.
    pub on_create: Option<Box<dyn FnMut() + Send>>,
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend")
            .field("live", &self.live.len())
            .field("calls", &self.calls.len())
            .field("fail_create", &self.fail_create)
            .field("fail_write", &self.fail_write)
            .field("fail_release", &self.fail_release)
            .field("on_create", &self.on_create.is_some())
            .finish()
    }
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> &[MockCall] {
        &self.calls
    }

    /// Number of device buffers allocated and not yet released.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Current device-side contents of `handle`.
    #[must_use]
    pub fn contents(&self, handle: u64) -> Option<&[u8]> {
        self.live.get(&handle).map(Vec::as_slice)
    }

    #[must_use]
    pub fn release_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, MockCall::Release(_)))
            .count()
    }
}

impl DeviceBackend for MockBackend {
    type Handle = u64;
    type Error = String;

    fn create_buffer(&mut self, desc: &UploadDesc<'_>) -> Result<u64, String> {
        if self.fail_create {
            return Err(format!("create of {:?} rejected", desc.label));
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle, desc.bytes.to_vec());
        self.calls.push(MockCall::Create {
            handle,
            label: desc.label.to_string(),
            size: desc.bytes.len(),
        });
        if let Some(hook) = self.on_create.as_mut() {
            hook();
        }
        Ok(handle)
    }

    fn write_buffer(&mut self, handle: &u64, bytes: &[u8]) -> Result<(), String> {
        if self.fail_write {
            return Err(format!("write to {handle} rejected"));
        }
        let Some(contents) = self.live.get_mut(handle) else {
            return Err(format!("write to released handle {handle}"));
        };
        contents[..bytes.len()].copy_from_slice(bytes);
        self.calls.push(MockCall::Write {
            handle: *handle,
            size: bytes.len(),
        });
        Ok(())
    }

    fn release_buffer(&mut self, handle: u64) -> Result<(), String> {
        self.calls.push(MockCall::Release(handle));
        if self.fail_release {
            return Err(format!("release of {handle} rejected"));
        }
        self.live
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| format!("double release of {handle}"))
    }
}
