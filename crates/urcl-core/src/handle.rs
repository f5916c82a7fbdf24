//! Shared retain/release contract for resource handles.
//!
//! Every wrapper (context, program, kernel, queue) carries a [`HandleHeader`]:
//! the native handle, whether the wrapper owns the native release obligation,
//! and an atomic reference count. The count starts at 1, never resurrects
//! after reaching 0, and exactly one caller observes the 1 → 0 transition and
//! runs teardown.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, UrError};

/// Atomic wrapper reference count.
#[derive(Debug)]
pub struct RefCount(AtomicU32);

impl RefCount {
    /// A fresh count of 1.
    pub fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    /// Current value.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Increment; `None` when the count is 0 (no resurrection) or would wrap.
    pub fn increment(&self) -> Option<u32> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count == 0 {
                    None
                } else {
                    count.checked_add(1)
                }
            })
            .ok()
            .map(|prev| prev + 1)
    }

    /// Decrement; `None` when the count is already 0.
    pub fn decrement(&self) -> Option<u32> {
        self.decrement_above(0)
    }

    /// Decrement unless the count is at or below `floor`.
    pub fn decrement_above(&self, floor: u32) -> Option<u32> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                if count <= floor {
                    None
                } else {
                    Some(count - 1)
                }
            })
            .ok()
            .map(|prev| prev - 1)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

/// How an adopted native handle's release obligation is negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OwnershipIntent {
    /// Retain the native handle once more; the wrapper releases that reference.
    #[default]
    Share,
    /// The caller hands its native reference to the wrapper.
    Transfer,
    /// The native lifetime is managed externally; the wrapper never releases it.
    Borrow,
}

impl OwnershipIntent {
    /// Whether a wrapper built with this intent releases the native handle.
    pub fn owns_native(self) -> bool {
        !matches!(self, Self::Borrow)
    }

    /// Whether adoption must retain the native handle before wrapping it.
    pub fn retains_on_adopt(self) -> bool {
        matches!(self, Self::Share)
    }

    /// Parse from a configuration string.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "share" => Ok(Self::Share),
            "transfer" => Ok(Self::Transfer),
            "borrow" => Ok(Self::Borrow),
            _ => Err(UrError::InvalidValue),
        }
    }
}

/// Per-call properties for `create_with_native`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NativeProperties {
    /// Ownership intent; `None` uses the adapter default.
    pub intent: Option<OwnershipIntent>,
}

impl NativeProperties {
    /// Properties with an explicit intent.
    pub fn with_intent(intent: OwnershipIntent) -> Self {
        Self {
            intent: Some(intent),
        }
    }

    /// The wrapper takes over the caller's native reference.
    pub fn owned() -> Self {
        Self::with_intent(OwnershipIntent::Transfer)
    }

    /// The native lifetime stays with the caller.
    pub fn borrowed() -> Self {
        Self::with_intent(OwnershipIntent::Borrow)
    }

    pub(crate) fn resolve(&self, default: OwnershipIntent) -> OwnershipIntent {
        self.intent.unwrap_or(default)
    }
}

/// Native handle, ownership flag and reference count of one wrapper.
pub struct HandleHeader<N> {
    native: N,
    owns_native: bool,
    count: RefCount,
}

impl<N: Copy + fmt::Debug> HandleHeader<N> {
    /// Header for a freshly constructed wrapper (count 1).
    pub fn new(native: N, owns_native: bool) -> Self {
        Self {
            native,
            owns_native,
            count: RefCount::new(),
        }
    }

    /// Wrapped native handle.
    pub fn native(&self) -> N {
        self.native
    }

    /// Whether teardown releases the native handle.
    pub fn owns_native(&self) -> bool {
        self.owns_native
    }

    /// Current wrapper reference count.
    pub fn ref_count(&self) -> u32 {
        self.count.get()
    }

    /// Increment the wrapper count.
    pub fn retain(&self, kind: &'static str) -> Result<u32> {
        self.count.increment().ok_or_else(|| {
            tracing::warn!(kind, native = ?self.native, "retain on a released handle");
            UrError::invalid_state(format!("{} retained after release", kind))
        })
    }

    /// Decrement the wrapper count, running `teardown` on the 1 → 0 transition.
    pub fn release<F>(&self, kind: &'static str, teardown: F) -> Result<u32>
    where
        F: FnOnce() -> Result<()>,
    {
        match self.count.decrement() {
            Some(0) => {
                tracing::debug!(kind, native = ?self.native, owns_native = self.owns_native, "teardown");
                teardown()?;
                Ok(0)
            }
            Some(count) => Ok(count),
            None => {
                tracing::warn!(kind, native = ?self.native, "release on a released handle");
                Err(UrError::invalid_state(format!("{} released after release", kind)))
            }
        }
    }
}

impl<N: fmt::Debug> fmt::Debug for HandleHeader<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleHeader")
            .field("native", &self.native)
            .field("owns_native", &self.owns_native)
            .field("count", &self.count.0.load(Ordering::Relaxed))
            .finish()
    }
}

/// Collects the first failure of a teardown sequence while letting every step run.
#[derive(Debug, Default)]
pub(crate) struct TeardownStatus {
    first: Option<UrError>,
}

impl TeardownStatus {
    pub(crate) fn record<T>(&mut self, step: &'static str, result: Result<T>) {
        if let Err(err) = result {
            tracing::warn!(step, error = %err, "teardown step failed");
            self.first.get_or_insert(err);
        }
    }

    pub(crate) fn finish(self) -> Result<()> {
        match self.first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Uniform view of the retain/release contract across resource kinds.
pub trait ResourceHandle: Clone + Send + Sync {
    /// Native handle type.
    type Native: Copy + Eq + fmt::Debug;

    /// Kind name used in logs.
    const KIND: &'static str;

    /// Wrapped native handle; never transfers ownership.
    fn native_handle(&self) -> Self::Native;

    /// Current wrapper reference count.
    fn ref_count(&self) -> u32;

    /// Whether teardown releases the native handle.
    fn owns_native(&self) -> bool;

    /// Increment the wrapper count, returning the new value.
    fn retain(&self) -> Result<u32>;

    /// Decrement the wrapper count, tearing down at 0; returns the new value.
    fn release(&self) -> Result<u32>;
}

/// Release every handle in `handles`, logging failures. Used to unwind partial
/// adoption.
pub(crate) fn release_all<H: ResourceHandle>(handles: &[H]) {
    for handle in handles {
        if let Err(err) = handle.release() {
            tracing::warn!(kind = H::KIND, native = ?handle.native_handle(), error = %err, "release during unwind failed");
        }
    }
}
