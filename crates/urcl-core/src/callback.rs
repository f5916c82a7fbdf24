//! Context destructor callback registry.
//!
//! Extended deleters registered on a context run once, after the native
//! context is destroyed. The registry deduplicates `(context, deleter)` pairs
//! so registering the same deleter twice installs one native callback, and it
//! forgets each pair once the deleter has run.
//!
//! The registry is adapter-scoped: native trampolines hold a weak reference to
//! it and a slot number, so a firing that arrives after adapter teardown finds
//! nothing to run.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::context::Context;
use crate::error::{Result, UrError};
use crate::handle::ResourceHandle;
use crate::native::NativeContextCallback;

/// Opaque value handed back to an [`ExtendedDeleter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct UserData(pub usize);

/// Function run after a context's native handle is destroyed.
pub type ExtendedDeleter = fn(UserData);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ContextKey(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DeleterKey(usize);

impl DeleterKey {
    fn of(deleter: ExtendedDeleter) -> Self {
        Self(deleter as usize)
    }
}

struct PendingCallback {
    context: ContextKey,
    deleter: ExtendedDeleter,
    user_data: UserData,
}

#[derive(Default)]
struct RegistryState {
    table: HashMap<ContextKey, HashSet<DeleterKey>>,
    slots: HashMap<u64, PendingCallback>,
    next_slot: u64,
    drained: bool,
}

impl RegistryState {
    fn contains(&self, context: ContextKey, deleter: DeleterKey) -> bool {
        self.table
            .get(&context)
            .is_some_and(|deleters| deleters.contains(&deleter))
    }

    fn forget(&mut self, context: ContextKey, deleter: DeleterKey) {
        if let Some(deleters) = self.table.get_mut(&context) {
            deleters.remove(&deleter);
            if deleters.is_empty() {
                self.table.remove(&context);
            }
        }
    }
}

/// Adapter-scoped table of registered context deleters.
pub struct CallbackRegistry {
    state: Mutex<RegistryState>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState::default()),
        })
    }

    /// Register `deleter` on `context`.
    ///
    /// A pair already registered is a successful no-op. If the native
    /// registration fails the new entry is removed again.
    pub fn register(
        self: &Arc<Self>,
        context: &Context,
        deleter: ExtendedDeleter,
        user_data: UserData,
    ) -> Result<()> {
        let key = ContextKey(context.id());
        let deleter_key = DeleterKey::of(deleter);

        let slot = {
            let mut state = self.state.lock();
            if state.drained {
                return Err(UrError::invalid_state("callback registry already drained"));
            }
            if state.contains(key, deleter_key) {
                debug!(context = ?context.native_handle(), "deleter already registered");
                return Ok(());
            }
            state.table.entry(key).or_default().insert(deleter_key);
            let slot = state.next_slot;
            state.next_slot += 1;
            state.slots.insert(
                slot,
                PendingCallback {
                    context: key,
                    deleter,
                    user_data,
                },
            );
            slot
        };

        let registry = Arc::downgrade(self);
        let trampoline: NativeContextCallback = Box::new(move |native| {
            trace!(context = ?native, slot, "native context destroyed");
            if let Some(registry) = registry.upgrade() {
                registry.fire(slot);
            }
        });

        let api = context.adapter().native();
        if let Err(status) = api.set_context_destructor_callback(context.native_handle(), trampoline) {
            let mut state = self.state.lock();
            state.slots.remove(&slot);
            state.forget(key, deleter_key);
            return Err(status.into());
        }

        debug!(context = ?context.native_handle(), slot, "deleter registered");
        Ok(())
    }

    fn fire(&self, slot: u64) {
        let pending = {
            let mut state = self.state.lock();
            if state.drained {
                return;
            }
            state.slots.remove(&slot)
        };
        let Some(pending) = pending else {
            return;
        };

        // Runs unlocked; the deleter may call back into the adapter.
        (pending.deleter)(pending.user_data);

        self.state
            .lock()
            .forget(pending.context, DeleterKey::of(pending.deleter));
    }

    /// Whether `deleter` is registered on `context` and has not yet run.
    pub fn is_registered(&self, context: &Context, deleter: ExtendedDeleter) -> bool {
        self.state
            .lock()
            .contains(ContextKey(context.id()), DeleterKey::of(deleter))
    }

    /// Whether `context` has any deleter that has not yet run.
    pub fn contains_context(&self, context: &Context) -> bool {
        self.state.lock().table.contains_key(&ContextKey(context.id()))
    }

    /// Number of contexts with pending deleters.
    pub fn context_count(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Number of deleters waiting for their context to be destroyed.
    pub fn pending_callbacks(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Drop every pending deleter without running it. Returns how many were
    /// dropped. Later native firings and registrations are ignored.
    pub fn drain(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.slots.len();
        state.slots.clear();
        state.table.clear();
        state.drained = true;
        dropped
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CallbackRegistry")
            .field("contexts", &state.table.len())
            .field("pending", &state.slots.len())
            .field("drained", &state.drained)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forget_removes_empty_context() {
        let mut state = RegistryState::default();
        let context = ContextKey(1);
        state.table.entry(context).or_default().insert(DeleterKey(10));
        state.table.entry(context).or_default().insert(DeleterKey(20));

        state.forget(context, DeleterKey(10));
        assert!(state.contains(context, DeleterKey(20)));

        state.forget(context, DeleterKey(20));
        assert!(!state.table.contains_key(&context));
    }

    #[test]
    fn test_fire_unknown_slot_is_noop() {
        let registry = CallbackRegistry::new();
        registry.fire(42);
        assert_eq!(registry.pending_callbacks(), 0);
    }

    #[test]
    fn test_drain_is_sticky() {
        let registry = CallbackRegistry::new();
        assert_eq!(registry.drain(), 0);
        assert!(registry.state.lock().drained);
        registry.fire(0);
        assert_eq!(registry.context_count(), 0);
    }
}
