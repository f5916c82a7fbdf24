//! Adapter: process-level owner of the native API and adapter-global state.
//!
//! An [`Adapter`] owns the native API, the platform cache, the destructor
//! callback registry and the configuration. Every wrapper keeps the adapter it
//! was created through alive, so the registry outlives the contexts it tracks.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::callback::CallbackRegistry;
use crate::config::{AdapterConfig, PlatformDiscovery};
use crate::device::Device;
use crate::error::{Result, UrError};
use crate::handle::RefCount;
use crate::native::{NativeApi, NativeDevice};
use crate::platform::{Platform, PlatformCache};

/// Handle to an adapter instance. Clones share the same adapter.
#[derive(Clone)]
pub struct Adapter(Arc<AdapterInner>);

struct AdapterInner {
    native: Arc<dyn NativeApi>,
    config: AdapterConfig,
    platforms: PlatformCache,
    callbacks: Arc<CallbackRegistry>,
    count: RefCount,
}

impl Adapter {
    /// Create an adapter over `native`.
    pub fn new(native: Arc<dyn NativeApi>, config: AdapterConfig) -> Result<Self> {
        let adapter = Self(Arc::new(AdapterInner {
            native,
            platforms: PlatformCache::new(),
            callbacks: CallbackRegistry::new(),
            count: RefCount::new(),
            config,
        }));

        info!(adapter = %adapter.0.config.name, "adapter initialised");

        if adapter.0.config.platform_discovery == PlatformDiscovery::Eager {
            let platforms = adapter.platforms()?;
            debug!(adapter = %adapter.0.config.name, count = platforms.len(), "eager platform discovery");
        }

        Ok(adapter)
    }

    /// Create an adapter with the default configuration.
    pub fn with_defaults(native: Arc<dyn NativeApi>) -> Result<Self> {
        Self::new(native, AdapterConfig::default())
    }

    /// The native API.
    pub fn native(&self) -> &Arc<dyn NativeApi> {
        &self.0.native
    }

    /// The adapter configuration.
    pub fn config(&self) -> &AdapterConfig {
        &self.0.config
    }

    /// The destructor callback registry.
    pub fn callbacks(&self) -> &Arc<CallbackRegistry> {
        &self.0.callbacks
    }

    /// Platforms of this adapter, discovered on first use.
    ///
    /// A native "no platforms installed" condition yields an empty list.
    pub fn platforms(&self) -> Result<Vec<Platform>> {
        self.0.platforms.get_or_discover(&self.0.native)
    }

    /// Look a device up across this adapter's platforms without retaining it.
    pub fn find_device(&self, native: NativeDevice) -> Result<Option<Device>> {
        for platform in self.platforms()? {
            if let Some(device) = platform.find_device(native)? {
                return Ok(Some(device));
            }
        }
        Ok(None)
    }

    /// Increment the adapter reference count.
    pub fn retain(&self) -> Result<u32> {
        self.0
            .count
            .increment()
            .ok_or_else(|| UrError::invalid_state("adapter retained after release"))
    }

    /// Decrement the adapter reference count; at 0 the adapter is torn down.
    pub fn release(&self) -> Result<u32> {
        match self.0.count.decrement() {
            Some(0) => {
                self.teardown();
                Ok(0)
            }
            Some(count) => Ok(count),
            None => Err(UrError::invalid_state("adapter released after release")),
        }
    }

    /// Current adapter reference count.
    pub fn ref_count(&self) -> u32 {
        self.0.count.get()
    }

    /// Drain adapter-scoped state. Returns the number of deleters dropped.
    ///
    /// Deleters still pending are discarded; native destructor callbacks that
    /// fire afterwards find nothing to run.
    pub fn teardown(&self) -> usize {
        let dropped = self.0.callbacks.drain();
        if dropped > 0 && self.0.config.warn_on_pending_deleters {
            warn!(adapter = %self.0.config.name, dropped, "pending context deleters dropped at teardown");
        }
        info!(adapter = %self.0.config.name, "adapter torn down");
        dropped
    }

    /// Whether two handles refer to the same adapter.
    pub fn ptr_eq(&self, other: &Adapter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("name", &self.0.config.name)
            .field("count", &self.0.count.get())
            .finish()
    }
}

/// Result of enumerating platforms across adapters.
#[derive(Debug, Clone, Default)]
pub struct PlatformEnumeration {
    /// At most the requested number of platforms, in adapter order.
    pub platforms: Vec<Platform>,
    /// Total number of platforms across all adapters.
    pub total: usize,
}

/// Enumerate platforms across `adapters`, returning at most `num_entries`.
pub fn platform_get(adapters: &[Adapter], num_entries: usize) -> Result<PlatformEnumeration> {
    let mut enumeration = PlatformEnumeration::default();
    for adapter in adapters {
        let platforms = adapter.platforms()?;
        enumeration.total += platforms.len();
        for platform in platforms {
            if enumeration.platforms.len() < num_entries {
                enumeration.platforms.push(platform);
            }
        }
    }
    Ok(enumeration)
}
