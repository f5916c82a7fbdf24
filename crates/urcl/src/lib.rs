//! # urcl
//!
//! Unified runtime adapter over OpenCL-style native compute handles.
//!
//! urcl wraps native platforms, devices, contexts, programs, kernels and
//! command queues in reference-counted handles with explicit ownership rules,
//! and can adopt native handles created elsewhere.
//!
//! ## Features
//!
//! - **Reference-counted wrappers** with parent/child release cascades
//! - **Native handle adoption** with share, transfer and borrow ownership
//! - **Context destructor callbacks** registered once per deleter
//! - **Simulated native API** for tests and driverless hosts (`sim` feature)
//!
//! ## Quick Start
//!
//! ```ignore
//! use urcl::prelude::*;
//!
//! fn main() -> Result<()> {
//!     urcl::logging::init_from_env();
//!
//!     let adapter = Urcl::builder().build()?;
//!     let platform = &adapter.platforms()?[0];
//!     let devices = platform.devices(DeviceType::ALL)?;
//!
//!     let context = Context::create(&adapter, &devices)?;
//!     let queue = Queue::create(&context, &devices[0], QueueProperties::NONE)?;
//!
//!     queue.release()?;
//!     context.release()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Ownership
//!
//! ```text
//!   Kernel ──► Program ──► Context ──► Device(s) ──► Platform
//!     │                       ▲
//!     └───────────────────────┘        Queue ──► Context, Device
//! ```
//!
//! Every arrow is a counted reference taken when the child is created and
//! released when the child's count reaches zero.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(hidden_glob_reexports)]

use std::sync::Arc;

// Re-export core types
pub use urcl_core::*;

// Re-export the simulated backend
#[cfg(feature = "sim")]
pub use urcl_sim::{Call, SimNative, SimNativeBuilder};

pub mod logging;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{Urcl, UrclBuilder};
    pub use urcl_core::prelude::*;

    #[cfg(feature = "sim")]
    pub use urcl_sim::{Call, SimNative};
}

/// Entry point for building adapters.
pub struct Urcl;

impl Urcl {
    /// Start building an adapter.
    pub fn builder() -> UrclBuilder {
        UrclBuilder::new()
    }
}

/// Builder for an [`Adapter`].
#[derive(Default)]
pub struct UrclBuilder {
    native: Option<Arc<dyn NativeApi>>,
    config: Option<AdapterConfig>,
}

impl UrclBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `native` as the native API.
    pub fn native(mut self, native: Arc<dyn NativeApi>) -> Self {
        self.native = Some(native);
        self
    }

    /// Use `config` instead of the environment.
    pub fn config(mut self, config: AdapterConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the adapter.
    ///
    /// Without an explicit configuration the `URCL_*` environment variables
    /// apply. Without a native API the simulated one is used when the `sim`
    /// feature is enabled.
    pub fn build(self) -> Result<Adapter> {
        let config = match self.config {
            Some(config) => config,
            None => AdapterConfig::from_env()?,
        };
        let native = match self.native {
            Some(native) => native,
            None => Self::fallback_native()?,
        };
        Adapter::new(native, config)
    }

    #[cfg(feature = "sim")]
    fn fallback_native() -> Result<Arc<dyn NativeApi>> {
        tracing::info!("no native API supplied, using the simulated runtime");
        let native: Arc<dyn NativeApi> = SimNative::with_devices(1);
        Ok(native)
    }

    #[cfg(not(feature = "sim"))]
    fn fallback_native() -> Result<Arc<dyn NativeApi>> {
        Err(UrError::Unsupported("no native API supplied".to_string()))
    }
}
