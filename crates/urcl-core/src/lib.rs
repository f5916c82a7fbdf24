//! # urcl Core
//!
//! Handle ownership, adoption and reference counting for an OpenCL-style
//! compute adapter.
//!
//! Every adapter object wraps a native handle and adds its own reference
//! count and ownership rules on top of the native one.
//!
//! ## Core Abstractions
//!
//! - [`NativeApi`] - Native primitives the adapter consumes
//! - [`Adapter`] - Owner of the native API, platform cache and callback registry
//! - [`Context`], [`Program`], [`Kernel`], [`Queue`] - Reference-counted wrappers
//! - [`ResourceHandle`] - The retain/release contract shared by all wrappers
//! - [`CallbackRegistry`] - Deduplicated context destructor callbacks
//!
//! ## Example
//!
//! ```ignore
//! use urcl_core::prelude::*;
//!
//! let adapter = Adapter::with_defaults(native)?;
//! let platform = &adapter.platforms()?[0];
//! let devices = platform.devices(DeviceType::ALL)?;
//!
//! let context = Context::create(&adapter, &devices)?;
//! let program = Program::create_with_source(&context, source)?;
//! let kernel = Kernel::create(&program, "add")?;
//!
//! kernel.release()?;
//! program.release()?;
//! context.release()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod callback;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod handle;
pub mod info;
pub mod kernel;
pub mod native;
pub mod platform;
pub mod program;
pub mod queue;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{platform_get, Adapter, PlatformEnumeration};
    pub use crate::callback::{CallbackRegistry, ExtendedDeleter, UserData};
    pub use crate::config::{AdapterConfig, AdapterConfigBuilder, PlatformDiscovery};
    pub use crate::context::{Context, ContextInfo};
    pub use crate::device::Device;
    pub use crate::error::*;
    pub use crate::handle::{NativeProperties, OwnershipIntent, ResourceHandle};
    pub use crate::kernel::{Kernel, KernelInfo};
    pub use crate::native::*;
    pub use crate::platform::{ApiVersion, Platform, PlatformBackend, PlatformInfo};
    pub use crate::program::{Program, ProgramInfo};
    pub use crate::queue::{Queue, QueueInfo};
}

// Re-exports for convenience
pub use adapter::{platform_get, Adapter};
pub use callback::{CallbackRegistry, ExtendedDeleter, UserData};
pub use config::AdapterConfig;
pub use context::Context;
pub use device::Device;
pub use error::{Result, UrError};
pub use handle::{NativeProperties, OwnershipIntent, ResourceHandle};
pub use kernel::Kernel;
pub use native::{ClStatus, NativeApi};
pub use platform::Platform;
pub use program::Program;
pub use queue::Queue;
