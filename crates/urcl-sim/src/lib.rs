//! # urcl Sim
//!
//! In-process simulation of the native compute API.
//!
//! [`SimNative`] implements [`urcl_core::NativeApi`] with native reference
//! counts, parent references and destructor callbacks held in memory. It
//! records every call per handle and can inject failures, which makes it the
//! backend used by the adapter's tests and benchmarks.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod builder;
mod runtime;

pub use builder::SimNativeBuilder;
pub use runtime::{Call, SimNative};
