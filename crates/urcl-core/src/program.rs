//! Programs.
//!
//! A [`Program`] is owned by exactly one context and retains it for as long as
//! the program lives.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::context::Context;
use crate::device::Device;
use crate::error::{Result, UrError};
use crate::handle::{release_all, HandleHeader, NativeProperties, ResourceHandle, TeardownStatus};
use crate::info::{self, InfoWriter};
use crate::native::{NativeContext, NativeDevice, NativeProgram, ProgramParam};

/// Program info keys.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramInfo {
    /// Native reference count (`u32`).
    ReferenceCount = 0,
    /// Owning context.
    Context = 1,
    /// Number of devices (`u32`).
    NumDevices = 2,
    /// Native device handles.
    Devices = 3,
    /// Source text, nul terminated.
    Source = 4,
}

impl TryFrom<u32> for ProgramInfo {
    type Error = UrError;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => Self::ReferenceCount,
            1 => Self::Context,
            2 => Self::NumDevices,
            3 => Self::Devices,
            4 => Self::Source,
            _ => return Err(UrError::InvalidEnumeration),
        })
    }
}

/// Handle to a program.
#[derive(Clone)]
pub struct Program(Arc<ProgramObject>);

struct ProgramObject {
    header: HandleHeader<NativeProgram>,
    context: Context,
}

impl Program {
    fn from_parts(native: NativeProgram, context: Context, owns_native: bool) -> Self {
        Self(Arc::new(ProgramObject {
            header: HandleHeader::new(native, owns_native),
            context,
        }))
    }

    /// Create a program from source text.
    pub fn create_with_source(context: &Context, source: &str) -> Result<Self> {
        let native = context
            .adapter()
            .native()
            .create_program_with_source(context.native_handle(), source)?;
        Self::link_created(context, native)
    }

    /// Create a program from intermediate language bytes.
    pub fn create_with_il(context: &Context, il: &[u8]) -> Result<Self> {
        let native = context
            .adapter()
            .native()
            .create_program_with_il(context.native_handle(), il)?;
        Self::link_created(context, native)
    }

    fn link_created(context: &Context, native: NativeProgram) -> Result<Self> {
        if let Err(err) = context.retain() {
            if let Err(status) = context.adapter().native().release_program(native) {
                warn!(native = ?native, status = %status, "release of unused program failed");
            }
            return Err(err);
        }
        debug!(native = ?native, context = ?context.native_handle(), "program created");
        Ok(Self::from_parts(native, context.clone(), true))
    }

    /// Adopt a native program.
    ///
    /// A supplied `context` must be the program's native context, else
    /// [`UrError::InvalidContext`]. Without one, the native context is adopted
    /// as well.
    pub fn create_with_native(
        adapter: &Adapter,
        native: NativeProgram,
        context: Option<&Context>,
        properties: &NativeProperties,
    ) -> Result<Self> {
        let api = adapter.native();
        let reported: NativeContext =
            info::query_value(|value| api.get_program_info(native, ProgramParam::Context, value))?;
        let context = Context::link_or_adopt(adapter, context, reported)?;

        let intent = properties.resolve(adapter.config().default_ownership);
        if intent.retains_on_adopt() {
            if let Err(status) = api.retain_program(native) {
                release_all(std::slice::from_ref(&context));
                return Err(status.into());
            }
        }

        debug!(native = ?native, ?intent, "program adopted");
        Ok(Self::from_parts(native, context, intent.owns_native()))
    }

    /// Owning context.
    pub fn context(&self) -> &Context {
        &self.0.context
    }

    /// Devices the program is built for.
    pub fn devices(&self) -> &[Device] {
        self.0.context.devices()
    }

    /// Raw info query.
    pub fn get_info(&self, prop: ProgramInfo, value: Option<&mut [u8]>) -> Result<usize> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        match prop {
            ProgramInfo::Context => InfoWriter::new(value).value(self.0.context.native_handle()),
            ProgramInfo::NumDevices => InfoWriter::new(value).value(self.0.context.device_count()),
            ProgramInfo::Devices => {
                let natives: Vec<NativeDevice> = self.devices().iter().map(Device::native_handle).collect();
                InfoWriter::new(value).slice(&natives)
            }
            ProgramInfo::ReferenceCount => info::forward_exact(value, |value| {
                api.get_program_info(native, ProgramParam::ReferenceCount, value)
            }),
            ProgramInfo::Source => info::forward_exact(value, |value| {
                api.get_program_info(native, ProgramParam::Source, value)
            }),
        }
    }

    /// Source text reported by the native API.
    pub fn source(&self) -> Result<String> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        info::query_string(|value| api.get_program_info(native, ProgramParam::Source, value))
    }

    /// Native reference count.
    pub fn native_reference_count(&self) -> Result<u32> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        info::query_value(|value| api.get_program_info(native, ProgramParam::ReferenceCount, value))
    }

    /// Whether two handles refer to the same program wrapper.
    pub fn ptr_eq(&self, other: &Program) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn teardown(&self) -> Result<()> {
        let mut status = TeardownStatus::default();
        if self.0.header.owns_native() {
            let native = self.native_handle();
            status.record(
                "release native program",
                self.0
                    .context
                    .adapter()
                    .native()
                    .release_program(native)
                    .map_err(UrError::from),
            );
        }
        status.record("release context", self.0.context.release());
        status.finish()
    }
}

impl ResourceHandle for Program {
    type Native = NativeProgram;

    const KIND: &'static str = "program";

    fn native_handle(&self) -> NativeProgram {
        self.0.header.native()
    }

    fn ref_count(&self) -> u32 {
        self.0.header.ref_count()
    }

    fn owns_native(&self) -> bool {
        self.0.header.owns_native()
    }

    fn retain(&self) -> Result<u32> {
        self.0.header.retain(Self::KIND)
    }

    fn release(&self) -> Result<u32> {
        self.0.header.release(Self::KIND, || self.teardown())
    }
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Program {}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("header", &self.0.header)
            .field("context", &self.0.context.native_handle())
            .finish()
    }
}
