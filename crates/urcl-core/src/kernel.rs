//! Kernels.
//!
//! A [`Kernel`] always holds its program and that program's context, both
//! retained. When a native kernel is adopted without its program, the program
//! is resolved before the kernel wrapper is built, so no kernel is ever
//! observable with an unknown program.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::context::Context;
use crate::error::{Result, UrError};
use crate::handle::{
    release_all, HandleHeader, NativeProperties, OwnershipIntent, ResourceHandle, TeardownStatus,
};
use crate::info::{self, InfoWriter};
use crate::native::{KernelParam, NativeContext, NativeKernel, NativeProgram};
use crate::program::Program;

/// Kernel info keys.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelInfo {
    /// Function name, nul terminated.
    FunctionName = 0,
    /// Number of arguments (`u32`).
    NumArgs = 1,
    /// Native reference count (`u32`).
    ReferenceCount = 2,
    /// Owning context.
    Context = 3,
    /// Owning program.
    Program = 4,
}

impl TryFrom<u32> for KernelInfo {
    type Error = UrError;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => Self::FunctionName,
            1 => Self::NumArgs,
            2 => Self::ReferenceCount,
            3 => Self::Context,
            4 => Self::Program,
            _ => return Err(UrError::InvalidEnumeration),
        })
    }
}

/// Program reference of a kernel under adoption.
enum ProgramLink {
    /// Only the native program is known.
    Unresolved(NativeProgram),
    /// A caller-supplied wrapper, already checked against the native program.
    Resolved(Program),
}

impl ProgramLink {
    /// Produce a program carrying one reference for the kernel.
    fn resolve(self, adapter: &Adapter, context: &Context) -> Result<Program> {
        match self {
            Self::Resolved(program) => {
                program.retain()?;
                Ok(program)
            }
            Self::Unresolved(native) => Program::create_with_native(
                adapter,
                native,
                Some(context),
                &NativeProperties::with_intent(OwnershipIntent::Share),
            ),
        }
    }
}

/// Handle to a kernel.
#[derive(Clone)]
pub struct Kernel(Arc<KernelObject>);

struct KernelObject {
    header: HandleHeader<NativeKernel>,
    program: Program,
    context: Context,
}

impl Kernel {
    fn from_parts(native: NativeKernel, program: Program, context: Context, owns_native: bool) -> Self {
        Self(Arc::new(KernelObject {
            header: HandleHeader::new(native, owns_native),
            program,
            context,
        }))
    }

    /// Create a kernel for the function `name` of `program`.
    pub fn create(program: &Program, name: &str) -> Result<Self> {
        let context = program.context();
        let api = context.adapter().native();
        let native = api.create_kernel(program.native_handle(), name)?;

        let linked = program.retain().and_then(|_| {
            context.retain().map_err(|err| {
                release_all(std::slice::from_ref(program));
                err
            })
        });
        if let Err(err) = linked {
            if let Err(status) = api.release_kernel(native) {
                warn!(native = ?native, status = %status, "release of unused kernel failed");
            }
            return Err(err);
        }

        debug!(native = ?native, name, "kernel created");
        Ok(Self::from_parts(native, program.clone(), context.clone(), true))
    }

    /// Adopt a native kernel.
    ///
    /// Supplied parents must match the kernel's native program and context
    /// ([`UrError::InvalidProgram`], [`UrError::InvalidContext`]). Missing
    /// parents are adopted. Every parent reference taken is released again if
    /// a later step fails.
    pub fn create_with_native(
        adapter: &Adapter,
        native: NativeKernel,
        program: Option<&Program>,
        context: Option<&Context>,
        properties: &NativeProperties,
    ) -> Result<Self> {
        let api = adapter.native();
        let reported_context: NativeContext =
            info::query_value(|value| api.get_kernel_info(native, KernelParam::Context, value))?;
        let reported_program: NativeProgram =
            info::query_value(|value| api.get_kernel_info(native, KernelParam::Program, value))?;

        if let Some(context) = context {
            if context.native_handle() != reported_context {
                return Err(UrError::InvalidContext);
            }
        }
        let link = match program {
            Some(program) if program.native_handle() != reported_program => {
                return Err(UrError::InvalidProgram);
            }
            Some(program) if program.context().native_handle() != reported_context => {
                return Err(UrError::InvalidContext);
            }
            Some(program) => ProgramLink::Resolved(program.clone()),
            None => ProgramLink::Unresolved(reported_program),
        };

        let context_hint = context.or_else(|| program.map(Program::context));
        let context = Context::link_or_adopt(adapter, context_hint, reported_context)?;

        let program = match link.resolve(adapter, &context) {
            Ok(program) => program,
            Err(err) => {
                release_all(std::slice::from_ref(&context));
                return Err(err);
            }
        };

        let intent = properties.resolve(adapter.config().default_ownership);
        if intent.retains_on_adopt() {
            if let Err(status) = api.retain_kernel(native) {
                release_all(std::slice::from_ref(&program));
                release_all(std::slice::from_ref(&context));
                return Err(status.into());
            }
        }

        debug!(native = ?native, ?intent, "kernel adopted");
        Ok(Self::from_parts(native, program, context, intent.owns_native()))
    }

    /// Owning program.
    pub fn program(&self) -> &Program {
        &self.0.program
    }

    /// Owning context.
    pub fn context(&self) -> &Context {
        &self.0.context
    }

    /// Raw info query.
    pub fn get_info(&self, prop: KernelInfo, value: Option<&mut [u8]>) -> Result<usize> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        let param = match prop {
            KernelInfo::Context => {
                return InfoWriter::new(value).value(self.0.context.native_handle());
            }
            KernelInfo::Program => {
                return InfoWriter::new(value).value(self.0.program.native_handle());
            }
            KernelInfo::ReferenceCount => KernelParam::ReferenceCount,
            KernelInfo::FunctionName => KernelParam::FunctionName,
            KernelInfo::NumArgs => KernelParam::NumArgs,
        };
        info::forward_exact(value, |value| api.get_kernel_info(native, param, value))
    }

    /// Function name.
    pub fn function_name(&self) -> Result<String> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        info::query_string(|value| api.get_kernel_info(native, KernelParam::FunctionName, value))
    }

    /// Number of kernel arguments.
    pub fn num_args(&self) -> Result<u32> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        info::query_value(|value| api.get_kernel_info(native, KernelParam::NumArgs, value))
    }

    /// Native reference count.
    pub fn native_reference_count(&self) -> Result<u32> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        info::query_value(|value| api.get_kernel_info(native, KernelParam::ReferenceCount, value))
    }

    /// Whether two handles refer to the same kernel wrapper.
    pub fn ptr_eq(&self, other: &Kernel) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn teardown(&self) -> Result<()> {
        let mut status = TeardownStatus::default();
        if self.0.header.owns_native() {
            let native = self.native_handle();
            status.record(
                "release native kernel",
                self.0
                    .context
                    .adapter()
                    .native()
                    .release_kernel(native)
                    .map_err(UrError::from),
            );
        }
        status.record("release program", self.0.program.release());
        status.record("release context", self.0.context.release());
        status.finish()
    }
}

impl ResourceHandle for Kernel {
    type Native = NativeKernel;

    const KIND: &'static str = "kernel";

    fn native_handle(&self) -> NativeKernel {
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

impl PartialEq for Kernel {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Kernel {}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("header", &self.0.header)
            .field("program", &self.0.program.native_handle())
            .field("context", &self.0.context.native_handle())
            .finish()
    }
}
