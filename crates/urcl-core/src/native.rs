//! Native compute API surface consumed by the adapter.
//!
//! The adapter never talks to a driver directly. Everything it needs from the
//! underlying OpenCL-style API goes through [`NativeApi`]: creation, retain and
//! release primitives per object kind, buffer-based info queries, and the
//! single destructor-callback registration point on contexts.
//!
//! Native handles are opaque addresses. Each kind gets its own
//! `#[repr(transparent)]` newtype so a program handle can never be passed
//! where a context handle is expected.

use std::fmt;

/// Result of a native API call.
pub type NativeResult<T> = std::result::Result<T, ClStatus>;

/// Callback the native API invokes once when a context is destroyed.
pub type NativeContextCallback = Box<dyn FnOnce(NativeContext) + Send + 'static>;

macro_rules! native_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Default,
            bytemuck::Pod,
            bytemuck::Zeroable,
        )]
        pub struct $name(usize);

        impl $name {
            /// Wrap a raw native address.
            pub const fn from_raw(raw: usize) -> Self {
                Self(raw)
            }

            /// The raw native address.
            pub const fn as_raw(self) -> usize {
                self.0
            }

            /// Whether this is the null handle.
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:#x})"), self.0)
            }
        }
    };
}

native_handle!(
    /// Native platform identity.
    NativePlatform
);
native_handle!(
    /// Native device identity.
    NativeDevice
);
native_handle!(
    /// Native context handle.
    NativeContext
);
native_handle!(
    /// Native program handle.
    NativeProgram
);
native_handle!(
    /// Native kernel handle.
    NativeKernel
);
native_handle!(
    /// Native command-queue handle.
    NativeQueue
);

/// Status code returned by the native API.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClStatus(pub i32);

impl ClStatus {
    /// Call succeeded.
    pub const SUCCESS: Self = Self(0);
    /// No device matched the request.
    pub const DEVICE_NOT_FOUND: Self = Self(-1);
    /// Device-side resources exhausted.
    pub const OUT_OF_RESOURCES: Self = Self(-5);
    /// Host allocation failed.
    pub const OUT_OF_HOST_MEMORY: Self = Self(-6);
    /// Argument value rejected.
    pub const INVALID_VALUE: Self = Self(-30);
    /// Device type rejected.
    pub const INVALID_DEVICE_TYPE: Self = Self(-31);
    /// Platform handle rejected.
    pub const INVALID_PLATFORM: Self = Self(-32);
    /// Device handle rejected.
    pub const INVALID_DEVICE: Self = Self(-33);
    /// Context handle rejected.
    pub const INVALID_CONTEXT: Self = Self(-34);
    /// Queue properties rejected.
    pub const INVALID_QUEUE_PROPERTIES: Self = Self(-35);
    /// Command-queue handle rejected.
    pub const INVALID_COMMAND_QUEUE: Self = Self(-36);
    /// Program handle rejected.
    pub const INVALID_PROGRAM: Self = Self(-44);
    /// Kernel name not present in the program.
    pub const INVALID_KERNEL_NAME: Self = Self(-46);
    /// Kernel handle rejected.
    pub const INVALID_KERNEL: Self = Self(-48);
    /// Operation not valid in the current state.
    pub const INVALID_OPERATION: Self = Self(-59);
    /// No platforms are installed (`cl_khr_icd`).
    pub const PLATFORM_NOT_FOUND_KHR: Self = Self(-1001);

    /// Whether this status denotes success.
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Self::SUCCESS => "CL_SUCCESS",
            Self::DEVICE_NOT_FOUND => "CL_DEVICE_NOT_FOUND",
            Self::OUT_OF_RESOURCES => "CL_OUT_OF_RESOURCES",
            Self::OUT_OF_HOST_MEMORY => "CL_OUT_OF_HOST_MEMORY",
            Self::INVALID_VALUE => "CL_INVALID_VALUE",
            Self::INVALID_DEVICE_TYPE => "CL_INVALID_DEVICE_TYPE",
            Self::INVALID_PLATFORM => "CL_INVALID_PLATFORM",
            Self::INVALID_DEVICE => "CL_INVALID_DEVICE",
            Self::INVALID_CONTEXT => "CL_INVALID_CONTEXT",
            Self::INVALID_QUEUE_PROPERTIES => "CL_INVALID_QUEUE_PROPERTIES",
            Self::INVALID_COMMAND_QUEUE => "CL_INVALID_COMMAND_QUEUE",
            Self::INVALID_PROGRAM => "CL_INVALID_PROGRAM",
            Self::INVALID_KERNEL_NAME => "CL_INVALID_KERNEL_NAME",
            Self::INVALID_KERNEL => "CL_INVALID_KERNEL",
            Self::INVALID_OPERATION => "CL_INVALID_OPERATION",
            Self::PLATFORM_NOT_FOUND_KHR => "CL_PLATFORM_NOT_FOUND_KHR",
            _ => return None,
        })
    }
}

impl fmt::Debug for ClStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", name, self.0),
            None => write!(f, "ClStatus({})", self.0),
        }
    }
}

impl fmt::Display for ClStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Device classes, as a bit mask.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceType(u64);

impl DeviceType {
    /// The platform's default device.
    pub const DEFAULT: Self = Self(1 << 0);
    /// Host CPU device.
    pub const CPU: Self = Self(1 << 1);
    /// GPU device.
    pub const GPU: Self = Self(1 << 2);
    /// Dedicated accelerator.
    pub const ACCELERATOR: Self = Self(1 << 3);
    /// Every device class.
    pub const ALL: Self = Self(0xFFFF_FFFF);

    /// Build from raw bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether any bit of `other` is set in `self`.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

/// Command-queue property bits.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueueProperties(u64);

impl QueueProperties {
    /// In-order execution, no profiling.
    pub const NONE: Self = Self(0);
    /// Commands may execute out of order.
    pub const OUT_OF_ORDER: Self = Self(1 << 0);
    /// Collect profiling timestamps.
    pub const PROFILING: Self = Self(1 << 1);

    /// Build from raw bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u64 {
        self.0
    }
}

/// Native platform queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformParam {
    /// Platform name string.
    Name,
    /// Vendor string.
    Vendor,
    /// Version string.
    Version,
    /// Space separated extension list.
    Extensions,
    /// Profile string (`FULL_PROFILE` / `EMBEDDED_PROFILE`).
    Profile,
}

/// Native device queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceParam {
    /// Owning platform (`NativePlatform`).
    Platform,
    /// Device class bits (`u64`).
    Type,
    /// Device name string.
    Name,
    /// Native reference count (`u32`).
    ReferenceCount,
}

/// Native context queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextParam {
    /// Native reference count (`u32`).
    ReferenceCount,
    /// Device list (`[NativeDevice]`).
    Devices,
}

/// Native program queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramParam {
    /// Native reference count (`u32`).
    ReferenceCount,
    /// Owning context (`NativeContext`).
    Context,
    /// Program source, nul terminated.
    Source,
}

/// Native kernel queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelParam {
    /// Native reference count (`u32`).
    ReferenceCount,
    /// Owning context (`NativeContext`).
    Context,
    /// Owning program (`NativeProgram`).
    Program,
    /// Kernel function name, nul terminated.
    FunctionName,
    /// Number of arguments (`u32`).
    NumArgs,
}

/// Native command-queue queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueParam {
    /// Native reference count (`u32`).
    ReferenceCount,
    /// Owning context (`NativeContext`).
    Context,
    /// Target device (`NativeDevice`).
    Device,
    /// Property bits (`u64`).
    Properties,
}

/// Primitives the adapter consumes from the native compute API.
///
/// Info queries follow the native buffer contract: with `value == None` they
/// report the size in bytes of the value; with a buffer they write the value
/// and report its size. A buffer shorter than the value is rejected by the
/// native side with [`ClStatus::INVALID_VALUE`].
pub trait NativeApi: Send + Sync {
    /// Enumerate installed platforms.
    fn get_platform_ids(&self) -> NativeResult<Vec<NativePlatform>>;

    /// Query a platform property.
    fn get_platform_info(
        &self,
        platform: NativePlatform,
        param: PlatformParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize>;

    /// Enumerate devices of a platform matching `device_type`.
    fn get_device_ids(
        &self,
        platform: NativePlatform,
        device_type: DeviceType,
    ) -> NativeResult<Vec<NativeDevice>>;

    /// Query a device property.
    fn get_device_info(
        &self,
        device: NativeDevice,
        param: DeviceParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize>;

    /// Increment the native device reference count.
    fn retain_device(&self, device: NativeDevice) -> NativeResult<()>;

    /// Decrement the native device reference count.
    fn release_device(&self, device: NativeDevice) -> NativeResult<()>;

    /// Create a context over `devices`.
    fn create_context(&self, devices: &[NativeDevice]) -> NativeResult<NativeContext>;

    /// Increment the native context reference count.
    fn retain_context(&self, context: NativeContext) -> NativeResult<()>;

    /// Decrement the native context reference count.
    fn release_context(&self, context: NativeContext) -> NativeResult<()>;

    /// Query a context property.
    fn get_context_info(
        &self,
        context: NativeContext,
        param: ContextParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize>;

    /// Register a callback fired once after the native context is destroyed.
    fn set_context_destructor_callback(
        &self,
        context: NativeContext,
        callback: NativeContextCallback,
    ) -> NativeResult<()>;

    /// Create a program from source text.
    fn create_program_with_source(
        &self,
        context: NativeContext,
        source: &str,
    ) -> NativeResult<NativeProgram>;

    /// Create a program from intermediate language bytes.
    fn create_program_with_il(
        &self,
        context: NativeContext,
        il: &[u8],
    ) -> NativeResult<NativeProgram>;

    /// Increment the native program reference count.
    fn retain_program(&self, program: NativeProgram) -> NativeResult<()>;

    /// Decrement the native program reference count.
    fn release_program(&self, program: NativeProgram) -> NativeResult<()>;

    /// Query a program property.
    fn get_program_info(
        &self,
        program: NativeProgram,
        param: ProgramParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize>;

    /// Create a kernel for the function `name` of `program`.
    fn create_kernel(&self, program: NativeProgram, name: &str) -> NativeResult<NativeKernel>;

    /// Increment the native kernel reference count.
    fn retain_kernel(&self, kernel: NativeKernel) -> NativeResult<()>;

    /// Decrement the native kernel reference count.
    fn release_kernel(&self, kernel: NativeKernel) -> NativeResult<()>;

    /// Query a kernel property.
    fn get_kernel_info(
        &self,
        kernel: NativeKernel,
        param: KernelParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize>;

    /// Create a command queue on `device` within `context`.
    fn create_command_queue(
        &self,
        context: NativeContext,
        device: NativeDevice,
        properties: QueueProperties,
    ) -> NativeResult<NativeQueue>;

    /// Increment the native queue reference count.
    fn retain_queue(&self, queue: NativeQueue) -> NativeResult<()>;

    /// Decrement the native queue reference count.
    fn release_queue(&self, queue: NativeQueue) -> NativeResult<()>;

    /// Query a command-queue property.
    fn get_queue_info(
        &self,
        queue: NativeQueue,
        param: QueueParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_round_trip_raw() {
        let ctx = NativeContext::from_raw(0x1230);
        assert_eq!(ctx.as_raw(), 0x1230);
        assert!(!ctx.is_null());
        assert!(NativeContext::default().is_null());
        assert_eq!(format!("{:?}", ctx), "NativeContext(0x1230)");
    }

    #[test]
    fn test_handles_are_pod() {
        let devices = [NativeDevice::from_raw(1), NativeDevice::from_raw(2)];
        let bytes: &[u8] = bytemuck::cast_slice(&devices);
        assert_eq!(bytes.len(), 2 * std::mem::size_of::<usize>());
    }

    #[test]
    fn test_status_formatting() {
        assert_eq!(
            format!("{}", ClStatus::INVALID_CONTEXT),
            "CL_INVALID_CONTEXT(-34)"
        );
        assert_eq!(format!("{}", ClStatus(-9999)), "ClStatus(-9999)");
        assert!(ClStatus::SUCCESS.is_success());
    }

    #[test]
    fn test_device_type_mask() {
        assert!(DeviceType::ALL.intersects(DeviceType::GPU));
        assert!(!DeviceType::CPU.intersects(DeviceType::GPU));
    }
}
