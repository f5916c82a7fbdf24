//! Contexts.
//!
//! A [`Context`] groups one or more devices. It retains each device for as
//! long as it lives and is itself the parent of programs, kernels and queues.
//!
//! Contexts are created either through the native API ([`Context::create`])
//! or by adopting an existing native handle ([`Context::create_with_native`]).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::adapter::Adapter;
use crate::callback::{ExtendedDeleter, UserData};
use crate::device::Device;
use crate::error::{Result, UrError};
use crate::handle::{
    release_all, HandleHeader, NativeProperties, OwnershipIntent, ResourceHandle, TeardownStatus,
};
use crate::info::{self, InfoWriter};
use crate::native::{ContextParam, NativeContext, NativeDevice};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Context info keys.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextInfo {
    /// Number of devices (`u32`).
    NumDevices = 0,
    /// Native device handles.
    Devices = 1,
    /// Native reference count (`u32`).
    ReferenceCount = 2,
    /// 2D USM memcpy support (`bool`).
    UsmMemcpy2dSupport = 3,
    /// 2D USM fill support (`bool`).
    UsmFill2dSupport = 4,
    /// Atomic memory order capabilities.
    AtomicMemoryOrderCapabilities = 5,
    /// Atomic memory scope capabilities.
    AtomicMemoryScopeCapabilities = 6,
    /// Atomic fence order capabilities.
    AtomicFenceOrderCapabilities = 7,
    /// Atomic fence scope capabilities.
    AtomicFenceScopeCapabilities = 8,
}

impl TryFrom<u32> for ContextInfo {
    type Error = UrError;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => Self::NumDevices,
            1 => Self::Devices,
            2 => Self::ReferenceCount,
            3 => Self::UsmMemcpy2dSupport,
            4 => Self::UsmFill2dSupport,
            5 => Self::AtomicMemoryOrderCapabilities,
            6 => Self::AtomicMemoryScopeCapabilities,
            7 => Self::AtomicFenceOrderCapabilities,
            8 => Self::AtomicFenceScopeCapabilities,
            _ => return Err(UrError::InvalidEnumeration),
        })
    }
}

/// Handle to a context.
#[derive(Clone)]
pub struct Context(Arc<ContextObject>);

struct ContextObject {
    id: u64,
    header: HandleHeader<NativeContext>,
    devices: Vec<Device>,
    adapter: Adapter,
}

impl Context {
    fn from_parts(adapter: &Adapter, native: NativeContext, devices: Vec<Device>, owns_native: bool) -> Self {
        Self(Arc::new(ContextObject {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            header: HandleHeader::new(native, owns_native),
            devices,
            adapter: adapter.clone(),
        }))
    }

    /// Create a native context over `devices`.
    pub fn create(adapter: &Adapter, devices: &[Device]) -> Result<Self> {
        if devices.is_empty() {
            return Err(UrError::InvalidArgument);
        }

        let natives: Vec<NativeDevice> = devices.iter().map(Device::native_handle).collect();
        let native = adapter.native().create_context(&natives)?;

        let devices = match retain_devices(devices) {
            Ok(devices) => devices,
            Err(err) => {
                if let Err(status) = adapter.native().release_context(native) {
                    tracing::warn!(native = ?native, status = %status, "release of unused context failed");
                }
                return Err(err);
            }
        };

        debug!(native = ?native, devices = devices.len(), "context created");
        Ok(Self::from_parts(adapter, native, devices, true))
    }

    /// Adopt a native context.
    ///
    /// With an empty `devices` list the context's devices are queried and
    /// adopted. A non-empty list must match the native device list: a length
    /// difference is [`UrError::InvalidContext`], a different device
    /// [`UrError::InvalidDevice`].
    pub fn create_with_native(
        adapter: &Adapter,
        native: NativeContext,
        devices: &[Device],
        properties: &NativeProperties,
    ) -> Result<Self> {
        let api = adapter.native();
        let reported: Vec<NativeDevice> =
            info::query_vec(|value| api.get_context_info(native, ContextParam::Devices, value))?;
        if reported.is_empty() {
            return Err(UrError::InvalidContext);
        }

        let devices = if devices.is_empty() {
            adopt_devices(adapter, &reported)?
        } else {
            if devices.len() != reported.len() {
                return Err(UrError::InvalidContext);
            }
            if devices
                .iter()
                .zip(&reported)
                .any(|(device, reported)| device.native_handle() != *reported)
            {
                return Err(UrError::InvalidDevice);
            }
            retain_devices(devices)?
        };

        let intent = properties.resolve(adapter.config().default_ownership);
        if intent.retains_on_adopt() {
            if let Err(status) = api.retain_context(native) {
                release_all(&devices);
                return Err(status.into());
            }
        }

        debug!(native = ?native, ?intent, devices = devices.len(), "context adopted");
        Ok(Self::from_parts(adapter, native, devices, intent.owns_native()))
    }

    /// Retain `supplied` when it wraps `reported`, or adopt `reported` with a
    /// shared reference. The returned context carries one reference for the
    /// caller.
    pub(crate) fn link_or_adopt(
        adapter: &Adapter,
        supplied: Option<&Context>,
        reported: NativeContext,
    ) -> Result<Self> {
        match supplied {
            Some(context) if context.native_handle() != reported => Err(UrError::InvalidContext),
            Some(context) => {
                context.retain()?;
                Ok(context.clone())
            }
            None => Self::create_with_native(
                adapter,
                reported,
                &[],
                &NativeProperties::with_intent(OwnershipIntent::Share),
            ),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    /// Adapter the context was created through.
    pub fn adapter(&self) -> &Adapter {
        &self.0.adapter
    }

    /// Devices of the context, in native order.
    pub fn devices(&self) -> &[Device] {
        &self.0.devices
    }

    /// Number of devices.
    pub fn device_count(&self) -> u32 {
        self.0.devices.len() as u32
    }

    /// Whether `device` belongs to this context.
    pub fn contains_device(&self, device: &Device) -> bool {
        self.0.devices.iter().any(|d| d == device)
    }

    /// Register `deleter` to run after the native context is destroyed.
    pub fn set_extended_deleter(&self, deleter: ExtendedDeleter, user_data: UserData) -> Result<()> {
        self.0.adapter.callbacks().register(self, deleter, user_data)
    }

    /// Raw info query.
    pub fn get_info(&self, prop: ContextInfo, value: Option<&mut [u8]>) -> Result<usize> {
        match prop {
            ContextInfo::NumDevices => InfoWriter::new(value).value(self.device_count()),
            ContextInfo::Devices => {
                let natives: Vec<NativeDevice> = self.0.devices.iter().map(Device::native_handle).collect();
                InfoWriter::new(value).slice(&natives)
            }
            ContextInfo::UsmMemcpy2dSupport | ContextInfo::UsmFill2dSupport => {
                InfoWriter::new(value).bool(false)
            }
            ContextInfo::AtomicMemoryOrderCapabilities
            | ContextInfo::AtomicMemoryScopeCapabilities
            | ContextInfo::AtomicFenceOrderCapabilities
            | ContextInfo::AtomicFenceScopeCapabilities => Err(UrError::InvalidArgument),
            ContextInfo::ReferenceCount => {
                let api = self.0.adapter.native();
                let native = self.native_handle();
                info::forward_exact(value, |value| {
                    api.get_context_info(native, ContextParam::ReferenceCount, value)
                })
            }
        }
    }

    /// Native reference count.
    pub fn native_reference_count(&self) -> Result<u32> {
        let api = self.0.adapter.native();
        let native = self.native_handle();
        info::query_value(|value| api.get_context_info(native, ContextParam::ReferenceCount, value))
    }

    /// Whether two handles refer to the same context wrapper.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn teardown(&self) -> Result<()> {
        let mut status = TeardownStatus::default();
        if self.0.header.owns_native() {
            let native = self.native_handle();
            status.record(
                "release native context",
                self.0.adapter.native().release_context(native).map_err(UrError::from),
            );
        }
        for device in &self.0.devices {
            status.record("release device", device.release());
        }
        status.finish()
    }
}

fn retain_devices(devices: &[Device]) -> Result<Vec<Device>> {
    let mut retained = Vec::with_capacity(devices.len());
    for device in devices {
        if let Err(err) = device.retain() {
            release_all(&retained);
            return Err(err);
        }
        retained.push(device.clone());
    }
    Ok(retained)
}

fn adopt_devices(adapter: &Adapter, natives: &[NativeDevice]) -> Result<Vec<Device>> {
    let mut adopted = Vec::with_capacity(natives.len());
    for &native in natives {
        match Device::create_with_native(adapter, native) {
            Ok(device) => adopted.push(device),
            Err(err) => {
                release_all(&adopted);
                return Err(err);
            }
        }
    }
    Ok(adopted)
}

impl ResourceHandle for Context {
    type Native = NativeContext;

    const KIND: &'static str = "context";

    fn native_handle(&self) -> NativeContext {
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

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Context {}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("header", &self.0.header)
            .field("devices", &self.0.devices.len())
            .finish()
    }
}
