//! Devices.
//!
//! Device wrappers are cached by their platform and shared by every context,
//! queue and program that references them. The platform holds a base
//! reference, so a device's count never drops below 1 while the adapter lives.
//! Retain and release are forwarded to the native device reference count.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::error::{Result, UrError};
use crate::handle::{RefCount, ResourceHandle};
use crate::info;
use crate::native::{DeviceParam, DeviceType, NativeApi, NativeDevice, NativePlatform};
use crate::platform::Platform;

/// Handle to a platform-cached device.
#[derive(Clone)]
pub struct Device(Arc<DeviceInner>);

struct DeviceInner {
    native: NativeDevice,
    platform: NativePlatform,
    device_type: DeviceType,
    api: Arc<dyn NativeApi>,
    count: RefCount,
}

impl Device {
    pub(crate) fn discover(
        api: Arc<dyn NativeApi>,
        platform: NativePlatform,
        native: NativeDevice,
    ) -> Result<Self> {
        let bits: u64 = info::query_value(|value| api.get_device_info(native, DeviceParam::Type, value))?;
        Ok(Self(Arc::new(DeviceInner {
            native,
            platform,
            device_type: DeviceType::from_bits(bits),
            api,
            count: RefCount::new(),
        })))
    }

    /// Resolve a native device to the adapter's cached wrapper and retain it.
    ///
    /// A device missing from the caches is looked up through its native
    /// platform, whose devices are then enumerated again. A device outside
    /// every discovered platform is [`UrError::InvalidDevice`].
    pub fn create_with_native(adapter: &Adapter, native: NativeDevice) -> Result<Self> {
        let device = match adapter.find_device(native)? {
            Some(device) => device,
            None => Self::rediscover(adapter, native)?,
        };
        device.retain()?;
        Ok(device)
    }

    fn rediscover(adapter: &Adapter, native: NativeDevice) -> Result<Self> {
        let api = adapter.native();
        let platform: NativePlatform =
            info::query_value(|value| api.get_device_info(native, DeviceParam::Platform, value))
                .map_err(|err| {
                    debug!(native = ?native, error = %err, "native device has no platform");
                    UrError::InvalidDevice
                })?;
        let platform = Platform::create_with_native(adapter, platform).map_err(|_| {
            debug!(native = ?native, platform = ?platform, "device platform was never discovered");
            UrError::InvalidDevice
        })?;

        platform
            .rediscover_devices()?
            .into_iter()
            .find(|device| device.native_handle() == native)
            .ok_or(UrError::InvalidDevice)
    }

    /// Native platform the device belongs to.
    pub fn platform(&self) -> NativePlatform {
        self.0.platform
    }

    /// Device class.
    pub fn device_type(&self) -> DeviceType {
        self.0.device_type
    }

    /// Device name reported by the native API.
    pub fn name(&self) -> Result<String> {
        let api = &self.0.api;
        let native = self.0.native;
        info::query_string(|value| api.get_device_info(native, DeviceParam::Name, value))
    }

    /// Native reference count.
    pub fn native_reference_count(&self) -> Result<u32> {
        let api = &self.0.api;
        let native = self.0.native;
        info::query_value(|value| api.get_device_info(native, DeviceParam::ReferenceCount, value))
    }
}

impl ResourceHandle for Device {
    type Native = NativeDevice;

    const KIND: &'static str = "device";

    fn native_handle(&self) -> NativeDevice {
        self.0.native
    }

    fn ref_count(&self) -> u32 {
        self.0.count.get()
    }

    fn owns_native(&self) -> bool {
        true
    }

    fn retain(&self) -> Result<u32> {
        let count = self
            .0
            .count
            .increment()
            .ok_or_else(|| UrError::invalid_state("device retained after release"))?;
        if let Err(status) = self.0.api.retain_device(self.0.native) {
            self.0.count.decrement_above(1);
            return Err(status.into());
        }
        Ok(count)
    }

    fn release(&self) -> Result<u32> {
        let count = self.0.count.decrement_above(1).ok_or_else(|| {
            warn!(native = ?self.0.native, "device released below its platform reference");
            UrError::invalid_state("device released below its platform reference")
        })?;
        // The wrapper reference is restored so a failed release can be retried.
        if let Err(status) = self.0.api.release_device(self.0.native) {
            self.0.count.increment();
            return Err(status.into());
        }
        Ok(count)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.0.native == other.0.native
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.native.hash(state);
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("native", &self.0.native)
            .field("device_type", &self.0.device_type)
            .field("count", &self.0.count.get())
            .finish()
    }
}
