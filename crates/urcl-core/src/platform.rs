//! Platforms and the per-adapter platform cache.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::adapter::Adapter;
use crate::device::Device;
use crate::error::{Result, UrError};
use crate::handle::ResourceHandle;
use crate::info::{self, InfoWriter};
use crate::native::{ClStatus, DeviceType, NativeApi, NativeDevice, NativePlatform, PlatformParam};

/// Backend identifiers reported through [`PlatformInfo::Backend`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformBackend {
    /// Unknown backend.
    Unknown = 0,
    /// Level Zero.
    LevelZero = 1,
    /// OpenCL.
    OpenCl = 2,
    /// CUDA.
    Cuda = 3,
    /// HIP.
    Hip = 4,
    /// Native CPU.
    NativeCpu = 5,
}

/// Platform info keys.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformInfo {
    /// Platform name string.
    Name = 1,
    /// Vendor string.
    VendorName = 2,
    /// Version string.
    Version = 3,
    /// Extension list string.
    Extensions = 4,
    /// Profile string.
    Profile = 5,
    /// Backend identifier (`u32`).
    Backend = 6,
}

impl TryFrom<u32> for PlatformInfo {
    type Error = UrError;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            1 => Self::Name,
            2 => Self::VendorName,
            3 => Self::Version,
            4 => Self::Extensions,
            5 => Self::Profile,
            6 => Self::Backend,
            _ => return Err(UrError::InvalidEnumeration),
        })
    }
}

/// Adapter API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
    /// Major version.
    pub major: u16,
    /// Minor version.
    pub minor: u16,
}

impl ApiVersion {
    /// Version implemented by this adapter.
    pub const CURRENT: Self = Self { major: 0, minor: 9 };
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A discovered platform. Adapter-owned; never individually released.
#[derive(Clone)]
pub struct Platform(Arc<PlatformInner>);

struct PlatformInner {
    native: NativePlatform,
    api: Arc<dyn NativeApi>,
    devices: RwLock<Option<Vec<Device>>>,
}

impl Platform {
    fn new(api: Arc<dyn NativeApi>, native: NativePlatform) -> Self {
        Self(Arc::new(PlatformInner {
            native,
            api,
            devices: RwLock::new(None),
        }))
    }

    /// Find the adapter's platform wrapping `native`.
    pub fn create_with_native(adapter: &Adapter, native: NativePlatform) -> Result<Self> {
        adapter
            .platforms()?
            .into_iter()
            .find(|platform| platform.native_handle() == native)
            .ok_or(UrError::InvalidPlatform)
    }

    /// Native platform identity.
    pub fn native_handle(&self) -> NativePlatform {
        self.0.native
    }

    /// Devices of this platform matching `device_type`.
    ///
    /// The full device list is discovered once and cached; `DEFAULT` selects
    /// the first device.
    pub fn devices(&self, device_type: DeviceType) -> Result<Vec<Device>> {
        let all = self.all_devices()?;
        if device_type == DeviceType::DEFAULT {
            return Ok(all.into_iter().take(1).collect());
        }
        Ok(all
            .into_iter()
            .filter(|device| device.device_type().intersects(device_type))
            .collect())
    }

    /// Cached device with native identity `native`, if this platform has it.
    pub fn find_device(&self, native: NativeDevice) -> Result<Option<Device>> {
        Ok(self
            .all_devices()?
            .into_iter()
            .find(|device| device.native_handle() == native))
    }

    fn all_devices(&self) -> Result<Vec<Device>> {
        if let Some(devices) = self.0.devices.read().as_ref() {
            return Ok(devices.clone());
        }

        let mut guard = self.0.devices.write();
        if let Some(devices) = guard.as_ref() {
            return Ok(devices.clone());
        }

        let devices = self.enumerate_devices(&[])?;
        debug!(platform = ?self.0.native, count = devices.len(), "discovered devices");
        *guard = Some(devices.clone());
        Ok(devices)
    }

    /// Enumerate the platform's devices again, keeping wrappers already handed
    /// out and adding devices that appeared since the last discovery.
    pub(crate) fn rediscover_devices(&self) -> Result<Vec<Device>> {
        let mut guard = self.0.devices.write();
        let known = guard.take().unwrap_or_default();
        let devices = match self.enumerate_devices(&known) {
            Ok(devices) => devices,
            Err(err) => {
                *guard = Some(known);
                return Err(err);
            }
        };
        debug!(platform = ?self.0.native, count = devices.len(), "rediscovered devices");
        *guard = Some(devices.clone());
        Ok(devices)
    }

    fn enumerate_devices(&self, known: &[Device]) -> Result<Vec<Device>> {
        let natives = match self.0.api.get_device_ids(self.0.native, DeviceType::ALL) {
            Ok(natives) => natives,
            Err(ClStatus::DEVICE_NOT_FOUND) => Vec::new(),
            Err(status) => return Err(status.into()),
        };
        natives
            .into_iter()
            .map(|native| match known.iter().find(|d| d.native_handle() == native) {
                Some(device) => Ok(device.clone()),
                None => Device::discover(Arc::clone(&self.0.api), self.0.native, native),
            })
            .collect()
    }

    /// Raw info query.
    pub fn get_info(&self, prop: PlatformInfo, value: Option<&mut [u8]>) -> Result<usize> {
        let param = match prop {
            PlatformInfo::Backend => {
                return InfoWriter::new(value).value(PlatformBackend::OpenCl as u32);
            }
            PlatformInfo::Name => PlatformParam::Name,
            PlatformInfo::VendorName => PlatformParam::Vendor,
            PlatformInfo::Version => PlatformParam::Version,
            PlatformInfo::Extensions => PlatformParam::Extensions,
            PlatformInfo::Profile => PlatformParam::Profile,
        };
        let api = &self.0.api;
        let native = self.0.native;
        Ok(api.get_platform_info(native, param, value)?)
    }

    /// Platform name.
    pub fn name(&self) -> Result<String> {
        self.string_param(PlatformParam::Name)
    }

    /// Vendor name.
    pub fn vendor(&self) -> Result<String> {
        self.string_param(PlatformParam::Vendor)
    }

    /// Version string.
    pub fn version(&self) -> Result<String> {
        self.string_param(PlatformParam::Version)
    }

    fn string_param(&self, param: PlatformParam) -> Result<String> {
        let api = &self.0.api;
        let native = self.0.native;
        info::query_string(|value| api.get_platform_info(native, param, value))
    }

    /// API version implemented by the adapter.
    pub fn api_version(&self) -> ApiVersion {
        ApiVersion::CURRENT
    }

    /// Map a frontend compiler option to this backend's equivalent.
    pub fn backend_option(&self, frontend_option: &str) -> Result<&'static str> {
        match frontend_option {
            "" | "-O1" | "-O2" | "-O3" => Ok(""),
            "-O0" => Ok("-cl-opt-disable"),
            "-ftarget-compile-fast" => Ok("-igc_opts 'PartitionUnit=1,SubroutineThreshold=50000'"),
            _ => Err(UrError::InvalidValue),
        }
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        self.0.native == other.0.native
    }
}

impl Eq for Platform {}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").field("native", &self.0.native).finish()
    }
}

/// Per-adapter platform cache guarded by a compute-once flag.
///
/// Concurrent first-time callers may each run native enumeration; only the
/// first result is stored.
pub(crate) struct PlatformCache {
    discovered: AtomicBool,
    platforms: RwLock<Vec<Platform>>,
}

impl PlatformCache {
    pub(crate) fn new() -> Self {
        Self {
            discovered: AtomicBool::new(false),
            platforms: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn get_or_discover(&self, api: &Arc<dyn NativeApi>) -> Result<Vec<Platform>> {
        if self.discovered.load(Ordering::Acquire) {
            return Ok(self.platforms.read().clone());
        }

        let natives = match api.get_platform_ids() {
            Ok(natives) => natives,
            Err(ClStatus::PLATFORM_NOT_FOUND_KHR) => {
                info!("no native platforms installed");
                return Ok(Vec::new());
            }
            Err(status) => return Err(status.into()),
        };
        let discovered: Vec<Platform> = natives
            .into_iter()
            .map(|native| Platform::new(Arc::clone(api), native))
            .collect();

        let mut platforms = self.platforms.write();
        if self.discovered.load(Ordering::Acquire) {
            debug!("platform discovery raced, keeping the first result");
        } else {
            info!(count = discovered.len(), "discovered platforms");
            *platforms = discovered;
            self.discovered.store(true, Ordering::Release);
        }
        Ok(platforms.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_info_from_raw() {
        assert_eq!(PlatformInfo::try_from(1).unwrap(), PlatformInfo::Name);
        assert_eq!(PlatformInfo::try_from(6).unwrap(), PlatformInfo::Backend);
        assert_eq!(PlatformInfo::try_from(99), Err(UrError::InvalidEnumeration));
    }

    #[test]
    fn test_api_version_display() {
        assert_eq!(ApiVersion::CURRENT.to_string(), "0.9");
    }
}
