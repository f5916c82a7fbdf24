//! Builder for [`SimNative`].

use std::sync::Arc;

use urcl_core::native::{DeviceType, NativeDevice, NativePlatform};

use crate::runtime::{SimDevice, SimNative, SimPlatform, SimState};

/// Describes the platforms and devices of a simulated runtime.
///
/// ```ignore
/// let sim = SimNative::builder()
///     .platform("Sim Platform")
///     .device(DeviceType::GPU, "Sim GPU")
///     .device(DeviceType::CPU, "Sim CPU")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct SimNativeBuilder {
    platforms: Vec<(String, Vec<(DeviceType, String)>)>,
}

impl SimNativeBuilder {
    /// Create an empty builder. With no platforms, enumeration reports that no
    /// platform is installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new platform.
    pub fn platform(mut self, name: impl Into<String>) -> Self {
        self.platforms.push((name.into(), Vec::new()));
        self
    }

    /// Add a device to the last platform, starting a default one if needed.
    pub fn device(mut self, device_type: DeviceType, name: impl Into<String>) -> Self {
        if self.platforms.is_empty() {
            self = self.platform("urcl simulated platform");
        }
        if let Some((_, devices)) = self.platforms.last_mut() {
            devices.push((device_type, name.into()));
        }
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Arc<SimNative> {
        let mut state = SimState::new();
        for (name, devices) in self.platforms {
            let handle = NativePlatform::from_raw(state.allocate());
            let mut natives = Vec::with_capacity(devices.len());
            for (device_type, device_name) in devices {
                let native = NativeDevice::from_raw(state.allocate());
                state.devices.insert(
                    native,
                    SimDevice {
                        platform: handle,
                        device_type,
                        name: device_name,
                        refs: 1,
                    },
                );
                natives.push(native);
            }
            state.platforms.push(SimPlatform {
                handle,
                name,
                vendor: "urcl".to_string(),
                version: "OpenCL 3.0 urcl-sim".to_string(),
                extensions: "cl_khr_icd cl_khr_il_program".to_string(),
                devices: natives,
            });
        }
        Arc::new(SimNative::from_state(state))
    }
}

impl SimNative {
    /// One platform with `count` GPU devices.
    pub fn with_devices(count: usize) -> Arc<Self> {
        (0..count)
            .fold(Self::builder().platform("urcl simulated platform"), |builder, i| {
                builder.device(DeviceType::GPU, format!("Sim GPU {}", i))
            })
            .build()
    }

    /// A runtime with no installed platforms.
    pub fn with_no_platforms() -> Arc<Self> {
        Self::builder().build()
    }
}
