//! Integration tests for platform discovery and adapter state.

use urcl::prelude::*;

fn mixed_sim() -> std::sync::Arc<SimNative> {
    SimNative::builder()
        .platform("Sim Compute")
        .device(DeviceType::GPU, "Sim GPU")
        .device(DeviceType::CPU, "Sim CPU")
        .platform("Sim Accelerators")
        .device(DeviceType::ACCELERATOR, "Sim FPGA")
        .build()
}

/// Test that missing native platforms yield an empty list.
#[test]
fn test_no_platforms_is_empty() {
    let sim = SimNative::with_no_platforms();
    let adapter = Adapter::with_defaults(sim.clone()).unwrap();
    assert!(adapter.platforms().unwrap().is_empty());
    assert_eq!(platform_get(&[adapter], 4).unwrap().total, 0);
}

/// Test that other enumeration failures surface.
#[test]
fn test_platform_enumeration_failure() {
    let sim = SimNative::with_devices(1);
    let adapter = Adapter::with_defaults(sim.clone()).unwrap();
    sim.fail_next(Call::GetPlatformIds, ClStatus::OUT_OF_HOST_MEMORY);
    assert_eq!(adapter.platforms().unwrap_err(), UrError::OutOfHostMemory);
    assert_eq!(adapter.platforms().unwrap().len(), 1);
}

/// Test that discovery runs once and is cached.
#[test]
fn test_platforms_are_cached() {
    let sim = mixed_sim();
    let adapter = Adapter::with_defaults(sim.clone()).unwrap();
    assert_eq!(sim.total_calls(Call::GetPlatformIds), 0);

    let first = adapter.platforms().unwrap();
    let second = adapter.platforms().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert_eq!(sim.total_calls(Call::GetPlatformIds), 1);
}

/// Test eager discovery from configuration.
#[test]
fn test_eager_discovery() {
    let sim = mixed_sim();
    let config = AdapterConfig::builder()
        .platform_discovery(PlatformDiscovery::Eager)
        .build()
        .unwrap();
    let _adapter = Adapter::new(sim.clone(), config).unwrap();
    assert_eq!(sim.total_calls(Call::GetPlatformIds), 1);
}

/// Test device filtering by class.
#[test]
fn test_device_filtering() {
    let adapter = Adapter::with_defaults(mixed_sim()).unwrap();
    let platform = &adapter.platforms().unwrap()[0];

    assert_eq!(platform.devices(DeviceType::ALL).unwrap().len(), 2);
    let gpus = platform.devices(DeviceType::GPU).unwrap();
    assert_eq!(gpus.len(), 1);
    assert_eq!(gpus[0].name().unwrap(), "Sim GPU");
    let cpus = platform.devices(DeviceType::CPU).unwrap();
    assert_eq!(cpus[0].device_type(), DeviceType::CPU);
    assert_eq!(platform.devices(DeviceType::DEFAULT).unwrap(), gpus);
    assert!(platform.devices(DeviceType::ACCELERATOR).unwrap().is_empty());
    assert_eq!(gpus[0].platform(), platform.native_handle());
}

/// Test that device wrappers are shared across lookups.
#[test]
fn test_device_identity() {
    let adapter = Adapter::with_defaults(mixed_sim()).unwrap();
    let platforms = adapter.platforms().unwrap();
    let fpga = &platforms[1].devices(DeviceType::ALL).unwrap()[0];

    let adopted = Device::create_with_native(&adapter, fpga.native_handle()).unwrap();
    assert_eq!(&adopted, fpga);
    assert_eq!(fpga.ref_count(), 2);
    adopted.release().unwrap();
    assert_eq!(fpga.ref_count(), 1);

    assert!(matches!(fpga.release(), Err(UrError::InvalidState(_))));
}

/// Test platform info keys.
#[test]
fn test_platform_info() {
    let adapter = Adapter::with_defaults(mixed_sim()).unwrap();
    let platform = &adapter.platforms().unwrap()[0];

    assert_eq!(platform.name().unwrap(), "Sim Compute");
    assert_eq!(platform.vendor().unwrap(), "urcl");
    assert!(platform.version().unwrap().starts_with("OpenCL"));

    let mut backend = [0u8; 4];
    platform
        .get_info(PlatformInfo::Backend, Some(&mut backend[..]))
        .unwrap();
    assert_eq!(u32::from_ne_bytes(backend), PlatformBackend::OpenCl as u32);

    let size = platform.get_info(PlatformInfo::Profile, None).unwrap();
    assert_eq!(size, "FULL_PROFILE".len() + 1);

    assert_eq!(platform.api_version(), ApiVersion::CURRENT);
}

/// Test frontend option mapping.
#[test]
fn test_backend_option() {
    let adapter = Adapter::with_defaults(mixed_sim()).unwrap();
    let platform = &adapter.platforms().unwrap()[0];

    assert_eq!(platform.backend_option("-O0").unwrap(), "-cl-opt-disable");
    for option in ["", "-O1", "-O2", "-O3"] {
        assert_eq!(platform.backend_option(option).unwrap(), "");
    }
    assert_eq!(
        platform.backend_option("-ftarget-compile-fast").unwrap(),
        "-igc_opts 'PartitionUnit=1,SubroutineThreshold=50000'"
    );
    assert_eq!(
        platform.backend_option("-Ofast").unwrap_err(),
        UrError::InvalidValue
    );
}

/// Test platform lookup by native handle.
#[test]
fn test_platform_create_with_native() {
    let adapter = Adapter::with_defaults(mixed_sim()).unwrap();
    let platforms = adapter.platforms().unwrap();

    let found = Platform::create_with_native(&adapter, platforms[1].native_handle()).unwrap();
    assert_eq!(found, platforms[1]);
    assert_eq!(
        Platform::create_with_native(&adapter, NativePlatform::from_raw(0x42)).unwrap_err(),
        UrError::InvalidPlatform
    );
}

/// Test enumeration across adapters with a capped entry count.
#[test]
fn test_platform_get_across_adapters() {
    let first = Adapter::with_defaults(mixed_sim()).unwrap();
    let second = Adapter::with_defaults(SimNative::with_devices(1)).unwrap();

    let all = platform_get(&[first.clone(), second.clone()], 8).unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.platforms.len(), 3);

    let capped = platform_get(&[first, second], 2).unwrap();
    assert_eq!(capped.total, 3);
    assert_eq!(capped.platforms.len(), 2);

    let count_only = platform_get(&[], 0).unwrap();
    assert_eq!(count_only.total, 0);
}

/// Test that a failed native device retain leaves both counts untouched.
#[test]
fn test_device_retain_failure_keeps_counts() {
    let sim = mixed_sim();
    let adapter = Adapter::with_defaults(sim.clone()).unwrap();
    let gpu = adapter.platforms().unwrap()[0].devices(DeviceType::GPU).unwrap()[0].clone();
    let raw = gpu.native_handle().as_raw();

    sim.fail_next(Call::RetainDevice, ClStatus::OUT_OF_RESOURCES);
    assert_eq!(gpu.retain().unwrap_err(), UrError::OutOfResources);
    assert_eq!(gpu.ref_count(), 1);
    assert_eq!(sim.native_ref_count(raw), Some(1));

    assert_eq!(gpu.retain().unwrap(), 2);
    assert_eq!(sim.native_ref_count(raw), Some(2));
}

/// Test that a failed native device release can be retried.
#[test]
fn test_device_release_failure_is_retryable() {
    let sim = mixed_sim();
    let adapter = Adapter::with_defaults(sim.clone()).unwrap();
    let gpu = adapter.platforms().unwrap()[0].devices(DeviceType::GPU).unwrap()[0].clone();
    let raw = gpu.native_handle().as_raw();
    gpu.retain().unwrap();

    sim.fail_next(Call::ReleaseDevice, ClStatus::OUT_OF_RESOURCES);
    assert_eq!(gpu.release().unwrap_err(), UrError::OutOfResources);
    assert_eq!(gpu.ref_count(), 2);
    assert_eq!(sim.native_ref_count(raw), Some(2));

    assert_eq!(gpu.release().unwrap(), 1);
    assert_eq!(sim.native_ref_count(raw), Some(1));
    assert!(matches!(gpu.release(), Err(UrError::InvalidState(_))));
}

/// Test that a device attached after discovery is found through its platform.
#[test]
fn test_device_adoption_rediscovers_platform() {
    let sim = mixed_sim();
    let adapter = Adapter::with_defaults(sim.clone()).unwrap();
    let platform = adapter.platforms().unwrap()[1].clone();
    let fpga = platform.devices(DeviceType::ALL).unwrap()[0].clone();
    fpga.retain().unwrap();

    let native = sim
        .add_device(platform.native_handle(), DeviceType::ACCELERATOR, "Sim DSP")
        .unwrap();
    let device = Device::create_with_native(&adapter, native).unwrap();
    assert_eq!(device.name().unwrap(), "Sim DSP");
    assert_eq!(device.platform(), platform.native_handle());
    assert_eq!(device.ref_count(), 2);
    assert_eq!(sim.native_ref_count(native.as_raw()), Some(2));

    let devices = platform.devices(DeviceType::ALL).unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0], fpga);
    assert_eq!(devices[0].ref_count(), 2);

    device.release().unwrap();
    fpga.release().unwrap();
    assert_eq!(device.ref_count(), 1);
}
