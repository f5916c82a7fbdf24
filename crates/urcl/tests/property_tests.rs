//! Property-based tests for the retain/release contract.
//!
//! Key invariants:
//! - After n retains and k releases (k <= n) the count is 1 + n - k
//! - The native handle is released exactly once, on the final release
//! - Adoption with a random subset of devices reconstructs that subset

use proptest::prelude::*;
use urcl::prelude::{
    Adapter, Call, Context, Device, DeviceType, NativeApi, NativeDevice, NativeProperties,
    ResourceHandle, SimNative,
};

proptest! {
    /// The count after n retains and k releases is 1 + n - k.
    #[test]
    fn count_tracks_retains_and_releases(n in 0u32..64, k_frac in 0.0f64..=1.0) {
        let k = ((n + 1) as f64 * k_frac).floor() as u32;
        let sim = SimNative::with_devices(1);
        let adapter = Adapter::with_defaults(sim.clone()).unwrap();
        let devices = adapter.platforms().unwrap()[0].devices(DeviceType::ALL).unwrap();
        let context = Context::create(&adapter, &devices).unwrap();
        let raw = context.native_handle().as_raw();

        for _ in 0..n {
            context.retain().unwrap();
        }
        for _ in 0..k {
            context.release().unwrap();
        }

        prop_assert_eq!(context.ref_count(), 1 + n - k);
        let expected_releases = u64::from(k == n + 1);
        prop_assert_eq!(sim.calls(Call::ReleaseContext, raw), expected_releases);
        prop_assert_eq!(sim.is_alive(raw), k <= n);
    }

    /// Adopting a context over any device subset reconstructs the subset.
    #[test]
    fn adoption_reconstructs_devices(mask in 1u8..16) {
        let sim = SimNative::with_devices(4);
        let adapter = Adapter::with_defaults(sim.clone()).unwrap();
        let devices = adapter.platforms().unwrap()[0].devices(DeviceType::ALL).unwrap();
        let subset: Vec<Device> = devices
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, d)| d.clone())
            .collect();
        let natives: Vec<NativeDevice> = subset.iter().map(Device::native_handle).collect();
        let native = sim.create_context(&natives).unwrap();

        let context = Context::create_with_native(&adapter, native, &[], &NativeProperties::default()).unwrap();
        prop_assert_eq!(context.devices(), &subset[..]);

        context.release().unwrap();
        for device in &devices {
            prop_assert_eq!(device.ref_count(), 1);
        }
        sim.release_context(native).unwrap();
        prop_assert_eq!(sim.live_objects(), 0);
    }
}
