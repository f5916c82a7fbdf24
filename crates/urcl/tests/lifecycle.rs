//! Integration tests for wrapper creation, reference counting and release cascades.

use std::sync::Arc;

use urcl::prelude::*;

const SOURCE: &str = "kernel void add(global int *a, global int *b, int n) {}\nkernel void nop() {}";

fn setup(devices: usize) -> (Arc<SimNative>, Adapter, Vec<Device>) {
    urcl::logging::init_for_tests();
    let sim = SimNative::with_devices(devices);
    let adapter = Adapter::with_defaults(sim.clone()).expect("Failed to create adapter");
    let platforms = adapter.platforms().expect("Failed to enumerate platforms");
    let devices = platforms[0]
        .devices(DeviceType::ALL)
        .expect("Failed to enumerate devices");
    (sim, adapter, devices)
}

/// Test that releasing a kernel cascades through program and context.
#[test]
fn test_kernel_release_cascade() {
    let (sim, adapter, devices) = setup(2);
    assert_eq!(devices.len(), 2);

    let context = Context::create(&adapter, &devices).unwrap();
    let program = Program::create_with_source(&context, SOURCE).unwrap();
    let kernel = Kernel::create(&program, "add").unwrap();

    assert_eq!(context.ref_count(), 3);
    assert_eq!(program.ref_count(), 2);
    assert_eq!(kernel.ref_count(), 1);
    for device in &devices {
        assert_eq!(device.ref_count(), 2);
    }

    assert_eq!(context.release().unwrap(), 2);
    assert_eq!(program.release().unwrap(), 1);
    assert_eq!(sim.live_objects(), 3);

    assert_eq!(kernel.release().unwrap(), 0);
    assert_eq!(program.ref_count(), 0);
    assert_eq!(context.ref_count(), 0);

    assert_eq!(sim.live_objects(), 0);
    assert_eq!(sim.calls(Call::ReleaseKernel, kernel.native_handle().as_raw()), 1);
    assert_eq!(sim.calls(Call::ReleaseProgram, program.native_handle().as_raw()), 1);
    assert_eq!(sim.calls(Call::ReleaseContext, context.native_handle().as_raw()), 1);
    for device in &devices {
        assert_eq!(sim.release_calls(device.native_handle().as_raw()), 1);
        assert_eq!(device.ref_count(), 1);
    }
}

/// Test releasing kernel, program and context in creation-reverse order.
#[test]
fn test_release_kernel_program_context_in_order() {
    let (sim, adapter, devices) = setup(2);
    let context = Context::create(&adapter, &devices).unwrap();
    let program = Program::create_with_source(&context, SOURCE).unwrap();
    let kernel = Kernel::create(&program, "add").unwrap();

    assert_eq!(kernel.release().unwrap(), 0);
    assert_eq!(program.ref_count(), 1);
    assert_eq!(context.ref_count(), 2);
    assert_eq!(sim.live_objects(), 2);

    assert_eq!(program.release().unwrap(), 0);
    assert_eq!(context.ref_count(), 1);
    for device in &devices {
        assert_eq!(sim.release_calls(device.native_handle().as_raw()), 0);
    }

    assert_eq!(context.release().unwrap(), 0);
    assert_eq!(sim.live_objects(), 0);
    assert_eq!(sim.calls(Call::ReleaseKernel, kernel.native_handle().as_raw()), 1);
    assert_eq!(sim.calls(Call::ReleaseProgram, program.native_handle().as_raw()), 1);
    assert_eq!(sim.calls(Call::ReleaseContext, context.native_handle().as_raw()), 1);
    for device in &devices {
        assert_eq!(sim.release_calls(device.native_handle().as_raw()), 1);
        assert_eq!(device.ref_count(), 1);
    }
}

/// Test that the count follows 1 + retains - releases.
#[test]
fn test_retain_release_arithmetic() {
    let (_sim, adapter, devices) = setup(1);
    let context = Context::create(&adapter, &devices).unwrap();

    for expected in 2..=5 {
        assert_eq!(context.retain().unwrap(), expected);
    }
    for expected in (1..=4).rev() {
        assert_eq!(context.release().unwrap(), expected);
    }
    assert_eq!(context.ref_count(), 1);
    assert_eq!(context.release().unwrap(), 0);
}

/// Test that a released handle cannot be resurrected or released again.
#[test]
fn test_release_after_zero_is_rejected() {
    let (sim, adapter, devices) = setup(1);
    let context = Context::create(&adapter, &devices).unwrap();
    let native = context.native_handle();

    context.release().unwrap();
    assert!(matches!(context.retain(), Err(UrError::InvalidState(_))));
    assert!(matches!(context.release(), Err(UrError::InvalidState(_))));
    assert_eq!(sim.calls(Call::ReleaseContext, native.as_raw()), 1);
}

/// Test that Rust clones share one count.
#[test]
fn test_clones_share_count() {
    let (_sim, adapter, devices) = setup(1);
    let context = Context::create(&adapter, &devices).unwrap();
    let alias = context.clone();

    alias.retain().unwrap();
    assert_eq!(context.ref_count(), 2);
    assert!(alias.ptr_eq(&context));
    assert_eq!(alias, context);

    context.release().unwrap();
    alias.release().unwrap();
}

/// Test that a context needs at least one device.
#[test]
fn test_context_requires_devices() {
    let (sim, adapter, _devices) = setup(1);
    assert_eq!(
        Context::create(&adapter, &[]).unwrap_err(),
        UrError::InvalidArgument
    );
    assert_eq!(sim.total_calls(Call::CreateContext), 0);
}

/// Test that a failed native context creation retains nothing.
#[test]
fn test_context_create_failure() {
    let (sim, adapter, devices) = setup(1);
    sim.fail_next(Call::CreateContext, ClStatus::OUT_OF_HOST_MEMORY);

    assert_eq!(
        Context::create(&adapter, &devices).unwrap_err(),
        UrError::OutOfHostMemory
    );
    assert_eq!(devices[0].ref_count(), 1);
    assert_eq!(sim.retain_calls(devices[0].native_handle().as_raw()), 0);
}

/// Test that an unknown kernel name fails and leaves the program untouched.
#[test]
fn test_kernel_name_not_found() {
    let (_sim, adapter, devices) = setup(1);
    let context = Context::create(&adapter, &devices).unwrap();
    let program = Program::create_with_source(&context, SOURCE).unwrap();

    assert_eq!(
        Kernel::create(&program, "missing").unwrap_err(),
        UrError::InvalidKernel
    );
    assert_eq!(program.ref_count(), 1);
    assert_eq!(context.ref_count(), 2);

    program.release().unwrap();
    context.release().unwrap();
}

/// Test queue creation on a device of the context.
#[test]
fn test_queue_lifecycle() {
    let (sim, adapter, devices) = setup(2);
    let context = Context::create(&adapter, &devices[..1]).unwrap();

    assert_eq!(
        Queue::create(&context, &devices[1], QueueProperties::NONE).unwrap_err(),
        UrError::InvalidDevice
    );
    assert_eq!(sim.total_calls(Call::CreateQueue), 0);

    let queue = Queue::create(&context, &devices[0], QueueProperties::PROFILING).unwrap();
    assert_eq!(queue.device(), &devices[0]);
    assert_eq!(queue.properties().unwrap(), QueueProperties::PROFILING);
    assert_eq!(context.ref_count(), 2);
    assert_eq!(devices[0].ref_count(), 3);

    context.release().unwrap();
    queue.release().unwrap();
    assert_eq!(sim.live_objects(), 0);
    assert_eq!(devices[0].ref_count(), 1);
}

/// Test the context info keys answered by the wrapper and forwarded natively.
#[test]
fn test_context_info() {
    let (_sim, adapter, devices) = setup(4);
    let context = Context::create(&adapter, &devices).unwrap();

    assert_eq!(context.get_info(ContextInfo::NumDevices, None).unwrap(), 4);
    let mut count = [0u8; 4];
    context
        .get_info(ContextInfo::NumDevices, Some(&mut count[..]))
        .unwrap();
    assert_eq!(u32::from_ne_bytes(count), 4);

    let size = context.get_info(ContextInfo::Devices, None).unwrap();
    assert_eq!(size, 4 * std::mem::size_of::<NativeDevice>());
    let mut handles = vec![NativeDevice::default(); 4];
    context
        .get_info(ContextInfo::Devices, Some(bytemuck::cast_slice_mut(&mut handles)))
        .unwrap();
    let expected: Vec<NativeDevice> = devices.iter().map(Device::native_handle).collect();
    assert_eq!(handles, expected);

    let mut flag = [0xFFu8; 1];
    context
        .get_info(ContextInfo::UsmMemcpy2dSupport, Some(&mut flag[..]))
        .unwrap();
    assert_eq!(flag[0], 0);
    context
        .get_info(ContextInfo::UsmFill2dSupport, Some(&mut flag[..]))
        .unwrap();
    assert_eq!(flag[0], 0);

    assert_eq!(
        context
            .get_info(ContextInfo::AtomicMemoryOrderCapabilities, None)
            .unwrap_err(),
        UrError::InvalidArgument
    );

    let mut wrong = [0u8; 8];
    assert_eq!(
        context
            .get_info(ContextInfo::ReferenceCount, Some(&mut wrong[..]))
            .unwrap_err(),
        UrError::InvalidSize
    );
    let mut refs = [0u8; 4];
    context
        .get_info(ContextInfo::ReferenceCount, Some(&mut refs[..]))
        .unwrap();
    assert_eq!(u32::from_ne_bytes(refs), 1);

    assert_eq!(
        ContextInfo::try_from(77).unwrap_err(),
        UrError::InvalidEnumeration
    );

    context.release().unwrap();
}

/// Test program and kernel info queries.
#[test]
fn test_program_and_kernel_info() {
    let (_sim, adapter, devices) = setup(2);
    let context = Context::create(&adapter, &devices).unwrap();
    let program = Program::create_with_source(&context, SOURCE).unwrap();
    let kernel = Kernel::create(&program, "add").unwrap();

    assert_eq!(program.source().unwrap(), SOURCE);
    let mut count = [0u8; 4];
    program
        .get_info(ProgramInfo::NumDevices, Some(&mut count[..]))
        .unwrap();
    assert_eq!(u32::from_ne_bytes(count), 2);

    assert_eq!(kernel.function_name().unwrap(), "add");
    assert_eq!(kernel.num_args().unwrap(), 3);
    assert!(kernel.program().ptr_eq(&program));
    assert!(kernel.context().ptr_eq(&context));

    let mut handle = [0u8; std::mem::size_of::<NativeProgram>()];
    kernel
        .get_info(KernelInfo::Program, Some(&mut handle[..]))
        .unwrap();
    assert_eq!(
        usize::from_ne_bytes(handle),
        program.native_handle().as_raw()
    );

    let name_size = kernel.get_info(KernelInfo::FunctionName, None).unwrap();
    assert_eq!(name_size, "add".len() + 1);
    let mut short = [0u8; 2];
    assert_eq!(
        kernel
            .get_info(KernelInfo::FunctionName, Some(&mut short[..]))
            .unwrap_err(),
        UrError::InvalidSize
    );

    kernel.release().unwrap();
    program.release().unwrap();
    context.release().unwrap();
}

/// Test programs created from intermediate language bytes.
#[test]
fn test_program_from_il() {
    let (sim, adapter, devices) = setup(1);
    let context = Context::create(&adapter, &devices).unwrap();
    let program = Program::create_with_il(&context, SOURCE.as_bytes()).unwrap();
    let kernel = Kernel::create(&program, "nop").unwrap();
    assert_eq!(kernel.num_args().unwrap(), 0);

    context.release().unwrap();
    program.release().unwrap();
    kernel.release().unwrap();
    assert_eq!(sim.live_objects(), 0);
}
