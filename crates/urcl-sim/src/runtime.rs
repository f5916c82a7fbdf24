//! Simulated native runtime.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use urcl_core::native::{
    ClStatus, ContextParam, DeviceParam, DeviceType, KernelParam, NativeApi, NativeContext,
    NativeContextCallback, NativeDevice, NativeKernel, NativePlatform, NativeProgram, NativeQueue,
    NativeResult, PlatformParam, ProgramParam, QueueParam, QueueProperties,
};

use crate::builder::SimNativeBuilder;

/// Native entry points tracked by [`SimNative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    /// Platform enumeration.
    GetPlatformIds,
    /// Device enumeration.
    GetDeviceIds,
    /// Device retain.
    RetainDevice,
    /// Device release.
    ReleaseDevice,
    /// Context creation.
    CreateContext,
    /// Context retain.
    RetainContext,
    /// Context release.
    ReleaseContext,
    /// Destructor callback registration.
    SetContextDestructorCallback,
    /// Program creation, from source or IL.
    CreateProgram,
    /// Program retain.
    RetainProgram,
    /// Program release.
    ReleaseProgram,
    /// Kernel creation.
    CreateKernel,
    /// Kernel retain.
    RetainKernel,
    /// Kernel release.
    ReleaseKernel,
    /// Queue creation.
    CreateQueue,
    /// Queue retain.
    RetainQueue,
    /// Queue release.
    ReleaseQueue,
    /// Any info query.
    GetInfo,
}

pub(crate) struct SimPlatform {
    pub(crate) handle: NativePlatform,
    pub(crate) name: String,
    pub(crate) vendor: String,
    pub(crate) version: String,
    pub(crate) extensions: String,
    pub(crate) devices: Vec<NativeDevice>,
}

pub(crate) struct SimDevice {
    pub(crate) platform: NativePlatform,
    pub(crate) device_type: DeviceType,
    pub(crate) name: String,
    pub(crate) refs: u32,
}

struct SimContext {
    devices: Vec<NativeDevice>,
    refs: u32,
    callbacks: Vec<NativeContextCallback>,
}

struct SimProgram {
    context: NativeContext,
    source: String,
    refs: u32,
}

struct SimKernel {
    program: NativeProgram,
    context: NativeContext,
    name: String,
    num_args: u32,
    refs: u32,
}

struct SimQueue {
    context: NativeContext,
    device: NativeDevice,
    properties: QueueProperties,
    refs: u32,
}

#[derive(Default)]
pub(crate) struct SimState {
    next_handle: usize,
    pub(crate) platforms: Vec<SimPlatform>,
    pub(crate) devices: HashMap<NativeDevice, SimDevice>,
    contexts: HashMap<NativeContext, SimContext>,
    programs: HashMap<NativeProgram, SimProgram>,
    kernels: HashMap<NativeKernel, SimKernel>,
    queues: HashMap<NativeQueue, SimQueue>,
    calls: HashMap<(Call, usize), u64>,
    totals: HashMap<Call, u64>,
    faults: HashMap<Call, ClStatus>,
}

impl SimState {
    pub(crate) fn new() -> Self {
        Self {
            next_handle: 0x1000,
            ..Self::default()
        }
    }

    pub(crate) fn allocate(&mut self) -> usize {
        let handle = self.next_handle;
        self.next_handle += 0x10;
        handle
    }

    fn enter(&mut self, call: Call, raw: usize) -> NativeResult<()> {
        *self.calls.entry((call, raw)).or_default() += 1;
        *self.totals.entry(call).or_default() += 1;
        match self.faults.remove(&call) {
            Some(status) => {
                debug!(?call, %status, "injected failure");
                Err(status)
            }
            None => Ok(()),
        }
    }

    fn release_context(
        &mut self,
        handle: NativeContext,
        fired: &mut Vec<(NativeContext, NativeContextCallback)>,
    ) -> NativeResult<()> {
        let context = self.contexts.get_mut(&handle).ok_or(ClStatus::INVALID_CONTEXT)?;
        context.refs -= 1;
        if context.refs == 0 {
            if let Some(context) = self.contexts.remove(&handle) {
                trace!(context = ?handle, "native context destroyed");
                fired.extend(context.callbacks.into_iter().rev().map(|cb| (handle, cb)));
            }
        }
        Ok(())
    }

    fn release_program(
        &mut self,
        handle: NativeProgram,
        fired: &mut Vec<(NativeContext, NativeContextCallback)>,
    ) -> NativeResult<()> {
        let program = self.programs.get_mut(&handle).ok_or(ClStatus::INVALID_PROGRAM)?;
        program.refs -= 1;
        if program.refs == 0 {
            if let Some(program) = self.programs.remove(&handle) {
                self.release_context(program.context, fired)?;
            }
        }
        Ok(())
    }

    fn release_kernel(
        &mut self,
        handle: NativeKernel,
        fired: &mut Vec<(NativeContext, NativeContextCallback)>,
    ) -> NativeResult<()> {
        let kernel = self.kernels.get_mut(&handle).ok_or(ClStatus::INVALID_KERNEL)?;
        kernel.refs -= 1;
        if kernel.refs == 0 {
            if let Some(kernel) = self.kernels.remove(&handle) {
                self.release_program(kernel.program, fired)?;
            }
        }
        Ok(())
    }

    fn release_queue(
        &mut self,
        handle: NativeQueue,
        fired: &mut Vec<(NativeContext, NativeContextCallback)>,
    ) -> NativeResult<()> {
        let queue = self.queues.get_mut(&handle).ok_or(ClStatus::INVALID_COMMAND_QUEUE)?;
        queue.refs -= 1;
        if queue.refs == 0 {
            if let Some(queue) = self.queues.remove(&handle) {
                self.release_context(queue.context, fired)?;
            }
        }
        Ok(())
    }
}

/// Write an info value into an optional caller buffer, native style.
fn write_info(value: Option<&mut [u8]>, bytes: &[u8]) -> NativeResult<usize> {
    if let Some(buf) = value {
        if buf.len() < bytes.len() {
            return Err(ClStatus::INVALID_VALUE);
        }
        buf[..bytes.len()].copy_from_slice(bytes);
    }
    Ok(bytes.len())
}

fn write_str(value: Option<&mut [u8]>, text: &str) -> NativeResult<usize> {
    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    write_info(value, &bytes)
}

/// Count the parameters of `void name(...)` in `source`.
fn kernel_signature(source: &str, name: &str) -> Option<u32> {
    let start = source.find(&format!("void {}(", name))? + "void (".len() + name.len();
    let end = start + source[start..].find(')')?;
    let params = source[start..end].trim();
    if params.is_empty() || params == "void" {
        Some(0)
    } else {
        Some(params.split(',').count() as u32)
    }
}

/// Native compute API simulated in process memory.
///
/// Objects keep native reference counts with OpenCL semantics: programs and
/// queues hold a reference on their context, kernels on their program, and an
/// object is destroyed when its count reaches zero. Destructor callbacks run
/// in reverse registration order after the context is destroyed, outside the
/// internal lock.
///
/// Every entry point is recorded per handle, and the next call of a given kind
/// can be made to fail with [`SimNative::fail_next`].
pub struct SimNative {
    state: Mutex<SimState>,
}

impl SimNative {
    pub(crate) fn from_state(state: SimState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Start building a simulated native runtime.
    pub fn builder() -> SimNativeBuilder {
        SimNativeBuilder::new()
    }

    /// Make the next call of kind `call` fail with `status`.
    pub fn fail_next(&self, call: Call, status: ClStatus) {
        self.state.lock().faults.insert(call, status);
    }

    /// Number of `call` invocations made for the object `raw`.
    pub fn calls(&self, call: Call, raw: usize) -> u64 {
        self.state.lock().calls.get(&(call, raw)).copied().unwrap_or(0)
    }

    /// Number of `call` invocations across all objects.
    pub fn total_calls(&self, call: Call) -> u64 {
        self.state.lock().totals.get(&call).copied().unwrap_or(0)
    }

    /// Number of retain calls of any kind made for the object `raw`.
    pub fn retain_calls(&self, raw: usize) -> u64 {
        [
            Call::RetainDevice,
            Call::RetainContext,
            Call::RetainProgram,
            Call::RetainKernel,
            Call::RetainQueue,
        ]
        .into_iter()
        .map(|call| self.calls(call, raw))
        .sum()
    }

    /// Number of release calls of any kind made for the object `raw`.
    pub fn release_calls(&self, raw: usize) -> u64 {
        [
            Call::ReleaseDevice,
            Call::ReleaseContext,
            Call::ReleaseProgram,
            Call::ReleaseKernel,
            Call::ReleaseQueue,
        ]
        .into_iter()
        .map(|call| self.calls(call, raw))
        .sum()
    }

    /// Native reference count of a live object, by raw handle.
    pub fn native_ref_count(&self, raw: usize) -> Option<u32> {
        let state = self.state.lock();
        state
            .devices
            .get(&NativeDevice::from_raw(raw))
            .map(|d| d.refs)
            .or_else(|| state.contexts.get(&NativeContext::from_raw(raw)).map(|c| c.refs))
            .or_else(|| state.programs.get(&NativeProgram::from_raw(raw)).map(|p| p.refs))
            .or_else(|| state.kernels.get(&NativeKernel::from_raw(raw)).map(|k| k.refs))
            .or_else(|| state.queues.get(&NativeQueue::from_raw(raw)).map(|q| q.refs))
    }

    /// Whether the object `raw` is still alive.
    pub fn is_alive(&self, raw: usize) -> bool {
        self.native_ref_count(raw).is_some()
    }

    /// Number of live contexts, programs, kernels and queues.
    pub fn live_objects(&self) -> usize {
        let state = self.state.lock();
        state.contexts.len() + state.programs.len() + state.kernels.len() + state.queues.len()
    }

    /// Attach a new device to `platform` after discovery has run.
    pub fn add_device(
        &self,
        platform: NativePlatform,
        device_type: DeviceType,
        name: impl Into<String>,
    ) -> Option<NativeDevice> {
        let mut state = self.state.lock();
        let index = state.platforms.iter().position(|p| p.handle == platform)?;
        let native = NativeDevice::from_raw(state.allocate());
        state.devices.insert(
            native,
            SimDevice {
                platform,
                device_type,
                name: name.into(),
                refs: 1,
            },
        );
        state.platforms[index].devices.push(native);
        trace!(device = ?native, platform = ?platform, "device attached");
        Some(native)
    }

    /// Native handles of every simulated device, in platform order.
    pub fn device_handles(&self) -> Vec<NativeDevice> {
        let state = self.state.lock();
        state.platforms.iter().flat_map(|p| p.devices.iter().copied()).collect()
    }

    fn fire(fired: Vec<(NativeContext, NativeContextCallback)>) {
        for (context, callback) in fired {
            callback(context);
        }
    }
}

impl NativeApi for SimNative {
    fn get_platform_ids(&self) -> NativeResult<Vec<NativePlatform>> {
        let mut state = self.state.lock();
        state.enter(Call::GetPlatformIds, 0)?;
        if state.platforms.is_empty() {
            return Err(ClStatus::PLATFORM_NOT_FOUND_KHR);
        }
        Ok(state.platforms.iter().map(|p| p.handle).collect())
    }

    fn get_platform_info(
        &self,
        platform: NativePlatform,
        param: PlatformParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize> {
        let mut state = self.state.lock();
        state.enter(Call::GetInfo, platform.as_raw())?;
        let platform = state
            .platforms
            .iter()
            .find(|p| p.handle == platform)
            .ok_or(ClStatus::INVALID_PLATFORM)?;
        match param {
            PlatformParam::Name => write_str(value, &platform.name),
            PlatformParam::Vendor => write_str(value, &platform.vendor),
            PlatformParam::Version => write_str(value, &platform.version),
            PlatformParam::Extensions => write_str(value, &platform.extensions),
            PlatformParam::Profile => write_str(value, "FULL_PROFILE"),
        }
    }

    fn get_device_ids(
        &self,
        platform: NativePlatform,
        device_type: DeviceType,
    ) -> NativeResult<Vec<NativeDevice>> {
        let mut state = self.state.lock();
        state.enter(Call::GetDeviceIds, platform.as_raw())?;
        let platform = state
            .platforms
            .iter()
            .find(|p| p.handle == platform)
            .ok_or(ClStatus::INVALID_PLATFORM)?;
        let devices: Vec<NativeDevice> = platform
            .devices
            .iter()
            .copied()
            .filter(|d| {
                device_type == DeviceType::ALL
                    || state
                        .devices
                        .get(d)
                        .is_some_and(|dev| dev.device_type.intersects(device_type))
            })
            .collect();
        if devices.is_empty() {
            return Err(ClStatus::DEVICE_NOT_FOUND);
        }
        Ok(devices)
    }

    fn get_device_info(
        &self,
        device: NativeDevice,
        param: DeviceParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize> {
        let mut state = self.state.lock();
        state.enter(Call::GetInfo, device.as_raw())?;
        let device = state.devices.get(&device).ok_or(ClStatus::INVALID_DEVICE)?;
        match param {
            DeviceParam::Platform => write_info(value, bytemuck::bytes_of(&device.platform)),
            DeviceParam::Type => write_info(value, bytemuck::bytes_of(&device.device_type.bits())),
            DeviceParam::Name => write_str(value, &device.name),
            DeviceParam::ReferenceCount => write_info(value, bytemuck::bytes_of(&device.refs)),
        }
    }

    fn retain_device(&self, device: NativeDevice) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter(Call::RetainDevice, device.as_raw())?;
        let device = state.devices.get_mut(&device).ok_or(ClStatus::INVALID_DEVICE)?;
        device.refs += 1;
        Ok(())
    }

    fn release_device(&self, device: NativeDevice) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter(Call::ReleaseDevice, device.as_raw())?;
        let device = state.devices.get_mut(&device).ok_or(ClStatus::INVALID_DEVICE)?;
        // Root devices are never destroyed.
        if device.refs <= 1 {
            return Err(ClStatus::INVALID_DEVICE);
        }
        device.refs -= 1;
        Ok(())
    }

    fn create_context(&self, devices: &[NativeDevice]) -> NativeResult<NativeContext> {
        let mut state = self.state.lock();
        state.enter(Call::CreateContext, 0)?;
        if devices.is_empty() {
            return Err(ClStatus::INVALID_VALUE);
        }
        if devices.iter().any(|d| !state.devices.contains_key(d)) {
            return Err(ClStatus::INVALID_DEVICE);
        }
        let handle = NativeContext::from_raw(state.allocate());
        state.contexts.insert(
            handle,
            SimContext {
                devices: devices.to_vec(),
                refs: 1,
                callbacks: Vec::new(),
            },
        );
        trace!(context = ?handle, "native context created");
        Ok(handle)
    }

    fn retain_context(&self, context: NativeContext) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter(Call::RetainContext, context.as_raw())?;
        let context = state.contexts.get_mut(&context).ok_or(ClStatus::INVALID_CONTEXT)?;
        context.refs += 1;
        Ok(())
    }

    fn release_context(&self, context: NativeContext) -> NativeResult<()> {
        let mut fired = Vec::new();
        {
            let mut state = self.state.lock();
            state.enter(Call::ReleaseContext, context.as_raw())?;
            state.release_context(context, &mut fired)?;
        }
        Self::fire(fired);
        Ok(())
    }

    fn get_context_info(
        &self,
        context: NativeContext,
        param: ContextParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize> {
        let mut state = self.state.lock();
        state.enter(Call::GetInfo, context.as_raw())?;
        let context = state.contexts.get(&context).ok_or(ClStatus::INVALID_CONTEXT)?;
        match param {
            ContextParam::ReferenceCount => write_info(value, bytemuck::bytes_of(&context.refs)),
            ContextParam::Devices => write_info(value, bytemuck::cast_slice(&context.devices)),
        }
    }

    fn set_context_destructor_callback(
        &self,
        context: NativeContext,
        callback: NativeContextCallback,
    ) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter(Call::SetContextDestructorCallback, context.as_raw())?;
        let context = state.contexts.get_mut(&context).ok_or(ClStatus::INVALID_CONTEXT)?;
        context.callbacks.push(callback);
        Ok(())
    }

    fn create_program_with_source(
        &self,
        context: NativeContext,
        source: &str,
    ) -> NativeResult<NativeProgram> {
        let mut state = self.state.lock();
        state.enter(Call::CreateProgram, context.as_raw())?;
        if source.is_empty() {
            return Err(ClStatus::INVALID_VALUE);
        }
        let ctx = state.contexts.get_mut(&context).ok_or(ClStatus::INVALID_CONTEXT)?;
        ctx.refs += 1;
        let handle = NativeProgram::from_raw(state.allocate());
        state.programs.insert(
            handle,
            SimProgram {
                context,
                source: source.to_string(),
                refs: 1,
            },
        );
        Ok(handle)
    }

    fn create_program_with_il(
        &self,
        context: NativeContext,
        il: &[u8],
    ) -> NativeResult<NativeProgram> {
        let source = String::from_utf8_lossy(il).into_owned();
        self.create_program_with_source(context, &source)
    }

    fn retain_program(&self, program: NativeProgram) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter(Call::RetainProgram, program.as_raw())?;
        let program = state.programs.get_mut(&program).ok_or(ClStatus::INVALID_PROGRAM)?;
        program.refs += 1;
        Ok(())
    }

    fn release_program(&self, program: NativeProgram) -> NativeResult<()> {
        let mut fired = Vec::new();
        {
            let mut state = self.state.lock();
            state.enter(Call::ReleaseProgram, program.as_raw())?;
            state.release_program(program, &mut fired)?;
        }
        Self::fire(fired);
        Ok(())
    }

    fn get_program_info(
        &self,
        program: NativeProgram,
        param: ProgramParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize> {
        let mut state = self.state.lock();
        state.enter(Call::GetInfo, program.as_raw())?;
        let program = state.programs.get(&program).ok_or(ClStatus::INVALID_PROGRAM)?;
        match param {
            ProgramParam::ReferenceCount => write_info(value, bytemuck::bytes_of(&program.refs)),
            ProgramParam::Context => write_info(value, bytemuck::bytes_of(&program.context)),
            ProgramParam::Source => write_str(value, &program.source),
        }
    }

    fn create_kernel(&self, program: NativeProgram, name: &str) -> NativeResult<NativeKernel> {
        let mut state = self.state.lock();
        state.enter(Call::CreateKernel, program.as_raw())?;
        let prog = state.programs.get_mut(&program).ok_or(ClStatus::INVALID_PROGRAM)?;
        let num_args = kernel_signature(&prog.source, name).ok_or(ClStatus::INVALID_KERNEL_NAME)?;
        prog.refs += 1;
        let context = prog.context;
        let handle = NativeKernel::from_raw(state.allocate());
        state.kernels.insert(
            handle,
            SimKernel {
                program,
                context,
                name: name.to_string(),
                num_args,
                refs: 1,
            },
        );
        Ok(handle)
    }

    fn retain_kernel(&self, kernel: NativeKernel) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter(Call::RetainKernel, kernel.as_raw())?;
        let kernel = state.kernels.get_mut(&kernel).ok_or(ClStatus::INVALID_KERNEL)?;
        kernel.refs += 1;
        Ok(())
    }

    fn release_kernel(&self, kernel: NativeKernel) -> NativeResult<()> {
        let mut fired = Vec::new();
        {
            let mut state = self.state.lock();
            state.enter(Call::ReleaseKernel, kernel.as_raw())?;
            state.release_kernel(kernel, &mut fired)?;
        }
        Self::fire(fired);
        Ok(())
    }

    fn get_kernel_info(
        &self,
        kernel: NativeKernel,
        param: KernelParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize> {
        let mut state = self.state.lock();
        state.enter(Call::GetInfo, kernel.as_raw())?;
        let kernel = state.kernels.get(&kernel).ok_or(ClStatus::INVALID_KERNEL)?;
        match param {
            KernelParam::ReferenceCount => write_info(value, bytemuck::bytes_of(&kernel.refs)),
            KernelParam::Context => write_info(value, bytemuck::bytes_of(&kernel.context)),
            KernelParam::Program => write_info(value, bytemuck::bytes_of(&kernel.program)),
            KernelParam::FunctionName => write_str(value, &kernel.name),
            KernelParam::NumArgs => write_info(value, bytemuck::bytes_of(&kernel.num_args)),
        }
    }

    fn create_command_queue(
        &self,
        context: NativeContext,
        device: NativeDevice,
        properties: QueueProperties,
    ) -> NativeResult<NativeQueue> {
        let mut state = self.state.lock();
        state.enter(Call::CreateQueue, context.as_raw())?;
        let ctx = state.contexts.get_mut(&context).ok_or(ClStatus::INVALID_CONTEXT)?;
        if !ctx.devices.contains(&device) {
            return Err(ClStatus::INVALID_DEVICE);
        }
        ctx.refs += 1;
        let handle = NativeQueue::from_raw(state.allocate());
        state.queues.insert(
            handle,
            SimQueue {
                context,
                device,
                properties,
                refs: 1,
            },
        );
        Ok(handle)
    }

    fn retain_queue(&self, queue: NativeQueue) -> NativeResult<()> {
        let mut state = self.state.lock();
        state.enter(Call::RetainQueue, queue.as_raw())?;
        let queue = state.queues.get_mut(&queue).ok_or(ClStatus::INVALID_COMMAND_QUEUE)?;
        queue.refs += 1;
        Ok(())
    }

    fn release_queue(&self, queue: NativeQueue) -> NativeResult<()> {
        let mut fired = Vec::new();
        {
            let mut state = self.state.lock();
            state.enter(Call::ReleaseQueue, queue.as_raw())?;
            state.release_queue(queue, &mut fired)?;
        }
        Self::fire(fired);
        Ok(())
    }

    fn get_queue_info(
        &self,
        queue: NativeQueue,
        param: QueueParam,
        value: Option<&mut [u8]>,
    ) -> NativeResult<usize> {
        let mut state = self.state.lock();
        state.enter(Call::GetInfo, queue.as_raw())?;
        let queue = state.queues.get(&queue).ok_or(ClStatus::INVALID_COMMAND_QUEUE)?;
        match param {
            QueueParam::ReferenceCount => write_info(value, bytemuck::bytes_of(&queue.refs)),
            QueueParam::Context => write_info(value, bytemuck::bytes_of(&queue.context)),
            QueueParam::Device => write_info(value, bytemuck::bytes_of(&queue.device)),
            QueueParam::Properties => write_info(value, bytemuck::bytes_of(&queue.properties.bits())),
        }
    }
}
