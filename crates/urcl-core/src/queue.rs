//! Command queues.
//!
//! A [`Queue`] targets one device of its context and retains both.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::adapter::Adapter;
use crate::context::Context;
use crate::device::Device;
use crate::error::{Result, UrError};
use crate::handle::{release_all, HandleHeader, NativeProperties, ResourceHandle, TeardownStatus};
use crate::info::{self, InfoWriter};
use crate::native::{NativeContext, NativeDevice, NativeQueue, QueueParam, QueueProperties};

/// Queue info keys.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueInfo {
    /// Owning context.
    Context = 0,
    /// Target device.
    Device = 1,
    /// Native reference count (`u32`).
    ReferenceCount = 2,
    /// Property bits (`u64`).
    Properties = 3,
}

impl TryFrom<u32> for QueueInfo {
    type Error = UrError;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => Self::Context,
            1 => Self::Device,
            2 => Self::ReferenceCount,
            3 => Self::Properties,
            _ => return Err(UrError::InvalidEnumeration),
        })
    }
}

/// Handle to a command queue.
#[derive(Clone)]
pub struct Queue(Arc<QueueObject>);

struct QueueObject {
    header: HandleHeader<NativeQueue>,
    context: Context,
    device: Device,
}

impl Queue {
    fn from_parts(native: NativeQueue, context: Context, device: Device, owns_native: bool) -> Self {
        Self(Arc::new(QueueObject {
            header: HandleHeader::new(native, owns_native),
            context,
            device,
        }))
    }

    /// Create a queue on `device`, which must belong to `context`.
    pub fn create(context: &Context, device: &Device, properties: QueueProperties) -> Result<Self> {
        if !context.contains_device(device) {
            return Err(UrError::InvalidDevice);
        }

        let api = context.adapter().native();
        let native = api.create_command_queue(context.native_handle(), device.native_handle(), properties)?;

        let linked = context.retain().and_then(|_| {
            device.retain().map_err(|err| {
                release_all(std::slice::from_ref(context));
                err
            })
        });
        if let Err(err) = linked {
            if let Err(status) = api.release_queue(native) {
                warn!(native = ?native, status = %status, "release of unused queue failed");
            }
            return Err(err);
        }

        debug!(native = ?native, device = ?device.native_handle(), "queue created");
        Ok(Self::from_parts(native, context.clone(), device.clone(), true))
    }

    /// Adopt a native queue.
    ///
    /// Supplied parents must match the queue's native context and device
    /// ([`UrError::InvalidContext`], [`UrError::InvalidDevice`]). Missing
    /// parents are adopted.
    pub fn create_with_native(
        adapter: &Adapter,
        native: NativeQueue,
        context: Option<&Context>,
        device: Option<&Device>,
        properties: &NativeProperties,
    ) -> Result<Self> {
        let api = adapter.native();
        let reported_context: NativeContext =
            info::query_value(|value| api.get_queue_info(native, QueueParam::Context, value))?;
        let reported_device: NativeDevice =
            info::query_value(|value| api.get_queue_info(native, QueueParam::Device, value))?;

        if let Some(context) = context {
            if context.native_handle() != reported_context {
                return Err(UrError::InvalidContext);
            }
        }
        if let Some(device) = device {
            if device.native_handle() != reported_device {
                return Err(UrError::InvalidDevice);
            }
        }

        let context = Context::link_or_adopt(adapter, context, reported_context)?;
        let linked = match device {
            Some(device) => device.retain().map(|_| device.clone()),
            None => Device::create_with_native(adapter, reported_device),
        };
        let device = match linked {
            Ok(device) => device,
            Err(err) => {
                release_all(std::slice::from_ref(&context));
                return Err(err);
            }
        };

        let intent = properties.resolve(adapter.config().default_ownership);
        if intent.retains_on_adopt() {
            if let Err(status) = api.retain_queue(native) {
                release_all(std::slice::from_ref(&device));
                release_all(std::slice::from_ref(&context));
                return Err(status.into());
            }
        }

        debug!(native = ?native, ?intent, "queue adopted");
        Ok(Self::from_parts(native, context, device, intent.owns_native()))
    }

    /// Owning context.
    pub fn context(&self) -> &Context {
        &self.0.context
    }

    /// Target device.
    pub fn device(&self) -> &Device {
        &self.0.device
    }

    /// Raw info query.
    pub fn get_info(&self, prop: QueueInfo, value: Option<&mut [u8]>) -> Result<usize> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        let param = match prop {
            QueueInfo::Context => return InfoWriter::new(value).value(self.0.context.native_handle()),
            QueueInfo::Device => return InfoWriter::new(value).value(self.0.device.native_handle()),
            QueueInfo::ReferenceCount => QueueParam::ReferenceCount,
            QueueInfo::Properties => QueueParam::Properties,
        };
        info::forward_exact(value, |value| api.get_queue_info(native, param, value))
    }

    /// Properties the native queue was created with.
    pub fn properties(&self) -> Result<QueueProperties> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        let bits: u64 = info::query_value(|value| api.get_queue_info(native, QueueParam::Properties, value))?;
        Ok(QueueProperties::from_bits(bits))
    }

    /// Native reference count.
    pub fn native_reference_count(&self) -> Result<u32> {
        let api = self.0.context.adapter().native();
        let native = self.native_handle();
        info::query_value(|value| api.get_queue_info(native, QueueParam::ReferenceCount, value))
    }

    /// Whether two handles refer to the same queue wrapper.
    pub fn ptr_eq(&self, other: &Queue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn teardown(&self) -> Result<()> {
        let mut status = TeardownStatus::default();
        if self.0.header.owns_native() {
            let native = self.native_handle();
            status.record(
                "release native queue",
                self.0
                    .context
                    .adapter()
                    .native()
                    .release_queue(native)
                    .map_err(UrError::from),
            );
        }
        status.record("release device", self.0.device.release());
        status.record("release context", self.0.context.release());
        status.finish()
    }
}

impl ResourceHandle for Queue {
    type Native = NativeQueue;

    const KIND: &'static str = "queue";

    fn native_handle(&self) -> NativeQueue {
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

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Queue {}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("header", &self.0.header)
            .field("context", &self.0.context.native_handle())
            .field("device", &self.0.device.native_handle())
            .finish()
    }
}
