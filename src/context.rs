//! Tensor context
//!
//! Owns the device seam, the configuration defaults and the storage arena
//! shared by every tensor created through it. Contexts are single threaded:
//! tensors hold an `Rc<Context>` and all mutation happens on the owning
//! thread.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::ContextConfig;
use crate::device::{Device, DeviceLimits};
use crate::storage::{StorageArena, StorageHandle, StorageResource};

/// Device, configuration and storage arena for a family of tensors
pub struct Context {
    device: Rc<dyn Device>,
    config: ContextConfig,
    storages: RefCell<StorageArena>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("storages", &self.storages.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context over an initialized device
    #[must_use]
    pub fn new(device: Rc<dyn Device>, config: ContextConfig) -> Rc<Self> {
        Rc::new(Self {
            device,
            config,
            storages: RefCell::new(StorageArena::new()),
        })
    }

    /// Context with [`ContextConfig::default`]
    #[must_use]
    pub fn with_defaults(device: Rc<dyn Device>) -> Rc<Self> {
        Self::new(device, ContextConfig::default())
    }

    /// Device seam
    #[must_use]
    pub fn device(&self) -> &Rc<dyn Device> {
        &self.device
    }

    /// Configuration defaults
    #[must_use]
    pub const fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Device limits
    #[must_use]
    pub fn limits(&self) -> DeviceLimits {
        self.device.limits()
    }

    /// Number of storage resources still referenced by some tensor
    #[must_use]
    pub fn live_storages(&self) -> usize {
        self.storages.borrow().len()
    }

    /// Reference count of a storage record, 0 once it has been released
    #[must_use]
    pub fn storage_refcount(&self, handle: StorageHandle) -> usize {
        self.storages.borrow().refcount(handle)
    }

    pub(crate) fn insert_storage(&self, resource: StorageResource) -> StorageHandle {
        self.storages.borrow_mut().insert(resource)
    }

    pub(crate) fn retain_storage(&self, handle: StorageHandle) {
        self.storages.borrow_mut().retain(handle);
    }

    pub(crate) fn release_storage(&self, handle: StorageHandle) {
        // Bound outside the borrow so the resource's Drop runs after it ends
        let released = self.storages.borrow_mut().release(handle);
        drop(released);
    }

    pub(crate) fn with_storage<R>(&self, handle: StorageHandle, f: impl FnOnce(&StorageResource) -> R) -> R {
        f(self.storages.borrow().get(handle))
    }

    pub(crate) fn with_storage_mut<R>(
        &self,
        handle: StorageHandle,
        f: impl FnOnce(&mut StorageResource) -> R,
    ) -> R {
        f(self.storages.borrow_mut().get_mut(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::layout::DEFAULT_AXIS_MAP;
    use crate::types::{ScalarType, StorageType};

    #[test]
    fn test_storage_lifecycle() {
        let device = Rc::new(RecordingDevice::new());
        let ctx = Context::with_defaults(device.clone());
        let resource = StorageResource::new(
            ctx.device().clone(),
            StorageType::Buffer,
            &DEFAULT_AXIS_MAP,
            0,
            &[1, 1, 1, 8],
            ScalarType::Float,
            true,
        )
        .unwrap();

        let handle = ctx.insert_storage(resource);
        ctx.retain_storage(handle);
        assert_eq!(ctx.storage_refcount(handle), 2);
        assert_eq!(ctx.with_storage(handle, StorageResource::buffer_length), 8);

        ctx.release_storage(handle);
        assert_eq!(ctx.live_storages(), 1);
        ctx.release_storage(handle);
        assert_eq!(ctx.live_storages(), 0);
        assert_eq!(device.pending_cleanup().len(), 1);
    }

    #[test]
    fn test_limits_forwarded() {
        let device = Rc::new(RecordingDevice::new());
        let ctx = Context::with_defaults(device);
        assert_eq!(ctx.limits(), DeviceLimits::default());
        assert_eq!(ctx.config().storage_type, StorageType::Texture3D);
    }
}
