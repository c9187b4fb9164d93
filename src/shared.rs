//! Shared objects for memory planning
//!
//! Tensors whose lifetimes never overlap can share one block of device
//! memory. Each user is created without memory, registered with a
//! [`SharedObject`], and bound once the object has allocated a block large
//! enough for every user.

use std::rc::Rc;

use tracing::debug;

use crate::context::Context;
use crate::device::{Allocation, MemoryRequirements};
use crate::error::{Result, TeselaError};
use crate::storage::StorageHandle;
use crate::tensor::Tensor;

/// One memory block shared by several unallocated tensors.
///
/// The object holds a reference on every user's storage, so users may be
/// dropped before binding. Dropping the object queues its memory block for
/// deferred release; users must not be dispatched after that.
#[derive(Debug)]
pub struct SharedObject {
    context: Rc<Context>,
    requirements: Option<MemoryRequirements>,
    allocation: Option<Allocation>,
    users: Vec<StorageHandle>,
}

impl SharedObject {
    /// Empty shared object
    #[must_use]
    pub fn new(context: &Rc<Context>) -> Self {
        Self {
            context: Rc::clone(context),
            requirements: None,
            allocation: None,
            users: Vec::new(),
        }
    }

    /// Register `tensor` and fold its memory requirements into the
    /// aggregate: largest size, largest alignment, common memory types.
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::InvalidAllocation`] if the tensor already has
    /// memory or the block has already been allocated.
    ///
    /// # Panics
    ///
    /// Panics if `tensor` belongs to a different context.
    pub fn add_user(&mut self, tensor: &Tensor) -> Result<()> {
        assert!(
            Rc::ptr_eq(&self.context, tensor.context()),
            "shared object users must come from the same context"
        );
        if self.allocation.is_some() {
            return Err(TeselaError::InvalidAllocation(
                "cannot add users after the shared object is allocated".to_string(),
            ));
        }
        if tensor.is_allocated() {
            return Err(TeselaError::InvalidAllocation(
                "shared object users must be created without memory".to_string(),
            ));
        }

        let handle = tensor.storage_handle();
        if self.users.contains(&handle) {
            return Ok(());
        }

        let reqs = tensor.memory_requirements();
        self.requirements = Some(match self.requirements {
            None => reqs,
            Some(agg) => MemoryRequirements {
                size: agg.size.max(reqs.size),
                alignment: agg.alignment.max(reqs.alignment),
                memory_type_bits: agg.memory_type_bits & reqs.memory_type_bits,
            },
        });
        self.context.retain_storage(handle);
        self.users.push(handle);
        Ok(())
    }

    /// Allocate the block. A no-op without users or once allocated.
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::InvalidAllocation`] if the users have no memory
    /// type in common, or the device's error if allocation fails.
    pub fn allocate(&mut self) -> Result<()> {
        let Some(reqs) = self.requirements else {
            return Ok(());
        };
        if self.allocation.is_some() {
            return Ok(());
        }
        if reqs.memory_type_bits == 0 {
            return Err(TeselaError::InvalidAllocation(
                "shared object users have no memory type in common".to_string(),
            ));
        }

        let allocation = self.context.device().allocate_memory(&reqs)?;
        debug!(
            id = allocation.id,
            size = allocation.size,
            users = self.users.len(),
            "Allocated shared object"
        );
        self.allocation = Some(allocation);
        Ok(())
    }

    /// Bind every registered user to the block
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::InvalidAllocation`] if the block has not been
    /// allocated or a user cannot be bound.
    pub fn bind_users(&self) -> Result<()> {
        let Some(allocation) = self.allocation else {
            return Err(TeselaError::InvalidAllocation(
                "shared object must be allocated before binding users".to_string(),
            ));
        };
        for &handle in &self.users {
            self.context
                .with_storage_mut(handle, |s| s.bind_allocation(&allocation))?;
        }
        debug!(id = allocation.id, users = self.users.len(), "Bound shared object users");
        Ok(())
    }

    /// Aggregate requirements of all users, if any were added
    #[must_use]
    pub const fn requirements(&self) -> Option<MemoryRequirements> {
        self.requirements
    }

    /// Memory block, once allocated
    #[must_use]
    pub const fn allocation(&self) -> Option<Allocation> {
        self.allocation
    }

    /// Number of registered users
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

impl Drop for SharedObject {
    fn drop(&mut self) {
        for handle in self.users.drain(..) {
            self.context.release_storage(handle);
        }
        if let Some(allocation) = self.allocation.take() {
            self.context.device().register_memory_cleanup(allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TensorSpec;
    use crate::device::RecordingDevice;
    use crate::types::StorageType;

    fn setup() -> (Rc<RecordingDevice>, Rc<Context>) {
        let device = Rc::new(RecordingDevice::new());
        let ctx = Context::with_defaults(device.clone());
        (device, ctx)
    }

    fn unallocated_buffer(ctx: &Rc<Context>, sizes: &[usize]) -> Tensor {
        let spec = TensorSpec::new(sizes)
            .with_storage_type(StorageType::Buffer)
            .unallocated();
        Tensor::new(ctx, &spec).unwrap()
    }

    #[test]
    fn test_aggregate_and_bind() {
        let (device, ctx) = setup();
        let small = unallocated_buffer(&ctx, &[4, 4]);
        let large = unallocated_buffer(&ctx, &[8, 8]);
        let image = Tensor::new(&ctx, &TensorSpec::new(&[4, 4, 4]).unallocated()).unwrap();

        let mut shared = SharedObject::new(&ctx);
        shared.add_user(&small).unwrap();
        shared.add_user(&large).unwrap();
        shared.add_user(&image).unwrap();
        assert_eq!(shared.user_count(), 3);

        let reqs = shared.requirements().unwrap();
        assert_eq!(reqs.size, large.memory_requirements().size);
        assert_eq!(reqs.alignment, image.memory_requirements().alignment);
        assert_eq!(
            reqs.memory_type_bits,
            small.memory_requirements().memory_type_bits & image.memory_requirements().memory_type_bits
        );

        shared.allocate().unwrap();
        shared.bind_users().unwrap();
        assert!(small.is_allocated());
        assert!(large.is_allocated());
        assert!(image.is_allocated());
        assert_eq!(device.bytes_in_use(), reqs.size);
    }

    #[test]
    fn test_duplicate_user_ignored() {
        let (_device, ctx) = setup();
        let t = unallocated_buffer(&ctx, &[4]);
        let mut shared = SharedObject::new(&ctx);
        shared.add_user(&t).unwrap();
        shared.add_user(&t).unwrap();
        assert_eq!(shared.user_count(), 1);
    }

    #[test]
    fn test_rejects_allocated_tensor() {
        let (_device, ctx) = setup();
        let t = Tensor::new(&ctx, &TensorSpec::new(&[4])).unwrap();
        let mut shared = SharedObject::new(&ctx);
        assert!(matches!(
            shared.add_user(&t),
            Err(TeselaError::InvalidAllocation(_))
        ));
    }

    #[test]
    fn test_bind_before_allocate_fails() {
        let (_device, ctx) = setup();
        let t = unallocated_buffer(&ctx, &[4]);
        let mut shared = SharedObject::new(&ctx);
        shared.add_user(&t).unwrap();
        assert!(shared.bind_users().is_err());
    }

    #[test]
    fn test_empty_allocate_is_noop() {
        let (device, ctx) = setup();
        let mut shared = SharedObject::new(&ctx);
        shared.allocate().unwrap();
        assert!(shared.allocation().is_none());
        assert_eq!(device.bytes_in_use(), 0);
    }

    #[test]
    fn test_users_dropped_before_binding() {
        let (device, ctx) = setup();
        let mut shared = SharedObject::new(&ctx);
        {
            let t = unallocated_buffer(&ctx, &[16]);
            shared.add_user(&t).unwrap();
        }
        assert_eq!(ctx.live_storages(), 1);
        shared.allocate().unwrap();
        shared.bind_users().unwrap();

        drop(shared);
        assert_eq!(ctx.live_storages(), 0);
        assert_eq!(device.pending_cleanup().len(), 1);
        assert_eq!(device.pending_memory_cleanup().len(), 1);
    }
}
