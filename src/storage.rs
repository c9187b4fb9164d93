//! Storage Resources
//!
//! A [`StorageResource`] owns exactly one device buffer or image and the
//! synchronization state of that object. Logical tensors never own a resource
//! directly; they hold a [`StorageHandle`] into the context's
//! [`StorageArena`], which reference-counts records and drops a resource once
//! the last tensor viewing it is gone. Dropping a resource hands the device
//! object to the device's deferred-cleanup queue.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::device::{
    AccessMask, Allocation, BufferDesc, BufferHandle, BufferMemoryBarrier, Device, GpuResource,
    ImageDesc, ImageHandle, ImageLayout, ImageMemoryBarrier, MemoryAccess, MemoryRequirements,
    PipelineBarrier, PipelineStage,
};
use crate::error::{Result, TeselaError};
use crate::layout::{calculate_image_extents, numel, AxisMap};
use crate::types::{ImageKind, ScalarType, StorageType};

/// Most recent access to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LastAccess {
    /// Stage of the access
    pub stage: PipelineStage,
    /// Kind of the access
    pub access: MemoryAccess,
}

// ============================================================================
// Storage Resource
// ============================================================================

/// One physical GPU allocation and its last-access state.
///
/// Not `Clone`: a device object has exactly one owner record.
pub struct StorageResource {
    device: Rc<dyn Device>,
    storage_type: StorageType,
    resource: GpuResource,
    image_extents: [u32; 3],
    buffer_length: usize,
    dtype: ScalarType,
    last_access: LastAccess,
    image_layout: ImageLayout,
    bound: bool,
}

impl std::fmt::Debug for StorageResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageResource")
            .field("storage_type", &self.storage_type)
            .field("resource", &self.resource)
            .field("image_extents", &self.image_extents)
            .field("buffer_length", &self.buffer_length)
            .field("dtype", &self.dtype)
            .field("last_access", &self.last_access)
            .field("image_layout", &self.image_layout)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl StorageResource {
    /// Create a resource large enough for `padded_sizes`.
    ///
    /// Buffers hold the product of the padded sizes in elements. Images get
    /// the extents from [`calculate_image_extents`], which are checked against
    /// the device limits. With `allocate_memory == false` the object exists
    /// without backing memory until [`StorageResource::bind_allocation`].
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::TextureExtentsExceeded`] if the image would be
    /// larger than the device supports (a 2-D image with depth above 1
    /// included), or any error the device reports while creating the object.
    pub fn new(
        device: Rc<dyn Device>,
        storage_type: StorageType,
        axis_map: &AxisMap,
        packed_dim: usize,
        padded_sizes: &[usize],
        dtype: ScalarType,
        allocate_memory: bool,
    ) -> Result<Self> {
        let (resource, image_extents, buffer_length) = match storage_type.image_kind() {
            None => {
                let buffer_length = numel(padded_sizes);
                let buffer = device.create_buffer(&BufferDesc {
                    numel: buffer_length,
                    dtype,
                    allocate_memory,
                })?;
                (GpuResource::Buffer(buffer), [1, 1, 1], buffer_length)
            }
            Some(kind) => {
                let extents = calculate_image_extents(padded_sizes, axis_map, packed_dim);
                let limits = device.limits().max_extents(kind);
                if extents.iter().zip(limits.iter()).any(|(e, l)| e > l) {
                    return Err(TeselaError::TextureExtentsExceeded { extents, limits });
                }
                let image = device.create_image(&ImageDesc {
                    extents,
                    kind,
                    format: dtype.texel_format(),
                    allocate_memory,
                })?;
                (GpuResource::Image(image), extents, 0)
            }
        };

        debug!(
            ?storage_type,
            ?image_extents,
            buffer_length,
            allocate_memory,
            "Created storage resource"
        );

        Ok(Self {
            device,
            storage_type,
            resource,
            image_extents,
            buffer_length,
            dtype,
            last_access: LastAccess::default(),
            image_layout: ImageLayout::Undefined,
            bound: allocate_memory,
        })
    }

    /// Wrap an image created outside the tensor layer.
    ///
    /// Extents are taken from the image as-is; the image is assumed to be
    /// backed by memory.
    #[must_use]
    pub fn from_image(device: Rc<dyn Device>, image: ImageHandle) -> Self {
        let storage_type = match image.kind() {
            ImageKind::Dim2 => StorageType::Texture2D,
            ImageKind::Dim3 => StorageType::Texture3D,
        };
        Self {
            device,
            storage_type,
            resource: GpuResource::Image(image),
            image_extents: image.extents(),
            buffer_length: 0,
            dtype: image.format().scalar_type(),
            last_access: LastAccess::default(),
            image_layout: ImageLayout::Undefined,
            bound: true,
        }
    }

    /// Record the barrier needed before the next access and update the
    /// last-access state.
    ///
    /// A barrier is appended when the previous access wrote to the resource,
    /// or when an image must change layout. Read-after-read on a buffer and
    /// the first access of a buffer record nothing.
    pub fn transition(
        &mut self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) {
        let prev = self.last_access;
        let new_layout = ImageLayout::for_access(stage, access);
        let layout_changed =
            matches!(self.resource, GpuResource::Image(_)) && new_layout != self.image_layout;

        if prev.access.writes() || layout_changed {
            barrier.add_stages(prev.stage.stage_mask(), stage.stage_mask());
            let src_access = AccessMask::for_access(prev.stage, prev.access);
            let dst_access = AccessMask::for_access(stage, access);

            match self.resource {
                GpuResource::Buffer(buffer) => barrier.buffers.push(BufferMemoryBarrier {
                    src_access,
                    dst_access,
                    buffer,
                }),
                GpuResource::Image(image) => {
                    barrier.images.push(ImageMemoryBarrier {
                        src_access,
                        dst_access,
                        old_layout: self.image_layout,
                        new_layout,
                        image,
                    });
                    self.image_layout = new_layout;
                }
            }
            trace!(
                resource = ?self.resource,
                ?prev,
                ?stage,
                ?access,
                "Recorded barrier"
            );
        }

        self.last_access = LastAccess { stage, access };
    }

    /// Memory needed to back this resource
    #[must_use]
    pub fn memory_requirements(&self) -> MemoryRequirements {
        self.device.memory_requirements(&self.resource)
    }

    /// Back a resource created without memory with `allocation`.
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::InvalidAllocation`] if the resource is already
    /// backed or the device rejects the allocation.
    pub fn bind_allocation(&mut self, allocation: &Allocation) -> Result<()> {
        if self.bound {
            return Err(TeselaError::InvalidAllocation(
                "storage resource is already backed by memory".to_string(),
            ));
        }
        self.device.bind_memory(&self.resource, allocation)?;
        self.bound = true;
        debug!(resource = ?self.resource, allocation = allocation.id, "Bound storage resource");
        Ok(())
    }

    /// Buffer, texture 3-D or texture 2-D
    #[must_use]
    pub const fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// Underlying device object
    #[must_use]
    pub const fn resource(&self) -> GpuResource {
        self.resource
    }

    /// Buffer handle, if buffer backed
    #[must_use]
    pub const fn buffer(&self) -> Option<BufferHandle> {
        match self.resource {
            GpuResource::Buffer(b) => Some(b),
            GpuResource::Image(_) => None,
        }
    }

    /// Image handle, if texture backed
    #[must_use]
    pub const fn image(&self) -> Option<ImageHandle> {
        match self.resource {
            GpuResource::Image(i) => Some(i),
            GpuResource::Buffer(_) => None,
        }
    }

    /// Image extents; `[1, 1, 1]` for buffers
    #[must_use]
    pub const fn image_extents(&self) -> [u32; 3] {
        self.image_extents
    }

    /// Buffer capacity in elements; 0 for images
    #[must_use]
    pub const fn buffer_length(&self) -> usize {
        self.buffer_length
    }

    /// Element type the resource was created for
    #[must_use]
    pub const fn dtype(&self) -> ScalarType {
        self.dtype
    }

    /// Most recent access
    #[must_use]
    pub const fn last_access(&self) -> LastAccess {
        self.last_access
    }

    /// Current image layout; always `Undefined` for buffers
    #[must_use]
    pub const fn image_layout(&self) -> ImageLayout {
        self.image_layout
    }

    /// True once the resource is backed by memory
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.bound
    }
}

impl Drop for StorageResource {
    fn drop(&mut self) {
        debug!(resource = ?self.resource, "Registering storage resource for deferred cleanup");
        self.device.register_cleanup(self.resource);
    }
}

// ============================================================================
// Storage Arena
// ============================================================================

/// Handle to a reference-counted record in a [`StorageArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageHandle(u64);

impl StorageHandle {
    /// Raw identifier
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct StorageRecord {
    resource: StorageResource,
    refcount: usize,
}

/// Arena of storage resources with explicit reference counts
#[derive(Debug, Default)]
pub struct StorageArena {
    records: HashMap<StorageHandle, StorageRecord>,
    next_id: u64,
}

impl StorageArena {
    /// Create an empty arena
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `resource` with a reference count of 1
    pub fn insert(&mut self, resource: StorageResource) -> StorageHandle {
        let handle = StorageHandle(self.next_id);
        self.next_id += 1;
        self.records.insert(
            handle,
            StorageRecord {
                resource,
                refcount: 1,
            },
        );
        handle
    }

    /// Add a reference
    ///
    /// # Panics
    ///
    /// Panics if the handle is not live.
    pub fn retain(&mut self, handle: StorageHandle) {
        self.record_mut(handle).refcount += 1;
    }

    /// Drop a reference. Returns the resource when the count reaches zero so
    /// the caller can drop it outside any borrow of the arena.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not live.
    pub fn release(&mut self, handle: StorageHandle) -> Option<StorageResource> {
        let record = self.record_mut(handle);
        record.refcount -= 1;
        if record.refcount == 0 {
            self.records.remove(&handle).map(|r| r.resource)
        } else {
            None
        }
    }

    /// Resource behind `handle`
    ///
    /// # Panics
    ///
    /// Panics if the handle is not live.
    #[must_use]
    pub fn get(&self, handle: StorageHandle) -> &StorageResource {
        match self.records.get(&handle) {
            Some(record) => &record.resource,
            None => panic!("storage handle {} is not live", handle.0),
        }
    }

    /// Mutable resource behind `handle`
    ///
    /// # Panics
    ///
    /// Panics if the handle is not live.
    pub fn get_mut(&mut self, handle: StorageHandle) -> &mut StorageResource {
        &mut self.record_mut(handle).resource
    }

    /// Current reference count, 0 if the handle is not live
    #[must_use]
    pub fn refcount(&self, handle: StorageHandle) -> usize {
        self.records.get(&handle).map_or(0, |r| r.refcount)
    }

    /// Number of live records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no records are live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_mut(&mut self, handle: StorageHandle) -> &mut StorageRecord {
        match self.records.get_mut(&handle) {
            Some(record) => record,
            None => panic!("storage handle {} is not live", handle.0),
        }
    }
}
