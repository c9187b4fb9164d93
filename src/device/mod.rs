//! Device seam
//!
//! The tensor layer never talks to a GPU API directly. It asks a [`Device`]
//! for buffers, images and uniform buffers, and hands resources back through
//! the device's deferred-cleanup queue once the last tensor referencing them
//! is gone. The execution layer provides the real implementation;
//! [`RecordingDevice`] is a host-side stand-in that records every call.

pub mod barrier;
mod recording;

pub use barrier::{
    AccessMask, BufferMemoryBarrier, ImageLayout, ImageMemoryBarrier, MemoryAccess,
    PipelineBarrier, PipelineStage, StageMask,
};
pub use recording::RecordingDevice;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{ImageKind, ScalarType, TexelFormat};

/// Device capabilities the layout code depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLimits {
    /// Minimum alignment of uniform buffer binding offsets, in bytes
    pub min_ubo_alignment: u32,
    /// Largest supported 3-D image (width, height, depth)
    pub max_texture_extents_3d: [u32; 3],
    /// Largest supported 2-D image (width, height)
    pub max_texture_extents_2d: [u32; 2],
    /// Whether shaders can address 8-bit integers in storage buffers
    pub int8_buffers_supported: bool,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            min_ubo_alignment: 256,
            max_texture_extents_3d: [2048, 2048, 2048],
            max_texture_extents_2d: [16384, 16384],
            int8_buffers_supported: true,
        }
    }
}

impl DeviceLimits {
    /// Maximum extents for an image of the given kind
    #[must_use]
    pub const fn max_extents(&self, kind: ImageKind) -> [u32; 3] {
        match kind {
            ImageKind::Dim3 => self.max_texture_extents_3d,
            ImageKind::Dim2 => [self.max_texture_extents_2d[0], self.max_texture_extents_2d[1], 1],
        }
    }
}

/// Opaque handle to a device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle {
    id: u64,
    nbytes: u64,
}

impl BufferHandle {
    /// Create a handle; only device implementations should call this
    #[must_use]
    pub const fn new(id: u64, nbytes: u64) -> Self {
        Self { id, nbytes }
    }

    /// Device-assigned identifier
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Size of the buffer in bytes
    #[must_use]
    pub const fn nbytes(&self) -> u64 {
        self.nbytes
    }
}

/// Opaque handle to a device image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    id: u64,
    kind: ImageKind,
    format: TexelFormat,
    extents: [u32; 3],
}

impl ImageHandle {
    /// Create a handle; only device implementations should call this
    #[must_use]
    pub const fn new(id: u64, kind: ImageKind, format: TexelFormat, extents: [u32; 3]) -> Self {
        Self {
            id,
            kind,
            format,
            extents,
        }
    }

    /// Device-assigned identifier
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// 2-D or 3-D
    #[must_use]
    pub const fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Texel format
    #[must_use]
    pub const fn format(&self) -> TexelFormat {
        self.format
    }

    /// Extents in texels (width, height, depth)
    #[must_use]
    pub const fn extents(&self) -> [u32; 3] {
        self.extents
    }
}

/// A buffer or an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuResource {
    /// Linear buffer
    Buffer(BufferHandle),
    /// Image texture
    Image(ImageHandle),
}

/// Parameters for [`Device::create_buffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Number of elements
    pub numel: usize,
    /// Element type
    pub dtype: ScalarType,
    /// Back the buffer with memory immediately
    pub allocate_memory: bool,
}

impl BufferDesc {
    /// Size of the buffer in bytes
    #[must_use]
    pub const fn nbytes(&self) -> u64 {
        (self.numel * self.dtype.element_size()) as u64
    }
}

/// Parameters for [`Device::create_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Extents in texels (width, height, depth)
    pub extents: [u32; 3],
    /// 2-D or 3-D
    pub kind: ImageKind,
    /// Texel format
    pub format: TexelFormat,
    /// Back the image with memory immediately
    pub allocate_memory: bool,
}

/// Memory a resource needs before it can be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryRequirements {
    /// Size in bytes
    pub size: u64,
    /// Required alignment in bytes
    pub alignment: u64,
    /// Bitmask of compatible memory types
    pub memory_type_bits: u32,
}

/// A block of device memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    /// Device-assigned identifier
    pub id: u64,
    /// Size in bytes
    pub size: u64,
    /// Memory types the block was allocated from
    pub memory_type_bits: u32,
}

/// Memory region of a buffer suitable for a descriptor binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBindInfo {
    /// Buffer to bind
    pub buffer: BufferHandle,
    /// Byte offset of the region
    pub offset: u64,
    /// Byte length of the region
    pub range: u64,
}

/// Allocation and deferred-destruction services of an initialized device.
///
/// Methods take `&self`; implementations use interior mutability. All calls
/// happen on the thread that owns the tensor context.
pub trait Device {
    /// Capabilities of the device
    fn limits(&self) -> DeviceLimits;

    /// Create a storage buffer
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::ResourceCreation`](crate::TeselaError) if the
    /// device cannot create or back the buffer.
    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle>;

    /// Create an image
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::ResourceCreation`](crate::TeselaError) if the
    /// device cannot create or back the image.
    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle>;

    /// Create a host-visible uniform buffer of `nbytes`
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot create the buffer.
    fn create_uniform_buffer(&self, nbytes: u32) -> Result<BufferHandle>;

    /// Copy `data` into a uniform buffer at byte `offset`
    ///
    /// # Errors
    ///
    /// Returns an error if the write falls outside the buffer.
    fn write_uniform(&self, buffer: &BufferHandle, offset: u32, data: &[u8]) -> Result<()>;

    /// Memory needed to back a resource created without memory
    fn memory_requirements(&self, resource: &GpuResource) -> MemoryRequirements;

    /// Allocate a block of device memory
    ///
    /// # Errors
    ///
    /// Returns an error if the device is out of memory.
    fn allocate_memory(&self, requirements: &MemoryRequirements) -> Result<Allocation>;

    /// Bind a resource to an allocation at offset 0
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::InvalidAllocation`](crate::TeselaError) if the
    /// allocation is too small or the resource is already backed.
    fn bind_memory(&self, resource: &GpuResource, allocation: &Allocation) -> Result<()>;

    /// Queue a resource for destruction once in-flight work completes
    fn register_cleanup(&self, resource: GpuResource);

    /// Queue a memory block for release once in-flight work completes
    fn register_memory_cleanup(&self, allocation: Allocation);
}
