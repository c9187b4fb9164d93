//! Logical Tensors
//!
//! A [`Tensor`] is a shape/stride/layout view over a storage resource. Its
//! metadata (sizes, dim order, axis map, packed dim) is owned per tensor even
//! when several tensors alias the same storage, and every derived field is
//! recomputed inside the mutator that changes it.
//!
//! Three ways to build one:
//!
//! - [`Tensor::new`] allocates fresh storage.
//! - [`Tensor::alias`] shares another tensor's storage and copies its metadata.
//! - [`Tensor::reinterpret`] shares a buffer tensor's storage with new sizes,
//!   dim order and element offset.
//!
//! The `virtual_*` mutators change how the storage is interpreted without
//! moving data.

mod uniforms;

pub use uniforms::{Attribute, UniformData, MAX_METADATA_FIELDS, UNIFORM_OFFSET_UNSET};

use std::rc::Rc;

use tracing::{instrument, trace, warn};

use crate::config::TensorSpec;
use crate::context::Context;
use crate::device::{
    Allocation, BufferBindInfo, BufferHandle, GpuResource, ImageHandle, MemoryAccess,
    MemoryRequirements, PipelineBarrier, PipelineStage,
};
use crate::error::{Result, TeselaError};
use crate::layout::{
    align_up_4, calculate_axis_map, calculate_dim_order, calculate_image_extents,
    calculate_padded_sizes, calculate_sizes_from_image, calculate_strides, checked_numel,
    dim_order_is_valid, make_whcn_ivec4, numel, transpose_dim_order_inplace, unsqueeze_strides,
    AxisMap, DEFAULT_AXIS_MAP, MAX_ADDRESSABLE_NUMEL,
};
use crate::storage::{StorageHandle, StorageResource};
use crate::types::{AxisMapLayout, MemoryLayout, ScalarType, StorageType, BATCH_DIM};
use uniforms::UniformBlock;

/// Tensor view over a reference-counted storage resource
#[derive(Debug)]
pub struct Tensor {
    context: Rc<Context>,
    storage: StorageHandle,
    storage_type: StorageType,
    dtype: ScalarType,

    // Core metadata
    sizes: Vec<usize>,
    dim_order: Vec<usize>,
    axis_map: AxisMap,
    packed_dim: usize,
    buffer_offset: usize,

    // Derived metadata
    strides: Vec<usize>,
    padded_sizes: Vec<usize>,
    unsqueezed_strides: Vec<usize>,
    padded_numel: usize,
    uniform_data: UniformData,

    uniforms: UniformBlock,
}

impl Tensor {
    /// Allocate a tensor described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::CapacityExceeded`] if the padded tensor has more
    /// elements than a 32-bit shader index can address,
    /// [`TeselaError::TextureExtentsExceeded`] if a texture would not fit the
    /// device limits, or the device's error if creation fails.
    ///
    /// # Panics
    ///
    /// Panics if texture storage is requested for a tensor of rank above 4.
    #[instrument(level = "debug", skip(ctx, spec), fields(sizes = ?spec.sizes()))]
    pub fn new(ctx: &Rc<Context>, spec: &TensorSpec) -> Result<Self> {
        let config = ctx.config();
        let storage_type = spec.storage_type_or(config);
        let packed_dim = spec.memory_layout_or(config).packed_dim();
        let sizes = spec.sizes().to_vec();

        assert!(
            !storage_type.is_texture() || sizes.len() <= 4,
            "texture storage supports at most 4 dims, got {}",
            sizes.len()
        );

        let dim_order = calculate_dim_order(sizes.len(), packed_dim);
        let axis_map = calculate_axis_map(&sizes, spec.axis_map_layout_or(config));
        let padded_sizes = calculate_padded_sizes(&sizes, packed_dim);
        match checked_numel(&padded_sizes) {
            Some(padded_numel) if padded_numel <= MAX_ADDRESSABLE_NUMEL => {}
            padded_numel => {
                return Err(TeselaError::CapacityExceeded {
                    what: "shader-addressable elements",
                    required: padded_numel
                        .map_or_else(|| format!("{padded_sizes:?}"), |n| n.to_string()),
                    available: MAX_ADDRESSABLE_NUMEL.to_string(),
                });
            }
        }

        let resource = StorageResource::new(
            ctx.device().clone(),
            storage_type,
            &axis_map,
            packed_dim,
            &padded_sizes,
            spec.dtype(),
            spec.allocate_memory(),
        )?;
        let storage = ctx.insert_storage(resource);

        Ok(Self::from_parts(
            ctx,
            storage,
            storage_type,
            spec.dtype(),
            sizes,
            dim_order,
            axis_map,
            packed_dim,
            0,
        ))
    }

    /// Wrap an image created outside the tensor layer.
    ///
    /// Sizes are derived from the image extents; dtype from its format.
    #[must_use]
    pub fn from_image(
        ctx: &Rc<Context>,
        image: ImageHandle,
        memory_layout: MemoryLayout,
        axis_map_layout: AxisMapLayout,
    ) -> Self {
        let packed_dim = memory_layout.packed_dim();
        let sizes = calculate_sizes_from_image(image.extents(), memory_layout);
        let dim_order = calculate_dim_order(sizes.len(), packed_dim);
        let axis_map = calculate_axis_map(&sizes, axis_map_layout);

        let resource = StorageResource::from_image(ctx.device().clone(), image);
        let storage_type = resource.storage_type();
        let dtype = resource.dtype();
        let storage = ctx.insert_storage(resource);

        Self::from_parts(
            ctx, storage, storage_type, dtype, sizes, dim_order, axis_map, packed_dim, 0,
        )
    }

    /// Full alias: share `other`'s storage and copy its metadata.
    ///
    /// The alias gets its own uniform buffer; metadata changes on either
    /// tensor afterwards are independent.
    #[must_use]
    pub fn alias(other: &Tensor) -> Self {
        other.context.retain_storage(other.storage);
        Self::from_parts(
            &other.context,
            other.storage,
            other.storage_type,
            other.dtype,
            other.sizes.clone(),
            other.dim_order.clone(),
            other.axis_map,
            other.packed_dim,
            other.buffer_offset,
        )
    }

    /// Reinterpreting alias: share `other`'s buffer with new sizes and dim
    /// order, starting `offset_numel` elements into the buffer.
    ///
    /// Strides are derived from `sizes` and `dim_order`.
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::CapacityExceeded`] if the view would reach past
    /// the end of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `other` is texture backed, or if `dim_order` is not a
    /// permutation matching the rank of `sizes`.
    pub fn reinterpret(
        other: &Tensor,
        sizes: &[usize],
        dim_order: &[usize],
        offset_numel: usize,
    ) -> Result<Self> {
        assert!(
            other.storage_type == StorageType::Buffer,
            "reinterpreting alias requires buffer storage, got {:?}",
            other.storage_type
        );
        assert_eq!(
            sizes.len(),
            dim_order.len(),
            "dim order rank {} does not match sizes rank {}",
            dim_order.len(),
            sizes.len()
        );
        assert!(dim_order_is_valid(dim_order), "invalid dim order {dim_order:?}");

        let buffer_offset = other.buffer_offset + offset_numel;
        let available = other.buffer_length();
        let required = numel(sizes) + buffer_offset;
        if required > available {
            return Err(TeselaError::CapacityExceeded {
                what: "buffer elements",
                required: required.to_string(),
                available: available.to_string(),
            });
        }

        other.context.retain_storage(other.storage);
        let packed_dim = packed_dim_from_dim_order(dim_order);
        Ok(Self::from_parts(
            &other.context,
            other.storage,
            other.storage_type,
            other.dtype,
            sizes.to_vec(),
            dim_order.to_vec(),
            DEFAULT_AXIS_MAP,
            packed_dim,
            buffer_offset,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn from_parts(
        ctx: &Rc<Context>,
        storage: StorageHandle,
        storage_type: StorageType,
        dtype: ScalarType,
        sizes: Vec<usize>,
        dim_order: Vec<usize>,
        axis_map: AxisMap,
        packed_dim: usize,
        buffer_offset: usize,
    ) -> Self {
        let mut tensor = Self {
            context: Rc::clone(ctx),
            storage,
            storage_type,
            dtype,
            sizes,
            dim_order,
            axis_map,
            packed_dim,
            buffer_offset,
            strides: Vec::new(),
            padded_sizes: Vec::new(),
            unsqueezed_strides: Vec::new(),
            padded_numel: 0,
            uniform_data: UniformData::default(),
            uniforms: UniformBlock::new(ctx.limits().min_ubo_alignment),
        };
        tensor.update_metadata();
        tensor
    }

    // ========================================================================
    // Metadata maintenance
    // ========================================================================

    /// Recompute every derived field from the core metadata and mark written
    /// uniform fields whose value changed.
    fn update_metadata(&mut self) {
        self.strides = calculate_strides(&self.sizes, &self.dim_order);
        if self.storage_type == StorageType::Buffer {
            self.packed_dim = packed_dim_from_dim_order(&self.dim_order);
        }

        let total = numel(&self.sizes);
        self.padded_sizes = calculate_padded_sizes(&self.sizes, self.packed_dim);
        self.unsqueezed_strides = unsqueeze_strides(&self.strides, total);
        self.padded_numel = numel(&self.padded_sizes);

        let logical_limits = if self.storage_type.is_texture() {
            let extents = calculate_image_extents(&self.padded_sizes, &self.axis_map, self.packed_dim);
            [
                extents[self.axis_map[0]],
                extents[self.axis_map[1]],
                extents[self.axis_map[2]],
            ]
        } else {
            [1, 1, 1]
        };

        let new_data = UniformData {
            sizes: make_whcn_ivec4(&self.sizes),
            strides: make_whcn_ivec4(&self.unsqueezed_strides),
            logical_limits: logical_limits.map(|l| l as i32),
            numel: i32::try_from(total).unwrap_or(i32::MAX),
        };
        self.uniforms.invalidate(&self.uniform_data, &new_data);
        self.uniform_data = new_data;

        trace!(
            sizes = ?self.sizes,
            dim_order = ?self.dim_order,
            axis_map = ?self.axis_map,
            packed_dim = self.packed_dim,
            "Recomputed tensor metadata"
        );
    }

    /// Verify that storage can hold a tensor of `sizes` with the current
    /// packing.
    fn check_sizes(&self, sizes: &[usize]) -> Result<()> {
        if self.storage_type.is_texture() {
            let padded = calculate_padded_sizes(sizes, self.packed_dim);
            let virtual_extents = calculate_image_extents(&padded, &self.axis_map, self.packed_dim);
            let extents = self.image_extents();
            if virtual_extents.iter().zip(extents.iter()).any(|(v, e)| v > e) {
                return Err(TeselaError::CapacityExceeded {
                    what: "image extents",
                    required: format!("{virtual_extents:?}"),
                    available: format!("{extents:?}"),
                });
            }
        } else {
            let required = numel(sizes) + self.buffer_offset;
            let available = self.buffer_length();
            if required > available {
                return Err(TeselaError::CapacityExceeded {
                    what: "buffer elements",
                    required: required.to_string(),
                    available: available.to_string(),
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // Virtual operations
    // ========================================================================

    /// Change the sizes without touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::CapacityExceeded`] if the storage is too small
    /// for `new_sizes`; the tensor is left unchanged.
    ///
    /// # Panics
    ///
    /// Panics if `new_sizes` has a different rank.
    #[instrument(level = "trace", skip(self))]
    pub fn virtual_resize(&mut self, new_sizes: &[usize]) -> Result<()> {
        assert_eq!(
            new_sizes.len(),
            self.sizes.len(),
            "virtual_resize cannot change rank from {} to {}",
            self.sizes.len(),
            new_sizes.len()
        );
        if let Err(err) = self.check_sizes(new_sizes) {
            warn!(sizes = ?new_sizes, %err, "Rejected virtual resize");
            return Err(err);
        }

        self.sizes.copy_from_slice(new_sizes);
        self.update_metadata();
        Ok(())
    }

    /// Swap two dims (NCHW indices) by editing metadata only.
    ///
    /// Sizes and dim order are always swapped. For texture storage the axis
    /// map entries of the two dims are swapped too, which keeps the image
    /// extents unchanged.
    ///
    /// # Panics
    ///
    /// Panics if either dim is out of range, or if a texture tensor would
    /// transpose its batch dim. Not transposing the batch dim is a
    /// precondition of texture tensors: the batch dim has no axis map entry
    /// of its own to swap.
    #[instrument(level = "trace", skip(self))]
    pub fn virtual_transpose(&mut self, dim0: usize, dim1: usize) {
        let ndim = self.sizes.len();
        assert!(
            dim0 < ndim && dim1 < ndim,
            "transpose dims ({dim0}, {dim1}) out of range for rank {ndim}"
        );

        let dim0_whcn = ndim - 1 - dim0;
        let dim1_whcn = ndim - 1 - dim1;
        let texture = self.storage_type.is_texture();
        assert!(
            !texture || (dim0_whcn < BATCH_DIM && dim1_whcn < BATCH_DIM),
            "texture storage cannot transpose the batch dim"
        );

        self.sizes.swap(dim0, dim1);
        transpose_dim_order_inplace(&mut self.dim_order, dim0, dim1);

        if self.packed_dim == dim0_whcn {
            self.packed_dim = dim1_whcn;
        } else if self.packed_dim == dim1_whcn {
            self.packed_dim = dim0_whcn;
        }

        if texture {
            self.axis_map.swap(dim0_whcn, dim1_whcn);
            let concat = &mut self.axis_map[BATCH_DIM];
            if *concat == dim0_whcn {
                *concat = dim1_whcn;
            } else if *concat == dim1_whcn {
                *concat = dim0_whcn;
            }
        }

        self.update_metadata();
    }

    /// Replace sizes and dim order wholesale; the rank may change.
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::CapacityExceeded`] if the buffer is too small.
    ///
    /// # Panics
    ///
    /// Panics on texture storage, or if `new_dim_order` is not a permutation
    /// matching the rank of `new_sizes`.
    #[instrument(level = "trace", skip(self))]
    pub fn virtual_reconfigure(&mut self, new_sizes: &[usize], new_dim_order: &[usize]) -> Result<()> {
        assert!(
            self.storage_type == StorageType::Buffer,
            "virtual_reconfigure requires buffer storage, got {:?}",
            self.storage_type
        );
        assert_eq!(
            new_sizes.len(),
            new_dim_order.len(),
            "dim order rank {} does not match sizes rank {}",
            new_dim_order.len(),
            new_sizes.len()
        );
        assert!(dim_order_is_valid(new_dim_order), "invalid dim order {new_dim_order:?}");
        self.check_sizes(new_sizes)?;

        self.sizes = new_sizes.to_vec();
        self.dim_order = new_dim_order.to_vec();
        self.update_metadata();
        Ok(())
    }

    /// Copy sizes, dim order, axis map and packed dim from `other`.
    ///
    /// # Panics
    ///
    /// Panics unless both tensors view the same storage.
    #[instrument(level = "trace", skip_all)]
    pub fn virtual_clone(&mut self, other: &Tensor) {
        assert!(self.is_view_of(other), "virtual_clone requires tensors sharing storage");
        self.sizes.clone_from(&other.sizes);
        self.dim_order.clone_from(&other.dim_order);
        self.axis_map = other.axis_map;
        self.packed_dim = other.packed_dim;
        self.buffer_offset = other.buffer_offset;
        self.update_metadata();
    }

    // ========================================================================
    // Synchronized access
    // ========================================================================

    /// Buffer region for binding into a dispatch that accesses it at
    /// `stage` with `access`. Records any required barrier into `barrier`.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is texture backed.
    pub fn buffer(
        &self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) -> BufferBindInfo {
        let buffer = self
            .buffer_handle()
            .unwrap_or_else(|| panic!("buffer() called on {:?} storage", self.storage_type));
        self.context
            .with_storage_mut(self.storage, |s| s.transition(barrier, stage, access));

        let element_size = self.dtype.element_size() as u64;
        BufferBindInfo {
            buffer,
            offset: self.buffer_offset as u64 * element_size,
            range: numel(&self.sizes) as u64 * element_size,
        }
    }

    /// Image for binding into a dispatch that accesses it at `stage` with
    /// `access`. Records any required barrier (including a layout
    /// transition) into `barrier`.
    ///
    /// # Panics
    ///
    /// Panics if the tensor is buffer backed.
    pub fn image(
        &self,
        barrier: &mut PipelineBarrier,
        stage: PipelineStage,
        access: MemoryAccess,
    ) -> ImageHandle {
        let image = self
            .image_handle()
            .unwrap_or_else(|| panic!("image() called on {:?} storage", self.storage_type));
        self.context
            .with_storage_mut(self.storage, |s| s.transition(barrier, stage, access));
        image
    }

    /// Buffer handle for metadata inspection only; never bind it without
    /// going through [`Tensor::buffer`]
    #[must_use]
    pub fn buffer_handle(&self) -> Option<BufferHandle> {
        self.context.with_storage(self.storage, StorageResource::buffer)
    }

    /// Image handle for metadata inspection only; never bind it without
    /// going through [`Tensor::image`]
    #[must_use]
    pub fn image_handle(&self) -> Option<ImageHandle> {
        self.context.with_storage(self.storage, StorageResource::image)
    }

    // ========================================================================
    // Uniform buffers
    // ========================================================================

    /// Sizes field of the metadata uniform buffer
    ///
    /// # Errors
    ///
    /// Returns the device's error if the uniform buffer cannot be created or
    /// written.
    pub fn sizes_ubo(&mut self) -> Result<BufferBindInfo> {
        self.metadata_ubo(Attribute::Sizes)
    }

    /// Unsqueezed strides field of the metadata uniform buffer
    ///
    /// # Errors
    ///
    /// Returns the device's error if the uniform buffer cannot be created or
    /// written.
    pub fn strides_ubo(&mut self) -> Result<BufferBindInfo> {
        self.metadata_ubo(Attribute::Strides)
    }

    /// Logical limits field of the metadata uniform buffer
    ///
    /// # Errors
    ///
    /// Returns the device's error if the uniform buffer cannot be created or
    /// written.
    pub fn logical_limits_ubo(&mut self) -> Result<BufferBindInfo> {
        self.metadata_ubo(Attribute::LogicalLimits)
    }

    /// Element count field of the metadata uniform buffer
    ///
    /// # Errors
    ///
    /// Returns the device's error if the uniform buffer cannot be created or
    /// written.
    pub fn numel_ubo(&mut self) -> Result<BufferBindInfo> {
        self.metadata_ubo(Attribute::Numel)
    }

    fn metadata_ubo(&mut self, attr: Attribute) -> Result<BufferBindInfo> {
        self.uniforms
            .bind_info(self.context.device().as_ref(), attr, &self.uniform_data)
    }

    /// Byte offset of a metadata field in the uniform buffer, or
    /// [`UNIFORM_OFFSET_UNSET`] if it has not been requested yet
    #[must_use]
    pub fn uniform_offset(&self, attr: Attribute) -> u32 {
        self.uniforms.offset(attr)
    }

    /// Host copy of the metadata shaders read
    #[must_use]
    pub const fn uniform_data(&self) -> &UniformData {
        &self.uniform_data
    }

    /// Copy one metadata field into `dst` at `dst_offset`, returning the
    /// number of bytes written
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::UniformBufferFull`] if the field does not fit.
    pub fn write_attribute(&self, dst: &mut [u8], dst_offset: usize, attr: Attribute) -> Result<usize> {
        self.uniform_data.write_attribute(dst, dst_offset, attr)
    }

    // ========================================================================
    // Memory binding
    // ========================================================================

    /// Memory needed to back storage created without memory
    #[must_use]
    pub fn memory_requirements(&self) -> MemoryRequirements {
        self.context
            .with_storage(self.storage, StorageResource::memory_requirements)
    }

    /// Back storage created without memory
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::InvalidAllocation`] if the storage is already
    /// backed or the allocation is too small.
    pub fn bind_allocation(&self, allocation: &Allocation) -> Result<()> {
        self.context
            .with_storage_mut(self.storage, |s| s.bind_allocation(allocation))
    }

    /// True once the storage is backed by memory
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.context.with_storage(self.storage, StorageResource::is_bound)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Context the tensor was created in
    #[must_use]
    pub fn context(&self) -> &Rc<Context> {
        &self.context
    }

    /// Handle of the shared storage record
    #[must_use]
    pub const fn storage_handle(&self) -> StorageHandle {
        self.storage
    }

    /// Device object backing the tensor
    #[must_use]
    pub fn resource(&self) -> GpuResource {
        self.context.with_storage(self.storage, StorageResource::resource)
    }

    /// Storage type
    #[must_use]
    pub const fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// True for texture storage
    #[must_use]
    pub const fn has_texture_storage(&self) -> bool {
        self.storage_type.is_texture()
    }

    /// Element type
    #[must_use]
    pub const fn dtype(&self) -> ScalarType {
        self.dtype
    }

    /// NCHW sizes
    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Size of one NCHW dim
    ///
    /// # Panics
    ///
    /// Panics if `dim` is out of range.
    #[must_use]
    pub fn size(&self, dim: usize) -> usize {
        self.sizes[dim]
    }

    /// Rank
    #[must_use]
    pub fn dim(&self) -> usize {
        self.sizes.len()
    }

    /// Dim order (NCHW indices, fastest-varying last)
    #[must_use]
    pub fn dim_order(&self) -> &[usize] {
        &self.dim_order
    }

    /// Axis map
    #[must_use]
    pub const fn axis_map(&self) -> &AxisMap {
        &self.axis_map
    }

    /// WHCN index of the packed dim
    #[must_use]
    pub const fn packed_dim(&self) -> usize {
        self.packed_dim
    }

    /// WHCN index of the dim batches are concatenated along
    #[must_use]
    pub const fn concat_dim(&self) -> usize {
        self.axis_map[BATCH_DIM]
    }

    /// True if W, H and C map to X, Y and Z
    #[must_use]
    pub const fn has_standard_axis_map(&self) -> bool {
        self.axis_map[0] == 0 && self.axis_map[1] == 1 && self.axis_map[2] == 2
    }

    /// Axis map and packed dim packed into one specialization constant:
    /// 4 bits per axis map entry, packed dim from bit 16
    #[must_use]
    pub const fn hashed_layout(&self) -> i32 {
        (self.axis_map[0]
            + (self.axis_map[1] << 4)
            + (self.axis_map[2] << 8)
            + (self.axis_map[3] << 12)
            + (self.packed_dim << 16)) as i32
    }

    /// Memory layout implied by the packed dim
    ///
    /// # Panics
    ///
    /// Panics if the packed dim is the batch dim or beyond.
    #[must_use]
    pub fn estimate_memory_layout(&self) -> MemoryLayout {
        MemoryLayout::from_packed_dim(self.packed_dim)
            .unwrap_or_else(|| panic!("no memory layout packs WHCN dim {}", self.packed_dim))
    }

    /// Strides (NCHW)
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Strides padded to a multiple of 4 entries
    #[must_use]
    pub fn unsqueezed_strides(&self) -> &[usize] {
        &self.unsqueezed_strides
    }

    /// Sizes with rank and packed dim padded to multiples of 4
    #[must_use]
    pub fn padded_sizes(&self) -> &[usize] {
        &self.padded_sizes
    }

    /// Number of elements
    #[must_use]
    pub fn numel(&self) -> usize {
        numel(&self.sizes)
    }

    /// Number of elements including padding
    #[must_use]
    pub const fn padded_numel(&self) -> usize {
        self.padded_numel
    }

    /// Size of the logical elements in bytes
    #[must_use]
    pub fn nbytes(&self) -> usize {
        self.dtype.element_size() * self.numel()
    }

    /// Element offset into a shared buffer
    #[must_use]
    pub const fn buffer_offset(&self) -> usize {
        self.buffer_offset
    }

    /// Capacity of the backing buffer in elements; 0 for textures
    #[must_use]
    pub fn buffer_length(&self) -> usize {
        self.context
            .with_storage(self.storage, StorageResource::buffer_length)
    }

    /// Extents of the backing image; `[1, 1, 1]` for buffers
    #[must_use]
    pub fn image_extents(&self) -> [u32; 3] {
        self.context
            .with_storage(self.storage, StorageResource::image_extents)
    }

    /// Image-space bounds after axis-map permutation. Shrinks below the
    /// allocated extents after a shrinking virtual resize.
    #[must_use]
    pub fn logical_limits(&self) -> [u32; 3] {
        self.uniform_data.logical_limits.map(|l| l as u32)
    }

    /// Elements in a host staging buffer for this tensor.
    ///
    /// Int8 tensors on devices without 8-bit buffer support round up to a
    /// whole number of 32-bit words.
    #[must_use]
    pub fn staging_buffer_numel(&self) -> usize {
        if self.dtype.is_int8() && !self.context.limits().int8_buffers_supported {
            align_up_4(self.numel())
        } else if self.storage_type == StorageType::Buffer {
            self.numel()
        } else {
            self.padded_numel
        }
    }

    /// Bytes in a host staging buffer for this tensor
    #[must_use]
    pub fn staging_buffer_nbytes(&self) -> usize {
        self.dtype.element_size() * self.staging_buffer_numel()
    }

    /// True if both tensors view the same storage resource
    #[must_use]
    pub fn is_view_of(&self, other: &Tensor) -> bool {
        Rc::ptr_eq(&self.context, &other.context) && self.storage == other.storage
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        if let Some(buffer) = self.uniforms.buffer() {
            self.context
                .device()
                .register_cleanup(GpuResource::Buffer(buffer));
        }
        self.context.release_storage(self.storage);
    }
}

/// WHCN packed dim of a buffer tensor: its fastest-varying dim
fn packed_dim_from_dim_order(dim_order: &[usize]) -> usize {
    match dim_order.last() {
        Some(&last) if dim_order.len() > last => dim_order.len() - 1 - last,
        _ => 0,
    }
}
