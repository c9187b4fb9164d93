//! Context configuration and tensor construction parameters

use serde::{Deserialize, Serialize};

use crate::quant::SMALL_SCALE_THRESHOLD;
use crate::types::{AxisMapLayout, MemoryLayout, ScalarType, StorageType};

/// Defaults applied when a tensor request leaves a choice open
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Storage type for tensors that do not request one
    pub storage_type: StorageType,
    /// Memory layout for tensors that do not request one
    pub memory_layout: MemoryLayout,
    /// Axis map policy for tensors that do not request one
    pub axis_map_layout: AxisMapLayout,
    /// Smallest quantization scale before the epsilon clamp kicks in
    pub quant_small_scale_threshold: f32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Texture3D,
            memory_layout: MemoryLayout::ChannelsPacked,
            axis_map_layout: AxisMapLayout::Default,
            quant_small_scale_threshold: SMALL_SCALE_THRESHOLD,
        }
    }
}

impl ContextConfig {
    /// Set the fallback storage type
    #[must_use]
    pub const fn with_storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = storage_type;
        self
    }

    /// Set the fallback memory layout
    #[must_use]
    pub const fn with_memory_layout(mut self, memory_layout: MemoryLayout) -> Self {
        self.memory_layout = memory_layout;
        self
    }

    /// Set the fallback axis map policy
    #[must_use]
    pub const fn with_axis_map_layout(mut self, axis_map_layout: AxisMapLayout) -> Self {
        self.axis_map_layout = axis_map_layout;
        self
    }
}

/// Request for a new owning tensor.
///
/// Unset choices fall back to the context's [`ContextConfig`].
///
/// ```
/// use tesela::{MemoryLayout, ScalarType, StorageType, TensorSpec};
///
/// let spec = TensorSpec::new(&[1, 3, 16, 16])
///     .with_dtype(ScalarType::Half)
///     .with_storage_type(StorageType::Buffer)
///     .with_memory_layout(MemoryLayout::WidthPacked);
/// assert_eq!(spec.sizes(), &[1, 3, 16, 16]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    sizes: Vec<usize>,
    dtype: ScalarType,
    storage_type: Option<StorageType>,
    memory_layout: Option<MemoryLayout>,
    axis_map_layout: Option<AxisMapLayout>,
    allocate_memory: bool,
}

impl TensorSpec {
    /// Float tensor of the given NCHW sizes, backed by memory immediately
    #[must_use]
    pub fn new(sizes: &[usize]) -> Self {
        Self {
            sizes: sizes.to_vec(),
            dtype: ScalarType::Float,
            storage_type: None,
            memory_layout: None,
            axis_map_layout: None,
            allocate_memory: true,
        }
    }

    /// Set the element type
    #[must_use]
    pub fn with_dtype(mut self, dtype: ScalarType) -> Self {
        self.dtype = dtype;
        self
    }

    /// Request a storage type
    #[must_use]
    pub fn with_storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = Some(storage_type);
        self
    }

    /// Request a memory layout
    #[must_use]
    pub fn with_memory_layout(mut self, memory_layout: MemoryLayout) -> Self {
        self.memory_layout = Some(memory_layout);
        self
    }

    /// Request an axis map policy
    #[must_use]
    pub fn with_axis_map_layout(mut self, axis_map_layout: AxisMapLayout) -> Self {
        self.axis_map_layout = Some(axis_map_layout);
        self
    }

    /// Create the storage without memory; it must be bound before use
    #[must_use]
    pub fn unallocated(mut self) -> Self {
        self.allocate_memory = false;
        self
    }

    /// NCHW sizes
    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Element type
    #[must_use]
    pub const fn dtype(&self) -> ScalarType {
        self.dtype
    }

    /// Whether memory is allocated at creation
    #[must_use]
    pub const fn allocate_memory(&self) -> bool {
        self.allocate_memory
    }

    /// Storage type after applying the context fallback
    #[must_use]
    pub fn storage_type_or(&self, config: &ContextConfig) -> StorageType {
        self.storage_type.unwrap_or(config.storage_type)
    }

    /// Memory layout after applying the context fallback
    #[must_use]
    pub fn memory_layout_or(&self, config: &ContextConfig) -> MemoryLayout {
        self.memory_layout.unwrap_or(config.memory_layout)
    }

    /// Axis map policy after applying the context fallback
    #[must_use]
    pub fn axis_map_layout_or(&self, config: &ContextConfig) -> AxisMapLayout {
        self.axis_map_layout.unwrap_or(config.axis_map_layout)
    }
}
