//! Tesela: Texel-Aware Tensor Layout for GPU Compute Backends
//!
//! **Tesela** (Spanish: "tile") decides how a logical N-dimensional tensor is
//! laid out in GPU memory, either as a linear buffer or as a texture of
//! 4-wide texels, and tracks the synchronization state needed to bind it
//! into compute dispatches safely.
//!
//! # Components
//!
//! - [`layout`] - Pure layout math: dim orders, strides, padded sizes, image extents
//! - [`storage`] - One GPU resource per allocation, last-access tracking, refcounted arena
//! - [`tensor`] - Logical tensors with zero-copy resize/transpose/reconfigure/alias
//! - [`quant`] - Affine quantization parameter selection
//! - [`device`] - The device seam and barrier vocabulary
//! - [`shared`] - Memory planning through shared allocations
//!
//! # Quick Start
//!
//! ```rust
//! use std::rc::Rc;
//! use tesela::{Context, MemoryAccess, PipelineBarrier, PipelineStage, RecordingDevice, Tensor, TensorSpec};
//!
//! let device = Rc::new(RecordingDevice::new());
//! let ctx = Context::with_defaults(device);
//!
//! // Texture3D, channels packed: (C, H, W) = (3, 5, 7)
//! let mut t = Tensor::new(&ctx, &TensorSpec::new(&[3, 5, 7])).unwrap();
//! assert_eq!(t.image_extents(), [7, 5, 1]);
//!
//! // Zero-copy transpose of H and W
//! t.virtual_transpose(1, 2);
//! assert_eq!(t.sizes(), &[3, 7, 5]);
//!
//! // Binding for a shader write records an image layout transition
//! let mut barrier = PipelineBarrier::new();
//! t.image(&mut barrier, PipelineStage::COMPUTE, MemoryAccess::WRITE);
//! assert_eq!(barrier.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// Shader-facing metadata is i32/u32; values are range-checked where it matters
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod layout;
pub mod quant;
pub mod shared;
pub mod storage;
pub mod tensor;
pub mod types;

pub use config::{ContextConfig, TensorSpec};
pub use context::Context;
pub use device::{
    Allocation, BufferBindInfo, BufferHandle, Device, DeviceLimits, GpuResource, ImageHandle,
    ImageLayout, MemoryAccess, MemoryRequirements, PipelineBarrier, PipelineStage,
    RecordingDevice,
};
pub use error::{Result, TeselaError};
pub use layout::AxisMap;
pub use quant::{choose_qparams, QuantParams};
pub use shared::SharedObject;
pub use storage::{LastAccess, StorageHandle, StorageResource};
pub use tensor::{Attribute, Tensor, UniformData};
pub use types::{AxisMapLayout, ImageKind, MemoryLayout, ScalarType, StorageType, TexelFormat};
