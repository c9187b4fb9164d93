//! Pipeline stages, memory access kinds and the barrier accumulator
//!
//! Consumers describe an upcoming access with a ([`PipelineStage`],
//! [`MemoryAccess`]) pair. Storage resources translate pairs into the stage and
//! access masks recorded in a [`PipelineBarrier`]; the dispatch layer owns the
//! accumulator and flushes it into its command buffer.

use std::ops::BitOr;

use super::{BufferHandle, ImageHandle};

/// Pipeline stage that will touch a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PipelineStage(u8);

impl PipelineStage {
    /// No stage; the initial state of a fresh resource
    pub const NONE: Self = Self(0);
    /// Compute shader dispatch
    pub const COMPUTE: Self = Self(1 << 0);
    /// Host reads/writes through a mapping
    pub const HOST: Self = Self(1 << 1);
    /// Copy commands
    pub const TRANSFER: Self = Self(1 << 2);

    /// True if every bit in `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True for [`PipelineStage::NONE`]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Stage mask bits for this stage; empty if no stage is set
    #[must_use]
    pub const fn stage_mask(self) -> StageMask {
        let mut bits = 0;
        if self.contains(Self::COMPUTE) {
            bits |= StageMask::COMPUTE_SHADER.0;
        }
        if self.contains(Self::HOST) {
            bits |= StageMask::HOST.0;
        }
        if self.contains(Self::TRANSFER) {
            bits |= StageMask::TRANSFER.0;
        }
        StageMask(bits)
    }
}

impl BitOr for PipelineStage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Kind of memory access a consumer intends to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MemoryAccess(u8);

impl MemoryAccess {
    /// No access
    pub const NONE: Self = Self(0);
    /// Read only
    pub const READ: Self = Self(1 << 0);
    /// Write only
    pub const WRITE: Self = Self(1 << 1);
    /// Read and write
    pub const READ_WRITE: Self = Self(Self::READ.0 | Self::WRITE.0);

    /// True if every bit in `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if the access includes a write
    #[must_use]
    pub const fn writes(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    /// True if the access includes a read
    #[must_use]
    pub const fn reads(self) -> bool {
        self.0 & Self::READ.0 != 0
    }
}

impl BitOr for MemoryAccess {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Pipeline stage mask, using the Vulkan bit values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageMask(pub u32);

impl StageMask {
    /// Start of the pipeline
    pub const TOP_OF_PIPE: Self = Self(0x0000_0001);
    /// Compute shader stage
    pub const COMPUTE_SHADER: Self = Self(0x0000_0800);
    /// Transfer stage
    pub const TRANSFER: Self = Self(0x0000_1000);
    /// End of the pipeline
    pub const BOTTOM_OF_PIPE: Self = Self(0x0000_2000);
    /// Host access pseudo-stage
    pub const HOST: Self = Self(0x0000_4000);

    /// True if no bits are set
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit in `other` is set
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for StageMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Memory access mask, using the Vulkan bit values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessMask(pub u32);

impl AccessMask {
    /// Shader reads
    pub const SHADER_READ: Self = Self(0x0000_0020);
    /// Shader writes
    pub const SHADER_WRITE: Self = Self(0x0000_0040);
    /// Copy source reads
    pub const TRANSFER_READ: Self = Self(0x0000_0800);
    /// Copy destination writes
    pub const TRANSFER_WRITE: Self = Self(0x0000_1000);
    /// Host reads
    pub const HOST_READ: Self = Self(0x0000_2000);
    /// Host writes
    pub const HOST_WRITE: Self = Self(0x0000_4000);

    /// Access mask for a (stage, access) pair
    #[must_use]
    pub const fn for_access(stage: PipelineStage, access: MemoryAccess) -> Self {
        let (read, write) = if stage.contains(PipelineStage::COMPUTE) {
            (Self::SHADER_READ, Self::SHADER_WRITE)
        } else if stage.contains(PipelineStage::TRANSFER) {
            (Self::TRANSFER_READ, Self::TRANSFER_WRITE)
        } else if stage.contains(PipelineStage::HOST) {
            (Self::HOST_READ, Self::HOST_WRITE)
        } else {
            return Self(0);
        };

        let mut bits = 0;
        if access.reads() {
            bits |= read.0;
        }
        if access.writes() {
            bits |= write.0;
        }
        Self(bits)
    }
}

/// Image layouts a texture can be transitioned between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageLayout {
    /// Contents undefined; every image starts here
    #[default]
    Undefined,
    /// Usable for any access
    General,
    /// Sampled/read by shaders
    ShaderReadOnly,
    /// Source of a copy
    TransferSrc,
    /// Destination of a copy
    TransferDst,
}

impl ImageLayout {
    /// Layout an image must be in for the given access
    #[must_use]
    pub const fn for_access(stage: PipelineStage, access: MemoryAccess) -> Self {
        if stage.0 == PipelineStage::COMPUTE.0 {
            if access.0 == MemoryAccess::READ.0 {
                Self::ShaderReadOnly
            } else {
                Self::General
            }
        } else if stage.0 == PipelineStage::TRANSFER.0 {
            if access.0 == MemoryAccess::READ.0 {
                Self::TransferSrc
            } else if access.0 == MemoryAccess::WRITE.0 {
                Self::TransferDst
            } else {
                Self::General
            }
        } else {
            Self::General
        }
    }
}

/// Memory barrier on a buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferMemoryBarrier {
    /// Accesses that must complete first
    pub src_access: AccessMask,
    /// Accesses that wait
    pub dst_access: AccessMask,
    /// Buffer being synchronized
    pub buffer: BufferHandle,
}

/// Memory barrier (and optional layout transition) on an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMemoryBarrier {
    /// Accesses that must complete first
    pub src_access: AccessMask,
    /// Accesses that wait
    pub dst_access: AccessMask,
    /// Layout before the barrier
    pub old_layout: ImageLayout,
    /// Layout after the barrier
    pub new_layout: ImageLayout,
    /// Image being synchronized
    pub image: ImageHandle,
}

/// Caller-owned accumulator of pending transitions.
///
/// Stage masks are OR-ed across every recorded barrier; the dispatch layer
/// issues the whole accumulator as one pipeline barrier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineBarrier {
    /// Source stage mask
    pub src_stage: StageMask,
    /// Destination stage mask
    pub dst_stage: StageMask,
    /// Buffer barriers
    pub buffers: Vec<BufferMemoryBarrier>,
    /// Image barriers
    pub images: Vec<ImageMemoryBarrier>,
}

impl PipelineBarrier {
    /// Create an empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded memory barriers
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    /// True if nothing needs to be issued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.images.is_empty()
    }

    /// Merge the stage masks of one transition, substituting top/bottom of
    /// pipe for empty masks
    pub fn add_stages(&mut self, src: StageMask, dst: StageMask) {
        let src = if src.is_empty() { StageMask::TOP_OF_PIPE } else { src };
        let dst = if dst.is_empty() { StageMask::BOTTOM_OF_PIPE } else { dst };
        self.src_stage = self.src_stage | src;
        self.dst_stage = self.dst_stage | dst;
    }

    /// Reset to empty after the dispatch layer has issued the barrier
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
