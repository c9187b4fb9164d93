//! GPU-visible tensor metadata
//!
//! [`UniformData`] mirrors the four metadata fields shaders read. Each field is
//! written into its own slot of a per-tensor uniform buffer the first time a
//! shader binding asks for it; the buffer itself is created on the first
//! request for any field.

use bytemuck::{Pod, Zeroable};

use crate::device::{BufferBindInfo, BufferHandle, Device};
use crate::error::{Result, TeselaError};

/// Offset value meaning "field not yet written". A real offset is always a
/// multiple of the slot size, so 1 can never collide with one.
pub const UNIFORM_OFFSET_UNSET: u32 = 1;

/// Number of metadata fields a tensor can expose
pub const MAX_METADATA_FIELDS: usize = 4;

/// Metadata field exposed to shaders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Sizes as a WHCN `ivec4`
    Sizes,
    /// Unsqueezed strides as a WHCN `ivec4`
    Strides,
    /// Logical limits as an `ivec3`
    LogicalLimits,
    /// Element count as an `int`
    Numel,
}

impl Attribute {
    /// All attributes, in slot index order
    pub const ALL: [Self; MAX_METADATA_FIELDS] =
        [Self::Sizes, Self::Strides, Self::LogicalLimits, Self::Numel];

    /// Size of the field in bytes
    #[must_use]
    pub const fn nbytes(self) -> usize {
        match self {
            Self::Sizes | Self::Strides => 16,
            Self::LogicalLimits => 12,
            Self::Numel => 4,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Sizes => 0,
            Self::Strides => 1,
            Self::LogicalLimits => 2,
            Self::Numel => 3,
        }
    }
}

/// Host copy of the metadata shaders read
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct UniformData {
    /// Sizes in WHCN order, missing dims reported as 1
    pub sizes: [i32; 4],
    /// Unsqueezed strides in WHCN order
    pub strides: [i32; 4],
    /// Logical limits (X, Y, Z) after axis-map permutation
    pub logical_limits: [i32; 3],
    /// Number of elements
    pub numel: i32,
}

impl UniformData {
    /// Bytes of one field
    #[must_use]
    pub fn field_bytes(&self, attr: Attribute) -> &[u8] {
        match attr {
            Attribute::Sizes => bytemuck::bytes_of(&self.sizes),
            Attribute::Strides => bytemuck::bytes_of(&self.strides),
            Attribute::LogicalLimits => bytemuck::bytes_of(&self.logical_limits),
            Attribute::Numel => bytemuck::bytes_of(&self.numel),
        }
    }

    /// Copy one field into `dst` at `dst_offset`, returning the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`TeselaError::UniformBufferFull`] if the field does not fit.
    pub fn write_attribute(&self, dst: &mut [u8], dst_offset: usize, attr: Attribute) -> Result<usize> {
        let bytes = self.field_bytes(attr);
        let end = dst_offset + bytes.len();
        if end > dst.len() {
            return Err(TeselaError::UniformBufferFull {
                used: end as u32,
                capacity: dst.len() as u32,
            });
        }
        dst[dst_offset..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }
}

/// Lazily created uniform buffer holding one slot per field
#[derive(Debug)]
pub(crate) struct UniformBlock {
    buffer: Option<BufferHandle>,
    slot_size: u32,
    next_offset: u32,
    offsets: [u32; MAX_METADATA_FIELDS],
    stale: [bool; MAX_METADATA_FIELDS],
}

impl UniformBlock {
    /// Slots are aligned to the device's minimum binding alignment
    pub(crate) fn new(min_ubo_alignment: u32) -> Self {
        Self {
            buffer: None,
            slot_size: min_ubo_alignment.max(16),
            next_offset: 0,
            offsets: [UNIFORM_OFFSET_UNSET; MAX_METADATA_FIELDS],
            stale: [false; MAX_METADATA_FIELDS],
        }
    }

    /// Total buffer size
    pub(crate) fn capacity(&self) -> u32 {
        self.slot_size * MAX_METADATA_FIELDS as u32
    }

    pub(crate) fn buffer(&self) -> Option<BufferHandle> {
        self.buffer
    }

    /// Byte offset of a field, or [`UNIFORM_OFFSET_UNSET`]
    pub(crate) fn offset(&self, attr: Attribute) -> u32 {
        self.offsets[attr.index()]
    }

    /// Mark written fields whose value differs between `old` and `new`
    pub(crate) fn invalidate(&mut self, old: &UniformData, new: &UniformData) {
        for attr in Attribute::ALL {
            let i = attr.index();
            if self.offsets[i] != UNIFORM_OFFSET_UNSET && old.field_bytes(attr) != new.field_bytes(attr) {
                self.stale[i] = true;
            }
        }
    }

    /// True if a written field must be rewritten before the next binding
    pub(crate) fn is_stale(&self, attr: Attribute) -> bool {
        self.stale[attr.index()]
    }

    /// Binding region for `attr`, writing the field first if it has never
    /// been written or is stale.
    pub(crate) fn bind_info(
        &mut self,
        device: &dyn Device,
        attr: Attribute,
        data: &UniformData,
    ) -> Result<BufferBindInfo> {
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => {
                let buffer = device.create_uniform_buffer(self.capacity())?;
                tracing::debug!(id = buffer.id(), nbytes = self.capacity(), "Created metadata uniform buffer");
                self.buffer = Some(buffer);
                buffer
            }
        };

        let i = attr.index();
        if self.offsets[i] == UNIFORM_OFFSET_UNSET {
            if self.next_offset + self.slot_size > self.capacity() {
                return Err(TeselaError::UniformBufferFull {
                    used: self.next_offset,
                    capacity: self.capacity(),
                });
            }
            device.write_uniform(&buffer, self.next_offset, data.field_bytes(attr))?;
            self.offsets[i] = self.next_offset;
            self.next_offset += self.slot_size;
        } else if self.stale[i] {
            device.write_uniform(&buffer, self.offsets[i], data.field_bytes(attr))?;
        }
        self.stale[i] = false;

        Ok(BufferBindInfo {
            buffer,
            offset: u64::from(self.offsets[i]),
            range: attr.nbytes() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;

    fn sample() -> UniformData {
        UniformData {
            sizes: [7, 5, 3, 1],
            strides: [1, 7, 35, i32::MAX],
            logical_limits: [7, 5, 1],
            numel: 105,
        }
    }

    #[test]
    fn test_layout_is_packed() {
        assert_eq!(std::mem::size_of::<UniformData>(), 48);
        let total: usize = Attribute::ALL.iter().map(|a| a.nbytes()).sum();
        assert_eq!(total, 48);
    }

    #[test]
    fn test_write_attribute() {
        let data = sample();
        let mut dst = [0u8; 32];
        let written = data.write_attribute(&mut dst, 16, Attribute::Numel).unwrap();
        assert_eq!(written, 4);
        assert_eq!(&dst[16..20], &105i32.to_ne_bytes());
    }

    #[test]
    fn test_write_attribute_overflow() {
        let data = sample();
        let mut dst = [0u8; 20];
        let err = data.write_attribute(&mut dst, 8, Attribute::Sizes).unwrap_err();
        assert_eq!(
            err,
            TeselaError::UniformBufferFull {
                used: 24,
                capacity: 20,
            }
        );
    }

    #[test]
    fn test_offsets_assigned_in_request_order() {
        let device = RecordingDevice::new();
        let mut block = UniformBlock::new(64);
        let data = sample();

        assert_eq!(block.offset(Attribute::Numel), UNIFORM_OFFSET_UNSET);
        let numel = block.bind_info(&device, Attribute::Numel, &data).unwrap();
        let sizes = block.bind_info(&device, Attribute::Sizes, &data).unwrap();
        assert_eq!(numel.offset, 0);
        assert_eq!(numel.range, 4);
        assert_eq!(sizes.offset, 64);
        assert_eq!(sizes.buffer, numel.buffer);
        assert_eq!(block.capacity(), 256);

        let contents = device.uniform_contents(&sizes.buffer).unwrap();
        assert_eq!(&contents[64..80], bytemuck::bytes_of(&data.sizes));
    }

    #[test]
    fn test_small_alignment_rounds_up() {
        let block = UniformBlock::new(4);
        assert_eq!(block.capacity(), 64);
    }

    #[test]
    fn test_invalidate_rewrites_changed_fields() {
        let device = RecordingDevice::new();
        let mut block = UniformBlock::new(16);
        let old = sample();
        let sizes = block.bind_info(&device, Attribute::Sizes, &old).unwrap();

        let mut new = old;
        new.sizes = [3, 5, 3, 1];
        new.numel = 45;
        block.invalidate(&old, &new);
        assert!(block.is_stale(Attribute::Sizes));
        // Never written, so nothing to invalidate
        assert!(!block.is_stale(Attribute::Numel));

        let again = block.bind_info(&device, Attribute::Sizes, &new).unwrap();
        assert_eq!(again.offset, sizes.offset);
        assert!(!block.is_stale(Attribute::Sizes));
        let contents = device.uniform_contents(&again.buffer).unwrap();
        assert_eq!(&contents[0..16], bytemuck::bytes_of(&new.sizes));
    }
}
