//! Storage, layout and element type vocabulary
//!
//! Dimension indices come in two conventions:
//!
//! - **NCHW**: outer-to-inner, the order `sizes` are stored in.
//! - **WHCN**: inner-to-outer, used for packed dims and axis maps
//!   (0 = width, 1 = height, 2 = channels, 3 = batch).

use serde::{Deserialize, Serialize};

/// WHCN index of the width dimension
pub const WIDTH_DIM: usize = 0;
/// WHCN index of the height dimension
pub const HEIGHT_DIM: usize = 1;
/// WHCN index of the channels dimension
pub const CHANNELS_DIM: usize = 2;
/// WHCN index of the batch dimension
pub const BATCH_DIM: usize = 3;

/// Number of scalars in one texel
pub const TEXEL_WIDTH: usize = 4;

/// Physical representation of a tensor on the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StorageType {
    /// Linear storage buffer
    Buffer,
    /// 3D image texture
    #[default]
    Texture3D,
    /// 2D image texture (depth extent must be 1)
    Texture2D,
}

impl StorageType {
    /// True for either texture kind
    #[must_use]
    pub const fn is_texture(self) -> bool {
        matches!(self, Self::Texture3D | Self::Texture2D)
    }

    /// Image kind backing this storage type, if any
    #[must_use]
    pub const fn image_kind(self) -> Option<ImageKind> {
        match self {
            Self::Buffer => None,
            Self::Texture3D => Some(ImageKind::Dim3),
            Self::Texture2D => Some(ImageKind::Dim2),
        }
    }
}

/// Which dimension is grouped into texels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemoryLayout {
    /// Width dim packed into texels
    WidthPacked,
    /// Height dim packed into texels
    HeightPacked,
    /// Channels dim packed into texels
    #[default]
    ChannelsPacked,
}

impl MemoryLayout {
    /// WHCN index of the packed dimension
    #[must_use]
    pub const fn packed_dim(self) -> usize {
        match self {
            Self::WidthPacked => WIDTH_DIM,
            Self::HeightPacked => HEIGHT_DIM,
            Self::ChannelsPacked => CHANNELS_DIM,
        }
    }

    /// Inverse of [`MemoryLayout::packed_dim`]
    #[must_use]
    pub const fn from_packed_dim(packed_dim: usize) -> Option<Self> {
        match packed_dim {
            WIDTH_DIM => Some(Self::WidthPacked),
            HEIGHT_DIM => Some(Self::HeightPacked),
            CHANNELS_DIM => Some(Self::ChannelsPacked),
            _ => None,
        }
    }
}

/// Policy used to pick the axis map of a new tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AxisMapLayout {
    /// `[0, 1, 2, 2]`: W on X, H on Y, C on Z, batches concatenated along C
    #[default]
    Default,
    /// Larger logical dims are placed on texture axes with larger limits
    Optimized,
}

/// Dimensionality of an image resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageKind {
    /// 2D image
    Dim2,
    /// 3D image
    Dim3,
}

/// Four-component texel formats used for texture storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TexelFormat {
    /// 4 x u8
    Rgba8Uint,
    /// 4 x i8
    Rgba8Sint,
    /// 4 x f16
    Rgba16Float,
    /// 4 x i32
    Rgba32Sint,
    /// 4 x f32
    Rgba32Float,
}

impl TexelFormat {
    /// Scalar type a shader reads out of this format
    #[must_use]
    pub const fn scalar_type(self) -> ScalarType {
        match self {
            Self::Rgba8Uint => ScalarType::Byte,
            Self::Rgba8Sint => ScalarType::Char,
            Self::Rgba16Float => ScalarType::Half,
            Self::Rgba32Sint => ScalarType::Int,
            Self::Rgba32Float => ScalarType::Float,
        }
    }
}

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScalarType {
    /// bool, stored as u8
    Bool,
    /// u8
    Byte,
    /// i8
    Char,
    /// i32
    Int,
    /// i64
    Long,
    /// f16
    Half,
    /// f32
    #[default]
    Float,
    /// f64
    Double,
    /// Affine-quantized i8
    QInt8,
    /// Affine-quantized u8
    QUInt8,
    /// Affine-quantized i32
    QInt32,
}

impl ScalarType {
    /// Size of one element in bytes
    #[must_use]
    pub const fn element_size(self) -> usize {
        match self {
            Self::Bool | Self::Byte | Self::Char | Self::QInt8 | Self::QUInt8 => 1,
            Self::Half => 2,
            Self::Int | Self::Float | Self::QInt32 => 4,
            Self::Long | Self::Double => 8,
        }
    }

    /// Texel format used when this dtype is stored in a texture.
    ///
    /// 64-bit types are narrowed to their 32-bit counterparts.
    #[must_use]
    pub const fn texel_format(self) -> TexelFormat {
        match self {
            Self::Bool | Self::Byte | Self::QUInt8 => TexelFormat::Rgba8Uint,
            Self::Char | Self::QInt8 => TexelFormat::Rgba8Sint,
            Self::Half => TexelFormat::Rgba16Float,
            Self::Int | Self::Long | Self::QInt32 => TexelFormat::Rgba32Sint,
            Self::Float | Self::Double => TexelFormat::Rgba32Float,
        }
    }

    /// True for the 8-bit signed types
    #[must_use]
    pub const fn is_int8(self) -> bool {
        matches!(self, Self::Char | Self::QInt8)
    }

    /// True for dtypes that carry affine quantization parameters
    #[must_use]
    pub const fn is_quantized(self) -> bool {
        matches!(self, Self::QInt8 | Self::QUInt8 | Self::QInt32)
    }

    /// Representable integer range `(qmin, qmax)` for integer dtypes
    #[must_use]
    pub const fn quant_range(self) -> Option<(i64, i64)> {
        match self {
            Self::Char | Self::QInt8 => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::Byte | Self::QUInt8 => Some((u8::MIN as i64, u8::MAX as i64)),
            Self::Int | Self::QInt32 => Some((i32::MIN as i64, i32::MAX as i64)),
            _ => None,
        }
    }
}
