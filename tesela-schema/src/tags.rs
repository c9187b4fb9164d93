//! Fixed numeric tags
//!
//! Serialized graphs refer to storage types, memory layouts and datatypes by
//! small integers. The numbers are part of the format and never change;
//! new entries only ever take unused values.

use serde::{Deserialize, Serialize};
use tesela::{MemoryLayout, ScalarType, StorageType};

use crate::error::SchemaError;

/// Storage type requested by a serialized tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StorageTypeTag {
    /// Linear buffer
    Buffer = 0,
    /// 3-D texture
    Texture3D = 1,
    /// 2-D texture
    Texture2D = 2,
    /// Defer to the graph override or the context default
    #[default]
    Default = 255,
}

impl StorageTypeTag {
    /// Concrete storage type, `None` for [`StorageTypeTag::Default`]
    #[must_use]
    pub const fn storage_type(self) -> Option<StorageType> {
        match self {
            Self::Buffer => Some(StorageType::Buffer),
            Self::Texture3D => Some(StorageType::Texture3D),
            Self::Texture2D => Some(StorageType::Texture2D),
            Self::Default => None,
        }
    }
}

impl TryFrom<u8> for StorageTypeTag {
    type Error = SchemaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Buffer),
            1 => Ok(Self::Texture3D),
            2 => Ok(Self::Texture2D),
            255 => Ok(Self::Default),
            _ => Err(SchemaError::UnknownTag {
                kind: "storage type",
                value,
            }),
        }
    }
}

impl From<StorageTypeTag> for u8 {
    fn from(tag: StorageTypeTag) -> Self {
        tag as u8
    }
}

/// Memory layout requested by a serialized tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MemoryLayoutTag {
    /// Width dim packed
    WidthPacked = 0,
    /// Height dim packed
    HeightPacked = 1,
    /// Channels dim packed
    ChannelsPacked = 2,
    /// Defer to the graph override or the context default
    #[default]
    Default = 255,
}

impl MemoryLayoutTag {
    /// Concrete memory layout, `None` for [`MemoryLayoutTag::Default`]
    #[must_use]
    pub const fn memory_layout(self) -> Option<MemoryLayout> {
        match self {
            Self::WidthPacked => Some(MemoryLayout::WidthPacked),
            Self::HeightPacked => Some(MemoryLayout::HeightPacked),
            Self::ChannelsPacked => Some(MemoryLayout::ChannelsPacked),
            Self::Default => None,
        }
    }
}

impl TryFrom<u8> for MemoryLayoutTag {
    type Error = SchemaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::WidthPacked),
            1 => Ok(Self::HeightPacked),
            2 => Ok(Self::ChannelsPacked),
            255 => Ok(Self::Default),
            _ => Err(SchemaError::UnknownTag {
                kind: "memory layout",
                value,
            }),
        }
    }
}

impl From<MemoryLayoutTag> for u8 {
    fn from(tag: MemoryLayoutTag) -> Self {
        tag as u8
    }
}

/// Element type of a serialized tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataTypeTag {
    /// bool
    Bool = 0,
    /// u8
    UInt8 = 1,
    /// i8
    Int8 = 2,
    /// i32
    Int32 = 3,
    /// f16
    Float16 = 4,
    /// f32
    Float32 = 5,
    /// f64
    Float64 = 6,
    /// i64
    Int64 = 7,
    /// No datatype recorded
    #[default]
    Unset = 127,
}

impl DataTypeTag {
    /// Scalar type, `None` for [`DataTypeTag::Unset`]
    #[must_use]
    pub const fn scalar_type(self) -> Option<ScalarType> {
        match self {
            Self::Bool => Some(ScalarType::Bool),
            Self::UInt8 => Some(ScalarType::Byte),
            Self::Int8 => Some(ScalarType::Char),
            Self::Int32 => Some(ScalarType::Int),
            Self::Float16 => Some(ScalarType::Half),
            Self::Float32 => Some(ScalarType::Float),
            Self::Float64 => Some(ScalarType::Double),
            Self::Int64 => Some(ScalarType::Long),
            Self::Unset => None,
        }
    }
}

impl TryFrom<u8> for DataTypeTag {
    type Error = SchemaError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Bool),
            1 => Ok(Self::UInt8),
            2 => Ok(Self::Int8),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Float16),
            5 => Ok(Self::Float32),
            6 => Ok(Self::Float64),
            7 => Ok(Self::Int64),
            127 => Ok(Self::Unset),
            _ => Err(SchemaError::UnknownTag {
                kind: "datatype",
                value,
            }),
        }
    }
}

impl From<DataTypeTag> for u8 {
    fn from(tag: DataTypeTag) -> Self {
        tag as u8
    }
}
