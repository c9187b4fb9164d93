//! Command-line spellings of the core enums

use clap::ValueEnum;
use tesela::{MemoryLayout, ScalarType, StorageType};

/// `--storage` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageArg {
    /// Linear buffer
    Buffer,
    /// 3-D texture
    Texture3d,
    /// 2-D texture
    Texture2d,
}

impl From<StorageArg> for StorageType {
    fn from(arg: StorageArg) -> Self {
        match arg {
            StorageArg::Buffer => Self::Buffer,
            StorageArg::Texture3d => Self::Texture3D,
            StorageArg::Texture2d => Self::Texture2D,
        }
    }
}

/// `--layout` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// Width packed
    Width,
    /// Height packed
    Height,
    /// Channels packed
    Channels,
}

impl From<LayoutArg> for MemoryLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Width => Self::WidthPacked,
            LayoutArg::Height => Self::HeightPacked,
            LayoutArg::Channels => Self::ChannelsPacked,
        }
    }
}

/// `--dtype` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DtypeArg {
    /// bool
    Bool,
    /// u8
    Uint8,
    /// i8
    Int8,
    /// i32
    Int32,
    /// i64
    Int64,
    /// f16
    Half,
    /// f32
    Float,
    /// f64
    Double,
    /// Quantized i8
    Qint8,
    /// Quantized u8
    Quint8,
    /// Quantized i32
    Qint32,
}

impl From<DtypeArg> for ScalarType {
    fn from(arg: DtypeArg) -> Self {
        match arg {
            DtypeArg::Bool => Self::Bool,
            DtypeArg::Uint8 => Self::Byte,
            DtypeArg::Int8 => Self::Char,
            DtypeArg::Int32 => Self::Int,
            DtypeArg::Int64 => Self::Long,
            DtypeArg::Half => Self::Half,
            DtypeArg::Float => Self::Float,
            DtypeArg::Double => Self::Double,
            DtypeArg::Qint8 => Self::QInt8,
            DtypeArg::Quint8 => Self::QUInt8,
            DtypeArg::Qint32 => Self::QInt32,
        }
    }
}
