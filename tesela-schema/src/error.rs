//! Error types for tesela-schema

use tesela::TeselaError;
use thiserror::Error;

/// Errors raised while loading, validating or instantiating a graph
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A numeric tag outside its fixed table
    #[error("Unknown {kind} tag: {value}")]
    UnknownTag {
        /// Which tag table was consulted
        kind: &'static str,
        /// Offending value
        value: u8,
    },

    /// A value id that does not index into the value table
    #[error("Value id {id} out of range in {location} (graph has {len} values)")]
    ValueIdOutOfRange {
        /// Offending id
        id: i64,
        /// Number of values in the graph
        len: usize,
        /// Where the id was found
        location: String,
    },

    /// An id that must name a tensor names some other value
    #[error("Value {id} is not a tensor")]
    NotATensor {
        /// Offending id
        id: u32,
    },

    /// A tensor value with a zero dimension
    #[error("Tensor value {id} has a zero-sized dimension: {dims:?}")]
    ZeroSizedTensor {
        /// Tensor value id
        id: u32,
        /// Declared dims
        dims: Vec<u32>,
    },

    /// A texture tensor with more than 4 dims
    #[error("Tensor value {id} has rank {rank}; texture storage supports at most 4 dims")]
    TextureRank {
        /// Tensor value id
        id: u32,
        /// Declared rank
        rank: usize,
    },

    /// A tensor value whose datatype tag is `Unset`
    #[error("Tensor value {id} has no datatype")]
    UnsetDatatype {
        /// Tensor value id
        id: u32,
    },

    /// A constant id past the end of the constant table
    #[error("Tensor value {id} references constant {constant_id} (graph has {len} constants)")]
    ConstantOutOfRange {
        /// Tensor value id
        id: u32,
        /// Offending constant id
        constant_id: i32,
        /// Number of constants in the graph
        len: usize,
    },

    /// A byte range that does not fit the blob it points into
    #[error("Byte range {offset}+{length} exceeds blob of {blob_len} bytes")]
    BytesOutOfRange {
        /// Range start
        offset: u64,
        /// Range length
        length: u64,
        /// Blob size
        blob_len: usize,
    },

    /// Tensor creation failed
    #[error("Tensor error: {0}")]
    Tesela(#[from] TeselaError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for tesela-schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;
