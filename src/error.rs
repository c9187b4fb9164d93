//! Error types for Tesela operations
//!
//! Only recoverable conditions live here. Programmer errors (reinterpreting a
//! texture, changing rank through a resize, out-of-range dims, malformed dim
//! orders) panic at the call site instead.

use thiserror::Error;

use crate::types::ScalarType;

/// Result type for Tesela operations
pub type Result<T> = std::result::Result<T, TeselaError>;

/// Errors that can occur while creating or reinterpreting GPU tensors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TeselaError {
    /// The requested logical shape needs more backing memory than was allocated
    #[error("Capacity exceeded: {what} requires {required} but storage provides {available}")]
    CapacityExceeded {
        /// Which footprint was checked (buffer elements, texture extents)
        what: &'static str,
        /// Required footprint
        required: String,
        /// Footprint of the existing allocation
        available: String,
    },

    /// Image extents exceed the limits reported by the device
    #[error("Texture extents {extents:?} exceed device limits {limits:?}")]
    TextureExtentsExceeded {
        /// Requested extents
        extents: [u32; 3],
        /// Maximum extents supported by the device
        limits: [u32; 3],
    },

    /// The device refused to create a resource
    #[error("GPU resource creation failed: {0}")]
    ResourceCreation(String),

    /// A memory allocation could not be bound to a resource
    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),

    /// All metadata slots of a tensor's uniform buffer are in use
    #[error("Uniform buffer full: {used} of {capacity} bytes used")]
    UniformBufferFull {
        /// Bytes already handed out
        used: u32,
        /// Total uniform buffer size
        capacity: u32,
    },

    /// The dtype cannot be used for the requested operation
    #[error("Unsupported dtype {dtype:?} for {operation}")]
    UnsupportedDtype {
        /// Operation that was attempted
        operation: &'static str,
        /// Offending dtype
        dtype: ScalarType,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_exceeded_error() {
        let err = TeselaError::CapacityExceeded {
            what: "buffer elements",
            required: "120".to_string(),
            available: "96".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Capacity exceeded: buffer elements requires 120 but storage provides 96"
        );
    }

    #[test]
    fn test_texture_extents_error() {
        let err = TeselaError::TextureExtentsExceeded {
            extents: [16385, 1, 1],
            limits: [16384, 16384, 2048],
        };
        assert!(err.to_string().contains("16385"));
        assert!(err.to_string().contains("2048"));
    }

    #[test]
    fn test_resource_creation_error() {
        let err = TeselaError::ResourceCreation("out of device memory".to_string());
        assert_eq!(
            err.to_string(),
            "GPU resource creation failed: out of device memory"
        );
    }

    #[test]
    fn test_uniform_buffer_full_error() {
        let err = TeselaError::UniformBufferFull {
            used: 256,
            capacity: 256,
        };
        assert!(err.to_string().contains("256 of 256"));
    }

    #[test]
    fn test_unsupported_dtype_error() {
        let err = TeselaError::UnsupportedDtype {
            operation: "quantization",
            dtype: ScalarType::Float,
        };
        assert_eq!(err.to_string(), "Unsupported dtype Float for quantization");
    }

    #[test]
    fn test_error_equality() {
        let a = TeselaError::InvalidAllocation("too small".to_string());
        let b = TeselaError::InvalidAllocation("too small".to_string());
        assert_eq!(a, b);
    }
}
