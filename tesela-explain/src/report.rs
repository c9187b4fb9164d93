//! Reports derived from tensors, quantization ranges and graphs
//!
//! Every report is computed against a [`RecordingDevice`], so no GPU is
//! needed to inspect what a layout would look like.

use std::rc::Rc;

use serde::Serialize;
use tesela::quant::{choose_qparams_for, dequantize_value, quantize_value, SMALL_SCALE_THRESHOLD};
use tesela::{
    AxisMapLayout, Context, ContextConfig, MemoryLayout, RecordingDevice, ScalarType, StorageType,
    Tensor, TensorSpec,
};
use tesela_schema::{instantiate_tensors, resolve_tensors, GraphDescription};
use tracing::{debug, instrument};

use crate::error::{ExplainError, Result};

/// Inputs of a layout report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRequest {
    /// NCHW sizes
    pub sizes: Vec<usize>,
    /// Element type
    pub dtype: ScalarType,
    /// Storage type
    pub storage_type: StorageType,
    /// Memory layout
    pub memory_layout: MemoryLayout,
    /// Axis map policy
    pub axis_map_layout: AxisMapLayout,
}

impl LayoutRequest {
    /// Float, texture 3-D, channels packed, default axis map
    #[must_use]
    pub fn new(sizes: &[usize]) -> Self {
        let config = ContextConfig::default();
        Self {
            sizes: sizes.to_vec(),
            dtype: ScalarType::Float,
            storage_type: config.storage_type,
            memory_layout: config.memory_layout,
            axis_map_layout: config.axis_map_layout,
        }
    }

    fn check(&self) -> Result<()> {
        if self.sizes.is_empty() {
            return Err(ExplainError::InvalidArgument("sizes must not be empty".to_string()));
        }
        if self.sizes.contains(&0) {
            return Err(ExplainError::InvalidArgument(format!(
                "sizes must be non-zero, got {:?}",
                self.sizes
            )));
        }
        if self.storage_type.is_texture() && self.sizes.len() > 4 {
            return Err(ExplainError::InvalidArgument(format!(
                "texture storage supports at most 4 dims, got {}",
                self.sizes.len()
            )));
        }
        Ok(())
    }
}

/// Derived layout metadata of one tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutReport {
    /// NCHW sizes
    pub sizes: Vec<usize>,
    /// Element type
    pub dtype: ScalarType,
    /// Storage type
    pub storage_type: StorageType,
    /// Memory layout implied by the packed dim
    pub memory_layout: MemoryLayout,
    /// Dim order, fastest-varying last
    pub dim_order: Vec<usize>,
    /// WHCN dim to texture axis
    pub axis_map: [usize; 4],
    /// WHCN packed dim
    pub packed_dim: usize,
    /// NCHW strides
    pub strides: Vec<usize>,
    /// Sizes padded for texel packing
    pub padded_sizes: Vec<usize>,
    /// Strides padded to a multiple of 4 entries
    pub unsqueezed_strides: Vec<usize>,
    /// Texture extents, `None` for buffers
    pub image_extents: Option<[u32; 3]>,
    /// Image-space bounds
    pub logical_limits: [u32; 3],
    /// Element count
    pub numel: usize,
    /// Element count including padding
    pub padded_numel: usize,
    /// Logical size in bytes
    pub nbytes: usize,
    /// Host staging buffer size in bytes
    pub staging_buffer_nbytes: usize,
    /// Shader specialization constant for the layout
    pub hashed_layout: i32,
}

impl LayoutReport {
    /// Snapshot the metadata of `tensor`
    #[must_use]
    pub fn from_tensor(tensor: &Tensor) -> Self {
        Self {
            sizes: tensor.sizes().to_vec(),
            dtype: tensor.dtype(),
            storage_type: tensor.storage_type(),
            memory_layout: tensor.estimate_memory_layout(),
            dim_order: tensor.dim_order().to_vec(),
            axis_map: *tensor.axis_map(),
            packed_dim: tensor.packed_dim(),
            strides: tensor.strides().to_vec(),
            padded_sizes: tensor.padded_sizes().to_vec(),
            unsqueezed_strides: tensor.unsqueezed_strides().to_vec(),
            image_extents: tensor.has_texture_storage().then(|| tensor.image_extents()),
            logical_limits: tensor.logical_limits(),
            numel: tensor.numel(),
            padded_numel: tensor.padded_numel(),
            nbytes: tensor.nbytes(),
            staging_buffer_nbytes: tensor.staging_buffer_nbytes(),
            hashed_layout: tensor.hashed_layout(),
        }
    }
}

fn recording_context(config: ContextConfig) -> Rc<Context> {
    Context::new(Rc::new(RecordingDevice::new()), config)
}

/// Create the requested tensor and report its layout
///
/// # Errors
///
/// Returns [`ExplainError::InvalidArgument`] for empty or zero sizes and
/// texture tensors with more than 4 dims, or the core's error if the
/// tensor cannot be created.
#[instrument(level = "debug", skip(request), fields(sizes = ?request.sizes))]
pub fn explain_layout(request: &LayoutRequest) -> Result<LayoutReport> {
    request.check()?;
    let ctx = recording_context(ContextConfig::default());
    let spec = TensorSpec::new(&request.sizes)
        .with_dtype(request.dtype)
        .with_storage_type(request.storage_type)
        .with_memory_layout(request.memory_layout)
        .with_axis_map_layout(request.axis_map_layout);
    let tensor = Tensor::new(&ctx, &spec)?;
    let report = LayoutReport::from_tensor(&tensor);
    debug!(
        padded_numel = report.padded_numel,
        hashed_layout = report.hashed_layout,
        "Explained layout"
    );
    Ok(report)
}

/// Quantization parameters for an observed range
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QParamsReport {
    /// Integer dtype
    pub dtype: ScalarType,
    /// Observed minimum
    pub min: f32,
    /// Observed maximum
    pub max: f32,
    /// Smallest representable integer
    pub qmin: i64,
    /// Largest representable integer
    pub qmax: i64,
    /// Chosen scale
    pub scale: f32,
    /// Chosen zero point
    pub zero_point: i32,
    /// `min` after a quantize/dequantize round trip
    pub min_roundtrip: f32,
    /// `max` after a quantize/dequantize round trip
    pub max_roundtrip: f32,
}

/// Choose quantization parameters for `[min, max]` over `dtype`
///
/// # Errors
///
/// Returns the core's `UnsupportedDtype` error for non-integer dtypes.
#[instrument(level = "debug")]
pub fn explain_qparams(dtype: ScalarType, min: f32, max: f32) -> Result<QParamsReport> {
    let params = choose_qparams_for(dtype, min, max, SMALL_SCALE_THRESHOLD)?;
    let (qmin, qmax) = dtype
        .quant_range()
        .ok_or_else(|| ExplainError::InvalidArgument(format!("{dtype:?} has no integer range")))?;
    let roundtrip = |v: f32| dequantize_value(quantize_value(v, params, qmin, qmax), params);

    Ok(QParamsReport {
        dtype,
        min,
        max,
        qmin,
        qmax,
        scale: params.scale,
        zero_point: params.zero_point,
        min_roundtrip: roundtrip(min),
        max_roundtrip: roundtrip(max),
    })
}

/// One tensor of a graph report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphTensorRow {
    /// Value id
    pub id: u32,
    /// NCHW sizes
    pub sizes: Vec<usize>,
    /// Element type
    pub dtype: ScalarType,
    /// Resolved storage type
    pub storage_type: StorageType,
    /// Resolved memory layout
    pub memory_layout: MemoryLayout,
    /// Texture extents, `None` for buffers
    pub image_extents: Option<[u32; 3]>,
    /// Logical size in bytes
    pub nbytes: usize,
    /// Constant table index
    pub constant_id: Option<usize>,
    /// Shared object id
    pub shared_object_id: Option<usize>,
}

/// Summary of a graph and every tensor it declares
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphReport {
    /// Format version string
    pub version: String,
    /// Operator calls in the chain
    pub operators: usize,
    /// Entries in the value table
    pub values: usize,
    /// Graph input ids
    pub input_ids: Vec<u32>,
    /// Graph output ids
    pub output_ids: Vec<u32>,
    /// Distinct shared objects
    pub shared_objects: usize,
    /// Tensors in id order
    pub tensors: Vec<GraphTensorRow>,
}

/// Instantiate `graph` on a recording device and summarize its tensors
///
/// # Errors
///
/// Returns validation, resolution and creation failures.
#[instrument(level = "debug", skip(graph), fields(version = %graph.version))]
pub fn explain_graph(graph: &GraphDescription) -> Result<GraphReport> {
    let config = ContextConfig::default();
    let ctx = recording_context(config);
    let descriptors = resolve_tensors(graph, &config)?;
    let tensors = instantiate_tensors(&ctx, graph)?;

    let rows = descriptors
        .into_iter()
        .filter_map(|desc| {
            let tensor = tensors.get(desc.id)?;
            Some(GraphTensorRow {
                id: desc.id,
                image_extents: tensor.has_texture_storage().then(|| tensor.image_extents()),
                nbytes: tensor.nbytes(),
                sizes: desc.sizes,
                dtype: desc.dtype,
                storage_type: desc.storage_type,
                memory_layout: desc.memory_layout,
                constant_id: desc.constant_id,
                shared_object_id: desc.shared_object_id,
            })
        })
        .collect::<Vec<_>>();
    debug!(tensors = rows.len(), "Explained graph");

    Ok(GraphReport {
        version: graph.version.clone(),
        operators: graph.chain.len(),
        values: graph.values.len(),
        input_ids: graph.input_ids.clone(),
        output_ids: graph.output_ids.clone(),
        shared_objects: tensors.shared_object_count(),
        tensors: rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tesela::layout::UNSQUEEZED_STRIDE;

    #[test]
    fn test_channels_packed_texture() {
        let report = explain_layout(&LayoutRequest::new(&[1, 3, 17, 9])).unwrap();
        assert_eq!(report.dim_order, vec![0, 2, 3, 1]);
        assert_eq!(report.padded_sizes, vec![1, 4, 17, 9]);
        assert_eq!(report.image_extents, Some([9, 17, 1]));
        assert_eq!(report.logical_limits, [9, 17, 1]);
        assert_eq!(report.numel, 459);
        assert_eq!(report.padded_numel, 612);
        assert_eq!(report.nbytes, 459 * 4);
        assert_eq!(report.hashed_layout, 2 << 16 | 2 << 12 | 2 << 8 | 1 << 4);
    }

    #[test]
    fn test_width_packed_buffer() {
        let mut request = LayoutRequest::new(&[2, 3]);
        request.storage_type = StorageType::Buffer;
        request.memory_layout = MemoryLayout::WidthPacked;
        let report = explain_layout(&request).unwrap();
        assert_eq!(report.strides, vec![3, 1]);
        assert_eq!(report.unsqueezed_strides, vec![UNSQUEEZED_STRIDE, UNSQUEEZED_STRIDE, 3, 1]);
        assert_eq!(report.image_extents, None);
        assert_eq!(report.logical_limits, [1, 1, 1]);
    }

    #[test]
    fn test_invalid_requests() {
        assert!(matches!(
            explain_layout(&LayoutRequest::new(&[])),
            Err(ExplainError::InvalidArgument(_))
        ));
        assert!(matches!(
            explain_layout(&LayoutRequest::new(&[4, 0])),
            Err(ExplainError::InvalidArgument(_))
        ));
        assert!(matches!(
            explain_layout(&LayoutRequest::new(&[1, 2, 3, 4, 5])),
            Err(ExplainError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unaddressable_layout_is_an_error() {
        let mut request = LayoutRequest::new(&[65536, 65536]);
        request.storage_type = StorageType::Buffer;
        request.memory_layout = MemoryLayout::WidthPacked;
        assert!(matches!(
            explain_layout(&request),
            Err(ExplainError::Tesela(tesela::TeselaError::CapacityExceeded { .. }))
        ));
    }

    #[test]
    fn test_qparams_int8() {
        let report = explain_qparams(ScalarType::QInt8, -1.0, 1.0).unwrap();
        assert_eq!((report.qmin, report.qmax), (-128, 127));
        assert!((report.scale - 2.0 / 255.0).abs() < 1e-6);
        assert!((report.max_roundtrip - 1.0).abs() <= report.scale);
    }

    #[test]
    fn test_qparams_float_rejected() {
        assert!(matches!(
            explain_qparams(ScalarType::Float, -1.0, 1.0),
            Err(ExplainError::Tesela(_))
        ));
    }

    #[test]
    fn test_graph_report() {
        let graph = GraphDescription::from_json(
            r#"{
                "version": "1",
                "chain": [{"node_id": 0, "name": "aten.relu.default", "args": [0, 1]}],
                "values": [
                    {"type": "Tensor", "value": {"datatype": 5, "dims": [1, 8, 4, 4]}},
                    {"type": "Tensor", "value": {"datatype": 5, "dims": [1, 8, 4, 4], "storage_type": 0}}
                ],
                "input_ids": [0],
                "output_ids": [1]
            }"#,
        )
        .unwrap();
        let report = explain_graph(&graph).unwrap();
        assert_eq!(report.operators, 1);
        assert_eq!(report.tensors.len(), 2);
        assert_eq!(report.tensors[0].image_extents, Some([4, 4, 2]));
        assert_eq!(report.tensors[1].storage_type, StorageType::Buffer);
        assert_eq!(report.tensors[1].image_extents, None);
    }
}
