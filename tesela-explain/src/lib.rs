//! tesela-explain: Tensor Layout Inspection CLI
//!
//! Makes the physical side of a tensor visible: dim order, padded sizes,
//! texture extents and the shader specialization constant a layout
//! produces, the quantization parameters chosen for a range, and how every
//! tensor of a serialized graph would be stored.
//!
//! # Example
//!
//! ```rust
//! use tesela_explain::{explain_layout, LayoutRequest};
//!
//! let report = explain_layout(&LayoutRequest::new(&[1, 3, 17, 9])).unwrap();
//! assert_eq!(report.image_extents, Some([9, 17, 1]));
//! assert_eq!(report.padded_numel, 612);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::cast_precision_loss)] // Acceptable for display percentages
#![allow(clippy::format_push_string)] // Performance not critical for CLI

pub mod args;
pub mod error;
pub mod output;
pub mod report;

pub use error::{ExplainError, Result};
pub use output::{format_graph_text, format_json, format_layout_text, format_qparams_text, OutputFormat};
pub use report::{
    explain_graph, explain_layout, explain_qparams, GraphReport, GraphTensorRow, LayoutReport,
    LayoutRequest, QParamsReport,
};
