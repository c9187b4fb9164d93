//! tesela-schema: Serialized Graph Boundary
//!
//! Loads a flat graph description (value table, operator call chain, byte
//! ranges into external constant and shader blobs), resolves each tensor's
//! storage hints and creates the tensors through a [`tesela::Context`].
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use tesela::{Context, RecordingDevice};
//! use tesela_schema::{instantiate_tensors, GraphDescription};
//!
//! let graph = GraphDescription::from_json(r#"{
//!     "version": "0",
//!     "chain": [],
//!     "values": [{"type": "Tensor", "value": {"datatype": 5, "dims": [1, 3, 8, 8]}}],
//!     "input_ids": [0],
//!     "output_ids": [0]
//! }"#).unwrap();
//!
//! let ctx = Context::with_defaults(Rc::new(RecordingDevice::new()));
//! let tensors = instantiate_tensors(&ctx, &graph).unwrap();
//! assert_eq!(tensors.get(0).unwrap().image_extents(), [8, 8, 1]);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::cast_possible_truncation)] // Value tables never approach u32::MAX entries
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod graph;
pub mod instantiate;
pub mod tags;

pub use error::{Result, SchemaError};
pub use graph::{BytesRange, GraphDescription, OperatorCall, TensorValue, Value};
pub use instantiate::{instantiate_tensors, resolve_tensors, GraphTensors, TensorDescriptor};
pub use tags::{DataTypeTag, MemoryLayoutTag, StorageTypeTag};
