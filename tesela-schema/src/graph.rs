//! Graph description
//!
//! A flat, table-based description of a compute graph: a value table, an
//! operator call chain that refers to values by index, and byte ranges into
//! externally stored constant and shader blobs. Only the fields the tensor
//! layer consumes are interpreted; operator names and arguments are carried
//! through untouched.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::tags::{DataTypeTag, MemoryLayoutTag, StorageTypeTag};

const fn no_id() -> i32 {
    -1
}

/// Tensor entry of the value table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorValue {
    /// Element type
    pub datatype: DataTypeTag,
    /// NCHW sizes
    pub dims: Vec<u32>,
    /// Index into [`GraphDescription::constants`], negative for none
    #[serde(default = "no_id")]
    pub constant_id: i32,
    /// Shared memory object this tensor lives in, negative for none
    #[serde(default = "no_id")]
    pub mem_obj_id: i32,
    /// Requested storage type
    #[serde(default)]
    pub storage_type: StorageTypeTag,
    /// Requested memory layout
    #[serde(default)]
    pub memory_layout: MemoryLayoutTag,
}

impl TensorValue {
    /// Tensor with default storage hints, no constant data and no shared object
    #[must_use]
    pub fn new(datatype: DataTypeTag, dims: &[u32]) -> Self {
        Self {
            datatype,
            dims: dims.to_vec(),
            constant_id: no_id(),
            mem_obj_id: no_id(),
            storage_type: StorageTypeTag::Default,
            memory_layout: MemoryLayoutTag::Default,
        }
    }

    /// Constant table index, if the tensor is backed by constant data
    #[must_use]
    pub fn constant(&self) -> Option<usize> {
        usize::try_from(self.constant_id).ok()
    }

    /// Shared object id, if the tensor takes part in memory planning
    #[must_use]
    pub fn shared_object(&self) -> Option<usize> {
        usize::try_from(self.mem_obj_id).ok()
    }
}

/// One entry of the value table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// No value
    Null,
    /// Scalar integer
    Int(i64),
    /// Scalar double
    Double(f64),
    /// Scalar bool
    Bool(bool),
    /// Tensor
    Tensor(TensorValue),
    /// List of integers
    IntList(Vec<i64>),
    /// List of doubles
    DoubleList(Vec<f64>),
    /// List of bools
    BoolList(Vec<bool>),
    /// List of value ids
    ValueList(Vec<i32>),
    /// String
    String(String),
    /// Symbolic integer whose value is resolved at run time
    SymInt(i32),
}

impl Value {
    /// Tensor payload, if this is a tensor value
    #[must_use]
    pub const fn as_tensor(&self) -> Option<&TensorValue> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }
}

/// One operator invocation of the call chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorCall {
    /// Node id in the source graph
    pub node_id: u32,
    /// Operator name
    pub name: String,
    /// Argument value ids
    pub args: Vec<i32>,
}

/// A byte range inside an external blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BytesRange {
    /// First byte
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
}

impl BytesRange {
    /// Borrow the range from `blob`
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::BytesOutOfRange`] if the range does not fit.
    pub fn slice<'a>(&self, blob: &'a [u8]) -> Result<&'a [u8]> {
        let out_of_range = || SchemaError::BytesOutOfRange {
            offset: self.offset,
            length: self.length,
            blob_len: blob.len(),
        };
        let start = usize::try_from(self.offset).map_err(|_| out_of_range())?;
        let len = usize::try_from(self.length).map_err(|_| out_of_range())?;
        let end = start.checked_add(len).ok_or_else(out_of_range)?;
        blob.get(start..end).ok_or_else(out_of_range)
    }
}

/// Deserialized compute graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDescription {
    /// Format version string
    pub version: String,
    /// Operator calls in execution order
    pub chain: Vec<OperatorCall>,
    /// Value table
    pub values: Vec<Value>,
    /// Graph input value ids
    pub input_ids: Vec<u32>,
    /// Graph output value ids
    pub output_ids: Vec<u32>,
    /// Constant data ranges
    #[serde(default)]
    pub constants: Vec<BytesRange>,
    /// Shader binary ranges
    #[serde(default)]
    pub shaders: Vec<BytesRange>,
    /// Storage type for tensors that request the default
    #[serde(default)]
    pub storage_type_override: StorageTypeTag,
    /// Memory layout for tensors that request the default
    #[serde(default)]
    pub memory_layout_override: MemoryLayoutTag,
}

impl GraphDescription {
    /// Parse a graph from JSON
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Json`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON graph file
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Io`] if the file cannot be read, or
    /// [`SchemaError::Json`] on malformed input.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Value at `id`
    #[must_use]
    pub fn value(&self, id: u32) -> Option<&Value> {
        self.values.get(id as usize)
    }

    /// Iterate over `(id, tensor)` for every tensor in the value table
    pub fn tensors(&self) -> impl Iterator<Item = (u32, &TensorValue)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(id, v)| v.as_tensor().map(|t| (id as u32, t)))
    }

    /// Check every cross reference of the graph.
    ///
    /// Call chain arguments, value lists and graph inputs/outputs must name
    /// existing values, inputs and outputs must be tensors, tensors must
    /// have a datatype and non-zero dims, and constant ids must index into
    /// the constant table.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        let len = self.values.len();
        let check = |id: i64, location: &dyn Fn() -> String| -> Result<()> {
            if id < 0 || id as usize >= len {
                return Err(SchemaError::ValueIdOutOfRange {
                    id,
                    len,
                    location: location(),
                });
            }
            Ok(())
        };

        for call in &self.chain {
            for &arg in &call.args {
                check(i64::from(arg), &|| {
                    format!("args of {} (node {})", call.name, call.node_id)
                })?;
            }
        }

        for (id, value) in self.values.iter().enumerate() {
            match value {
                Value::ValueList(ids) => {
                    for &v in ids {
                        check(i64::from(v), &|| format!("value list {id}"))?;
                    }
                }
                Value::Tensor(t) => self.validate_tensor(id as u32, t)?,
                _ => {}
            }
        }

        for (kind, ids) in [("graph inputs", &self.input_ids), ("graph outputs", &self.output_ids)] {
            for &id in ids {
                check(i64::from(id), &|| kind.to_string())?;
                if self.values[id as usize].as_tensor().is_none() {
                    return Err(SchemaError::NotATensor { id });
                }
            }
        }
        Ok(())
    }

    fn validate_tensor(&self, id: u32, tensor: &TensorValue) -> Result<()> {
        if tensor.datatype == DataTypeTag::Unset {
            return Err(SchemaError::UnsetDatatype { id });
        }
        if tensor.dims.contains(&0) {
            return Err(SchemaError::ZeroSizedTensor {
                id,
                dims: tensor.dims.clone(),
            });
        }
        if let Some(constant) = tensor.constant() {
            if constant >= self.constants.len() {
                return Err(SchemaError::ConstantOutOfRange {
                    id,
                    constant_id: tensor.constant_id,
                    len: self.constants.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GraphDescription {
        GraphDescription {
            version: "0".to_string(),
            chain: vec![OperatorCall {
                node_id: 0,
                name: "aten.add.Tensor".to_string(),
                args: vec![0, 1, 2, 3],
            }],
            values: vec![
                Value::Tensor(TensorValue::new(DataTypeTag::Float32, &[1, 3, 8, 8])),
                Value::Tensor(TensorValue::new(DataTypeTag::Float32, &[1, 3, 8, 8])),
                Value::Double(1.0),
                Value::Tensor(TensorValue::new(DataTypeTag::Float32, &[1, 3, 8, 8])),
            ],
            input_ids: vec![0, 1],
            output_ids: vec![3],
            constants: Vec::new(),
            shaders: Vec::new(),
            storage_type_override: StorageTypeTag::Default,
            memory_layout_override: MemoryLayoutTag::Default,
        }
    }

    #[test]
    fn test_valid_graph() {
        sample().validate().unwrap();
    }

    #[test]
    fn test_tensors_iterates_tensor_values() {
        let graph = sample();
        let ids: Vec<u32> = graph.tensors().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1, 3]);
    }

    #[test]
    fn test_arg_out_of_range() {
        let mut graph = sample();
        graph.chain[0].args.push(4);
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, SchemaError::ValueIdOutOfRange { id: 4, len: 4, .. }));
        assert!(err.to_string().contains("aten.add.Tensor"));
    }

    #[test]
    fn test_negative_arg_rejected() {
        let mut graph = sample();
        graph.chain[0].args[0] = -1;
        assert!(matches!(
            graph.validate(),
            Err(SchemaError::ValueIdOutOfRange { id: -1, .. })
        ));
    }

    #[test]
    fn test_value_list_out_of_range() {
        let mut graph = sample();
        graph.values.push(Value::ValueList(vec![0, 9]));
        assert!(matches!(
            graph.validate(),
            Err(SchemaError::ValueIdOutOfRange { id: 9, .. })
        ));
    }

    #[test]
    fn test_output_must_be_tensor() {
        let mut graph = sample();
        graph.output_ids = vec![2];
        assert!(matches!(graph.validate(), Err(SchemaError::NotATensor { id: 2 })));
    }

    #[test]
    fn test_zero_dim_rejected() {
        let mut graph = sample();
        graph.values[1] = Value::Tensor(TensorValue::new(DataTypeTag::Float32, &[1, 0, 8]));
        assert!(matches!(
            graph.validate(),
            Err(SchemaError::ZeroSizedTensor { id: 1, .. })
        ));
    }

    #[test]
    fn test_unset_datatype_rejected() {
        let mut graph = sample();
        graph.values[0] = Value::Tensor(TensorValue::new(DataTypeTag::Unset, &[4]));
        assert!(matches!(graph.validate(), Err(SchemaError::UnsetDatatype { id: 0 })));
    }

    #[test]
    fn test_constant_id_checked() {
        let mut graph = sample();
        let mut weight = TensorValue::new(DataTypeTag::Float32, &[4]);
        weight.constant_id = 0;
        graph.values.push(Value::Tensor(weight));
        assert!(matches!(
            graph.validate(),
            Err(SchemaError::ConstantOutOfRange { id: 4, constant_id: 0, len: 0 })
        ));

        graph.constants.push(BytesRange { offset: 0, length: 16 });
        graph.validate().unwrap();
    }

    #[test]
    fn test_bytes_range_slice() {
        let blob: Vec<u8> = (0..32).collect();
        let range = BytesRange { offset: 4, length: 8 };
        assert_eq!(range.slice(&blob).unwrap(), &blob[4..12]);

        let empty = BytesRange { offset: 32, length: 0 };
        assert!(empty.slice(&blob).unwrap().is_empty());

        let past_end = BytesRange { offset: 30, length: 4 };
        assert!(matches!(
            past_end.slice(&blob),
            Err(SchemaError::BytesOutOfRange { offset: 30, length: 4, blob_len: 32 })
        ));

        let overflow = BytesRange { offset: u64::MAX, length: 2 };
        assert!(overflow.slice(&blob).is_err());
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{
            "version": "0",
            "chain": [],
            "values": [
                {"type": "Tensor", "value": {"datatype": 5, "dims": [2, 3]}},
                {"type": "Null"},
                {"type": "IntList", "value": [1, 2]}
            ],
            "input_ids": [0],
            "output_ids": [0]
        }"#;
        let graph = GraphDescription::from_json(json).unwrap();
        let tensor = graph.values[0].as_tensor().unwrap();
        assert_eq!(tensor.constant(), None);
        assert_eq!(tensor.shared_object(), None);
        assert_eq!(tensor.storage_type, StorageTypeTag::Default);
        assert_eq!(graph.values[1], Value::Null);
        assert!(graph.constants.is_empty());
        graph.validate().unwrap();
    }

    #[test]
    fn test_json_unknown_tag_is_error() {
        let json = r#"{
            "version": "0", "chain": [], "input_ids": [], "output_ids": [],
            "values": [{"type": "Tensor", "value": {"datatype": 5, "dims": [2], "storage_type": 7}}]
        }"#;
        assert!(matches!(
            GraphDescription::from_json(json),
            Err(SchemaError::Json(_))
        ));
    }
}
