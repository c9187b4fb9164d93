//! Descriptor resolution and tensor instantiation

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use tesela::{Context, ContextConfig, MemoryLayout, ScalarType, SharedObject, StorageType, Tensor, TensorSpec};
use tracing::{debug, instrument};

use crate::error::{Result, SchemaError};
use crate::graph::{GraphDescription, TensorValue};

/// A tensor value with every storage hint resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TensorDescriptor {
    /// Value id
    pub id: u32,
    /// NCHW sizes
    pub sizes: Vec<usize>,
    /// Element type
    pub dtype: ScalarType,
    /// Storage type
    pub storage_type: StorageType,
    /// Memory layout
    pub memory_layout: MemoryLayout,
    /// Constant table index
    pub constant_id: Option<usize>,
    /// Shared object id
    pub shared_object_id: Option<usize>,
}

impl TensorDescriptor {
    /// Resolve the storage hints of `tensor`.
    ///
    /// Each hint is taken from the tensor itself, then from the graph-wide
    /// override, then from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnsetDatatype`] for tensors without a
    /// datatype and [`SchemaError::TextureRank`] for texture tensors with
    /// more than 4 dims.
    pub fn resolve(
        id: u32,
        tensor: &TensorValue,
        graph: &GraphDescription,
        config: &ContextConfig,
    ) -> Result<Self> {
        let dtype = tensor
            .datatype
            .scalar_type()
            .ok_or(SchemaError::UnsetDatatype { id })?;
        let storage_type = tensor
            .storage_type
            .storage_type()
            .or_else(|| graph.storage_type_override.storage_type())
            .unwrap_or(config.storage_type);
        let memory_layout = tensor
            .memory_layout
            .memory_layout()
            .or_else(|| graph.memory_layout_override.memory_layout())
            .unwrap_or(config.memory_layout);

        let sizes: Vec<usize> = tensor.dims.iter().map(|&d| d as usize).collect();
        if storage_type.is_texture() && sizes.len() > 4 {
            return Err(SchemaError::TextureRank {
                id,
                rank: sizes.len(),
            });
        }

        Ok(Self {
            id,
            sizes,
            dtype,
            storage_type,
            memory_layout,
            constant_id: tensor.constant(),
            shared_object_id: tensor.shared_object(),
        })
    }

    /// Creation spec for this tensor. Shared-object users are created
    /// without memory.
    #[must_use]
    pub fn spec(&self) -> TensorSpec {
        let spec = TensorSpec::new(&self.sizes)
            .with_dtype(self.dtype)
            .with_storage_type(self.storage_type)
            .with_memory_layout(self.memory_layout);
        if self.shared_object_id.is_some() {
            spec.unallocated()
        } else {
            spec
        }
    }
}

/// Resolve every tensor of `graph` against `config`
///
/// # Errors
///
/// Returns the first resolution failure.
pub fn resolve_tensors(graph: &GraphDescription, config: &ContextConfig) -> Result<Vec<TensorDescriptor>> {
    graph
        .tensors()
        .map(|(id, t)| TensorDescriptor::resolve(id, t, graph, config))
        .collect()
}

/// Tensors created from a graph, keyed by value id
#[derive(Debug)]
pub struct GraphTensors {
    tensors: BTreeMap<u32, Tensor>,
    shared_objects: BTreeMap<usize, SharedObject>,
}

impl GraphTensors {
    /// Tensor for value `id`
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Tensor> {
        self.tensors.get(&id)
    }

    /// Mutable tensor for value `id`
    pub fn get_mut(&mut self, id: u32) -> Option<&mut Tensor> {
        self.tensors.get_mut(&id)
    }

    /// Iterate over `(id, tensor)` in id order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Tensor)> + '_ {
        self.tensors.iter().map(|(&id, t)| (id, t))
    }

    /// Number of tensors
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// True if the graph had no tensor values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Shared object `id`, if any tensor referenced it
    #[must_use]
    pub fn shared_object(&self, id: usize) -> Option<&SharedObject> {
        self.shared_objects.get(&id)
    }

    /// Number of distinct shared objects
    #[must_use]
    pub fn shared_object_count(&self) -> usize {
        self.shared_objects.len()
    }
}

/// Validate `graph` and create every tensor value it declares.
///
/// Tensors with a shared object id are created without memory, grouped per
/// id, and bound once each group's shared object has been allocated.
///
/// # Errors
///
/// Returns validation and resolution failures, and any device error raised
/// while creating, allocating or binding.
#[instrument(level = "debug", skip(ctx, graph), fields(values = graph.values.len()))]
pub fn instantiate_tensors(ctx: &Rc<Context>, graph: &GraphDescription) -> Result<GraphTensors> {
    graph.validate()?;

    let mut tensors = BTreeMap::new();
    let mut shared_objects: BTreeMap<usize, SharedObject> = BTreeMap::new();

    for desc in resolve_tensors(graph, ctx.config())? {
        let tensor = Tensor::new(ctx, &desc.spec())?;
        if let Some(mem_obj) = desc.shared_object_id {
            shared_objects
                .entry(mem_obj)
                .or_insert_with(|| SharedObject::new(ctx))
                .add_user(&tensor)?;
        }
        tensors.insert(desc.id, tensor);
    }

    for (id, shared) in &mut shared_objects {
        shared.allocate()?;
        shared.bind_users()?;
        debug!(shared_object = id, users = shared.user_count(), "Bound shared object");
    }

    debug!(
        tensors = tensors.len(),
        shared_objects = shared_objects.len(),
        "Instantiated graph tensors"
    );
    Ok(GraphTensors {
        tensors,
        shared_objects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Value;
    use crate::tags::{DataTypeTag, MemoryLayoutTag, StorageTypeTag};
    use tesela::RecordingDevice;

    fn graph(values: Vec<Value>) -> GraphDescription {
        GraphDescription {
            version: "0".to_string(),
            chain: Vec::new(),
            values,
            input_ids: Vec::new(),
            output_ids: Vec::new(),
            constants: Vec::new(),
            shaders: Vec::new(),
            storage_type_override: StorageTypeTag::Default,
            memory_layout_override: MemoryLayoutTag::Default,
        }
    }

    #[test]
    fn test_resolution_order() {
        let config = ContextConfig::default();
        let mut explicit = TensorValue::new(DataTypeTag::Float16, &[2, 3]);
        explicit.storage_type = StorageTypeTag::Buffer;
        explicit.memory_layout = MemoryLayoutTag::WidthPacked;
        let implicit = TensorValue::new(DataTypeTag::Float32, &[2, 3]);

        let mut g = graph(Vec::new());
        let d = TensorDescriptor::resolve(0, &implicit, &g, &config).unwrap();
        assert_eq!(d.storage_type, config.storage_type);
        assert_eq!(d.memory_layout, config.memory_layout);

        g.storage_type_override = StorageTypeTag::Texture2D;
        g.memory_layout_override = MemoryLayoutTag::HeightPacked;
        let d = TensorDescriptor::resolve(0, &implicit, &g, &config).unwrap();
        assert_eq!(d.storage_type, StorageType::Texture2D);
        assert_eq!(d.memory_layout, MemoryLayout::HeightPacked);

        let d = TensorDescriptor::resolve(1, &explicit, &g, &config).unwrap();
        assert_eq!(d.storage_type, StorageType::Buffer);
        assert_eq!(d.memory_layout, MemoryLayout::WidthPacked);
        assert_eq!(d.dtype, ScalarType::Half);
    }

    #[test]
    fn test_texture_rank_rejected() {
        let config = ContextConfig::default();
        let t = TensorValue::new(DataTypeTag::Float32, &[1, 1, 2, 3, 4]);
        let g = graph(Vec::new());
        assert!(matches!(
            TensorDescriptor::resolve(7, &t, &g, &config),
            Err(SchemaError::TextureRank { id: 7, rank: 5 })
        ));

        let config = config.with_storage_type(StorageType::Buffer);
        let d = TensorDescriptor::resolve(7, &t, &g, &config).unwrap();
        assert_eq!(d.sizes, vec![1, 1, 2, 3, 4]);
    }

    #[test]
    fn test_spec_for_shared_user_is_unallocated() {
        let config = ContextConfig::default();
        let mut t = TensorValue::new(DataTypeTag::Float32, &[4]);
        t.mem_obj_id = 2;
        let d = TensorDescriptor::resolve(0, &t, &graph(Vec::new()), &config).unwrap();
        assert_eq!(d.shared_object_id, Some(2));
        assert!(!d.spec().allocate_memory());
    }

    #[test]
    fn test_instantiate_shares_memory() {
        let device = Rc::new(RecordingDevice::new());
        let ctx = Context::with_defaults(device.clone());

        let mut a = TensorValue::new(DataTypeTag::Float32, &[1, 4, 8, 8]);
        a.mem_obj_id = 0;
        let mut b = TensorValue::new(DataTypeTag::Float32, &[1, 4, 4, 4]);
        b.mem_obj_id = 0;
        let c = TensorValue::new(DataTypeTag::Float32, &[16]);
        let g = graph(vec![
            Value::Tensor(a),
            Value::Int(3),
            Value::Tensor(b),
            Value::Tensor(c),
        ]);

        let tensors = instantiate_tensors(&ctx, &g).unwrap();
        assert_eq!(tensors.len(), 3);
        assert!(tensors.get(1).is_none());
        assert_eq!(tensors.shared_object_count(), 1);
        assert_eq!(tensors.shared_object(0).unwrap().user_count(), 2);
        for (_, t) in tensors.iter() {
            assert!(t.is_allocated());
        }
        assert_eq!(tensors.get(0).unwrap().sizes(), &[1, 4, 8, 8]);
    }

    #[test]
    fn test_instantiate_validates_first() {
        let device = Rc::new(RecordingDevice::new());
        let ctx = Context::with_defaults(device.clone());
        let mut g = graph(vec![Value::Tensor(TensorValue::new(DataTypeTag::Float32, &[4]))]);
        g.output_ids = vec![3];
        assert!(instantiate_tensors(&ctx, &g).is_err());
        assert_eq!(ctx.live_storages(), 0);
    }
}
