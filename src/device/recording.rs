//! Host-side [`Device`] that records every call
//!
//! Hands out monotonically numbered handles, keeps uniform buffer contents in
//! host memory and exposes the deferred-cleanup queue so lifetimes can be
//! inspected. Used by tests, benches and the explain CLI.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::debug;

use super::{
    Allocation, BufferDesc, BufferHandle, Device, DeviceLimits, GpuResource, ImageDesc,
    ImageHandle, MemoryRequirements,
};
use crate::error::{Result, TeselaError};
use crate::types::TEXEL_WIDTH;

const BUFFER_ALIGNMENT: u64 = 64;
const IMAGE_ALIGNMENT: u64 = 4096;
const BUFFER_MEMORY_TYPES: u32 = 0b0111;
const IMAGE_MEMORY_TYPES: u32 = 0b0011;

#[derive(Debug)]
struct ResourceRecord {
    nbytes: u64,
    bound: bool,
    owns_memory: bool,
    uniform: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct DeviceState {
    next_id: u64,
    resources: HashMap<u64, ResourceRecord>,
    allocations: HashMap<u64, Allocation>,
    pending_cleanup: Vec<GpuResource>,
    pending_memory: Vec<Allocation>,
    bytes_in_use: u64,
    destroyed: usize,
}

impl DeviceState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn reserve(&mut self, nbytes: u64, budget: Option<u64>) -> Result<()> {
        if let Some(budget) = budget {
            if self.bytes_in_use + nbytes > budget {
                return Err(TeselaError::ResourceCreation(format!(
                    "out of device memory: {nbytes} bytes requested, {} of {budget} in use",
                    self.bytes_in_use
                )));
            }
        }
        self.bytes_in_use += nbytes;
        Ok(())
    }
}

/// Recording device for host-side use
#[derive(Debug, Default)]
pub struct RecordingDevice {
    limits: DeviceLimits,
    memory_budget: Option<u64>,
    state: RefCell<DeviceState>,
}

impl RecordingDevice {
    /// Device with default limits and unlimited memory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Device reporting the given limits
    #[must_use]
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Fail allocations once `bytes` of backed memory are in use
    #[must_use]
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    /// Resources queued for destruction and not yet flushed
    #[must_use]
    pub fn pending_cleanup(&self) -> Vec<GpuResource> {
        self.state.borrow().pending_cleanup.clone()
    }

    /// Memory blocks queued for release and not yet flushed
    #[must_use]
    pub fn pending_memory_cleanup(&self) -> Vec<Allocation> {
        self.state.borrow().pending_memory.clone()
    }

    /// Destroy everything in the cleanup queues, as the execution layer does
    /// once a submission has retired. Returns the number of objects destroyed.
    pub fn flush(&self) -> usize {
        let mut state = self.state.borrow_mut();
        let resources = std::mem::take(&mut state.pending_cleanup);
        let blocks = std::mem::take(&mut state.pending_memory);

        for resource in &resources {
            let id = match resource {
                GpuResource::Buffer(b) => b.id(),
                GpuResource::Image(i) => i.id(),
            };
            if let Some(record) = state.resources.remove(&id) {
                if record.owns_memory {
                    state.bytes_in_use -= record.nbytes;
                }
            }
        }
        for block in &blocks {
            if state.allocations.remove(&block.id).is_some() {
                state.bytes_in_use -= block.size;
            }
        }

        let count = resources.len() + blocks.len();
        state.destroyed += count;
        debug!(count, "Flushed deferred cleanup queue");
        count
    }

    /// Number of buffers and images that exist and are not yet destroyed
    #[must_use]
    pub fn live_resources(&self) -> usize {
        self.state.borrow().resources.len()
    }

    /// Total objects destroyed by [`RecordingDevice::flush`]
    #[must_use]
    pub fn destroyed(&self) -> usize {
        self.state.borrow().destroyed
    }

    /// Bytes of device memory currently backing resources
    #[must_use]
    pub fn bytes_in_use(&self) -> u64 {
        self.state.borrow().bytes_in_use
    }

    /// True if the resource exists and is backed by memory
    #[must_use]
    pub fn is_bound(&self, resource: &GpuResource) -> bool {
        let id = match resource {
            GpuResource::Buffer(b) => b.id(),
            GpuResource::Image(i) => i.id(),
        };
        self.state
            .borrow()
            .resources
            .get(&id)
            .is_some_and(|record| record.bound)
    }

    /// Host copy of a uniform buffer's contents
    #[must_use]
    pub fn uniform_contents(&self, buffer: &BufferHandle) -> Option<Vec<u8>> {
        self.state
            .borrow()
            .resources
            .get(&buffer.id())
            .and_then(|record| record.uniform.clone())
    }

    fn create_resource(&self, nbytes: u64, allocate: bool, uniform: bool) -> Result<u64> {
        let mut state = self.state.borrow_mut();
        if allocate {
            state.reserve(nbytes, self.memory_budget)?;
        }
        let id = state.next_id();
        state.resources.insert(
            id,
            ResourceRecord {
                nbytes,
                bound: allocate,
                owns_memory: allocate,
                uniform: uniform.then(|| vec![0u8; nbytes as usize]),
            },
        );
        Ok(id)
    }
}

impl Device for RecordingDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle> {
        let nbytes = desc.nbytes();
        let id = self.create_resource(nbytes, desc.allocate_memory, false)?;
        debug!(id, nbytes, allocate = desc.allocate_memory, "Created buffer");
        Ok(BufferHandle::new(id, nbytes))
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle> {
        let texel_bytes = (desc.format.scalar_type().element_size() * TEXEL_WIDTH) as u64;
        let nbytes = desc.extents.iter().map(|&e| u64::from(e)).product::<u64>() * texel_bytes;
        let id = self.create_resource(nbytes, desc.allocate_memory, false)?;
        debug!(id, extents = ?desc.extents, allocate = desc.allocate_memory, "Created image");
        Ok(ImageHandle::new(id, desc.kind, desc.format, desc.extents))
    }

    fn create_uniform_buffer(&self, nbytes: u32) -> Result<BufferHandle> {
        let id = self.create_resource(u64::from(nbytes), true, true)?;
        Ok(BufferHandle::new(id, u64::from(nbytes)))
    }

    fn write_uniform(&self, buffer: &BufferHandle, offset: u32, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let contents = state
            .resources
            .get_mut(&buffer.id())
            .and_then(|record| record.uniform.as_mut())
            .ok_or_else(|| {
                TeselaError::InvalidAllocation(format!("buffer {} is not a uniform buffer", buffer.id()))
            })?;

        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(TeselaError::InvalidAllocation(format!(
                "uniform write [{start}, {end}) outside buffer of {} bytes",
                contents.len()
            )));
        }
        contents[start..end].copy_from_slice(data);
        Ok(())
    }

    fn memory_requirements(&self, resource: &GpuResource) -> MemoryRequirements {
        match resource {
            GpuResource::Buffer(b) => MemoryRequirements {
                size: b.nbytes(),
                alignment: BUFFER_ALIGNMENT,
                memory_type_bits: BUFFER_MEMORY_TYPES,
            },
            GpuResource::Image(i) => {
                let texel_bytes = (i.format().scalar_type().element_size() * TEXEL_WIDTH) as u64;
                let texels: u64 = i.extents().iter().map(|&e| u64::from(e)).product();
                MemoryRequirements {
                    size: texels * texel_bytes,
                    alignment: IMAGE_ALIGNMENT,
                    memory_type_bits: IMAGE_MEMORY_TYPES,
                }
            }
        }
    }

    fn allocate_memory(&self, requirements: &MemoryRequirements) -> Result<Allocation> {
        let mut state = self.state.borrow_mut();
        state.reserve(requirements.size, self.memory_budget)?;
        let allocation = Allocation {
            id: state.next_id(),
            size: requirements.size,
            memory_type_bits: requirements.memory_type_bits,
        };
        state.allocations.insert(allocation.id, allocation);
        debug!(id = allocation.id, size = allocation.size, "Allocated memory block");
        Ok(allocation)
    }

    fn bind_memory(&self, resource: &GpuResource, allocation: &Allocation) -> Result<()> {
        let required = self.memory_requirements(resource);
        let mut state = self.state.borrow_mut();
        if !state.allocations.contains_key(&allocation.id) {
            return Err(TeselaError::InvalidAllocation(format!(
                "memory block {} does not exist",
                allocation.id
            )));
        }
        if allocation.size < required.size {
            return Err(TeselaError::InvalidAllocation(format!(
                "memory block of {} bytes cannot back {} bytes",
                allocation.size, required.size
            )));
        }

        let id = match resource {
            GpuResource::Buffer(b) => b.id(),
            GpuResource::Image(i) => i.id(),
        };
        let record = state
            .resources
            .get_mut(&id)
            .ok_or_else(|| TeselaError::InvalidAllocation(format!("resource {id} does not exist")))?;
        if record.bound {
            return Err(TeselaError::InvalidAllocation(format!(
                "resource {id} is already bound to memory"
            )));
        }
        record.bound = true;
        Ok(())
    }

    fn register_cleanup(&self, resource: GpuResource) {
        self.state.borrow_mut().pending_cleanup.push(resource);
    }

    fn register_memory_cleanup(&self, allocation: Allocation) {
        self.state.borrow_mut().pending_memory.push(allocation);
    }
}
