//! Descriptor set layouts, pools and sets.

use std::sync::Arc;

use parking_lot::Mutex;

use super::buffer::Buffer;
use super::flags::ShaderStages;
use super::image::Image;
use crate::errors::{HeliosError, Result};

/// The resource kind bound at one descriptor binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    UniformBuffer,
    StorageBuffer,
    StorageImage,
    SampledImage,
    Sampler,
    AccelerationStructure,
}

/// One binding description of a descriptor set layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub kind: DescriptorKind,
    pub count: u32,
    pub stages: ShaderStages,
}

/// The typed schema of a descriptor set. Two layouts are identical iff their
/// ordered binding lists are equal, which is what the material compatibility
/// prefix is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorSetLayout {
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayout {
    #[must_use]
    pub fn new(bindings: Vec<DescriptorBinding>) -> Self {
        Self { bindings }
    }
}

/// A pool with a fixed descriptor-set budget.
#[derive(Debug)]
pub struct DescriptorPool {
    id: u64,
    remaining: Mutex<u32>,
}

impl DescriptorPool {
    pub(crate) fn new(id: u64, max_sets: u32) -> Self {
        Self {
            id,
            remaining: Mutex::new(max_sets),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        *self.remaining.lock()
    }

    /// Allocate one set with the given layout.
    pub fn allocate(&self, layout: &DescriptorSetLayout, id: u64) -> Result<Arc<DescriptorSet>> {
        let mut remaining = self.remaining.lock();
        if *remaining == 0 {
            return Err(HeliosError::ResourceExhausted("descriptor pool is empty"));
        }
        *remaining -= 1;
        Ok(Arc::new(DescriptorSet {
            id,
            layout: layout.clone(),
            writes: Mutex::new(Vec::new()),
        }))
    }
}

/// A resource written into a descriptor set.
#[derive(Debug, Clone)]
pub enum DescriptorWrite {
    UniformBuffer {
        binding: u32,
        buffer: Arc<Buffer>,
        offset: u64,
        size: u64,
    },
    StorageBuffer {
        binding: u32,
        buffer: Arc<Buffer>,
    },
    StorageImage {
        binding: u32,
        image: Arc<Image>,
    },
    SampledImage {
        binding: u32,
        image: Arc<Image>,
    },
    Sampler {
        binding: u32,
        sampler: u64,
    },
    AccelerationStructure {
        binding: u32,
        handle: u64,
    },
}

/// A GPU-side binding of resources to shader slots. Treated as immutable
/// after the initial update.
#[derive(Debug)]
pub struct DescriptorSet {
    id: u64,
    layout: DescriptorSetLayout,
    writes: Mutex<Vec<DescriptorWrite>>,
}

impl DescriptorSet {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn layout(&self) -> &DescriptorSetLayout {
        &self.layout
    }

    pub fn update(&self, writes: impl IntoIterator<Item = DescriptorWrite>) {
        self.writes.lock().extend(writes);
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_budget_is_enforced() {
        let pool = DescriptorPool::new(1, 2);
        let layout = DescriptorSetLayout::default();
        pool.allocate(&layout, 10).unwrap();
        pool.allocate(&layout, 11).unwrap();
        assert!(matches!(
            pool.allocate(&layout, 12),
            Err(HeliosError::ResourceExhausted(_))
        ));
    }
}
