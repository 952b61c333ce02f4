use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::{HeliosError, Result};
use crate::gpu::Pipeline;

/// Lazy, de-duplicated pipeline storage keyed by material identity.
///
/// A single mutex guards the map; `ensure` either returns the cached handle
/// or builds the pipeline through the supplied constructor.
#[derive(Debug, Default)]
pub struct PipelineCache<K: slotmap::Key> {
    entries: Mutex<FxHashMap<K, Arc<Pipeline>>>,
}

impl<K: slotmap::Key> PipelineCache<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Get the pipeline for `key`, constructing it on first use.
    pub fn ensure(
        &self,
        key: K,
        create: impl FnOnce() -> Result<Arc<Pipeline>>,
    ) -> Result<Arc<Pipeline>> {
        let mut entries = self.entries.lock();
        if let Some(pipeline) = entries.get(&key) {
            return Ok(pipeline.clone());
        }
        let pipeline = create()?;
        entries.insert(key, pipeline.clone());
        Ok(pipeline)
    }

    /// Look up an existing pipeline.
    pub fn get(&self, key: K) -> Result<Arc<Pipeline>> {
        self.entries
            .lock()
            .get(&key)
            .cloned()
            .ok_or(HeliosError::NotFound("no pipeline was created for this material"))
    }

    /// Drop the entry for `key`. Returns whether one existed.
    pub fn destroy(&self, key: K) -> bool {
        self.entries.lock().remove(&key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{ComputePipelineSettings, Device, DeviceDescriptor, PipelineSettings, ShaderStages};

    slotmap::new_key_type! {
        struct TestKey;
    }

    #[test]
    fn ensure_returns_the_identical_handle() {
        let device = Device::new(&DeviceDescriptor::default()).unwrap();
        let shader = device.create_shader_module(ShaderStages::COMPUTE);
        let mut keys = slotmap::SlotMap::<TestKey, ()>::with_key();
        let key = keys.insert(());

        let cache = PipelineCache::new();
        let create = || {
            device.create_pipeline(PipelineSettings::Compute(ComputePipelineSettings {
                shader: shader.clone(),
                set_layouts: vec![],
                push_constant_ranges: vec![],
            }))
        };
        let first = cache.ensure(key, create).unwrap();
        let again = cache
            .ensure(key, || panic!("must not rebuild a cached pipeline"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &cache.get(key).unwrap()));

        assert!(cache.destroy(key));
        assert!(matches!(cache.get(key), Err(HeliosError::NotFound(_))));
        assert!(!cache.destroy(key));
    }
}
