//! Ownership-tracked wrappers around device buffers and images.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::errors::{HeliosError, Result};
use crate::gpu::{Buffer, Image};

/// A buffer (or sub-range of one) tracked by its current owning queue
/// family. Ownership only changes when a committed transaction synthesizes a
/// cross-family barrier for it.
#[derive(Debug)]
pub struct TransferBuffer {
    buffer: Arc<Buffer>,
    offset: u64,
    size: u64,
    queue_family: AtomicU32,
}

impl TransferBuffer {
    /// Wrap a whole buffer, initially owned by `queue_family`.
    #[must_use]
    pub fn new(buffer: Arc<Buffer>, queue_family: u32) -> Arc<Self> {
        let size = buffer.size();
        Arc::new(Self {
            buffer,
            offset: 0,
            size,
            queue_family: AtomicU32::new(queue_family),
        })
    }

    /// Wrap a sub-range of a buffer.
    pub fn with_range(
        buffer: Arc<Buffer>,
        offset: u64,
        size: u64,
        queue_family: u32,
    ) -> Result<Arc<Self>> {
        if offset.checked_add(size).is_none_or(|end| end > buffer.size()) {
            return Err(HeliosError::IncompatibleArgument(
                "sub-range exceeds the underlying buffer",
            ));
        }
        Ok(Arc::new(Self {
            buffer,
            offset,
            size,
            queue_family: AtomicU32::new(queue_family),
        }))
    }

    #[must_use]
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn is_suballocation(&self) -> bool {
        self.offset != 0
    }

    /// The queue family currently owning this buffer.
    #[must_use]
    pub fn queue_family(&self) -> u32 {
        self.queue_family.load(Ordering::Acquire)
    }

    pub(crate) fn set_queue_family(&self, family: u32) {
        self.queue_family.store(family, Ordering::Release);
    }

    /// Host write relative to this range.
    pub fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.buffer.write(self.offset + offset, bytes)
    }

    /// Host read relative to this range.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        self.buffer.read(self.offset + offset, len)
    }
}

/// An image whose (mip level, array layer) tiles are each tracked by their
/// owning queue family.
#[derive(Debug)]
pub struct TransferImage {
    image: Arc<Image>,
    tiles: Mutex<Vec<u32>>,
}

impl TransferImage {
    #[must_use]
    pub fn new(image: Arc<Image>, queue_family: u32) -> Arc<Self> {
        let tiles = vec![queue_family; (image.mip_levels() * image.array_layers()) as usize];
        Arc::new(Self {
            image,
            tiles: Mutex::new(tiles),
        })
    }

    #[must_use]
    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    fn tile_index(&self, mip: u32, layer: u32) -> usize {
        debug_assert!(mip < self.image.mip_levels() && layer < self.image.array_layers());
        (mip * self.image.array_layers() + layer) as usize
    }

    /// The queue family currently owning one tile.
    #[must_use]
    pub fn queue_family(&self, mip: u32, layer: u32) -> u32 {
        self.tiles.lock()[self.tile_index(mip, layer)]
    }

    pub(crate) fn set_queue_family_range(
        &self,
        family: u32,
        base_mip: u32,
        level_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) {
        let mut tiles = self.tiles.lock();
        for mip in base_mip..base_mip + level_count {
            for layer in base_layer..base_layer + layer_count {
                tiles[(mip * self.image.array_layers() + layer) as usize] = family;
            }
        }
    }
}
