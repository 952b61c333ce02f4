use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::device::Device;
use super::flags::ImageUsage;
use super::image::{Image, ImageDescriptor};
use super::queue::Queue;
use super::sync::{Fence, Semaphore};
use super::Extent3;
use crate::errors::{HeliosError, Result};

/// A fixed ring of presentable images.
///
/// Acquisition cycles through the ring and signals the caller's semaphore;
/// presentation consumes its wait semaphores. The recreate flag models an
/// out-of-date surface and can be raised by the owner (e.g. on resize).
#[derive(Debug)]
pub struct Swapchain {
    images: Vec<Arc<Image>>,
    extent: Extent3,
    next: Mutex<u32>,
    recreate: AtomicBool,
}

impl Swapchain {
    pub(crate) fn new(device: &Device, image_count: u32, extent: Extent3) -> Self {
        let desc = ImageDescriptor {
            extent,
            mip_levels: 1,
            array_layers: 1,
            bytes_per_texel: 4,
            usage: ImageUsage::COLOR_ATTACHMENT | ImageUsage::TRANSFER_DST,
        };
        let images = (0..image_count.max(1))
            .map(|_| Arc::new(Image::new(device.allocate_id(), &desc)))
            .collect();
        Self {
            images,
            extent,
            next: Mutex::new(0),
            recreate: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[must_use]
    pub fn image(&self, index: u32) -> Option<&Arc<Image>> {
        self.images.get(index as usize)
    }

    #[must_use]
    pub const fn extent(&self) -> Extent3 {
        self.extent
    }

    /// Mark the swapchain as needing recreation; surfaced by the next
    /// acquire or present.
    pub fn request_recreate(&self) {
        self.recreate.store(true, Ordering::Release);
    }

    /// Acquire the next image, signalling `semaphore` and/or `fence`.
    /// Returns the image index and whether recreation is needed.
    pub fn acquire_next_image(
        &self,
        semaphore: Option<&Semaphore>,
        fence: Option<&Fence>,
    ) -> Result<(u32, bool)> {
        let mut next = self.next.lock();
        let index = *next;
        *next = (*next + 1) % self.images.len() as u32;
        if let Some(semaphore) = semaphore {
            semaphore.signal();
        }
        if let Some(fence) = fence {
            fence.signal();
        }
        Ok((index, self.recreate.load(Ordering::Acquire)))
    }

    /// Present an acquired image, consuming the wait semaphores. Returns
    /// whether recreation is needed.
    pub fn present(
        &self,
        _queue: &Queue,
        image_index: u32,
        wait_semaphores: &[Arc<Semaphore>],
    ) -> Result<bool> {
        if image_index as usize >= self.images.len() {
            return Err(HeliosError::Device("presented image index out of range".into()));
        }
        for semaphore in wait_semaphores {
            if !semaphore.consume() {
                return Err(HeliosError::Device(
                    "present wait semaphore was not signalled".into(),
                ));
            }
        }
        Ok(self.recreate.swap(false, Ordering::AcqRel))
    }
}
