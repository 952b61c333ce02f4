use parking_lot::Mutex;

use super::flags::BufferUsage;
use crate::errors::{HeliosError, Result};

/// Creation parameters for a [`Buffer`].
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub size: u64,
    pub usage: BufferUsage,
    /// Whether the buffer can be mapped for host access through
    /// [`Buffer::write`] / [`Buffer::read`].
    pub host_visible: bool,
}

/// A device buffer backed by host storage.
#[derive(Debug)]
pub struct Buffer {
    id: u64,
    size: u64,
    usage: BufferUsage,
    host_visible: bool,
    data: Mutex<Vec<u8>>,
}

impl Buffer {
    pub(crate) fn new(id: u64, desc: &BufferDescriptor) -> Self {
        Self {
            id,
            size: desc.size,
            usage: desc.usage,
            host_visible: desc.host_visible,
            data: Mutex::new(vec![0; desc.size as usize]),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[must_use]
    pub const fn is_host_visible(&self) -> bool {
        self.host_visible
    }

    /// Write bytes through the host mapping.
    pub fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        if !self.host_visible {
            return Err(HeliosError::InvalidState("buffer is not host-visible"));
        }
        self.write_raw(offset, bytes)
    }

    /// Read bytes through the host mapping.
    pub fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        if !self.host_visible {
            return Err(HeliosError::InvalidState("buffer is not host-visible"));
        }
        self.read_raw(offset, len)
    }

    /// Device-side write, used by the submission executor.
    pub(crate) fn write_raw(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len() as u64)
            .filter(|end| *end <= self.size)
            .ok_or_else(|| HeliosError::Device("buffer write out of range".into()))?;
        self.data.lock()[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    /// Device-side read, used by the submission executor.
    pub(crate) fn read_raw(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.size)
            .ok_or_else(|| HeliosError::Device("buffer read out of range".into()))?;
        Ok(self.data.lock()[offset as usize..end as usize].to_vec())
    }
}
