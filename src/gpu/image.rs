use parking_lot::Mutex;

use super::flags::ImageUsage;
use super::{Extent3, Offset3};
use crate::errors::{HeliosError, Result};

/// Image layout states relevant to transfers and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    Undefined,
    General,
    TransferSrcOptimal,
    TransferDstOptimal,
    ShaderReadOnly,
    ColorAttachment,
    PresentSrc,
}

/// Creation parameters for an [`Image`].
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    pub extent: Extent3,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub bytes_per_texel: u32,
    pub usage: ImageUsage,
}

/// A device image with per-subresource host storage. Subresources are
/// addressed by (mip level, array layer) and stored tightly packed.
#[derive(Debug)]
pub struct Image {
    id: u64,
    extent: Extent3,
    mip_levels: u32,
    array_layers: u32,
    bytes_per_texel: u32,
    usage: ImageUsage,
    subresources: Mutex<Vec<Vec<u8>>>,
}

impl Image {
    pub(crate) fn new(id: u64, desc: &ImageDescriptor) -> Self {
        let mut subresources = Vec::with_capacity((desc.mip_levels * desc.array_layers) as usize);
        for mip in 0..desc.mip_levels {
            let size = desc.extent.mip(mip).texel_count() * u64::from(desc.bytes_per_texel);
            for _ in 0..desc.array_layers {
                subresources.push(vec![0; size as usize]);
            }
        }
        Self {
            id,
            extent: desc.extent,
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            bytes_per_texel: desc.bytes_per_texel,
            usage: desc.usage,
            subresources: Mutex::new(subresources),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub const fn extent(&self) -> Extent3 {
        self.extent
    }

    #[must_use]
    pub const fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[must_use]
    pub const fn array_layers(&self) -> u32 {
        self.array_layers
    }

    #[must_use]
    pub const fn usage(&self) -> ImageUsage {
        self.usage
    }

    #[must_use]
    pub const fn bytes_per_texel(&self) -> u32 {
        self.bytes_per_texel
    }

    fn subresource_index(&self, mip: u32, layer: u32) -> Result<usize> {
        if mip >= self.mip_levels || layer >= self.array_layers {
            return Err(HeliosError::Device(format!(
                "subresource (mip {mip}, layer {layer}) out of range"
            )));
        }
        Ok((mip * self.array_layers + layer) as usize)
    }

    /// Snapshot the bytes of one subresource.
    pub fn read_subresource(&self, mip: u32, layer: u32) -> Result<Vec<u8>> {
        let index = self.subresource_index(mip, layer)?;
        Ok(self.subresources.lock()[index].clone())
    }

    /// Copy a tightly packed region from `data` into a subresource.
    pub(crate) fn write_region(
        &self,
        mip: u32,
        layer: u32,
        offset: Offset3,
        extent: Extent3,
        data: &[u8],
    ) -> Result<()> {
        let index = self.subresource_index(mip, layer)?;
        let mut subresources = self.subresources.lock();
        let storage = &mut subresources[index];
        self.for_each_row(mip, offset, extent, |row, storage_start, len| {
            let src = &data[row * len..(row + 1) * len];
            storage[storage_start..storage_start + len].copy_from_slice(src);
        })
    }

    /// Copy a region out of a subresource into a tightly packed vector.
    pub(crate) fn read_region(
        &self,
        mip: u32,
        layer: u32,
        offset: Offset3,
        extent: Extent3,
    ) -> Result<Vec<u8>> {
        let index = self.subresource_index(mip, layer)?;
        let subresources = self.subresources.lock();
        let storage = &subresources[index];
        let row_len = (extent.width * self.bytes_per_texel) as usize;
        let mut out = vec![0; row_len * (extent.height * extent.depth) as usize];
        self.for_each_row(mip, offset, extent, |row, storage_start, len| {
            out[row * len..(row + 1) * len].copy_from_slice(&storage[storage_start..storage_start + len]);
        })?;
        Ok(out)
    }

    /// Visit every row of a region, passing (row index, byte offset into the
    /// subresource, row length in bytes).
    fn for_each_row(
        &self,
        mip: u32,
        offset: Offset3,
        extent: Extent3,
        mut visit: impl FnMut(usize, usize, usize),
    ) -> Result<()> {
        let mip_extent = self.extent.mip(mip);
        if offset.x + extent.width > mip_extent.width
            || offset.y + extent.height > mip_extent.height
            || offset.z + extent.depth > mip_extent.depth
        {
            return Err(HeliosError::Device("image region out of range".into()));
        }
        let bpt = self.bytes_per_texel as usize;
        let row_len = extent.width as usize * bpt;
        let slice_pitch = (mip_extent.width * mip_extent.height) as usize * bpt;
        let row_pitch = mip_extent.width as usize * bpt;
        let mut row = 0;
        for z in 0..extent.depth {
            for y in 0..extent.height {
                let start = (offset.z + z) as usize * slice_pitch
                    + (offset.y + y) as usize * row_pitch
                    + offset.x as usize * bpt;
                visit(row, start, row_len);
                row += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> Image {
        Image::new(
            1,
            &ImageDescriptor {
                extent: Extent3::new(4, 4, 1),
                mip_levels: 2,
                array_layers: 1,
                bytes_per_texel: 4,
                usage: ImageUsage::TRANSFER_DST,
            },
        )
    }

    #[test]
    fn region_roundtrip() {
        let image = image();
        let data: Vec<u8> = (0..24).collect();
        image
            .write_region(0, 0, Offset3::new(1, 1, 0), Extent3::new(2, 3, 1), &data)
            .unwrap();
        let back = image
            .read_region(0, 0, Offset3::new(1, 1, 0), Extent3::new(2, 3, 1))
            .unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn mip_extent_shrinks() {
        let image = image();
        // Mip 1 of a 4x4 image is 2x2.
        assert!(
            image
                .write_region(1, 0, Offset3::default(), Extent3::new(4, 4, 1), &[0; 64])
                .is_err()
        );
        image
            .write_region(1, 0, Offset3::default(), Extent3::new(2, 2, 1), &[7; 16])
            .unwrap();
        assert_eq!(image.read_subresource(1, 0).unwrap(), vec![7; 16]);
    }
}
