// Pixel buffer conversion - turns decoded bitmaps into the layout the pose model reads

use crate::models::frame::{BufferAllocationError, PixelFormat, RawImage};
use tracing::trace;

/// Row stride alignment of device buffers, in bytes
pub const ROW_ALIGNMENT: usize = 64;

/// 32-bit ARGB pixel buffer with padded rows
///
/// Pixel memory can only be written through [`DeviceImageBuffer::lock`].
pub struct DeviceImageBuffer {
    width: u32,
    height: u32,
    bytes_per_row: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl DeviceImageBuffer {
    /// Allocate a zeroed ARGB32 buffer of `width` x `height`
    pub fn allocate(width: u32, height: u32) -> Result<Self, BufferAllocationError> {
        if width == 0 || height == 0 {
            return Err(BufferAllocationError::ZeroSized { width, height });
        }

        let format = PixelFormat::ARGB32;
        let too_large = BufferAllocationError::TooLarge { width, height };

        let bytes_per_row = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .and_then(|row| align_up(row, ROW_ALIGNMENT))
            .ok_or_else(|| too_large.clone())?;
        let total = bytes_per_row
            .checked_mul(height as usize)
            .filter(|total| *total <= isize::MAX as usize)
            .ok_or(too_large)?;

        let mut data = Vec::new();
        data.try_reserve_exact(total)
            .map_err(|_| BufferAllocationError::AllocationFailed { bytes: total })?;
        data.resize(total, 0);

        Ok(Self {
            width,
            height,
            bytes_per_row,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Whole backing store, row padding included
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Visible pixels of row `y`, padding excluded
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.bytes_per_row;
        let len = self.width as usize * self.format.bytes_per_pixel();
        self.data.get(start..start + len)
    }

    /// ARGB components of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let offset = x as usize * self.format.bytes_per_pixel();
        Some([row[offset], row[offset + 1], row[offset + 2], row[offset + 3]])
    }

    /// Take exclusive write access to the pixel memory until the guard drops
    pub fn lock(&mut self) -> PixelLock<'_> {
        trace!(width = self.width, height = self.height, "Pixel buffer locked");
        PixelLock { buffer: self }
    }
}

impl std::fmt::Debug for DeviceImageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes_per_row", &self.bytes_per_row)
            .field("format", &self.format)
            .finish()
    }
}

/// Scoped write access to a [`DeviceImageBuffer`]
pub struct PixelLock<'a> {
    buffer: &'a mut DeviceImageBuffer,
}

impl PixelLock<'_> {
    /// Visible pixels of row `y`, writable
    pub fn row_mut(&mut self, y: u32) -> Option<&mut [u8]> {
        if y >= self.buffer.height {
            return None;
        }
        let start = y as usize * self.buffer.bytes_per_row;
        let len = self.buffer.width as usize * self.buffer.format.bytes_per_pixel();
        self.buffer.data.get_mut(start..start + len)
    }
}

impl Drop for PixelLock<'_> {
    fn drop(&mut self) {
        trace!("Pixel buffer unlocked");
    }
}

/// Convert a decoded image into a device buffer of the same size
///
/// The bitmap is drawn into (0, 0)-(width, height) with no scaling or
/// cropping. Alpha is flattened onto black and the alpha byte is set opaque.
pub fn convert(image: &RawImage) -> Result<DeviceImageBuffer, BufferAllocationError> {
    let mut buffer = DeviceImageBuffer::allocate(image.width, image.height)?;

    let src_row_len = image.width as usize * image.format.bytes_per_pixel();
    let expected = src_row_len * image.height as usize;
    if image.data.len() != expected || image.format != PixelFormat::RGBA8 {
        return Err(BufferAllocationError::SourceMismatch {
            expected,
            actual: image.data.len(),
        });
    }

    {
        let mut pixels = buffer.lock();
        for (y, src_row) in image.data.chunks_exact(src_row_len).enumerate() {
            let Some(dst_row) = pixels.row_mut(y as u32) else {
                break;
            };
            for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                let alpha = src[3] as u16;
                dst[0] = 0xFF;
                dst[1] = premultiply(src[0], alpha);
                dst[2] = premultiply(src[1], alpha);
                dst[3] = premultiply(src[2], alpha);
            }
        }
    }

    Ok(buffer)
}

fn premultiply(channel: u8, alpha: u16) -> u8 {
    ((channel as u16 * alpha + 127) / 255) as u8
}

fn align_up(value: usize, alignment: usize) -> Option<usize> {
    value
        .checked_add(alignment - 1)
        .map(|v| v / alignment * alignment)
}
