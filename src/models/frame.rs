// Data structures for corpus images and the pixel formats they pass through

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of one image in the remote corpus (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CorpusIndex(pub u32);

impl CorpusIndex {
    pub fn get(self) -> u32 {
        self.0
    }

    /// Next index, or `None` once the counter would overflow
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(CorpusIndex)
    }
}

impl fmt::Display for CorpusIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel layout of a bitmap or device buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit R, G, B, A in memory order
    RGBA8,
    /// 32-bit, alpha byte first, then R, G, B
    ARGB32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::RGBA8 | PixelFormat::ARGB32 => 4,
        }
    }
}

/// A decoded corpus image
#[derive(Clone, PartialEq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub format: PixelFormat,
}

impl RawImage {
    /// Wrap tightly packed RGBA8 pixels. Returns `None` when `data` does not
    /// hold exactly `width * height` pixels.
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(PixelFormat::RGBA8.bytes_per_pixel())?;
        if data.len() != expected {
            return None;
        }

        Some(Self {
            width,
            height,
            data,
            format: PixelFormat::RGBA8,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// RGBA components of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let offset = (y as usize * self.width as usize + x as usize) * bpp;
        let px = self.data.get(offset..offset + bpp)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl From<image::RgbaImage> for RawImage {
    fn from(img: image::RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
            format: PixelFormat::RGBA8,
        }
    }
}

// Pixel data omitted
impl fmt::Debug for RawImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Errors raised while fetching or decoding a corpus image
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected HTTP status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Invalid HTTP timeout: {0} seconds")]
    InvalidTimeout(f64),
}

pub type AcquisitionResult<T> = Result<T, AcquisitionError>;

/// Errors raised while building the device pixel buffer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferAllocationError {
    #[error("Cannot allocate a buffer for a {width}x{height} image")]
    ZeroSized { width: u32, height: u32 },

    #[error("Buffer for {width}x{height} exceeds addressable memory")]
    TooLarge { width: u32, height: u32 },

    #[error("Allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },

    #[error("Source image holds {actual} bytes, expected {expected}")]
    SourceMismatch { expected: usize, actual: usize },
}
