// THEORY:
// `PixelBuffer` is the raw-byte contract every effect is written against. It is the
// bridge between decoded images (owned by the `image` crate) and the byte-level
// transforms of the effect library.
//
// Key architectural principles:
// 1.  **Explicit Layout**: A buffer is `stride * height` bytes. Pixel `(row, col)`
//     lives at `row * stride + col * 4`, channels in blue, green, red, alpha order.
//     `stride = ceil(width * bits_per_pixel / 8)`, with no row padding.
// 2.  **Value Flow**: Buffers are never shared mutably. A transform takes a copy of
//     the bytes and `encode` wraps the result in a new buffer that reuses the
//     reference buffer's geometry and format. Only the bytes are replaced.
// 3.  **Decoding at the Edge**: Turning files into pixels (and back) is delegated to
//     the `image` crate. This module only converts between its RGBA images and our
//     BGRA byte layout.

use crate::core_modules::pixel::pixel::CHANNELS;
use crate::error::{ProcessorError, ProcessorResult};
use image::{DynamicImage, ImageError, ImageFormat, RgbaImage};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

/// Bits-per-pixel descriptor of a buffer. Channel order is fixed to BGRA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat {
    bits_per_pixel: u16,
}

impl PixelFormat {
    /// Four interleaved 8-bit channels: blue, green, red, alpha.
    pub const BGRA32: PixelFormat = PixelFormat { bits_per_pixel: 32 };

    pub fn new(bits_per_pixel: u16) -> ProcessorResult<Self> {
        if bits_per_pixel == 0 {
            return Err(ProcessorError::UnsupportedFormat(bits_per_pixel));
        }
        Ok(Self { bits_per_pixel })
    }

    pub fn bits_per_pixel(&self) -> u16 {
        self.bits_per_pixel
    }

    /// Byte length of one row of `width` pixels.
    pub fn stride_for(&self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel as usize).div_ceil(8)
    }

    pub fn is_bgra32(&self) -> bool {
        *self == Self::BGRA32
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::BGRA32
    }
}

/// Dimensions of a buffer as seen by the effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferGeometry {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels (rows).
    pub height: u32,
    /// Width of one row in bytes.
    pub stride: usize,
}

impl BufferGeometry {
    pub fn byte_len(&self) -> usize {
        self.stride * self.height as usize
    }

    /// Byte range of `row`.
    pub fn row_range(&self, row: u32) -> Range<usize> {
        let start = row as usize * self.stride;
        start..start + self.stride
    }

    /// Byte offset of pixel `(row, col)`.
    pub fn pixel_offset(&self, row: u32, col: u32) -> usize {
        row as usize * self.stride + col as usize * CHANNELS
    }
}

/// An exclusively owned block of raw pixel bytes plus its layout descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    bytes: Vec<u8>,
    geometry: BufferGeometry,
    format: PixelFormat,
}

impl PixelBuffer {
    /// Wraps raw bytes, validating them against the stride formula.
    pub fn from_raw(bytes: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> ProcessorResult<Self> {
        if width == 0 || height == 0 {
            return Err(ProcessorError::invalid_image(format!("zero-sized buffer ({width}x{height})")));
        }
        let geometry = BufferGeometry {
            width,
            height,
            stride: format.stride_for(width),
        };
        if bytes.len() != geometry.byte_len() {
            return Err(ProcessorError::LengthMismatch {
                expected: geometry.byte_len(),
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes, geometry, format })
    }

    /// Copies the pixels of a decoded image into a BGRA buffer.
    pub fn decode(image: &DynamicImage) -> ProcessorResult<Self> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(ProcessorError::invalid_image(format!("source image is {width}x{height}")));
        }

        let mut bytes = image.to_rgba8().into_raw();
        for pixel in bytes.chunks_exact_mut(CHANNELS) {
            pixel.swap(0, 2);
        }
        Self::from_raw(bytes, width, height, PixelFormat::BGRA32)
    }

    /// Builds a buffer from `bytes` reusing the geometry and format of `reference`.
    pub fn encode(bytes: Vec<u8>, reference: &PixelBuffer) -> ProcessorResult<Self> {
        if bytes.len() != reference.bytes.len() {
            return Err(ProcessorError::LengthMismatch {
                expected: reference.bytes.len(),
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes,
            geometry: reference.geometry,
            format: reference.format,
        })
    }

    /// Decodes an image file.
    pub fn load(path: impl AsRef<Path>) -> ProcessorResult<Self> {
        let path = path.as_ref();
        let image = image::open(path).map_err(decode_error)?;
        let buffer = Self::decode(&image)?;
        info!(path = %path.display(), width = buffer.width(), height = buffer.height(), "image loaded");
        Ok(buffer)
    }

    /// Decodes an in-memory encoded image (PNG, JPEG, ...).
    pub fn load_bytes(encoded: &[u8]) -> ProcessorResult<Self> {
        let image = image::load_from_memory(encoded).map_err(decode_error)?;
        Self::decode(&image)
    }

    /// Reassembles a displayable RGBA image.
    pub fn to_rgba_image(&self) -> ProcessorResult<RgbaImage> {
        if !self.format.is_bgra32() {
            return Err(ProcessorError::UnsupportedFormat(self.format.bits_per_pixel()));
        }
        let mut rgba = self.bytes.clone();
        for pixel in rgba.chunks_exact_mut(CHANNELS) {
            pixel.swap(0, 2);
        }
        RgbaImage::from_raw(self.width(), self.height(), rgba).ok_or(ProcessorError::LengthMismatch {
            expected: self.width() as usize * self.height() as usize * CHANNELS,
            actual: self.bytes.len(),
        })
    }

    /// Encodes the buffer to `path`; the format follows the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> ProcessorResult<()> {
        let path = path.as_ref();
        let format = ImageFormat::from_path(path)?;
        let image = DynamicImage::ImageRgba8(self.to_rgba_image()?);

        match format {
            // JPEG has no alpha channel.
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, format)?,
            _ => image.save_with_format(path, format)?,
        }
        debug!(path = %path.display(), ?format, "image saved");
        Ok(())
    }

    /// Fails with `MisalignedStride` unless the buffer can be walked in 4-byte pixels.
    pub fn require_pixel_addressable(&self) -> ProcessorResult<()> {
        if !self.format.is_bgra32() || self.geometry.stride % CHANNELS != 0 {
            return Err(ProcessorError::MisalignedStride {
                stride: self.geometry.stride,
                bits_per_pixel: self.format.bits_per_pixel(),
            });
        }
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    pub fn stride(&self) -> usize {
        self.geometry.stride
    }

    pub fn geometry(&self) -> BufferGeometry {
        self.geometry
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

fn decode_error(err: ImageError) -> ProcessorError {
    match err {
        ImageError::IoError(io) => ProcessorError::Io(io),
        other => ProcessorError::invalid_image(other.to_string()),
    }
}
