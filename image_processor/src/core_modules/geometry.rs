// THEORY:
// Geometric operations rearrange whole pixels instead of rewriting bytes. Only the
// horizontal mirror has a defined transform; the remaining operations are declared
// so hosts can offer them, and report `NotImplemented` instead of silently acting
// as the identity. That keeps "not built yet" distinguishable from "no-op".

use crate::core_modules::pixel::pixel::CHANNELS;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::{ProcessorError, ProcessorResult};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometricOp {
    MirrorHorizontally,
    MirrorVertically,
    Rotate,
    Downsample,
}

impl GeometricOp {
    pub const ALL: [GeometricOp; 4] = [
        GeometricOp::MirrorHorizontally,
        GeometricOp::MirrorVertically,
        GeometricOp::Rotate,
        GeometricOp::Downsample,
    ];

    /// Applies the operation to a copy of `buffer`.
    pub fn apply(self, buffer: &PixelBuffer) -> ProcessorResult<PixelBuffer> {
        match self {
            GeometricOp::MirrorHorizontally => mirror_horizontally(buffer),
            other => Err(ProcessorError::NotImplemented(other)),
        }
    }
}

impl fmt::Display for GeometricOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GeometricOp::MirrorHorizontally => "mirror horizontally",
            GeometricOp::MirrorVertically => "mirror vertically",
            GeometricOp::Rotate => "rotate",
            GeometricOp::Downsample => "downsample",
        })
    }
}

/// Reflects every row left to right: pixel `col` trades places with `width - 1 - col`.
pub fn mirror_horizontally(buffer: &PixelBuffer) -> ProcessorResult<PixelBuffer> {
    buffer.require_pixel_addressable()?;
    let geometry = buffer.geometry();
    let width = geometry.width as usize;
    let row_bytes = width * CHANNELS;
    let mut bytes = buffer.bytes().to_vec();

    for row in 0..geometry.height {
        let start = geometry.row_range(row).start;
        let pixels = &mut bytes[start..start + row_bytes];
        for col in 0..width / 2 {
            let mirror = width - 1 - col;
            let (left, right) = pixels.split_at_mut(mirror * CHANNELS);
            left[col * CHANNELS..(col + 1) * CHANNELS].swap_with_slice(&mut right[..CHANNELS]);
        }
    }

    PixelBuffer::encode(bytes, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel_buffer::PixelFormat;

    fn numbered(width: u32, height: u32) -> PixelBuffer {
        // Pixel n is [n, n, n, 255].
        let bytes = (0..width * height)
            .flat_map(|n| [n as u8, n as u8, n as u8, 255])
            .collect();
        PixelBuffer::from_raw(bytes, width, height, PixelFormat::BGRA32).unwrap()
    }

    fn pixel_ids(buffer: &PixelBuffer) -> Vec<u8> {
        buffer.bytes().chunks_exact(CHANNELS).map(|p| p[0]).collect()
    }

    #[test]
    fn mirror_reflects_each_row_of_an_odd_width_image() {
        let out = mirror_horizontally(&numbered(3, 2)).unwrap();
        assert_eq!(pixel_ids(&out), vec![2, 1, 0, 5, 4, 3]);
    }

    #[test]
    fn mirror_keeps_pixels_whole() {
        let source = PixelBuffer::from_raw(
            vec![1, 2, 3, 4, 5, 6, 7, 8],
            2,
            1,
            PixelFormat::BGRA32,
        )
        .unwrap();
        let out = GeometricOp::MirrorHorizontally.apply(&source).unwrap();
        assert_eq!(out.bytes(), &[5, 6, 7, 8, 1, 2, 3, 4]);
    }

    #[test]
    fn mirror_twice_is_identity() {
        let source = numbered(4, 3);
        let twice = mirror_horizontally(&mirror_horizontally(&source).unwrap()).unwrap();
        assert_eq!(twice, source);
    }

    #[test]
    fn declared_operations_report_not_implemented() {
        let source = numbered(2, 2);
        for op in GeometricOp::ALL {
            match op {
                GeometricOp::MirrorHorizontally => assert!(op.apply(&source).is_ok()),
                _ => assert!(matches!(op.apply(&source), Err(ProcessorError::NotImplemented(o)) if o == op)),
            }
        }
    }
}
