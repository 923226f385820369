// THEORY:
// The `EffectLibrary` is the catalogue of named, pure byte transforms. Each effect
// takes the full byte sequence of a buffer (length `stride * height`) plus the
// buffer's geometry and rewrites the bytes in place. The library always hands the
// effect a fresh copy, so the pre-image stays valid for a later reset.
//
// Key architectural principles:
// 1.  **Bit-exact Semantics**: The effects are deliberately crude. Several of them
//     ignore pixel structure, step through the bytes at strides that drift against
//     the 4-byte pixels, or rely on 8-bit wraparound. Those artifacts ARE the output
//     and are reproduced exactly.
// 2.  **Length Preservation**: An effect may only rewrite bytes, never resize the
//     slice. `PixelBuffer::encode` re-checks the length on the way out.
// 3.  **Registry, not Switch**: Effects are looked up by their display label through
//     `EffectDescriptor`s, so hosts can list, select and run them without knowing
//     which function backs which name.

use crate::core_modules::pixel::pixel::{CHANNELS, Pixel};
use crate::core_modules::pixel_buffer::{BufferGeometry, PixelBuffer};
use crate::error::{ProcessorError, ProcessorResult};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Fixed byte displacement of the Slideshow Effect.
pub const SLIDESHOW_OFFSET: usize = 180;
/// Default cell size, in pixels, of the checkered overlay.
pub const DEFAULT_GRID_SIZE: u32 = 64;

const IMBALANCE_STEP: usize = 3;
const IMBALANCE_DARKEN: u8 = 10;
const IMBALANCE_BOOST: u8 = 100;
const INTENSITY_SHIFT: u8 = 10;
const ROW_BAND_PERIOD: u32 = 15;
const OVERLAY_BLUE: u8 = 255;

/// The fixed set of effects a buffer can be run through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectName {
    FlipByteArray,
    InvertColours,
    ShiftColourChannels,
    ImbalancedByteOperation,
    ColourIntensityShift,
    SlideshowEffect,
    BlackAndWhite,
    /// Listed as the bare "8." entry in the catalogue.
    GridRowOverlay,
    CheckeredOverlay,
}

impl EffectName {
    /// Catalogue order.
    pub const ALL: [EffectName; 9] = [
        EffectName::FlipByteArray,
        EffectName::InvertColours,
        EffectName::ShiftColourChannels,
        EffectName::ImbalancedByteOperation,
        EffectName::ColourIntensityShift,
        EffectName::SlideshowEffect,
        EffectName::BlackAndWhite,
        EffectName::GridRowOverlay,
        EffectName::CheckeredOverlay,
    ];

    /// The numbered label shown in the effect picker.
    pub fn label(self) -> &'static str {
        match self {
            EffectName::FlipByteArray => "1. Flip Byte Array",
            EffectName::InvertColours => "2. Invert Colours",
            EffectName::ShiftColourChannels => "3. Shift Colour Channels",
            EffectName::ImbalancedByteOperation => "4. Imbalanced Byte Operation",
            EffectName::ColourIntensityShift => "5. Colour Intensity Shift",
            EffectName::SlideshowEffect => "6. Slideshow Effect",
            EffectName::BlackAndWhite => "7. Black and White Effect",
            EffectName::GridRowOverlay => "8.",
            EffectName::CheckeredOverlay => "9. Add Checkered Overlay",
        }
    }

    /// The label without its catalogue number.
    pub fn name(self) -> &'static str {
        match self {
            EffectName::FlipByteArray => "Flip Byte Array",
            EffectName::InvertColours => "Invert Colours",
            EffectName::ShiftColourChannels => "Shift Colour Channels",
            EffectName::ImbalancedByteOperation => "Imbalanced Byte Operation",
            EffectName::ColourIntensityShift => "Colour Intensity Shift",
            EffectName::SlideshowEffect => "Slideshow Effect",
            EffectName::BlackAndWhite => "Black and White Effect",
            EffectName::GridRowOverlay => "Grid Row Overlay",
            EffectName::CheckeredOverlay => "Add Checkered Overlay",
        }
    }

    /// Effects that walk the bytes as 4-byte BGRA pixels.
    pub fn is_pixel_addressed(self) -> bool {
        matches!(
            self,
            EffectName::ColourIntensityShift
                | EffectName::BlackAndWhite
                | EffectName::GridRowOverlay
                | EffectName::CheckeredOverlay
        )
    }
}

impl fmt::Display for EffectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EffectName {
    type Err = ProcessorError;

    /// Accepts the numbered label or the bare name, ignoring ASCII case.
    fn from_str(selection: &str) -> Result<Self, Self::Err> {
        let selection = selection.trim();
        EffectName::ALL
            .into_iter()
            .find(|effect| {
                effect.label().eq_ignore_ascii_case(selection) || effect.name().eq_ignore_ascii_case(selection)
            })
            .ok_or_else(|| ProcessorError::UnknownEffect(selection.to_string()))
    }
}

/// Everything an effect may read besides the bytes themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectContext {
    pub geometry: BufferGeometry,
    /// Cell size of the checkered overlay, in pixels.
    pub grid_size: u32,
}

/// A length-preserving, in-place byte transform.
pub type EffectFn = fn(&mut [u8], &EffectContext);

/// A registered effect.
#[derive(Debug, Clone, Copy)]
pub struct EffectDescriptor {
    pub name: EffectName,
    pub transform: EffectFn,
}

/// Registry of every effect, keyed by name.
#[derive(Debug, Clone)]
pub struct EffectLibrary {
    effects: Vec<EffectDescriptor>,
    grid_size: u32,
}

impl EffectLibrary {
    /// Registers the full catalogue with the given checkered-overlay cell size.
    pub fn new(grid_size: u32) -> Self {
        let effects = EffectName::ALL
            .into_iter()
            .map(|name| EffectDescriptor {
                name,
                transform: transform_for(name),
            })
            .collect();
        Self { effects, grid_size }
    }

    /// Labels in catalogue order, for a host's effect picker.
    pub fn labels(&self) -> Vec<&'static str> {
        self.effects.iter().map(|descriptor| descriptor.name.label()).collect()
    }

    pub fn descriptors(&self) -> &[EffectDescriptor] {
        &self.effects
    }

    pub fn get(&self, name: EffectName) -> Option<&EffectDescriptor> {
        self.effects.iter().find(|descriptor| descriptor.name == name)
    }

    /// Resolves a selection string to a registered effect.
    pub fn lookup(&self, selection: &str) -> ProcessorResult<&EffectDescriptor> {
        let name: EffectName = selection.parse()?;
        self.get(name)
            .ok_or_else(|| ProcessorError::UnknownEffect(selection.to_string()))
    }

    /// Runs the selected effect on a copy of `buffer` and re-encodes the result.
    pub fn apply(&self, buffer: &PixelBuffer, selection: &str) -> ProcessorResult<PixelBuffer> {
        let descriptor = self.lookup(selection)?;
        if descriptor.name.is_pixel_addressed() {
            buffer.require_pixel_addressable()?;
        }

        let context = EffectContext {
            geometry: buffer.geometry(),
            grid_size: self.grid_size,
        };
        let mut bytes = buffer.bytes().to_vec();
        (descriptor.transform)(&mut bytes, &context);
        debug!(effect = %descriptor.name, bytes = bytes.len(), "effect applied");

        PixelBuffer::encode(bytes, buffer)
    }
}

impl Default for EffectLibrary {
    fn default() -> Self {
        Self::new(DEFAULT_GRID_SIZE)
    }
}

fn transform_for(name: EffectName) -> EffectFn {
    match name {
        EffectName::FlipByteArray => flip_byte_array,
        EffectName::InvertColours => invert_colours,
        EffectName::ShiftColourChannels => shift_colour_channels,
        EffectName::ImbalancedByteOperation => imbalanced_byte_operation,
        EffectName::ColourIntensityShift => colour_intensity_shift,
        EffectName::SlideshowEffect => slideshow_effect,
        EffectName::BlackAndWhite => black_and_white,
        EffectName::GridRowOverlay => grid_row_overlay,
        EffectName::CheckeredOverlay => checkered_overlay,
    }
}

/// Reverses the whole sequence, channel order and row order included.
pub fn flip_byte_array(bytes: &mut [u8], _context: &EffectContext) {
    bytes.reverse();
}

/// `b = 255 - b` for every byte, alpha included.
pub fn invert_colours(bytes: &mut [u8], _context: &EffectContext) {
    for byte in bytes.iter_mut() {
        *byte = 255 - *byte;
    }
}

/// Swaps each byte with its successor, one pair after another. The first byte
/// rides the swaps all the way to the end.
pub fn shift_colour_channels(bytes: &mut [u8], _context: &EffectContext) {
    for i in 0..bytes.len().saturating_sub(1) {
        bytes.swap(i, i + 1);
    }
}

/// Every third byte loses 10 and the byte two further on gains 100. The step of
/// three drifts across the 4-byte pixels.
pub fn imbalanced_byte_operation(bytes: &mut [u8], _context: &EffectContext) {
    for i in (0..bytes.len().saturating_sub(1)).step_by(IMBALANCE_STEP) {
        bytes[i] = bytes[i].wrapping_sub(IMBALANCE_DARKEN);
        // The partner byte can fall off the end of the last step.
        if let Some(partner) = bytes.get_mut(i + 2) {
            *partner = partner.wrapping_add(IMBALANCE_BOOST);
        }
    }
}

/// Subtracts 10 from blue, green and red of every pixel.
pub fn colour_intensity_shift(bytes: &mut [u8], _context: &EffectContext) {
    for chunk in bytes.chunks_exact_mut(CHANNELS) {
        Pixel::from(&*chunk).darken(INTENSITY_SHIFT).write_to(chunk);
    }
}

/// Swaps byte `i` with byte `(i + 180) % len` for every `i` but the last.
pub fn slideshow_effect(bytes: &mut [u8], _context: &EffectContext) {
    let len = bytes.len();
    for i in 0..len.saturating_sub(1) {
        bytes.swap(i, (i + SLIDESHOW_OFFSET) % len);
    }
}

/// Replaces blue, green and red with the truncated luma of the pixel.
pub fn black_and_white(bytes: &mut [u8], _context: &EffectContext) {
    for chunk in bytes.chunks_exact_mut(CHANNELS) {
        let pixel = Pixel::from(&*chunk);
        pixel.with_colour(pixel.grey()).write_to(chunk);
    }
}

/// Paints every pixel of each 15th "row" with the row number.
///
/// The row counter advances whenever the *byte* offset is a multiple of the
/// *pixel* width, so it only matches the true row index for some widths.
pub fn grid_row_overlay(bytes: &mut [u8], context: &EffectContext) {
    let width = context.geometry.width as usize;
    let mut row: u32 = 0;
    for (index, chunk) in bytes.chunks_exact_mut(CHANNELS).enumerate() {
        if (index * CHANNELS) % width == 0 {
            row += 1;
        }
        if row % ROW_BAND_PERIOD == 0 {
            Pixel::from(&*chunk).with_colour(row as u8).write_to(chunk);
        }
    }
}

/// Draws a grid of `grid_size`-pixel cells in max blue, one row at a time.
///
/// The first row is skipped. Within a row, every byte at a non-zero multiple of
/// `grid_size * 4` becomes 255. Every `grid_size`-th row has all of its blue bytes
/// set to 255.
pub fn checkered_overlay(bytes: &mut [u8], context: &EffectContext) {
    let geometry = context.geometry;
    let cell_bytes = context.grid_size as usize * CHANNELS;
    let mut scratch = vec![0u8; geometry.stride];
    let mut rows_since_line = 0u32;

    for row in 1..geometry.height {
        let range = geometry.row_range(row);
        scratch.copy_from_slice(&bytes[range.clone()]);

        let mut column_count = 0usize;
        for byte in scratch.iter_mut() {
            if column_count == cell_bytes {
                column_count = 0;
                *byte = OVERLAY_BLUE;
            }
            column_count += 1;
        }

        if rows_since_line == context.grid_size {
            rows_since_line = 0;
            for blue in scratch.iter_mut().step_by(CHANNELS) {
                *blue = OVERLAY_BLUE;
            }
        }

        bytes[range].copy_from_slice(&scratch);
        rows_since_line += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pixel_buffer::PixelFormat;

    fn buffer(width: u32, height: u32, bytes: Vec<u8>) -> PixelBuffer {
        PixelBuffer::from_raw(bytes, width, height, PixelFormat::BGRA32).unwrap()
    }

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let len = (width * height) as usize * CHANNELS;
        buffer(width, height, (0..len).map(|i| (i * 7 % 256) as u8).collect())
    }

    fn opaque_black(width: u32, height: u32) -> PixelBuffer {
        let mut bytes = vec![0u8; (width * height) as usize * CHANNELS];
        for alpha in bytes.iter_mut().skip(3).step_by(CHANNELS) {
            *alpha = 255;
        }
        buffer(width, height, bytes)
    }

    #[test]
    fn invert_matches_the_reference_2x2() {
        let source = buffer(
            2,
            2,
            vec![10, 20, 30, 255, 40, 50, 60, 255, 70, 80, 90, 255, 100, 110, 120, 255],
        );
        assert_eq!(source.stride(), 8);
        let inverted = EffectLibrary::default().apply(&source, "2. Invert Colours").unwrap();
        assert_eq!(
            inverted.bytes(),
            &[245, 235, 225, 0, 215, 205, 195, 0, 185, 175, 165, 0, 155, 145, 135, 0]
        );
    }

    #[test]
    fn invert_and_flip_are_involutions() {
        let library = EffectLibrary::default();
        let source = gradient(7, 5);
        for effect in [EffectName::InvertColours, EffectName::FlipByteArray] {
            let once = library.apply(&source, effect.label()).unwrap();
            assert_ne!(once, source, "{effect} should change the gradient");
            let twice = library.apply(&once, effect.label()).unwrap();
            assert_eq!(twice, source, "{effect} applied twice");
        }
    }

    #[test]
    fn every_effect_preserves_geometry_and_length() {
        let library = EffectLibrary::new(2);
        for (width, height) in [(1, 1), (2, 2), (3, 2), (5, 7), (17, 3), (64, 66)] {
            let source = gradient(width, height);
            for effect in EffectName::ALL {
                let out = library.apply(&source, effect.label()).unwrap();
                assert_eq!(out.bytes().len(), source.bytes().len(), "{effect} on {width}x{height}");
                assert_eq!(out.geometry(), source.geometry());
                assert_eq!(out.format(), source.format());
            }
        }
    }

    #[test]
    fn flip_reverses_channel_and_row_order() {
        let source = buffer(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let out = EffectLibrary::default().apply(&source, "Flip Byte Array").unwrap();
        assert_eq!(out.bytes(), &[8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn shift_carries_the_first_byte_to_the_end() {
        let source = buffer(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let out = EffectLibrary::default().apply(&source, "3. Shift Colour Channels").unwrap();
        assert_eq!(out.bytes(), &[2, 3, 4, 5, 6, 7, 8, 1]);
    }

    #[test]
    fn imbalanced_steps_by_three_and_skips_the_overhang() {
        let source = buffer(2, 1, vec![0; 8]);
        let out = EffectLibrary::default().apply(&source, "4. Imbalanced Byte Operation").unwrap();
        // i = 0, 3, 6; the partner of 6 would be byte 8.
        assert_eq!(out.bytes(), &[246, 0, 100, 246, 0, 100, 246, 0]);
    }

    #[test]
    fn intensity_shift_wraps_and_keeps_alpha() {
        let source = buffer(2, 1, vec![5, 10, 200, 255, 0, 100, 9, 0]);
        let out = EffectLibrary::default().apply(&source, "5. Colour Intensity Shift").unwrap();
        assert_eq!(out.bytes(), &[251, 0, 190, 255, 246, 90, 255, 0]);
    }

    #[test]
    fn slideshow_swaps_at_a_fixed_offset() {
        // 180 % 8 == 4; the later swaps partly undo the earlier ones.
        let source = buffer(2, 1, (0..8).collect());
        let out = EffectLibrary::default().apply(&source, "6. Slideshow Effect").unwrap();
        assert_eq!(out.bytes(), &[0, 1, 2, 7, 4, 5, 6, 3]);
    }

    #[test]
    fn black_and_white_equalises_colour_channels() {
        let out = EffectLibrary::default()
            .apply(&gradient(9, 4), "7. Black and White Effect")
            .unwrap();
        for pixel in out.bytes().chunks_exact(CHANNELS) {
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
        let single = buffer(1, 1, vec![10, 20, 30, 77]);
        let out = EffectLibrary::default().apply(&single, "Black and White Effect").unwrap();
        assert_eq!(out.bytes(), &[21, 21, 21, 77]);
    }

    #[test]
    fn grid_row_overlay_counts_pixels_on_a_one_pixel_wide_image() {
        // Every byte offset is a multiple of width 1, so each pixel is a new "row".
        let out = EffectLibrary::default().apply(&opaque_black(1, 30), "8.").unwrap();
        for (index, pixel) in out.bytes().chunks_exact(CHANNELS).enumerate() {
            let expected = match index {
                14 => [15, 15, 15, 255],
                29 => [30, 30, 30, 255],
                _ => [0, 0, 0, 255],
            };
            assert_eq!(pixel, expected, "pixel {index}");
        }
    }

    #[test]
    fn grid_row_overlay_bands_the_fifteenth_row_of_a_three_pixel_image() {
        let out = EffectLibrary::default().apply(&opaque_black(3, 15), "Grid Row Overlay").unwrap();
        for (index, pixel) in out.bytes().chunks_exact(CHANNELS).enumerate() {
            let expected = if index >= 42 { [15, 15, 15, 255] } else { [0, 0, 0, 255] };
            assert_eq!(pixel, expected, "pixel {index}");
        }
    }

    #[test]
    fn checkered_overlay_draws_columns_and_every_grid_size_row() {
        let out = EffectLibrary::new(2)
            .apply(&buffer(5, 4, vec![0; 80]), "9. Add Checkered Overlay")
            .unwrap();
        let rows: Vec<&[u8]> = out.bytes().chunks_exact(20).collect();

        assert!(rows[0].iter().all(|&b| b == 0));
        for row in &rows[1..3] {
            for (i, &byte) in row.iter().enumerate() {
                assert_eq!(byte, if i == 8 || i == 16 { 255 } else { 0 }, "byte {i}");
            }
        }
        for (i, &byte) in rows[3].iter().enumerate() {
            assert_eq!(byte, if i % 4 == 0 { 255 } else { 0 }, "byte {i}");
        }
    }

    #[test]
    fn selections_accept_labels_and_bare_names() {
        assert_eq!("2. Invert Colours".parse::<EffectName>().unwrap(), EffectName::InvertColours);
        assert_eq!(" invert colours ".parse::<EffectName>().unwrap(), EffectName::InvertColours);
        assert_eq!("8.".parse::<EffectName>().unwrap(), EffectName::GridRowOverlay);
        assert_eq!("Grid Row Overlay".parse::<EffectName>().unwrap(), EffectName::GridRowOverlay);
        assert_eq!(EffectName::CheckeredOverlay.to_string(), "9. Add Checkered Overlay");
    }

    #[test]
    fn unknown_selection_is_reported() {
        let err = EffectLibrary::default().apply(&gradient(2, 2), "10. Sparkle").unwrap_err();
        assert!(matches!(err, ProcessorError::UnknownEffect(name) if name == "10. Sparkle"));
    }

    #[test]
    fn pixel_effects_reject_unaligned_buffers() {
        let library = EffectLibrary::default();
        let bgr = PixelBuffer::from_raw(vec![1; 9], 3, 1, PixelFormat::new(24).unwrap()).unwrap();
        assert!(matches!(
            library.apply(&bgr, "7. Black and White Effect"),
            Err(ProcessorError::MisalignedStride { .. })
        ));
        assert_eq!(library.apply(&bgr, "2. Invert Colours").unwrap().bytes(), &[254; 9]);
    }

    #[test]
    fn every_descriptor_runs_its_own_transform() {
        let library = EffectLibrary::new(2);
        let source = gradient(6, 5);
        assert_eq!(library.descriptors().len(), EffectName::ALL.len());
        for descriptor in library.descriptors() {
            let mut bytes = source.bytes().to_vec();
            let context = EffectContext {
                geometry: source.geometry(),
                grid_size: 2,
            };
            (descriptor.transform)(&mut bytes, &context);
            let applied = library.apply(&source, descriptor.name.label()).unwrap();
            assert_eq!(applied.bytes(), bytes.as_slice(), "{}", descriptor.name);
        }
    }

    #[test]
    fn labels_follow_catalogue_order() {
        let labels = EffectLibrary::default().labels();
        assert_eq!(labels.len(), 9);
        assert_eq!(labels[0], "1. Flip Byte Array");
        assert_eq!(labels[7], "8.");
        assert_eq!(labels[8], "9. Add Checkered Overlay");
    }
}
