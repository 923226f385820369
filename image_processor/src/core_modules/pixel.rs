// THEORY:
// The `Pixel` module is the smallest unit of the buffer contract. Every pixel-aware
// effect reads four interleaved bytes in blue, green, red, alpha order and writes
// four bytes back. `Pixel` is a "dumb" data container for those four channels; it
// knows the per-channel arithmetic the effects need (luma weighting, wrapping
// intensity shifts) but nothing about rows, strides or buffers.
//
// All channel arithmetic wraps modulo 256. That wraparound is part of the visible
// output of several effects and must not be replaced by saturation.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;

    /// Bytes per pixel in the fixed BGRA layout.
    pub const CHANNELS: usize = 4;

    /// One BGRA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub blue: Channel,
        pub green: Channel,
        pub red: Channel,
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(blue: Channel, green: Channel, red: Channel, alpha: Channel) -> Self {
            Pixel {
                blue,
                green,
                red,
                alpha,
            }
        }

        /// Grey level `0.29 R + 0.59 G + 0.11 B`, truncated toward zero.
        pub fn grey(&self) -> Channel {
            let weighted = (0.29 * self.red as f64) + (0.59 * self.green as f64) + (0.11 * self.blue as f64);
            weighted as Channel
        }

        /// Subtracts `amount` from the colour channels with wraparound. Alpha is untouched.
        pub fn darken(self, amount: Channel) -> Self {
            Pixel {
                blue: self.blue.wrapping_sub(amount),
                green: self.green.wrapping_sub(amount),
                red: self.red.wrapping_sub(amount),
                alpha: self.alpha,
            }
        }

        /// Forces blue, green and red to `value`. Alpha is untouched.
        pub fn with_colour(self, value: Channel) -> Self {
            Pixel {
                blue: value,
                green: value,
                red: value,
                alpha: self.alpha,
            }
        }

        /// Writes the pixel into the first four bytes of `bytes`.
        pub fn write_to(&self, bytes: &mut [Byte]) {
            bytes[..CHANNELS].copy_from_slice(&<[Byte; CHANNELS]>::from(*self));
        }
    }

    impl From<[Byte; CHANNELS]> for Pixel {
        fn from(bytes: [Byte; CHANNELS]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<&[Byte]> for Pixel {
        /// Reads the first four bytes. Callers hand in `chunks_exact(CHANNELS)` slices.
        fn from(bytes: &[Byte]) -> Self {
            Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
        }
    }

    impl From<Pixel> for [Byte; CHANNELS] {
        fn from(pixel: Pixel) -> Self {
            [pixel.blue, pixel.green, pixel.red, pixel.alpha]
        }
    }
}
