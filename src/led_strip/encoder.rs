//! Frame encoding: pixel buffer + pipeline → one 32-bit FIFO word per LED.
//!
//! The state machine shifts words out MSB first and autopulls after 24 or 32 bits, so every
//! word must carry its significant bits at the top.

use super::color::Rgbw;
use super::pipeline::ColorPipeline;
use super::pixel_buffer::PixelBuffer;

/// On-wire layout of one pixel. Fixed per strip.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum WireFormat {
    /// WS2812 / WS2812B: green, red, blue, 24 bits per LED.
    #[default]
    Grb24,
    /// SK6812 RGBW: green, red, blue, white, 32 bits per LED.
    Grbw32,
}

impl WireFormat {
    /// Bits the state machine pulls per LED (its autopull threshold).
    #[must_use]
    pub const fn bits_per_pixel(self) -> u8 {
        match self {
            Self::Grb24 => 24,
            Self::Grbw32 => 32,
        }
    }

    /// Pack one already-corrected pixel into a transmission word.
    #[must_use]
    pub const fn pack(self, pixel: Rgbw) -> u32 {
        match self {
            Self::Grb24 => pack_grb24(pixel.r, pixel.g, pixel.b),
            Self::Grbw32 => pack_grbw32(pixel.r, pixel.g, pixel.b, pixel.a.0),
        }
    }
}

/// `G:31-24 R:23-16 B:15-8`, low byte zero: the 24-bit GRB value shifted up by 8.
#[must_use]
pub const fn pack_grb24(r: u8, g: u8, b: u8) -> u32 {
    let grb = ((g as u32) << 16) | ((r as u32) << 8) | b as u32;
    grb << 8
}

/// `G:31-24 R:23-16 B:15-8 W:7-0`. All 32 bits are significant.
#[must_use]
pub const fn pack_grbw32(r: u8, g: u8, b: u8, w: u8) -> u32 {
    ((g as u32) << 24) | ((r as u32) << 16) | ((b as u32) << 8) | w as u32
}

/// Encode `pixels` through `pipeline` into `words`, one word per pixel, same order.
///
/// Writes in place into a caller-owned buffer so repeated frames never allocate. The GRB
/// path never reads the white channel.
pub fn encode<const N: usize>(
    pixels: &PixelBuffer<N>,
    pipeline: &ColorPipeline,
    wire_format: WireFormat,
    words: &mut [u32; N],
) {
    match wire_format {
        WireFormat::Grb24 => {
            for (word, pixel) in words.iter_mut().zip(pixels.iter()) {
                *word = pack_grb24(
                    pipeline.apply(pixel.r),
                    pipeline.apply(pixel.g),
                    pipeline.apply(pixel.b),
                );
            }
        }
        WireFormat::Grbw32 => {
            for (word, pixel) in words.iter_mut().zip(pixels.iter()) {
                *word = pack_grbw32(
                    pipeline.apply(pixel.r),
                    pipeline.apply(pixel.g),
                    pipeline.apply(pixel.b),
                    pipeline.apply(pixel.a.0),
                );
            }
        }
    }
}
