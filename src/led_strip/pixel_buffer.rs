use core::ops::Deref;

use super::color::{BLACK_RGBW, Rgbw, ToRgbw, rgbw};

/// The logical canvas for a strip of `N` LEDs, stored as [`Rgbw`].
///
/// The length is fixed by `N`. Writes to an index `>= N` are ignored rather than reported, so
/// a control loop can paint past the end of a short strip without checks.
///
/// Derefs to `[Rgbw; N]` for reading. Mutation goes through the setters so out-of-range
/// writes stay harmless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBuffer<const N: usize>([Rgbw; N]);

impl<const N: usize> PixelBuffer<N> {
    /// Number of LEDs in this buffer.
    pub const LEN: usize = N;

    /// Create a new blank (all off) buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self([BLACK_RGBW; N])
    }

    /// Create a buffer filled with a single color.
    #[must_use]
    pub fn filled(color: impl ToRgbw) -> Self {
        Self([color.to_rgbw(); N])
    }

    /// Set every pixel to `color`.
    pub fn set_all(&mut self, color: impl ToRgbw) {
        self.0.fill(color.to_rgbw());
    }

    /// Set one pixel. Out-of-range indices are ignored.
    pub fn set_pixel(&mut self, index: usize, color: impl ToRgbw) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = color.to_rgbw();
        }
    }

    /// Set one pixel from separate red, green, and blue values (white stays 0).
    pub fn set_pixel_rgb(&mut self, index: usize, r: u8, g: u8, b: u8) {
        self.set_pixel(index, rgbw(r, g, b, 0));
    }

    /// Turn every pixel off.
    pub fn clear(&mut self) {
        self.set_all(BLACK_RGBW);
    }

    /// The color at `index`, or `None` past the end.
    #[must_use]
    pub fn pixel(&self, index: usize) -> Option<Rgbw> {
        self.0.get(index).copied()
    }

    /// Number of LEDs in this buffer.
    #[must_use]
    pub const fn len(&self) -> usize {
        N
    }

    /// `true` for a zero-length strip.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<const N: usize> Deref for PixelBuffer<N> {
    type Target = [Rgbw; N];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> From<[Rgbw; N]> for PixelBuffer<N> {
    fn from(array: [Rgbw; N]) -> Self {
        Self(array)
    }
}

impl<const N: usize> From<PixelBuffer<N>> for [Rgbw; N] {
    fn from(buffer: PixelBuffer<N>) -> Self {
        buffer.0
    }
}

impl<const N: usize> Default for PixelBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
