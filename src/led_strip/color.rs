//! Color value types and the HSV helper.

/// Predefined RGB color constants from the `smart_leds` crate.
///
/// Common colors include `RED`, `GREEN`, `BLUE`, `YELLOW`, `WHITE`, `BLACK`, `CYAN`, `MAGENTA`, `ORANGE`, `PURPLE`.
#[doc(inline)]
pub use smart_leds::colors;

pub use smart_leds::{RGB8, RGBW, White};

/// 8-bit RGB color re-exported from the `smart_leds` crate.
pub type Rgb = RGB8;

/// 8-bit RGBW color. The white channel lives in `a.0`; use [`rgbw`] to build one.
///
/// The white channel is only transmitted by GRBW (SK6812) strips.
pub type Rgbw = RGBW<u8>;

/// An RGBW value with every channel off.
pub const BLACK_RGBW: Rgbw = rgbw(0, 0, 0, 0);

/// Build an [`Rgbw`] from four channel values.
#[must_use]
pub const fn rgbw(r: u8, g: u8, b: u8, w: u8) -> Rgbw {
    Rgbw {
        r,
        g,
        b,
        a: White(w),
    }
}

/// Convert colors to the [`Rgbw`] layout stored in a pixel buffer.
///
/// RGB inputs store white as 0, so a strip can switch wire formats without repainting.
///
/// # Example
///
/// ```rust
/// use pixel_wire::led_strip::{Rgb, ToRgbw, rgbw};
///
/// assert_eq!(Rgb::new(1, 2, 3).to_rgbw(), rgbw(1, 2, 3, 0));
/// assert_eq!(rgbw(1, 2, 3, 4).to_rgbw(), rgbw(1, 2, 3, 4));
/// ```
pub trait ToRgbw {
    /// Convert this color to [`Rgbw`].
    #[must_use]
    fn to_rgbw(self) -> Rgbw;
}

impl ToRgbw for Rgb {
    #[inline]
    fn to_rgbw(self) -> Rgbw {
        rgbw(self.r, self.g, self.b, 0)
    }
}

impl ToRgbw for Rgbw {
    #[inline]
    fn to_rgbw(self) -> Rgbw {
        self
    }
}

impl ToRgbw for (u8, u8, u8) {
    #[inline]
    fn to_rgbw(self) -> Rgbw {
        rgbw(self.0, self.1, self.2, 0)
    }
}

/// Convert hue/saturation/value to [`Rgb`].
///
/// `hue` is in degrees and wraps (so `-30.0` and `330.0` are the same color). `saturation`
/// and `value` are clamped to `0.0..=1.0`; NaN counts as 0. Channels are rounded, not
/// truncated.
///
/// ```rust
/// use pixel_wire::led_strip::{Rgb, hsv};
///
/// assert_eq!(hsv(0.0, 1.0, 1.0), Rgb::new(255, 0, 0));
/// assert_eq!(hsv(480.0, 1.0, 1.0), Rgb::new(0, 255, 0));
/// ```
#[must_use]
pub fn hsv(hue: f32, saturation: f32, value: f32) -> Rgb {
    let hue = wrap_hue(hue);
    let saturation = clamp_unit(saturation);
    let value = clamp_unit(value);

    let chroma = value * saturation;
    let sector_position = hue / 60.0;
    let second = chroma * (1.0 - libm::fabsf(libm::fmodf(sector_position, 2.0) - 1.0));
    let offset = value - chroma;

    // `as u8` saturates, so a hue that rounded up to 360.0 lands in the last sector.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "hue is wrapped into 0.0..360.0"
    )]
    let sector = sector_position as u8;
    let (red, green, blue) = match sector {
        0 => (chroma, second, 0.0),
        1 => (second, chroma, 0.0),
        2 => (0.0, chroma, second),
        3 => (0.0, second, chroma),
        4 => (second, 0.0, chroma),
        _ => (chroma, 0.0, second),
    };

    Rgb::new(
        unit_to_channel(red + offset),
        unit_to_channel(green + offset),
        unit_to_channel(blue + offset),
    )
}

fn wrap_hue(hue: f32) -> f32 {
    if !hue.is_finite() {
        return 0.0;
    }
    let wrapped = libm::fmodf(hue, 360.0);
    if wrapped < 0.0 { wrapped + 360.0 } else { wrapped }
}

fn clamp_unit(component: f32) -> f32 {
    if component.is_nan() {
        0.0
    } else {
        component.clamp(0.0, 1.0)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "input is clamped to 0.0..=1.0 and float-to-int casts saturate"
)]
fn unit_to_channel(unit: f32) -> u8 {
    libm::roundf(unit * 255.0) as u8
}
