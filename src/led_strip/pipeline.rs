//! Per-channel color pipeline: optional gamma lookup, then brightness scaling.

use super::WireFormat;

/// Exponent of the fixed perceptual curve used when gamma is enabled.
pub const GAMMA_EXPONENT: f32 = 2.2;

/// Worst-case draw of one WS2812 LED at full white (mA).
const GRB_LED_MA: u32 = 60;

/// Worst-case draw of one SK6812 RGBW LED with all four dies lit (mA).
const GRBW_LED_MA: u32 = 80;

/// Gamma correction mode for LED strips.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Gamma {
    /// Linear gamma (no correction). Gamma = 1.0
    #[default]
    Linear,
    /// Standard gamma 2.2 correction for perceived brightness.
    Gamma2_2,
}

/// Power budget for a strip, turned into a brightness ceiling.
///
/// The ceiling is computed so the worst case (every LED at full brightness) stays within the
/// budget: 60 mA per GRB LED, 80 mA per GRBW LED.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Current {
    /// Limit brightness to stay within a specific milliamp budget.
    Milliamps(u16),
    /// No limit: the ceiling stays at 255.
    #[default]
    Unlimited,
}

impl Current {
    /// Maximum brightness that keeps `worst_case_ma` within this budget.
    ///
    /// Returns 255 for [`Current::Unlimited`] or when there is nothing to power.
    #[must_use]
    pub const fn max_brightness(self, worst_case_ma: u32) -> u8 {
        match self {
            Self::Milliamps(ma) => {
                if worst_case_ma == 0 {
                    return u8::MAX;
                }
                let scale = (ma as u32 * 255) / worst_case_ma;
                if scale > 255 { 255 } else { scale as u8 }
            }
            Self::Unlimited => u8::MAX,
        }
    }

    /// Worst-case draw of `led_count` LEDs of the given wire format.
    #[must_use]
    pub const fn worst_case_ma(led_count: usize, wire_format: WireFormat) -> u32 {
        let per_led = match wire_format {
            WireFormat::Grb24 => GRB_LED_MA,
            WireFormat::Grbw32 => GRBW_LED_MA,
        };
        (led_count as u32).saturating_mul(per_led)
    }
}

/// Scale `value` by `brightness / 255`, rounding to nearest.
///
/// Plain truncation would darken every channel by up to one step, which is visible at low
/// brightness. `scale_u8(v, 255) == v` and `scale_u8(v, 0) == 0`.
#[must_use]
pub const fn scale_u8(value: u8, brightness: u8) -> u8 {
    // Max numerator is 255 * 255 + 127 = 65_152, which fits in u16.
    ((value as u16 * brightness as u16 + 127) / 255) as u8
}

/// Brightness and gamma state applied to every channel at encode time.
///
/// The pixel buffer is never modified; the pipeline only shapes what goes on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorPipeline {
    brightness: u8,
    max_brightness: u8,
    gamma: Gamma,
    gamma_table: [u8; 256],
}

impl ColorPipeline {
    /// Full brightness, gamma off, no current ceiling.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            brightness: u8::MAX,
            max_brightness: u8::MAX,
            gamma: Gamma::Linear,
            gamma_table: identity_table(),
        }
    }

    /// Set the global brightness. Takes effect on the next encode.
    pub const fn set_brightness(&mut self, brightness: u8) {
        self.brightness = brightness;
    }

    /// Current global brightness (before the current ceiling).
    #[must_use]
    pub const fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Turn the 2.2 gamma curve on or off. Rebuilds the lookup table once.
    pub fn enable_gamma(&mut self, on: bool) {
        self.set_gamma(if on { Gamma::Gamma2_2 } else { Gamma::Linear });
    }

    /// Select the gamma curve. Rebuilds the lookup table once.
    pub fn set_gamma(&mut self, gamma: Gamma) {
        self.gamma = gamma;
        self.gamma_table = match gamma {
            Gamma::Linear => identity_table(),
            Gamma::Gamma2_2 => power_table(GAMMA_EXPONENT),
        };
    }

    /// `true` when the gamma curve is applied.
    #[must_use]
    pub fn gamma_enabled(&self) -> bool {
        self.gamma == Gamma::Gamma2_2
    }

    /// The active 256-entry lookup table (identity when gamma is off).
    #[must_use]
    pub const fn gamma_table(&self) -> &[u8; 256] {
        &self.gamma_table
    }

    /// Cap brightness so `led_count` LEDs of `wire_format` stay within `current`.
    pub const fn limit_current(&mut self, current: Current, led_count: usize, wire_format: WireFormat) {
        self.max_brightness = current.max_brightness(Current::worst_case_ma(led_count, wire_format));
    }

    /// Brightness ceiling set by [`limit_current`](Self::limit_current).
    #[must_use]
    pub const fn max_brightness(&self) -> u8 {
        self.max_brightness
    }

    /// Brightness actually applied to channels: the global brightness under the ceiling.
    #[must_use]
    pub const fn effective_brightness(&self) -> u8 {
        scale_u8(self.brightness, self.max_brightness)
    }

    /// Transform one 8-bit channel: gamma lookup (if enabled), then brightness scaling.
    #[must_use]
    pub fn apply(&self, value: u8) -> u8 {
        let corrected = self
            .gamma_table
            .get(usize::from(value))
            .copied()
            .unwrap_or(value);
        scale_u8(corrected, self.effective_brightness())
    }
}

impl Default for ColorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

const fn identity_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut index = 0;
    while index < 256 {
        table[index] = index as u8;
        index += 1;
    }
    table
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "powf of a value in 0.0..=1.0 stays in 0.0..=1.0 and float casts saturate"
)]
fn power_table(exponent: f32) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (input, output) in (0u8..=u8::MAX).zip(table.iter_mut()) {
        let normalized = f32::from(input) / 255.0;
        *output = libm::roundf(libm::powf(normalized, exponent) * 255.0) as u8;
    }
    table
}
