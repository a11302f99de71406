//! A device abstraction for WS2812 (GRB) and SK6812 (GRBW) LED strips.
//!
//! [`LedStrip`] owns a [`PixelBuffer`], a [`ColorPipeline`] (brightness, optional gamma, and a
//! current ceiling), and a transmission engine that streams encoded frames through a PIO state
//! machine, fed by DMA when a channel is available and by blocking FIFO pushes otherwise.
//!
//! Set pixels, then call [`show`](LedStrip::show) (blocks until the LEDs latch) or
//! [`show_async`](LedStrip::show_async) followed later by [`wait`](LedStrip::wait).
//!
//! On the Pico, [`RpLedStrip`] is the ready-made alias; see [`rp`] for the hardware backend.
//!
//! # Example: Write a Single Frame
//!
//! In this example, we set every other LED to blue and gray on a 48-LED strip.
//!
//! ```no_run
//! # #![no_std]
//! # #![no_main]
//! # use panic_probe as _;
//! # use core::default::Default;
//! use pixel_wire::led_strip::{
//!     LedStripStatic, RpLedStrip, StripConfig, colors,
//!     rp::{DmaPool, PioBlock, RpBackend},
//! };
//! use static_cell::StaticCell;
//!
//! # #[embassy_executor::main]
//! # async fn main(_spawner: embassy_executor::Spawner) -> ! {
//! #     let err = example().unwrap_err();
//! #     core::panic!("{err}");
//! # }
//! fn example() -> pixel_wire::Result<core::convert::Infallible> {
//!     static DMA_POOL: DmaPool = DmaPool::new();
//!     static LED_STRIP_STATIC: StaticCell<LedStripStatic<48>> = StaticCell::new();
//!
//!     let p = embassy_rp::init(Default::default());
//!     DMA_POOL.add(p.DMA_CH0);
//!     let block = PioBlock::take(p.PIO0);
//!     let backend = RpBackend::new(block, p.PIN_3, Some(&DMA_POOL));
//!
//!     let mut led_strip: RpLedStrip<'_, _, 48> = RpLedStrip::new(
//!         LED_STRIP_STATIC.init(LedStripStatic::new()),
//!         backend,
//!         embassy_time::Delay,
//!         StripConfig::new(),
//!     );
//!     led_strip.begin()?;
//!     for index in 0..led_strip.size() {
//!         led_strip.set_pixel(index, [colors::BLUE, colors::GRAY][index % 2]);
//!     }
//!     led_strip.show();
//!     loop {
//!         cortex_m::asm::wfi();
//!     }
//! }
//! ```
//!
//! # Example: Host Testing
//!
//! Everything above the backend is hardware independent. Tests plug in a [`StripBackend`]
//! that records what the engine pushes; see `tests/led_strip_engine.rs`.

use embedded_hal::delay::DelayNs;

use crate::Result;

// ============================================================================
// Submodules
// ============================================================================

pub mod color;
pub mod encoder;
pub mod engine;
pub mod pipeline;
pub mod pixel_buffer;
#[cfg(target_os = "none")]
pub mod rp;

#[doc(inline)]
pub use color::{BLACK_RGBW, Rgb, Rgbw, ToRgbw, White, colors, hsv, rgbw};
#[doc(inline)]
pub use encoder::{WireFormat, encode, pack_grb24, pack_grbw32};
#[doc(inline)]
pub use engine::{
    BIT_RATE_DEFAULT_HZ, EngineState, LedStripStatic, RESET_LATCH_US, SlotRequest, StripBackend,
    TimingConfig, TimingSlot, Transfer, TransferChannel, TransmissionEngine,
};
#[doc(inline)]
pub use pipeline::{ColorPipeline, Current, GAMMA_EXPONENT, Gamma, scale_u8};
#[doc(inline)]
pub use pixel_buffer::PixelBuffer;

/// LED strip on an RP2040 / RP2350 PIO block, paced by `embassy_time`.
///
/// See the [module documentation](mod@crate::led_strip) for usage examples.
#[cfg(target_os = "none")]
pub type RpLedStrip<'a, PIO, const N: usize> =
    LedStrip<'a, rp::RpBackend<PIO>, embassy_time::Delay, N>;

// ============================================================================
// Configuration
// ============================================================================

/// Construction-time settings for a [`LedStrip`].
///
/// ```rust
/// use pixel_wire::led_strip::{SlotRequest, StripConfig, WireFormat};
///
/// let config = StripConfig::new()
///     .with_wire_format(WireFormat::Grbw32)
///     .with_slot(SlotRequest::Index(2));
/// assert_eq!(config.bit_rate_hz, 800_000);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct StripConfig {
    /// On-wire layout (GRB 24-bit or GRBW 32-bit).
    pub wire_format: WireFormat,
    /// Bit rate in Hz.
    pub bit_rate_hz: u32,
    /// Which state machine to claim.
    pub slot: SlotRequest,
    /// Idle time after each frame (µs), at least [`RESET_LATCH_US`].
    pub reset_latch_us: u32,
}

impl StripConfig {
    /// GRB at 800 kHz, any free state machine, 80 µs reset latch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            wire_format: WireFormat::Grb24,
            bit_rate_hz: BIT_RATE_DEFAULT_HZ,
            slot: SlotRequest::Auto,
            reset_latch_us: RESET_LATCH_US,
        }
    }

    /// Select the on-wire layout.
    #[must_use]
    pub const fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    /// Override the bit rate (400 kHz for some legacy strips).
    #[must_use]
    pub const fn with_bit_rate_hz(mut self, bit_rate_hz: u32) -> Self {
        self.bit_rate_hz = bit_rate_hz;
        self
    }

    /// Request a specific state machine instead of any free one.
    #[must_use]
    pub const fn with_slot(mut self, slot: SlotRequest) -> Self {
        self.slot = slot;
        self
    }

    /// Values below [`RESET_LATCH_US`] are raised to it.
    #[must_use]
    pub const fn with_reset_latch_us(mut self, reset_latch_us: u32) -> Self {
        self.reset_latch_us = if reset_latch_us < RESET_LATCH_US {
            RESET_LATCH_US
        } else {
            reset_latch_us
        };
        self
    }

    const fn timing(&self) -> TimingConfig {
        TimingConfig {
            wire_format: self.wire_format,
            bit_rate_hz: self.bit_rate_hz,
        }
    }
}

impl Default for StripConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LedStrip
// ============================================================================

/// One strip of `N` LEDs: pixels, color pipeline, and transmission engine.
///
/// Pixel and pipeline setters work before [`begin`](Self::begin); output operations before
/// `begin` (or after [`end`](Self::end)) do nothing. Dropping the strip aborts any transfer
/// and releases its hardware.
///
/// See the [module documentation](mod@crate::led_strip) for usage examples.
pub struct LedStrip<'a, B: StripBackend, D: DelayNs, const N: usize> {
    pixels: PixelBuffer<N>,
    pipeline: ColorPipeline,
    engine: TransmissionEngine<'a, B, D, N>,
}

impl<'a, B: StripBackend, D: DelayNs, const N: usize> LedStrip<'a, B, D, N> {
    /// Number of LEDs in this strip.
    pub const LEN: usize = N;

    /// Create a strip. No hardware is claimed until [`begin`](Self::begin).
    pub fn new(
        led_strip_static: &'a mut LedStripStatic<N>,
        backend: B,
        delay: D,
        config: StripConfig,
    ) -> Self {
        let mut engine =
            TransmissionEngine::new(led_strip_static, backend, delay, config.timing(), config.slot);
        engine.set_reset_latch_us(config.reset_latch_us);
        Self {
            pixels: PixelBuffer::new(),
            pipeline: ColorPipeline::new(),
            engine,
        }
    }

    /// Claim a state machine (and a DMA channel if one is free) and start the timing
    /// program. Clears the pixel buffer on success.
    ///
    /// # Errors
    ///
    /// Fails if no state machine is available, the requested one is taken or out of range,
    /// the program does not fit in instruction memory, or the bit rate is 0.
    pub fn begin(&mut self) -> Result<()> {
        self.engine.begin()?;
        self.pixels.clear();
        Ok(())
    }

    /// Stop output and release the hardware. Pixels and pipeline settings are kept.
    pub fn end(&mut self) {
        self.engine.end();
    }

    /// `true` between a successful [`begin`](Self::begin) and [`end`](Self::end).
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        !matches!(self.engine.state(), EngineState::Uninitialized)
    }

    /// Engine state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.engine.state()
    }

    /// `true` when frames move by DMA rather than blocking pushes.
    #[must_use]
    pub const fn has_dma(&self) -> bool {
        self.engine.has_transfer_channel()
    }

    /// Number of LEDs.
    #[must_use]
    pub const fn size(&self) -> usize {
        N
    }

    /// Wire format fixed at construction.
    #[must_use]
    pub const fn wire_format(&self) -> WireFormat {
        self.engine.timing().wire_format
    }

    // ------------------------------------------------------------------------
    // Pixels
    // ------------------------------------------------------------------------

    /// Set one pixel. Out-of-range indices are ignored. RGB colors store white as 0.
    pub fn set_pixel(&mut self, index: usize, color: impl ToRgbw) {
        self.pixels.set_pixel(index, color);
    }

    /// Set one pixel from separate channels (white stays 0).
    pub fn set_pixel_rgb(&mut self, index: usize, r: u8, g: u8, b: u8) {
        self.pixels.set_pixel_rgb(index, r, g, b);
    }

    /// Set every pixel.
    pub fn set_all(&mut self, color: impl ToRgbw) {
        self.pixels.set_all(color);
    }

    /// Turn every pixel off. Nothing is sent until the next show.
    pub fn clear(&mut self) {
        self.pixels.clear();
    }

    /// Read access to the pixel buffer.
    #[must_use]
    pub const fn pixels(&self) -> &PixelBuffer<N> {
        &self.pixels
    }

    // ------------------------------------------------------------------------
    // Color pipeline
    // ------------------------------------------------------------------------

    /// Global brightness applied at encode time (255 = unchanged).
    pub const fn set_brightness(&mut self, brightness: u8) {
        self.pipeline.set_brightness(brightness);
    }

    /// Global brightness.
    #[must_use]
    pub const fn brightness(&self) -> u8 {
        self.pipeline.brightness()
    }

    /// Turn the 2.2 gamma curve on or off.
    pub fn enable_gamma(&mut self, on: bool) {
        self.pipeline.enable_gamma(on);
    }

    /// Select the gamma curve.
    pub fn set_gamma(&mut self, gamma: Gamma) {
        self.pipeline.set_gamma(gamma);
    }

    /// Cap brightness so the whole strip at full white stays within `current`.
    pub const fn limit_current(&mut self, current: Current) {
        let wire_format = self.wire_format();
        self.pipeline.limit_current(current, N, wire_format);
    }

    /// Current pipeline settings.
    #[must_use]
    pub const fn pipeline(&self) -> &ColorPipeline {
        &self.pipeline
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Send the pixel buffer and block until the LEDs have latched it.
    pub fn show(&mut self) {
        self.engine.show(&self.pixels, &self.pipeline);
    }

    /// Start sending the pixel buffer and return immediately.
    ///
    /// The frame is encoded into a separate staging buffer first, so pixels may be changed
    /// right away without affecting the frame in flight.
    pub fn show_async(&mut self) {
        self.engine.show_async(&self.pixels, &self.pipeline);
    }

    /// `true` while a DMA transfer is moving the last frame.
    #[must_use]
    pub fn busy(&self) -> bool {
        self.engine.busy()
    }

    /// Block until the last frame is out and latched.
    pub fn wait(&mut self) {
        self.engine.wait();
    }

    /// Transmission words of the most recently sent frame.
    #[must_use]
    pub fn last_frame(&self) -> &[u32; N] {
        self.engine.last_frame()
    }

    /// Convert hue (degrees), saturation, and value to [`Rgb`]. Same as [`hsv`].
    #[must_use]
    pub fn hsv(hue: f32, saturation: f32, value: f32) -> Rgb {
        color::hsv(hue, saturation, value)
    }
}
