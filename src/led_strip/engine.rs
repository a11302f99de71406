//! Transmission engine: owns the claimed state machine, the optional DMA channel, and the
//! staging buffer the DMA reads from.
//!
//! The engine is written against three small traits so the same state machine drives the
//! PIO/DMA hardware on the Pico and a recording fake in host tests:
//!
//! - [`TimingSlot`]: one claimed execution slot (PIO state machine) already running the
//!   timing program for a pin, bit rate, and word width.
//! - [`TransferChannel`]: a DMA channel bound to that slot's TX FIFO and data request.
//! - [`StripBackend`]: claims both.
//!
//! ```text
//! Uninitialized --begin--> Ready --show_async--> Transmitting --wait--> Ready
//!       ^                    |  \--show (blocks through the latch)--/
//!       +-------end----------+------------------end------------------+
//! ```

use core::hint::spin_loop;

use embedded_hal::delay::DelayNs;

use super::encoder::{WireFormat, encode};
use super::pipeline::ColorPipeline;
use super::pixel_buffer::PixelBuffer;
use crate::{Error, Result};

/// Minimum idle time after the last bit before the LEDs latch a frame (µs).
pub const RESET_LATCH_US: u32 = 80;

/// Standard WS2812 / SK6812 bit rate.
pub const BIT_RATE_DEFAULT_HZ: u32 = 800_000;

/// Which state machine a strip claims on its PIO block.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum SlotRequest {
    /// Take the lowest-numbered free state machine.
    #[default]
    Auto,
    /// Take exactly this state machine (0..=3) or fail.
    Index(u8),
}

/// What the timing program needs to know about a strip.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub struct TimingConfig {
    /// Wire format, which fixes the autopull threshold (24 or 32 bits).
    pub wire_format: WireFormat,
    /// Bit rate in Hz (800 kHz standard, 400 kHz for some legacy strips).
    pub bit_rate_hz: u32,
}

impl TimingConfig {
    /// Time for one pixel word to shift out of the output shift register, rounded up (µs).
    #[must_use]
    pub const fn word_time_us(&self) -> u32 {
        if self.bit_rate_hz == 0 {
            return 0;
        }
        let bits = self.wire_format.bits_per_pixel() as u32;
        (bits * 1_000_000).div_ceil(self.bit_rate_hz)
    }
}

/// One claimed execution slot running the timing program.
pub trait TimingSlot {
    /// Index of the slot on its block (for logs).
    fn index(&self) -> u8;

    /// Queue one word. Returns `false` without queueing when the FIFO is full.
    fn try_push(&mut self, word: u32) -> bool;

    /// `true` once the FIFO is empty (the last word may still be shifting out).
    fn is_drained(&mut self) -> bool;

    /// Stop the slot and hand it back to its block.
    fn release(self);
}

/// An asynchronous bulk-transfer channel feeding a [`TimingSlot`]'s FIFO.
pub trait TransferChannel {
    /// Start copying `words` into the FIFO, paced by the slot's data request.
    ///
    /// The caller must keep `words` alive and unmodified until [`is_busy`](Self::is_busy)
    /// returns `false` or [`abort`](Self::abort) returns.
    fn start(&mut self, words: &[u32]);

    /// `true` while a transfer is in progress.
    fn is_busy(&self) -> bool;

    /// Stop any transfer in progress and return once the channel is idle.
    fn abort(&mut self);

    /// Hand the channel back to whoever lent it.
    fn release(self);
}

/// Source of hardware for a strip.
pub trait StripBackend {
    /// Claimed execution slot type.
    type Slot: TimingSlot;
    /// Transfer channel type.
    type Channel: TransferChannel;

    /// Claim and configure an execution slot, loading the timing program if this block does
    /// not have it yet.
    ///
    /// # Errors
    ///
    /// Returns an error if no matching slot is free or the program cannot be loaded.
    fn claim_slot(&mut self, request: SlotRequest, timing: &TimingConfig) -> Result<Self::Slot>;

    /// Try to claim a transfer channel bound to `slot`. `None` is not an error: the engine
    /// falls back to pushing words itself.
    fn claim_channel(&mut self, slot: &Self::Slot) -> Option<Self::Channel>;
}

/// The transfer channel a strip ended up with.
#[derive(Debug)]
pub enum Transfer<C> {
    /// Frames are moved by the channel.
    Available(C),
    /// Frames are pushed word by word, blocking while the FIFO is full.
    Unavailable,
}

/// Observable engine state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum EngineState {
    /// No hardware claimed.
    Uninitialized,
    /// Hardware claimed, no frame outstanding.
    Ready,
    /// A frame was started by `show_async` and its latch has not been waited for.
    Transmitting,
}

/// Staging storage for one frame of transmission words.
///
/// The engine borrows it for its whole lifetime, so a DMA transfer reading from it can never
/// outlive it, even if the strip value itself is moved.
///
/// See [`LedStrip`](crate::led_strip::LedStrip) for usage examples.
#[derive(Debug)]
pub struct LedStripStatic<const N: usize>([u32; N]);

impl<const N: usize> LedStripStatic<N> {
    /// Creates static resources.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> Default for LedStripStatic<N> {
    fn default() -> Self {
        Self::new()
    }
}

struct Claimed<S, C> {
    slot: S,
    transfer: Transfer<C>,
}

impl<S: TimingSlot, C: TransferChannel> Claimed<S, C> {
    fn start(&mut self, words: &[u32]) {
        match &mut self.transfer {
            Transfer::Available(channel) => channel.start(words),
            Transfer::Unavailable => {
                for &word in words {
                    while !self.slot.try_push(word) {
                        spin_loop();
                    }
                }
            }
        }
    }

    fn is_busy(&self) -> bool {
        match &self.transfer {
            Transfer::Available(channel) => channel.is_busy(),
            Transfer::Unavailable => false,
        }
    }

    fn wait_for_data(&mut self) {
        while self.is_busy() {
            spin_loop();
        }
        while !self.slot.is_drained() {
            spin_loop();
        }
    }

    fn abort(&mut self) {
        match &mut self.transfer {
            Transfer::Available(channel) => channel.abort(),
            Transfer::Unavailable => {}
        }
    }

    fn release(self) {
        match self.transfer {
            Transfer::Available(channel) => channel.release(),
            Transfer::Unavailable => {}
        }
        self.slot.release();
    }
}

/// Drives one strip's frames through a [`StripBackend`]'s hardware.
///
/// Only [`begin`](Self::begin) can fail. Every other operation on an uninitialized engine is
/// a no-op, and a missing transfer channel silently falls back to blocking pushes.
pub struct TransmissionEngine<'a, B: StripBackend, D: DelayNs, const N: usize> {
    backend: B,
    delay: D,
    timing: TimingConfig,
    slot_request: SlotRequest,
    reset_latch_us: u32,
    staging: &'a mut [u32; N],
    claimed: Option<Claimed<B::Slot, B::Channel>>,
    in_flight: bool,
}

impl<'a, B: StripBackend, D: DelayNs, const N: usize> TransmissionEngine<'a, B, D, N> {
    /// Create an engine. No hardware is touched until [`begin`](Self::begin).
    pub fn new(
        led_strip_static: &'a mut LedStripStatic<N>,
        backend: B,
        delay: D,
        timing: TimingConfig,
        slot_request: SlotRequest,
    ) -> Self {
        Self {
            backend,
            delay,
            timing,
            slot_request,
            reset_latch_us: RESET_LATCH_US,
            staging: &mut led_strip_static.0,
            claimed: None,
            in_flight: false,
        }
    }

    /// Lengthen the reset latch (some newer WS2812B parts want 280 µs). Values below
    /// [`RESET_LATCH_US`] are raised to it.
    pub fn set_reset_latch_us(&mut self, reset_latch_us: u32) {
        self.reset_latch_us = reset_latch_us.max(RESET_LATCH_US);
    }

    /// Reset latch applied after each frame (µs).
    #[must_use]
    pub const fn reset_latch_us(&self) -> u32 {
        self.reset_latch_us
    }

    /// Timing the slot is configured with.
    #[must_use]
    pub const fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    /// Claim a slot and, if possible, a transfer channel. Re-running `begin` first releases
    /// whatever was claimed before.
    ///
    /// # Errors
    ///
    /// Returns an error if the bit rate is 0, no slot is free, or the timing program cannot
    /// be loaded. Nothing stays claimed on failure.
    pub fn begin(&mut self) -> Result<()> {
        self.end();
        if self.timing.bit_rate_hz == 0 {
            return Err(Error::InvalidBitRate { hz: 0 });
        }
        let slot = self.backend.claim_slot(self.slot_request, &self.timing)?;
        let transfer = match self.backend.claim_channel(&slot) {
            Some(channel) => Transfer::Available(channel),
            None => Transfer::Unavailable,
        };
        self.claimed = Some(Claimed { slot, transfer });
        Ok(())
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        match (&self.claimed, self.in_flight) {
            (None, _) => EngineState::Uninitialized,
            (Some(_), false) => EngineState::Ready,
            (Some(_), true) => EngineState::Transmitting,
        }
    }

    /// `true` when a transfer channel was claimed by [`begin`](Self::begin).
    #[must_use]
    pub const fn has_transfer_channel(&self) -> bool {
        matches!(
            &self.claimed,
            Some(Claimed {
                transfer: Transfer::Available(_),
                ..
            })
        )
    }

    /// Encode and send a frame, returning after the data is out and the reset latch has
    /// elapsed: when `show` returns, the LEDs display the new colors.
    pub fn show(&mut self, pixels: &PixelBuffer<N>, pipeline: &ColorPipeline) {
        if !self.start_frame(pixels, pipeline) {
            return;
        }
        self.wait();
    }

    /// Encode a frame into the staging buffer and start sending it without waiting.
    ///
    /// Call [`wait`](Self::wait) (or poll [`busy`](Self::busy)) before relying on the frame
    /// being latched. Starting another frame first waits for this one.
    pub fn show_async(&mut self, pixels: &PixelBuffer<N>, pipeline: &ColorPipeline) {
        self.in_flight = self.start_frame(pixels, pipeline);
    }

    /// `true` while the transfer channel is moving a frame. Always `false` without a channel:
    /// the blocking fallback has finished pushing before `show_async` returns.
    #[must_use]
    pub fn busy(&self) -> bool {
        self.claimed.as_ref().is_some_and(Claimed::is_busy)
    }

    /// Block until the frame's data is out, then for the reset latch.
    pub fn wait(&mut self) {
        let Some(claimed) = self.claimed.as_mut() else {
            return;
        };
        claimed.wait_for_data();
        // The FIFO is empty but its last word is still in the output shift register.
        let tail_us = self.timing.word_time_us();
        self.delay.delay_us(tail_us.saturating_add(self.reset_latch_us));
        self.in_flight = false;
    }

    /// Abort any transfer and release the channel and slot. Safe to call repeatedly.
    pub fn end(&mut self) {
        if let Some(mut claimed) = self.claimed.take() {
            claimed.abort();
            claimed.release();
        }
        self.in_flight = false;
    }

    /// Transmission words of the most recently started frame.
    #[must_use]
    pub fn last_frame(&self) -> &[u32; N] {
        &*self.staging
    }

    fn start_frame(&mut self, pixels: &PixelBuffer<N>, pipeline: &ColorPipeline) -> bool {
        if self.claimed.is_none() {
            return false;
        }
        if self.in_flight {
            self.wait();
        }
        encode(pixels, pipeline, self.timing.wire_format, self.staging);
        if let Some(claimed) = self.claimed.as_mut() {
            claimed.start(self.staging.as_slice());
        }
        true
    }
}

impl<B: StripBackend, D: DelayNs, const N: usize> Drop for TransmissionEngine<'_, B, D, N> {
    fn drop(&mut self) {
        self.end();
    }
}
