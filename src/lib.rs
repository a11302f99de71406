//! Drive NeoPixel-style LED strips (WS2812/WS2812B with 24-bit GRB, SK6812 with 32-bit GRBW)
//! from one Pico PIO state machine, with an optional DMA channel feeding its FIFO.
//!
//! See [`led_strip`] for the strip façade and usage examples.
//!
//! # Glossary
//!
//! Resources available on the Pico 1 and Pico 2:
//!
//! - **PIO ([Programmable I/O](https://medium.com/data-science/nine-pico-pio-wats-with-rust-part-1-9d062067dc25)):** Pico 1 has 2. Pico 2 has 3.
//!   Each PIO has 4 state machines (the "execution slots" a strip claims) sharing 32 words of
//!   instruction memory.
//! - **DMA ([Direct Memory Access](https://en.wikipedia.org/wiki/Direct_memory_access)):** Both Pico 1 and 2 have 12 channels.
//!   A strip uses at most one, paced by its state machine's TX data request (DREQ).
//! - **Reset latch:** the idle period (at least 80 µs here) after the last bit that makes the
//!   LEDs commit the frame they just received.
#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

// Compile-time checks: exactly one board must be selected (unless testing with host feature)
#[cfg(all(target_os = "none", not(any(feature = "pico1", feature = "pico2"))))]
compile_error!("Must enable exactly one board feature: 'pico1' or 'pico2'");

#[cfg(all(target_os = "none", feature = "pico1", feature = "pico2"))]
compile_error!("Cannot enable both 'pico1' and 'pico2' features simultaneously");

// Compile-time checks: exactly one architecture must be selected (unless testing with host feature)
#[cfg(all(target_os = "none", not(any(feature = "arm", feature = "riscv"))))]
compile_error!("Must enable exactly one architecture feature: 'arm' or 'riscv'");

#[cfg(all(target_os = "none", feature = "arm", feature = "riscv"))]
compile_error!("Cannot enable both 'arm' and 'riscv' features simultaneously");

// Compile-time check: pico1 only supports ARM
#[cfg(all(target_os = "none", feature = "pico1", feature = "riscv"))]
compile_error!("Pico 1 (RP2040) only supports ARM architecture, not RISC-V");

mod error;
pub mod led_strip;
// PIO interrupt bindings used by the PIO backend
#[cfg(target_os = "none")]
#[doc(hidden)]
pub mod pio_irqs;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
