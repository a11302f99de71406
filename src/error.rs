use derive_more::{Display, Error};

/// Result alias used by every fallible operation in this crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported while acquiring hardware for a strip.
///
/// Only [`LedStrip::begin`](crate::led_strip::LedStrip::begin) reports errors. Everything else
/// (painting, `show`, `wait`) is infallible and degrades to the blocking path instead.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_os = "none", derive(defmt::Format))]
pub enum Error {
    /// Auto-claim found every state machine on the PIO block already in use.
    #[display("no free state machine on this PIO block")]
    NoFreeStateMachine,

    /// A specific state machine was requested but another strip holds it.
    #[display("state machine {index} is already claimed")]
    StateMachineUnavailable {
        /// Requested state machine index.
        index: u8,
    },

    /// A PIO block has state machines 0 through 3 only.
    #[display("state machine index {index} does not exist (0..=3)")]
    InvalidStateMachine {
        /// Requested state machine index.
        index: u8,
    },

    /// The timing program does not fit in the PIO block's remaining instruction memory.
    #[display("timing program could not be loaded into PIO instruction memory")]
    ProgramLoad,

    /// A strip cannot be clocked at 0 Hz.
    #[display("bit rate {hz} Hz is not usable")]
    InvalidBitRate {
        /// Requested bit rate in Hz.
        hz: u32,
    },
}
