//! Internal PIO interrupt bindings.
//!
//! `Pio::new` needs a binding even though strips never wait on PIO interrupts: the synchronous
//! strip API polls the FIFO and DMA status instead.

#![cfg(target_os = "none")]

::embassy_rp::bind_interrupts! {
    pub struct Pio0Irqs {
        PIO0_IRQ_0 => ::embassy_rp::pio::InterruptHandler<::embassy_rp::peripherals::PIO0>;
    }
}

::embassy_rp::bind_interrupts! {
    pub struct Pio1Irqs {
        PIO1_IRQ_0 => ::embassy_rp::pio::InterruptHandler<::embassy_rp::peripherals::PIO1>;
    }
}

#[cfg(feature = "pico2")]
::embassy_rp::bind_interrupts! {
    pub struct Pio2Irqs {
        PIO2_IRQ_0 => ::embassy_rp::pio::InterruptHandler<::embassy_rp::peripherals::PIO2>;
    }
}
