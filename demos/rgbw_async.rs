#![allow(missing_docs)]
#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, panic};

use defmt::info;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use pixel_wire::{
    Result,
    led_strip::{
        Current, LedStripStatic, RpLedStrip, SlotRequest, StripConfig, WireFormat, hsv, rgbw,
        rp::{DmaPool, PioBlock, RpBackend},
    },
};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

const LEN: usize = 60;

static DMA_POOL: DmaPool = DmaPool::new();
static LED_STRIP_STATIC: StaticCell<LedStripStatic<LEN>> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

// SK6812 RGBW strip on GPIO2: a white dot runs over a slowly shifting color wash.
// Each frame goes out with `show_async` while the task sleeps.
async fn inner_main(_spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    DMA_POOL.add(p.DMA_CH1);
    let block = PioBlock::take(p.PIO1);
    let backend = RpBackend::new(block, p.PIN_2, Some(&DMA_POOL));
    let mut led_strip: RpLedStrip<'_, _, LEN> = RpLedStrip::new(
        LED_STRIP_STATIC.init(LedStripStatic::new()),
        backend,
        embassy_time::Delay,
        StripConfig::new()
            .with_wire_format(WireFormat::Grbw32)
            .with_slot(SlotRequest::Index(0))
            .with_reset_latch_us(280),
    );
    led_strip.begin()?;
    led_strip.limit_current(Current::Milliamps(500));
    info!(
        "rgbw strip ready: dma={} max brightness={}",
        led_strip.has_dma(),
        led_strip.pipeline().max_brightness()
    );

    let mut step: usize = 0;
    loop {
        let wash = hsv((step % 360) as f32, 0.8, 0.2);
        led_strip.set_all(wash);
        led_strip.set_pixel(step % LEN, rgbw(0, 0, 0, 255));
        led_strip.show_async();

        step = step.wrapping_add(1);
        Timer::after(Duration::from_millis(20)).await;
        led_strip.wait();
    }
}
