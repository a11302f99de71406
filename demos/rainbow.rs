#![allow(missing_docs)]
#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, panic};

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use pixel_wire::{
    Result,
    led_strip::{
        LedStripStatic, RpLedStrip, StripConfig, hsv,
        rp::{DmaPool, PioBlock, RpBackend},
    },
};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

const LEN: usize = 30;

static DMA_POOL: DmaPool = DmaPool::new();
static LED_STRIP_STATIC: StaticCell<LedStripStatic<LEN>> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(_spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    DMA_POOL.add(p.DMA_CH0);
    let block = PioBlock::take(p.PIO0);
    let backend = RpBackend::new(block, p.PIN_16, Some(&DMA_POOL));
    let mut led_strip: RpLedStrip<'_, _, LEN> = RpLedStrip::new(
        LED_STRIP_STATIC.init(LedStripStatic::new()),
        backend,
        embassy_time::Delay,
        StripConfig::new(),
    );
    led_strip.begin()?;
    led_strip.enable_gamma(true);
    led_strip.set_brightness(128);

    let mut hue = 0.0_f32;
    loop {
        for index in 0..LEN {
            let offset = index as f32 * 8.0;
            led_strip.set_pixel(index, hsv(hue + offset, 1.0, 0.4));
        }
        led_strip.show();
        hue = (hue + 2.5) % 360.0;
        Timer::after(Duration::from_millis(15)).await;
    }
}
