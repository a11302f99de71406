#![allow(missing_docs)]
//! Drives `LedStrip` through a recording backend: every FIFO push, DMA start/abort, hardware
//! release, and delay lands in one event log.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use pixel_wire::Error;
use pixel_wire::led_strip::{
    Current, EngineState, LedStrip, LedStripStatic, SlotRequest, StripBackend, StripConfig,
    TimingConfig, TimingSlot, TransferChannel, WireFormat, colors, rgbw,
};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
    ClaimSlot(u8),
    Push(u32),
    DmaStart(Vec<u32>),
    DmaAbort,
    ReleaseChannel,
    ReleaseSlot(u8),
    DelayUs(u32),
    BusyPoll(bool),
    DrainPoll(bool),
}

struct Bench {
    events: RefCell<Vec<Event>>,
    taken: RefCell<[bool; 4]>,
    dma_channels: Cell<u8>,
    program_fits: Cell<bool>,
    busy_polls: Cell<u32>,
    busy_remaining: Cell<u32>,
    full_polls: Cell<u32>,
    undrained_polls: Cell<u32>,
    log_polls: Cell<bool>,
}

impl Bench {
    fn new() -> Rc<Self> {
        Rc::new(Self {
            events: RefCell::new(Vec::new()),
            taken: RefCell::new([false; 4]),
            dma_channels: Cell::new(1),
            program_fits: Cell::new(true),
            busy_polls: Cell::new(0),
            busy_remaining: Cell::new(0),
            full_polls: Cell::new(0),
            undrained_polls: Cell::new(0),
            log_polls: Cell::new(false),
        })
    }

    fn log(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    fn log_poll(&self, event: Event) {
        if self.log_polls.get() {
            self.log(event);
        }
    }

    fn take_events(&self) -> Vec<Event> {
        self.events.take()
    }
}

struct MockSlot {
    bench: Rc<Bench>,
    index: u8,
}

impl TimingSlot for MockSlot {
    fn index(&self) -> u8 {
        self.index
    }

    fn try_push(&mut self, word: u32) -> bool {
        let full = self.bench.full_polls.get();
        if full > 0 {
            self.bench.full_polls.set(full - 1);
            return false;
        }
        self.bench.log(Event::Push(word));
        true
    }

    fn is_drained(&mut self) -> bool {
        let undrained = self.bench.undrained_polls.get();
        let drained = undrained == 0;
        if !drained {
            self.bench.undrained_polls.set(undrained - 1);
        }
        self.bench.log_poll(Event::DrainPoll(drained));
        drained
    }

    fn release(self) {
        self.bench.log(Event::ReleaseSlot(self.index));
        self.bench.taken.borrow_mut()[usize::from(self.index)] = false;
    }
}

struct MockChannel {
    bench: Rc<Bench>,
}

impl TransferChannel for MockChannel {
    fn start(&mut self, words: &[u32]) {
        self.bench.log(Event::DmaStart(words.to_vec()));
        self.bench.busy_remaining.set(self.bench.busy_polls.get());
    }

    fn is_busy(&self) -> bool {
        let remaining = self.bench.busy_remaining.get();
        let busy = remaining > 0;
        if busy {
            self.bench.busy_remaining.set(remaining - 1);
        }
        self.bench.log_poll(Event::BusyPoll(busy));
        busy
    }

    fn abort(&mut self) {
        self.bench.log(Event::DmaAbort);
        self.bench.busy_remaining.set(0);
    }

    fn release(self) {
        self.bench.log(Event::ReleaseChannel);
        self.bench.dma_channels.set(self.bench.dma_channels.get() + 1);
    }
}

struct MockBackend {
    bench: Rc<Bench>,
}

impl StripBackend for MockBackend {
    type Slot = MockSlot;
    type Channel = MockChannel;

    fn claim_slot(
        &mut self,
        request: SlotRequest,
        _timing: &TimingConfig,
    ) -> pixel_wire::Result<MockSlot> {
        if !self.bench.program_fits.get() {
            return Err(Error::ProgramLoad);
        }
        let mut taken = self.bench.taken.borrow_mut();
        let index = match request {
            SlotRequest::Auto => taken
                .iter()
                .position(|is_taken| !is_taken)
                .ok_or(Error::NoFreeStateMachine)?,
            SlotRequest::Index(index) => {
                let position = usize::from(index);
                match taken.get(position) {
                    None => return Err(Error::InvalidStateMachine { index }),
                    Some(true) => return Err(Error::StateMachineUnavailable { index }),
                    Some(false) => position,
                }
            }
        };
        taken[index] = true;
        let index = u8::try_from(index).expect("four slots");
        self.bench.log(Event::ClaimSlot(index));
        Ok(MockSlot {
            bench: Rc::clone(&self.bench),
            index,
        })
    }

    fn claim_channel(&mut self, _slot: &MockSlot) -> Option<MockChannel> {
        let free = self.bench.dma_channels.get();
        if free == 0 {
            return None;
        }
        self.bench.dma_channels.set(free - 1);
        Some(MockChannel {
            bench: Rc::clone(&self.bench),
        })
    }
}

struct MockDelay {
    bench: Rc<Bench>,
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.bench.log(Event::DelayUs(ns.div_ceil(1_000)));
    }

    fn delay_us(&mut self, us: u32) {
        self.bench.log(Event::DelayUs(us));
    }
}

type MockStrip<'a, const N: usize> = LedStrip<'a, MockBackend, MockDelay, N>;

fn new_strip<'a, const N: usize>(
    bench: &Rc<Bench>,
    led_strip_static: &'a mut LedStripStatic<N>,
    config: StripConfig,
) -> MockStrip<'a, N> {
    LedStrip::new(
        led_strip_static,
        MockBackend {
            bench: Rc::clone(bench),
        },
        MockDelay {
            bench: Rc::clone(bench),
        },
        config,
    )
}

// 24 bits at 800 kHz is 30 µs, plus the 80 µs latch.
const GRB_FRAME_TAIL_US: u32 = 30 + 80;

#[test]
fn show_sends_one_word_per_led_then_latches() {
    let bench = Bench::new();
    let mut led_strip_static = LedStripStatic::<3>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    assert_eq!(bench.take_events(), [Event::ClaimSlot(0)]);

    strip.set_all(colors::RED);
    strip.show();

    assert_eq!(
        bench.take_events(),
        [
            Event::DmaStart(vec![0x00FF_0000; 3]),
            Event::DelayUs(GRB_FRAME_TAIL_US),
        ]
    );
    assert_eq!(strip.last_frame(), &[0x00FF_0000; 3]);
    assert!(!strip.busy());
    assert_eq!(strip.state(), EngineState::Ready);
}

#[test]
fn output_before_begin_does_nothing() {
    let bench = Bench::new();
    let mut led_strip_static = LedStripStatic::<3>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());

    strip.set_all(colors::WHITE);
    strip.show();
    strip.show_async();
    strip.wait();
    strip.end();

    assert!(bench.take_events().is_empty());
    assert!(!strip.busy());
    assert!(!strip.is_ready());
    assert_eq!(strip.state(), EngineState::Uninitialized);
}

#[test]
fn begin_clears_pixels() {
    let bench = Bench::new();
    let mut led_strip_static = LedStripStatic::<2>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.set_all(colors::WHITE);

    strip.begin().expect("begin");

    assert!(strip.is_ready());
    assert!(strip.pixels().iter().all(|pixel| *pixel == rgbw(0, 0, 0, 0)));
}

#[test]
fn without_dma_words_are_pushed_in_order() {
    let bench = Bench::new();
    bench.dma_channels.set(0);
    let mut led_strip_static = LedStripStatic::<3>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    bench.take_events();
    assert!(!strip.has_dma());

    strip.set_pixel(0, colors::RED);
    strip.set_pixel(1, colors::LIME);
    strip.set_pixel(2, colors::BLUE);
    strip.show();

    assert_eq!(
        bench.take_events(),
        [
            Event::Push(0x00FF_0000),
            Event::Push(0xFF00_0000),
            Event::Push(0x0000_FF00),
            Event::DelayUs(GRB_FRAME_TAIL_US),
        ]
    );
}

#[test]
fn full_fifo_is_retried_until_every_word_is_pushed() {
    let bench = Bench::new();
    bench.dma_channels.set(0);
    let mut led_strip_static = LedStripStatic::<4>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    bench.take_events();
    bench.full_polls.set(25);

    strip.set_all(colors::WHITE);
    strip.show_async();

    let pushes = bench
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, Event::Push(_)))
        .count();
    assert_eq!(pushes, 4);
    // Without DMA the frame is fully queued once show_async returns.
    assert!(!strip.busy());

    strip.wait();
    assert!(!strip.busy());
    assert_eq!(strip.state(), EngineState::Ready);
}

// Every poll is logged, so the latch delay's position shows what it waited for.
fn assert_latch_follows_data(events: &[Event], busy_polls: usize, undrained_polls: usize) {
    let latch = events
        .iter()
        .position(|event| *event == Event::DelayUs(GRB_FRAME_TAIL_US))
        .expect("latch delay");
    let last_drain = events
        .iter()
        .rposition(|event| matches!(event, Event::DrainPoll(_)))
        .expect("drain poll");
    assert_eq!(latch, events.len() - 1);
    assert_eq!(events[last_drain], Event::DrainPoll(true));
    assert_eq!(last_drain + 1, latch);
    assert_eq!(
        events.iter().filter(|e| **e == Event::BusyPoll(true)).count(),
        busy_polls
    );
    assert_eq!(
        events.iter().filter(|e| **e == Event::DrainPoll(false)).count(),
        undrained_polls
    );
    let first_drain = events
        .iter()
        .position(|event| matches!(event, Event::DrainPoll(_)))
        .expect("drain poll");
    assert!(
        events[first_drain..]
            .iter()
            .all(|event| !matches!(event, Event::BusyPoll(_) | Event::Push(_))),
        "draining starts only after the data is handed off: {events:?}"
    );
}

#[test]
fn dma_frame_latches_after_the_fifo_drains() {
    let bench = Bench::new();
    let mut led_strip_static = LedStripStatic::<2>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    bench.take_events();
    bench.busy_polls.set(4);
    bench.undrained_polls.set(3);
    bench.log_polls.set(true);

    strip.set_all(colors::RED);
    strip.show();

    let events = bench.take_events();
    assert_eq!(events[0], Event::DmaStart(vec![0x00FF_0000; 2]));
    assert_eq!(events[5], Event::BusyPoll(false));
    assert_latch_follows_data(&events, 4, 3);
}

#[test]
fn pushed_frame_latches_after_the_fifo_drains() {
    let bench = Bench::new();
    bench.dma_channels.set(0);
    let mut led_strip_static = LedStripStatic::<3>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    bench.take_events();
    bench.undrained_polls.set(5);
    bench.log_polls.set(true);

    strip.set_all(colors::LIME);
    strip.show();

    let events = bench.take_events();
    assert!(events[..3].iter().all(|event| *event == Event::Push(0xFF00_0000)));
    assert_latch_follows_data(&events, 0, 5);
    assert!(!strip.busy());
}

#[test]
fn show_async_returns_while_dma_runs() {
    let bench = Bench::new();
    bench.busy_polls.set(3);
    let mut led_strip_static = LedStripStatic::<2>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    bench.take_events();

    strip.set_all(colors::BLUE);
    strip.show_async();

    assert_eq!(bench.take_events(), [Event::DmaStart(vec![0x0000_FF00; 2])]);
    assert!(strip.busy());
    assert_eq!(strip.state(), EngineState::Transmitting);

    strip.wait();

    assert!(!strip.busy());
    assert_eq!(strip.state(), EngineState::Ready);
    assert_eq!(bench.take_events(), [Event::DelayUs(GRB_FRAME_TAIL_US)]);
}

#[test]
fn next_frame_waits_for_the_outstanding_one() {
    let bench = Bench::new();
    bench.busy_polls.set(5);
    let mut led_strip_static = LedStripStatic::<1>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    bench.take_events();

    strip.set_pixel(0, colors::RED);
    strip.show_async();
    strip.set_pixel(0, colors::BLUE);
    strip.show_async();

    assert_eq!(
        bench.take_events(),
        [
            Event::DmaStart(vec![0x00FF_0000]),
            Event::DelayUs(GRB_FRAME_TAIL_US),
            Event::DmaStart(vec![0x0000_FF00]),
        ]
    );
}

#[test]
fn pixel_edits_during_transfer_do_not_touch_the_frame_in_flight() {
    let bench = Bench::new();
    bench.busy_polls.set(100);
    let mut led_strip_static = LedStripStatic::<2>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");

    strip.set_all(colors::RED);
    strip.show_async();
    strip.set_all(colors::BLUE);
    strip.set_brightness(0);

    assert_eq!(strip.last_frame(), &[0x00FF_0000; 2]);
    strip.wait();
}

#[test]
fn end_aborts_and_releases_once() {
    let bench = Bench::new();
    bench.busy_polls.set(100);
    let mut led_strip_static = LedStripStatic::<2>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    strip.show_async();
    bench.take_events();

    strip.end();
    strip.end();

    assert_eq!(
        bench.take_events(),
        [Event::DmaAbort, Event::ReleaseChannel, Event::ReleaseSlot(0)]
    );
    assert!(!strip.busy());
    assert!(!strip.is_ready());
    assert_eq!(bench.dma_channels.get(), 1);
}

#[test]
fn drop_aborts_an_in_flight_transfer() {
    let bench = Bench::new();
    bench.busy_polls.set(100);
    let mut led_strip_static = LedStripStatic::<2>::new();
    {
        let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
        strip.begin().expect("begin");
        strip.show_async();
        bench.take_events();
    }

    assert_eq!(
        bench.take_events(),
        [Event::DmaAbort, Event::ReleaseChannel, Event::ReleaseSlot(0)]
    );
}

#[test]
fn begin_again_releases_first() {
    let bench = Bench::new();
    let mut led_strip_static = LedStripStatic::<1>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");
    bench.take_events();

    strip.begin().expect("second begin");

    assert_eq!(
        bench.take_events(),
        [
            Event::DmaAbort,
            Event::ReleaseChannel,
            Event::ReleaseSlot(0),
            Event::ClaimSlot(0),
        ]
    );
}

#[test]
fn begin_reports_why_it_failed() {
    let bench = Bench::new();

    bench.program_fits.set(false);
    let mut led_strip_static = LedStripStatic::<1>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    assert_eq!(strip.begin(), Err(Error::ProgramLoad));
    assert_eq!(strip.state(), EngineState::Uninitialized);
    drop(strip);
    bench.program_fits.set(true);

    let mut led_strip_static = LedStripStatic::<1>::new();
    let mut strip = new_strip(
        &bench,
        &mut led_strip_static,
        StripConfig::new().with_bit_rate_hz(0),
    );
    assert_eq!(strip.begin(), Err(Error::InvalidBitRate { hz: 0 }));
    drop(strip);

    let mut led_strip_static = LedStripStatic::<1>::new();
    let mut strip = new_strip(
        &bench,
        &mut led_strip_static,
        StripConfig::new().with_slot(SlotRequest::Index(4)),
    );
    assert_eq!(strip.begin(), Err(Error::InvalidStateMachine { index: 4 }));
    drop(strip);

    assert!(bench.take_events().is_empty());
}

#[test]
fn state_machines_are_exclusive() {
    let bench = Bench::new();
    let mut statics: [LedStripStatic<1>; 6] = Default::default();
    let [s0, s1, s2, s3, s4, s5] = &mut statics;

    let mut pinned = new_strip(&bench, s0, StripConfig::new().with_slot(SlotRequest::Index(2)));
    pinned.begin().expect("pinned begin");

    let mut clash = new_strip(&bench, s1, StripConfig::new().with_slot(SlotRequest::Index(2)));
    assert_eq!(
        clash.begin(),
        Err(Error::StateMachineUnavailable { index: 2 })
    );

    let mut autos = [s2, s3, s4, s5].map(|s| new_strip(&bench, s, StripConfig::new()));
    let [auto_a, auto_b, auto_c, auto_d] = &mut autos;
    auto_a.begin().expect("auto a");
    auto_b.begin().expect("auto b");
    auto_c.begin().expect("auto c");
    assert_eq!(auto_d.begin(), Err(Error::NoFreeStateMachine));
    assert_eq!(
        bench.take_events(),
        [
            Event::ClaimSlot(2),
            Event::ClaimSlot(0),
            Event::ClaimSlot(1),
            Event::ClaimSlot(3),
        ]
    );

    // Freed slots can be claimed again.
    pinned.end();
    auto_d.begin().expect("auto d after release");
    assert!(bench.take_events().ends_with(&[Event::ClaimSlot(2)]));
}

#[test]
fn only_one_strip_gets_the_dma_channel() {
    let bench = Bench::new();
    let mut first_static = LedStripStatic::<1>::new();
    let mut second_static = LedStripStatic::<1>::new();
    let mut first = new_strip(&bench, &mut first_static, StripConfig::new());
    let mut second = new_strip(&bench, &mut second_static, StripConfig::new());

    first.begin().expect("first");
    second.begin().expect("second");

    assert!(first.has_dma());
    assert!(!second.has_dma());
}

#[test]
fn reset_latch_has_a_floor() {
    let bench = Bench::new();
    let mut short_static = LedStripStatic::<1>::new();
    let mut short = new_strip(
        &bench,
        &mut short_static,
        StripConfig::new().with_reset_latch_us(10),
    );
    short.begin().expect("begin");
    bench.take_events();
    short.show();
    assert!(bench.take_events().contains(&Event::DelayUs(GRB_FRAME_TAIL_US)));
    short.end();

    let mut long_static = LedStripStatic::<1>::new();
    let mut long = new_strip(
        &bench,
        &mut long_static,
        StripConfig::new().with_reset_latch_us(300),
    );
    long.begin().expect("begin");
    bench.take_events();
    long.show();
    assert!(bench.take_events().contains(&Event::DelayUs(30 + 300)));
}

#[test]
fn grbw_strip_sends_32_bit_words() {
    let bench = Bench::new();
    let mut led_strip_static = LedStripStatic::<2>::new();
    let mut strip = new_strip(
        &bench,
        &mut led_strip_static,
        StripConfig::new().with_wire_format(WireFormat::Grbw32),
    );
    strip.begin().expect("begin");
    bench.take_events();

    strip.set_pixel(0, rgbw(0x10, 0x20, 0x30, 0x40));
    strip.set_pixel_rgb(1, 1, 2, 3);
    strip.show();

    assert_eq!(
        bench.take_events(),
        [
            Event::DmaStart(vec![0x2010_3040, 0x0201_0300]),
            // 32 bits at 800 kHz is 40 µs.
            Event::DelayUs(40 + 80),
        ]
    );
    assert_eq!(strip.wire_format(), WireFormat::Grbw32);
}

#[test]
fn pipeline_settings_shape_the_wire_but_not_the_pixels() {
    let bench = Bench::new();
    let mut led_strip_static = LedStripStatic::<10>::new();
    let mut strip = new_strip(&bench, &mut led_strip_static, StripConfig::new());
    strip.begin().expect("begin");

    strip.set_all(colors::RED);
    strip.limit_current(Current::Milliamps(300));
    strip.show();
    assert_eq!(strip.last_frame()[0], 0x007F_0000);

    strip.set_brightness(0);
    strip.show();
    assert_eq!(strip.last_frame(), &[0; 10]);
    assert_eq!(strip.pixels().pixel(0), Some(rgbw(255, 0, 0, 0)));

    strip.set_pixel(10, colors::WHITE);
    assert_eq!(strip.size(), 10);
}
