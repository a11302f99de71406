//! RP2040 / RP2350 backend: PIO state machines for timing, DMA channels for bulk transfer.
//!
//! - [`PioBlock`] owns one PIO block's shared resources. The timing program is loaded into its
//!   instruction memory at most once and shared by every strip on that block.
//! - [`DmaPool`] lends DMA channels to strips. An empty pool is not an error: the strip pushes
//!   words into the FIFO itself.
//! - [`RpBackend`] ties a block, an output pin, and an optional pool together for one strip.

use core::cell::RefCell;
use core::sync::atomic::{Ordering, compiler_fence};

use defmt::{info, warn};
use embassy_rp::Peri;
use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::dma::{AnyChannel, Channel};
use embassy_rp::pac;
use embassy_rp::pio::program::{Assembler, JmpCondition, OutDestination, SetDestination, SideSet};
use embassy_rp::pio::{
    Common, Config, FifoJoin, Instance, LoadedProgram, Pin, Pio, PioPin, ShiftConfig,
    ShiftDirection, StateMachine,
};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::once_lock::OnceLock;
use fixed::types::U24F8;
use heapless::Vec;
use static_cell::StaticCell;

use super::engine::{SlotRequest, StripBackend, TimingConfig, TimingSlot, TransferChannel};
use crate::{Error, Result};

// One bit is T1 + T2 + T3 state machine cycles: high for T1, then data for T2, then low for T3.
const T1: u8 = 2;
const T2: u8 = 5;
const T3: u8 = 3;
const CYCLES_PER_BIT: u32 = (T1 + T2 + T3) as u32;

/// DMA channels on both the RP2040 and the RP2350.
pub const DMA_CHANNEL_COUNT: usize = 12;

// ============================================================================
// PIO block registry
// ============================================================================

/// Trait for PIO peripherals that can host LED strips.
#[doc(hidden)] // Implemented for PIO0, PIO1 (and PIO2 on the Pico 2) below
pub trait LedStripPio: Instance {
    /// The interrupt binding type for this PIO
    type Irqs: embassy_rp::interrupt::typelevel::Binding<
            <Self as Instance>::Interrupt,
            embassy_rp::pio::InterruptHandler<Self>,
        >;

    /// Block number, used for DREQ selection and logs.
    const BLOCK_INDEX: u8;

    /// Get the interrupt configuration
    fn irqs() -> Self::Irqs;

    /// Register block, for the TX FIFO addresses DMA writes to.
    fn regs() -> pac::pio::Pio;

    /// Backing storage for this block's [`PioBlock`].
    fn block_cell() -> &'static StaticCell<PioBlock<Self>>;
}

/// A state machine of any index, so strips can claim one at runtime.
enum AnyStateMachine<PIO: Instance + 'static> {
    Sm0(StateMachine<'static, PIO, 0>),
    Sm1(StateMachine<'static, PIO, 1>),
    Sm2(StateMachine<'static, PIO, 2>),
    Sm3(StateMachine<'static, PIO, 3>),
}

macro_rules! with_state_machine {
    ($any:expr, $sm:ident => $body:expr) => {
        match $any {
            AnyStateMachine::Sm0($sm) => $body,
            AnyStateMachine::Sm1($sm) => $body,
            AnyStateMachine::Sm2($sm) => $body,
            AnyStateMachine::Sm3($sm) => $body,
        }
    };
}

impl<PIO: Instance + 'static> AnyStateMachine<PIO> {
    const fn index(&self) -> u8 {
        match self {
            Self::Sm0(_) => 0,
            Self::Sm1(_) => 1,
            Self::Sm2(_) => 2,
            Self::Sm3(_) => 3,
        }
    }

    fn start(&mut self, config: &Config<'static, PIO>) {
        with_state_machine!(self, sm => {
            sm.set_enable(false);
            sm.clear_fifos();
            sm.set_config(config);
            sm.restart();
            sm.set_enable(true);
        });
    }

    fn stop(&mut self) {
        with_state_machine!(self, sm => sm.set_enable(false));
    }

    fn try_push(&mut self, word: u32) -> bool {
        with_state_machine!(self, sm => sm.tx().try_push(word))
    }

    fn is_tx_empty(&mut self) -> bool {
        with_state_machine!(self, sm => sm.tx().empty())
    }
}

/// Shared resources of one PIO block: the `Common` handle, the timing program, and the pool
/// of state machines not yet claimed by a strip.
pub struct PioBlock<PIO: Instance + 'static> {
    common: Mutex<CriticalSectionRawMutex, RefCell<Common<'static, PIO>>>,
    program: OnceLock<LoadedProgram<'static, PIO>>,
    state_machines: Mutex<CriticalSectionRawMutex, RefCell<[Option<AnyStateMachine<PIO>>; 4]>>,
}

impl<PIO: LedStripPio> PioBlock<PIO> {
    /// Split the PIO peripheral and keep its parts in static storage.
    ///
    /// # Panics
    ///
    /// Panics if called twice for the same PIO.
    pub fn take(pio: Peri<'static, PIO>) -> &'static Self {
        let Pio {
            common,
            sm0,
            sm1,
            sm2,
            sm3,
            ..
        } = Pio::new(pio, PIO::irqs());
        PIO::block_cell().init(Self {
            common: Mutex::new(RefCell::new(common)),
            program: OnceLock::new(),
            state_machines: Mutex::new(RefCell::new([
                Some(AnyStateMachine::Sm0(sm0)),
                Some(AnyStateMachine::Sm1(sm1)),
                Some(AnyStateMachine::Sm2(sm2)),
                Some(AnyStateMachine::Sm3(sm3)),
            ])),
        })
    }

    /// Access the common resource, e.g. to turn a GPIO into a PIO pin.
    pub fn with_common<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Common<'static, PIO>) -> R,
    {
        self.common.lock(|common_cell| {
            let mut common = common_cell.borrow_mut();
            f(&mut *common)
        })
    }

    /// The timing program, loading it on first use.
    fn program(&self) -> Result<&LoadedProgram<'static, PIO>> {
        if let Some(program) = self.program.try_get() {
            return Ok(program);
        }
        self.with_common(|common| {
            // Re-check under the lock: another strip may have loaded it meanwhile.
            if let Some(program) = self.program.try_get() {
                return Ok(program);
            }
            let loaded = common
                .try_load_program(&timing_program())
                .map_err(|_| Error::ProgramLoad)?;
            if let Err(rejected) = self.program.init(loaded) {
                warn!("led strip: program slot on PIO{} already set", PIO::BLOCK_INDEX);
                // SAFETY: `rejected` was loaded just above and no state machine runs it.
                #[expect(unsafe_code, reason = "returns unused instruction memory")]
                unsafe {
                    common.free_instr(rejected.used_memory);
                }
                return Err(Error::ProgramLoad);
            }
            info!("led strip: timing program loaded on PIO{}", PIO::BLOCK_INDEX);
            self.program.try_get().ok_or(Error::ProgramLoad)
        })
    }

    fn claim_state_machine(&self, request: SlotRequest) -> Result<AnyStateMachine<PIO>> {
        self.state_machines.lock(|pool_cell| {
            let mut pool = pool_cell.borrow_mut();
            match request {
                SlotRequest::Auto => pool
                    .iter_mut()
                    .find_map(Option::take)
                    .ok_or(Error::NoFreeStateMachine),
                SlotRequest::Index(index) => pool
                    .get_mut(usize::from(index))
                    .ok_or(Error::InvalidStateMachine { index })?
                    .take()
                    .ok_or(Error::StateMachineUnavailable { index }),
            }
        })
    }

    fn return_state_machine(&self, state_machine: AnyStateMachine<PIO>) {
        let index = usize::from(state_machine.index());
        self.state_machines.lock(|pool_cell| {
            if let Some(entry) = pool_cell.borrow_mut().get_mut(index) {
                *entry = Some(state_machine);
            }
        });
    }
}

fn timing_program() -> embassy_rp::pio::program::Program<32> {
    let side_set = SideSet::new(false, 1, false);
    let mut assembler: Assembler<32> = Assembler::new_with_side_set(side_set);

    let mut wrap_target = assembler.label();
    let mut wrap_source = assembler.label();
    let mut do_zero = assembler.label();
    assembler.set_with_side_set(SetDestination::PINDIRS, 1, 0);
    assembler.bind(&mut wrap_target);
    assembler.out_with_delay_and_side_set(OutDestination::X, 1, T3 - 1, 0);
    assembler.jmp_with_delay_and_side_set(JmpCondition::XIsZero, &mut do_zero, T1 - 1, 1);
    assembler.jmp_with_delay_and_side_set(JmpCondition::Always, &mut wrap_target, T2 - 1, 1);
    assembler.bind(&mut do_zero);
    assembler.nop_with_delay_and_side_set(T2 - 1, 0);
    assembler.bind(&mut wrap_source);

    assembler.assemble_with_wrap(wrap_source, wrap_target)
}

/// `clk_sys / (bit_rate * CYCLES_PER_BIT)` as 16.8 fixed point, clamped to the hardware range.
fn clock_divider(bit_rate_hz: u32) -> U24F8 {
    let cycles_hz = u64::from(bit_rate_hz) * u64::from(CYCLES_PER_BIT);
    let divider_bits = (u64::from(clk_sys_freq()) << 8)
        .checked_div(cycles_hz)
        .unwrap_or(u64::MAX)
        .clamp(1 << 8, u64::from(u16::MAX) << 8);
    #[expect(clippy::cast_possible_truncation, reason = "clamped to 16.8 bits above")]
    let divider_bits = divider_bits as u32;
    U24F8::from_bits(divider_bits)
}

// ============================================================================
// DMA pool
// ============================================================================

type DmaChannels = Vec<Peri<'static, AnyChannel>, DMA_CHANNEL_COUNT>;

/// Channels lent to strips. Put it in a `static` and [`add`](Self::add) channels at startup.
pub struct DmaPool {
    channels: Mutex<CriticalSectionRawMutex, RefCell<DmaChannels>>,
}

impl DmaPool {
    /// An empty pool.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channels: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Make a channel available to strips.
    pub fn add(&self, channel: Peri<'static, impl Channel>) {
        self.give_back(channel.into());
    }

    fn claim(&self) -> Option<Peri<'static, AnyChannel>> {
        self.channels.lock(|channels| channels.borrow_mut().pop())
    }

    fn give_back(&self, channel: Peri<'static, AnyChannel>) {
        let number = channel.number();
        self.channels.lock(|channels| {
            if channels.borrow_mut().push(channel).is_err() {
                warn!("led strip: DMA pool full, dropping channel {}", number);
            }
        });
    }
}

impl Default for DmaPool {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Backend
// ============================================================================

/// A claimed state machine running the timing program.
pub struct RpSlot<PIO: LedStripPio> {
    block: &'static PioBlock<PIO>,
    state_machine: AnyStateMachine<PIO>,
}

impl<PIO: LedStripPio> RpSlot<PIO> {
    /// DMA request line paced by this state machine's TX FIFO.
    fn dreq(&self) -> u8 {
        PIO::BLOCK_INDEX * 8 + self.state_machine.index()
    }

    fn tx_fifo_address(&self) -> u32 {
        PIO::regs()
            .txf(usize::from(self.state_machine.index()))
            .as_ptr() as u32
    }
}

impl<PIO: LedStripPio> TimingSlot for RpSlot<PIO> {
    fn index(&self) -> u8 {
        self.state_machine.index()
    }

    fn try_push(&mut self, word: u32) -> bool {
        self.state_machine.try_push(word)
    }

    fn is_drained(&mut self) -> bool {
        self.state_machine.is_tx_empty()
    }

    fn release(mut self) {
        self.state_machine.stop();
        info!(
            "led strip: released PIO{} SM{}",
            PIO::BLOCK_INDEX,
            self.state_machine.index()
        );
        self.block.return_state_machine(self.state_machine);
    }
}

/// A DMA channel bound to one state machine's TX FIFO.
pub struct RpDmaChannel {
    channel: Peri<'static, AnyChannel>,
    pool: &'static DmaPool,
    dreq: u8,
    fifo_address: u32,
}

impl RpDmaChannel {
    fn regs(&self) -> pac::dma::Channel {
        pac::DMA.ch(usize::from(self.channel.number()))
    }
}

impl TransferChannel for RpDmaChannel {
    #[expect(clippy::cast_possible_truncation, reason = "addresses and lengths are 32-bit")]
    fn start(&mut self, words: &[u32]) {
        let regs = self.regs();
        regs.read_addr().write_value(words.as_ptr() as u32);
        regs.write_addr().write_value(self.fifo_address);
        #[cfg(feature = "pico1")]
        regs.trans_count().write(|w| {
            *w = words.len() as u32;
        });
        #[cfg(feature = "pico2")]
        regs.trans_count().write(|w| {
            w.set_mode(0.into());
            w.set_count(words.len() as u32);
        });
        compiler_fence(Ordering::SeqCst);
        regs.ctrl_trig().write(|w| {
            w.set_treq_sel(pac::dma::vals::TreqSel::from(self.dreq));
            w.set_data_size(pac::dma::vals::DataSize::SIZE_WORD);
            w.set_incr_read(true);
            w.set_incr_write(false);
            w.set_chain_to(self.channel.number());
            w.set_en(true);
        });
        compiler_fence(Ordering::SeqCst);
    }

    fn is_busy(&self) -> bool {
        self.regs().ctrl_trig().read().busy()
    }

    fn abort(&mut self) {
        let number = self.channel.number();
        pac::DMA
            .chan_abort()
            .modify(|m| m.set_chan_abort(1 << number));
        while self.is_busy() {}
        compiler_fence(Ordering::SeqCst);
    }

    fn release(self) {
        self.pool.give_back(self.channel);
    }
}

/// Hardware for one strip: a PIO block, its output pin, and where to borrow DMA from.
pub struct RpBackend<PIO: LedStripPio> {
    block: &'static PioBlock<PIO>,
    pin: Pin<'static, PIO>,
    dma_pool: Option<&'static DmaPool>,
}

impl<PIO: LedStripPio> RpBackend<PIO> {
    /// Route `pin` to `block`. Pass `None` for `dma_pool` to always use blocking pushes.
    pub fn new(
        block: &'static PioBlock<PIO>,
        pin: Peri<'static, impl PioPin>,
        dma_pool: Option<&'static DmaPool>,
    ) -> Self {
        let pin = block.with_common(|common| common.make_pio_pin(pin));
        Self {
            block,
            pin,
            dma_pool,
        }
    }

    fn config(
        &self,
        program: &LoadedProgram<'static, PIO>,
        timing: &TimingConfig,
    ) -> Config<'static, PIO> {
        let mut config = Config::default();
        config.set_out_pins(&[&self.pin]);
        config.set_set_pins(&[&self.pin]);
        config.use_program(program, &[&self.pin]);
        config.clock_divider = clock_divider(timing.bit_rate_hz);
        config.fifo_join = FifoJoin::TxOnly;
        config.shift_out = ShiftConfig {
            auto_fill: true,
            threshold: timing.wire_format.bits_per_pixel(),
            direction: ShiftDirection::Left,
        };
        config
    }
}

impl<PIO: LedStripPio> StripBackend for RpBackend<PIO> {
    type Slot = RpSlot<PIO>;
    type Channel = RpDmaChannel;

    fn claim_slot(&mut self, request: SlotRequest, timing: &TimingConfig) -> Result<RpSlot<PIO>> {
        let program = self.block.program()?;
        let mut state_machine = self.block.claim_state_machine(request)?;
        let config = self.config(program, timing);
        state_machine.start(&config);
        info!(
            "led strip: PIO{} SM{} at {} Hz, {} bits per pixel",
            PIO::BLOCK_INDEX,
            state_machine.index(),
            timing.bit_rate_hz,
            timing.wire_format.bits_per_pixel()
        );
        Ok(RpSlot {
            block: self.block,
            state_machine,
        })
    }

    fn claim_channel(&mut self, slot: &RpSlot<PIO>) -> Option<RpDmaChannel> {
        let pool = self.dma_pool?;
        let Some(channel) = pool.claim() else {
            warn!(
                "led strip: no free DMA channel for PIO{} SM{}, using blocking pushes",
                PIO::BLOCK_INDEX,
                slot.index()
            );
            return None;
        };
        info!("led strip: DMA channel {} feeds SM{}", channel.number(), slot.index());
        Some(RpDmaChannel {
            channel,
            pool,
            dreq: slot.dreq(),
            fifo_address: slot.tx_fifo_address(),
        })
    }
}

// Implement LedStripPio for all PIO peripherals
static PIO0_BLOCK: StaticCell<PioBlock<embassy_rp::peripherals::PIO0>> = StaticCell::new();
static PIO1_BLOCK: StaticCell<PioBlock<embassy_rp::peripherals::PIO1>> = StaticCell::new();
#[cfg(feature = "pico2")]
static PIO2_BLOCK: StaticCell<PioBlock<embassy_rp::peripherals::PIO2>> = StaticCell::new();

impl LedStripPio for embassy_rp::peripherals::PIO0 {
    type Irqs = crate::pio_irqs::Pio0Irqs;
    const BLOCK_INDEX: u8 = 0;

    fn irqs() -> Self::Irqs {
        crate::pio_irqs::Pio0Irqs
    }

    fn regs() -> pac::pio::Pio {
        pac::PIO0
    }

    fn block_cell() -> &'static StaticCell<PioBlock<Self>> {
        &PIO0_BLOCK
    }
}

impl LedStripPio for embassy_rp::peripherals::PIO1 {
    type Irqs = crate::pio_irqs::Pio1Irqs;
    const BLOCK_INDEX: u8 = 1;

    fn irqs() -> Self::Irqs {
        crate::pio_irqs::Pio1Irqs
    }

    fn regs() -> pac::pio::Pio {
        pac::PIO1
    }

    fn block_cell() -> &'static StaticCell<PioBlock<Self>> {
        &PIO1_BLOCK
    }
}

#[cfg(feature = "pico2")]
impl LedStripPio for embassy_rp::peripherals::PIO2 {
    type Irqs = crate::pio_irqs::Pio2Irqs;
    const BLOCK_INDEX: u8 = 2;

    fn irqs() -> Self::Irqs {
        crate::pio_irqs::Pio2Irqs
    }

    fn regs() -> pac::pio::Pio {
        pac::PIO2
    }

    fn block_cell() -> &'static StaticCell<PioBlock<Self>> {
        &PIO2_BLOCK
    }
}
