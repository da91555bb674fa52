//! RP2040 backend: PIO shift programs, chained DMA and the scan-advance
//! interrupt.
//!
//! Two PIO state machines drive the panel:
//!
//! - the **data shifter** clocks device words out to the colour pins. Each
//!   clock column consumes two 30-bit words (one per row group) and emits
//!   one bit per channel, selected by a per-bit-plane shift amount that is
//!   patched into the program's instruction memory between rows;
//! - the **row pulser** takes one control word per row: five address bits,
//!   then a 27-bit OEn pulse length counted down one cycle at a time. When
//!   the pulse ends it pushes a token into its RX FIFO.
//!
//! Four chained DMA channels keep both fed without CPU involvement:
//!
//! ```text
//! pixel (one row of device words) ──chain──▶ dummy (8 zero words)
//!                                                 │chain
//! row-finished ◀──RX token──  row pulser  ◀────── oen (1 control word)
//!      │
//!      ▼ DMA_IRQ_1
//! ScanoutEngine::on_row_finished
//! ```
//!
//! The zero words flush the last genuine pixels through the shifter's
//! OSR/ISR pipeline before the latch. The row-finished channel drains the
//! pulser's RX FIFO and its completion interrupt is the engine's heartbeat:
//! the handler advances the scan state, patches the shift amount when the
//! bit plane changed and re-arms the chain for the next row.
//!
//! The interrupt is serviced on whichever core unmasks `DMA_IRQ_1`. When
//! that is core 1, its main function must never return or the core's NVIC
//! is torn down and refresh stops; park it with [`park`] after calling
//! [`ScanoutEngine::start`].
//!
//! The engine owns only the scan half of a split
//! [`ScanoutDriver`](crate::driver::ScanoutDriver); the
//! [`FramePublisher`](crate::driver::FramePublisher) half stays with the
//! render context, so frames and brightness changes never alias the
//! interrupt side. The intended two-core shape:
//!
//! ```ignore
//! let driver = cortex_m::singleton!(
//!     : ScanoutDriver<64, 64, { 64 * 64 }> = ScanoutDriver::new(config)?
//! ).unwrap();
//! let (mut publisher, scan) = driver.split();
//!
//! launch_scanout_core(&mut pac.PSM, &mut pac.PPB, &mut sio.fifo, stack, move || {
//!     let engine = cortex_m::singleton!(
//!         : ScanoutEngine<64, 64> = ScanoutEngine::new(scan, pio0, dma, &mut resets, pins)
//!     ).unwrap();
//!     engine.start();
//!     // hand the engine to the DMA_IRQ_1 handler's static, then fall
//!     // through to park()
//! })?;
//!
//! loop {
//!     publisher.publish_packed(&frame); // core 0, every frame
//! }
//! ```
//!
//! The engine does not touch the pad multiplexer. Route the colour, clock,
//! address, strobe and OEn pins to PIO0 (`into_function::<FunctionPio0>()`)
//! before calling [`ScanoutEngine::new`], and wire the panel so that OEn
//! sits on the pin directly above the strobe.

use cortex_m::peripheral::NVIC;
use embedded_hal::digital::v2::OutputPin;
use rp2040_hal::gpio::{DynPinId, FunctionSioOutput, Pin, PullDown};
use rp2040_hal::multicore::Multicore;
use rp2040_hal::pac;
use rp2040_hal::pio::{
    Buffers, PIOBuilder, PIOExt, PinDir, Running, Rx, ShiftDirection, StateMachine, Tx, SM0, SM1,
};

use crate::driver::ScanHandle;
use crate::ChipStartup;

/// GPIO numbers of the panel connections.
///
/// The six colour pins start at `data_base` in blue, green, red order for
/// the first row group, then the second. The row address pins start at
/// `rowsel_base`. The strobe and OEn pins must be consecutive because the
/// row pulser drives them through side-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinAssignment {
    /// First of six consecutive colour data pins
    pub data_base: u8,
    /// First row address pin
    pub rowsel_base: u8,
    /// Number of row address pins (4 or 5)
    pub rowsel_count: u8,
    /// Shift clock
    pub clk: u8,
    /// Latch strobe; OEn is implicitly `strobe + 1`
    pub strobe: u8,
}

impl Default for PinAssignment {
    fn default() -> Self {
        Self {
            data_base: 0,
            rowsel_base: 6,
            rowsel_count: 5,
            clk: 11,
            strobe: 12,
        }
    }
}

// DMA channel assignment, fixed because the engine owns the whole block.
const PIXEL_CHAN: usize = 0;
const DUMMY_CHAN: usize = 1;
const OEN_CHAN: usize = 2;
const ROW_FINISHED_CHAN: usize = 3;

// DREQs for PIO0 with the data shifter on SM0 and the row pulser on SM1.
const DREQ_DATA_TX: u8 = 0;
const DREQ_ROW_TX: u8 = 1;
const DREQ_ROW_RX: u8 = 5;

// Encodings written over the `shift0`/`shift1` slots of the data shifter:
// `pull block` for bit plane 0, `out null, plane` otherwise. Side-set is a
// single zero bit in both cases.
const INSTR_PULL_BLOCK: u32 = 0x80a0;
const INSTR_OUT_NULL: u32 = 0x6060;

/// The running scan-out engine: the driver's scan half plus claimed PIO0
/// and DMA.
///
/// Construction consumes the `PIO0` and `DMA` peripherals, which is the
/// type-level version of claiming every state machine and channel the
/// engine needs. The DMA channels read addresses inside this struct, so it
/// must sit in a `static` (or otherwise never move) from
/// [`start`](Self::start) onward.
pub struct ScanoutEngine<const WIDTH: usize, const HEIGHT: usize> {
    scan: ScanHandle<'static, WIDTH, HEIGHT>,
    dma: pac::DMA,
    _sm_data: StateMachine<(pac::PIO0, SM0), Running>,
    _sm_row: StateMachine<(pac::PIO0, SM1), Running>,
    _tx_data: Tx<(pac::PIO0, SM0)>,
    _tx_row: Tx<(pac::PIO0, SM1)>,
    _rx_row: Rx<(pac::PIO0, SM1)>,
    shift0_slot: usize,
    shift1_slot: usize,
    /// Read by the oen channel, one word per row.
    control_word: u32,
    /// Sink for the row pulser's RX token.
    row_token: u32,
    /// Pipeline flush words appended to every row by the dummy channel.
    dummy_pixels: [u32; 8],
}

impl<const WIDTH: usize, const HEIGHT: usize> ScanoutEngine<WIDTH, HEIGHT> {
    /// Claim PIO0 and the DMA block and set up both state machines.
    ///
    /// The state machines start immediately but stall on their empty TX
    /// FIFOs until [`start`](Self::start) arms the DMA chain.
    ///
    /// # Panics
    ///
    /// Panics if PIO0's instruction memory cannot hold the data shifter
    /// and row pulser programs.
    pub fn new(
        scan: ScanHandle<'static, WIDTH, HEIGHT>,
        pio: pac::PIO0,
        dma: pac::DMA,
        resets: &mut pac::RESETS,
        pins: PinAssignment,
    ) -> Self {
        resets.reset().modify(|_, w| w.dma().clear_bit());
        while resets.reset_done().read().dma().bit_is_clear() {}

        let (mut pio, sm0, sm1, _, _) = pio.split(resets);

        let data_program = pio_proc::pio_asm!(
            ".side_set 1",
            // Two device words per clock column. `in osr, 1` picks the
            // current OSR LSB; the patched shift0/shift1 slots discard the
            // low bits so that LSB is the active bit plane's blue bit.
            "public entry_point:",
            ".wrap_target",
            "public shift0:",
            "    pull block       side 0", // patched to `out null, plane`
            "    in osr, 1        side 0",
            "    out null, 10     side 0",
            "    in osr, 1        side 0",
            "    out null, 10     side 0",
            "    in osr, 1        side 0",
            "    out null, 32     side 0", // discard OSR remainder
            "public shift1:",
            "    pull block       side 0", // patched to `out null, plane`
            "    in osr, 1        side 1", // rising edge clocks the column
            "    out null, 10     side 1",
            "    in osr, 1        side 1",
            "    out null, 10     side 1",
            "    in osr, 1        side 1",
            "    out null, 32     side 1",
            "    in null, 26      side 1",
            "    mov pins, ::isr  side 0", // reversed so blue lands on data_base
            ".wrap",
        );
        let row_program = pio_proc::pio_asm!(
            ".side_set 2",
            // Side-set bit 0 is the strobe, bit 1 is OEn (active low).
            ".wrap_target",
            "    out pins, 5 [7]    side 0x2", // blank, set address lines
            "    out x, 27   [7]    side 0x3", // latch while still blanked
            "pulse_loop:",
            "    jmp x-- pulse_loop side 0x0", // lit for the pulse length
            "    in null, 32        side 0x2", // blank, push row-finished token
            ".wrap",
        );
        let row_inverted_program = pio_proc::pio_asm!(
            ".side_set 2",
            // Strobe polarity flipped for panels that latch on a low pulse.
            ".wrap_target",
            "    out pins, 5 [7]    side 0x3",
            "    out x, 27   [7]    side 0x2",
            "pulse_loop:",
            "    jmp x-- pulse_loop side 0x1",
            "    in null, 32        side 0x3",
            ".wrap",
        );

        let data_installed = pio
            .install(&data_program.program)
            .expect("instruction memory for data shifter program");
        let data_offset = data_installed.offset() as usize;
        let shift0_slot = data_offset + data_program.public_defines.shift0 as usize;
        let shift1_slot = data_offset + data_program.public_defines.shift1 as usize;

        let (mut sm_data, _rx_data, tx_data) = PIOBuilder::from_installed_program(data_installed)
            .out_pins(pins.data_base, 6)
            .side_set_pin_base(pins.clk)
            .out_shift_direction(ShiftDirection::Right)
            .in_shift_direction(ShiftDirection::Left)
            .autopull(true)
            .pull_threshold(32)
            .buffers(Buffers::OnlyTx)
            .clock_divisor_fixed_point(1, 0)
            .build(sm0);
        sm_data.set_pindirs(
            (pins.data_base..pins.data_base + 6)
                .chain(core::iter::once(pins.clk))
                .map(|pin| (pin, PinDir::Output)),
        );

        let row = if scan.config().inverted_strobe {
            &row_inverted_program.program
        } else {
            &row_program.program
        };
        let row_installed = pio
            .install(row)
            .expect("instruction memory for row pulser program");
        let (mut sm_row, rx_row, tx_row) = PIOBuilder::from_installed_program(row_installed)
            .out_pins(pins.rowsel_base, pins.rowsel_count)
            .side_set_pin_base(pins.strobe)
            .out_shift_direction(ShiftDirection::Right)
            .autopull(true)
            .pull_threshold(32)
            .autopush(true)
            .push_threshold(32)
            .clock_divisor_fixed_point(1, 0)
            .build(sm1);
        sm_row.set_pindirs(
            (pins.rowsel_base..pins.rowsel_base + pins.rowsel_count)
                .chain([pins.strobe, pins.strobe + 1])
                .map(|pin| (pin, PinDir::Output)),
        );

        let stride = scan.config().multiplex.row_stride_words(WIDTH) as u32;
        let engine = Self {
            scan,
            dma,
            _sm_data: sm_data.start(),
            _sm_row: sm_row.start(),
            _tx_data: tx_data,
            _tx_row: tx_row,
            _rx_row: rx_row,
            shift0_slot,
            shift1_slot,
            control_word: 0,
            row_token: 0,
            dummy_pixels: [0; 8],
        };
        engine.configure_dma_channels(stride);
        engine
    }

    fn configure_dma_channels(&self, stride: u32) {
        let pio = unsafe { &*pac::PIO0::ptr() };
        let data_txf = pio.txf(0).as_ptr() as u32;
        let row_txf = pio.txf(1).as_ptr() as u32;
        let row_rxf = pio.rxf(1).as_ptr() as u32;

        // pixel: one row of device words into the data shifter, then chain
        // to the pipeline flush.
        self.stream_channel(PIXEL_CHAN, stride, data_txf, DREQ_DATA_TX, DUMMY_CHAN, true);
        // dummy: eight zero words, then chain to the row pulse.
        self.stream_channel(DUMMY_CHAN, 8, data_txf, DREQ_DATA_TX, OEN_CHAN, true);
        // oen: one control word; chained to itself, i.e. no chain.
        self.stream_channel(OEN_CHAN, 1, row_txf, DREQ_ROW_TX, OEN_CHAN, false);

        // row-finished: drains the pulser's RX token and raises DMA_IRQ_1.
        let ch = self.dma.ch(ROW_FINISHED_CHAN);
        ch.ch_read_addr().write(|w| unsafe { w.bits(row_rxf) });
        ch.ch_trans_count().write(|w| unsafe { w.bits(1) });
        ch.ch_al1_ctrl().write(|w| unsafe {
            w.treq_sel()
                .bits(DREQ_ROW_RX)
                .chain_to()
                .bits(ROW_FINISHED_CHAN as u8)
                .data_size()
                .size_word()
                .incr_read()
                .clear_bit()
                .incr_write()
                .clear_bit()
                .high_priority()
                .set_bit()
                .en()
                .set_bit()
        });
        self.dma
            .inte1()
            .modify(|r, w| unsafe { w.bits(r.bits() | (1 << ROW_FINISHED_CHAN)) });
    }

    fn stream_channel(
        &self,
        channel: usize,
        count: u32,
        write_addr: u32,
        dreq: u8,
        chain_to: usize,
        incr_read: bool,
    ) {
        let ch = self.dma.ch(channel);
        ch.ch_write_addr().write(|w| unsafe { w.bits(write_addr) });
        ch.ch_trans_count().write(|w| unsafe { w.bits(count) });
        ch.ch_al1_ctrl().write(|w| unsafe {
            w.treq_sel()
                .bits(dreq)
                .chain_to()
                .bits(chain_to as u8)
                .data_size()
                .size_word()
                .incr_read()
                .bit(incr_read)
                .incr_write()
                .clear_bit()
                .irq_quiet()
                .set_bit()
                .high_priority()
                .set_bit()
                .en()
                .set_bit()
        });
    }

    /// Arm the DMA chain and unmask `DMA_IRQ_1` on the calling core.
    ///
    /// The engine must not move after this call; the channels hold
    /// addresses into `self`.
    pub fn start(&mut self) {
        let cmd = self.scan.start_command();
        self.control_word = cmd.control_word;

        self.dma
            .ch(DUMMY_CHAN)
            .ch_read_addr()
            .write(|w| unsafe { w.bits(self.dummy_pixels.as_ptr() as u32) });
        self.arm_row(cmd.row_start);

        unsafe { NVIC::unmask(pac::Interrupt::DMA_IRQ_1) };
    }

    /// Row-finished interrupt body; bind it to `DMA_IRQ_1`.
    ///
    /// Acknowledges the interrupt, advances the scan state and re-arms the
    /// chain for the next row. Runs in bounded time: no multiplication, no
    /// floating point, only table lookups and register writes.
    pub fn on_row_finished(&mut self) {
        self.dma
            .ints1()
            .write(|w| unsafe { w.bits(1 << ROW_FINISHED_CHAN) });

        let cmd = self.scan.service_scan_advance();
        if let Some(plane) = cmd.plane_select {
            self.set_plane_shift(plane);
        }
        self.control_word = cmd.control_word;
        self.arm_row(cmd.row_start);
    }

    fn arm_row(&mut self, row_start: usize) {
        let oen = self.dma.ch(OEN_CHAN);
        oen.ch_read_addr()
            .write(|w| unsafe { w.bits(core::ptr::addr_of!(self.control_word) as u32) });

        // Arm the row-finished drain first, then kick the pixel stream; the
        // chain reaches the pulser well after the drain is waiting.
        self.dma
            .ch(ROW_FINISHED_CHAN)
            .ch_al2_write_addr_trig()
            .write(|w| unsafe { w.bits(core::ptr::addr_of_mut!(self.row_token) as u32) });

        let row_addr = self.scan.row_dma_address(row_start) as u32;
        self.dma
            .ch(PIXEL_CHAN)
            .ch_al3_read_addr_trig()
            .write(|w| unsafe { w.bits(row_addr) });
    }

    // The shifter's two patchable slots discard the bits below the active
    // plane; plane 0 keeps the explicit fenced pull.
    fn set_plane_shift(&self, plane: u8) {
        let instr = if plane == 0 {
            INSTR_PULL_BLOCK
        } else {
            INSTR_OUT_NULL | u32::from(plane)
        };
        let pio = unsafe { &*pac::PIO0::ptr() };
        pio.instr_mem(self.shift0_slot)
            .write(|w| unsafe { w.bits(instr) });
        pio.instr_mem(self.shift1_slot)
            .write(|w| unsafe { w.bits(instr) });
    }

}

/// Run `entry` on core 1 and park that core afterwards.
///
/// `entry` typically builds the [`ScanoutEngine`] into a `static` and calls
/// [`start`](ScanoutEngine::start); the wrapper then falls through to
/// [`park`] so the core keeps servicing `DMA_IRQ_1` forever.
pub fn launch_scanout_core(
    psm: &mut pac::PSM,
    ppb: &mut pac::PPB,
    fifo: &mut rp2040_hal::sio::SioFifo,
    stack: &'static mut [usize],
    entry: impl FnOnce() + Send + 'static,
) -> Result<(), rp2040_hal::multicore::Error> {
    let mut mc = Multicore::new(psm, ppb, fifo);
    mc.cores()[1].spawn(stack, move || {
        entry();
        park()
    })
}

/// Keep the interrupt-servicing core alive.
///
/// Returning from a core 1 main function tears down that core's NVIC and
/// stops `DMA_IRQ_1` from firing, freezing the panel on one row.
pub fn park() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// Output pin handed to the one-shot chip bring-up.
pub type StartupPin = Pin<DynPinId, FunctionSioOutput, PullDown>;

/// Panel pins in plain GPIO mode for driver-chip bring-up.
///
/// Some driver chips power up disabled and want configuration registers
/// clocked in before the PIO programs take over. Run
/// [`run`](StartupBus::run) first, drop the bus, and only then hand the
/// pins to PIO0.
pub struct StartupBus<'a> {
    /// The six colour data pins
    pub data: &'a mut [StartupPin],
    /// Shift clock
    pub clk: &'a mut StartupPin,
    /// Latch strobe
    pub strobe: &'a mut StartupPin,
    /// Output enable, active low
    pub oen: &'a mut StartupPin,
    /// System clock, for bit-bang delays
    pub sys_clk_hz: u32,
}

// RUL6024 configuration registers, from the datasheet's recommended
// bring-up: current gain and voltage trims in register 1, output mode in
// register 2.
const RUL6024_WREG1: u16 = (0b00111 << 11) | (0b0011 << 7) | (0b011 << 4) | 0b0100;
const RUL6024_WREG2: u16 =
    (0b1 << 10) | (0b1 << 9) | (0b1 << 6) | (0b1 << 3) | (0b1 << 2) | 0b01;

impl StartupBus<'_> {
    /// Run the bring-up sequence for the configured driver chip.
    ///
    /// `width` is the panel width in pixels, which equals the shift
    /// register length of one chip row.
    pub fn run(&mut self, chip: ChipStartup, width: usize) {
        match chip {
            ChipStartup::Generic => {}
            ChipStartup::Fm6126a => {
                // Register values lifted from Pimoroni's HUB75 driver.
                self.fm6126a_write_register(0b1111_1111_1111_1110, 12, width);
                self.fm6126a_write_register(0b0000_0100_0000_0000, 13, width);
            }
            ChipStartup::Rul6024 => {
                self.rul6024_write_register(RUL6024_WREG1, 11, width);
                self.rul6024_write_register(RUL6024_WREG2, 12, width);
                // Latch, then reset the time-sharing display function: one
                // strobe width followed by two.
                self.le_command(3);
                self.le_command(1);
                self.le_command(2);
                let _ = self.oen.set_low();
            }
        }
    }

    // The FM6126A decodes the target register from how long the strobe is
    // held before the end of the shift.
    fn fm6126a_write_register(&mut self, value: u16, position: u8, width: usize) {
        let _ = self.oen.set_high();
        let _ = self.clk.set_low();
        let _ = self.strobe.set_low();
        self.delay_us(10_000);

        let threshold = width - position as usize;
        for i in 0..width {
            let bit = value & (1 << (i % 16)) != 0;
            for pin in self.data.iter_mut() {
                if bit {
                    let _ = pin.set_high();
                } else {
                    let _ = pin.set_low();
                }
            }
            if i > threshold {
                let _ = self.strobe.set_high();
            } else {
                let _ = self.strobe.set_low();
            }
            let _ = self.clk.set_high();
            self.delay_us(10_000);
            let _ = self.clk.set_low();
        }
        let _ = self.strobe.set_low();
        let _ = self.oen.set_low();
    }

    // The RUL6024 shifts the value through its 16-bit register, then the
    // strobe length of the following command selects the target register.
    fn rul6024_write_register(&mut self, value: u16, le_clocks: u32, width: usize) {
        let _ = self.oen.set_high();
        let _ = self.strobe.set_low();
        self.delay_us(10);

        for i in 0..width {
            let bit = value & (1 << (i % 16)) != 0;
            let _ = self.clk.set_low();
            self.delay_us(10);
            for pin in self.data.iter_mut() {
                if bit {
                    let _ = pin.set_high();
                } else {
                    let _ = pin.set_low();
                }
            }
            self.delay_us(10);
            let _ = self.clk.set_high();
            self.delay_us(10);
        }
        let _ = self.clk.set_low();
        self.le_command(le_clocks);
        let _ = self.oen.set_low();
        self.delay_us(10);
    }

    // A strobe held high for n clocks encodes a RUL6024 command: 1 and 2
    // reset the output enable sequencer, 3 latches data, 11 and 12 write
    // the configuration registers.
    fn le_command(&mut self, le_clocks: u32) {
        let _ = self.strobe.set_high();
        self.delay_us(10);
        for _ in 0..le_clocks {
            let _ = self.clk.set_high();
            self.delay_us(10);
            let _ = self.clk.set_low();
            self.delay_us(10);
        }
        let _ = self.strobe.set_low();
        self.delay_us(10);
    }

    fn delay_us(&self, us: u32) {
        cortex_m::asm::delay(self.sys_clk_hz / 1_000_000 * us);
    }
}
