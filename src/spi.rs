//! SPI array master
//!
//! One shared serial clock and MOSI line, eight MISO lanes and eight
//! independent active-low chip selects. Every transaction shifts 8 bits out
//! MSB first and captures 8 bits per lane.
//!
//! The engine is modelled one system-clock tick at a time: register writes
//! land between ticks, [`SpiArrayMaster::tick`] consumes the MISO levels for
//! one tick and returns the pin state at the end of it.

use fugit::HertzU32 as Hertz;

use crate::clock::{self, ConfigError, Prescaler, EDGES_PER_TRANSFER};
use crate::edge::EdgeDetector;
use crate::interrupt::IrqConfig;
use crate::pads::{Level, Pads};
use crate::regs::{ConfigReg, Reg, CSN_RESET};
use crate::LANES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Bus access outside the CSR block
    Unmapped(u32),
    InvalidLane(usize),
    /// A bound pin reported an error
    Pad,
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub sys_clk: Hertz,
    pub baudrate: Hertz,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sys_clk: clock::DEFAULT_SYS_CLK,
            baudrate: clock::DEFAULT_BAUDRATE,
        }
    }
}

impl Config {
    pub fn new(sys_clk: Hertz, baudrate: Hertz) -> Self {
        Self { sys_clk, baudrate }
    }
}

/// Transaction state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    Idle,
    /// A transaction is in flight. Bit actions only run once `primed`; with
    /// CPHA = 1 the first rising edge primes the transaction.
    Shifting { primed: bool },
}

/// MISO levels presented to one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Inputs {
    pub miso: [Level; LANES],
}

impl Inputs {
    /// Lane `i` takes bit `i` of `levels`.
    pub fn from_bits(levels: u8) -> Self {
        Self {
            miso: core::array::from_fn(|lane| Level::from((levels >> lane) & 1)),
        }
    }

    pub fn bits(&self) -> u8 {
        self.miso
            .iter()
            .enumerate()
            .fold(0, |acc, (lane, level)| acc | ((level.is_high() as u8) << lane))
    }
}

/// Pin state at the end of a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Outputs {
    pub sck: Level,
    pub mosi: Level,
    /// Active-low chip selects, bit `i` drives lane `i`
    pub csn: u8,
    pub irq: Level,
    pub done: bool,
}

impl Outputs {
    pub fn csn(&self, lane: usize) -> Level {
        match lane {
            l if l < LANES => Level::from((self.csn >> l) & 1),
            _ => Level::High,
        }
    }

    /// Lane `lane` is selected.
    pub fn selected(&self, lane: usize) -> bool {
        self.csn(lane).is_low()
    }
}

/// Receive shift register and completed byte of one MISO lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxLane {
    shift: u8,
    data: u8,
}

impl RxLane {
    #[inline]
    pub const fn shift(&self) -> u8 {
        self.shift
    }

    #[inline]
    pub const fn data(&self) -> u8 {
        self.data
    }

    fn capture(&mut self, level: Level) {
        self.shift = (self.shift & !1) | level.is_high() as u8;
    }
}

pub struct SpiArrayMaster {
    prescaler: Prescaler,
    detector: EdgeDetector,

    config: ConfigReg,
    tx_data: u8,
    csn: u8,

    tx_shift: u8,
    lanes: [RxLane; LANES],
    spi_clk: bool,
    edge_count: u8,
    bits: u8,
    cpha: bool,
    state: State,

    done: bool,
    pulse: bool,
    irq_pending: bool,

    start_pending: bool,
    dropped_starts: u32,
}

impl SpiArrayMaster {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let prescaler = Prescaler::new(config.sys_clk, config.baudrate)?;
        debug!(
            "spi array: divisor {=u32}, {=u32} Hz",
            prescaler.divisor(),
            prescaler.actual_baudrate().to_Hz()
        );

        Ok(Self {
            prescaler,
            detector: EdgeDetector::new(),
            config: ConfigReg::default(),
            tx_data: 0,
            csn: CSN_RESET as u8,
            tx_shift: 0,
            lanes: [RxLane::default(); LANES],
            spi_clk: false,
            edge_count: 0,
            bits: 0,
            cpha: false,
            state: State::Idle,
            done: true,
            pulse: false,
            irq_pending: false,
            start_pending: false,
            dropped_starts: 0,
        })
    }

    pub fn prescaler(&self) -> &Prescaler {
        &self.prescaler
    }

    pub fn config(&self) -> ConfigReg {
        self.config
    }

    pub fn irq_config(&self) -> IrqConfig {
        IrqConfig::from_config(self.config)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn is_busy(&self) -> bool {
        !self.done
    }

    /// Completed byte of every lane.
    pub fn rx_data(&self) -> [u8; LANES] {
        core::array::from_fn(|lane| self.lanes[lane].data)
    }

    pub fn lanes(&self) -> &[RxLane; LANES] {
        &self.lanes
    }

    pub fn rx_shift(&self) -> [u8; LANES] {
        core::array::from_fn(|lane| self.lanes[lane].shift)
    }

    pub fn tx_shift(&self) -> u8 {
        self.tx_shift
    }

    pub fn edge_count(&self) -> u8 {
        self.edge_count
    }

    pub fn bit_count(&self) -> u8 {
        self.bits
    }

    /// Internal serial clock, before CPOL.
    pub fn serial_clock(&self) -> bool {
        self.spi_clk
    }

    /// Completion pulse, high only on the tick a transaction completed.
    pub fn pulse(&self) -> bool {
        self.pulse
    }

    /// Set on completion, cleared by the next accepted start.
    pub fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    pub fn dropped_starts(&self) -> u32 {
        self.dropped_starts
    }

    /// Register read. Reflects the state at the end of the last tick.
    pub fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Config => self.config.bits(),
            Reg::TxData => self.tx_data as u32,
            Reg::Done => self.done as u32,
            Reg::Start => 0,
            Reg::Csn => self.csn as u32,
            Reg::RxData(lane) => self.lanes.get(lane as usize).map_or(0, |l| l.data as u32),
            Reg::DroppedStarts => self.dropped_starts,
        }
    }

    /// Register write, masked to the CSR width. Takes effect before the next
    /// tick.
    pub fn write(&mut self, reg: Reg, value: u32) {
        let value = value & reg.mask();
        match reg {
            Reg::Config => self.config = ConfigReg::from_bits(value),
            Reg::TxData => self.tx_data = value as u8,
            Reg::Csn => self.csn = value as u8,
            Reg::Start => {
                if value & 1 == 0 {
                    return;
                }
                if self.start_pending {
                    // previous strobe not consumed yet
                    self.drop_start();
                } else {
                    self.start_pending = true;
                }
            }
            Reg::Done | Reg::RxData(_) | Reg::DroppedStarts => {
                trace!("spi array: write to read-only csr {=u32} ignored", reg.offset());
            }
        }
    }

    /// Register read by byte offset.
    pub fn read_offset(&self, offset: u32) -> Result<u32, Error> {
        let reg = Reg::from_offset(offset).ok_or(Error::Unmapped(offset))?;
        Ok(self.read(reg))
    }

    /// Register write by byte offset.
    pub fn write_offset(&mut self, offset: u32, value: u32) -> Result<(), Error> {
        let reg = Reg::from_offset(offset).ok_or(Error::Unmapped(offset))?;
        self.write(reg, value);
        Ok(())
    }

    /// Advance one system-clock tick.
    pub fn tick(&mut self, inputs: &Inputs) -> Outputs {
        self.pulse = false;

        // events and state as of the start of the tick
        let edges = self.detector.edges();
        let state = self.state;
        self.detector.clock(self.spi_clk, state == State::Idle);

        if core::mem::take(&mut self.start_pending) {
            if self.done {
                self.begin();
                return self.outputs();
            }
            self.drop_start();
        }

        let State::Shifting { primed } = state else {
            return self.outputs();
        };

        let (capture, shift) = if self.cpha {
            (edges.rising, edges.falling)
        } else {
            (edges.falling, edges.rising)
        };

        // clock generation, completion snapshots the registers before this
        // tick's bit actions
        if self.prescaler.step() {
            if self.edge_count < EDGES_PER_TRANSFER {
                self.spi_clk = !self.spi_clk;
                self.edge_count += 1;
            } else {
                self.complete();
            }
        }

        if capture && self.bits < 8 {
            if primed {
                for (lane, level) in self.lanes.iter_mut().zip(inputs.miso) {
                    lane.capture(level);
                }
                self.tx_shift <<= 1;
                self.bits += 1;
            } else if self.state != State::Idle {
                self.state = State::Shifting { primed: true };
            }
        }
        if shift && primed {
            for lane in self.lanes.iter_mut() {
                lane.shift <<= 1;
            }
        }

        self.outputs()
    }

    /// Sample the bound MISO pins, advance one tick and drive the outputs.
    pub fn step<SCK, MOSI, MISO, CSN, IRQ>(
        &mut self,
        pads: &mut Pads<SCK, MOSI, MISO, CSN, IRQ>,
    ) -> Result<Outputs, Error>
    where
        SCK: embedded_hal::digital::OutputPin,
        MOSI: embedded_hal::digital::OutputPin,
        MISO: embedded_hal::digital::InputPin,
        CSN: embedded_hal::digital::OutputPin,
        IRQ: embedded_hal::digital::OutputPin,
    {
        let inputs = pads.sample()?;
        let out = self.tick(&inputs);
        pads.drive(&out)?;
        Ok(out)
    }

    /// Pin state for the current register contents.
    pub fn outputs(&self) -> Outputs {
        let cpol = self.config.cpol();
        Outputs {
            sck: Level::from(self.spi_clk ^ cpol),
            mosi: Level::from(self.tx_shift & 0x80 != 0),
            csn: self.csn,
            irq: self.irq_config().pin_level(self.pulse),
            done: self.done,
        }
    }

    fn begin(&mut self) {
        self.tx_shift = self.tx_data;
        for lane in self.lanes.iter_mut() {
            lane.shift = 0;
        }
        self.prescaler.restart();
        self.edge_count = 0;
        self.bits = 0;
        self.spi_clk = false;
        self.done = false;
        self.irq_pending = false;
        self.cpha = self.config.cpha();
        self.state = State::Shifting { primed: !self.cpha };
        debug!(
            "spi array: start tx {=u8:#x}, cpha {=bool}",
            self.tx_data,
            self.cpha
        );
    }

    fn complete(&mut self) {
        for lane in self.lanes.iter_mut() {
            lane.data = lane.shift;
        }
        self.state = State::Idle;
        self.done = true;
        self.pulse = true;
        self.irq_pending = true;
        trace!("spi array: done, rx {=[u8]:x}", &self.rx_data()[..]);
    }

    fn drop_start(&mut self) {
        self.dropped_starts = self.dropped_starts.saturating_add(1);
        warn!(
            "spi array: start ignored while busy ({=u32} dropped)",
            self.dropped_starts
        );
    }
}
