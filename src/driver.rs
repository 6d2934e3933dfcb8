//! Driver for the SPI array master
//!
//! Talks to the peripheral through its CSR block only, so the same driver runs
//! against memory-mapped hardware ([`MmioBus`]) and against the simulation
//! harness ([`SimBus`](crate::sim::SimBus)).

use embedded_hal::spi::{Mode, Operation, Phase, Polarity, MODE_0};
use fugit::HertzU32 as Hertz;

use crate::clock::{cycles_for_ns, DEFAULT_SYS_CLK};
use crate::interrupt::IrqConfig;
use crate::regs::{offset, ConfigReg, CSN_RESET};
pub use crate::spi::Error;
use crate::LANES;

/// CSR bus of one array master. Offsets are relative to its CSR base.
pub trait Bus {
    fn read(&mut self, offset: u32) -> u32;
    fn write(&mut self, offset: u32, value: u32);
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn read(&mut self, offset: u32) -> u32 {
        B::read(self, offset)
    }

    fn write(&mut self, offset: u32, value: u32) {
        B::write(self, offset, value)
    }
}

/// Memory-mapped CSR block.
pub struct MmioBus {
    base: *mut u32,
}

impl MmioBus {
    /// # Safety
    ///
    /// `base` must point to the CSR block of an array master, valid for
    /// volatile 32-bit accesses over the whole map, for the lifetime of the
    /// returned bus.
    pub const unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }

    fn word(&self, offset: u32) -> *mut u32 {
        self.base.wrapping_add((offset / 4) as usize)
    }
}

impl Bus for MmioBus {
    #[inline]
    fn read(&mut self, offset: u32) -> u32 {
        // SAFETY: guaranteed by the caller of `MmioBus::new`
        unsafe { core::ptr::read_volatile(self.word(offset)) }
    }

    #[inline]
    fn write(&mut self, offset: u32, value: u32) {
        // SAFETY: guaranteed by the caller of `MmioBus::new`
        unsafe { core::ptr::write_volatile(self.word(offset), value) }
    }
}

#[non_exhaustive]
#[derive(Copy, Clone)]
pub struct Config {
    pub mode: Mode,
    pub irq: IrqConfig,
    /// System clock of the peripheral, used to convert delays into cycles
    pub sys_clk: Hertz,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: MODE_0,
            irq: IrqConfig::DISABLED,
            sys_clk: DEFAULT_SYS_CLK,
        }
    }
}

impl Config {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_irq(mut self, irq: IrqConfig) -> Self {
        self.irq = irq;
        self
    }

    pub fn with_sys_clk(mut self, sys_clk: Hertz) -> Self {
        self.sys_clk = sys_clk;
        self
    }
}

fn config_reg(mode: Mode, irq: IrqConfig) -> ConfigReg {
    let mut cfg = ConfigReg::default();
    cfg.set_cpol(mode.polarity == Polarity::IdleHigh);
    cfg.set_cpha(mode.phase == Phase::CaptureOnSecondTransition);
    irq.apply(&mut cfg);
    cfg
}

fn lane_bit(lane: usize) -> Result<u8, Error> {
    if lane < LANES {
        Ok(1 << lane)
    } else {
        Err(Error::InvalidLane(lane))
    }
}

/// Array master driver.
pub struct SpiArray<B: Bus> {
    bus: B,
    config: ConfigReg,
    csn: u8,
    sys_clk: Hertz,
}

impl<B: Bus> SpiArray<B> {
    /// Configure the peripheral and deassert every chip select.
    pub fn new(mut bus: B, config: Config) -> Self {
        let cfg = config_reg(config.mode, config.irq);
        bus.write(offset::CONFIG, cfg.bits());
        bus.write(offset::CSN, CSN_RESET);

        Self {
            bus,
            config: cfg,
            csn: CSN_RESET as u8,
            sys_clk: config.sys_clk,
        }
    }

    pub fn release(self) -> B {
        self.bus
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn mode(&self) -> Mode {
        Mode {
            polarity: match self.config.cpol() {
                true => Polarity::IdleHigh,
                false => Polarity::IdleLow,
            },
            phase: match self.config.cpha() {
                true => Phase::CaptureOnSecondTransition,
                false => Phase::CaptureOnFirstTransition,
            },
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.config = config_reg(mode, IrqConfig::from_config(self.config));
        self.bus.write(offset::CONFIG, self.config.bits());
    }

    pub fn set_interrupt(&mut self, irq: IrqConfig) {
        irq.apply(&mut self.config);
        self.bus.write(offset::CONFIG, self.config.bits());
    }

    pub fn interrupt(&self) -> IrqConfig {
        IrqConfig::from_config(self.config)
    }

    /// Assert the chip select of `lane`.
    pub fn select(&mut self, lane: usize) -> Result<(), Error> {
        let bit = lane_bit(lane)?;
        self.set_chip_selects(self.csn & !bit);
        Ok(())
    }

    pub fn deselect(&mut self, lane: usize) -> Result<(), Error> {
        let bit = lane_bit(lane)?;
        self.set_chip_selects(self.csn | bit);
        Ok(())
    }

    pub fn deselect_all(&mut self) {
        self.set_chip_selects(CSN_RESET as u8);
    }

    /// Raw active-low chip-select vector.
    pub fn chip_selects(&self) -> u8 {
        self.csn
    }

    /// Write the whole active-low chip-select vector.
    pub fn set_chip_selects(&mut self, csn: u8) {
        self.csn = csn;
        self.bus.write(offset::CSN, csn as u32);
    }

    pub fn is_busy(&mut self) -> bool {
        self.bus.read(offset::DONE) & 1 == 0
    }

    /// Start shifting `byte` out on every lane.
    pub fn nb_start(&mut self, byte: u8) -> nb::Result<(), Error> {
        if self.is_busy() {
            return Err(nb::Error::WouldBlock);
        }
        self.bus.write(offset::TX_DATA, byte as u32);
        self.bus.write(offset::START, 1);
        Ok(())
    }

    /// Bytes received by the last transaction, once it has completed.
    pub fn nb_read(&mut self) -> nb::Result<[u8; LANES], Error> {
        if self.is_busy() {
            return Err(nb::Error::WouldBlock);
        }
        Ok(self.rx_data())
    }

    /// Last completed byte of every lane, without waiting.
    pub fn rx_data(&mut self) -> [u8; LANES] {
        let mut rx = [0; LANES];
        for (lane, byte) in rx.iter_mut().enumerate() {
            *byte = self.bus.read(offset::rx_data(lane)) as u8;
        }
        rx
    }

    /// Last completed byte of one lane.
    pub fn read_lane(&mut self, lane: usize) -> Result<u8, Error> {
        lane_bit(lane)?;
        Ok(self.bus.read(offset::rx_data(lane)) as u8)
    }

    pub fn blocking_transfer(&mut self, byte: u8) -> Result<[u8; LANES], Error> {
        nb::block!(self.nb_start(byte))?;
        nb::block!(self.nb_read())
    }

    pub fn blocking_flush(&mut self) {
        while self.is_busy() {}
    }

    #[cfg(feature = "embassy")]
    pub async fn transfer(&mut self, byte: u8) -> Result<[u8; LANES], Error> {
        loop {
            match self.nb_start(byte) {
                Ok(()) => break,
                Err(nb::Error::WouldBlock) => embassy_futures::yield_now().await,
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
        loop {
            match self.nb_read() {
                Ok(rx) => return Ok(rx),
                Err(nb::Error::WouldBlock) => embassy_futures::yield_now().await,
                Err(nb::Error::Other(e)) => return Err(e),
            }
        }
    }

    /// Starts ignored by the peripheral because it was busy.
    pub fn dropped_starts(&mut self) -> u32 {
        self.bus.read(offset::DROPPED_STARTS)
    }

    /// Let at least `cycles` system-clock cycles pass.
    pub fn idle(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.bus.read(offset::DONE);
        }
    }

    pub fn delay_ns(&mut self, ns: u32) {
        self.idle(cycles_for_ns(self.sys_clk, ns));
    }

    /// Handle for exchanging bytes with the device on one lane.
    pub fn lane(&mut self, index: usize) -> Result<Lane<'_, B>, Error> {
        lane_bit(index)?;
        Ok(Lane { array: self, index })
    }
}

/// One lane of the array.
///
/// As a [`SpiBus`](embedded_hal::spi::SpiBus) it leaves the chip selects
/// alone; as a [`SpiDevice`](embedded_hal::spi::SpiDevice) it asserts its own
/// chip select around each transaction.
///
/// Every byte is a full array transaction. MOSI follows the configured mode
/// exactly, but the array captures MISO one bit ahead of a standard slave: a
/// device replying `r` is read back as `r << 1` in every mode, and with
/// CPHA = 1 the last bit is always 0. Drivers that need the device's byte
/// must account for this alignment.
pub struct Lane<'a, B: Bus> {
    array: &'a mut SpiArray<B>,
    index: usize,
}

impl<B: Bus> Lane<'_, B> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn transfer_byte(&mut self, byte: u8) -> Result<u8, Error> {
        let rx = self.array.blocking_transfer(byte)?;
        Ok(rx[self.index])
    }
}

impl<B: Bus> embedded_hal::spi::ErrorType for Lane<'_, B> {
    type Error = Error;
}

impl<B: Bus> embedded_hal::spi::SpiBus for Lane<'_, B> {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.transfer_byte(0x00)?;
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            self.transfer_byte(word)?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        for i in 0..read.len().max(write.len()) {
            let rx = self.transfer_byte(write.get(i).copied().unwrap_or(0x00))?;
            if let Some(word) = read.get_mut(i) {
                *word = rx;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words.iter_mut() {
            *word = self.transfer_byte(*word)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.array.blocking_flush();
        Ok(())
    }
}

impl<B: Bus> embedded_hal::spi::SpiDevice for Lane<'_, B> {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        use embedded_hal::spi::SpiBus;

        self.array.select(self.index)?;
        let result = operations.iter_mut().try_for_each(|op| match op {
            Operation::Read(words) => SpiBus::read(self, words),
            Operation::Write(words) => SpiBus::write(self, words),
            Operation::Transfer(read, write) => SpiBus::transfer(self, read, write),
            Operation::TransferInPlace(words) => SpiBus::transfer_in_place(self, words),
            Operation::DelayNs(ns) => {
                self.array.delay_ns(*ns);
                Ok(())
            }
        });
        let flushed = SpiBus::flush(self);
        self.array.deselect(self.index)?;
        result.and(flushed)
    }
}

impl<B: Bus> embedded_hal_nb::spi::FullDuplex for Lane<'_, B> {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.array.nb_read().map(|rx| rx[self.index])
    }

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.array.nb_start(word)
    }
}
