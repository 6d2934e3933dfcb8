//! Simulation harness
//!
//! [`SimBus`] wraps an engine and the device hanging off its lanes. Every
//! register access is followed by exactly one system-clock tick, which makes
//! the bus usable as the [`Bus`](crate::driver::Bus) of a
//! [`SpiArray`](crate::driver::SpiArray) driver.

use embedded_hal::spi::{Mode, Phase, Polarity};
use heapless::Vec;

use crate::driver::Bus;
use crate::interrupt::IrqLatch;
use crate::pads::Level;
use crate::spi::{Inputs, Outputs, SpiArrayMaster};
use crate::LANES;

/// A device on the MISO lanes.
pub trait Peer {
    /// MISO levels presented to the coming tick.
    fn miso(&mut self) -> Inputs;

    /// Pin state at the end of a tick.
    fn observe(&mut self, _out: &Outputs) {}
}

impl<P: Peer + ?Sized> Peer for &mut P {
    fn miso(&mut self) -> Inputs {
        P::miso(self)
    }

    fn observe(&mut self, out: &Outputs) {
        P::observe(self, out)
    }
}

/// Nothing connected, every lane reads low.
#[derive(Clone, Copy, Debug, Default)]
pub struct Idle;

impl Peer for Idle {
    fn miso(&mut self) -> Inputs {
        Inputs::default()
    }
}

/// Static lane levels, lane `i` follows bit `i`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Levels(pub u8);

impl Peer for Levels {
    fn miso(&mut self) -> Inputs {
        Inputs::from_bits(self.0)
    }
}

/// Software SPI slave for one lane.
///
/// Shifts `reply` out MSB first and assembles the bits it samples from MOSI,
/// following its own clock mode. Unselected slaves drive their lane low.
#[derive(Clone, Copy, Debug)]
pub struct SpiSlave {
    mode: Mode,
    reply: u8,
    out: u8,
    received: u8,
    bits: u8,
    leading_seen: bool,
    selected: bool,
    sck: Level,
}

impl SpiSlave {
    pub fn new(mode: Mode, reply: u8) -> Self {
        Self {
            mode,
            reply,
            out: reply,
            received: 0,
            bits: 0,
            leading_seen: false,
            selected: false,
            sck: idle_level(mode),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Byte loaded on the next chip-select assertion.
    pub fn set_reply(&mut self, reply: u8) {
        self.reply = reply;
    }

    /// Bits sampled from MOSI during the current or last selection.
    pub fn received(&self) -> u8 {
        self.received
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn miso(&self) -> Level {
        match self.selected {
            true => Level::from(self.out & 0x80 != 0),
            false => Level::Low,
        }
    }

    /// Follow the bus for one tick.
    pub fn clock(&mut self, sck: Level, mosi: Level, selected: bool) {
        if selected && !self.selected {
            self.out = self.reply;
            self.received = 0;
            self.bits = 0;
            self.leading_seen = false;
        }
        self.selected = selected;

        if selected && sck != self.sck {
            let leading = self.sck == idle_level(self.mode);
            let sample = leading == (self.mode.phase == Phase::CaptureOnFirstTransition);
            if sample {
                if self.bits < 8 {
                    self.received = (self.received << 1) | mosi.is_high() as u8;
                    self.bits += 1;
                }
            } else if !leading || self.leading_seen {
                self.out <<= 1;
            }
            if leading {
                self.leading_seen = true;
            }
        }
        self.sck = sck;
    }
}

fn idle_level(mode: Mode) -> Level {
    match mode.polarity {
        Polarity::IdleLow => Level::Low,
        Polarity::IdleHigh => Level::High,
    }
}

/// One [`SpiSlave`] per lane, each behind its own chip select.
#[derive(Clone, Copy, Debug)]
pub struct Lanes(pub [SpiSlave; LANES]);

impl Lanes {
    /// Slaves sharing `mode`, lane `i` replying with `replies[i]`.
    pub fn new(mode: Mode, replies: [u8; LANES]) -> Self {
        Self(replies.map(|reply| SpiSlave::new(mode, reply)))
    }

    pub fn received(&self) -> [u8; LANES] {
        self.0.map(|slave| slave.received())
    }
}

impl Peer for Lanes {
    fn miso(&mut self) -> Inputs {
        Inputs {
            miso: self.0.map(|slave| slave.miso()),
        }
    }

    fn observe(&mut self, out: &Outputs) {
        for (lane, slave) in self.0.iter_mut().enumerate() {
            slave.clock(out.sck, out.mosi, out.selected(lane));
        }
    }
}

/// A physical SCK transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SckEdge {
    /// Tick, counted from bus construction, at the end of which SCK changed
    pub tick: u64,
    /// SCK level after the transition
    pub level: Level,
    /// MOSI at the same tick
    pub mosi: Level,
}

/// Fixed-capacity SCK edge recorder. Recording stops once it is full.
#[derive(Clone, Debug, Default)]
pub struct Probe<const N: usize> {
    edges: Vec<SckEdge, N>,
    full: bool,
}

impl<const N: usize> Probe<N> {
    pub const fn new() -> Self {
        Self {
            edges: Vec::new(),
            full: false,
        }
    }

    pub fn record(&mut self, tick: u64, prev: &Outputs, out: &Outputs) {
        if self.full || prev.sck == out.sck {
            return;
        }
        let edge = SckEdge {
            tick,
            level: out.sck,
            mosi: out.mosi,
        };
        if self.edges.push(edge).is_err() {
            warn!("probe full after {=usize} edges", N);
            self.full = true;
        }
    }

    pub fn edges(&self) -> &[SckEdge] {
        &self.edges
    }

    pub fn rising(&self) -> impl Iterator<Item = &SckEdge> + '_ {
        self.edges.iter().filter(|e| e.level == Level::High)
    }

    pub fn falling(&self) -> impl Iterator<Item = &SckEdge> + '_ {
        self.edges.iter().filter(|e| e.level == Level::Low)
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn clear(&mut self) {
        self.edges.clear();
        self.full = false;
    }
}

/// Register bus driving an engine in lockstep with its accesses.
pub struct SimBus<P, const N: usize = 64> {
    engine: SpiArrayMaster,
    peer: P,
    probe: Option<Probe<N>>,
    irq: IrqLatch,
    outputs: Outputs,
    cycles: u64,
}

impl<P: Peer, const N: usize> SimBus<P, N> {
    pub fn new(engine: SpiArrayMaster, peer: P) -> Self {
        let outputs = engine.outputs();
        Self {
            engine,
            peer,
            probe: None,
            irq: IrqLatch::new(),
            outputs,
            cycles: 0,
        }
    }

    /// Record SCK edges from now on.
    pub fn with_probe(mut self) -> Self {
        self.probe = Some(Probe::new());
        self
    }

    pub fn tick(&mut self) -> Outputs {
        let inputs = self.peer.miso();
        let out = self.engine.tick(&inputs);
        self.cycles += 1;

        if let Some(probe) = self.probe.as_mut() {
            probe.record(self.cycles, &self.outputs, &out);
        }

        let active = self.engine.irq_config().polarity.active_level();
        if out.irq == active && self.outputs.irq != active {
            self.irq.on_interrupt();
        }

        self.peer.observe(&out);
        self.outputs = out;
        out
    }

    pub fn run(&mut self, ticks: u32) -> Outputs {
        for _ in 0..ticks {
            self.tick();
        }
        self.outputs
    }

    /// Tick until `done` is set, at most `limit` times. Returns the number
    /// of ticks taken.
    pub fn run_until_done(&mut self, limit: u32) -> Option<u32> {
        for n in 0..limit {
            if self.outputs.done {
                return Some(n);
            }
            self.tick();
        }
        self.outputs.done.then_some(limit)
    }

    /// Ticks since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn engine(&self) -> &SpiArrayMaster {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SpiArrayMaster {
        &mut self.engine
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    pub fn probe(&self) -> Option<&Probe<N>> {
        self.probe.as_ref()
    }

    pub fn probe_mut(&mut self) -> Option<&mut Probe<N>> {
        self.probe.as_mut()
    }

    /// Irq assertions seen on the pin.
    pub fn irq_latch(&self) -> &IrqLatch {
        &self.irq
    }

    pub fn into_parts(self) -> (SpiArrayMaster, P) {
        (self.engine, self.peer)
    }
}

impl<P: Peer, const N: usize> Bus for SimBus<P, N> {
    fn read(&mut self, offset: u32) -> u32 {
        let value = match self.engine.read_offset(offset) {
            Ok(value) => value,
            Err(_) => {
                warn!("sim bus: read from unmapped offset {=u32:#x}", offset);
                0
            }
        };
        self.tick();
        value
    }

    fn write(&mut self, offset: u32, value: u32) {
        if self.engine.write_offset(offset, value).is_err() {
            warn!("sim bus: write to unmapped offset {=u32:#x}", offset);
        }
        self.tick();
    }
}

#[cfg(test)]
mod tests {
    use embedded_hal::spi::{MODE_0, MODE_1, MODE_2, MODE_3};
    use fugit::HertzU32 as Hertz;

    use super::*;
    use crate::regs::{offset, Reg};
    use crate::spi::Config;

    fn engine() -> SpiArrayMaster {
        SpiArrayMaster::new(Config::new(Hertz::from_raw(100), Hertz::from_raw(10))).unwrap()
    }

    /// Drive a slave through eight clock periods of `mode` by hand.
    fn exchange(slave: &mut SpiSlave, tx: u8) -> u8 {
        let idle = idle_level(slave.mode());
        let mut rx = 0;
        slave.clock(idle, Level::Low, true);
        let capture_first = slave.mode().phase == Phase::CaptureOnFirstTransition;
        for bit in (0..8).rev() {
            let mosi = Level::from((tx >> bit) & 1);
            if capture_first {
                rx = (rx << 1) | slave.miso().is_high() as u8;
                slave.clock(!idle, mosi, true);
                slave.clock(idle, mosi, true);
            } else {
                slave.clock(!idle, mosi, true);
                rx = (rx << 1) | slave.miso().is_high() as u8;
                slave.clock(idle, mosi, true);
            }
        }
        slave.clock(idle, Level::Low, false);
        rx
    }

    #[test]
    fn slave_exchanges_in_every_mode() {
        for mode in [MODE_0, MODE_1, MODE_2, MODE_3] {
            let mut slave = SpiSlave::new(mode, 0x96);
            assert_eq!(exchange(&mut slave, 0x3C), 0x96);
            assert_eq!(slave.received(), 0x3C);
            assert_eq!(slave.bits(), 8);
            assert!(!slave.is_selected());
            assert_eq!(slave.miso(), Level::Low);
        }
    }

    #[test]
    fn slave_reloads_on_select() {
        let mut slave = SpiSlave::new(MODE_0, 0x81);
        exchange(&mut slave, 0);
        slave.set_reply(0x42);
        assert_eq!(exchange(&mut slave, 0xFF), 0x42);
        assert_eq!(slave.received(), 0xFF);
    }

    #[test]
    fn probe_stops_when_full() {
        let mut probe = Probe::<2>::new();
        let mut prev = engine().outputs();
        for tick in 0..4 {
            let mut out = prev;
            out.sck = !prev.sck;
            probe.record(tick, &prev, &out);
            prev = out;
        }
        assert!(probe.is_full());
        assert_eq!(probe.edges().len(), 2);
        assert_eq!(probe.rising().count(), 1);
        assert_eq!(probe.falling().count(), 1);
        probe.clear();
        assert!(probe.edges().is_empty());
    }

    #[test]
    fn every_access_is_one_tick() {
        let mut bus: SimBus<Idle> = SimBus::new(engine(), Idle);
        assert_eq!(bus.read(offset::DONE), 1);
        bus.write(offset::TX_DATA, 0x12);
        assert_eq!(bus.cycles(), 2);
        assert_eq!(bus.read(0x100), 0);
        bus.write(0x100, 5);
        assert_eq!(bus.cycles(), 4);
        assert_eq!(bus.engine().read(Reg::TxData), 0x12);
    }

    #[test]
    fn start_through_the_bus() {
        let mut bus: SimBus<Levels> = SimBus::new(engine(), Levels(0b0000_0001)).with_probe();
        bus.write(offset::START, 1);
        // the write's own tick accepted the start
        assert_eq!(bus.read(offset::DONE), 0);
        assert_eq!(bus.run_until_done(200), Some(84));
        assert_eq!(bus.read(offset::rx_data(0)), 0xFF);
        assert_eq!(bus.read(offset::rx_data(1)), 0);
        let probe = bus.probe().unwrap();
        assert_eq!(probe.edges().len(), 16);
        assert_eq!(probe.edges()[0].tick, 6);
    }

    #[test]
    fn irq_assertions_are_latched() {
        let mut bus: SimBus<Idle> = SimBus::new(engine(), Idle);
        bus.write(offset::CONFIG, 0b1000);
        for _ in 0..3 {
            bus.write(offset::START, 1);
            bus.run_until_done(200).unwrap();
        }
        assert_eq!(bus.irq_latch().take(), 3);

        bus.write(offset::CONFIG, 0);
        bus.write(offset::START, 1);
        bus.run_until_done(200).unwrap();
        bus.run(2);
        assert_eq!(bus.irq_latch().pending(), 0);
    }
}
