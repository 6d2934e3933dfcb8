use embedded_hal::spi::{Mode, MODE_0, MODE_1, MODE_2, MODE_3};
use fugit::HertzU32 as Hertz;
use spi_array_hal::driver::{self, Bus, SpiArray};
use spi_array_hal::interrupt::{IrqConfig, IrqPolarity};
use spi_array_hal::regs::offset;
use spi_array_hal::sim::{Idle, Lanes, Levels, Peer, SckEdge, SimBus};
use spi_array_hal::spi::{self, Inputs, SpiArrayMaster};
use spi_array_hal::{Level, LANES};

/// 100 Hz system clock at 10 Hz, divisor 5
fn engine() -> SpiArrayMaster {
    SpiArrayMaster::new(spi::Config::new(Hertz::from_raw(100), Hertz::from_raw(10))).unwrap()
}

fn config_bits(mode: Mode) -> u32 {
    let cpol = (mode == MODE_2 || mode == MODE_3) as u32;
    let cpha = (mode == MODE_1 || mode == MODE_3) as u32;
    cpha << 1 | cpol
}

/// SCK level at which a standard slave samples MOSI.
fn sampling_level(mode: Mode) -> Level {
    match mode {
        m if m == MODE_0 || m == MODE_3 => Level::High,
        _ => Level::Low,
    }
}

/// Runs one transaction and returns the tick of the accepted start.
fn start<P: Peer>(bus: &mut SimBus<P>, mode: Mode, tx: u8) -> u64 {
    bus.write(offset::CONFIG, config_bits(mode));
    bus.write(offset::TX_DATA, tx as u32);
    bus.write(offset::START, 1);
    bus.cycles()
}

fn sampled_mosi(edges: &[SckEdge], after: u64, level: Level) -> u8 {
    edges
        .iter()
        .filter(|e| e.tick > after && e.level == level)
        .fold(0, |acc, e| (acc << 1) | e.mosi.is_high() as u8)
}

#[test]
fn mosi_is_msb_first_at_the_sampling_edge_in_every_mode() {
    for mode in [MODE_0, MODE_1, MODE_2, MODE_3] {
        let mut bus: SimBus<Idle> = SimBus::new(engine(), Idle).with_probe();
        let started = start(&mut bus, mode, 0xA5);
        bus.run(100);

        let edges = bus.probe().unwrap().edges();
        let after_start = edges.iter().filter(|e| e.tick > started).count();
        assert_eq!(after_start, 16, "{mode:?}");
        assert_eq!(sampled_mosi(edges, started, sampling_level(mode)), 0xA5, "{mode:?}");

        // SCK back at its idle level
        let cpol = mode == MODE_2 || mode == MODE_3;
        assert_eq!(bus.outputs().sck, Level::from(cpol));
    }
}

#[test]
fn a5_scenario_timing() {
    let mut bus: SimBus<Idle> = SimBus::new(engine(), Idle).with_probe();
    let started = start(&mut bus, MODE_0, 0xA5);

    assert_eq!(bus.run_until_done(200), Some(85));
    let done_at = bus.cycles();
    assert_eq!(done_at - started, 85);

    let edges = bus.probe().unwrap().edges();
    let first = edges.iter().find(|e| e.tick > started).unwrap();
    assert_eq!(first.tick - started, 5);
    assert_eq!(first.level, Level::High);
    assert_eq!(done_at - first.tick, 80);

    let mosi: Vec<u8> = bus
        .probe()
        .unwrap()
        .rising()
        .map(|e| e.mosi.is_high() as u8)
        .collect();
    assert_eq!(mosi, [1, 0, 1, 0, 0, 1, 0, 1]);

    // half-period spacing between consecutive edges
    for pair in edges.windows(2) {
        assert_eq!(pair[1].tick - pair[0].tick, 5);
    }
}

#[test]
fn slaves_on_every_lane_see_the_byte() {
    for mode in [MODE_0, MODE_1, MODE_2, MODE_3] {
        let replies = [0x96, 0x01, 0x80, 0xFF, 0x00, 0x5A, 0xC3, 0x7E];
        let bus: SimBus<Lanes> = SimBus::new(engine(), Lanes::new(mode, replies));
        let mut array = SpiArray::new(bus, driver::Config::default().with_mode(mode));

        array.set_chip_selects(0x00);
        let rx = array.blocking_transfer(0x3C).unwrap();
        array.deselect_all();

        let bus = array.release();
        assert_eq!(bus.peer().received(), [0x3C; LANES], "{mode:?}");
        // captures run one bit ahead of a standard slave
        for lane in 0..LANES {
            assert_eq!(rx[lane], replies[lane] << 1, "{mode:?} lane {lane}");
        }
    }
}

#[test]
fn unselected_lanes_stay_quiet() {
    let bus: SimBus<Lanes> = SimBus::new(engine(), Lanes::new(MODE_0, [0xFF; LANES]));
    let mut array = SpiArray::new(bus, driver::Config::default());

    array.select(4).unwrap();
    let rx = array.blocking_transfer(0x81).unwrap();
    array.deselect(4).unwrap();

    let received = array.bus().peer().received();
    for lane in 0..LANES {
        if lane == 4 {
            assert_eq!(received[lane], 0x81);
            assert_eq!(rx[lane], 0xFE);
        } else {
            assert_eq!(received[lane], 0);
            assert_eq!(rx[lane], 0);
        }
    }
}

#[test]
fn constant_lanes_per_phase() {
    for (mode, high) in [(MODE_0, 0xFF), (MODE_2, 0xFF), (MODE_1, 0xFE), (MODE_3, 0xFE)] {
        let mut bus: SimBus<Levels> = SimBus::new(engine(), Levels(0b0110_0001));
        start(&mut bus, mode, 0);
        bus.run_until_done(200).unwrap();
        let rx = bus.engine().rx_data();
        assert_eq!(rx, [high, 0, 0, 0, 0, high, high, 0], "{mode:?}");
    }
}

#[test]
fn back_to_back_starts_run_one_transaction() {
    let mut single: SimBus<Levels> = SimBus::new(engine(), Levels(0xFF)).with_probe();
    single.write(offset::TX_DATA, 0x5A);
    single.write(offset::START, 1);
    single.write(offset::CSN, 0xFF);
    single.run(120);

    let mut double: SimBus<Levels> = SimBus::new(engine(), Levels(0xFF)).with_probe();
    double.write(offset::TX_DATA, 0x5A);
    double.write(offset::START, 1);
    double.write(offset::START, 1);
    double.run(120);

    assert_eq!(single.probe().unwrap().edges(), double.probe().unwrap().edges());
    assert_eq!(single.engine().rx_data(), double.engine().rx_data());
    assert_eq!(single.engine().dropped_starts(), 0);
    assert_eq!(double.read(offset::DROPPED_STARTS), 1);
    assert_eq!(double.probe().unwrap().edges().len(), 16);
}

#[test]
fn start_while_busy_leaves_the_trace_untouched() {
    let mut quiet: SimBus<Idle> = SimBus::new(engine(), Idle).with_probe();
    let mut noisy: SimBus<Idle> = SimBus::new(engine(), Idle).with_probe();
    for bus in [&mut quiet, &mut noisy] {
        start(bus, MODE_1, 0xC7);
        bus.run(30);
    }
    quiet.write(offset::TX_DATA, 0x00);
    quiet.run(2);
    noisy.write(offset::TX_DATA, 0x00);
    noisy.write(offset::START, 1);
    noisy.tick();

    quiet.run_until_done(200).unwrap();
    noisy.run_until_done(200).unwrap();
    assert_eq!(quiet.cycles(), noisy.cycles());
    assert_eq!(quiet.probe().unwrap().edges(), noisy.probe().unwrap().edges());
    assert_eq!(noisy.engine().dropped_starts(), 1);
}

#[test]
fn irq_pulses_once_per_transaction() {
    for (enabled, polarity) in [
        (true, IrqPolarity::ActiveHigh),
        (true, IrqPolarity::ActiveLow),
        (false, IrqPolarity::ActiveHigh),
        (false, IrqPolarity::ActiveLow),
    ] {
        let irq = IrqConfig { enabled, polarity };
        let mut spi = engine();
        let mut config = spi_array_hal::regs::ConfigReg::default();
        irq.apply(&mut config);
        spi.write(spi_array_hal::regs::Reg::Config, config.bits());

        let mut active = Vec::new();
        for round in 0..2 {
            spi.write(spi_array_hal::regs::Reg::Start, 1);
            for tick in 0..100u32 {
                let out = spi.tick(&Inputs::default());
                if out.irq == polarity.active_level() {
                    active.push((round, tick));
                }
                if out.irq != polarity.active_level() {
                    assert_eq!(out.irq, polarity.inactive_level());
                }
            }
        }

        if enabled {
            assert_eq!(active, [(0, 85), (1, 85)], "{irq:?}");
        } else {
            assert!(active.is_empty(), "{irq:?}");
        }
    }
}
