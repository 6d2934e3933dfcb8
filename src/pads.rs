//! Pads
//!
//! Optional binding of the array master's pins to `embedded-hal` digital
//! pins. Every pin is optional: absent pins are neither driven nor sampled,
//! absent MISO lanes read low.
//!
//! Boards that fan SCK and MOSI out to one copy per lane bind those copies
//! with [`Pads::with_lane_clock`]. They carry the same levels as the shared
//! pins.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::spi::{Error, Inputs, Outputs};
use crate::LANES;

#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    #[inline]
    pub const fn is_high(&self) -> bool {
        matches!(self, Level::High)
    }

    #[inline]
    pub const fn is_low(&self) -> bool {
        matches!(self, Level::Low)
    }
}

impl From<bool> for Level {
    fn from(val: bool) -> Self {
        match val {
            true => Self::High,
            false => Self::Low,
        }
    }
}

impl From<u8> for Level {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Low,
            _ => Self::High,
        }
    }
}

impl From<Level> for bool {
    fn from(level: Level) -> bool {
        match level {
            Level::Low => false,
            Level::High => true,
        }
    }
}

impl core::ops::Not for Level {
    type Output = Level;

    fn not(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Pin group of one SPI array master.
pub struct Pads<SCK, MOSI, MISO, CSN, IRQ> {
    pub sck: Option<SCK>,
    pub mosi: Option<MOSI>,
    /// Per-lane SCK copies.
    pub lane_sck: [Option<SCK>; LANES],
    /// Per-lane MOSI copies.
    pub lane_mosi: [Option<MOSI>; LANES],
    pub miso: [Option<MISO>; LANES],
    pub csn: [Option<CSN>; LANES],
    pub irq: Option<IRQ>,
}

impl<SCK, MOSI, MISO, CSN, IRQ> Pads<SCK, MOSI, MISO, CSN, IRQ>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CSN: OutputPin,
    IRQ: OutputPin,
{
    /// No pins bound.
    pub fn new() -> Self {
        Self {
            sck: None,
            mosi: None,
            lane_sck: core::array::from_fn(|_| None),
            lane_mosi: core::array::from_fn(|_| None),
            miso: core::array::from_fn(|_| None),
            csn: core::array::from_fn(|_| None),
            irq: None,
        }
    }

    pub fn with_sck(mut self, pin: SCK) -> Self {
        self.sck = Some(pin);
        self
    }

    pub fn with_mosi(mut self, pin: MOSI) -> Self {
        self.mosi = Some(pin);
        self
    }

    pub fn with_irq(mut self, pin: IRQ) -> Self {
        self.irq = Some(pin);
        self
    }

    /// Bind the MISO and CS-n pins of one lane. Out of range lanes are
    /// rejected.
    pub fn with_lane(mut self, lane: usize, miso: Option<MISO>, csn: Option<CSN>) -> Result<Self, Error> {
        if lane >= LANES {
            return Err(Error::InvalidLane(lane));
        }
        self.miso[lane] = miso;
        self.csn[lane] = csn;
        Ok(self)
    }

    /// Bind the SCK and MOSI copies routed to one lane.
    pub fn with_lane_clock(mut self, lane: usize, sck: Option<SCK>, mosi: Option<MOSI>) -> Result<Self, Error> {
        if lane >= LANES {
            return Err(Error::InvalidLane(lane));
        }
        self.lane_sck[lane] = sck;
        self.lane_mosi[lane] = mosi;
        Ok(self)
    }

    /// Read the MISO lanes for the coming tick.
    pub fn sample(&mut self) -> Result<Inputs, Error> {
        let mut inputs = Inputs::default();
        for (lane, pin) in self.miso.iter_mut().enumerate() {
            if let Some(pin) = pin {
                let high = pin.is_high().map_err(|_| Error::Pad)?;
                inputs.miso[lane] = high.into();
            }
        }
        Ok(inputs)
    }

    /// Drive every bound output from the engine's pin state.
    pub fn drive(&mut self, out: &Outputs) -> Result<(), Error> {
        if let Some(pin) = self.sck.as_mut() {
            set_level(pin, out.sck)?;
        }
        if let Some(pin) = self.mosi.as_mut() {
            set_level(pin, out.mosi)?;
        }
        for pin in self.lane_sck.iter_mut().flatten() {
            set_level(pin, out.sck)?;
        }
        for pin in self.lane_mosi.iter_mut().flatten() {
            set_level(pin, out.mosi)?;
        }
        for (lane, pin) in self.csn.iter_mut().enumerate() {
            if let Some(pin) = pin {
                set_level(pin, out.csn(lane))?;
            }
        }
        if let Some(pin) = self.irq.as_mut() {
            set_level(pin, out.irq)?;
        }
        Ok(())
    }
}

impl<SCK, MOSI, MISO, CSN, IRQ> Default for Pads<SCK, MOSI, MISO, CSN, IRQ>
where
    SCK: OutputPin,
    MOSI: OutputPin,
    MISO: InputPin,
    CSN: OutputPin,
    IRQ: OutputPin,
{
    fn default() -> Self {
        Self::new()
    }
}

fn set_level<P: OutputPin>(pin: &mut P, level: Level) -> Result<(), Error> {
    match level {
        Level::Low => pin.set_low(),
        Level::High => pin.set_high(),
    }
    .map_err(|_| Error::Pad)
}

#[cfg(test)]
pub(crate) mod testing {
    use core::cell::Cell;
    use core::convert::Infallible;

    /// Pin backed by a shared cell, usable as input and output.
    #[derive(Clone, Copy)]
    pub struct CellPin<'a>(pub &'a Cell<bool>);

    impl embedded_hal::digital::ErrorType for CellPin<'_> {
        type Error = Infallible;
    }

    impl embedded_hal::digital::OutputPin for CellPin<'_> {
        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.set(true);
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.set(false);
            Ok(())
        }
    }

    impl embedded_hal::digital::InputPin for CellPin<'_> {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.0.get())
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.0.get())
        }
    }
}
