//! Edge detector
//!
//! Turns a slowly toggling signal (the SPI array's internal serial clock)
//! into single-tick rising/falling events usable by logic running on the
//! system clock.

/// Rising and falling events reported by an [`EdgeDetector`] for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Edges {
    pub rising: bool,
    pub falling: bool,
}

impl Edges {
    #[inline]
    pub const fn none() -> Self {
        Self {
            rising: false,
            falling: false,
        }
    }

    #[inline]
    pub const fn any(&self) -> bool {
        self.rising || self.falling
    }
}

/// Two-stage shift-register edge detector.
///
/// Bit 1 of the history holds the sample from two ticks ago, bit 0 the
/// previous one. Both outputs are pure functions of the history, so an edge
/// is reported on the tick after the transition was registered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EdgeDetector {
    history: u8,
}

impl EdgeDetector {
    pub const fn new() -> Self {
        Self { history: 0 }
    }

    /// Shift in the level seen this tick.
    #[inline]
    pub fn sample(&mut self, level: bool) {
        self.history = ((self.history << 1) | level as u8) & 0b11;
    }

    /// Hold the detector in reset for this tick.
    #[inline]
    pub fn reset(&mut self) {
        self.history = 0;
    }

    /// Either [`sample`](Self::sample) or [`reset`](Self::reset), mirroring a
    /// register with a synchronous reset input.
    #[inline]
    pub fn clock(&mut self, level: bool, reset: bool) {
        if reset {
            self.reset();
        } else {
            self.sample(level);
        }
    }

    #[inline]
    pub const fn rising(&self) -> bool {
        self.history == 0b01
    }

    #[inline]
    pub const fn falling(&self) -> bool {
        self.history == 0b10
    }

    #[inline]
    pub const fn edges(&self) -> Edges {
        Edges {
            rising: self.rising(),
            falling: self.falling(),
        }
    }

    #[inline]
    pub const fn history(&self) -> u8 {
        self.history
    }
}
