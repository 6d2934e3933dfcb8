//! Serial clock generation
//!
//! The array master derives its serial clock from the system clock with a
//! fixed prescaler. Both frequencies are construction-time parameters.

use fugit::HertzU32 as Hertz;

/// Default system clock of the reference SoC.
pub const DEFAULT_SYS_CLK: Hertz = Hertz::from_raw(50_000_000);

/// Default serial clock.
pub const DEFAULT_BAUDRATE: Hertz = Hertz::from_raw(1_000_000);

/// Smallest usable number of system ticks per serial-clock half-period.
///
/// The edge detector reports an edge two ticks after the toggle; the last
/// falling edge has to be consumed before the transaction completes one
/// half-period later.
pub const MIN_DIVISOR: u32 = 3;

/// Serial-clock toggles per transaction, 8 bits of full periods.
pub const EDGES_PER_TRANSFER: u8 = 16;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    BaudrateTooLow,
    BaudrateTooHigh,
}

/// Free-running divider producing one wrap per serial-clock half-period.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Prescaler {
    sys_clk: Hertz,
    divisor: u32,
    count: u32,
}

impl Prescaler {
    pub fn new(sys_clk: Hertz, baudrate: Hertz) -> Result<Self, ConfigError> {
        let baud = baudrate.to_Hz();
        if baud == 0 {
            error!("spi array: zero baudrate");
            return Err(ConfigError::BaudrateTooLow);
        }

        // floor(freq / (2 * baud)), without overflowing for baud > 2^31
        let divisor = (sys_clk.to_Hz() as u64 / (2 * baud as u64)) as u32;
        if divisor < MIN_DIVISOR {
            error!("spi array: divisor {=u32} below {=u32}", divisor, MIN_DIVISOR);
            return Err(ConfigError::BaudrateTooHigh);
        }

        Ok(Self {
            sys_clk,
            divisor,
            count: 0,
        })
    }

    /// System ticks per serial-clock half-period.
    #[inline]
    pub const fn divisor(&self) -> u32 {
        self.divisor
    }

    /// Counter value at which the prescaler wraps.
    #[inline]
    pub const fn threshold(&self) -> u32 {
        self.divisor - 1
    }

    #[inline]
    pub const fn count(&self) -> u32 {
        self.count
    }

    pub fn sys_clk(&self) -> Hertz {
        self.sys_clk
    }

    /// Serial clock actually produced, after rounding the divisor down.
    pub fn actual_baudrate(&self) -> Hertz {
        Hertz::from_raw(self.sys_clk.to_Hz() / (2 * self.divisor))
    }

    /// Ticks from an accepted start to the tick that sets `done`.
    ///
    /// Sixteen toggles plus the closing half-period.
    pub const fn transaction_ticks(&self) -> u64 {
        (EDGES_PER_TRANSFER as u64 + 1) * self.divisor as u64
    }

    #[inline]
    pub fn restart(&mut self) {
        self.count = 0;
    }

    /// Advance one tick, returning `true` on the tick the counter wraps.
    #[inline]
    pub fn step(&mut self) -> bool {
        if self.count == self.threshold() {
            self.count = 0;
            true
        } else {
            self.count += 1;
            false
        }
    }
}

/// System-clock ticks covering `ns` nanoseconds, rounded up.
pub fn cycles_for_ns(sys_clk: Hertz, ns: u32) -> u32 {
    let cycles = (ns as u64 * sys_clk.to_Hz() as u64 + 999_999_999) / 1_000_000_000;
    cycles.min(u32::MAX as u64) as u32
}
