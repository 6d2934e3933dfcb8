//! IRQ line presentation
//!
//! The engine produces a one-tick completion pulse. `IE` gates it and `IPOL`
//! picks the level the pin shows while it is asserted.

use core::cell::Cell;

use critical_section::Mutex;

use crate::pads::Level;
use crate::regs::ConfigReg;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IrqPolarity {
    /// IPOL = 0, the pin idles high and pulses low
    #[default]
    ActiveLow,
    /// IPOL = 1
    ActiveHigh,
}

impl IrqPolarity {
    pub const fn active_level(&self) -> Level {
        match self {
            IrqPolarity::ActiveLow => Level::Low,
            IrqPolarity::ActiveHigh => Level::High,
        }
    }

    pub const fn inactive_level(&self) -> Level {
        match self {
            IrqPolarity::ActiveLow => Level::High,
            IrqPolarity::ActiveHigh => Level::Low,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqConfig {
    pub enabled: bool,
    pub polarity: IrqPolarity,
}

impl IrqConfig {
    pub const DISABLED: Self = Self {
        enabled: false,
        polarity: IrqPolarity::ActiveLow,
    };

    pub const fn enabled(polarity: IrqPolarity) -> Self {
        Self {
            enabled: true,
            polarity,
        }
    }

    pub fn from_config(cfg: ConfigReg) -> Self {
        Self {
            enabled: cfg.ie(),
            polarity: if cfg.ipol() {
                IrqPolarity::ActiveHigh
            } else {
                IrqPolarity::ActiveLow
            },
        }
    }

    /// Write the `IE`/`IPOL` bits, leaving the clock bits alone.
    pub fn apply(&self, cfg: &mut ConfigReg) {
        cfg.set_ie(self.enabled);
        cfg.set_ipol(self.polarity == IrqPolarity::ActiveHigh);
    }

    /// Level of the irq pin for a given completion pulse.
    ///
    /// With the interrupt disabled the line is parked at the inactive level.
    pub const fn pin_level(&self, pulse: bool) -> Level {
        if self.enabled && pulse {
            self.polarity.active_level()
        } else {
            self.polarity.inactive_level()
        }
    }
}

/// Interrupt counter shared between an interrupt handler and thread code.
pub struct IrqLatch {
    count: Mutex<Cell<u32>>,
}

impl IrqLatch {
    pub const fn new() -> Self {
        Self {
            count: Mutex::new(Cell::new(0)),
        }
    }

    /// Record one assertion, called from the interrupt context.
    pub fn on_interrupt(&self) {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);
            count.set(count.get().saturating_add(1));
        });
    }

    pub fn pending(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }

    /// Return the number of assertions seen since the last call and clear it.
    pub fn take(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).replace(0))
    }
}

impl Default for IrqLatch {
    fn default() -> Self {
        Self::new()
    }
}
