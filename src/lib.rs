//! Software model and driver of a LiteX-style SPI array master.
//!
//! The peripheral drives one serial clock and one MOSI line shared by eight
//! lanes, each with its own MISO input and active-low chip select.
#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod clock;
pub mod driver;
pub mod edge;
pub mod interrupt;
pub mod pads;
pub mod regs;
pub mod sim;
pub mod spi;

/// Number of MISO / chip-select lanes.
pub const LANES: usize = 8;

pub use clock::ConfigError;
pub use driver::{Bus, SpiArray};
pub use pads::Level;
pub use spi::{Error, Inputs, Outputs, SpiArrayMaster};
