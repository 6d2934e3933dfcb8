//! CSR map of the SPI array master
//!
//! One 32-bit bus word per CSR, in declaration order, as laid out by LiteX
//! with a 32-bit CSR data width.

use bitfield::bitfield;

use crate::LANES;

/// Bytes between consecutive CSRs.
pub const CSR_STRIDE: u32 = 4;

bitfield! {
    /// `config` CSR, `{IE, IPOL, CPHA, CPOL}` from bit 3 down to bit 0.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct ConfigReg(u32);
    impl Debug;
    u32;
    /// Clock polarity, SCK idles high when set
    pub cpol, set_cpol : 0;
    /// Clock phase, selects the capture edge
    pub cpha, set_cpha : 1;
    /// IRQ pin polarity, active high when set
    pub ipol, set_ipol : 2;
    /// Interrupt enable
    pub ie, set_ie : 3;
}

impl ConfigReg {
    pub const MASK: u32 = 0b1111;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::MASK)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }
}

/// Register address offsets
pub mod offset {
    use super::CSR_STRIDE;

    pub const CONFIG: u32 = 0;
    pub const TX_DATA: u32 = CSR_STRIDE;
    pub const DONE: u32 = 2 * CSR_STRIDE;
    pub const START: u32 = 3 * CSR_STRIDE;
    pub const CSN: u32 = 4 * CSR_STRIDE;
    pub const RX_DATA_0: u32 = 5 * CSR_STRIDE;
    pub const DROPPED_STARTS: u32 = RX_DATA_0 + crate::LANES as u32 * CSR_STRIDE;

    pub const fn rx_data(lane: usize) -> u32 {
        RX_DATA_0 + lane as u32 * CSR_STRIDE
    }
}

/// Reset value of `csn`: every chip select deasserted.
pub const CSN_RESET: u32 = 0xFF;
/// Reset value of `done`.
pub const DONE_RESET: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Access {
    ReadWrite,
    ReadOnly,
    /// Write strobe, reads as zero
    Strobe,
}

/// A CSR of the array master.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    Config,
    TxData,
    Done,
    Start,
    Csn,
    RxData(u8),
    DroppedStarts,
}

impl Reg {
    /// Decode a byte offset into the CSR block.
    pub fn from_offset(addr: u32) -> Option<Self> {
        if addr % CSR_STRIDE != 0 {
            return None;
        }
        match addr {
            offset::CONFIG => Some(Reg::Config),
            offset::TX_DATA => Some(Reg::TxData),
            offset::DONE => Some(Reg::Done),
            offset::START => Some(Reg::Start),
            offset::CSN => Some(Reg::Csn),
            offset::DROPPED_STARTS => Some(Reg::DroppedStarts),
            o if o >= offset::RX_DATA_0 && o < offset::DROPPED_STARTS => {
                Some(Reg::RxData(((o - offset::RX_DATA_0) / CSR_STRIDE) as u8))
            }
            _ => None,
        }
    }

    pub const fn offset(&self) -> u32 {
        match *self {
            Reg::Config => offset::CONFIG,
            Reg::TxData => offset::TX_DATA,
            Reg::Done => offset::DONE,
            Reg::Start => offset::START,
            Reg::Csn => offset::CSN,
            Reg::RxData(lane) => offset::rx_data(lane as usize),
            Reg::DroppedStarts => offset::DROPPED_STARTS,
        }
    }

    /// Implemented bits of the CSR.
    pub const fn mask(&self) -> u32 {
        match *self {
            Reg::Config => ConfigReg::MASK,
            Reg::TxData | Reg::Csn | Reg::RxData(_) => 0xFF,
            Reg::Done | Reg::Start => 0b1,
            Reg::DroppedStarts => u32::MAX,
        }
    }

    pub const fn access(&self) -> Access {
        match *self {
            Reg::Config | Reg::TxData | Reg::Csn => Access::ReadWrite,
            Reg::Done | Reg::RxData(_) | Reg::DroppedStarts => Access::ReadOnly,
            Reg::Start => Access::Strobe,
        }
    }

    /// Every CSR in address order.
    pub fn all() -> impl Iterator<Item = Reg> {
        [Reg::Config, Reg::TxData, Reg::Done, Reg::Start, Reg::Csn]
            .into_iter()
            .chain((0..LANES as u8).map(Reg::RxData))
            .chain(core::iter::once(Reg::DroppedStarts))
    }
}
