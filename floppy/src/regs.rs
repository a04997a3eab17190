//! Register addresses and bit layouts for the floppy hardware
//!
//! The WD1772 registers are not directly addressable on the ST. Every access
//! goes through the single `FDC_ACCESS` word, and the DMA mode register decides
//! which controller register (or the DMA sector counter) that word reaches.

/// Memory mapped register addresses
pub mod addr {
    /// FDC register window. Which register is reached depends on the DMA mode
    pub const FDC_ACCESS: usize = 0xFFFF_8604;
    /// Writes go to the DMA mode register, reads return the DMA status
    pub const DMA_CONTROL: usize = 0xFFFF_8606;
    pub const DMA_BASE_HIGH: usize = 0xFFFF_8609;
    pub const DMA_BASE_MID: usize = 0xFFFF_860B;
    pub const DMA_BASE_LOW: usize = 0xFFFF_860D;
    /// Writes select a sound chip register, reads return its contents
    pub const PSG_SELECT: usize = 0xFFFF_8800;
    pub const PSG_WRITE: usize = 0xFFFF_8802;
}

bitflags::bitflags! {
    /// DMA mode register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaMode: u16 {
        /// Drives the FDC A0 line
        const A0 = 1 << 1;
        /// Drives the FDC A1 line
        const A1 = 1 << 2;
        /// Routes accesses to the hard disk controller instead of the FDC
        const HDC_SELECT = 1 << 3;
        /// Routes accesses to the DMA internal sector counter
        const SECTOR_COUNT = 1 << 4;
        /// Connects the DMA channel to the floppy controller
        const FLOPPY = 1 << 7;
        /// Transfer direction, set when data moves from memory to the controller
        const WRITE = 1 << 8;
    }
}

/// The controller registers reachable through the `FDC_ACCESS` window, encoded
/// as the A0/A1 bits of the DMA mode register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FdcRegister {
    /// Command on write, status on read
    Command = 0x0,
    Track = 0x2,
    Sector = 0x4,
    Data = 0x6,
}

impl FdcRegister {
    pub const fn mode_bits(self) -> DmaMode {
        DmaMode::from_bits_retain(self as u16)
    }

    pub fn from_mode(mode: DmaMode) -> Self {
        match mode.intersection(DmaMode::A0 | DmaMode::A1).bits() {
            0x0 => Self::Command,
            0x2 => Self::Track,
            0x4 => Self::Sector,
            _ => Self::Data,
        }
    }
}

bitflags::bitflags! {
    /// DMA status register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DmaStatus: u16 {
        /// Clear if the last transfer failed
        const NO_ERROR = 1 << 0;
        /// Set while the sector counter has not drained to zero
        const SECTOR_COUNT_NONZERO = 1 << 1;
        /// State of the FDC DRQ line
        const DATA_REQUEST = 1 << 2;
    }
}

/// One byte of the 24 bit DMA base address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaAddressByte {
    High,
    Mid,
    Low,
}

impl DmaAddressByte {
    pub const fn address(self) -> usize {
        match self {
            Self::High => addr::DMA_BASE_HIGH,
            Self::Mid => addr::DMA_BASE_MID,
            Self::Low => addr::DMA_BASE_LOW,
        }
    }
}

/// YM2149 sound chip registers
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PsgRegister {
    ChannelAFreqLow = 0,
    ChannelAFreqHigh,
    ChannelBFreqLow,
    ChannelBFreqHigh,
    ChannelCFreqLow,
    ChannelCFreqHigh,
    NoiseFreq,
    MixerControl,
    ChannelAAmplitude,
    ChannelBAmplitude,
    ChannelCAmplitude,
    EnvelopePeriodHigh,
    EnvelopePeriodLow,
    EnvelopeShape,
    PortA,
    PortB,
}

bitflags::bitflags! {
    /// Sound chip I/O port A. The floppy lines share this port with the
    /// printer and the speaker.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PortA: u8 {
        /// Set selects side 0, clear selects side 1
        const SIDE_0_SELECT = 1 << 0;
        const DRIVE_A_DISABLE = 1 << 1;
        const DRIVE_B_DISABLE = 1 << 2;
        const PRINTER_SELECT_IN = 1 << 3;
        const DSP_RESET = 1 << 4;
        const CENTRONICS_STROBE = 1 << 5;
        const SPEAKER_DISABLE = 1 << 6;
        const IDE_RESET = 1 << 7;
    }
}

bitflags::bitflags! {
    /// Sound chip mixer control. Tone and noise bits disable their channel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MixerControl: u8 {
        const CHANNEL_A_TONE = 1 << 0;
        const CHANNEL_B_TONE = 1 << 1;
        const CHANNEL_C_TONE = 1 << 2;
        const CHANNEL_A_NOISE = 1 << 3;
        const CHANNEL_B_NOISE = 1 << 4;
        const CHANNEL_C_NOISE = 1 << 5;
        /// Port A drives its pins
        const PORT_A_OUTPUT = 1 << 6;
        const PORT_B_OUTPUT = 1 << 7;
    }
}
