//! Access to the floppy hardware registers
//!
//! [`FloppyHardware`] is the narrow set of port operations the driver needs.
//! [`atari::AtariHardware`] performs them on the real memory mapped registers
//! and [`sim::SimulatedController`] models the controller, the DMA chip and two
//! disks in memory.

use crate::{
    regs::{DmaAddressByte, DmaMode, DmaStatus, PsgRegister},
    status::DiskError,
};

pub mod atari;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub trait FloppyHardware {
    /// Writes the DMA mode register
    fn write_dma_mode(&mut self, mode: DmaMode);

    fn read_dma_status(&mut self) -> DmaStatus;

    /// Writes through the FDC register window to whatever register the DMA
    /// mode currently selects
    fn write_fdc(&mut self, value: u16);

    /// Reads through the FDC register window. With the command register
    /// selected this returns the controller status.
    fn read_fdc(&mut self) -> u16;

    fn write_dma_base(&mut self, byte: DmaAddressByte, value: u8);

    fn select_psg_register(&mut self, register: PsgRegister);

    fn read_psg(&mut self) -> u8;

    fn write_psg(&mut self, value: u8);

    /// Returns the address the DMA engine uses to reach `buffer`. The buffer
    /// must stay valid until the transfer using it completes.
    fn dma_address(&mut self, buffer: *mut u8) -> Result<u32, DiskError>;

    /// Called once per cycle while waiting on a completion latch
    fn idle(&mut self) {}
}

impl<H: FloppyHardware + ?Sized> FloppyHardware for &mut H {
    fn write_dma_mode(&mut self, mode: DmaMode) {
        (**self).write_dma_mode(mode)
    }

    fn read_dma_status(&mut self) -> DmaStatus {
        (**self).read_dma_status()
    }

    fn write_fdc(&mut self, value: u16) {
        (**self).write_fdc(value)
    }

    fn read_fdc(&mut self) -> u16 {
        (**self).read_fdc()
    }

    fn write_dma_base(&mut self, byte: DmaAddressByte, value: u8) {
        (**self).write_dma_base(byte, value)
    }

    fn select_psg_register(&mut self, register: PsgRegister) {
        (**self).select_psg_register(register)
    }

    fn read_psg(&mut self) -> u8 {
        (**self).read_psg()
    }

    fn write_psg(&mut self, value: u8) {
        (**self).write_psg(value)
    }

    fn dma_address(&mut self, buffer: *mut u8) -> Result<u32, DiskError> {
        (**self).dma_address(buffer)
    }

    fn idle(&mut self) {
        (**self).idle()
    }
}
