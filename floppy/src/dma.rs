//! DMA chip programming
//!
//! The DMA mode register does double duty: it sets the transfer direction and
//! decides which controller register the `FDC_ACCESS` window reaches. Every
//! register access therefore starts with a mode write.

use crate::{
    hw::FloppyHardware,
    regs::{DmaAddressByte, DmaMode, FdcRegister},
    status::DiskError,
};

/// Sectors moved by one transfer
pub const SECTOR_COUNT: u16 = 1;

/// Highest address the 24 bit base registers can hold
pub const MAX_ADDRESS: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaDirection {
    /// Disk to memory (read)
    FromController,
    /// Memory to disk (write)
    ToController,
}

impl DmaDirection {
    pub const fn mode_bits(self) -> DmaMode {
        match self {
            Self::FromController => DmaMode::FLOPPY,
            Self::ToController => DmaMode::FLOPPY.union(DmaMode::WRITE),
        }
    }

    const fn reversed(self) -> Self {
        match self {
            Self::FromController => Self::ToController,
            Self::ToController => Self::FromController,
        }
    }
}

/// Points the `FDC_ACCESS` window at `register`
pub fn select_register<H: FloppyHardware + ?Sized>(
    hw: &mut H,
    direction: DmaDirection,
    register: FdcRegister,
) {
    hw.write_dma_mode(direction.mode_bits() | register.mode_bits());
}

/// Checks the DMA engine can reach `address`: it must fit in 24 bits and be
/// word aligned
pub fn check_address(address: u32) -> Result<u32, DiskError> {
    if address > MAX_ADDRESS || address & 1 != 0 {
        Err(DiskError::BufferUnreachable(address as usize))
    } else {
        Ok(address)
    }
}

/// Loads the DMA base address, high byte first. The low byte write latches the
/// address, so the order matters.
pub fn set_buffer_address<H: FloppyHardware + ?Sized>(
    hw: &mut H,
    address: u32,
) -> Result<(), DiskError> {
    let [_, high, mid, low] = check_address(address)?.to_be_bytes();
    hw.write_dma_base(DmaAddressByte::High, high);
    hw.write_dma_base(DmaAddressByte::Mid, mid);
    hw.write_dma_base(DmaAddressByte::Low, low);

    Ok(())
}

pub fn set_sector_count<H: FloppyHardware + ?Sized>(
    hw: &mut H,
    direction: DmaDirection,
    count: u16,
) {
    hw.write_dma_mode(direction.mode_bits() | DmaMode::SECTOR_COUNT);
    hw.write_fdc(count);
}

/// Prepares the DMA chip for a transfer in `direction`. Toggling the direction
/// bit clears the internal FIFO and the error state of the previous transfer.
pub fn arm_transfer<H: FloppyHardware + ?Sized>(hw: &mut H, direction: DmaDirection) {
    hw.write_dma_mode(direction.reversed().mode_bits());
    hw.write_dma_mode(direction.mode_bits());
    set_sector_count(hw, direction, SECTOR_COUNT);
}
