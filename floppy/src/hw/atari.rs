//! Memory mapped floppy registers of the Atari ST

use static_cell::StaticCell;
use volatile::Volatile;

use crate::{
    completion::CompletionLatch,
    dma,
    regs::{DmaAddressByte, DmaMode, DmaStatus, PsgRegister, addr},
    status::DiskError,
};

use super::FloppyHardware;

/// Receives the controller status from [`handle_floppy_interrupt`]
pub static FDC_INTERRUPT: CompletionLatch = CompletionLatch::new();

pub struct AtariHardware {
    fdc_access: &'static mut Volatile<u16>,
    dma_control: &'static mut Volatile<u16>,
    dma_base_high: &'static mut Volatile<u8>,
    dma_base_mid: &'static mut Volatile<u8>,
    dma_base_low: &'static mut Volatile<u8>,
    psg_select: &'static mut Volatile<u8>,
    psg_write: &'static mut Volatile<u8>,
}

impl AtariHardware {
    /// Hands out the register block. Returns `None` once it has been taken.
    pub fn take() -> Option<&'static mut Self> {
        static HARDWARE: StaticCell<AtariHardware> = StaticCell::new();

        let slot = HARDWARE.try_uninit()?;

        // SAFETY: the cell hands out its slot once, so the registers are
        // mapped at most once
        Some(slot.write(unsafe { Self::map() }))
    }

    /// # Safety
    ///
    /// Must run on an ST, and the result must be the only handle to these
    /// registers.
    unsafe fn map() -> Self {
        unsafe {
            Self {
                fdc_access: &mut *(addr::FDC_ACCESS as *mut Volatile<u16>),
                dma_control: &mut *(addr::DMA_CONTROL as *mut Volatile<u16>),
                dma_base_high: &mut *(addr::DMA_BASE_HIGH as *mut Volatile<u8>),
                dma_base_mid: &mut *(addr::DMA_BASE_MID as *mut Volatile<u8>),
                dma_base_low: &mut *(addr::DMA_BASE_LOW as *mut Volatile<u8>),
                psg_select: &mut *(addr::PSG_SELECT as *mut Volatile<u8>),
                psg_write: &mut *(addr::PSG_WRITE as *mut Volatile<u8>),
            }
        }
    }
}

impl FloppyHardware for AtariHardware {
    fn write_dma_mode(&mut self, mode: DmaMode) {
        self.dma_control.write(mode.bits());
    }

    fn read_dma_status(&mut self) -> DmaStatus {
        DmaStatus::from_bits_truncate(self.dma_control.read())
    }

    fn write_fdc(&mut self, value: u16) {
        self.fdc_access.write(value);
    }

    fn read_fdc(&mut self) -> u16 {
        self.fdc_access.read()
    }

    fn write_dma_base(&mut self, byte: DmaAddressByte, value: u8) {
        match byte {
            DmaAddressByte::High => self.dma_base_high.write(value),
            DmaAddressByte::Mid => self.dma_base_mid.write(value),
            DmaAddressByte::Low => self.dma_base_low.write(value),
        }
    }

    fn select_psg_register(&mut self, register: PsgRegister) {
        self.psg_select.write(register as u8);
    }

    fn read_psg(&mut self) -> u8 {
        self.psg_select.read()
    }

    fn write_psg(&mut self, value: u8) {
        self.psg_write.write(value);
    }

    /// The ST has no MMU in the way, so the bus address is the pointer itself
    fn dma_address(&mut self, buffer: *mut u8) -> Result<u32, DiskError> {
        let address = buffer as usize;
        u32::try_from(address)
            .map_err(|_| DiskError::BufferUnreachable(address))
            .and_then(dma::check_address)
    }
}

/// Floppy interrupt entry, wired to the MFP GPIP5 vector by the kernel. The
/// driver keeps the window on the command register while a command runs, so
/// the single read here returns the final status and acknowledges the
/// interrupt.
pub extern "C" fn handle_floppy_interrupt() {
    // SAFETY: reading the window has no side effect besides the acknowledge
    let status = unsafe { (*(addr::FDC_ACCESS as *const Volatile<u16>)).read() };
    FDC_INTERRUPT.post((status & 0xFF) as u8);
}
