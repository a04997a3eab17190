//! WD1772 command bytes and the register primitives used to issue them

use crate::{
    dma::{self, DmaDirection},
    hw::FloppyHardware,
    regs::FdcRegister,
};

bitflags::bitflags! {
    /// Option bits of restore, seek and step commands
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PositionFlags: u8 {
        /// Step commands only: keep the track register in sync with the head
        const UPDATE_TRACK = 1 << 4;
        /// Skip the motor spin-up sequence
        const DISABLE_SPIN_UP = 1 << 3;
        /// Read a sector ID on the destination track to verify the position
        const VERIFY = 1 << 2;
    }
}

bitflags::bitflags! {
    /// Option bits of sector and track transfer commands
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransferFlags: u8 {
        const MULTIPLE_SECTOR = 1 << 4;
        const DISABLE_SPIN_UP = 1 << 3;
        /// Wait an extra 15ms for the head to settle before transferring
        const SETTLE_DELAY = 1 << 2;
        const DISABLE_PRECOMPENSATION = 1 << 1;
        /// Write a deleted data mark instead of a normal one
        const DELETED_DATA_MARK = 1 << 0;
    }
}

bitflags::bitflags! {
    /// Interrupt conditions of the force interrupt command. No condition
    /// terminates the current command without raising an interrupt.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptCondition: u8 {
        const IMMEDIATE = 1 << 3;
        const INDEX_PULSE = 1 << 2;
    }
}

/// Head stepping rate, encoded in the low two bits of positioning commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StepRate {
    Ms6 = 0b00,
    Ms12 = 0b01,
    Ms2 = 0b10,
    Ms3 = 0b11,
}

impl StepRate {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Ms6,
            0b01 => Self::Ms12,
            0b10 => Self::Ms2,
            _ => Self::Ms3,
        }
    }
}

/// The class of a command, which decides how its status byte is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Type I: restore, seek, step
    Positioning,
    /// Types II and III: sector and track transfers
    Transfer,
    /// Type IV: force interrupt
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdcCommand {
    Restore(PositionFlags, StepRate),
    Seek(PositionFlags, StepRate),
    Step(PositionFlags, StepRate),
    StepIn(PositionFlags, StepRate),
    StepOut(PositionFlags, StepRate),
    ReadSector(TransferFlags),
    WriteSector(TransferFlags),
    ReadAddress(TransferFlags),
    ReadTrack(TransferFlags),
    WriteTrack(TransferFlags),
    ForceInterrupt(InterruptCondition),
}

impl FdcCommand {
    pub const RESTORE: u8 = 0x00;
    pub const SEEK: u8 = 0x10;
    pub const STEP: u8 = 0x20;
    pub const STEP_IN: u8 = 0x40;
    pub const STEP_OUT: u8 = 0x60;
    pub const READ_SECTOR: u8 = 0x80;
    pub const WRITE_SECTOR: u8 = 0xA0;
    pub const READ_ADDRESS: u8 = 0xC0;
    pub const READ_TRACK: u8 = 0xE0;
    pub const WRITE_TRACK: u8 = 0xF0;
    pub const FORCE_INTERRUPT: u8 = 0xD0;

    pub fn byte(self) -> u8 {
        match self {
            Self::Restore(flags, rate) => Self::RESTORE | flags.bits() | rate as u8,
            Self::Seek(flags, rate) => Self::SEEK | flags.bits() | rate as u8,
            Self::Step(flags, rate) => Self::STEP | flags.bits() | rate as u8,
            Self::StepIn(flags, rate) => Self::STEP_IN | flags.bits() | rate as u8,
            Self::StepOut(flags, rate) => Self::STEP_OUT | flags.bits() | rate as u8,
            Self::ReadSector(flags) => Self::READ_SECTOR | flags.bits(),
            Self::WriteSector(flags) => Self::WRITE_SECTOR | flags.bits(),
            Self::ReadAddress(flags) => Self::READ_ADDRESS | flags.bits(),
            Self::ReadTrack(flags) => Self::READ_TRACK | flags.bits(),
            Self::WriteTrack(flags) => Self::WRITE_TRACK | flags.bits(),
            Self::ForceInterrupt(condition) => Self::FORCE_INTERRUPT | condition.bits(),
        }
    }

    /// Parses a command byte the way the controller does, from the high bits
    /// down
    pub fn decode(byte: u8) -> Self {
        let position = || {
            (
                PositionFlags::from_bits_truncate(byte),
                StepRate::from_bits(byte),
            )
        };
        let transfer = |mask: u8| TransferFlags::from_bits_truncate(byte & mask);

        match byte & 0xF0 {
            0x00 => {
                let (flags, rate) = position();
                Self::Restore(flags - PositionFlags::UPDATE_TRACK, rate)
            }
            0x10 => {
                let (flags, rate) = position();
                Self::Seek(flags - PositionFlags::UPDATE_TRACK, rate)
            }
            0x20 | 0x30 => {
                let (flags, rate) = position();
                Self::Step(flags, rate)
            }
            0x40 | 0x50 => {
                let (flags, rate) = position();
                Self::StepIn(flags, rate)
            }
            0x60 | 0x70 => {
                let (flags, rate) = position();
                Self::StepOut(flags, rate)
            }
            0x80 | 0x90 => Self::ReadSector(transfer(0x1F)),
            0xA0 | 0xB0 => Self::WriteSector(transfer(0x1F)),
            0xC0 => Self::ReadAddress(transfer(0x0F)),
            0xD0 => Self::ForceInterrupt(InterruptCondition::from_bits_truncate(byte)),
            0xE0 => Self::ReadTrack(transfer(0x0F)),
            _ => Self::WriteTrack(transfer(0x0F)),
        }
    }

    pub fn kind(self) -> CommandType {
        match self {
            Self::Restore(..)
            | Self::Seek(..)
            | Self::Step(..)
            | Self::StepIn(..)
            | Self::StepOut(..) => CommandType::Positioning,
            Self::ReadSector(_)
            | Self::WriteSector(_)
            | Self::ReadAddress(_)
            | Self::ReadTrack(_)
            | Self::WriteTrack(_) => CommandType::Transfer,
            Self::ForceInterrupt(_) => CommandType::Interrupt,
        }
    }
}

/// Writes a value to one controller register. The DMA mode is switched first
/// since the register window only reaches whatever the mode selects.
pub fn write_register<H: FloppyHardware + ?Sized>(
    hw: &mut H,
    direction: DmaDirection,
    register: FdcRegister,
    value: u8,
) {
    dma::select_register(hw, direction, register);
    hw.write_fdc(value as u16);
}

pub fn read_register<H: FloppyHardware + ?Sized>(
    hw: &mut H,
    direction: DmaDirection,
    register: FdcRegister,
) -> u8 {
    dma::select_register(hw, direction, register);
    (hw.read_fdc() & 0xFF) as u8
}

/// Writes a command byte. Leaves the window on the command register, so the
/// next read of the window returns the controller status.
pub fn send_command<H: FloppyHardware + ?Sized>(
    hw: &mut H,
    direction: DmaDirection,
    command: FdcCommand,
) {
    log::trace!("fdc command {:#04x} ({:?})", command.byte(), command);
    write_register(hw, direction, FdcRegister::Command, command.byte());
}

pub fn set_track<H: FloppyHardware + ?Sized>(hw: &mut H, direction: DmaDirection, track: u8) {
    write_register(hw, direction, FdcRegister::Track, track);
}

pub fn set_sector<H: FloppyHardware + ?Sized>(hw: &mut H, direction: DmaDirection, sector: u8) {
    write_register(hw, direction, FdcRegister::Sector, sector);
}

/// The seek command takes its destination from the data register
pub fn set_data<H: FloppyHardware + ?Sized>(hw: &mut H, direction: DmaDirection, value: u8) {
    write_register(hw, direction, FdcRegister::Data, value);
}

pub fn get_track<H: FloppyHardware + ?Sized>(hw: &mut H) -> u8 {
    read_register(hw, DmaDirection::FromController, FdcRegister::Track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::sim::SimulatedController;

    #[test]
    fn command_bytes_match_the_controller_encoding() {
        let verify = PositionFlags::VERIFY;

        assert_eq!(FdcCommand::Restore(verify, StepRate::Ms3).byte(), 0x07);
        assert_eq!(FdcCommand::Seek(verify, StepRate::Ms3).byte(), 0x17);
        assert_eq!(FdcCommand::Seek(PositionFlags::empty(), StepRate::Ms6).byte(), 0x10);
        assert_eq!(
            FdcCommand::ReadSector(TransferFlags::SETTLE_DELAY).byte(),
            0x84
        );
        assert_eq!(FdcCommand::WriteSector(TransferFlags::empty()).byte(), 0xA0);
        assert_eq!(
            FdcCommand::ForceInterrupt(InterruptCondition::empty()).byte(),
            0xD0
        );
        assert_eq!(
            FdcCommand::ForceInterrupt(InterruptCondition::IMMEDIATE).byte(),
            0xD8
        );
    }

    #[test]
    fn decoding_keeps_the_command_type() {
        assert_eq!(FdcCommand::decode(0x17).kind(), CommandType::Positioning);
        assert_eq!(FdcCommand::decode(0x84).kind(), CommandType::Transfer);
        assert_eq!(FdcCommand::decode(0xA4).kind(), CommandType::Transfer);
        assert_eq!(FdcCommand::decode(0xD0).kind(), CommandType::Interrupt);
        assert_eq!(
            FdcCommand::decode(0x5B),
            FdcCommand::StepIn(
                PositionFlags::UPDATE_TRACK | PositionFlags::DISABLE_SPIN_UP,
                StepRate::Ms3
            )
        );
    }

    #[test]
    fn register_writes_switch_the_window_first() {
        let mut hw = SimulatedController::new();

        set_track(&mut hw, DmaDirection::ToController, 17);
        assert_eq!(hw.dma_mode().bits(), 0x182);
        assert_eq!(get_track(&mut hw), 17);
        assert_eq!(hw.dma_mode().bits(), 0x082);

        set_sector(&mut hw, DmaDirection::FromController, 3);
        assert_eq!(hw.dma_mode().bits(), 0x084);
        assert_eq!(hw.sector_register(), 3);

        set_data(&mut hw, DmaDirection::FromController, 22);
        assert_eq!(hw.dma_mode().bits(), 0x086);
    }
}
