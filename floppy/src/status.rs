//! Interpretation of controller and DMA status
//!
//! The WD1772 reuses status bits between command types: bit 2 reports track
//! zero after a positioning command but lost data after a transfer, and bit 4
//! is a seek error for one and record-not-found for the other. A raw status
//! byte is therefore only decoded together with the type of command that
//! produced it.

use crate::{
    command::CommandType,
    regs::DmaStatus,
    request::RequestError,
};

bitflags::bitflags! {
    /// Status after restore, seek and step commands
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PositionStatus: u8 {
        const BUSY = 1 << 0;
        /// High while the index hole passes the sensor
        const INDEX = 1 << 1;
        const TRACK_ZERO = 1 << 2;
        /// CRC error in a sector ID field read during verification
        const CRC_ERROR = 1 << 3;
        /// The destination track could not be verified
        const SEEK_ERROR = 1 << 4;
        const SPIN_UP_COMPLETE = 1 << 5;
        const WRITE_PROTECT = 1 << 6;
        const MOTOR_ON = 1 << 7;
    }
}

bitflags::bitflags! {
    /// Status after read and write commands
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransferStatus: u8 {
        const BUSY = 1 << 0;
        const DATA_REQUEST = 1 << 1;
        /// The host did not service a data request in time
        const LOST_DATA = 1 << 2;
        const CRC_ERROR = 1 << 3;
        /// The requested track, sector or side was not found
        const RECORD_NOT_FOUND = 1 << 4;
        /// Set when a deleted data mark was read
        const RECORD_TYPE = 1 << 5;
        const WRITE_PROTECT = 1 << 6;
        const MOTOR_ON = 1 << 7;
    }
}

/// A status byte tagged with the type of command that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdcStatus {
    Positioning(PositionStatus),
    Transfer(TransferStatus),
    /// Status following a force interrupt, which reflects whatever command was
    /// interrupted and is not interpreted any further
    Interrupted(u8),
}

impl FdcStatus {
    pub fn decode(kind: CommandType, raw: u8) -> Self {
        match kind {
            CommandType::Positioning => Self::Positioning(PositionStatus::from_bits_retain(raw)),
            CommandType::Transfer => Self::Transfer(TransferStatus::from_bits_retain(raw)),
            CommandType::Interrupt => Self::Interrupted(raw),
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Positioning(status) => status.bits(),
            Self::Transfer(status) => status.bits(),
            Self::Interrupted(raw) => raw,
        }
    }

    pub fn is_busy(self) -> bool {
        self.raw() & 0x01 != 0
    }

    /// The status read as a positioning status regardless of its tag
    pub fn position(self) -> PositionStatus {
        match self {
            Self::Positioning(status) => status,
            other => PositionStatus::from_bits_retain(other.raw()),
        }
    }

    /// The status read as a transfer status regardless of its tag
    pub fn transfer(self) -> TransferStatus {
        match self {
            Self::Transfer(status) => status,
            other => TransferStatus::from_bits_retain(other.raw()),
        }
    }
}

/// Outcome reported to callers. The discriminants are part of the trap ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DiskStatus {
    /// A command is still in flight. Never the final result of an operation.
    Busy = 0,
    CommandComplete = 1,
    LostData = 2,
    CrcError = 3,
    RecordNotFound = 4,
    WriteProtect = 5,
    SeekDone = 6,
    WriteDone = 8,
    ReadDone = 9,
    Timeout = 10,
}

impl DiskStatus {
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    pub const fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Self::Busy,
            1 => Self::CommandComplete,
            2 => Self::LostData,
            3 => Self::CrcError,
            4 => Self::RecordNotFound,
            5 => Self::WriteProtect,
            6 => Self::SeekDone,
            8 => Self::WriteDone,
            9 => Self::ReadDone,
            10 => Self::Timeout,
            _ => return None,
        })
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Busy)
    }

    pub const fn is_success(self) -> bool {
        matches!(
            self,
            Self::CommandComplete | Self::SeekDone | Self::WriteDone | Self::ReadDone
        )
    }

    /// Collapses an operation result into the status a caller observes
    pub fn from_result(result: Result<DiskStatus, DiskError>) -> Self {
        match result {
            // A busy status can only leak through a bug in the orchestrator
            Ok(Self::Busy) => Self::CommandComplete,
            Ok(status) => status,
            Err(err) => err.status(),
        }
    }
}

impl From<DiskError> for DiskStatus {
    fn from(err: DiskError) -> Self {
        err.status()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DiskError {
    #[error("data was lost during the transfer")]
    LostData,
    #[error("CRC check failed")]
    CrcError,
    #[error("track, sector or side not found")]
    RecordNotFound,
    #[error("disk is write protected")]
    WriteProtect,
    #[error("head could not be positioned on track {0}")]
    SeekFailed(u8),
    #[error("controller did not respond within {0} cycles")]
    Timeout(u32),
    #[error("DMA transfer did not complete (status {0:?})")]
    DmaTransfer(DmaStatus),
    #[error("buffer at {0:#x} is not reachable by the DMA engine")]
    BufferUnreachable(usize),
    #[error("invalid request: {0}")]
    Request(#[from] RequestError),
}

/// How the orchestrator reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried after re-seeking to the target track
    Transient,
    /// Retried once after a restore and seek
    Positional,
    /// Returned as is
    Terminal,
    /// Returned as is, the controller is reset before the next command
    Timeout,
}

impl DiskError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::LostData | Self::CrcError | Self::DmaTransfer(_) => ErrorClass::Transient,
            Self::RecordNotFound | Self::SeekFailed(_) => ErrorClass::Positional,
            Self::Timeout(_) => ErrorClass::Timeout,
            Self::WriteProtect | Self::BufferUnreachable(_) | Self::Request(_) => {
                ErrorClass::Terminal
            }
        }
    }

    pub fn status(&self) -> DiskStatus {
        match self {
            Self::LostData | Self::DmaTransfer(_) | Self::BufferUnreachable(_) => {
                DiskStatus::LostData
            }
            Self::CrcError => DiskStatus::CrcError,
            Self::RecordNotFound | Self::SeekFailed(_) | Self::Request(_) => {
                DiskStatus::RecordNotFound
            }
            Self::WriteProtect => DiskStatus::WriteProtect,
            Self::Timeout(_) => DiskStatus::Timeout,
        }
    }
}

pub fn check_restore(status: PositionStatus) -> Result<(), DiskError> {
    if status.contains(PositionStatus::TRACK_ZERO) {
        Ok(())
    } else {
        Err(DiskError::SeekFailed(0))
    }
}

pub fn check_seek(status: PositionStatus, track: u8) -> Result<(), DiskError> {
    if status.contains(PositionStatus::SEEK_ERROR) {
        Err(DiskError::SeekFailed(track))
    } else {
        Ok(())
    }
}

pub fn check_read(status: TransferStatus) -> Result<(), DiskError> {
    if status.contains(TransferStatus::RECORD_NOT_FOUND) {
        Err(DiskError::RecordNotFound)
    } else if status.contains(TransferStatus::CRC_ERROR) {
        Err(DiskError::CrcError)
    } else if status.contains(TransferStatus::LOST_DATA) {
        Err(DiskError::LostData)
    } else {
        Ok(())
    }
}

/// A write also has to drain the DMA sector counter. A clean controller status
/// with a stalled counter means the sector never reached the disk.
pub fn check_write(status: TransferStatus, dma: DmaStatus) -> Result<(), DiskError> {
    if status.contains(TransferStatus::WRITE_PROTECT) {
        Err(DiskError::WriteProtect)
    } else if status.contains(TransferStatus::RECORD_NOT_FOUND) {
        Err(DiskError::RecordNotFound)
    } else if status.contains(TransferStatus::LOST_DATA) {
        Err(DiskError::LostData)
    } else if !dma.contains(DmaStatus::NO_ERROR)
        || dma.contains(DmaStatus::SECTOR_COUNT_NONZERO)
    {
        Err(DiskError::DmaTransfer(dma))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_two_depends_on_the_command_type() {
        let raw = 0x04;

        match FdcStatus::decode(CommandType::Positioning, raw) {
            FdcStatus::Positioning(status) => {
                assert!(status.contains(PositionStatus::TRACK_ZERO));
                assert!(check_restore(status).is_ok());
            }
            other => panic!("unexpected decode {other:?}"),
        }

        match FdcStatus::decode(CommandType::Transfer, raw) {
            FdcStatus::Transfer(status) => {
                assert!(status.contains(TransferStatus::LOST_DATA));
                assert_eq!(check_read(status), Err(DiskError::LostData));
            }
            other => panic!("unexpected decode {other:?}"),
        }
    }

    #[test]
    fn restore_without_track_zero_is_a_seek_failure() {
        let status = PositionStatus::MOTOR_ON | PositionStatus::SPIN_UP_COMPLETE;
        assert_eq!(check_restore(status), Err(DiskError::SeekFailed(0)));
        assert_eq!(DiskError::SeekFailed(0).status(), DiskStatus::RecordNotFound);
    }

    #[test]
    fn write_requires_a_drained_dma_counter() {
        let clean = TransferStatus::MOTOR_ON;

        assert!(check_write(clean, DmaStatus::NO_ERROR).is_ok());

        let stalled = DmaStatus::NO_ERROR | DmaStatus::SECTOR_COUNT_NONZERO;
        assert_eq!(check_write(clean, stalled), Err(DiskError::DmaTransfer(stalled)));
        assert_eq!(DiskError::DmaTransfer(stalled).class(), ErrorClass::Transient);

        assert_eq!(
            check_write(clean, DmaStatus::empty()),
            Err(DiskError::DmaTransfer(DmaStatus::empty()))
        );
    }

    #[test]
    fn write_protect_wins_over_other_write_errors() {
        let status = TransferStatus::WRITE_PROTECT | TransferStatus::LOST_DATA;
        assert_eq!(check_write(status, DmaStatus::NO_ERROR), Err(DiskError::WriteProtect));
        assert_eq!(DiskError::WriteProtect.class(), ErrorClass::Terminal);
    }

    #[test]
    fn busy_never_escapes_as_a_final_status() {
        assert_eq!(DiskStatus::from_result(Ok(DiskStatus::Busy)), DiskStatus::CommandComplete);
        assert_eq!(
            DiskStatus::from_result(Err(DiskError::Timeout(15_000))),
            DiskStatus::Timeout
        );

        for raw in 0..12 {
            if let Some(status) = DiskStatus::from_raw(raw) {
                assert_eq!(status.as_raw(), raw);
            }
        }
        assert_eq!(DiskStatus::from_raw(7), None);
    }
}
