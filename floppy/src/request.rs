use crate::geometry::{Drive, Sector, SectorBuffer, Side, Track};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskOperation {
    Read,
    Write,
}

/// A single sector transfer. The buffer is borrowed for the duration of the
/// call only.
#[derive(Debug)]
pub struct DiskIoRequest<'a> {
    pub operation: DiskOperation,
    pub drive: Drive,
    pub side: Side,
    pub track: Track,
    pub sector: Sector,
    pub buffer: &'a mut SectorBuffer,
}

impl<'a> DiskIoRequest<'a> {
    pub fn read(
        drive: Drive,
        side: Side,
        track: Track,
        sector: Sector,
        buffer: &'a mut SectorBuffer,
    ) -> Self {
        Self {
            operation: DiskOperation::Read,
            drive,
            side,
            track,
            sector,
            buffer,
        }
    }

    pub fn write(
        drive: Drive,
        side: Side,
        track: Track,
        sector: Sector,
        buffer: &'a mut SectorBuffer,
    ) -> Self {
        Self {
            operation: DiskOperation::Write,
            ..Self::read(drive, side, track, sector, buffer)
        }
    }

    /// Validates a request record handed over a trap boundary
    ///
    /// # Safety
    ///
    /// `raw.buffer_address` must either be null or point to 512 bytes which
    /// stay valid and unaliased for `'a`.
    pub unsafe fn from_raw(raw: &RawDiskIoRequest) -> Result<Self, RequestError> {
        let operation = match raw.operation {
            0 => DiskOperation::Read,
            1 => DiskOperation::Write,
            other => return Err(RequestError::UnknownOperation(other)),
        };
        let drive = match raw.disk {
            0 => Drive::A,
            1 => Drive::B,
            other => return Err(RequestError::UnknownDrive(other)),
        };
        let side = match raw.side {
            0 => Side::Zero,
            1 => Side::One,
            other => return Err(RequestError::UnknownSide(other)),
        };
        let track = Track::try_from(raw.track)?;
        let sector = Sector::try_from(raw.sector)?;

        if raw.n_sector != 1 {
            return Err(RequestError::SectorCount(raw.n_sector));
        }

        // SAFETY: the caller guarantees the pointer covers a whole sector for 'a
        let buffer = unsafe { raw.buffer_address.cast::<SectorBuffer>().as_mut() }
            .ok_or(RequestError::NullBuffer)?;

        Ok(Self {
            operation,
            drive,
            side,
            track,
            sector,
            buffer,
        })
    }
}

/// C layout of a disk request as it crosses the trap boundary
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct RawDiskIoRequest {
    /// 0 = read, 1 = write
    pub operation: i32,
    /// 0 = drive A, 1 = drive B
    pub disk: i32,
    pub side: i32,
    pub track: i32,
    pub sector: i32,
    pub buffer_address: *mut u8,
    /// Must be 1, burst transfers are not supported
    pub n_sector: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("unknown disk operation {0}")]
    UnknownOperation(i32),
    #[error("unknown drive {0}")]
    UnknownDrive(i32),
    #[error("unknown side {0}")]
    UnknownSide(i32),
    #[error("track {0} is out of range")]
    TrackOutOfRange(i32),
    #[error("sector {0} is out of range")]
    SectorOutOfRange(i32),
    #[error("only single sector transfers are supported (got {0})")]
    SectorCount(i32),
    #[error("request has no buffer")]
    NullBuffer,
}
