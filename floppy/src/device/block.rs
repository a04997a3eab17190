use crate::status::DiskError;

/// Represents an abstract device which can read and write data to/from a store
/// in fixed size blocks
pub trait BlockDevice {
    fn metadata(&self) -> BlockDeviceMetadata;

    fn read(&self, _offset: usize, _buf: &mut [u8]) -> Result<usize, BlockDeviceIoError> {
        Err(BlockDeviceIoError::OperationNotSupported)
    }

    fn write(&self, _offset: usize, _buf: &[u8]) -> Result<usize, BlockDeviceIoError> {
        Err(BlockDeviceIoError::OperationNotSupported)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDeviceMetadata {
    pub block_size: usize,
    pub total_blocks: usize,
}

impl BlockDeviceMetadata {
    pub const fn size(&self) -> usize {
        self.block_size * self.total_blocks
    }

    /// Checks that `len` bytes at `offset` cover whole blocks inside the device
    /// and returns the first block index
    pub fn check_range(&self, offset: usize, len: usize) -> Result<usize, BlockDeviceIoError> {
        if offset % self.block_size != 0 {
            return Err(BlockDeviceIoError::UnalignedOffset);
        }
        if len % self.block_size != 0 {
            return Err(BlockDeviceIoError::MismatchedBlockSize);
        }
        match offset.checked_add(len) {
            Some(end) if end <= self.size() => Ok(offset / self.block_size),
            _ => Err(BlockDeviceIoError::OffsetOutOfBounds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockDeviceIoError {
    /// Returned if this operation is not supported on this device
    #[error("operation not supported")]
    OperationNotSupported,
    /// The provided offset was not aligned to the block size
    #[error("offset is not block aligned")]
    UnalignedOffset,
    /// The provided offset was out of range for the device
    #[error("offset is out of bounds")]
    OffsetOutOfBounds,
    /// The provided buffer was not a multiple of the block size
    #[error("buffer is not a multiple of the block size")]
    MismatchedBlockSize,
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_checks() {
        let metadata = BlockDeviceMetadata {
            block_size: 512,
            total_blocks: 4,
        };

        assert_eq!(metadata.check_range(1024, 1024), Ok(2));
        assert_eq!(
            metadata.check_range(100, 512),
            Err(BlockDeviceIoError::UnalignedOffset)
        );
        assert_eq!(
            metadata.check_range(0, 100),
            Err(BlockDeviceIoError::MismatchedBlockSize)
        );
        assert_eq!(
            metadata.check_range(1536, 1024),
            Err(BlockDeviceIoError::OffsetOutOfBounds)
        );
        assert_eq!(
            metadata.check_range(usize::MAX - 511, 512),
            Err(BlockDeviceIoError::OffsetOutOfBounds)
        );
    }
}
