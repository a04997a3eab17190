//! Block device view of one floppy drive

use spin::Mutex;

use crate::{
    device::block::{BlockDevice, BlockDeviceIoError, BlockDeviceMetadata},
    geometry::{Chs, Drive, SECTOR_SIZE, SectorBuffer, TOTAL_SECTORS},
    hw::FloppyHardware,
};

use super::floppy::FloppyDisk;

/// One drive of a shared [`FloppyDisk`]. Blocks are numbered across both sides
/// of a track before moving to the next track.
pub struct FloppyVolume<'a, H: FloppyHardware> {
    disk: &'a Mutex<FloppyDisk<H>>,
    drive: Drive,
}

impl<'a, H: FloppyHardware> FloppyVolume<'a, H> {
    pub fn new(disk: &'a Mutex<FloppyDisk<H>>, drive: Drive) -> Self {
        Self { disk, drive }
    }

    pub fn drive(&self) -> Drive {
        self.drive
    }

    fn locate(&self, block: usize) -> Result<Chs, BlockDeviceIoError> {
        Chs::from_lba(block).ok_or(BlockDeviceIoError::OffsetOutOfBounds)
    }
}

impl<H: FloppyHardware> BlockDevice for FloppyVolume<'_, H> {
    fn metadata(&self) -> BlockDeviceMetadata {
        BlockDeviceMetadata {
            block_size: SECTOR_SIZE,
            total_blocks: TOTAL_SECTORS,
        }
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<usize, BlockDeviceIoError> {
        let first = self.metadata().check_range(offset, buf.len())?;
        let mut disk = self.disk.lock();

        for (i, chunk) in buf.chunks_exact_mut(SECTOR_SIZE).enumerate() {
            let chs = self.locate(first + i)?;
            let block: &mut SectorBuffer = chunk
                .try_into()
                .map_err(|_| BlockDeviceIoError::MismatchedBlockSize)?;

            disk.read_sector(self.drive, chs.side, chs.track, chs.sector, block)?;
        }

        Ok(buf.len())
    }

    fn write(&self, offset: usize, buf: &[u8]) -> Result<usize, BlockDeviceIoError> {
        let first = self.metadata().check_range(offset, buf.len())?;
        let mut disk = self.disk.lock();

        for (i, chunk) in buf.chunks_exact(SECTOR_SIZE).enumerate() {
            let chs = self.locate(first + i)?;
            let block: &SectorBuffer = chunk
                .try_into()
                .map_err(|_| BlockDeviceIoError::MismatchedBlockSize)?;

            disk.write_sector(self.drive, chs.side, chs.track, chs.sector, block)?;
        }

        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DriverConfig,
        drivers::block::floppy::BusyFlag,
        geometry::{Sector, Side, Track},
        hw::sim::SimulatedController,
        regs::{DmaAddressByte, DmaMode, DmaStatus, PsgRegister},
        status::DiskError,
    };

    fn shared_disk() -> Mutex<FloppyDisk<SimulatedController>> {
        Mutex::new(FloppyDisk::new(SimulatedController::new(), DriverConfig::new()))
    }

    #[test]
    fn blocks_fill_both_sides_of_a_track_first() {
        let disk = shared_disk();
        let volume = FloppyVolume::new(&disk, Drive::B);
        assert_eq!(volume.metadata().total_blocks, 720);

        let data = [0xA5u8; 2 * SECTOR_SIZE];
        // Blocks 17 and 18: the last sector of track 0 side 1 and the first of track 1
        assert_eq!(volume.write(17 * SECTOR_SIZE, &data), Ok(data.len()));

        let disk = disk.lock();
        let filled_with = |side, track, sector, byte| {
            let track = Track::new(track).unwrap();
            let sector = Sector::new(sector).unwrap();
            disk.hardware()
                .sector(Drive::B, side, track, sector)
                .iter()
                .all(|&b| b == byte)
        };

        assert!(filled_with(Side::One, 0, 9, 0xA5));
        assert!(filled_with(Side::Zero, 1, 1, 0xA5));
        assert!(filled_with(Side::Zero, 0, 9, 0));
    }

    #[test]
    fn reads_come_back_block_by_block() {
        let disk = shared_disk();
        disk.lock().hardware_mut().fill_sector(
            Drive::A,
            Side::One,
            Track::new(2).unwrap(),
            Sector::new(1).unwrap(),
            0x42,
        );
        let volume = FloppyVolume::new(&disk, Drive::A);

        let mut buf = [0u8; 2 * SECTOR_SIZE];
        // Block 44 is track 2 side 0 sector 9, block 45 is track 2 side 1 sector 1
        assert_eq!(volume.read(44 * SECTOR_SIZE, &mut buf), Ok(buf.len()));
        assert!(buf[..SECTOR_SIZE].iter().all(|&b| b == 0));
        assert!(buf[SECTOR_SIZE..].iter().all(|&b| b == 0x42));
    }

    #[test]
    fn malformed_ranges_never_reach_the_drive() {
        let disk = shared_disk();
        let volume = FloppyVolume::new(&disk, Drive::A);
        let mut buf = [0u8; SECTOR_SIZE];

        assert_eq!(volume.read(3, &mut buf), Err(BlockDeviceIoError::UnalignedOffset));
        assert_eq!(
            volume.read(0, &mut buf[..100]),
            Err(BlockDeviceIoError::MismatchedBlockSize)
        );
        assert_eq!(
            volume.read(720 * SECTOR_SIZE, &mut buf),
            Err(BlockDeviceIoError::OffsetOutOfBounds)
        );
        assert!(disk.lock().hardware().commands().is_empty());
    }

    #[test]
    fn disk_errors_surface_through_the_volume() {
        let disk = shared_disk();
        disk.lock().hardware_mut().set_write_protect(Drive::A, true);
        let volume = FloppyVolume::new(&disk, Drive::A);

        assert_eq!(
            volume.write(0, &[0u8; SECTOR_SIZE]),
            Err(BlockDeviceIoError::Disk(DiskError::WriteProtect))
        );
    }

    /// Counts controller writes made while the driver's busy flag was down
    struct FlagWatcher {
        inner: SimulatedController,
        flag: BusyFlag,
        writes: usize,
        idle_writes: usize,
    }

    impl FloppyHardware for FlagWatcher {
        fn write_dma_mode(&mut self, mode: DmaMode) {
            self.inner.write_dma_mode(mode)
        }

        fn read_dma_status(&mut self) -> DmaStatus {
            self.inner.read_dma_status()
        }

        fn write_fdc(&mut self, value: u16) {
            self.writes += 1;
            if !self.flag.is_busy() {
                self.idle_writes += 1;
            }
            self.inner.write_fdc(value)
        }

        fn read_fdc(&mut self) -> u16 {
            self.inner.read_fdc()
        }

        fn write_dma_base(&mut self, byte: DmaAddressByte, value: u8) {
            self.inner.write_dma_base(byte, value)
        }

        fn select_psg_register(&mut self, register: PsgRegister) {
            self.inner.select_psg_register(register)
        }

        fn read_psg(&mut self) -> u8 {
            self.inner.read_psg()
        }

        fn write_psg(&mut self, value: u8) {
            self.inner.write_psg(value)
        }

        fn dma_address(&mut self, buffer: *mut u8) -> Result<u32, DiskError> {
            self.inner.dma_address(buffer)
        }

        fn idle(&mut self) {
            self.inner.idle()
        }
    }

    #[test]
    fn volume_io_keeps_the_drive_busy() {
        let watcher = FlagWatcher {
            inner: SimulatedController::new(),
            flag: BusyFlag::default(),
            writes: 0,
            idle_writes: 0,
        };
        let mut disk = FloppyDisk::new(watcher, DriverConfig::new());
        disk.hardware_mut().flag = disk.busy_flag();
        let disk = Mutex::new(disk);
        let volume = FloppyVolume::new(&disk, Drive::A);

        let mut buf = [0u8; 2 * SECTOR_SIZE];
        assert_eq!(volume.read(0, &mut buf), Ok(buf.len()));

        let disk = disk.lock();
        assert!(disk.hardware().writes > 0);
        assert_eq!(disk.hardware().idle_writes, 0);
        assert!(!disk.is_busy());
        assert_eq!(disk.command_state(), crate::completion::CommandState::Idle);
    }
}
