//! Floppy Disk Driver
//!
//! [`FloppyDisk`] owns the hardware and turns one sector request into drive
//! selection, head positioning and a DMA transfer. It tracks where it believes
//! each drive's head is and only trusts that belief after a successful restore
//! or seek. Any unexpected failure forgets the position, so the next access
//! starts with a restore.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use scopeguard::ScopeGuard;

use crate::{
    command::{self, FdcCommand, InterruptCondition, PositionFlags, TransferFlags},
    completion::{self, CommandState, PendingCommand, Timeout},
    config::DriverConfig,
    dma::{self, DmaDirection},
    geometry::{Drive, Sector, SectorBuffer, Side, Track},
    hw::FloppyHardware,
    psg,
    request::{DiskIoRequest, DiskOperation},
    status::{
        DiskError, DiskStatus, ErrorClass, FdcStatus, check_read, check_restore, check_seek,
        check_write,
    },
};

/// Where the driver believes a drive's head is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadPosition {
    Unknown,
    Track(Track),
}

/// Raised while a public driver operation runs. Clones share the flag, so a
/// scheduler can check it without taking the driver lock.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raises the flag until the returned guard is dropped
    pub fn raise(&self) -> ScopeGuard<Self, fn(Self)> {
        self.0.store(true, Ordering::Release);
        scopeguard::guard(self.clone(), Self::lower as fn(Self))
    }

    fn lower(self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FloppyDisk<H: FloppyHardware> {
    hw: H,
    config: DriverConfig,
    heads: [HeadPosition; 2],
    selected: Option<(Drive, Side)>,
    state: CommandState,
    /// Set per drive when its head moved since its last transfer
    head_moved: [bool; 2],
    busy: BusyFlag,
}

impl<H: FloppyHardware> FloppyDisk<H> {
    /// Callers must ensure that only one instance of this driver exists for
    /// each controller
    pub fn new(hw: H, config: DriverConfig) -> Self {
        Self {
            hw,
            config,
            heads: [HeadPosition::Unknown; 2],
            selected: None,
            state: CommandState::Idle,
            head_moved: [false; 2],
            busy: BusyFlag::default(),
        }
    }

    /// Resets the controller and drive lines to a known state. Should be
    /// called after instantiation.
    pub fn initialize(&mut self) {
        psg::enable_port_a_output(&mut self.hw);
        psg::deselect_floppy_drives(&mut self.hw);
        self.selected = None;

        self.force_interrupt();
        self.heads = [HeadPosition::Unknown; 2];
        self.head_moved = [false; 2];

        log::debug!("floppy controller initialized");
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn command_state(&self) -> CommandState {
        self.state
    }

    pub fn head_position(&self, drive: Drive) -> HeadPosition {
        self.heads[drive.index()]
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn into_inner(self) -> H {
        self.hw
    }

    pub fn select(&mut self, drive: Drive, side: Side) {
        if self.selected != Some((drive, side)) {
            psg::select_floppy_drive(&mut self.hw, drive, side);
            self.selected = Some((drive, side));
        }
    }

    /// Selects `drive` if it is not already, keeping the current side
    fn ensure_selected(&mut self, drive: Drive) {
        match self.selected {
            Some((selected, _)) if selected == drive => {}
            _ => self.select(drive, Side::Zero),
        }
    }

    /// Runs one driver operation with the busy flag raised and leaves the
    /// command state idle afterwards
    fn exclusive<T>(&mut self, operation: impl FnOnce(&mut Self) -> T) -> T {
        let _busy = self.busy.raise();
        let result = operation(self);
        self.state = CommandState::Idle;
        result
    }

    /// Runs one command to completion
    fn run(
        &mut self,
        direction: DmaDirection,
        command: FdcCommand,
        timeout: Timeout,
    ) -> Result<FdcStatus, DiskError> {
        let pending = PendingCommand::issue(
            &mut self.hw,
            direction,
            command,
            self.config.wait,
            &mut self.state,
        );
        pending.wait(&mut self.hw, timeout, &mut self.state)
    }

    fn position_flags(&self) -> PositionFlags {
        if self.config.verify_seek {
            PositionFlags::VERIFY
        } else {
            PositionFlags::empty()
        }
    }

    /// Steps the head out to track zero
    pub fn restore(&mut self, drive: Drive) -> Result<(), DiskError> {
        self.exclusive(|disk| disk.restore_head(drive).map_err(|err| disk.fail(drive, err)))
    }

    fn restore_head(&mut self, drive: Drive) -> Result<(), DiskError> {
        self.ensure_selected(drive);
        self.heads[drive.index()] = HeadPosition::Unknown;

        let command = FdcCommand::Restore(self.position_flags(), self.config.step_rate);
        let timeout = self.config.spin_up_timeout;
        let status = self.run(DmaDirection::FromController, command, timeout)?;

        check_restore(status.position())?;

        log::debug!("drive {drive:?} restored to track 0");
        self.heads[drive.index()] = HeadPosition::Track(Track::ZERO);
        self.head_moved[drive.index()] = true;
        Ok(())
    }

    /// Issues a seek from `from` to `to`. The controller steps by the
    /// difference of the two, so `from` has to be where the head really is.
    /// On failure the head position is forgotten.
    fn seek_command(&mut self, drive: Drive, from: Track, to: Track) -> Result<(), DiskError> {
        let result = self.step_head(drive, from, to);
        if result.is_err() {
            self.heads[drive.index()] = HeadPosition::Unknown;
        }
        result
    }

    fn step_head(&mut self, drive: Drive, from: Track, to: Track) -> Result<(), DiskError> {
        let direction = DmaDirection::FromController;
        command::set_track(&mut self.hw, direction, from.get());
        command::set_data(&mut self.hw, direction, to.get());

        let seek = FdcCommand::Seek(self.position_flags(), self.config.step_rate);
        let timeout = self.config.command_timeout;
        let status = self.run(direction, seek, timeout)?;

        check_seek(status.position(), to.get())?;

        let readback = command::get_track(&mut self.hw);
        if readback != to.get() {
            log::warn!(
                "drive {drive:?}: track register reads {readback} after seeking to {}",
                to.get()
            );
            return Err(DiskError::SeekFailed(to.get()));
        }

        log::debug!("drive {drive:?} moved from track {} to {}", from.get(), to.get());
        self.heads[drive.index()] = HeadPosition::Track(to);
        if from != to {
            self.head_moved[drive.index()] = true;
        }
        Ok(())
    }

    /// Moves the head to `track`, restoring first if its position is unknown
    pub fn seek(&mut self, drive: Drive, track: Track) -> Result<(), DiskError> {
        self.exclusive(|disk| disk.move_head(drive, track).map_err(|err| disk.fail(drive, err)))
    }

    fn move_head(&mut self, drive: Drive, track: Track) -> Result<(), DiskError> {
        self.ensure_selected(drive);

        match self.heads[drive.index()] {
            HeadPosition::Track(current) if current == track => Ok(()),
            HeadPosition::Track(current) => self.seek_command(drive, current, track),
            HeadPosition::Unknown => {
                self.restore_head(drive)?;
                if track == Track::ZERO {
                    Ok(())
                } else {
                    self.seek_command(drive, Track::ZERO, track)
                }
            }
        }
    }

    /// Seeks even if the head is believed to be on `track` already
    fn reseek(&mut self, drive: Drive, track: Track) -> Result<(), DiskError> {
        match self.heads[drive.index()] {
            HeadPosition::Track(current) => self.seek_command(drive, current, track),
            HeadPosition::Unknown => self.move_head(drive, track),
        }
    }

    /// Aborts whatever the controller is doing. The controller always honours
    /// this, so the wait is unbounded.
    pub fn force_interrupt(&mut self) -> u8 {
        command::send_command(
            &mut self.hw,
            DmaDirection::FromController,
            FdcCommand::ForceInterrupt(InterruptCondition::empty()),
        );
        let status = completion::busy_wait(&mut self.hw);
        self.state = CommandState::Idle;
        status
    }

    /// One attempt at moving a sector. The DMA chip is programmed from scratch
    /// every time.
    fn transfer_once(
        &mut self,
        direction: DmaDirection,
        address: u32,
        drive: Drive,
        track: Track,
        sector: Sector,
    ) -> Result<(), DiskError> {
        dma::set_buffer_address(&mut self.hw, address)?;
        dma::arm_transfer(&mut self.hw, direction);
        // The track register is shared by both drives and the ID field is
        // compared against it
        command::set_track(&mut self.hw, direction, track.get());
        command::set_sector(&mut self.hw, direction, sector.get());

        let mut flags = TransferFlags::empty();
        if self.config.settle_delay && self.head_moved[drive.index()] {
            flags |= TransferFlags::SETTLE_DELAY;
        }
        let command = match direction {
            DmaDirection::FromController => FdcCommand::ReadSector(flags),
            DmaDirection::ToController => FdcCommand::WriteSector(flags),
        };

        let timeout = self.config.command_timeout;
        let status = self.run(direction, command, timeout)?.transfer();
        self.head_moved[drive.index()] = false;

        match direction {
            DmaDirection::FromController => check_read(status),
            DmaDirection::ToController => {
                let dma_status = self.hw.read_dma_status();
                check_write(status, dma_status)
            }
        }
    }

    /// Selects, positions and transfers with retries. The first error that is
    /// not retried is the result.
    fn transfer(
        &mut self,
        direction: DmaDirection,
        drive: Drive,
        side: Side,
        track: Track,
        sector: Sector,
        buffer: *mut u8,
    ) -> Result<(), DiskError> {
        // Nothing touches the hardware before the buffer is known to be reachable
        let address = dma::check_address(self.hw.dma_address(buffer)?)?;

        self.select(drive, side);

        let mut retries = 0;
        let mut restored = false;
        let mut outcome = self.move_head(drive, track);

        loop {
            let attempt = outcome.and_then(|()| {
                self.transfer_once(direction, address, drive, track, sector)
            });
            let err = match attempt {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            match err.class() {
                ErrorClass::Transient if retries < self.config.retries => {
                    retries += 1;
                    log::warn!(
                        "drive {drive:?} track {} sector {}: {err}, retry {retries} of {}",
                        track.get(),
                        sector.get(),
                        self.config.retries
                    );
                    outcome = self.reseek(drive, track);
                }
                ErrorClass::Positional if !restored => {
                    restored = true;
                    log::warn!(
                        "drive {drive:?} track {}: {err}, restoring",
                        track.get()
                    );
                    self.heads[drive.index()] = HeadPosition::Unknown;
                    outcome = self.move_head(drive, track);
                }
                _ => return Err(self.fail(drive, err)),
            }
        }
    }

    /// Puts the driver back into a state it can trust after a terminal error.
    /// A timed out command is aborted before anything else is sent.
    fn fail(&mut self, drive: Drive, err: DiskError) -> DiskError {
        if err.class() == ErrorClass::Timeout {
            let status = self.force_interrupt();
            log::warn!("controller reset after timeout, status {status:#04x}");
        }
        if err != DiskError::WriteProtect {
            self.heads[drive.index()] = HeadPosition::Unknown;
        }

        log::error!("drive {drive:?}: {err}");
        err
    }

    pub fn read_sector(
        &mut self,
        drive: Drive,
        side: Side,
        track: Track,
        sector: Sector,
        buffer: &mut SectorBuffer,
    ) -> Result<DiskStatus, DiskError> {
        let direction = DmaDirection::FromController;
        let buffer = buffer.as_mut_ptr();
        self.exclusive(|disk| disk.transfer(direction, drive, side, track, sector, buffer))?;
        Ok(DiskStatus::ReadDone)
    }

    pub fn write_sector(
        &mut self,
        drive: Drive,
        side: Side,
        track: Track,
        sector: Sector,
        buffer: &SectorBuffer,
    ) -> Result<DiskStatus, DiskError> {
        // The DMA engine only reads from the buffer in this direction
        let buffer = buffer.as_ptr().cast_mut();
        let direction = DmaDirection::ToController;
        self.exclusive(|disk| disk.transfer(direction, drive, side, track, sector, buffer))?;
        Ok(DiskStatus::WriteDone)
    }

    /// Performs one request. This is the single entry point used by the trap
    /// interface, and it always returns a final status.
    pub fn dispatch(&mut self, request: DiskIoRequest<'_>) -> DiskStatus {
        let DiskIoRequest {
            operation,
            drive,
            side,
            track,
            sector,
            buffer,
        } = request;

        let result = match operation {
            DiskOperation::Read => self.read_sector(drive, side, track, sector, buffer),
            DiskOperation::Write => self.write_sector(drive, side, track, sector, buffer),
        };

        DiskStatus::from_result(result)
    }
}
