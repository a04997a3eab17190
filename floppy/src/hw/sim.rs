//! In-memory model of the floppy hardware
//!
//! Models the parts of the WD1772, the DMA chip and the sound chip port that
//! the driver relies on: the register window multiplexed by the DMA mode, the
//! relative stepping of seeks, the track ID comparison of sector commands, DMA
//! direction and sector counter checks, and busy time measured in status reads
//! or idle cycles. Two double sided disks are kept as flat images.

use alloc::{collections::VecDeque, vec, vec::Vec};

use crate::{
    command::{FdcCommand, InterruptCondition, PositionFlags},
    completion::{self, CompletionLatch},
    geometry::{
        Drive, SECTOR_SIZE, SECTORS_PER_TRACK, SIDES, Sector, Side, TOTAL_SECTORS, TRACKS, Track,
    },
    regs::{DmaAddressByte, DmaMode, DmaStatus, FdcRegister, MixerControl, PortA, PsgRegister},
    status::{PositionStatus, TransferStatus},
};

use super::FloppyHardware;

/// Bus address handed out for caller buffers
pub const BUFFER_BUS_ADDRESS: u32 = 0x0001_0000;

/// Physical stop of the head carriage
const LAST_PHYSICAL_TRACK: u8 = 83;

const BUSY: u8 = 0x01;

/// A failure the next matching command runs into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Next sector transfer fails its data CRC
    CrcError,
    /// Next sector transfer overruns
    LostData,
    /// Next sector transfer does not find its ID field
    RecordNotFound,
    /// Next sector write leaves the DMA counter undrained
    DmaStall,
    /// Next seek lands one track beyond its target
    SeekError,
}

impl Fault {
    fn applies_to(self, command: FdcCommand) -> bool {
        match self {
            Self::CrcError | Self::LostData | Self::RecordNotFound => matches!(
                command,
                FdcCommand::ReadSector(_) | FdcCommand::WriteSector(_)
            ),
            Self::DmaStall => matches!(command, FdcCommand::WriteSector(_)),
            Self::SeekError => matches!(command, FdcCommand::Seek(..)),
        }
    }
}

pub struct SimulatedController {
    psg_selected: usize,
    psg: [u8; 16],

    dma_mode: DmaMode,
    dma_base: [u8; 3],
    dma_base_writes: Vec<(DmaAddressByte, u8)>,
    dma_error: bool,
    sector_count: u16,

    track: u8,
    sector: u8,
    data: u8,
    status: u8,
    result: u8,
    step_outward: bool,

    latency: u32,
    remaining: u32,
    hung: bool,
    hang_next: bool,

    heads: [u8; 2],
    disks: [Vec<u8>; 2],
    write_protect: [bool; 2],
    faults: VecDeque<Fault>,
    track_zero_broken: bool,

    latch: Option<&'static CompletionLatch>,
    irq_pending: bool,

    buffer: Option<*mut u8>,
    buffer_bus_address: u32,

    commands: Vec<u8>,
    status_reads: usize,
}

impl SimulatedController {
    pub fn new() -> Self {
        let mut psg = [0u8; 16];
        psg[PsgRegister::PortA as usize] =
            (PortA::SIDE_0_SELECT | PortA::DRIVE_A_DISABLE | PortA::DRIVE_B_DISABLE).bits();

        Self {
            psg_selected: 0,
            psg,
            dma_mode: DmaMode::empty(),
            dma_base: [0; 3],
            dma_base_writes: Vec::new(),
            dma_error: false,
            sector_count: 0,
            track: 0,
            sector: 1,
            data: 0,
            status: 0,
            result: 0,
            step_outward: false,
            latency: 2,
            remaining: 0,
            hung: false,
            hang_next: false,
            heads: [0; 2],
            disks: [
                vec![0; TOTAL_SECTORS * SECTOR_SIZE],
                vec![0; TOTAL_SECTORS * SECTOR_SIZE],
            ],
            write_protect: [false; 2],
            faults: VecDeque::new(),
            track_zero_broken: false,
            latch: None,
            irq_pending: false,
            buffer: None,
            buffer_bus_address: BUFFER_BUS_ADDRESS,
            commands: Vec::new(),
            status_reads: 0,
        }
    }

    /// Number of status reads or idle cycles a command stays busy
    pub fn with_latency(mut self, latency: u32) -> Self {
        self.latency = latency;
        self
    }

    /// Bus address reported for caller buffers
    pub fn with_buffer_address(mut self, address: u32) -> Self {
        self.buffer_bus_address = address;
        self
    }

    /// Raises the controller interrupt into `latch` when a command completes
    pub fn attach_interrupt(&mut self, latch: &'static CompletionLatch) {
        self.latch = Some(latch);
    }

    pub fn inject(&mut self, fault: Fault) {
        self.faults.push_back(fault);
    }

    /// The next command stays busy until a force interrupt
    pub fn hang(&mut self) {
        self.hang_next = true;
    }

    pub fn break_track_zero_sensor(&mut self) {
        self.track_zero_broken = true;
    }

    pub fn set_write_protect(&mut self, drive: Drive, protected: bool) {
        self.write_protect[drive.index()] = protected;
    }

    /// Moves the head without the controller knowing
    pub fn displace_head(&mut self, drive: Drive, track: u8) {
        self.heads[drive.index()] = track.min(LAST_PHYSICAL_TRACK);
    }

    pub fn dma_mode(&self) -> DmaMode {
        self.dma_mode
    }

    pub fn dma_base(&self) -> u32 {
        u32::from_be_bytes([0, self.dma_base[0], self.dma_base[1], self.dma_base[2]])
    }

    pub fn dma_base_writes(&self) -> &[(DmaAddressByte, u8)] {
        &self.dma_base_writes
    }

    pub fn sector_count(&self) -> u16 {
        self.sector_count
    }

    pub fn track_register(&self) -> u8 {
        self.track
    }

    pub fn sector_register(&self) -> u8 {
        self.sector
    }

    pub fn data_register(&self) -> u8 {
        self.data
    }

    pub fn port_a(&self) -> PortA {
        PortA::from_bits_retain(self.psg[PsgRegister::PortA as usize])
    }

    pub fn mixer(&self) -> MixerControl {
        MixerControl::from_bits_retain(self.psg[PsgRegister::MixerControl as usize])
    }

    pub fn head(&self, drive: Drive) -> u8 {
        self.heads[drive.index()]
    }

    /// Every command byte written, in order
    pub fn commands(&self) -> &[u8] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn status_reads(&self) -> usize {
        self.status_reads
    }

    pub fn sector(&self, drive: Drive, side: Side, track: Track, sector: Sector) -> &[u8] {
        let offset = image_offset(side.index(), track.get(), sector.get());
        &self.disks[drive.index()][offset..offset + SECTOR_SIZE]
    }

    pub fn fill_sector(
        &mut self,
        drive: Drive,
        side: Side,
        track: Track,
        sector: Sector,
        byte: u8,
    ) {
        let offset = image_offset(side.index(), track.get(), sector.get());
        self.disks[drive.index()][offset..offset + SECTOR_SIZE].fill(byte);
    }

    fn selected_drive(&self) -> Option<usize> {
        let port = self.port_a();
        if !port.contains(PortA::DRIVE_A_DISABLE) {
            Some(0)
        } else if !port.contains(PortA::DRIVE_B_DISABLE) {
            Some(1)
        } else {
            None
        }
    }

    fn selected_side(&self) -> usize {
        if self.port_a().contains(PortA::SIDE_0_SELECT) {
            0
        } else {
            1
        }
    }

    fn take_fault(&mut self, command: FdcCommand) -> Option<Fault> {
        match self.faults.front() {
            Some(fault) if fault.applies_to(command) => self.faults.pop_front(),
            _ => None,
        }
    }

    fn tick(&mut self) {
        if self.status & BUSY == 0 || self.hung {
            return;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.status = self.result;
            if self.latch.is_some() {
                self.irq_pending = true;
            }
        }
    }

    fn read_status(&mut self) -> u8 {
        self.tick();
        self.irq_pending = false;
        self.status_reads += 1;
        self.status
    }

    fn execute(&mut self, byte: u8) {
        self.commands.push(byte);
        let command = FdcCommand::decode(byte);

        if let FdcCommand::ForceInterrupt(condition) = command {
            self.hung = false;
            self.remaining = 0;
            self.status &= !BUSY;
            self.irq_pending =
                self.latch.is_some() && condition.contains(InterruptCondition::IMMEDIATE);
            return;
        }

        // Commands other than force interrupt are ignored while busy
        if self.status & BUSY != 0 {
            return;
        }

        self.result = match command {
            FdcCommand::Restore(..) => self.restore().bits(),
            FdcCommand::Seek(flags, _) => self.seek(command, flags).bits(),
            FdcCommand::Step(flags, _) => self.step(self.step_outward, flags).bits(),
            FdcCommand::StepIn(flags, _) => self.step(false, flags).bits(),
            FdcCommand::StepOut(flags, _) => self.step(true, flags).bits(),
            FdcCommand::ReadSector(_) => self.read_sector(command).bits(),
            FdcCommand::WriteSector(_) => self.write_sector(command).bits(),
            FdcCommand::ReadAddress(_) => self.read_address().bits(),
            FdcCommand::ReadTrack(_) | FdcCommand::WriteTrack(_) => {
                (TransferStatus::MOTOR_ON | TransferStatus::RECORD_NOT_FOUND).bits()
            }
            FdcCommand::ForceInterrupt(_) => self.status,
        };

        self.status = self.result | BUSY;
        self.remaining = self.latency;
        self.irq_pending = false;

        if self.hang_next {
            self.hang_next = false;
            self.hung = true;
        }
    }

    fn position_status(&self, drive: usize) -> PositionStatus {
        let mut status = PositionStatus::MOTOR_ON | PositionStatus::SPIN_UP_COMPLETE;
        if self.heads[drive] == 0 && !self.track_zero_broken {
            status |= PositionStatus::TRACK_ZERO;
        }
        if self.write_protect[drive] {
            status |= PositionStatus::WRITE_PROTECT;
        }
        status
    }

    fn restore(&mut self) -> PositionStatus {
        let Some(drive) = self.selected_drive() else {
            return PositionStatus::MOTOR_ON | PositionStatus::SEEK_ERROR;
        };

        self.heads[drive] = 0;
        self.step_outward = true;

        if self.track_zero_broken {
            return self.position_status(drive) | PositionStatus::SEEK_ERROR;
        }

        self.track = 0;
        self.position_status(drive)
    }

    /// Steps by the difference between the data and track registers, so a
    /// stale track register leaves the head off target
    fn seek(&mut self, command: FdcCommand, flags: PositionFlags) -> PositionStatus {
        let Some(drive) = self.selected_drive() else {
            return PositionStatus::MOTOR_ON | PositionStatus::SEEK_ERROR;
        };

        let mut steps = self.data as i16 - self.track as i16;
        if self.take_fault(command).is_some() {
            steps += 1;
        }

        self.step_outward = steps < 0;
        self.heads[drive] =
            (self.heads[drive] as i16 + steps).clamp(0, LAST_PHYSICAL_TRACK as i16) as u8;
        self.track = self.data;

        let mut status = self.position_status(drive);
        if flags.contains(PositionFlags::VERIFY) && self.heads[drive] != self.track {
            status |= PositionStatus::SEEK_ERROR;
        }
        status
    }

    fn step(&mut self, outward: bool, flags: PositionFlags) -> PositionStatus {
        let Some(drive) = self.selected_drive() else {
            return PositionStatus::MOTOR_ON | PositionStatus::SEEK_ERROR;
        };

        self.step_outward = outward;
        let head = &mut self.heads[drive];
        *head = if outward {
            head.saturating_sub(1)
        } else {
            (*head + 1).min(LAST_PHYSICAL_TRACK)
        };

        if flags.contains(PositionFlags::UPDATE_TRACK) {
            self.track = if outward {
                self.track.saturating_sub(1)
            } else {
                self.track.wrapping_add(1)
            };
        }

        self.position_status(drive)
    }

    fn read_address(&mut self) -> TransferStatus {
        match self.selected_drive() {
            Some(drive) => {
                // The track number of the ID field lands in the sector register
                self.sector = self.heads[drive];
                TransferStatus::MOTOR_ON
            }
            None => TransferStatus::MOTOR_ON | TransferStatus::RECORD_NOT_FOUND,
        }
    }

    /// Finds the ID field the sector command is looking for
    fn locate(&self) -> Option<(usize, usize)> {
        let drive = self.selected_drive()?;
        let head = self.heads[drive];

        let found = head == self.track
            && head < TRACKS
            && (1..=SECTORS_PER_TRACK).contains(&self.sector);
        found.then(|| (drive, image_offset(self.selected_side(), head, self.sector)))
    }

    /// Checks the DMA chip is set up to move one sector in `direction`
    fn dma_ready(&self, to_controller: bool) -> bool {
        self.dma_mode.contains(DmaMode::WRITE) == to_controller
            && self.sector_count > 0
            && self.buffer.is_some()
            && self.dma_base() == self.buffer_bus_address
    }

    fn read_sector(&mut self, command: FdcCommand) -> TransferStatus {
        let Some((drive, offset)) = self.locate() else {
            return TransferStatus::MOTOR_ON | TransferStatus::RECORD_NOT_FOUND;
        };

        match self.take_fault(command) {
            Some(Fault::RecordNotFound) => {
                return TransferStatus::MOTOR_ON | TransferStatus::RECORD_NOT_FOUND;
            }
            Some(Fault::LostData) => return TransferStatus::MOTOR_ON | TransferStatus::LOST_DATA,
            Some(Fault::CrcError) => return TransferStatus::MOTOR_ON | TransferStatus::CRC_ERROR,
            _ => {}
        }

        if !self.dma_ready(false) {
            self.dma_error = true;
            return TransferStatus::MOTOR_ON | TransferStatus::LOST_DATA;
        }

        if let Some(buffer) = self.buffer {
            let source = &self.disks[drive][offset..offset + SECTOR_SIZE];
            // SAFETY: the driver keeps the buffer borrowed until the command
            // completes
            unsafe { core::ptr::copy_nonoverlapping(source.as_ptr(), buffer, SECTOR_SIZE) };
        }
        self.sector_count -= 1;

        TransferStatus::MOTOR_ON
    }

    fn write_sector(&mut self, command: FdcCommand) -> TransferStatus {
        let Some(drive) = self.selected_drive() else {
            return TransferStatus::MOTOR_ON | TransferStatus::RECORD_NOT_FOUND;
        };
        if self.write_protect[drive] {
            return TransferStatus::MOTOR_ON | TransferStatus::WRITE_PROTECT;
        }

        let Some((drive, offset)) = self.locate() else {
            return TransferStatus::MOTOR_ON | TransferStatus::RECORD_NOT_FOUND;
        };

        match self.take_fault(command) {
            Some(Fault::RecordNotFound) => {
                return TransferStatus::MOTOR_ON | TransferStatus::RECORD_NOT_FOUND;
            }
            Some(Fault::LostData) => return TransferStatus::MOTOR_ON | TransferStatus::LOST_DATA,
            Some(Fault::CrcError) => return TransferStatus::MOTOR_ON | TransferStatus::CRC_ERROR,
            Some(Fault::DmaStall) => return TransferStatus::MOTOR_ON,
            _ => {}
        }

        if !self.dma_ready(true) {
            self.dma_error = true;
            return TransferStatus::MOTOR_ON | TransferStatus::LOST_DATA;
        }

        if let Some(buffer) = self.buffer {
            let target = &mut self.disks[drive][offset..offset + SECTOR_SIZE];
            // SAFETY: the driver keeps the buffer borrowed until the command
            // completes
            unsafe { core::ptr::copy_nonoverlapping(buffer, target.as_mut_ptr(), SECTOR_SIZE) };
        }
        self.sector_count -= 1;

        TransferStatus::MOTOR_ON
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

fn image_offset(side: usize, track: u8, sector: u8) -> usize {
    ((track as usize * SIDES as usize + side) * SECTORS_PER_TRACK as usize + sector as usize - 1)
        * SECTOR_SIZE
}

impl FloppyHardware for SimulatedController {
    fn write_dma_mode(&mut self, mode: DmaMode) {
        // Toggling the direction flushes the FIFO and clears the error state
        if mode.contains(DmaMode::WRITE) != self.dma_mode.contains(DmaMode::WRITE) {
            self.dma_error = false;
        }
        self.dma_mode = mode;
    }

    fn read_dma_status(&mut self) -> DmaStatus {
        let mut status = DmaStatus::empty();
        if !self.dma_error {
            status |= DmaStatus::NO_ERROR;
        }
        if self.sector_count != 0 {
            status |= DmaStatus::SECTOR_COUNT_NONZERO;
        }
        status
    }

    fn write_fdc(&mut self, value: u16) {
        if self.dma_mode.contains(DmaMode::SECTOR_COUNT) {
            self.sector_count = value;
            return;
        }

        let value = value as u8;
        match FdcRegister::from_mode(self.dma_mode) {
            FdcRegister::Command => self.execute(value),
            FdcRegister::Track => self.track = value,
            FdcRegister::Sector => self.sector = value,
            FdcRegister::Data => self.data = value,
        }
    }

    fn read_fdc(&mut self) -> u16 {
        if self.dma_mode.contains(DmaMode::SECTOR_COUNT) {
            return 0;
        }

        let value = match FdcRegister::from_mode(self.dma_mode) {
            FdcRegister::Command => self.read_status(),
            FdcRegister::Track => self.track,
            FdcRegister::Sector => self.sector,
            FdcRegister::Data => self.data,
        };
        value as u16
    }

    fn write_dma_base(&mut self, byte: DmaAddressByte, value: u8) {
        let index = match byte {
            DmaAddressByte::High => 0,
            DmaAddressByte::Mid => 1,
            DmaAddressByte::Low => 2,
        };
        self.dma_base[index] = value;
        self.dma_base_writes.push((byte, value));
    }

    fn select_psg_register(&mut self, register: PsgRegister) {
        self.psg_selected = register as usize;
    }

    fn read_psg(&mut self) -> u8 {
        self.psg[self.psg_selected]
    }

    fn write_psg(&mut self, value: u8) {
        self.psg[self.psg_selected] = value;
    }

    fn dma_address(&mut self, buffer: *mut u8) -> Result<u32, crate::status::DiskError> {
        self.buffer = Some(buffer);
        Ok(self.buffer_bus_address)
    }

    fn idle(&mut self) {
        self.tick();

        if self.irq_pending {
            self.irq_pending = false;
            if let Some(latch) = self.latch {
                completion::service_interrupt(self, latch);
            }
        }
    }
}
