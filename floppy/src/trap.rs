//! Trap interface to the floppy driver
//!
//! User programs issue a disk request through a trap and later ask for the
//! outcome. The historical interface keeps a single shared status slot, so a
//! second caller can overwrite the first caller's result before it is read.
//! [`TrapBridge::submit`] hands out a [`Ticket`] instead, and
//! [`TrapBridge::collect`] returns the status of that call only. The shared slot
//! is still kept for callers of [`sys_wait_status`].

use core::sync::atomic::{AtomicU32, Ordering};

use conquer_once::spin::OnceCell;
use heapless::Vec;
use spin::{Mutex, RwLock};

use crate::{
    config::DriverConfig,
    drivers::block::floppy::{BusyFlag, FloppyDisk},
    hw::{FloppyHardware, atari::AtariHardware},
    request::{DiskIoRequest, RawDiskIoRequest},
    status::{DiskError, DiskStatus},
};

/// Results kept for tickets that have not been collected yet
pub const TICKET_SLOTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u32);

pub struct TrapBridge<H: FloppyHardware> {
    disk: Mutex<FloppyDisk<H>>,
    busy: BusyFlag,
    last: RwLock<DiskStatus>,
    /// Uncollected results, oldest first
    results: Mutex<Vec<(Ticket, DiskStatus), TICKET_SLOTS>>,
    next_ticket: AtomicU32,
}

impl<H: FloppyHardware> TrapBridge<H> {
    pub fn new(disk: FloppyDisk<H>) -> Self {
        Self {
            busy: disk.busy_flag(),
            disk: Mutex::new(disk),
            last: RwLock::new(DiskStatus::CommandComplete),
            results: Mutex::new(Vec::new()),
            next_ticket: AtomicU32::new(0),
        }
    }

    pub fn disk(&self) -> &Mutex<FloppyDisk<H>> {
        &self.disk
    }

    /// Whether a request is in flight. Does not take the driver lock.
    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    fn post(&self, status: DiskStatus) {
        *self.last.write() = status;
    }

    /// Runs `request` and stores its outcome in the shared slot
    pub fn disk_operation(&self, request: DiskIoRequest<'_>) -> DiskStatus {
        self.post(DiskStatus::Busy);
        let status = self.disk.lock().dispatch(request);
        self.post(status);
        status
    }

    /// Validates a raw request record and runs it. Invalid records are
    /// rejected without touching the hardware.
    ///
    /// # Safety
    ///
    /// The record's buffer address must be null or point to 512 bytes that
    /// stay valid and unaliased for the duration of the call.
    pub unsafe fn raw_disk_operation(&self, raw: &RawDiskIoRequest) -> DiskStatus {
        // SAFETY: forwarded from the caller
        match unsafe { DiskIoRequest::from_raw(raw) } {
            Ok(request) => self.disk_operation(request),
            Err(err) => {
                log::error!("rejected disk request: {err}");
                let status = DiskError::from(err).status();
                self.post(status);
                status
            }
        }
    }

    pub fn last_status(&self) -> DiskStatus {
        *self.last.read()
    }

    /// Calls `yield_now` until the shared slot holds a final status
    pub fn wait_status(&self, mut yield_now: impl FnMut()) -> DiskStatus {
        loop {
            let status = self.last_status();
            if status.is_terminal() {
                return status;
            }
            yield_now();
        }
    }

    /// Runs `request` and keeps its outcome under a fresh ticket. When all
    /// slots are taken the oldest uncollected result is dropped.
    pub fn submit(&self, request: DiskIoRequest<'_>) -> Ticket {
        let ticket = Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let status = self.disk_operation(request);

        let mut results = self.results.lock();
        if results.is_full() {
            let (oldest, _) = results.remove(0);
            log::warn!("dropping uncollected disk result for ticket {}", oldest.0);
        }
        // A slot was freed above
        let _ = results.push((ticket, status));

        ticket
    }

    /// Takes the result of a submitted request. Each ticket can be collected
    /// once.
    pub fn collect(&self, ticket: Ticket) -> Option<DiskStatus> {
        let mut results = self.results.lock();
        let index = results.iter().position(|&(held, _)| held == ticket)?;
        Some(results.remove(index).1)
    }
}

pub type AtariTrapBridge = TrapBridge<&'static mut AtariHardware>;

static TRAP_BRIDGE: OnceCell<AtariTrapBridge> = OnceCell::uninit();

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InstallError {
    #[error("the trap bridge is already installed")]
    AlreadyInstalled,
    #[error("the floppy registers are already in use")]
    HardwareTaken,
}

/// Takes the floppy registers, initializes the controller and makes the trap
/// entry points live. Interrupt driven completion requires `config.wait` to
/// use [`crate::hw::atari::FDC_INTERRUPT`].
pub fn install(config: DriverConfig) -> Result<&'static AtariTrapBridge, InstallError> {
    if TRAP_BRIDGE.is_initialized() {
        return Err(InstallError::AlreadyInstalled);
    }

    let hw = AtariHardware::take().ok_or(InstallError::HardwareTaken)?;
    let mut disk = FloppyDisk::new(hw, config);
    disk.initialize();

    Ok(TRAP_BRIDGE.get_or_init(move || TrapBridge::new(disk)))
}

/// Trap entry for a disk request. Returns the raw [`DiskStatus`] code.
///
/// # Safety
///
/// `request` must be null or point to a valid record whose buffer satisfies
/// [`TrapBridge::raw_disk_operation`].
pub unsafe extern "C" fn sys_disk_operation(request: *const RawDiskIoRequest) -> i32 {
    let Some(bridge) = TRAP_BRIDGE.get() else {
        log::error!("disk request before the floppy driver was installed");
        return DiskStatus::RecordNotFound.as_raw();
    };

    // SAFETY: the caller guarantees the pointer is null or valid
    let Some(raw) = (unsafe { request.as_ref() }) else {
        return DiskStatus::RecordNotFound.as_raw();
    };

    // SAFETY: forwarded from the caller
    unsafe { bridge.raw_disk_operation(raw) }.as_raw()
}

/// Trap entry returning the status of the last request once it is final
pub extern "C" fn sys_wait_status() -> i32 {
    match TRAP_BRIDGE.get() {
        Some(bridge) => bridge.wait_status(core::hint::spin_loop).as_raw(),
        None => DiskStatus::RecordNotFound.as_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::{Drive, SECTOR_SIZE, Sector, Side, Track},
        hw::sim::SimulatedController,
    };

    fn bridge() -> TrapBridge<SimulatedController> {
        TrapBridge::new(FloppyDisk::new(SimulatedController::new(), DriverConfig::new()))
    }

    fn read(buffer: &mut [u8; SECTOR_SIZE], track: u8) -> DiskIoRequest<'_> {
        DiskIoRequest::read(
            Drive::A,
            Side::Zero,
            Track::new(track).unwrap(),
            Sector::new(1).unwrap(),
            buffer,
        )
    }

    #[test]
    fn shared_slot_holds_the_last_result() {
        let bridge = bridge();
        assert_eq!(bridge.last_status(), DiskStatus::CommandComplete);

        let mut buffer = [0u8; SECTOR_SIZE];
        assert_eq!(bridge.disk_operation(read(&mut buffer, 3)), DiskStatus::ReadDone);
        assert_eq!(bridge.last_status(), DiskStatus::ReadDone);
        assert_eq!(bridge.wait_status(|| panic!("status already final")), DiskStatus::ReadDone);
        assert!(!bridge.is_busy());
    }

    #[test]
    fn waiters_yield_until_the_status_is_final() {
        let bridge = bridge();
        bridge.post(DiskStatus::Busy);

        let mut yields = 0;
        let status = bridge.wait_status(|| {
            yields += 1;
            if yields == 3 {
                bridge.post(DiskStatus::WriteDone);
            }
        });

        assert_eq!(status, DiskStatus::WriteDone);
        assert_eq!(yields, 3);
    }

    #[test]
    fn tickets_keep_results_apart() {
        let bridge = bridge();
        bridge
            .disk()
            .lock()
            .hardware_mut()
            .set_write_protect(Drive::A, true);

        let mut buffer = [0u8; SECTOR_SIZE];
        let first = bridge.submit(read(&mut buffer, 1));

        let request = DiskIoRequest::write(
            Drive::A,
            Side::Zero,
            Track::new(1).unwrap(),
            Sector::new(2).unwrap(),
            &mut buffer,
        );
        let second = bridge.submit(request);

        // The shared slot only remembers the second call
        assert_eq!(bridge.last_status(), DiskStatus::WriteProtect);

        assert_eq!(bridge.collect(second), Some(DiskStatus::WriteProtect));
        assert_eq!(bridge.collect(first), Some(DiskStatus::ReadDone));
        assert_eq!(bridge.collect(first), None);
    }

    #[test]
    fn oldest_uncollected_result_is_dropped_when_full() {
        let bridge = bridge();
        let mut buffer = [0u8; SECTOR_SIZE];

        let tickets: heapless::Vec<Ticket, 9> = (0..9)
            .map(|_| bridge.submit(read(&mut buffer, 0)))
            .collect();

        assert_eq!(bridge.collect(tickets[0]), None);
        for &ticket in &tickets[1..] {
            assert_eq!(bridge.collect(ticket), Some(DiskStatus::ReadDone));
        }
    }

    #[test]
    fn eviction_follows_submission_order_across_wraparound() {
        let bridge = bridge();
        bridge.next_ticket.store(u32::MAX - 3, Ordering::Relaxed);
        let mut buffer = [0u8; SECTOR_SIZE];

        let tickets: heapless::Vec<Ticket, 9> = (0..9)
            .map(|_| bridge.submit(read(&mut buffer, 0)))
            .collect();
        assert_eq!(tickets[4], Ticket(0));

        assert_eq!(bridge.collect(tickets[0]), None);
        for &ticket in &tickets[1..] {
            assert_eq!(bridge.collect(ticket), Some(DiskStatus::ReadDone));
        }
    }

    #[test]
    fn invalid_raw_records_are_rejected() {
        let bridge = bridge();
        let mut buffer = [0u8; SECTOR_SIZE];

        let mut raw = RawDiskIoRequest {
            operation: 0,
            disk: 0,
            side: 0,
            track: 2,
            sector: 3,
            buffer_address: buffer.as_mut_ptr(),
            n_sector: 2,
        };
        assert_eq!(
            unsafe { bridge.raw_disk_operation(&raw) },
            DiskStatus::RecordNotFound
        );
        assert!(bridge.disk().lock().hardware().commands().is_empty());

        raw.n_sector = 1;
        assert_eq!(unsafe { bridge.raw_disk_operation(&raw) }, DiskStatus::ReadDone);
    }

    #[test]
    fn traps_before_install_report_record_not_found() {
        assert_eq!(unsafe { sys_disk_operation(core::ptr::null()) }, 4);
        assert_eq!(sys_wait_status(), 4);
    }
}
