//! Waiting for controller commands to finish
//!
//! A command completes either by polling the status register until the busy
//! bit drops or by the controller interrupt posting its status into a
//! [`CompletionLatch`]. Both paths are bounded by a [`Timeout`] except for the
//! wait after a force interrupt, which the controller always honours.

use core::{
    future::Future,
    pin::Pin,
    sync::atomic::{AtomicU16, Ordering},
    task::{Context, Poll},
};

use futures_util::task::AtomicWaker;

use crate::{
    command::{self, FdcCommand},
    dma::DmaDirection,
    hw::FloppyHardware,
    status::{DiskError, FdcStatus},
};

/// Wait budget, counted in status polls or idle cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(u32);

impl Timeout {
    /// Positioning commands may have to wait for the motor to spin up first
    pub const MOTOR_SPIN_UP: Self = Self(1_000_000);
    pub const COMMAND: Self = Self(15_000);

    pub const fn cycles(self) -> u32 {
        self.0
    }

    pub const fn from_cycles(cycles: u32) -> Self {
        Self(cycles)
    }

    pub const fn from_millis(millis: u32, clock: ClockSpeed) -> Self {
        Self(millis.saturating_mul(clock.loops_per_millisecond()))
    }
}

/// CPU clock, used to calibrate delay loops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSpeed {
    Mhz8,
    Mhz16,
}

impl ClockSpeed {
    pub const fn loops_per_millisecond(self) -> u32 {
        match self {
            Self::Mhz8 => 320,
            Self::Mhz16 => 760,
        }
    }
}

/// Progress of the command currently owned by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Idle,
    CommandIssued,
    Polling,
    InterruptPending,
    Complete,
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
pub enum WaitStrategy {
    /// Read the status register until the busy bit clears
    Poll,
    /// Wait for the interrupt handler to post the status into the latch
    Interrupt(&'static CompletionLatch),
}

const POSTED: u16 = 1 << 8;

/// Single slot hand-off from the controller interrupt to the driver. Holds the
/// status byte read by the handler, which acknowledged the interrupt with that
/// same read.
#[derive(Debug)]
pub struct CompletionLatch {
    status: AtomicU16,
    waker: AtomicWaker,
}

impl CompletionLatch {
    pub const fn new() -> Self {
        Self {
            status: AtomicU16::new(0),
            waker: AtomicWaker::new(),
        }
    }

    /// Drops any stale status. Must happen before the command is written.
    pub fn arm(&self) {
        self.status.store(0, Ordering::SeqCst);
    }

    /// Called from interrupt context
    pub fn post(&self, status: u8) {
        self.status.store(POSTED | status as u16, Ordering::Release);
        self.waker.wake();
    }

    pub fn take(&self) -> Option<u8> {
        let value = self.status.swap(0, Ordering::AcqRel);
        (value & POSTED != 0).then_some(value as u8)
    }

    pub fn is_posted(&self) -> bool {
        self.status.load(Ordering::Acquire) & POSTED != 0
    }

    /// Resolves with the next posted status
    pub fn wait(&self) -> LatchWait<'_> {
        LatchWait { latch: self }
    }
}

impl Default for CompletionLatch {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LatchWait<'a> {
    latch: &'a CompletionLatch,
}

impl Future for LatchWait<'_> {
    type Output = u8;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<u8> {
        // Fast path
        if let Some(status) = self.latch.take() {
            return Poll::Ready(status);
        }

        self.latch.waker.register(cx.waker());
        match self.latch.take() {
            Some(status) => {
                self.latch.waker.take();
                Poll::Ready(status)
            }
            None => Poll::Pending,
        }
    }
}

fn read_status<H: FloppyHardware + ?Sized>(hw: &mut H) -> u8 {
    (hw.read_fdc() & 0xFF) as u8
}

/// Spins until the busy bit clears, without a bound. Only used after a force
/// interrupt. Expects the window on the command register.
pub fn busy_wait<H: FloppyHardware + ?Sized>(hw: &mut H) -> u8 {
    loop {
        let status = read_status(hw);
        if status & 0x01 == 0 {
            return status;
        }
    }
}

/// Reads the status register at most `timeout` times until the busy bit
/// clears. Expects the window on the command register.
pub fn busy_wait_with_timeout<H: FloppyHardware + ?Sized>(
    hw: &mut H,
    timeout: Timeout,
) -> Result<u8, DiskError> {
    for _ in 0..timeout.cycles() {
        let status = read_status(hw);
        if status & 0x01 == 0 {
            return Ok(status);
        }
    }

    Err(DiskError::Timeout(timeout.cycles()))
}

/// Body of the controller interrupt handler. Reading the status acknowledges
/// the interrupt, so it is read exactly once here and handed to the latch.
pub fn service_interrupt<H: FloppyHardware + ?Sized>(hw: &mut H, latch: &CompletionLatch) {
    let status = read_status(hw);
    latch.post(status);
}

/// A command written to the controller whose completion has not been observed
/// yet
#[derive(Debug)]
#[must_use]
pub struct PendingCommand {
    command: FdcCommand,
    strategy: WaitStrategy,
}

impl PendingCommand {
    /// Arms the latch (for interrupt completion) and writes the command
    pub fn issue<H: FloppyHardware + ?Sized>(
        hw: &mut H,
        direction: DmaDirection,
        command: FdcCommand,
        strategy: WaitStrategy,
        state: &mut CommandState,
    ) -> Self {
        if let WaitStrategy::Interrupt(latch) = strategy {
            latch.arm();
        }

        command::send_command(hw, direction, command);
        *state = CommandState::CommandIssued;

        Self { command, strategy }
    }

    pub fn command(&self) -> FdcCommand {
        self.command
    }

    pub fn wait<H: FloppyHardware + ?Sized>(
        self,
        hw: &mut H,
        timeout: Timeout,
        state: &mut CommandState,
    ) -> Result<FdcStatus, DiskError> {
        let result = match self.strategy {
            WaitStrategy::Poll => {
                *state = CommandState::Polling;
                busy_wait_with_timeout(hw, timeout)
            }
            WaitStrategy::Interrupt(latch) => {
                *state = CommandState::InterruptPending;
                wait_for_latch(hw, latch, timeout)
            }
        };

        match result {
            Ok(raw) => {
                *state = CommandState::Complete;
                Ok(FdcStatus::decode(self.command.kind(), raw))
            }
            Err(err) => {
                log::warn!(
                    "fdc command {:#04x} did not complete: {}",
                    self.command.byte(),
                    err
                );
                *state = CommandState::TimedOut;
                Err(err)
            }
        }
    }
}

fn wait_for_latch<H: FloppyHardware + ?Sized>(
    hw: &mut H,
    latch: &CompletionLatch,
    timeout: Timeout,
) -> Result<u8, DiskError> {
    for _ in 0..timeout.cycles() {
        if let Some(status) = latch.take() {
            return Ok(status);
        }
        hw.idle();
    }

    latch.take().ok_or(DiskError::Timeout(timeout.cycles()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::{PositionFlags, StepRate},
        hw::sim::SimulatedController,
    };
    use futures_util::task::noop_waker_ref;

    #[test]
    fn calibrated_timeouts() {
        assert_eq!(Timeout::from_millis(1, ClockSpeed::Mhz8).cycles(), 320);
        assert_eq!(Timeout::from_millis(10, ClockSpeed::Mhz16).cycles(), 7600);
        assert_eq!(Timeout::from_millis(u32::MAX, ClockSpeed::Mhz16).cycles(), u32::MAX);
    }

    #[test]
    fn hung_controller_exhausts_the_budget_exactly() {
        let mut hw = SimulatedController::new();
        hw.hang();

        command::send_command(
            &mut hw,
            DmaDirection::FromController,
            FdcCommand::Restore(PositionFlags::empty(), StepRate::Ms3),
        );
        let before = hw.status_reads();

        assert_eq!(
            busy_wait_with_timeout(&mut hw, Timeout::from_cycles(250)),
            Err(DiskError::Timeout(250))
        );
        assert_eq!(hw.status_reads() - before, 250);
    }

    #[test]
    fn latch_hands_over_one_status() {
        let latch = CompletionLatch::new();
        assert_eq!(latch.take(), None);

        latch.post(0x04);
        assert!(latch.is_posted());
        assert_eq!(latch.take(), Some(0x04));
        assert_eq!(latch.take(), None);

        latch.post(0x80);
        latch.arm();
        assert_eq!(latch.take(), None);
    }

    #[test]
    fn latch_future_resolves_once_posted() {
        let latch = CompletionLatch::new();
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut wait = latch.wait();

        assert!(Pin::new(&mut wait).poll(&mut cx).is_pending());

        latch.post(0x20);
        assert_eq!(Pin::new(&mut wait).poll(&mut cx), Poll::Ready(0x20));
    }

    #[test]
    fn polled_command_walks_through_its_states() {
        let mut hw = SimulatedController::new().with_latency(5);
        let mut state = CommandState::Idle;

        let pending = PendingCommand::issue(
            &mut hw,
            DmaDirection::FromController,
            FdcCommand::Restore(PositionFlags::empty(), StepRate::Ms3),
            WaitStrategy::Poll,
            &mut state,
        );
        assert_eq!(state, CommandState::CommandIssued);

        let status = pending.wait(&mut hw, Timeout::COMMAND, &mut state).unwrap();
        assert_eq!(state, CommandState::Complete);
        assert!(matches!(status, FdcStatus::Positioning(_)));
        assert!(!status.is_busy());
    }

    #[test]
    fn interrupt_completion_reads_the_status_once() {
        static LATCH: CompletionLatch = CompletionLatch::new();

        let mut hw = SimulatedController::new().with_latency(5);
        hw.attach_interrupt(&LATCH);
        let mut state = CommandState::Idle;

        let pending = PendingCommand::issue(
            &mut hw,
            DmaDirection::FromController,
            FdcCommand::Restore(PositionFlags::empty(), StepRate::Ms3),
            WaitStrategy::Interrupt(&LATCH),
            &mut state,
        );
        let before = hw.status_reads();
        pending.wait(&mut hw, Timeout::COMMAND, &mut state).unwrap();

        assert_eq!(state, CommandState::Complete);
        assert_eq!(hw.status_reads() - before, 1);
    }
}
