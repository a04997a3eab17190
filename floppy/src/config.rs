use crate::{
    command::StepRate,
    completion::{Timeout, WaitStrategy},
};

/// Tunables of the floppy driver
#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Extra attempts after a CRC error, lost data or an incomplete DMA
    /// transfer
    pub retries: u8,
    pub step_rate: StepRate,
    /// Verify the destination track after seeks and restores
    pub verify_seek: bool,
    /// Ask for the head settle delay on the first transfer after a head move
    pub settle_delay: bool,
    /// Budget for positioning commands, which include the motor spin-up
    pub spin_up_timeout: Timeout,
    /// Budget for sector transfers
    pub command_timeout: Timeout,
    pub wait: WaitStrategy,
}

impl DriverConfig {
    pub const fn new() -> Self {
        Self {
            retries: 3,
            step_rate: StepRate::Ms3,
            verify_seek: true,
            settle_delay: true,
            spin_up_timeout: Timeout::MOTOR_SPIN_UP,
            command_timeout: Timeout::COMMAND,
            wait: WaitStrategy::Poll,
        }
    }

    pub const fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    pub const fn with_wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }

    pub const fn with_timeouts(mut self, spin_up: Timeout, command: Timeout) -> Self {
        self.spin_up_timeout = spin_up;
        self.command_timeout = command;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}
