//! Atari ST floppy disk driver for the WD1772 controller and its DMA chip
//!
//! The driver turns a [`DiskIoRequest`] into the register traffic needed to
//! select a drive, position the head and move one 512 byte sector between the
//! disk and a caller owned buffer. All hardware access goes through the
//! [`FloppyHardware`] trait so the same state machine runs against the real
//! memory mapped registers or against the [`hw::sim`] controller in tests.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod command;
pub mod completion;
pub mod config;
pub mod device;
pub mod dma;
pub mod drivers;
pub mod geometry;
pub mod hw;
pub mod psg;
pub mod regs;
pub mod request;
pub mod status;
pub mod trap;

pub use config::DriverConfig;
pub use drivers::block::{
    floppy::{BusyFlag, FloppyDisk, HeadPosition},
    volume::FloppyVolume,
};
pub use geometry::{Drive, SECTOR_SIZE, Sector, SectorBuffer, Side, Track};
pub use hw::FloppyHardware;
pub use request::{DiskIoRequest, DiskOperation, RawDiskIoRequest, RequestError};
pub use status::{DiskError, DiskStatus};
pub use trap::{Ticket, TrapBridge};
