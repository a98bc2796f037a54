//! # blackbox-sdspi
//!
//! > An SD/MMC-over-SPI block driver written in Embedded Rust
//!
//! This crate turns a byte-at-a-time SPI link to an SD card into a
//! sector-addressed drive a filesystem layer can sit on. It is `#![no_std]`,
//! does not use `alloc`, and performs exactly one card transaction per
//! sector: no caching, no buffering, no background work. Every wait on the
//! card is bounded, so a missing card shows up as an error, not a hang.
//!
//! ## Layers
//!
//! * [`link`]: the [`ByteLink`] the driver talks through, and [`SpiLink`],
//!   which builds one from `embedded-hal` SPI and pin types.
//! * [`sdmmc`]: the card protocol itself - command framing, the start up
//!   handshake and single block reads and writes.
//! * [`diskio`]: [`SdDisk`], the drive a filesystem calls into, with
//!   `initialize`, `status`, `read`, `write` and `control`.
//! * [`block_device`]: the [`BlockDevice`] trait, implemented by [`SdDisk`].
//!
//! ## Using the crate
//!
//! ```rust,ignore
//! let link = blackbox_sdspi::SpiLink::new(spi, cs, || systick_ms());
//! let mut disk = blackbox_sdspi::SdDisk::new(link);
//! if disk.initialize().is_empty() {
//!     let mut sector = [0u8; 512];
//!     disk.read(&mut sector, 0, 1)?;
//! }
//! ```
//!
//! ## Features
//!
//! * `log` (default): log messages through the `log` crate.
//! * `defmt-log`: By turning off the default features and enabling the
//! `defmt-log` feature you can configure this crate to log messages over
//! defmt instead.
//! * `refcell-blockdevice` (default): implement [`BlockDevice`] for
//! `RefCell`s, so several callers can share one drive.
//!
//! Make sure that either the `log` feature or the `defmt-log` feature is enabled.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

// ****************************************************************************
//
// Imports
//
// ****************************************************************************


pub mod block_device;
pub mod diskio;
pub mod link;
pub mod sdmmc;

pub use crate::block_device::{
    Block, BlockCount, BlockDevice, BlockIdx, MemoryBlockDevice, MemoryError,
};
pub use crate::diskio::{
    ControlCode, ControlResponse, DiskError, DriveState, DriveStatus, SdDisk,
};
pub use crate::link::{ByteLink, SpiLink, TickSource};
pub use crate::sdmmc::Error as SdMmcError;
pub use crate::sdmmc::{AcquireOpts, CardType, SdMmcSpi};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
