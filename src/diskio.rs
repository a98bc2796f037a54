//! blackbox-sdspi - Disk I/O
//!
//! The drive a filesystem layer talks to: initialize, status, sector read and
//! write, and a handful of control queries. The result vocabulary follows the
//! usual FatFs disk I/O layer.

use core::convert::{TryFrom, TryInto};

use crate::link::ByteLink;
use crate::sdmmc::{self, AcquireOpts, CardType, SdMmcSpi};
use crate::{Block, BlockCount, BlockDevice, BlockIdx};

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

bitflags::bitflags! {
    /// Drive status bits. An empty set means the drive is ready.
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct DriveStatus: u8 {
        /// The drive has not been initialized
        const NOINIT = 0x01;
        /// The last initialization found no card
        const NODISK = 0x02;
        /// The medium is write protected. Never set by this driver.
        const PROTECT = 0x04;
    }
}

/// A snapshot of the drive's state.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DriveState {
    /// Whether the last `initialize` succeeded.
    pub initialized: bool,
    /// What kind of card was found. Empty if not initialized.
    pub card_type: CardType,
}

/// Why a disk operation failed.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DiskError {
    /// A hard error occurred talking to the card
    Error,
    /// The medium is write protected (reserved, never returned)
    WriteProtected,
    /// The drive has not been initialized
    NotReady,
    /// Invalid parameter, such as an unknown control code
    Parameter,
}

impl From<sdmmc::Error> for DiskError {
    fn from(e: sdmmc::Error) -> Self {
        match e {
            sdmmc::Error::BadAddress => DiskError::Parameter,
            _ => DiskError::Error,
        }
    }
}

/// The control codes [`SdDisk::control`] understands.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlCode {
    /// Wait for the card to finish any pending write
    Sync = 0,
    /// How many sectors the drive holds
    GetSectorCount = 1,
    /// How big one sector is
    GetSectorSize = 2,
    /// The erase block size, in sectors
    GetBlockSize = 3,
}

impl ControlCode {
    /// Decode a raw control code.
    pub fn from_u8(code: u8) -> Option<ControlCode> {
        match code {
            0 => Some(ControlCode::Sync),
            1 => Some(ControlCode::GetSectorCount),
            2 => Some(ControlCode::GetSectorSize),
            3 => Some(ControlCode::GetBlockSize),
            _ => None,
        }
    }
}

/// What a successful control call hands back.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlResponse {
    /// The operation completed and has nothing to report
    Done,
    /// Total number of sectors
    SectorCount(u32),
    /// Bytes per sector
    SectorSize(u16),
    /// Erase block size in sectors
    BlockSize(u32),
}

/// An SD card, driven over SPI, presented as a sector-addressed drive.
///
/// Every call is synchronous and holds the bus only for its own duration.
/// Hosts with several callers must serialise access, for example by sharing
/// the drive through a `RefCell`.
pub struct SdDisk<L>
where
    L: ByteLink,
{
    sdmmc: SdMmcSpi<L>,
    status: DriveStatus,
}

impl<L> SdDisk<L>
where
    L: ByteLink,
{
    /// Create a drive on the given link, using the default options. The card
    /// is not touched until [`initialize`](Self::initialize).
    pub fn new(link: L) -> Self {
        Self::new_with_options(link, AcquireOpts::default())
    }

    /// Create a drive on the given link with the given options.
    pub fn new_with_options(link: L, options: AcquireOpts) -> Self {
        SdDisk {
            sdmmc: SdMmcSpi::new(link, options),
            status: DriveStatus::NOINIT,
        }
    }

    /// Give back the byte link.
    pub fn free(self) -> L {
        self.sdmmc.free()
    }

    /// Get at the byte link.
    pub fn link(&mut self) -> &mut L {
        self.sdmmc.link()
    }

    /// Bring the card up. Returns the resulting status, which is empty on
    /// success.
    pub fn initialize(&mut self) -> DriveStatus {
        self.status.insert(DriveStatus::NOINIT);
        match self.sdmmc.acquire() {
            Ok(card_type) => {
                debug!("Drive ready, card type {:?}", card_type);
                self.status.remove(DriveStatus::NOINIT | DriveStatus::NODISK);
            }
            Err(sdmmc::Error::CardNotFound) => {
                warn!("No card");
                self.status.insert(DriveStatus::NODISK);
            }
            Err(e) => {
                warn!("Card init failed: {:?}", e);
                self.status.remove(DriveStatus::NODISK);
            }
        }
        self.status
    }

    /// The status left by the last [`initialize`](Self::initialize). No bus
    /// traffic.
    pub fn status(&self) -> DriveStatus {
        self.status
    }

    /// Whether the drive is initialized, and what card it found.
    pub fn state(&self) -> DriveState {
        DriveState {
            initialized: !self.status.contains(DriveStatus::NOINIT),
            card_type: self.sdmmc.card_type(),
        }
    }

    fn check_ready(&self) -> Result<(), DiskError> {
        if self.status.contains(DriveStatus::NOINIT) {
            Err(DiskError::NotReady)
        } else {
            Ok(())
        }
    }

    /// How many bytes of a caller's buffer `count` sectors occupy. The
    /// sectors must all lie below the top of the 32-bit sector space.
    fn transfer_len(buffer_len: usize, start: BlockIdx, count: u32) -> Result<usize, DiskError> {
        if count == 0 {
            return Err(DiskError::Parameter);
        }
        sector_at(start, count as usize - 1)?;
        let len = (count as usize)
            .checked_mul(Block::LEN)
            .ok_or(DiskError::Parameter)?;
        if buffer_len < len {
            return Err(DiskError::Parameter);
        }
        Ok(len)
    }

    /// Read `count` sectors starting at `sector` into `buffer`, 512 bytes
    /// per sector. If any sector fails the whole read fails, and the buffer
    /// contents are unspecified.
    pub fn read(&mut self, buffer: &mut [u8], sector: u32, count: u32) -> Result<(), DiskError> {
        self.check_ready()?;
        let start = BlockIdx(sector);
        let len = Self::transfer_len(buffer.len(), start, count)?;
        for (idx, chunk) in buffer[..len].chunks_exact_mut(Block::LEN).enumerate() {
            let block_idx = sector_at(start, idx)?;
            let chunk: &mut [u8; Block::LEN] =
                chunk.try_into().map_err(|_| DiskError::Parameter)?;
            self.sdmmc.read_block(chunk, block_idx).map_err(|e| {
                warn!("Read of sector {} failed: {:?}", block_idx.0, e);
                DiskError::from(e)
            })?;
        }
        Ok(())
    }

    /// Write `count` sectors from `buffer` starting at `sector`. If any
    /// sector fails the whole write fails; earlier sectors may already have
    /// been written.
    pub fn write(&mut self, buffer: &[u8], sector: u32, count: u32) -> Result<(), DiskError> {
        self.check_ready()?;
        let start = BlockIdx(sector);
        let len = Self::transfer_len(buffer.len(), start, count)?;
        for (idx, chunk) in buffer[..len].chunks_exact(Block::LEN).enumerate() {
            let block_idx = sector_at(start, idx)?;
            let chunk: &[u8; Block::LEN] = chunk.try_into().map_err(|_| DiskError::Parameter)?;
            self.sdmmc.write_block(chunk, block_idx).map_err(|e| {
                warn!("Write of sector {} failed: {:?}", block_idx.0, e);
                DiskError::from(e)
            })?;
        }
        Ok(())
    }

    /// Run a raw control code. See [`ControlCode`] for the ones supported;
    /// anything else is a [`DiskError::Parameter`]. Every code needs an
    /// initialized drive.
    pub fn control(&mut self, code: u8) -> Result<ControlResponse, DiskError> {
        self.check_ready()?;
        let code = ControlCode::from_u8(code).ok_or_else(|| {
            warn!("Unknown control code {}", code);
            DiskError::Parameter
        })?;
        trace!("control {:?}", code);
        match code {
            ControlCode::Sync => {
                self.sdmmc.sync().map_err(|e| {
                    warn!("Sync failed: {:?}", e);
                    DiskError::from(e)
                })?;
                Ok(ControlResponse::Done)
            }
            ControlCode::GetSectorCount => Ok(ControlResponse::SectorCount(
                self.sdmmc.options().sector_count,
            )),
            ControlCode::GetSectorSize => Ok(ControlResponse::SectorSize(Block::LEN as u16)),
            ControlCode::GetBlockSize => Ok(ControlResponse::BlockSize(1)),
        }
    }
}

/// The sector `idx` places after `start`. Runs past the 32-bit sector space
/// are a parameter error.
fn sector_at(start: BlockIdx, idx: usize) -> Result<BlockIdx, DiskError> {
    u32::try_from(idx)
        .ok()
        .and_then(|idx| start.offset(idx))
        .ok_or(DiskError::Parameter)
}

impl<L> BlockDevice for SdDisk<L>
where
    L: ByteLink,
{
    type Error = DiskError;

    /// Read one or more blocks, starting at the given block index.
    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        self.check_ready()?;
        trace!("Reading {} blocks @ {} for {}", blocks.len(), start_block_idx.0, reason);
        if let Some(last) = blocks.len().checked_sub(1) {
            sector_at(start_block_idx, last)?;
        }
        for (idx, block) in blocks.iter_mut().enumerate() {
            self.sdmmc
                .read_block(&mut block.contents, sector_at(start_block_idx, idx)?)?;
        }
        Ok(())
    }

    /// Write one or more blocks, starting at the given block index.
    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        self.check_ready()?;
        if let Some(last) = blocks.len().checked_sub(1) {
            sector_at(start_block_idx, last)?;
        }
        for (idx, block) in blocks.iter().enumerate() {
            self.sdmmc
                .write_block(&block.contents, sector_at(start_block_idx, idx)?)?;
        }
        Ok(())
    }

    /// Determine how many blocks this device can hold.
    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        self.check_ready()?;
        Ok(BlockCount(self.sdmmc.options().sector_count))
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
