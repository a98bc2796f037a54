//! Shared access to one block device from several callers.
//!
//! The card bus is half-duplex, so at most one operation may be in flight.
//! A caller that finds the device already borrowed gets
//! [`SharedError::Busy`] instead of a panic.

use core::cell::RefCell;

use super::{Block, BlockCount, BlockDevice, BlockIdx};

/// Errors from a block device shared through a `RefCell`.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SharedError<E> {
    /// Another caller currently holds the device.
    Busy,
    /// The underlying device failed.
    Device(E),
}

fn with_device<T, F, R>(cell: &RefCell<T>, f: F) -> Result<R, SharedError<T::Error>>
where
    T: BlockDevice,
    F: FnOnce(&mut T) -> Result<R, T::Error>,
{
    let mut underlying = cell.try_borrow_mut().map_err(|_| SharedError::Busy)?;
    f(&mut underlying).map_err(SharedError::Device)
}

impl<T> BlockDevice for RefCell<T>
where
    T: BlockDevice,
{
    type Error = SharedError<T::Error>;

    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        // Exclusive access is already proven by `&mut self`.
        self.get_mut()
            .read(blocks, start_block_idx, reason)
            .map_err(SharedError::Device)
    }

    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        self.get_mut()
            .write(blocks, start_block_idx)
            .map_err(SharedError::Device)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        self.get_mut().num_blocks().map_err(SharedError::Device)
    }
}

impl<T> BlockDevice for &RefCell<T>
where
    T: BlockDevice,
{
    type Error = SharedError<T::Error>;

    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        with_device(*self, |bd| bd.read(blocks, start_block_idx, reason))
    }

    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        with_device(*self, |bd| bd.write(blocks, start_block_idx))
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        with_device(*self, |bd| bd.num_blocks())
    }
}
