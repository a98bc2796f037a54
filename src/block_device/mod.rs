//! blackbox-sdspi - Block Device support
//!
//! Generic code for handling block devices. This is the contract a
//! filesystem layer consumes; nothing here interprets block contents.

#[cfg(feature = "refcell-blockdevice")]
mod refcell;
#[cfg(feature = "refcell-blockdevice")]
pub use refcell::SharedError;

use core::convert::TryFrom;

mod block;
pub use block::*;

/// Represents a block device - a device which can read and write blocks (or
/// sectors). Only supports devices which are <= 2 TiB in size.
pub trait BlockDevice {
    /// The errors that the `BlockDevice` can return. Must be debug formattable.
    type Error: core::fmt::Debug;
    /// Read one or more blocks, starting at the given block index.
    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error>;
    /// Write one or more blocks, starting at the given block index.
    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error>;
    /// Determine how many blocks this device can hold.
    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error>;

    /// Read a single block.
    fn read_block(&mut self, block_idx: BlockIdx) -> Result<Block, Self::Error> {
        let mut blocks = [Block::new()];
        self.read(&mut blocks, block_idx, "read_block")?;
        let [block] = blocks;
        Ok(block)
    }
}

impl<T> BlockDevice for &mut T
where
    T: BlockDevice,
{
    type Error = T::Error;

    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Self::Error> {
        (*self).read(blocks, start_block_idx, reason)
    }

    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        (*self).write(blocks, start_block_idx)
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        (*self).num_blocks()
    }
}

/// The errors a [`MemoryBlockDevice`] can return.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The requested blocks run past the end of the backing memory.
    OutOfRange {
        /// How many whole blocks the memory holds.
        num_blocks: BlockCount,
    },
}

/// A block device backed by a slice of RAM. Trailing bytes that don't fill a
/// whole block are ignored.
#[derive(Debug)]
pub struct MemoryBlockDevice<'a> {
    memory: &'a mut [u8],
}

impl<'a> MemoryBlockDevice<'a> {
    /// Use `memory` as the device's storage.
    pub fn new(memory: &'a mut [u8]) -> Self {
        Self { memory }
    }

    fn block_count(&self) -> BlockCount {
        BlockCount((self.memory.len() / Block::LEN) as u32)
    }

    fn block_range(
        &self,
        start_block_idx: BlockIdx,
        idx: usize,
    ) -> Result<core::ops::Range<usize>, MemoryError> {
        let num_blocks = self.block_count();
        let block_idx = u32::try_from(idx)
            .ok()
            .and_then(|idx| start_block_idx.offset(idx))
            .filter(|block_idx| block_idx.0 < num_blocks.0)
            .ok_or(MemoryError::OutOfRange { num_blocks })?;
        let start = block_idx.0 as usize * Block::LEN;
        Ok(start..start + Block::LEN)
    }
}

impl<'a> BlockDevice for MemoryBlockDevice<'a> {
    type Error = MemoryError;

    fn read(
        &mut self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        _reason: &str,
    ) -> Result<(), Self::Error> {
        for (idx, block) in blocks.iter_mut().enumerate() {
            let range = self.block_range(start_block_idx, idx)?;
            block.contents.copy_from_slice(&self.memory[range]);
        }

        Ok(())
    }

    fn write(&mut self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Self::Error> {
        for (idx, block) in blocks.iter().enumerate() {
            let range = self.block_range(start_block_idx, idx)?;
            self.memory[range].copy_from_slice(&block.contents);
        }
        Ok(())
    }

    fn num_blocks(&mut self) -> Result<BlockCount, Self::Error> {
        Ok(self.block_count())
    }
}
