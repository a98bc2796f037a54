/// A standard 512 byte block (also known as a sector). IBM PC formatted 5.25"
/// and 3.5" floppy disks, SD/MMC cards up to 1 TiB in size, and the SD/MMC SPI
/// protocol all use 512 byte blocks.
#[derive(Clone)]
pub struct Block {
    /// The 512 bytes in this block (or sector).
    pub contents: [u8; Block::LEN],
}

impl Block {
    /// All our blocks are a fixed length of 512 bytes.
    pub const LEN: usize = 512;

    /// Sometimes we want `LEN` as a `u32` and the casts don't look nice.
    pub const LEN_U32: u32 = 512;

    /// Create a new block full of zeros.
    pub fn new() -> Block {
        Block {
            contents: [0u8; Self::LEN],
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for Block {
    type Target = [u8; 512];
    fn deref(&self) -> &[u8; 512] {
        &self.contents
    }
}

impl core::ops::DerefMut for Block {
    fn deref_mut(&mut self) -> &mut [u8; 512] {
        &mut self.contents
    }
}

impl core::fmt::Debug for Block {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        writeln!(fmt, "Block:")?;
        for line in self.contents.chunks(32) {
            for b in line {
                write!(fmt, "{:02x}", b)?;
            }
            writeln!(fmt)?;
        }
        Ok(())
    }
}

/// The linear numeric address of a block (or sector). The first block on a
/// disk gets `BlockIdx(0)` (which usually contains the Master Boot Record).
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockIdx(pub u32);

impl BlockIdx {
    /// The block `count` blocks after this one, or `None` if that is past
    /// the top of the 32-bit address space.
    pub fn offset(self, count: u32) -> Option<BlockIdx> {
        self.0.checked_add(count).map(BlockIdx)
    }
}

/// A number of blocks (or sectors).
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BlockCount(pub u32);

impl BlockCount {
    /// How many bytes the blocks occupy.
    pub fn bytes(self) -> u64 {
        u64::from(self.0) * u64::from(Block::LEN_U32)
    }
}
