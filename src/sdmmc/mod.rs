//! blackbox-sdspi - SDMMC Protocol
//!
//! Implements the SD/MMC protocol on top of a [`ByteLink`].
//!
//! Every wait is bounded by an iteration budget or a millisecond deadline, so
//! an absent or wedged card produces an error instead of a hang. This is
//! currently optimised for readability and debugability, not performance.

mod busy;
pub mod proto;

#[cfg(test)]
mod test;

use busy::SdMmcSpiBusy;
use proto::*;

use crate::link::ByteLink;
use crate::{Block, BlockIdx};

#[cfg(feature = "log")]
use log::{debug, trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{debug, trace, warn};

/// The protocol engine for one SD card on a [`ByteLink`].
pub struct SdMmcSpi<L>
where
    L: ByteLink,
{
    card_type: CardType,
    link: L,
    options: AcquireOpts,
}

/// The possible errors `SdMmcSpi` can generate.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// We got an error from the SPI peripheral
    Transport,
    /// Couldn't set a GPIO pin
    GpioError,
    /// We didn't get a response when waiting for the card to not be busy
    TimeoutWaitNotBusy,
    /// We didn't get a response when executing this command
    TimeoutCommand(u8),
    /// We didn't get a response when executing this application-specific command
    TimeoutACommand(u8),
    /// We didn't get a response when reading data from the card
    TimeoutReadBuffer,
    /// The card stayed busy too long after a block write
    TimeoutWriteBusy,
    /// Couldn't find the card
    CardNotFound,
    /// The card didn't pass the interface condition check
    UnsupportedCard,
    /// The block index has no address on this card
    BadAddress,
    /// Error reading from the card
    ReadError,
    /// Error writing to the card
    WriteError,
}

bitflags::bitflags! {
    /// The kind of card found by the handshake. Empty until a card has been
    /// acquired.
    #[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
    pub struct CardType: u8 {
        /// MultiMediaCard
        const MMC = 0x01;
        /// SD card, version 1.x
        const SD1 = 0x02;
        /// SD card, version 2.x or later
        const SD2 = 0x04;
        /// Card uses block (not byte) addressing
        const BLOCK = 0x08;
    }
}

/// Options for acquiring and driving the card.
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AcquireOpts {
    /// How long a command waits for the card to report ready.
    pub ready_timeout_ms: u32,
    /// How long the card gets to leave the idle state at start up.
    pub init_timeout_ms: u32,
    /// How long the card may stay busy after a block write. `None` waits
    /// forever.
    pub write_busy_timeout_ms: Option<u32>,
    /// What `GET_SECTOR_COUNT` reports. The capacity is not read from the
    /// card.
    pub sector_count: u32,
}

impl Default for AcquireOpts {
    fn default() -> Self {
        AcquireOpts {
            ready_timeout_ms: 500,
            init_timeout_ms: 1000,
            write_busy_timeout_ms: Some(500),
            sector_count: 1_000_000,
        }
    }
}

impl<L> SdMmcSpi<L>
where
    L: ByteLink,
{
    /// Create a new SD/MMC protocol engine on a byte link.
    pub fn new(link: L, options: AcquireOpts) -> Self {
        SdMmcSpi {
            card_type: CardType::empty(),
            link,
            options,
        }
    }

    /// The options this engine was built with.
    pub fn options(&self) -> &AcquireOpts {
        &self.options
    }

    /// The card type found by the last successful [`acquire`](Self::acquire).
    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    /// Give back the byte link.
    pub fn free(self) -> L {
        self.link
    }

    /// Get at the byte link.
    pub fn link(&mut self) -> &mut L {
        &mut self.link
    }

    fn discard_byte(&mut self) -> Result<u8, Error> {
        self.link.exchange(IDLE_BYTE)
    }

    /// Run a command with chip select asserted.
    ///
    /// Chip select is always deasserted, even if an error occured in `f`
    fn with_chip_select<F, R>(&mut self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut SdMmcSpiBusy<L>, &AcquireOpts) -> Result<R, Error>,
    {
        let options = self.options;
        let mut busy = SdMmcSpiBusy::new(&mut self.link)?;
        f(&mut busy, &options)
    }

    /// Initializes the card into a known state.
    ///
    /// The interface condition check (CMD8) must answer idle *and* echo the
    /// check pattern in its trailing R7 bytes. A card that answers idle but
    /// sends no R7 payload, as version 1 cards do, is rejected as
    /// [`Error::UnsupportedCard`].
    ///
    /// On failure the card type is left empty.
    pub fn acquire(&mut self) -> Result<CardType, Error> {
        debug!("acquiring card with opts: {:?}", self.options);
        self.card_type = CardType::empty();

        trace!("Reset card..");
        // Supply minimum of 74 clock cycles without CS asserted.
        self.link.deselect()?;
        for _ in 0..POWER_UP_IDLE_BYTES {
            self.discard_byte()?;
        }

        let card_type = self.with_chip_select(|s, opts| {
            let ready = opts.ready_timeout_ms;

            // Enter SPI mode
            match s.card_command(CMD0, 0, ready) {
                Ok(R1_IDLE_STATE) => {}
                Ok(r) => {
                    warn!("CMD0 got response: {:x}", r);
                    return Err(Error::CardNotFound);
                }
                Err(Error::TimeoutCommand(_)) => return Err(Error::CardNotFound),
                Err(e) => return Err(e),
            }

            // Check card version
            let r = s.card_command(CMD8, CMD8_VOLTAGE_CHECK, ready)?;
            if r != R1_IDLE_STATE {
                warn!("CMD8 got response: {:x}", r);
                return Err(Error::UnsupportedCard);
            }
            s.receive()?;
            s.receive()?;
            s.receive()?;
            let pattern = s.receive()?;
            if pattern != CMD8_CHECK_PATTERN {
                warn!("CMD8 echoed pattern {:x}", pattern);
                return Err(Error::UnsupportedCard);
            }
            let mut card_type = CardType::SD2;

            wait_card_ready(s, opts)?;

            // Find out how the card is addressed. Cards that won't say are
            // treated as high capacity.
            match s.card_command(CMD58, 0, ready) {
                Ok(R1_READY_STATE) => {
                    if (s.receive()? & OCR_CCS) == OCR_CCS {
                        card_type |= CardType::BLOCK;
                    }
                    // Discard other three bytes
                    s.receive()?;
                    s.receive()?;
                    s.receive()?;
                }
                Ok(_) | Err(Error::TimeoutCommand(_)) | Err(Error::TimeoutWaitNotBusy) => {
                    debug!("No OCR, assuming block addressing");
                    card_type |= CardType::BLOCK;
                }
                Err(e) => return Err(e),
            }
            Ok(card_type)
        })?;

        debug!("Card type: {:?}", card_type);
        self.card_type = card_type;
        Ok(card_type)
    }

    /// Turn a block index into a command argument. Byte addressed cards can
    /// only reach the first 4 GiB.
    fn block_address(&self, block_idx: BlockIdx) -> Result<u32, Error> {
        if self.card_type.contains(CardType::BLOCK) {
            Ok(block_idx.0)
        } else {
            block_idx.0.checked_mul(Block::LEN_U32).ok_or_else(|| {
                warn!("Block {} is past the end of a byte addressed card", block_idx.0);
                Error::BadAddress
            })
        }
    }

    /// Read one block. The contents of `buffer` are unspecified on error.
    pub fn read_block(
        &mut self,
        buffer: &mut [u8; Block::LEN],
        block_idx: BlockIdx,
    ) -> Result<(), Error> {
        let address = self.block_address(block_idx)?;
        trace!("read block {}", block_idx.0);
        self.with_chip_select(|s, opts| {
            if s.card_command(CMD17, address, opts.ready_timeout_ms)? != R1_READY_STATE {
                return Err(Error::ReadError);
            }
            s.read_data(buffer)
        })
    }

    /// Write one block.
    pub fn write_block(
        &mut self,
        buffer: &[u8; Block::LEN],
        block_idx: BlockIdx,
    ) -> Result<(), Error> {
        let address = self.block_address(block_idx)?;
        trace!("write block {}", block_idx.0);
        self.with_chip_select(|s, opts| {
            if s.card_command(CMD24, address, opts.ready_timeout_ms)? != R1_READY_STATE {
                return Err(Error::WriteError);
            }
            s.write_data(buffer)?;
            s.wait_write_done(opts.write_busy_timeout_ms)
        })
    }

    /// Wait for the card to finish any internal programming.
    pub fn sync(&mut self) -> Result<(), Error> {
        self.with_chip_select(|s, opts| s.wait_ready(opts.ready_timeout_ms))
    }

    /// Issue a raw command and return its R1 status, with chip select held
    /// only for the command itself.
    pub fn command(&mut self, command: u8, arg: u32) -> Result<u8, Error> {
        self.with_chip_select(|s, opts| s.card_command(command, arg, opts.ready_timeout_ms))
    }
}

/// Send ACMD41 until the card leaves the idle state or the start up deadline
/// passes. Missing answers are retried; bus faults are not.
fn wait_card_ready<L>(s: &mut SdMmcSpiBusy<L>, opts: &AcquireOpts) -> Result<(), Error>
where
    L: ByteLink,
{
    let start = s.tick_ms();
    loop {
        match s.card_acmd(ACMD41, ACMD41_HCS, opts.ready_timeout_ms) {
            Ok(R1_READY_STATE) => return Ok(()),
            Ok(_) | Err(Error::TimeoutCommand(_)) | Err(Error::TimeoutWaitNotBusy) => {}
            Err(e) => return Err(e),
        }
        if s.tick_ms().wrapping_sub(start) >= opts.init_timeout_ms {
            warn!("Card still idle after {} ms", opts.init_timeout_ms);
            return Err(Error::TimeoutACommand(ACMD41));
        }
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
