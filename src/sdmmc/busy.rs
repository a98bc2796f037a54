use super::proto::*;
use super::Error;
use crate::link::ByteLink;

#[cfg(feature = "log")]
use log::{trace, warn};

#[cfg(feature = "defmt-log")]
use defmt::{trace, warn};

/// A struct used to ensure that communication only occurs
/// when CS is low.
///
/// Chip select is asserted when this is created and released (followed by
/// one idle byte so the card lets go of its data line) when it is dropped,
/// whichever way the operation ends.
pub struct SdMmcSpiBusy<'link, L>
where
    L: ByteLink,
{
    link: &'link mut L,
}

impl<'link, L> Drop for SdMmcSpiBusy<'link, L>
where
    L: ByteLink,
{
    fn drop(&mut self) {
        self.release().ok();
    }
}

impl<'link, L> SdMmcSpiBusy<'link, L>
where
    L: ByteLink,
{
    pub fn new(link: &'link mut L) -> Result<Self, Error> {
        let mut me = Self { link };
        me.link.select()?;
        Ok(me)
    }

    fn release(&mut self) -> Result<(), Error> {
        self.link.deselect()?;
        self.receive()?;
        Ok(())
    }

    /// Release then re-assert chip select, giving the card a clean frame
    /// boundary.
    fn reselect(&mut self) -> Result<(), Error> {
        self.release()?;
        self.link.select()
    }

    /// Receive a byte from the SD card by clocking in an 0xFF byte.
    pub fn receive(&mut self) -> Result<u8, Error> {
        self.link.exchange(IDLE_BYTE)
    }

    /// Send a byte to the SD card.
    pub fn send(&mut self, out: u8) -> Result<(), Error> {
        let _ = self.link.exchange(out)?;
        Ok(())
    }

    /// The link's millisecond clock.
    pub fn tick_ms(&mut self) -> u32 {
        self.link.tick_ms()
    }

    /// Milliseconds since `start`.
    fn elapsed_ms(&mut self, start: u32) -> u32 {
        self.tick_ms().wrapping_sub(start)
    }

    /// Spin until the card returns 0xFF, or `timeout_ms` passes.
    pub fn wait_ready(&mut self, timeout_ms: u32) -> Result<(), Error> {
        let start = self.tick_ms();
        loop {
            if self.receive()? == IDLE_BYTE {
                return Ok(());
            }
            if self.elapsed_ms(start) >= timeout_ms {
                return Err(Error::TimeoutWaitNotBusy);
            }
        }
    }

    /// Perform a command.
    ///
    /// Returns the R1 status byte. Every command but CMD0 waits for the card
    /// to be ready first; a card that hasn't switched to SPI mode yet can't
    /// answer that probe.
    pub fn card_command(
        &mut self,
        command: u8,
        arg: u32,
        ready_timeout_ms: u32,
    ) -> Result<u8, Error> {
        self.reselect()?;
        if command != CMD0 {
            self.wait_ready(ready_timeout_ms)?;
        }

        trace!("CMD{} arg={:x}", command, arg);
        for b in command_frame(command, arg).iter() {
            self.send(*b)?;
        }

        // skip stuff byte for stop read
        if command == CMD12 {
            let _result = self.receive()?;
        }

        for _ in 0..COMMAND_POLL_LIMIT {
            let result = self.receive()?;
            if (result & R1_NO_RESPONSE) == 0 {
                return Ok(result);
            }
        }

        Err(Error::TimeoutCommand(command))
    }

    /// Perform an application-specific command.
    ///
    /// If the CMD55 prefix comes back with anything worse than "idle", that
    /// status is returned and `command` is never sent.
    pub fn card_acmd(
        &mut self,
        command: u8,
        arg: u32,
        ready_timeout_ms: u32,
    ) -> Result<u8, Error> {
        let prefix = self.card_command(CMD55, 0, ready_timeout_ms)?;
        if prefix > R1_IDLE_STATE {
            warn!("CMD55 refused: {:x}", prefix);
            return Ok(prefix);
        }
        self.card_command(command, arg, ready_timeout_ms)
    }

    /// Read a data block from the card into `buffer`. Always fills the given
    /// buffer when it succeeds, so make sure it's the right size.
    pub fn read_data(&mut self, buffer: &mut [u8]) -> Result<(), Error> {
        // Get first non-FF byte.
        let mut token = IDLE_BYTE;
        for _ in 0..READ_TOKEN_POLL_LIMIT {
            token = self.receive()?;
            if token != IDLE_BYTE {
                break;
            }
        }
        if token == IDLE_BYTE {
            return Err(Error::TimeoutReadBuffer);
        }
        if token != DATA_START_BLOCK {
            warn!("Bad read token: {:x}", token);
            return Err(Error::ReadError);
        }

        for b in buffer.iter_mut() {
            *b = self.receive()?;
        }

        // CRC checking is off; throw it away.
        self.receive()?;
        self.receive()?;
        Ok(())
    }

    /// Write a data block to the card and check the data response.
    pub fn write_data(&mut self, buffer: &[u8]) -> Result<(), Error> {
        self.send(IDLE_BYTE)?;
        self.send(DATA_START_BLOCK)?;
        for &b in buffer.iter() {
            self.send(b)?;
        }
        self.send(IDLE_BYTE)?;
        self.send(IDLE_BYTE)?;

        let status = self.receive()?;
        if (status & DATA_RES_MASK) != DATA_RES_ACCEPTED {
            warn!("Data rejected: {:x}", status);
            Err(Error::WriteError)
        } else {
            Ok(())
        }
    }

    /// Spin while the card holds the bus at 0x00 programming flash.
    ///
    /// With no timeout this waits as long as the card takes.
    pub fn wait_write_done(&mut self, timeout_ms: Option<u32>) -> Result<(), Error> {
        let start = self.tick_ms();
        while self.receive()? == BUSY_BYTE {
            if let Some(timeout_ms) = timeout_ms {
                if self.elapsed_ms(start) >= timeout_ms {
                    return Err(Error::TimeoutWriteBusy);
                }
            }
        }
        Ok(())
    }
}
