//! blackbox-sdspi - Byte link
//!
//! The half-duplex, byte-at-a-time transport the card protocol runs over,
//! plus the millisecond clock used for every deadline.

use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

use crate::sdmmc::Error;

/// A clocked serial link to one card, with its own chip select line.
///
/// Every transfer is a single byte in each direction. To receive, send
/// `0xFF`.
pub trait ByteLink {
    /// Send one byte and receive one byte.
    fn exchange(&mut self, out: u8) -> Result<u8, Error>;
    /// Assert chip select (drive it low).
    fn select(&mut self) -> Result<(), Error>;
    /// Release chip select (drive it high).
    fn deselect(&mut self) -> Result<(), Error>;
    /// A monotonic millisecond counter. Only differences are used, so
    /// wrapping is fine.
    fn tick_ms(&mut self) -> u32;
}

impl<T> ByteLink for &mut T
where
    T: ByteLink,
{
    fn exchange(&mut self, out: u8) -> Result<u8, Error> {
        (*self).exchange(out)
    }

    fn select(&mut self) -> Result<(), Error> {
        (*self).select()
    }

    fn deselect(&mut self) -> Result<(), Error> {
        (*self).deselect()
    }

    fn tick_ms(&mut self) -> u32 {
        (*self).tick_ms()
    }
}

/// Something that can tell the time in milliseconds, like a SysTick counter.
pub trait TickSource {
    /// Milliseconds since some fixed point.
    fn tick_ms(&self) -> u32;
}

impl<F> TickSource for F
where
    F: Fn() -> u32,
{
    fn tick_ms(&self) -> u32 {
        self()
    }
}

/// A [`ByteLink`] built from `embedded-hal` parts.
///
/// We need Chip Select to be separate from the SPI peripheral so we can clock
/// out some bytes without Chip Select asserted (which puts the card into SPI
/// mode).
pub struct SpiLink<SPI, CS, T>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    T: TickSource,
{
    spi: SPI,
    cs: CS,
    ticks: T,
}

impl<SPI, CS, T> SpiLink<SPI, CS, T>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    T: TickSource,
{
    /// Wrap an SPI peripheral, a chip select pin and a millisecond clock.
    ///
    /// The SPI bus should be in mode 0 and clocked at 100-400 kHz until the
    /// card is initialized.
    pub fn new(spi: SPI, cs: CS, ticks: T) -> Self {
        SpiLink { spi, cs, ticks }
    }

    /// Give the parts back.
    pub fn free(self) -> (SPI, CS, T) {
        (self.spi, self.cs, self.ticks)
    }
}

impl<SPI, CS, T> ByteLink for SpiLink<SPI, CS, T>
where
    SPI: Transfer<u8>,
    CS: OutputPin,
    T: TickSource,
{
    fn exchange(&mut self, out: u8) -> Result<u8, Error> {
        self.spi
            .transfer(&mut [out])
            .map(|b| b[0])
            .map_err(|_e| Error::Transport)
    }

    fn select(&mut self) -> Result<(), Error> {
        self.cs.set_low().map_err(|_| Error::GpioError)
    }

    fn deselect(&mut self) -> Result<(), Error> {
        self.cs.set_high().map_err(|_| Error::GpioError)
    }

    fn tick_ms(&mut self) -> u32 {
        self.ticks.tick_ms()
    }
}
