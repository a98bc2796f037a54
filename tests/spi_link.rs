use std::cell::{Cell, RefCell};
use std::rc::Rc;

use blackbox_sdspi::{
    ByteLink, ControlCode, DiskError, DriveStatus, SdDisk, SdMmcError, SpiLink,
};
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

/// An SPI bus with nothing on the other end: MISO floats high. Every byte
/// takes one millisecond.
struct FloatingSpi {
    clock: Rc<Cell<u32>>,
    sent: Rc<RefCell<Vec<u8>>>,
    fail: bool,
}

impl Transfer<u8> for FloatingSpi {
    type Error = ();

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], ()> {
        if self.fail {
            return Err(());
        }
        self.clock.set(self.clock.get() + 1);
        self.sent.borrow_mut().extend_from_slice(words);
        for w in words.iter_mut() {
            *w = 0xFF;
        }
        Ok(words)
    }
}

/// A chip select pin that remembers its level.
struct Pin {
    high: Rc<Cell<bool>>,
    fail: bool,
}

impl OutputPin for Pin {
    type Error = ();

    fn set_low(&mut self) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), ()> {
        if self.fail {
            return Err(());
        }
        self.high.set(true);
        Ok(())
    }
}

struct Rig {
    clock: Rc<Cell<u32>>,
    sent: Rc<RefCell<Vec<u8>>>,
    cs_high: Rc<Cell<bool>>,
}

fn rig(spi_fails: bool, pin_fails: bool) -> (Rig, SpiLink<FloatingSpi, Pin, impl Fn() -> u32>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let rig = Rig {
        clock: Rc::new(Cell::new(0)),
        sent: Rc::new(RefCell::new(Vec::new())),
        cs_high: Rc::new(Cell::new(false)),
    };
    let spi = FloatingSpi {
        clock: rig.clock.clone(),
        sent: rig.sent.clone(),
        fail: spi_fails,
    };
    let cs = Pin {
        high: rig.cs_high.clone(),
        fail: pin_fails,
    };
    let clock = rig.clock.clone();
    let link = SpiLink::new(spi, cs, move || clock.get());
    (rig, link)
}

#[test]
fn missing_card_is_reported_quickly() {
    let (rig, link) = rig(false, false);
    let mut disk = SdDisk::new(link);

    let status = disk.initialize();
    assert_eq!(status, DriveStatus::NOINIT | DriveStatus::NODISK);
    assert!(rig.clock.get() < 1000, "took {} ms", rig.clock.get());
    assert!(rig.cs_high.get());

    // Ten idle bytes, a release byte, then the reset command.
    let sent = rig.sent.borrow();
    assert!(sent[..11].iter().all(|&b| b == 0xFF));
    assert_eq!(sent[11..17], [0x40u8, 0x00, 0x00, 0x00, 0x00, 0x95]);
}

#[test]
fn missing_card_refuses_io() {
    let (rig, link) = rig(false, false);
    let mut disk = SdDisk::new(link);
    disk.initialize();
    let bytes_after_init = rig.sent.borrow().len();

    let mut sector = [0u8; 512];
    assert_eq!(disk.read(&mut sector, 0, 1), Err(DiskError::NotReady));
    assert_eq!(disk.write(&sector, 0, 1), Err(DiskError::NotReady));
    assert_eq!(
        disk.control(ControlCode::GetSectorSize as u8),
        Err(DiskError::NotReady)
    );
    assert_eq!(rig.sent.borrow().len(), bytes_after_init);
}

#[test]
fn spi_fault_is_a_transport_error() {
    let (_rig, mut link) = rig(true, false);
    assert_eq!(link.exchange(0xFF), Err(SdMmcError::Transport));

    let mut disk = SdDisk::new(link);
    assert_eq!(disk.initialize(), DriveStatus::NOINIT);
    assert!(!disk.state().initialized);
}

#[test]
fn pin_fault_is_a_gpio_error() {
    let (_rig, mut link) = rig(false, true);
    assert_eq!(link.select(), Err(SdMmcError::GpioError));

    let mut disk = SdDisk::new(link);
    assert_eq!(disk.initialize(), DriveStatus::NOINIT);
}

#[test]
fn link_parts_can_be_recovered() {
    let (rig, link) = rig(false, false);
    let disk = SdDisk::new(link);
    let (_spi, mut cs, clock) = disk.free().free();
    cs.set_low().unwrap();
    assert!(!rig.cs_high.get());
    assert_eq!(clock(), rig.clock.get());
}
