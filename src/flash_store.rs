/// Script store on the last sector of the on-board QSPI flash.
///
/// Flash cannot be rewritten byte by byte, so the store keeps a RAM image
/// of the whole region. Writes only touch the image; `flush` erases the
/// sector and programs the image back when anything changed.
use defmt::*;
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::peripherals::FLASH;

use tinykb::config::{ERASED_BYTE, FLASH_SECTOR_SIZE, FLASH_SIZE, STORE_FLASH_OFFSET, STORE_SIZE};
use tinykb::hal::Eeprom;

pub type OnboardFlash<'d> = Flash<'d, FLASH, Blocking, FLASH_SIZE>;

pub struct FlashEeprom<'d> {
    flash: OnboardFlash<'d>,
    image: [u8; STORE_SIZE as usize],
    dirty: bool,
}

impl<'d> FlashEeprom<'d> {
    /// Load the image. A read failure leaves it erased, which the store
    /// treats as "no script".
    pub fn new(mut flash: OnboardFlash<'d>) -> Self {
        let mut image = [ERASED_BYTE; STORE_SIZE as usize];
        if let Err(e) = flash.blocking_read(STORE_FLASH_OFFSET, &mut image) {
            error!("flash: read at 0x{:08x} failed: {}", STORE_FLASH_OFFSET, e);
            image.fill(ERASED_BYTE);
        }
        Self {
            flash,
            image,
            dirty: false,
        }
    }
}

impl Eeprom for FlashEeprom<'_> {
    fn capacity(&self) -> u16 {
        STORE_SIZE
    }

    fn read(&self, addr: u16) -> u8 {
        self.image[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.image[addr as usize] = value;
        self.dirty = true;
    }

    fn flush(&mut self) {
        if !self.dirty {
            return;
        }

        let end = STORE_FLASH_OFFSET + FLASH_SECTOR_SIZE;
        if let Err(e) = self.flash.blocking_erase(STORE_FLASH_OFFSET, end) {
            error!("flash: erase failed: {}", e);
            return;
        }
        if let Err(e) = self.flash.blocking_write(STORE_FLASH_OFFSET, &self.image) {
            error!("flash: program failed: {}", e);
            return;
        }

        self.dirty = false;
        debug!("flash: store persisted ({} bytes)", STORE_SIZE);
    }
}
