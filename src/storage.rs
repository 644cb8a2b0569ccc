//! Persistent script store.
//!
//! Layout (little-endian multi-byte fields):
//!
//! ```text
//! 0x000  format_version (1)
//! 0x001  flags          (1)
//! 0x002  initial_delay  (2)  units of 100 ms
//! 0x004  script_length  (2)  0 = no script
//! 0x006  checksum       (2)  CRC-16 over the script bytes
//! 0x008  script bytes   (up to MAX_SCRIPT_SIZE)
//! 0x1FF  reserved
//! ```
//!
//! Accesses never fail: reads outside the store return 0xFF and writes
//! outside it are dropped. Writes that would not change a cell are skipped
//! to spare the medium.

use crate::config::*;
use crate::crc16;
use crate::hal::Eeprom;

/// Decoded script header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    pub version: u8,
    pub flags: u8,
    /// Initial delay in header units (see [`DELAY_UNIT_MS`]).
    pub delay: u16,
    pub length: u16,
    pub checksum: u16,
}

impl Header {
    pub const fn new(version: u8, flags: u8, delay: u16, length: u16, checksum: u16) -> Self {
        Self {
            version,
            flags,
            delay,
            length,
            checksum,
        }
    }

    pub fn decode(raw: &[u8; HEADER_SIZE as usize]) -> Self {
        Self {
            version: raw[HEADER_OFFSET_VERSION as usize],
            flags: raw[HEADER_OFFSET_FLAGS as usize],
            delay: le16(raw, HEADER_OFFSET_DELAY),
            length: le16(raw, HEADER_OFFSET_LENGTH),
            checksum: le16(raw, HEADER_OFFSET_CRC),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut raw = [0u8; HEADER_SIZE as usize];
        raw[HEADER_OFFSET_VERSION as usize] = self.version;
        raw[HEADER_OFFSET_FLAGS as usize] = self.flags;
        put_le16(&mut raw, HEADER_OFFSET_DELAY, self.delay);
        put_le16(&mut raw, HEADER_OFFSET_LENGTH, self.length);
        put_le16(&mut raw, HEADER_OFFSET_CRC, self.checksum);
        raw
    }

    /// A header references a replayable script.
    pub fn is_valid(&self) -> bool {
        self.version == PAYLOAD_VERSION && self.length > 0 && self.length <= MAX_SCRIPT_SIZE
    }
}

fn le16(raw: &[u8], offset: u16) -> u16 {
    let i = offset as usize;
    u16::from_le_bytes([raw[i], raw[i + 1]])
}

fn put_le16(raw: &mut [u8], offset: u16, value: u16) {
    let i = offset as usize;
    raw[i..i + 2].copy_from_slice(&value.to_le_bytes());
}

/// Volatile copy of the header. Only meaningful while `valid`.
#[derive(Clone, Copy, Debug, Default)]
struct HeaderCache {
    header: Header,
    valid: bool,
}

impl HeaderCache {
    fn load(header: Header) -> Self {
        Self {
            valid: header.is_valid(),
            header,
        }
    }
}

/// Owner of the persistent store and its validity cache.
pub struct Storage<E> {
    eeprom: E,
    cache: HeaderCache,
}

impl<E: Eeprom> Storage<E> {
    /// Take ownership of the medium and read the header.
    pub fn new(eeprom: E) -> Self {
        let mut storage = Self {
            eeprom,
            cache: HeaderCache::default(),
        };
        storage.init();
        storage
    }

    /// Re-read and validate the header. An empty or foreign store is simply
    /// marked invalid.
    pub fn init(&mut self) {
        let mut raw = [0u8; HEADER_SIZE as usize];
        self.read_block(0, &mut raw);
        self.cache = HeaderCache::load(Header::decode(&raw));

        if self.cache.valid {
            debug!("storage: valid script, {=u16} bytes", self.cache.header.length);
        } else {
            debug!("storage: no valid script");
        }
    }

    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    pub fn into_inner(self) -> E {
        self.eeprom
    }

    // =========================================================================
    // Byte and block access
    // =========================================================================

    pub fn read_byte(&self, addr: u16) -> u8 {
        if addr >= self.size() {
            return ERASED_BYTE;
        }
        self.eeprom.read(addr)
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        if addr >= self.size() {
            return;
        }
        if self.eeprom.read(addr) != value {
            self.eeprom.write(addr, value);
        }
    }

    pub fn read_block(&self, addr: u16, buf: &mut [u8]) {
        for (i, slot) in buf.iter_mut().enumerate() {
            *slot = match offset_addr(addr, i) {
                Some(a) => self.read_byte(a),
                None => ERASED_BYTE,
            };
        }
    }

    pub fn write_block(&mut self, addr: u16, data: &[u8]) {
        for (i, &value) in data.iter().enumerate() {
            if let Some(a) = offset_addr(addr, i) {
                self.write_byte(a, value);
            }
        }
    }

    /// Persist any buffered writes.
    pub fn flush(&mut self) {
        self.eeprom.flush();
    }

    fn size(&self) -> u16 {
        self.eeprom.capacity().min(STORE_SIZE)
    }

    // =========================================================================
    // Header operations
    // =========================================================================

    /// Write all five header fields and refresh the cache.
    pub fn commit_header(&mut self, version: u8, flags: u8, delay: u16, length: u16, checksum: u16) {
        let header = Header::new(version, flags, delay, length, checksum);
        self.write_block(0, &header.encode());
        self.cache = HeaderCache::load(header);

        info!(
            "storage: header committed, version=0x{:02x} length={=u16} valid={=bool}",
            version, length, self.cache.valid
        );
    }

    /// Drop the script reference. Script bytes stay where they are.
    pub fn invalidate(&mut self) {
        let zero = 0u16.to_le_bytes();
        self.write_block(HEADER_OFFSET_LENGTH, &zero);
        self.cache.header.length = 0;
        self.cache.valid = false;
    }

    // =========================================================================
    // Script metadata
    // =========================================================================

    pub fn has_valid_script(&self) -> bool {
        self.cache.valid
    }

    pub fn header(&self) -> Header {
        self.cache.header
    }

    pub fn script_length(&self) -> u16 {
        if self.cache.valid {
            self.cache.header.length
        } else {
            0
        }
    }

    pub fn flags(&self) -> u8 {
        if self.cache.valid {
            self.cache.header.flags
        } else {
            0
        }
    }

    /// Initial delay in milliseconds.
    pub fn initial_delay(&self) -> u32 {
        if self.cache.valid {
            u32::from(self.cache.header.delay) * DELAY_UNIT_MS
        } else {
            0
        }
    }

    /// Byte `offset` of the script region.
    pub fn script_byte(&self, offset: u16) -> u8 {
        match SCRIPT_START.checked_add(offset) {
            Some(addr) => self.read_byte(addr),
            None => ERASED_BYTE,
        }
    }

    /// CRC-16 over the first `length` script bytes.
    pub fn script_checksum(&self, length: u16) -> u16 {
        let crc = (0..length).fold(crc16::init(), |crc, i| crc16::update(crc, self.script_byte(i)));
        crc16::finalize(crc)
    }

    /// Recompute the checksum over `length` script bytes and compare.
    pub fn verify_checksum(&self, length: u16, expected: u16) -> bool {
        if length == 0 || length > MAX_SCRIPT_SIZE {
            return false;
        }
        self.script_checksum(length) == expected
    }
}

fn offset_addr(base: u16, i: usize) -> Option<u16> {
    u16::try_from(i).ok().and_then(|i| base.checked_add(i))
}
