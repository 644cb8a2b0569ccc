// Store geometry, protocol limits, timings and device identity.

// =============================================================================
// Persistent store layout
// =============================================================================

/// Size of the persistent byte store.
pub const STORE_SIZE: u16 = 512;

/// Script header at offset 0: version(1) flags(1) delay(2) length(2) crc(2).
pub const HEADER_SIZE: u16 = 8;

/// Last store byte is layout-reserved and never receives script data.
pub const RESERVED_TRAILER: u16 = 1;

pub const SCRIPT_START: u16 = HEADER_SIZE;
pub const MAX_SCRIPT_SIZE: u16 = STORE_SIZE - HEADER_SIZE - RESERVED_TRAILER;
pub const RESERVED_ADDR: u16 = STORE_SIZE - RESERVED_TRAILER;

/// Value returned for reads outside the store.
pub const ERASED_BYTE: u8 = 0xFF;

// Header field offsets (multi-byte fields are little-endian).
pub const HEADER_OFFSET_VERSION: u16 = 0;
pub const HEADER_OFFSET_FLAGS: u16 = 1;
pub const HEADER_OFFSET_DELAY: u16 = 2;
pub const HEADER_OFFSET_LENGTH: u16 = 4;
pub const HEADER_OFFSET_CRC: u16 = 6;

/// `format_version` a header must carry to be considered valid.
pub const PAYLOAD_VERSION: u8 = 0x1A;

/// The header stores the initial delay in units of 100 ms.
pub const DELAY_UNIT_MS: u32 = 100;

// =============================================================================
// Programming protocol
// =============================================================================

/// Every vendor HID report is exactly this long.
pub const REPORT_SIZE: usize = 32;

/// Reported by STATUS.
pub const FIRMWARE_VERSION: u8 = 0x01;

const WRITE_OVERHEAD: usize = 5; // cmd(1) + addr(2) + len(2)
const READ_OVERHEAD: usize = 3; // status(1) + bytes_read(2)
const APPEND_OVERHEAD: usize = 3; // cmd(1) + len(2)

pub const MAX_WRITE_DATA: u16 = (REPORT_SIZE - WRITE_OVERHEAD) as u16;
pub const MAX_READ_DATA: u16 = (REPORT_SIZE - READ_OVERHEAD) as u16;
pub const MAX_APPEND_DATA: u16 = (REPORT_SIZE - APPEND_OVERHEAD) as u16;

// =============================================================================
// CRC-16/CCITT-FALSE
// =============================================================================

pub const CRC16_INIT: u16 = 0xFFFF;
pub const CRC16_POLY: u16 = 0x1021;

// =============================================================================
// Keyboard
// =============================================================================

/// Boot protocol keyboard report: modifiers, reserved, six key slots.
pub const KEYBOARD_REPORT_SIZE: usize = 8;
pub const KEYBOARD_MAX_KEYS: usize = 6;

// =============================================================================
// Mode supervisor timings
// =============================================================================

/// Programming mode gives up and reboots into keyboard mode if the host
/// never talks to us within this window.
pub const PROGRAMMING_TIMEOUT_MS: u32 = 5000;

/// Watchdog period armed to force a restart.
pub const RESTART_TIMEOUT_MS: u32 = 15;

/// Blink pattern shown once the keyboard interface is enumerated.
pub const CONNECT_BLINK_COUNT: u8 = 2;
pub const CONNECT_BLINK_ON_MS: u32 = 80;
pub const CONNECT_BLINK_OFF_MS: u32 = 80;

// =============================================================================
// Device identity (firmware binary)
// =============================================================================

pub const USB_VID: u16 = 0x16C0;
pub const USB_PID_PROGRAMMER: u16 = 0x05DF;
pub const USB_PID_KEYBOARD: u16 = 0x27DB;

pub const USB_MANUFACTURER: &str = "tinykb";
pub const USB_PRODUCT_PROGRAMMER: &str = "tinykb programmer";
pub const USB_PRODUCT_KEYBOARD: &str = "tinykb keyboard";

/// HID interrupt endpoint poll interval.
pub const USB_POLL_MS: u8 = 10;

/// Total on-board flash (Pico: 2 MiB).
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

/// Flash erase granularity.
pub const FLASH_SECTOR_SIZE: u32 = 4096;

/// The store lives in the last flash sector (kept out of `memory.x`).
pub const STORE_FLASH_OFFSET: u32 = FLASH_SIZE as u32 - FLASH_SECTOR_SIZE;

/// Watchdog scratch register mirroring the reset cause across a restart.
pub const RESET_SCRATCH_INDEX: usize = 0;

/// Upper half of the scratch value; tells a real mirror apart from leftovers.
pub const RESET_SCRATCH_MAGIC: u32 = 0x7B5C_0000;
