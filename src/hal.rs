//! Interfaces to the board: persistent memory, millisecond clock, USB
//! transports, status LED and reset/watchdog control.
//!
//! The core only talks to hardware through these traits. The firmware binary
//! implements them on top of embassy-rp; tests implement them in memory.

use crate::config::STORE_SIZE;
use crate::mode::{ResetFlags, RestartReason};
use crate::report::KeyboardReport;

// =============================================================================
// Persistent memory
// =============================================================================

/// Byte-addressable persistent memory.
///
/// Addresses handed to `read`/`write` are always below `capacity()`; bounds
/// are enforced by [`crate::storage::Storage`].
pub trait Eeprom {
    fn capacity(&self) -> u16;

    fn read(&self, addr: u16) -> u8;

    fn write(&mut self, addr: u16, value: u8);

    /// Persist buffered writes. Stores that write through need not override.
    fn flush(&mut self) {}
}

/// In-memory store, erased to 0xFF. Counts physical writes so wear
/// behaviour can be observed.
#[derive(Clone)]
pub struct RamEeprom {
    cells: [u8; STORE_SIZE as usize],
    writes: usize,
}

impl RamEeprom {
    pub const fn new() -> Self {
        Self {
            cells: [0xFF; STORE_SIZE as usize],
            writes: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut eeprom = Self::new();
        let n = bytes.len().min(eeprom.cells.len());
        eeprom.cells[..n].copy_from_slice(&bytes[..n]);
        eeprom
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    /// Number of `write` calls that reached the cells.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl Default for RamEeprom {
    fn default() -> Self {
        Self::new()
    }
}

impl Eeprom for RamEeprom {
    fn capacity(&self) -> u16 {
        STORE_SIZE
    }

    fn read(&self, addr: u16) -> u8 {
        self.cells[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.cells[addr as usize] = value;
        self.writes += 1;
    }
}

// =============================================================================
// Time
// =============================================================================

/// Free-running millisecond counter. Wraps; compare with [`Clock::has_elapsed`].
pub trait Clock {
    fn now_ms(&self) -> u32;

    fn has_elapsed(&self, start: u32, duration_ms: u32) -> bool {
        self.now_ms().wrapping_sub(start) >= duration_ms
    }
}

// =============================================================================
// USB transports
// =============================================================================

/// Gives the USB stack a chance to run. Every wait loop in the core calls
/// this on each iteration so the host never sees the device hang.
#[allow(async_fn_in_trait)]
pub trait Poll {
    async fn poll(&mut self);
}

/// Boot keyboard interface used in keyboard mode.
#[allow(async_fn_in_trait)]
pub trait KeyboardTransport: Poll {
    /// The IN endpoint can take another report.
    fn is_ready(&self) -> bool;

    async fn send_report(&mut self, report: &KeyboardReport);

    /// The host has enumerated the device and talked to the HID interface.
    fn is_connected(&self) -> bool;
}

/// Vendor HID interface used in programming mode.
pub trait ProgrammingLink: Poll {
    /// The host has sent at least one request since the link came up.
    fn had_activity(&self) -> bool;

    /// The host issued EXIT.
    fn exit_requested(&self) -> bool;
}

// =============================================================================
// Status LED
// =============================================================================

pub trait StatusLed {
    fn on(&mut self);
    fn off(&mut self);
    fn toggle(&mut self);
}

// =============================================================================
// Reset control
// =============================================================================

/// Reset-cause registers and the watchdog.
pub trait ResetControl {
    /// Primary reset-cause register.
    fn reset_flags(&mut self) -> ResetFlags;

    /// Copy of the reset cause kept somewhere that survives the primary
    /// register being cleared early.
    fn backup_reset_flags(&mut self) -> ResetFlags;

    fn clear_reset_flags(&mut self);

    fn disable_watchdog(&mut self);

    /// Arm a short watchdog timeout. The caller spins until it fires.
    fn arm_restart(&mut self, reason: RestartReason);
}
