//! HID report formats.
//!
//! Keyboard report (boot protocol, 8 bytes):
//!
//! ```text
//! Byte 0:   modifier bitfield
//! Byte 1:   reserved (0x00)
//! Byte 2-7: up to six pressed key codes
//! ```

use crate::config::{KEYBOARD_MAX_KEYS, KEYBOARD_REPORT_SIZE};

// =============================================================================
// Held keys
// =============================================================================

/// Unordered set of up to six distinct key codes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeySet {
    keys: [u8; KEYBOARD_MAX_KEYS],
    len: u8,
}

impl KeySet {
    pub const fn new() -> Self {
        Self {
            keys: [0; KEYBOARD_MAX_KEYS],
            len: 0,
        }
    }

    /// Returns false only when the set is full and `code` is not already in it.
    pub fn insert(&mut self, code: u8) -> bool {
        if self.contains(code) {
            return true;
        }
        if self.len() == KEYBOARD_MAX_KEYS {
            return false;
        }
        self.keys[self.len()] = code;
        self.len += 1;
        true
    }

    pub fn remove(&mut self, code: u8) {
        if let Some(i) = self.as_slice().iter().position(|&k| k == code) {
            let last = self.len() - 1;
            self.keys[i] = self.keys[last];
            self.keys[last] = 0;
            self.len -= 1;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn contains(&self, code: u8) -> bool {
        self.as_slice().contains(&code)
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.keys[..self.len()]
    }
}

// =============================================================================
// Keyboard report
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardReport {
    pub modifier: u8,
    pub reserved: u8,
    pub keycodes: [u8; KEYBOARD_MAX_KEYS],
}

impl KeyboardReport {
    /// All keys released.
    pub const fn empty() -> Self {
        Self {
            modifier: 0,
            reserved: 0,
            keycodes: [0; KEYBOARD_MAX_KEYS],
        }
    }

    /// Build the report for the given held state. Unused slots are zero.
    pub fn from_state(modifier: u8, keys: &KeySet) -> Self {
        let mut keycodes = [0u8; KEYBOARD_MAX_KEYS];
        keycodes[..keys.len()].copy_from_slice(keys.as_slice());
        Self {
            modifier,
            reserved: 0,
            keycodes,
        }
    }

    pub fn to_bytes(&self) -> [u8; KEYBOARD_REPORT_SIZE] {
        let mut buf = [0u8; KEYBOARD_REPORT_SIZE];
        buf[0] = self.modifier;
        buf[1] = self.reserved;
        buf[2..].copy_from_slice(&self.keycodes);
        buf
    }

    pub fn is_empty(&self) -> bool {
        self.modifier == 0 && self.keycodes.iter().all(|&k| k == 0)
    }

    /// Key codes in slot order, without empty slots.
    pub fn pressed(&self) -> impl Iterator<Item = u8> + '_ {
        self.keycodes.iter().copied().filter(|&k| k != 0)
    }
}

// =============================================================================
// Report descriptors
// =============================================================================

/// Boot-protocol keyboard: 8 modifier bits, reserved byte, 5 LED outputs,
/// six key-code array slots.
pub const KEYBOARD_REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0xE0, //   Usage Minimum (Left Control)
    0x29, 0xE7, //   Usage Maximum (Right GUI)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Constant)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (Num Lock)
    0x29, 0x05, //   Usage Maximum (Kana)
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Constant)
    0x05, 0x07, //   Usage Page (Keyboard/Keypad)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0xFF, //   Usage Maximum (255)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x00, //   Input (Data, Array)
    0xC0, // End Collection
];

/// Vendor raw HID (usage page 0xFF00) with 32-byte input, output and
/// feature reports. Commands travel as SET_REPORT, replies as GET_REPORT.
pub const RAWHID_REPORT_DESCRIPTOR: &[u8] = &[
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined 0xFF00)
    0x09, 0x01, // Usage (0x01)
    0xA1, 0x01, // Collection (Application)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x20, //   Report Count (32)
    0x09, 0x01, //   Usage (0x01)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x09, 0x01, //   Usage (0x01)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0x09, 0x01, //   Usage (0x01)
    0xB1, 0x02, //   Feature (Data, Variable, Absolute)
    0xC0, // End Collection
];
