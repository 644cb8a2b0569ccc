//! US keyboard layout: ASCII to HID usage codes.

// =============================================================================
// Modifier masks (byte 0 of the keyboard report)
// =============================================================================

pub const MOD_NONE: u8 = 0x00;
pub const MOD_CTRL_LEFT: u8 = 0x01;
pub const MOD_SHIFT_LEFT: u8 = 0x02;
pub const MOD_ALT_LEFT: u8 = 0x04;
pub const MOD_GUI_LEFT: u8 = 0x08;
pub const MOD_CTRL_RIGHT: u8 = 0x10;
pub const MOD_SHIFT_RIGHT: u8 = 0x20;
pub const MOD_ALT_RIGHT: u8 = 0x40;
pub const MOD_GUI_RIGHT: u8 = 0x80;

pub const MOD_CTRL: u8 = MOD_CTRL_LEFT;
pub const MOD_SHIFT: u8 = MOD_SHIFT_LEFT;
pub const MOD_ALT: u8 = MOD_ALT_LEFT;
pub const MOD_GUI: u8 = MOD_GUI_LEFT;

// =============================================================================
// Key codes
// =============================================================================

pub const KEY_A: u8 = 0x04;
pub const KEY_ENTER: u8 = 0x28;
pub const KEY_ESC: u8 = 0x29;
pub const KEY_BACKSPACE: u8 = 0x2A;
pub const KEY_TAB: u8 = 0x2B;
pub const KEY_SPACE: u8 = 0x2C;
pub const KEY_CAPS_LOCK: u8 = 0x39;

pub const KEY_F1: u8 = 0x3A;
pub const KEY_F2: u8 = 0x3B;
pub const KEY_F3: u8 = 0x3C;
pub const KEY_F4: u8 = 0x3D;
pub const KEY_F5: u8 = 0x3E;
pub const KEY_F6: u8 = 0x3F;
pub const KEY_F7: u8 = 0x40;
pub const KEY_F8: u8 = 0x41;
pub const KEY_F9: u8 = 0x42;
pub const KEY_F10: u8 = 0x43;
pub const KEY_F11: u8 = 0x44;
pub const KEY_F12: u8 = 0x45;

pub const KEY_INSERT: u8 = 0x49;
pub const KEY_HOME: u8 = 0x4A;
pub const KEY_PAGE_UP: u8 = 0x4B;
pub const KEY_DELETE: u8 = 0x4C;
pub const KEY_END: u8 = 0x4D;
pub const KEY_PAGE_DOWN: u8 = 0x4E;
pub const KEY_ARROW_RIGHT: u8 = 0x4F;
pub const KEY_ARROW_LEFT: u8 = 0x50;
pub const KEY_ARROW_DOWN: u8 = 0x51;
pub const KEY_ARROW_UP: u8 = 0x52;

// =============================================================================
// Lookup
// =============================================================================

/// A character as typed: one key, optionally with shift held.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyStroke {
    pub keycode: u8,
    pub shift: bool,
}

impl KeyStroke {
    /// Modifier mask to hold while tapping this key.
    pub fn modifiers(&self) -> u8 {
        if self.shift {
            MOD_SHIFT
        } else {
            MOD_NONE
        }
    }
}

pub trait KeyLayout {
    /// `None` for characters the layout cannot type.
    fn lookup(&self, ascii: u8) -> Option<KeyStroke>;
}

/// The table stores the key code in the low 7 bits and a shift flag in bit 7.
const SHIFT: u8 = 0x80;
const KEYCODE_MASK: u8 = 0x7F;
const NONE: u8 = 0x00;

const fn s(code: u8) -> u8 {
    code | SHIFT
}

#[rustfmt::skip]
static US_TABLE: [u8; 128] = [
    // 0x00 - 0x07
    NONE, NONE, NONE, NONE, NONE, NONE, NONE, NONE,
    // 0x08 backspace, 0x09 tab, 0x0A line feed
    KEY_BACKSPACE, KEY_TAB, KEY_ENTER, NONE, NONE, NONE, NONE, NONE,
    // 0x10 - 0x17
    NONE, NONE, NONE, NONE, NONE, NONE, NONE, NONE,
    // 0x18 - 0x1F, 0x1B escape
    NONE, NONE, NONE, KEY_ESC, NONE, NONE, NONE, NONE,
    // ' ' ! " # $ % & '
    KEY_SPACE, s(0x1E), s(0x34), s(0x20), s(0x21), s(0x22), s(0x24), 0x34,
    // ( ) * + , - . /
    s(0x26), s(0x27), s(0x25), s(0x2E), 0x36, 0x2D, 0x37, 0x38,
    // 0 - 7
    0x27, 0x1E, 0x1F, 0x20, 0x21, 0x22, 0x23, 0x24,
    // 8 9 : ; < = > ?
    0x25, 0x26, s(0x33), 0x33, s(0x36), 0x2E, s(0x37), s(0x38),
    // @ A - G
    s(0x1F), s(0x04), s(0x05), s(0x06), s(0x07), s(0x08), s(0x09), s(0x0A),
    // H - O
    s(0x0B), s(0x0C), s(0x0D), s(0x0E), s(0x0F), s(0x10), s(0x11), s(0x12),
    // P - W
    s(0x13), s(0x14), s(0x15), s(0x16), s(0x17), s(0x18), s(0x19), s(0x1A),
    // X Y Z [ \ ] ^ _
    s(0x1B), s(0x1C), s(0x1D), 0x2F, 0x31, 0x30, s(0x23), s(0x2D),
    // ` a - g
    0x35, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A,
    // h - o
    0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11, 0x12,
    // p - w
    0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1A,
    // x y z { | } ~ DEL
    0x1B, 0x1C, 0x1D, s(0x2F), s(0x31), s(0x30), s(0x35), NONE,
];

#[derive(Clone, Copy, Debug, Default)]
pub struct UsLayout;

impl KeyLayout for UsLayout {
    fn lookup(&self, ascii: u8) -> Option<KeyStroke> {
        let entry = *US_TABLE.get(ascii as usize)?;
        if entry == NONE {
            return None;
        }
        Some(KeyStroke {
            keycode: entry & KEYCODE_MASK,
            shift: entry & SHIFT != 0,
        })
    }
}
