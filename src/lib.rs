//! Scriptable USB keystroke device.
//!
//! After a normal boot the device is a vendor-HID programmer: the host
//! uploads a small bytecode script, which is checksummed and committed to
//! persistent storage. Leaving programming mode restarts the chip through the
//! watchdog; the watchdog reset brings it up as a boot keyboard that replays
//! the committed script.
//!
//! This crate is the hardware-independent core. Board glue implements the
//! traits in [`hal`]; the RP2040 firmware lives in `src/main.rs` behind the
//! `firmware` feature.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod crc16;
pub mod engine;
pub mod hal;
pub mod keymap;
pub mod mode;
pub mod protocol;
pub mod rawhid;
pub mod report;
pub mod storage;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use engine::{Engine, RunState, ScriptFault};
pub use mode::{select_mode, Mode};
pub use protocol::{ProgramSession, ProtocolError, Status};
pub use rawhid::RawHid;
pub use storage::Storage;
