//! In-memory stand-ins for the board, shared by the unit tests.

use std::cell::Cell;
use std::rc::Rc;
use std::vec::Vec;

use crate::hal::{Clock, KeyboardTransport, Poll, ProgrammingLink, RamEeprom, ResetControl, StatusLed};
use crate::mode::{ResetFlags, RestartReason};
use crate::report::KeyboardReport;
use crate::storage::Storage;

/// Manually driven millisecond counter. Clones share the same counter.
#[derive(Clone, Default)]
pub struct MockClock {
    now: Rc<Cell<u32>>,
}

impl MockClock {
    pub fn new(start: u32) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn now(&self) -> u32 {
        self.now.get()
    }

    pub fn set(&self, ms: u32) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.now.get()
    }
}

/// Reset-cause registers and watchdog of a simulated chip.
pub struct MockReset {
    pub primary: ResetFlags,
    pub backup: ResetFlags,
    pub watchdog_enabled: bool,
    pub armed: Option<RestartReason>,
}

impl MockReset {
    pub fn power_on() -> Self {
        Self {
            primary: ResetFlags::POWER_ON,
            backup: ResetFlags::NONE,
            watchdog_enabled: false,
            armed: None,
        }
    }

    /// The armed watchdog expires and the chip reboots.
    pub fn watchdog_fires(&mut self) {
        assert!(self.watchdog_enabled, "watchdog was never armed");
        self.primary = ResetFlags::WATCHDOG;
        self.backup = ResetFlags::WATCHDOG;
        self.watchdog_enabled = false;
        self.armed = None;
    }

    pub fn power_cycle(&mut self) {
        self.primary = ResetFlags::POWER_ON;
        self.backup = ResetFlags::NONE;
        self.watchdog_enabled = false;
        self.armed = None;
    }
}

impl ResetControl for MockReset {
    fn reset_flags(&mut self) -> ResetFlags {
        self.primary
    }

    fn backup_reset_flags(&mut self) -> ResetFlags {
        self.backup
    }

    fn clear_reset_flags(&mut self) {
        self.primary = ResetFlags::NONE;
        self.backup = ResetFlags::NONE;
    }

    fn disable_watchdog(&mut self) {
        self.watchdog_enabled = false;
    }

    fn arm_restart(&mut self, reason: RestartReason) {
        self.watchdog_enabled = true;
        self.armed = Some(reason);
    }
}

/// Keyboard transport that records every report it is handed.
///
/// `busy_polls` makes the endpoint report "not ready" until it has been
/// polled that many times; `connect_after` does the same for enumeration.
/// If a clock is attached, each poll advances it by `ms_per_poll`.
#[derive(Default)]
pub struct RecordingKeyboard {
    pub reports: Vec<KeyboardReport>,
    pub polls: usize,
    pub busy_polls: usize,
    pub connect_after: usize,
    pub clock: Option<(MockClock, u32)>,
}

impl RecordingKeyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: &MockClock, ms_per_poll: u32) -> Self {
        Self {
            clock: Some((clock.clone(), ms_per_poll)),
            ..Self::default()
        }
    }

    /// Reports as raw 8-byte arrays, easier to compare in assertions.
    pub fn raw(&self) -> Vec<[u8; 8]> {
        self.reports.iter().map(|r| r.to_bytes()).collect()
    }
}

impl Poll for RecordingKeyboard {
    async fn poll(&mut self) {
        self.polls += 1;
        self.busy_polls = self.busy_polls.saturating_sub(1);
        if let Some((clock, step)) = &self.clock {
            clock.advance(*step);
        }
    }
}

impl KeyboardTransport for RecordingKeyboard {
    fn is_ready(&self) -> bool {
        self.busy_polls == 0
    }

    async fn send_report(&mut self, report: &KeyboardReport) {
        assert!(self.is_ready(), "report sent while endpoint busy");
        self.reports.push(*report);
    }

    fn is_connected(&self) -> bool {
        self.polls >= self.connect_after
    }
}

/// Programming link whose host behaviour is scripted by poll count.
#[derive(Default)]
pub struct MockLink {
    pub polls: usize,
    pub activity_at: Option<usize>,
    pub exit_at: Option<usize>,
    pub clock: Option<(MockClock, u32)>,
}

impl MockLink {
    pub fn with_clock(clock: &MockClock, ms_per_poll: u32) -> Self {
        Self {
            clock: Some((clock.clone(), ms_per_poll)),
            ..Self::default()
        }
    }
}

impl Poll for MockLink {
    async fn poll(&mut self) {
        self.polls += 1;
        if let Some((clock, step)) = &self.clock {
            clock.advance(*step);
        }
    }
}

impl ProgrammingLink for MockLink {
    fn had_activity(&self) -> bool {
        self.activity_at.is_some_and(|at| self.polls >= at)
    }

    fn exit_requested(&self) -> bool {
        self.exit_at.is_some_and(|at| self.polls >= at)
    }
}

/// LED that remembers its level and every change.
#[derive(Default)]
pub struct MockLed {
    pub lit: bool,
    pub changes: Vec<bool>,
}

impl StatusLed for MockLed {
    fn on(&mut self) {
        self.lit = true;
        self.changes.push(true);
    }

    fn off(&mut self) {
        self.lit = false;
        self.changes.push(false);
    }

    fn toggle(&mut self) {
        if self.lit {
            self.off();
        } else {
            self.on();
        }
    }
}

/// A store holding `script` as a committed, checksummed payload.
pub fn storage_with_script(script: &[u8], delay: u16) -> Storage<RamEeprom> {
    let mut storage = Storage::new(RamEeprom::new());
    storage.write_block(crate::config::SCRIPT_START, script);
    let length = script.len() as u16;
    let checksum = storage.script_checksum(length);
    storage.commit_header(crate::config::PAYLOAD_VERSION, 0, delay, length, checksum);
    assert!(storage.has_valid_script());
    storage
}

