//! Mode selection.
//!
//! The device is a programmer after a normal boot and a keyboard after a
//! watchdog reset. Leaving programming mode therefore means arming the
//! watchdog and letting it fire; the next boot sees the watchdog flag and
//! comes up as a keyboard. There is no way back short of a fresh boot.

use crate::config::PROGRAMMING_TIMEOUT_MS;
use crate::hal::{Clock, ResetControl};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Programming,
    Keyboard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RestartReason {
    /// The host sent EXIT.
    ExitRequested,
    /// Nobody talked to the programmer before the timeout.
    IdleTimeout,
}

/// Reset-cause register contents, one bit per cause.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResetFlags(pub u8);

impl ResetFlags {
    pub const NONE: Self = Self(0);
    pub const POWER_ON: Self = Self(1 << 0);
    pub const EXTERNAL: Self = Self(1 << 1);
    pub const BROWN_OUT: Self = Self(1 << 2);
    pub const WATCHDOG: Self = Self(1 << 3);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Prefer the primary register; fall back to the backup copy if the
    /// primary was already cleared by the time we looked.
    pub const fn resolve(primary: Self, backup: Self) -> Self {
        if primary.is_empty() {
            backup
        } else {
            primary
        }
    }
}

/// Pure mode decision from the reset cause.
pub fn determine_initial_mode(cause: ResetFlags) -> Mode {
    if cause.contains(ResetFlags::WATCHDOG) {
        Mode::Keyboard
    } else {
        Mode::Programming
    }
}

/// Read the reset cause, clear it and stop the watchdog, then decide.
///
/// Clearing happens before returning so the cause cannot leak into the next
/// natural reboot.
pub fn select_mode<R: ResetControl>(reset: &mut R) -> Mode {
    let primary = reset.reset_flags();
    let backup = reset.backup_reset_flags();
    let cause = ResetFlags::resolve(primary, backup);

    reset.clear_reset_flags();
    reset.disable_watchdog();

    let mode = determine_initial_mode(cause);
    info!("reset cause 0x{:02x}, mode {}", cause.bits(), mode);
    mode
}

/// Force a full device restart. Never returns.
pub fn restart<R: ResetControl>(reset: &mut R, reason: RestartReason) -> ! {
    info!("restarting: {}", reason);
    reset.arm_restart(reason);
    loop {
        core::hint::spin_loop();
    }
}

/// Exit conditions of programming mode.
///
/// Until the host shows any sign of life the session expires after
/// `PROGRAMMING_TIMEOUT_MS`; after that only EXIT ends it.
#[derive(Clone, Copy, Debug)]
pub struct ProgrammingWatch {
    entered_at: u32,
    timeout_ms: u32,
    activity_seen: bool,
}

impl ProgrammingWatch {
    pub fn new(now_ms: u32) -> Self {
        Self::with_timeout(now_ms, PROGRAMMING_TIMEOUT_MS)
    }

    pub fn with_timeout(now_ms: u32, timeout_ms: u32) -> Self {
        Self {
            entered_at: now_ms,
            timeout_ms,
            activity_seen: false,
        }
    }

    /// Evaluate once per loop iteration.
    pub fn check<C: Clock>(&mut self, clock: &C, had_activity: bool, exit_requested: bool) -> Option<RestartReason> {
        if exit_requested {
            return Some(RestartReason::ExitRequested);
        }
        if had_activity {
            self.activity_seen = true;
        }
        if !self.activity_seen && clock.has_elapsed(self.entered_at, self.timeout_ms) {
            return Some(RestartReason::IdleTimeout);
        }
        None
    }

    pub fn activity_seen(&self) -> bool {
        self.activity_seen
    }
}
