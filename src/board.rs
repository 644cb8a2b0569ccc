/// RP2040 reset control and time base.
use defmt::*;
use embassy_rp::watchdog::Watchdog;
use embassy_time::{Duration, Instant};

use tinykb::config::{RESET_SCRATCH_INDEX, RESET_SCRATCH_MAGIC, RESTART_TIMEOUT_MS};
use tinykb::hal::{Clock, ResetControl};
use tinykb::mode::{ResetFlags, RestartReason};

// =============================================================================
// Reset control
// =============================================================================

/// The watchdog's REASON register is the primary reset cause. A scratch
/// register, which survives a watchdog reset but not a power cycle, carries
/// the backup copy written just before a forced restart.
pub struct RpReset {
    watchdog: Watchdog,
}

impl RpReset {
    pub fn new(watchdog: Watchdog) -> Self {
        Self { watchdog }
    }
}

impl ResetControl for RpReset {
    fn reset_flags(&mut self) -> ResetFlags {
        match self.watchdog.reset_reason() {
            Some(_) => ResetFlags::WATCHDOG,
            None => ResetFlags::POWER_ON,
        }
    }

    fn backup_reset_flags(&mut self) -> ResetFlags {
        let raw = self.watchdog.get_scratch(RESET_SCRATCH_INDEX);
        if raw & 0xFFFF_0000 == RESET_SCRATCH_MAGIC {
            ResetFlags(raw as u8)
        } else {
            ResetFlags::NONE
        }
    }

    /// REASON is read-only; it is cleared by the next power-on or RUN reset.
    /// Only the scratch copy can be wiped here.
    fn clear_reset_flags(&mut self) {
        self.watchdog.set_scratch(RESET_SCRATCH_INDEX, 0);
    }

    fn disable_watchdog(&mut self) {
        self.watchdog.stop();
    }

    fn arm_restart(&mut self, reason: RestartReason) {
        debug!("watchdog: arming restart ({})", reason);
        let mirror = RESET_SCRATCH_MAGIC | u32::from(ResetFlags::WATCHDOG.bits());
        self.watchdog.set_scratch(RESET_SCRATCH_INDEX, mirror);
        self.watchdog.start(Duration::from_millis(u64::from(RESTART_TIMEOUT_MS)));
    }
}

// =============================================================================
// Time
// =============================================================================

/// Millisecond counter on the embassy time driver. Truncated to 32 bits and
/// wraps like any other `Clock`.
#[derive(Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        Instant::now().as_millis() as u32
    }
}
