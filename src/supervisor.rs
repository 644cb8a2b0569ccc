//! Top-level run loops for the two modes.
//!
//! Both loops are built from small async steps that only ever wait by
//! polling the active transport, so the host keeps seeing a live device
//! through every pause.

use crate::config::{CONNECT_BLINK_COUNT, CONNECT_BLINK_OFF_MS, CONNECT_BLINK_ON_MS};
use crate::engine::{Engine, RunState};
use crate::hal::{Clock, Eeprom, KeyboardTransport, Poll, ProgrammingLink, ResetControl, StatusLed};
use crate::keymap::KeyLayout;
use crate::mode::{restart, ProgrammingWatch, RestartReason};
use crate::storage::Storage;

// =============================================================================
// Waiting
// =============================================================================

/// Poll `transport` until `ms` milliseconds have passed.
pub async fn wait_ms<P: Poll, C: Clock>(transport: &mut P, clock: &C, ms: u32) {
    let start = clock.now_ms();
    while !clock.has_elapsed(start, ms) {
        transport.poll().await;
    }
}

/// Blink `count` times, servicing the transport throughout. Leaves the LED off.
pub async fn blink<P, C, L>(led: &mut L, transport: &mut P, clock: &C, count: u8, on_ms: u32, off_ms: u32)
where
    P: Poll,
    C: Clock,
    L: StatusLed,
{
    for _ in 0..count {
        led.on();
        wait_ms(transport, clock, on_ms).await;
        led.off();
        wait_ms(transport, clock, off_ms).await;
    }
}

/// Poll until the host has enumerated the keyboard.
pub async fn wait_for_host<T: KeyboardTransport>(transport: &mut T) {
    while !transport.is_connected() {
        transport.poll().await;
    }
}

// =============================================================================
// Programming mode
// =============================================================================

/// Service the vendor link until the session should end.
pub async fn wait_for_exit<L: ProgrammingLink, C: Clock>(link: &mut L, clock: &C) -> RestartReason {
    let mut watch = ProgrammingWatch::new(clock.now_ms());
    loop {
        link.poll().await;
        if let Some(reason) = watch.check(clock, link.had_activity(), link.exit_requested()) {
            return reason;
        }
    }
}

/// Programming mode: LED on, serve the host, then restart into keyboard mode.
pub async fn run_programming<L, C, D, R>(link: &mut L, clock: &C, led: &mut D, reset: &mut R) -> !
where
    L: ProgrammingLink,
    C: Clock,
    D: StatusLed,
    R: ResetControl,
{
    info!("programming mode");
    led.on();
    let reason = wait_for_exit(link, clock).await;
    led.off();
    restart(reset, reason)
}

// =============================================================================
// Keyboard mode
// =============================================================================

/// Everything keyboard mode does before the first engine tick.
///
/// Returns the engine state after `start`: `Idle` when nothing is committed.
pub async fn start_keyboard<E, K, T, C, D>(
    storage: &Storage<E>,
    engine: &mut Engine<K>,
    transport: &mut T,
    clock: &C,
    led: &mut D,
) -> RunState
where
    E: Eeprom,
    K: KeyLayout,
    T: KeyboardTransport,
    C: Clock,
    D: StatusLed,
{
    led.off();
    wait_for_host(transport).await;
    debug!("keyboard: host connected");

    blink(
        led,
        transport,
        clock,
        CONNECT_BLINK_COUNT,
        CONNECT_BLINK_ON_MS,
        CONNECT_BLINK_OFF_MS,
    )
    .await;

    let delay = storage.initial_delay();
    if delay > 0 {
        debug!("keyboard: initial delay {=u32} ms", delay);
        wait_ms(transport, clock, delay).await;
    }

    engine.start(storage)
}

/// Keyboard mode: connect, replay the script once, then keep the device
/// serviced until power-off.
pub async fn run_keyboard<E, K, T, C, D>(
    storage: &Storage<E>,
    engine: &mut Engine<K>,
    transport: &mut T,
    clock: &C,
    led: &mut D,
) -> !
where
    E: Eeprom,
    K: KeyLayout,
    T: KeyboardTransport,
    C: Clock,
    D: StatusLed,
{
    info!("keyboard mode");
    start_keyboard(storage, engine, transport, clock, led).await;
    loop {
        transport.poll().await;
        engine.tick(storage, transport, clock).await;
    }
}
