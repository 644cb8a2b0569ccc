//! Script interpreter.
//!
//! A committed script is a flat byte string of opcodes with little-endian
//! operands. [`Engine::tick`] runs at most one opcode per call so the caller
//! can keep servicing USB between steps; every report is derived from the
//! held modifier mask and key set, never patched in place.
//!
//! ```text
//! 0x00 END
//! 0x01 DELAY   ms:u16
//! 0x02 KEY_DOWN code
//! 0x03 KEY_UP   code
//! 0x04 MOD     mask
//! 0x05 TAP     code
//! 0x06 REPEAT  count len
//! 0x07 COMBO   mask code
//! 0x08 STRING  len chars[len]
//! ```

use crate::hal::{Clock, Eeprom, KeyboardTransport};
use crate::keymap::{KeyLayout, UsLayout};
use crate::report::{KeySet, KeyboardReport};
use crate::storage::Storage;

// =============================================================================
// Opcodes
// =============================================================================

pub const OP_END: u8 = 0x00;
pub const OP_DELAY: u8 = 0x01;
pub const OP_KEY_DOWN: u8 = 0x02;
pub const OP_KEY_UP: u8 = 0x03;
pub const OP_MOD: u8 = 0x04;
pub const OP_TAP: u8 = 0x05;
pub const OP_REPEAT: u8 = 0x06;
pub const OP_COMBO: u8 = 0x07;
pub const OP_STRING: u8 = 0x08;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunState {
    Idle,
    Running,
    Delaying,
    Finished,
    Error,
}

/// Why a script stopped in [`RunState::Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScriptFault {
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode { opcode: u8, offset: u16 },
    #[error("script truncated at offset {offset}")]
    Truncated { offset: u16 },
}

/// The single active REPEAT. Loops do not nest.
#[derive(Clone, Copy, Debug, Default)]
struct Loop {
    start: u16,
    body_len: u8,
    remaining: u8,
    active: bool,
}

impl Loop {
    fn end(&self) -> u16 {
        self.start.saturating_add(u16::from(self.body_len))
    }
}

pub struct Engine<K = UsLayout> {
    layout: K,
    state: RunState,
    pc: u16,
    length: u16,
    modifiers: u8,
    keys: KeySet,
    report: KeyboardReport,
    delay_start: u32,
    delay_ms: u32,
    repeat: Loop,
    fault: Option<ScriptFault>,
}

impl Engine<UsLayout> {
    pub fn new() -> Self {
        Self::with_layout(UsLayout)
    }
}

impl Default for Engine<UsLayout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: KeyLayout> Engine<K> {
    pub fn with_layout(layout: K) -> Self {
        Self {
            layout,
            state: RunState::Idle,
            pc: 0,
            length: 0,
            modifiers: 0,
            keys: KeySet::new(),
            report: KeyboardReport::empty(),
            delay_start: 0,
            delay_ms: 0,
            repeat: Loop::default(),
            fault: None,
        }
    }

    /// Begin executing the committed script, or stay idle if there is none.
    pub fn start<E: Eeprom>(&mut self, storage: &Storage<E>) -> RunState {
        self.pc = 0;
        self.modifiers = 0;
        self.keys.clear();
        self.repeat = Loop::default();
        self.fault = None;

        if !storage.has_valid_script() {
            info!("engine: no script");
            self.length = 0;
            self.state = RunState::Idle;
            return self.state;
        }

        self.length = storage.script_length();
        self.state = RunState::Running;
        info!("engine: start, {=u16} bytes", self.length);
        self.state
    }

    /// Release everything and go idle.
    pub async fn stop<T: KeyboardTransport>(&mut self, transport: &mut T) {
        self.release_all();
        self.send(transport).await;
        self.state = RunState::Idle;
    }

    /// Do one unit of work and return the resulting state.
    pub async fn tick<E, T, C>(&mut self, storage: &Storage<E>, transport: &mut T, clock: &C) -> RunState
    where
        E: Eeprom,
        T: KeyboardTransport,
        C: Clock,
    {
        match self.state {
            RunState::Running => {
                match self.step(storage, transport, clock).await {
                    Ok(()) => self.check_loop(),
                    Err(fault) => self.fail(fault, transport).await,
                }
            }
            RunState::Delaying => {
                if clock.has_elapsed(self.delay_start, self.delay_ms) {
                    self.state = RunState::Running;
                }
            }
            RunState::Idle | RunState::Finished | RunState::Error => {}
        }
        self.state
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running | RunState::Delaying)
    }

    pub fn last_fault(&self) -> Option<ScriptFault> {
        self.fault
    }

    /// The report most recently handed to the transport.
    pub fn last_report(&self) -> &KeyboardReport {
        &self.report
    }

    pub fn program_counter(&self) -> u16 {
        self.pc
    }

    pub fn held_modifiers(&self) -> u8 {
        self.modifiers
    }

    pub fn held_keys(&self) -> &[u8] {
        self.keys.as_slice()
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    async fn step<E, T, C>(&mut self, storage: &Storage<E>, transport: &mut T, clock: &C) -> Result<(), ScriptFault>
    where
        E: Eeprom,
        T: KeyboardTransport,
        C: Clock,
    {
        let offset = self.pc;
        let opcode = self.fetch(storage)?;
        trace!("engine: op 0x{:02x} at {=u16}", opcode, offset);

        match opcode {
            OP_END => {
                self.release_all();
                self.send(transport).await;
                self.state = RunState::Finished;
                info!("engine: finished");
            }
            OP_DELAY => {
                let ms = self.fetch_u16(storage)?;
                self.delay_start = clock.now_ms();
                self.delay_ms = u32::from(ms);
                self.state = RunState::Delaying;
            }
            OP_KEY_DOWN => {
                let code = self.fetch(storage)?;
                if !self.keys.insert(code) {
                    debug!("engine: key set full, dropping 0x{:02x}", code);
                }
                self.send(transport).await;
            }
            OP_KEY_UP => {
                let code = self.fetch(storage)?;
                self.keys.remove(code);
                self.send(transport).await;
            }
            OP_MOD => {
                self.modifiers = self.fetch(storage)?;
                self.send(transport).await;
            }
            OP_TAP => {
                let code = self.fetch(storage)?;
                self.tap(code, transport).await;
            }
            OP_REPEAT => {
                let count = self.fetch(storage)?;
                let len = self.fetch(storage)?;
                if self.repeat.active {
                    // Nested: skip the inner body.
                    self.pc = self.pc.saturating_add(u16::from(len));
                } else {
                    self.repeat = Loop {
                        start: self.pc,
                        body_len: len,
                        remaining: count,
                        active: true,
                    };
                }
            }
            OP_COMBO => {
                let mask = self.fetch(storage)?;
                let code = self.fetch(storage)?;
                let saved = self.modifiers;
                self.modifiers = mask;
                self.keys.insert(code);
                self.send(transport).await;
                self.keys.remove(code);
                self.modifiers = saved;
                self.send(transport).await;
            }
            OP_STRING => self.type_string(storage, transport).await?,
            _ => return Err(ScriptFault::UnknownOpcode { opcode, offset }),
        }
        Ok(())
    }

    async fn type_string<E, T>(&mut self, storage: &Storage<E>, transport: &mut T) -> Result<(), ScriptFault>
    where
        E: Eeprom,
        T: KeyboardTransport,
    {
        let len = self.fetch(storage)?;
        for _ in 0..len {
            let ch = self.fetch(storage)?;
            match self.layout.lookup(ch) {
                Some(stroke) if stroke.shift => {
                    let saved = self.modifiers;
                    self.modifiers = stroke.modifiers();
                    self.tap(stroke.keycode, transport).await;
                    self.modifiers = saved;
                    self.send(transport).await;
                }
                Some(stroke) => self.tap(stroke.keycode, transport).await,
                None => trace!("engine: no key for 0x{:02x}", ch),
            }
            transport.poll().await;
        }
        Ok(())
    }

    fn fetch<E: Eeprom>(&mut self, storage: &Storage<E>) -> Result<u8, ScriptFault> {
        if self.pc >= self.length {
            return Err(ScriptFault::Truncated { offset: self.pc });
        }
        let byte = storage.script_byte(self.pc);
        self.pc += 1;
        Ok(byte)
    }

    fn fetch_u16<E: Eeprom>(&mut self, storage: &Storage<E>) -> Result<u16, ScriptFault> {
        let lo = self.fetch(storage)?;
        let hi = self.fetch(storage)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn check_loop(&mut self) {
        if !self.repeat.active || self.pc < self.repeat.end() {
            return;
        }
        self.repeat.remaining = self.repeat.remaining.saturating_sub(1);
        if self.repeat.remaining > 0 {
            self.pc = self.repeat.start;
        } else {
            self.repeat.active = false;
        }
    }

    async fn fail<T: KeyboardTransport>(&mut self, fault: ScriptFault, transport: &mut T) {
        match fault {
            ScriptFault::UnknownOpcode { opcode, offset } => {
                error!("engine: unknown opcode 0x{:02x} at {=u16}", opcode, offset)
            }
            ScriptFault::Truncated { offset } => error!("engine: script truncated at {=u16}", offset),
        }
        self.fault = Some(fault);
        self.state = RunState::Error;
        self.release_all();
        self.send(transport).await;
    }

    // =========================================================================
    // Reports
    // =========================================================================

    fn release_all(&mut self) {
        self.modifiers = 0;
        self.keys.clear();
    }

    async fn tap<T: KeyboardTransport>(&mut self, code: u8, transport: &mut T) {
        self.keys.insert(code);
        self.send(transport).await;
        self.keys.remove(code);
        self.send(transport).await;
    }

    async fn send<T: KeyboardTransport>(&mut self, transport: &mut T) {
        while !transport.is_ready() {
            transport.poll().await;
        }
        self.report = KeyboardReport::from_state(self.modifiers, &self.keys);
        transport.send_report(&self.report).await;
    }
}
