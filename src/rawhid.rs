//! Raw HID front end for programming mode.
//!
//! The host sends a command with SET_REPORT and fetches the reply with
//! GET_REPORT. This type owns the protocol session and the store for the
//! duration of programming mode and remembers whether the host has said
//! anything at all, which the supervisor uses for its idle timeout.

use crate::config::REPORT_SIZE;
use crate::hal::Eeprom;
use crate::protocol::{ProgramSession, Response, CMD_COMMIT, CMD_WRITE};
use crate::storage::Storage;

pub struct RawHid<E> {
    session: ProgramSession,
    storage: Storage<E>,
    response: Response,
    response_pending: bool,
    had_activity: bool,
}

impl<E: Eeprom> RawHid<E> {
    pub fn new(storage: Storage<E>) -> Self {
        Self {
            session: ProgramSession::new(),
            storage,
            response: Response::none(),
            response_pending: false,
            had_activity: false,
        }
    }

    /// SET_REPORT: run one command. Reports longer than `REPORT_SIZE` are
    /// truncated.
    ///
    /// The store is flushed after WRITE and COMMIT only. APPEND data is not
    /// referenced by the header until COMMIT, so it can stay buffered.
    pub fn set_report(&mut self, data: &[u8]) {
        self.had_activity = true;

        let data = &data[..data.len().min(REPORT_SIZE)];
        self.response = self.session.process_report(&mut self.storage, data);
        self.response_pending = !self.response.is_empty();

        if matches!(data.first(), Some(&(CMD_WRITE | CMD_COMMIT))) {
            self.storage.flush();
        }
    }

    /// GET_REPORT: copy the pending reply into `buf`, zero-padded to the
    /// report size. Returns the number of bytes produced, 0 if nothing is
    /// pending.
    pub fn get_report(&mut self, buf: &mut [u8]) -> usize {
        self.had_activity = true;

        if !self.response_pending {
            return 0;
        }
        self.response_pending = false;

        let n = buf.len().min(REPORT_SIZE);
        let reply = self.response.as_bytes();
        let copied = reply.len().min(n);
        buf[..copied].copy_from_slice(&reply[..copied]);
        buf[copied..n].fill(0);
        n
    }

    /// Any other request addressed to the interface.
    pub fn note_activity(&mut self) {
        self.had_activity = true;
    }

    pub fn had_activity(&self) -> bool {
        self.had_activity
    }

    pub fn exit_requested(&self) -> bool {
        self.session.exit_requested()
    }

    pub fn has_pending_response(&self) -> bool {
        self.response_pending
    }

    pub fn session(&self) -> &ProgramSession {
        &self.session
    }

    pub fn storage(&self) -> &Storage<E> {
        &self.storage
    }

    pub fn into_storage(self) -> Storage<E> {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::RamEeprom;
    use crate::protocol::{CMD_APPEND, CMD_EXIT, CMD_RESET, CMD_STATUS};

    /// Store that counts flushes.
    #[derive(Default)]
    struct Counting {
        inner: RamEeprom,
        flushes: usize,
    }

    impl Eeprom for Counting {
        fn capacity(&self) -> u16 {
            self.inner.capacity()
        }

        fn read(&self, addr: u16) -> u8 {
            self.inner.read(addr)
        }

        fn write(&mut self, addr: u16, value: u8) {
            self.inner.write(addr, value);
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }
    }

    fn rawhid() -> RawHid<RamEeprom> {
        RawHid::new(Storage::new(RamEeprom::new()))
    }

    #[test]
    fn fresh_link_has_no_activity() {
        let hid = rawhid();
        assert!(!hid.had_activity());
        assert!(!hid.exit_requested());
        assert!(!hid.has_pending_response());
    }

    #[test]
    fn reply_is_padded_and_one_shot() {
        let mut hid = rawhid();
        hid.set_report(&[CMD_RESET]);
        assert!(hid.had_activity());
        assert!(hid.has_pending_response());

        let mut buf = [0xEEu8; REPORT_SIZE];
        assert_eq!(hid.get_report(&mut buf), REPORT_SIZE);
        assert_eq!(buf, [0u8; REPORT_SIZE]);

        assert_eq!(hid.get_report(&mut buf), 0);
    }

    #[test]
    fn get_report_alone_counts_as_activity() {
        let mut hid = rawhid();
        let mut buf = [0u8; REPORT_SIZE];
        assert_eq!(hid.get_report(&mut buf), 0);
        assert!(hid.had_activity());
    }

    #[test]
    fn status_reply_fills_report() {
        let mut hid = rawhid();
        hid.set_report(&[CMD_STATUS]);
        let mut buf = [0u8; 64];
        assert_eq!(hid.get_report(&mut buf), REPORT_SIZE);
        assert_eq!(buf[1], crate::config::FIRMWARE_VERSION);
    }

    #[test]
    fn exit_leaves_nothing_pending() {
        let mut hid = rawhid();
        hid.set_report(&[CMD_EXIT]);
        assert!(hid.exit_requested());
        assert!(!hid.has_pending_response());
    }

    #[test]
    fn oversized_report_is_truncated() {
        let mut hid = rawhid();
        let mut big = [0u8; 64];
        big[0] = CMD_RESET;
        hid.set_report(&big);
        assert!(hid.has_pending_response());
    }

    #[test]
    fn only_write_and_commit_flush() {
        let mut hid = RawHid::new(Storage::new(Counting::default()));
        hid.set_report(&[CMD_RESET]);
        hid.set_report(&[CMD_APPEND, 2, 0, 0x05, 0x04]);
        hid.set_report(&[CMD_STATUS]);
        assert_eq!(hid.storage().eeprom().flushes, 0);

        hid.set_report(&[CMD_WRITE, 0x10, 0, 1, 0, 0xAA]);
        assert_eq!(hid.storage().eeprom().flushes, 1);

        hid.set_report(&[CMD_COMMIT, 0, 0, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(hid.storage().eeprom().flushes, 2);
    }
}
