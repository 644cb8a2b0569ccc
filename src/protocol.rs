// Programming protocol: command codes, status codes, and the session that
// turns fixed-size vendor reports into store writes and commits.
//
// Request and response layouts (multi-byte fields little-endian):
//
//   WRITE   cmd addr(2) len(2) data(<=27)   -> status written(2)
//   READ    cmd addr(2) len(2)              -> status read(2) data(len)
//   APPEND  cmd len(2) data(<=29)           -> status next_offset(2) crc(2)
//   RESET   cmd                             -> status
//   COMMIT  cmd opts ver flags delay(2) len(2) crc(2) -> status
//   STATUS  cmd                             -> status fw size(2) report crc(2) offset(2), padded
//   EXIT    cmd                             -> (nothing)

use crate::config::*;
use crate::crc16;
use crate::hal::Eeprom;
use crate::storage::Storage;

// =============================================================================
// Command codes (byte 0 of every request)
// =============================================================================

pub const CMD_WRITE: u8 = 0x01;
pub const CMD_READ: u8 = 0x02;
pub const CMD_APPEND: u8 = 0x03;
pub const CMD_RESET: u8 = 0x04;
pub const CMD_COMMIT: u8 = 0x05;
pub const CMD_STATUS: u8 = 0x06;
pub const CMD_EXIT: u8 = 0x07;

/// COMMIT option bit 0: checksum the bytes already in the store instead of
/// using the session's running checksum.
pub const OPT_CRC_FROM_STORE: u8 = 0x01;

// =============================================================================
// Status codes (byte 0 of every response)
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    InvalidCommand = 0x01,
    InvalidAddress = 0x02,
    InvalidLength = 0x03,
    CrcMismatch = 0x04,
}

impl Status {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Status::Ok),
            0x01 => Some(Status::InvalidCommand),
            0x02 => Some(Status::InvalidAddress),
            0x03 => Some(Status::InvalidLength),
            0x04 => Some(Status::CrcMismatch),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    #[error("unknown or empty command")]
    InvalidCommand,
    #[error("address outside the store")]
    InvalidAddress,
    #[error("length zero, too large, or past the end of the region")]
    InvalidLength,
    #[error("checksum mismatch")]
    CrcMismatch,
}

impl ProtocolError {
    pub fn status(self) -> Status {
        match self {
            ProtocolError::InvalidCommand => Status::InvalidCommand,
            ProtocolError::InvalidAddress => Status::InvalidAddress,
            ProtocolError::InvalidLength => Status::InvalidLength,
            ProtocolError::CrcMismatch => Status::CrcMismatch,
        }
    }
}

// =============================================================================
// Frames
// =============================================================================

/// An inbound report, clamped to `REPORT_SIZE` and zero-padded so every
/// field offset of every command is addressable.
struct Frame([u8; REPORT_SIZE]);

impl Frame {
    fn new(report: &[u8]) -> Self {
        let mut buf = [0u8; REPORT_SIZE];
        let n = report.len().min(REPORT_SIZE);
        buf[..n].copy_from_slice(&report[..n]);
        Self(buf)
    }

    fn byte(&self, at: usize) -> u8 {
        self.0[at]
    }

    fn u16(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.0[at], self.0[at + 1]])
    }

    fn data(&self, at: usize, len: u16) -> &[u8] {
        &self.0[at..at + len as usize]
    }
}

/// Outbound report. `len` is the meaningful prefix; the transport pads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    buf: [u8; REPORT_SIZE],
    len: usize,
}

impl Response {
    /// EXIT answers with nothing.
    pub const fn none() -> Self {
        Self {
            buf: [0; REPORT_SIZE],
            len: 0,
        }
    }

    pub fn status(status: Status) -> Self {
        let mut r = Self::none();
        r.push(status as u8);
        r
    }

    pub fn ok() -> Self {
        Self::status(Status::Ok)
    }

    fn push(&mut self, b: u8) {
        self.buf[self.len] = b;
        self.len += 1;
    }

    fn push_u16(&mut self, v: u16) {
        for b in v.to_le_bytes() {
            self.push(b);
        }
    }

    fn padded(mut self) -> Self {
        self.len = REPORT_SIZE;
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Status byte, if the response carries one.
    pub fn status_code(&self) -> Option<Status> {
        self.as_bytes().first().and_then(|&b| Status::from_byte(b))
    }
}

// =============================================================================
// Session
// =============================================================================

/// Ephemeral programming state: where the next APPEND lands and the checksum
/// of everything appended so far.
#[derive(Debug)]
pub struct ProgramSession {
    current_offset: u16,
    running_checksum: u16,
    exit_requested: bool,
}

impl Default for ProgramSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramSession {
    pub const fn new() -> Self {
        Self {
            current_offset: 0,
            running_checksum: crc16::init(),
            exit_requested: false,
        }
    }

    pub fn current_offset(&self) -> u16 {
        self.current_offset
    }

    pub fn running_checksum(&self) -> u16 {
        self.running_checksum
    }

    /// Sticky once EXIT has been seen.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    fn reset(&mut self) {
        self.current_offset = 0;
        self.running_checksum = crc16::init();
    }

    /// Handle one inbound report and produce the reply.
    pub fn process_report<E: Eeprom>(&mut self, storage: &mut Storage<E>, report: &[u8]) -> Response {
        let Some(&command) = report.first() else {
            warn!("empty report");
            return Response::status(Status::InvalidCommand);
        };
        let frame = Frame::new(report);

        let result = match command {
            CMD_WRITE => self.cmd_write(storage, &frame),
            CMD_READ => self.cmd_read(storage, &frame),
            CMD_APPEND => self.cmd_append(storage, &frame),
            CMD_RESET => self.cmd_reset(),
            CMD_COMMIT => self.cmd_commit(storage, &frame),
            CMD_STATUS => self.cmd_status(),
            CMD_EXIT => self.cmd_exit(),
            _ => Err(ProtocolError::InvalidCommand),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                warn!("command 0x{:02x} rejected: {}", command, e);
                Response::status(e.status())
            }
        }
    }

    // =========================================================================
    // WRITE (0x01): stateless absolute write
    // =========================================================================

    fn cmd_write<E: Eeprom>(&mut self, storage: &mut Storage<E>, frame: &Frame) -> Result<Response, ProtocolError> {
        let addr = frame.u16(1);
        let len = frame.u16(3);
        check_span(addr, len, MAX_WRITE_DATA)?;

        storage.write_block(addr, frame.data(5, len));
        debug!("WRITE: addr=0x{:04x} len={=u16}", addr, len);

        let mut r = Response::ok();
        r.push_u16(len);
        Ok(r)
    }

    // =========================================================================
    // READ (0x02): stateless absolute read
    // =========================================================================

    fn cmd_read<E: Eeprom>(&mut self, storage: &mut Storage<E>, frame: &Frame) -> Result<Response, ProtocolError> {
        let addr = frame.u16(1);
        let len = frame.u16(3);
        check_span(addr, len, MAX_READ_DATA)?;

        let mut r = Response::ok();
        r.push_u16(len);
        let start = r.len;
        storage.read_block(addr, &mut r.buf[start..start + len as usize]);
        r.len += len as usize;
        debug!("READ: addr=0x{:04x} len={=u16}", addr, len);
        Ok(r)
    }

    // =========================================================================
    // APPEND (0x03): sequential write into the script region
    // =========================================================================

    fn cmd_append<E: Eeprom>(&mut self, storage: &mut Storage<E>, frame: &Frame) -> Result<Response, ProtocolError> {
        let len = frame.u16(1);
        let end = self.current_offset.checked_add(len);
        if len == 0 || len > MAX_APPEND_DATA || end.map_or(true, |end| end > MAX_SCRIPT_SIZE) {
            return Err(ProtocolError::InvalidLength);
        }

        for (i, &b) in frame.data(3, len).iter().enumerate() {
            storage.write_byte(SCRIPT_START + self.current_offset + i as u16, b);
            self.running_checksum = crc16::update(self.running_checksum, b);
        }
        self.current_offset += len;
        debug!(
            "APPEND: {=u16} bytes, offset={=u16} crc=0x{:04x}",
            len, self.current_offset, self.running_checksum
        );

        let mut r = Response::ok();
        r.push_u16(self.current_offset);
        r.push_u16(self.running_checksum);
        Ok(r)
    }

    // =========================================================================
    // RESET (0x04)
    // =========================================================================

    fn cmd_reset(&mut self) -> Result<Response, ProtocolError> {
        self.reset();
        debug!("RESET");
        Ok(Response::ok())
    }

    // =========================================================================
    // COMMIT (0x05): verify checksum and write the header
    // =========================================================================

    fn cmd_commit<E: Eeprom>(&mut self, storage: &mut Storage<E>, frame: &Frame) -> Result<Response, ProtocolError> {
        let options = frame.byte(1);
        let version = frame.byte(2);
        let flags = frame.byte(3);
        let delay = frame.u16(4);
        let length = frame.u16(6);
        let expected = frame.u16(8);

        if length == 0 || length > MAX_SCRIPT_SIZE {
            return Err(ProtocolError::InvalidLength);
        }

        let actual = if options & OPT_CRC_FROM_STORE != 0 {
            storage.script_checksum(length)
        } else {
            crc16::finalize(self.running_checksum)
        };

        self.reset();

        if actual != expected {
            storage.invalidate();
            warn!(
                "COMMIT: checksum mismatch, expected 0x{:04x} got 0x{:04x}",
                expected, actual
            );
            return Err(ProtocolError::CrcMismatch);
        }

        storage.commit_header(version, flags, delay, length, expected);
        info!("COMMIT: {=u16} bytes, crc=0x{:04x}", length, expected);
        Ok(Response::ok())
    }

    // =========================================================================
    // STATUS (0x06)
    // =========================================================================

    fn cmd_status(&mut self) -> Result<Response, ProtocolError> {
        let mut r = Response::ok();
        r.push(FIRMWARE_VERSION);
        r.push_u16(STORE_SIZE);
        r.push(REPORT_SIZE as u8);
        r.push_u16(self.running_checksum);
        r.push_u16(self.current_offset);
        Ok(r.padded())
    }

    // =========================================================================
    // EXIT (0x07)
    // =========================================================================

    fn cmd_exit(&mut self) -> Result<Response, ProtocolError> {
        self.exit_requested = true;
        info!("EXIT requested");
        Ok(Response::none())
    }
}

/// Validate an absolute `[addr, addr + len)` span against the store.
fn check_span(addr: u16, len: u16, max: u16) -> Result<(), ProtocolError> {
    if addr >= STORE_SIZE {
        return Err(ProtocolError::InvalidAddress);
    }
    if len == 0 || len > max || u32::from(addr) + u32::from(len) > u32::from(STORE_SIZE) {
        return Err(ProtocolError::InvalidLength);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::RamEeprom;

    fn fresh() -> (ProgramSession, Storage<RamEeprom>) {
        (ProgramSession::new(), Storage::new(RamEeprom::new()))
    }

    fn write_req(addr: u16, data: &[u8]) -> [u8; REPORT_SIZE] {
        let mut r = [0u8; REPORT_SIZE];
        r[0] = CMD_WRITE;
        r[1..3].copy_from_slice(&addr.to_le_bytes());
        r[3..5].copy_from_slice(&(data.len() as u16).to_le_bytes());
        r[5..5 + data.len()].copy_from_slice(data);
        r
    }

    fn read_req(addr: u16, len: u16) -> [u8; REPORT_SIZE] {
        let mut r = [0u8; REPORT_SIZE];
        r[0] = CMD_READ;
        r[1..3].copy_from_slice(&addr.to_le_bytes());
        r[3..5].copy_from_slice(&len.to_le_bytes());
        r
    }

    fn append_req(data: &[u8]) -> [u8; REPORT_SIZE] {
        let mut r = [0u8; REPORT_SIZE];
        r[0] = CMD_APPEND;
        r[1..3].copy_from_slice(&(data.len() as u16).to_le_bytes());
        r[3..3 + data.len()].copy_from_slice(data);
        r
    }

    fn commit_req(options: u8, version: u8, flags: u8, delay: u16, length: u16, crc: u16) -> [u8; REPORT_SIZE] {
        let mut r = [0u8; REPORT_SIZE];
        r[0] = CMD_COMMIT;
        r[1] = options;
        r[2] = version;
        r[3] = flags;
        r[4..6].copy_from_slice(&delay.to_le_bytes());
        r[6..8].copy_from_slice(&length.to_le_bytes());
        r[8..10].copy_from_slice(&crc.to_le_bytes());
        r
    }

    fn script(len: usize) -> [u8; MAX_SCRIPT_SIZE as usize] {
        core::array::from_fn(|i| if i < len { (i * 7 + 3) as u8 } else { 0 })
    }

    #[test]
    fn empty_and_unknown_commands() {
        let (mut session, mut storage) = fresh();
        let r = session.process_report(&mut storage, &[]);
        assert_eq!(r.as_bytes(), &[Status::InvalidCommand as u8]);

        let r = session.process_report(&mut storage, &[0x00]);
        assert_eq!(r.status_code(), Some(Status::InvalidCommand));
        let r = session.process_report(&mut storage, &[0x42, 1, 2, 3]);
        assert_eq!(r.status_code(), Some(Status::InvalidCommand));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn write_then_read_round_trip() {
        let (mut session, mut storage) = fresh();
        let data: [u8; MAX_WRITE_DATA as usize] = core::array::from_fn(|i| 0xA0 ^ i as u8);

        for addr in [0u16, 8, 100, STORE_SIZE - MAX_WRITE_DATA] {
            let r = session.process_report(&mut storage, &write_req(addr, &data));
            assert_eq!(r.as_bytes(), &[0x00, MAX_WRITE_DATA as u8, 0x00]);

            let r = session.process_report(&mut storage, &read_req(addr, MAX_WRITE_DATA));
            assert_eq!(&r.as_bytes()[..3], &[0x00, MAX_WRITE_DATA as u8, 0x00]);
            assert_eq!(&r.as_bytes()[3..], &data[..]);
        }
    }

    #[test]
    fn write_validation() {
        let (mut session, mut storage) = fresh();

        let r = session.process_report(&mut storage, &write_req(STORE_SIZE, &[1]));
        assert_eq!(r.status_code(), Some(Status::InvalidAddress));

        let r = session.process_report(&mut storage, &write_req(10, &[]));
        assert_eq!(r.status_code(), Some(Status::InvalidLength));

        let r = session.process_report(&mut storage, &write_req(STORE_SIZE - 2, &[1, 2, 3]));
        assert_eq!(r.status_code(), Some(Status::InvalidLength));

        let mut too_long = write_req(0, &[]);
        too_long[3..5].copy_from_slice(&(MAX_WRITE_DATA + 1).to_le_bytes());
        let r = session.process_report(&mut storage, &too_long);
        assert_eq!(r.status_code(), Some(Status::InvalidLength));

        // Nothing was written by the rejected requests.
        assert_eq!(storage.eeprom().write_count(), 0);
    }

    #[test]
    fn read_validation() {
        let (mut session, mut storage) = fresh();
        let r = session.process_report(&mut storage, &read_req(STORE_SIZE, 1));
        assert_eq!(r.status_code(), Some(Status::InvalidAddress));
        let r = session.process_report(&mut storage, &read_req(0, 0));
        assert_eq!(r.status_code(), Some(Status::InvalidLength));
        let r = session.process_report(&mut storage, &read_req(0, MAX_READ_DATA + 1));
        assert_eq!(r.status_code(), Some(Status::InvalidLength));
        let r = session.process_report(&mut storage, &read_req(STORE_SIZE - 1, 2));
        assert_eq!(r.status_code(), Some(Status::InvalidLength));

        let r = session.process_report(&mut storage, &read_req(STORE_SIZE - 1, 1));
        assert_eq!(r.as_bytes(), &[0x00, 0x01, 0x00, 0xFF]);
    }

    #[test]
    fn chunked_append_matches_single_pass_crc() {
        let data = script(200);
        let data = &data[..200];
        let expected = crc16::checksum(data);

        for chunk in [1usize, 3, 7, 29] {
            let (mut session, mut storage) = fresh();
            let mut last = Response::none();
            for piece in data.chunks(chunk) {
                last = session.process_report(&mut storage, &append_req(piece));
                assert_eq!(last.status_code(), Some(Status::Ok));
            }
            assert_eq!(session.running_checksum(), expected);
            assert_eq!(session.current_offset(), 200);
            assert_eq!(&last.as_bytes()[1..3], &200u16.to_le_bytes());
            assert_eq!(&last.as_bytes()[3..5], &expected.to_le_bytes());

            let mut stored = [0u8; 200];
            storage.read_block(SCRIPT_START, &mut stored);
            assert_eq!(&stored[..], data);
        }
    }

    #[test]
    fn append_validation() {
        let (mut session, mut storage) = fresh();
        let r = session.process_report(&mut storage, &append_req(&[]));
        assert_eq!(r.status_code(), Some(Status::InvalidLength));

        let mut too_long = append_req(&[]);
        too_long[1..3].copy_from_slice(&(MAX_APPEND_DATA + 1).to_le_bytes());
        let r = session.process_report(&mut storage, &too_long);
        assert_eq!(r.status_code(), Some(Status::InvalidLength));

        // Fill the script region exactly, then one more byte must fail.
        let full = script(MAX_SCRIPT_SIZE as usize);
        for piece in full.chunks(MAX_APPEND_DATA as usize) {
            let r = session.process_report(&mut storage, &append_req(piece));
            assert_eq!(r.status_code(), Some(Status::Ok));
        }
        assert_eq!(session.current_offset(), MAX_SCRIPT_SIZE);
        let r = session.process_report(&mut storage, &append_req(&[0xAA]));
        assert_eq!(r.status_code(), Some(Status::InvalidLength));
        // The reserved trailer byte is untouched.
        assert_eq!(storage.read_byte(RESERVED_ADDR), 0xFF);
    }

    #[test]
    fn reset_restarts_session() {
        let (mut session, mut storage) = fresh();
        session.process_report(&mut storage, &append_req(&[1, 2, 3]));
        let r = session.process_report(&mut storage, &[CMD_RESET]);
        assert_eq!(r.as_bytes(), &[0x00]);
        assert_eq!(session.current_offset(), 0);
        assert_eq!(session.running_checksum(), crc16::init());
    }

    #[test]
    fn commit_with_running_crc() {
        let (mut session, mut storage) = fresh();
        let data = [0x04, 0x02, 0x05, 0x04, 0x00];
        session.process_report(&mut storage, &append_req(&data));
        let crc = crc16::checksum(&data);

        let r = session.process_report(&mut storage, &commit_req(0, PAYLOAD_VERSION, 0x01, 10, 5, crc));
        assert_eq!(r.as_bytes(), &[0x00]);
        assert!(storage.has_valid_script());
        assert_eq!(storage.script_length(), 5);
        assert_eq!(storage.initial_delay(), 1000);
        assert_eq!(storage.flags(), 0x01);
        assert_eq!(session.current_offset(), 0);
        assert_eq!(session.running_checksum(), crc16::init());
    }

    #[test]
    fn commit_with_crc_from_store() {
        let (mut session, mut storage) = fresh();
        let data = [0x05, 0x04, 0x00];
        session.process_report(&mut storage, &write_req(SCRIPT_START, &data));
        let crc = crc16::checksum(&data);

        let r = session.process_report(
            &mut storage,
            &commit_req(OPT_CRC_FROM_STORE, PAYLOAD_VERSION, 0, 0, 3, crc),
        );
        assert_eq!(r.status_code(), Some(Status::Ok));
        assert!(storage.has_valid_script());
    }

    #[test]
    fn commit_mismatch_invalidates() {
        let (mut session, mut storage) = fresh();
        let data = [0x05, 0x04, 0x00];
        session.process_report(&mut storage, &append_req(&data));
        let crc = crc16::checksum(&data);
        session.process_report(&mut storage, &commit_req(0, PAYLOAD_VERSION, 0, 0, 3, crc));
        assert!(storage.has_valid_script());

        session.process_report(&mut storage, &append_req(&data));
        let r = session.process_report(&mut storage, &commit_req(0, PAYLOAD_VERSION, 0, 0, 3, crc ^ 0x0101));
        assert_eq!(r.as_bytes(), &[Status::CrcMismatch as u8]);
        assert!(!storage.has_valid_script());
        assert_eq!(session.current_offset(), 0);
        assert_eq!(session.running_checksum(), crc16::init());

        let reread = Storage::new(storage.into_inner());
        assert!(!reread.has_valid_script());
    }

    #[test]
    fn commit_length_checked_before_crc() {
        let (mut session, mut storage) = fresh();
        session.process_report(&mut storage, &append_req(&[1, 2]));
        for length in [0, MAX_SCRIPT_SIZE + 1] {
            let r = session.process_report(&mut storage, &commit_req(0, PAYLOAD_VERSION, 0, 0, length, 0));
            assert_eq!(r.status_code(), Some(Status::InvalidLength));
        }
        // Length errors leave the session alone.
        assert_eq!(session.current_offset(), 2);
    }

    #[test]
    fn status_layout() {
        let (mut session, mut storage) = fresh();
        session.process_report(&mut storage, &append_req(&[9, 9]));
        let r = session.process_report(&mut storage, &[CMD_STATUS]);
        let b = r.as_bytes();
        assert_eq!(b.len(), REPORT_SIZE);
        assert_eq!(b[0], 0x00);
        assert_eq!(b[1], FIRMWARE_VERSION);
        assert_eq!(&b[2..4], &STORE_SIZE.to_le_bytes());
        assert_eq!(b[4], REPORT_SIZE as u8);
        assert_eq!(&b[5..7], &session.running_checksum().to_le_bytes());
        assert_eq!(&b[7..9], &2u16.to_le_bytes());
        assert!(b[9..].iter().all(|&x| x == 0));
    }

    #[test]
    fn exit_is_silent_and_sticky() {
        let (mut session, mut storage) = fresh();
        let r = session.process_report(&mut storage, &[CMD_EXIT]);
        assert!(r.is_empty());
        assert!(session.exit_requested());
        session.process_report(&mut storage, &[CMD_RESET]);
        assert!(session.exit_requested());
    }

    #[test]
    fn short_reports_are_zero_padded() {
        let (mut session, mut storage) = fresh();
        // Declares 4 bytes but only carries 2: the rest read as zero.
        let r = session.process_report(&mut storage, &[CMD_APPEND, 4, 0, 0xAB, 0xCD]);
        assert_eq!(r.status_code(), Some(Status::Ok));
        let mut stored = [0u8; 4];
        storage.read_block(SCRIPT_START, &mut stored);
        assert_eq!(stored, [0xAB, 0xCD, 0x00, 0x00]);
    }
}
