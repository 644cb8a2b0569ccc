/// USB side of both modes.
///
/// Programming mode exposes one vendor HID interface. The host drives it
/// entirely through SET_REPORT / GET_REPORT on EP0, which embassy-usb hands
/// to [`RawHidHandler`] synchronously from the USB device task; the handler
/// forwards to the shared [`RawHid`] front end.
///
/// Keyboard mode exposes a boot keyboard whose IN endpoint is written by
/// [`HidKeyboard`] from the main task.
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use defmt::*;
use embassy_rp::peripherals::USB;
use embassy_futures::select::select;
use embassy_rp::usb::Driver;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use embassy_usb::class::hid::{HidWriter, ReportId, RequestHandler};
use embassy_usb::control::OutResponse;
use embassy_usb::Handler;

use tinykb::config::KEYBOARD_REPORT_SIZE;
use tinykb::hal::{KeyboardTransport, Poll, ProgrammingLink};
use tinykb::report::KeyboardReport;
use tinykb::RawHid;

use crate::flash_store::FlashEeprom;

pub type UsbDriver = Driver<'static, USB>;

// =============================================================================
// Shared state between the USB device task and the main task
// =============================================================================

/// Protocol front end for programming mode. Installed by `main` before the
/// USB device starts; only touched inside critical sections.
pub static RAW_HID: Mutex<RefCell<Option<RawHid<FlashEeprom<'static>>>>> = Mutex::new(RefCell::new(None));

/// Raised on every request to the vendor interface; wakes the supervisor.
static HOST_EVENT: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Programming mode re-checks its exit conditions at least this often.
const LINK_TICK: Duration = Duration::from_millis(10);

/// Host has put the device in the configured state.
static CONFIGURED: AtomicBool = AtomicBool::new(false);

/// Bus is suspended; IN transfers would block until resume.
static SUSPENDED: AtomicBool = AtomicBool::new(false);

fn with_raw_hid<R>(f: impl FnOnce(&mut RawHid<FlashEeprom<'static>>) -> R) -> Option<R> {
    critical_section::with(|cs| RAW_HID.borrow(cs).borrow_mut().as_mut().map(f))
}

// =============================================================================
// Device-level events
// =============================================================================

pub struct DeviceHandler;

impl Handler for DeviceHandler {
    fn configured(&mut self, configured: bool) {
        CONFIGURED.store(configured, Ordering::Release);
        if configured {
            info!("USB configured");
        } else {
            info!("USB deconfigured");
        }
    }

    fn suspended(&mut self, suspended: bool) {
        SUSPENDED.store(suspended, Ordering::Release);
        debug!("USB suspended={}", suspended);
    }

    fn reset(&mut self) {
        CONFIGURED.store(false, Ordering::Release);
    }
}

// =============================================================================
// Programming mode: vendor HID
// =============================================================================

pub struct RawHidHandler;

impl RequestHandler for RawHidHandler {
    fn get_report(&mut self, _id: ReportId, buf: &mut [u8]) -> Option<usize> {
        HOST_EVENT.signal(());
        match with_raw_hid(|hid| hid.get_report(buf)) {
            Some(0) | None => {
                debug!("GET_REPORT: nothing pending");
                None
            }
            Some(n) => Some(n),
        }
    }

    fn set_report(&mut self, _id: ReportId, data: &[u8]) -> OutResponse {
        HOST_EVENT.signal(());
        match with_raw_hid(|hid| hid.set_report(data)) {
            Some(()) => OutResponse::Accepted,
            None => {
                warn!("SET_REPORT before protocol init");
                OutResponse::Rejected
            }
        }
    }

    fn set_idle_ms(&mut self, _id: Option<ReportId>, _duration_ms: u32) {
        with_raw_hid(|hid| hid.note_activity());
        HOST_EVENT.signal(());
    }
}

/// Programming link seen by the supervisor.
pub struct UsbLink;

impl Poll for UsbLink {
    async fn poll(&mut self) {
        select(HOST_EVENT.wait(), Timer::after(LINK_TICK)).await;
    }
}

impl ProgrammingLink for UsbLink {
    fn had_activity(&self) -> bool {
        with_raw_hid(|hid| hid.had_activity()).unwrap_or(false)
    }

    fn exit_requested(&self) -> bool {
        with_raw_hid(|hid| hid.exit_requested()).unwrap_or(false)
    }
}

// =============================================================================
// Keyboard mode: boot keyboard
// =============================================================================

/// Class requests on the keyboard interface. Nothing to store; the host's
/// LED output report is only logged.
pub struct KeyboardRequestHandler;

impl RequestHandler for KeyboardRequestHandler {
    fn set_report(&mut self, _id: ReportId, data: &[u8]) -> OutResponse {
        if let Some(leds) = data.first() {
            debug!("keyboard: host LEDs 0x{:02x}", leds);
        }
        OutResponse::Accepted
    }

    fn set_idle_ms(&mut self, _id: Option<ReportId>, duration_ms: u32) {
        debug!("keyboard: SET_IDLE {} ms", duration_ms);
    }
}

pub struct HidKeyboard {
    writer: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>,
}

impl HidKeyboard {
    pub fn new(writer: HidWriter<'static, UsbDriver, KEYBOARD_REPORT_SIZE>) -> Self {
        Self { writer }
    }
}

impl Poll for HidKeyboard {
    async fn poll(&mut self) {
        embassy_futures::yield_now().await;
    }
}

impl KeyboardTransport for HidKeyboard {
    fn is_ready(&self) -> bool {
        CONFIGURED.load(Ordering::Acquire) && !SUSPENDED.load(Ordering::Acquire)
    }

    async fn send_report(&mut self, report: &KeyboardReport) {
        if let Err(e) = self.writer.write(&report.to_bytes()).await {
            warn!("keyboard: report dropped: {}", e);
        }
    }

    fn is_connected(&self) -> bool {
        CONFIGURED.load(Ordering::Acquire)
    }
}
