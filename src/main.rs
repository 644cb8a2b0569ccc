#![no_std]
#![no_main]

mod board;
mod flash_store;
mod leds;
mod usb_handler;

use defmt::*;
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::flash::Flash;
use embassy_rp::gpio::{Level, Output};
use embassy_rp::peripherals::USB;
use embassy_rp::usb::{Driver, InterruptHandler};
use embassy_rp::watchdog::Watchdog;
use embassy_usb::class::hid::{self, HidBootProtocol, HidSubclass, HidWriter, State};
use embassy_usb::Builder;
use panic_probe as _;
use static_cell::StaticCell;

use tinykb::config::*;
use tinykb::report::{KEYBOARD_REPORT_DESCRIPTOR, RAWHID_REPORT_DESCRIPTOR};
use tinykb::supervisor::{run_keyboard, run_programming};
use tinykb::{select_mode, Engine, Mode, RawHid, Storage};

use crate::board::{EmbassyClock, RpReset};
use crate::flash_store::FlashEeprom;
use crate::leds::StatusLight;
use crate::usb_handler::{
    DeviceHandler, HidKeyboard, KeyboardRequestHandler, RawHidHandler, UsbDriver, UsbLink, RAW_HID,
};

// =============================================================================
// Interrupt bindings
// =============================================================================

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => InterruptHandler<USB>;
});

// =============================================================================
// Entry point
// =============================================================================

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    info!("tinykb starting up");

    let mut reset = RpReset::new(Watchdog::new(p.WATCHDOG));
    let mode = select_mode(&mut reset);

    // ---- Status LED (Pico onboard, GPIO25) ----
    let led = StatusLight::new(Output::new(p.PIN_25, Level::Low));

    // ---- Script store ----
    let flash = Flash::<_, _, FLASH_SIZE>::new_blocking(p.FLASH);
    let storage = Storage::new(FlashEeprom::new(flash));

    let driver = Driver::new(p.USB, Irqs);

    match mode {
        Mode::Programming => programming_mode(spawner, driver, storage, led, reset).await,
        Mode::Keyboard => keyboard_mode(spawner, driver, storage, led).await,
    }
}

// =============================================================================
// USB device construction
// =============================================================================

fn usb_builder(driver: UsbDriver, pid: u16, product: &'static str) -> Builder<'static, UsbDriver> {
    let mut usb_config = embassy_usb::Config::new(USB_VID, pid);
    usb_config.manufacturer = Some(USB_MANUFACTURER);
    usb_config.product = Some(product);
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    // Descriptor buffers (must be 'static)
    static CONFIG_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static BOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static MSOS_DESC: StaticCell<[u8; 256]> = StaticCell::new();
    static CONTROL_BUF: StaticCell<[u8; 128]> = StaticCell::new();

    let mut builder = Builder::new(
        driver,
        usb_config,
        CONFIG_DESC.init([0; 256]),
        BOS_DESC.init([0; 256]),
        MSOS_DESC.init([0; 256]),
        CONTROL_BUF.init([0; 128]),
    );

    static HANDLER: StaticCell<DeviceHandler> = StaticCell::new();
    builder.handler(HANDLER.init(DeviceHandler));
    builder
}

// =============================================================================
// Modes
// =============================================================================

async fn programming_mode(
    spawner: Spawner,
    driver: UsbDriver,
    storage: Storage<FlashEeprom<'static>>,
    mut led: StatusLight<'static>,
    mut reset: RpReset,
) -> ! {
    critical_section::with(|cs| {
        RAW_HID.borrow(cs).replace(Some(RawHid::new(storage)));
    });

    let mut builder = usb_builder(driver, USB_PID_PROGRAMMER, USB_PRODUCT_PROGRAMMER);

    static STATE: StaticCell<State> = StaticCell::new();
    static REQUESTS: StaticCell<RawHidHandler> = StaticCell::new();
    let config = hid::Config {
        report_descriptor: RAWHID_REPORT_DESCRIPTOR,
        request_handler: Some(REQUESTS.init(RawHidHandler)),
        poll_ms: USB_POLL_MS,
        max_packet_size: REPORT_SIZE as u16,
        hid_subclass: HidSubclass::No,
        hid_boot_protocol: HidBootProtocol::None,
    };
    // Replies travel over GET_REPORT; the IN endpoint only has to exist.
    let _writer = HidWriter::<_, REPORT_SIZE>::new(&mut builder, STATE.init(State::new()), config);

    spawner.must_spawn(usb_device_task(builder.build()));
    info!(
        "programmer ready, VID:PID = {:04x}:{:04x}",
        USB_VID, USB_PID_PROGRAMMER
    );

    run_programming(&mut UsbLink, &EmbassyClock, &mut led, &mut reset).await
}

async fn keyboard_mode(
    spawner: Spawner,
    driver: UsbDriver,
    storage: Storage<FlashEeprom<'static>>,
    mut led: StatusLight<'static>,
) -> ! {
    let mut builder = usb_builder(driver, USB_PID_KEYBOARD, USB_PRODUCT_KEYBOARD);

    static STATE: StaticCell<State> = StaticCell::new();
    static REQUESTS: StaticCell<KeyboardRequestHandler> = StaticCell::new();
    let config = hid::Config {
        report_descriptor: KEYBOARD_REPORT_DESCRIPTOR,
        request_handler: Some(REQUESTS.init(KeyboardRequestHandler)),
        poll_ms: USB_POLL_MS,
        max_packet_size: KEYBOARD_REPORT_SIZE as u16,
        hid_subclass: HidSubclass::Boot,
        hid_boot_protocol: HidBootProtocol::Keyboard,
    };
    let writer = HidWriter::<_, KEYBOARD_REPORT_SIZE>::new(&mut builder, STATE.init(State::new()), config);

    spawner.must_spawn(usb_device_task(builder.build()));
    info!(
        "keyboard ready, VID:PID = {:04x}:{:04x}, script {} bytes",
        USB_VID,
        USB_PID_KEYBOARD,
        storage.script_length()
    );

    let mut keyboard = HidKeyboard::new(writer);
    let mut engine = Engine::new();
    run_keyboard(&storage, &mut engine, &mut keyboard, &EmbassyClock, &mut led).await
}

// =============================================================================
// USB device task: runs the USB stack, dispatches control transfers
// =============================================================================

#[embassy_executor::task]
async fn usb_device_task(mut usb: embassy_usb::UsbDevice<'static, UsbDriver>) {
    usb.run().await;
}
