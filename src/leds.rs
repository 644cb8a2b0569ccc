/// Status LED: lit while programming, blinks when the keyboard connects.
use embassy_rp::gpio::Output;

use tinykb::hal::StatusLed;

pub struct StatusLight<'d> {
    pin: Output<'d>,
}

impl<'d> StatusLight<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

impl StatusLed for StatusLight<'_> {
    fn on(&mut self) {
        self.pin.set_high();
    }

    fn off(&mut self) {
        self.pin.set_low();
    }

    fn toggle(&mut self) {
        self.pin.toggle();
    }
}
