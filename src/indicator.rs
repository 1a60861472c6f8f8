/// Connection indicator LED.
///
/// Solid on while a peer is connected; blinks while advertising.
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embedded_hal::digital::OutputPin;

use crate::bus::{MessageBus, Subscriber};
use crate::defaults::{BLINK_TICKS, INDICATOR_PERIOD_MS};
use crate::module::{self, Module, Services};
use crate::protocol::topics;

struct Led<P> {
    pin: P,
    lit: bool,
}

impl<P: OutputPin> Led<P> {
    fn set(&mut self, lit: bool) {
        let result = if lit {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => self.lit = lit,
            Err(_) => log::warn!("[{}] Pin write failed", NAME),
        }
    }
}

const NAME: &str = "Indicator";

const SUBSCRIPTIONS: &[&str] = &[topics::CONNECTED, topics::DISCONNECTED];

pub struct Indicator<P: OutputPin> {
    led: Mutex<CriticalSectionRawMutex, RefCell<Led<P>>>,
    connected: AtomicBool,
    ticks: AtomicU32,
    bus: Option<&'static MessageBus>,
    services: Option<&'static dyn Services>,
    initialized: AtomicBool,
}

impl<P: OutputPin> Indicator<P> {
    pub const NAME: &'static str = NAME;

    pub const fn new(pin: P) -> Self {
        Self {
            led: Mutex::new(RefCell::new(Led { pin, lit: false })),
            connected: AtomicBool::new(false),
            ticks: AtomicU32::new(0),
            bus: None,
            services: None,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_lit(&self) -> bool {
        self.led.lock(|led| led.borrow().lit)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl<P: OutputPin + Send + 'static> Subscriber for Indicator<P> {
    fn on_message(&self, topic: &str, _payload: &[u8]) {
        match topic {
            topics::CONNECTED => self.connected.store(true, Ordering::Release),
            topics::DISCONNECTED => self.connected.store(false, Ordering::Release),
            _ => {}
        }
        self.ticks.store(0, Ordering::Relaxed);
    }
}

impl<P: OutputPin + Send + 'static> Module for Indicator<P> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn period_ms(&self) -> u32 {
        INDICATOR_PERIOD_MS
    }

    fn bind(&mut self, bus: &'static MessageBus, services: &'static dyn Services) {
        self.bus = Some(bus);
        self.services = Some(services);
    }

    fn setup(&'static self) -> bool {
        let (Some(bus), Some(_)) = (self.bus, self.services) else {
            log::error!("[{}] ERROR: Missing collaborators", NAME);
            return false;
        };
        if self.initialized.load(Ordering::Acquire) {
            log::error!("[{}] Setup called twice", NAME);
            return false;
        }
        if !module::subscribe_all(bus, NAME, SUBSCRIPTIONS, self) {
            return false;
        }
        self.led.lock(|led| led.borrow_mut().set(false));
        self.initialized.store(true, Ordering::Release);
        log::info!("[{}] Setup complete", NAME);
        true
    }

    fn update(&self) {
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }
        if self.is_connected() {
            self.led.lock(|led| {
                let mut led = led.borrow_mut();
                if !led.lit {
                    led.set(true);
                }
            });
            return;
        }

        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks >= BLINK_TICKS {
            self.ticks.store(0, Ordering::Relaxed);
            self.led.lock(|led| {
                let mut led = led.borrow_mut();
                let lit = led.lit;
                led.set(!lit);
            });
        }
    }

    fn teardown(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus {
            module::unsubscribe_all(bus, NAME, SUBSCRIPTIONS);
        }
        self.led.lock(|led| led.borrow_mut().set(false));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::testing::FakeServices;
    use core::convert::Infallible;
    use embedded_hal::digital::ErrorType;

    #[derive(Default)]
    struct FakePin {
        high: bool,
        writes: u32,
    }

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.high = false;
            self.writes += 1;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.high = true;
            self.writes += 1;
            Ok(())
        }
    }

    fn indicator() -> (&'static Indicator<FakePin>, &'static MessageBus) {
        let bus: &'static MessageBus = Box::leak(Box::new(MessageBus::new()));
        let mut indicator = Indicator::new(FakePin::default());
        indicator.bind(bus, FakeServices::leak());
        let indicator: &'static Indicator<FakePin> = Box::leak(Box::new(indicator));
        assert!(indicator.setup());
        (indicator, bus)
    }

    fn pin_high(indicator: &Indicator<FakePin>) -> bool {
        indicator.led.lock(|led| led.borrow().pin.high)
    }

    #[test]
    fn blinks_while_disconnected() {
        let (indicator, _) = indicator();
        assert!(!indicator.is_lit());

        for _ in 0..BLINK_TICKS - 1 {
            indicator.update();
        }
        assert!(!indicator.is_lit());
        indicator.update();
        assert!(indicator.is_lit());
        assert!(pin_high(indicator));

        for _ in 0..BLINK_TICKS {
            indicator.update();
        }
        assert!(!indicator.is_lit());
    }

    #[test]
    fn solid_while_connected() {
        let (indicator, bus) = indicator();
        bus.publish(topics::CONNECTED, &[1]);
        assert!(indicator.is_connected());

        for _ in 0..3 * BLINK_TICKS {
            indicator.update();
            assert!(indicator.is_lit());
        }
        // Only one write while already lit.
        assert_eq!(indicator.led.lock(|led| led.borrow().pin.writes), 2);

        bus.publish(topics::DISCONNECTED, &[0]);
        assert!(!indicator.is_connected());
    }

    #[test]
    fn teardown_turns_led_off_and_unsubscribes() {
        let (indicator, bus) = indicator();
        bus.publish(topics::CONNECTED, &[1]);
        indicator.update();
        indicator.teardown();
        assert!(!pin_high(indicator));
        assert_eq!(bus.subscriber_count(topics::CONNECTED), 0);
        assert_eq!(bus.subscriber_count(topics::DISCONNECTED), 0);
    }

    #[test]
    fn setup_fails_when_unbound() {
        let indicator: &'static Indicator<FakePin> =
            Box::leak(Box::new(Indicator::new(FakePin::default())));
        assert!(!indicator.setup());
    }
}
