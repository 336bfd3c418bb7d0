//! nRF52840-DK board glue: LEDs, user button and run-LED blink.
//!
//! The DK LEDs and buttons are active-low. LED pins live behind a blocking
//! mutex so the blink task and the BLE coordinator can both drive them.

use core::cell::RefCell;

use defmt::info;
use embassy_nrf::gpio::{AnyPin, Input, Level, Output, OutputDrive, Pull};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Timer};

use tempsound::ble::RadioEvent;
use tempsound::config::{BUTTON_DEBOUNCE_MS, RUN_LED_BLINK_INTERVAL_MS, USER_BUTTON_MASK};
use tempsound::ui::{ButtonTransition, Led, Leds};

use crate::softdevice::EVENTS;

struct Pins {
    run: Output<'static>,
    conn: Output<'static>,
}

static LEDS: Mutex<CriticalSectionRawMutex, RefCell<Option<Pins>>> =
    Mutex::new(RefCell::new(None));

/// Handle to the shared LED pins.
#[derive(Clone, Copy)]
pub struct BoardLeds;

impl BoardLeds {
    /// Take ownership of the LED pins, all off.
    pub fn init(run: AnyPin, conn: AnyPin) -> Self {
        let pins = Pins {
            run: Output::new(run, Level::High, OutputDrive::Standard),
            conn: Output::new(conn, Level::High, OutputDrive::Standard),
        };
        LEDS.lock(|cell| cell.replace(Some(pins)));
        BoardLeds
    }

    fn toggle_run(&self) {
        LEDS.lock(|cell| {
            if let Some(pins) = cell.borrow_mut().as_mut() {
                pins.run.toggle();
            }
        });
    }
}

impl Leds for BoardLeds {
    fn set(&mut self, led: Led, on: bool) {
        let level = if on { Level::Low } else { Level::High };
        LEDS.lock(|cell| {
            if let Some(pins) = cell.borrow_mut().as_mut() {
                match led {
                    Led::RunStatus => pins.run.set_level(level),
                    Led::ConnectionStatus => pins.conn.set_level(level),
                }
            }
        });
    }
}

/// Blink the run LED for as long as the firmware is alive.
#[embassy_executor::task]
pub async fn blink_task(leds: BoardLeds) -> ! {
    loop {
        leds.toggle_run();
        Timer::after(Duration::from_millis(RUN_LED_BLINK_INTERVAL_MS)).await;
    }
}

/// Watch the user button and post both edges to the BLE coordinator.
///
/// The pin state is folded into the `(button_state, has_changed)` masks so
/// edge decoding stays in [`ButtonTransition::from_masks`].
#[embassy_executor::task]
pub async fn button_task(pin: AnyPin) -> ! {
    let mut btn = Input::new(pin, Pull::Up);
    let mut last_state = 0u32;

    loop {
        btn.wait_for_any_edge().await;

        // Debounce: wait and re-sample.
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;

        let state = if btn.is_low() { USER_BUTTON_MASK } else { 0 };
        let changed = state ^ last_state;
        last_state = state;

        if let Some(transition) = ButtonTransition::from_masks(state, changed, USER_BUTTON_MASK) {
            if transition.is_press() {
                info!("Button pressed");
            } else {
                info!("Button released");
            }
            EVENTS.send(RadioEvent::Button(transition)).await;
        }
    }
}
