//! tempsound - BLE environmental beacon for nRF52840.
//!
//! Advertises a button press counter, negotiates 2M PHY / data length /
//! MTU with the connected central and prints BME280 readings once per
//! second.
//!
//! ## Tasks
//!
//! | Task              | Role                                                 |
//! |-------------------|------------------------------------------------------|
//! | `softdevice_task` | SoftDevice event pump                                |
//! | `advertiser_task` | connectable advertising + GATT server per connection |
//! | `ble_task`        | event coordinator: advertising + link negotiation    |
//! | `button_task`     | user button edges                                    |
//! | `blink_task`      | run-status LED                                       |
//! | `sensor_task`     | acquire → decode → render loop                       |
//!
//! All radio calls are made from `ble_task`; everything else reaches it
//! through the `EVENTS` channel.

#![no_std]
#![no_main]

mod board;
mod env_sensor;
mod softdevice;

use defmt::{error, info, unwrap, warn};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::Pin;
use embassy_nrf::peripherals::TWISPI0;
use embassy_nrf::twim::{self, Twim};
use embassy_nrf::{bind_interrupts, config::Config, interrupt};
use embassy_time::{Delay, Instant, Timer};
use nrf_softdevice::{raw, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

use tempsound::ble::{BleCoordinator, PressCounter};
use tempsound::config::{NegotiationConfig, DEVICE_NAME, PREFERRED_ATT_MTU};
use tempsound::error::BootstrapError;
use tempsound::sensor::pipeline::run_sensor;
use tempsound::sensor::Terminate;

use crate::board::{blink_task, button_task, BoardLeds};
use crate::env_sensor::EnvSensor;
use crate::softdevice::{
    advertiser_task, register_status, softdevice_task, LbsNotifier, SdRadio, Server, EVENTS,
};

type Coordinator = BleCoordinator<'static, SdRadio, BoardLeds, LbsNotifier>;
type Sensor = EnvSensor<Twim<'static, TWISPI0>>;

bind_interrupts!(struct Irqs {
    SPIM0_SPIS0_TWIM0_TWIS0_SPI0_TWI0 => twim::InterruptHandler<TWISPI0>;
});

static PRESS_COUNTER: PressCounter = PressCounter::new();
static SERVER: StaticCell<Server> = StaticCell::new();

fn fatal(err: BootstrapError) -> ! {
    error!("Fatal: {} (exit {})", err, err.exit_code());
    defmt::panic!("bootstrap failed")
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("{} starting", DEVICE_NAME);

    // Interrupt priorities must avoid the levels reserved by the SoftDevice (0, 1, 4).
    let mut nrf_config = Config::default();
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let p = embassy_nrf::init(nrf_config);

    // ═══════════════════════════════════════════════════════════════════
    // LEDs & button
    // ═══════════════════════════════════════════════════════════════════

    let leds = BoardLeds::init(p.P0_13.degrade(), p.P0_14.degrade());
    unwrap!(spawner.spawn(blink_task(leds)));
    unwrap!(spawner.spawn(button_task(p.P0_11.degrade())));

    // ═══════════════════════════════════════════════════════════════════
    // SoftDevice
    // ═══════════════════════════════════════════════════════════════════

    let sd_config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        conn_gatt: Some(raw::ble_gatt_conn_cfg_t {
            att_mtu: PREFERRED_ATT_MTU,
        }),
        gatts_attr_tab_size: Some(raw::ble_gatts_cfg_attr_tab_size_t {
            attr_tab_size: raw::BLE_GATTS_ATTR_TAB_SIZE_DEFAULT,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    };

    let sd = Softdevice::enable(&sd_config);
    let server = match Server::new(sd) {
        Ok(server) => SERVER.init(server),
        Err(e) => fatal(BootstrapError::GattServer(register_status(e))),
    };
    unwrap!(spawner.spawn(softdevice_task(sd)));

    // ═══════════════════════════════════════════════════════════════════
    // BLE coordinator
    // ═══════════════════════════════════════════════════════════════════

    let mut coordinator = BleCoordinator::new(
        SdRadio::new(sd),
        &PRESS_COUNTER,
        NegotiationConfig::default(),
        leds,
        LbsNotifier::new(server),
    );
    if let Err(err) = coordinator.enable() {
        fatal(err);
    }
    unwrap!(spawner.spawn(advertiser_task(sd, server)));
    if coordinator.start().is_err() {
        warn!("Continuing without advertising");
    }
    unwrap!(spawner.spawn(ble_task(coordinator)));

    // ═══════════════════════════════════════════════════════════════════
    // Sensor
    // ═══════════════════════════════════════════════════════════════════

    let i2c = Twim::new(p.TWISPI0, Irqs, p.P0_26, p.P0_27, twim::Config::default());
    unwrap!(spawner.spawn(sensor_task(Some(EnvSensor::new(i2c)))));

    info!("System initialized");
}

/// Drains [`EVENTS`] and wakes for negotiation deadlines.
#[embassy_executor::task]
async fn ble_task(mut coordinator: Coordinator) -> ! {
    loop {
        let event = match coordinator.service(Instant::now()) {
            Some(deadline) => match select(EVENTS.receive(), Timer::at(deadline)).await {
                Either::First(event) => Some(event),
                Either::Second(()) => None,
            },
            None => Some(EVENTS.receive().await),
        };
        if let Some(event) = event {
            coordinator.handle(event, Instant::now());
        }
    }
}

/// Sensor loop. When it ends the exit code is logged and the BLE side
/// keeps running.
#[embassy_executor::task]
async fn sensor_task(device: Option<Sensor>) {
    let termination = run_sensor(device, Terminate, &mut Delay, |line| info!("{}", line)).await;
    info!("Sensor loop ended with exit code {}", termination.exit_code());
}
