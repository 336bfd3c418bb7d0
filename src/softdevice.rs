//! SoftDevice S140 backing for the radio boundary.
//!
//! - [`SdRadio`] implements [`RadioStack`] on top of nrf-softdevice. The
//!   peer handle is the reference-counted [`Connection`].
//! - [`advertiser_task`] owns the advertising future. `advertising_start`
//!   hands it a fresh payload through a signal; `advertising_update`
//!   reconfigures the running set in place with
//!   `sd_ble_gap_adv_set_configure` and never stops it.
//! - [`LbsNotifier`] sends the button state over the LED Button Service.
//!
//! nrf-softdevice consumes the PHY, data-length and MTU completion events
//! internally and exposes no hook for them, so no confirmation is posted:
//! the requested steps stay `Requested` on target.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use defmt::{error, info, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use nrf_softdevice::ble::gatt_server::{self, NotifyValueError, RegisterError};
use nrf_softdevice::ble::{peripheral, Connection};
use nrf_softdevice::{raw, Softdevice};

use tempsound::ble::adv_payload::{AdData, EncodedPayload, AD_MAX_LEN};
use tempsound::ble::radio::{
    AdvParams, ConnParams, DataLengthParams, NotificationSink, Phy, PhyPreference, RadioStack,
};
use tempsound::ble::RadioEvent;
use tempsound::config::{PREFERRED_ATT_MTU, STATIC_ADDRESS};
use tempsound::error::StatusCode;

/// Event queue drained by the BLE coordinator task.
pub static EVENTS: Channel<CriticalSectionRawMutex, RadioEvent<Connection>, 8> = Channel::new();

static PAYLOAD: Mutex<CriticalSectionRawMutex, RefCell<Option<(EncodedPayload, AdvParams)>>> =
    Mutex::new(RefCell::new(None));
static ADV_START: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Set while `advertise_connectable` owns the advertising set.
static ADVERTISING: AtomicBool = AtomicBool::new(false);

/// Handle of the only advertising set (`adv_set_count: 1`).
const ADV_SET_HANDLE: u8 = 0;

/// Data buffers for in-place updates. The SoftDevice keeps reading the
/// buffers of the running set, so each update fills the other pair.
struct UpdateBuffers {
    adv: [[u8; AD_MAX_LEN]; 2],
    scan: [[u8; AD_MAX_LEN]; 2],
    next: usize,
}

static UPDATE_BUFFERS: Mutex<CriticalSectionRawMutex, RefCell<UpdateBuffers>> =
    Mutex::new(RefCell::new(UpdateBuffers {
        adv: [[0; AD_MAX_LEN]; 2],
        scan: [[0; AD_MAX_LEN]; 2],
        next: 0,
    }));

const NOT_CONNECTED: StatusCode = StatusCode(raw::BLE_ERROR_INVALID_CONN_HANDLE as i32);

// ═══════════════════════════════════════════════════════════════════════════
// GATT server
// ═══════════════════════════════════════════════════════════════════════════

#[nrf_softdevice::gatt_service(uuid = "00001523-1212-efde-1523-785feabcd123")]
pub struct LedButtonService {
    #[characteristic(uuid = "00001524-1212-efde-1523-785feabcd123", read, notify)]
    button: u8,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub lbs: LedButtonService,
}

pub struct LbsNotifier {
    server: &'static Server,
}

impl LbsNotifier {
    pub fn new(server: &'static Server) -> Self {
        Self { server }
    }
}

impl NotificationSink<Connection> for LbsNotifier {
    fn send_button_state(&mut self, peer: &Connection, pressed: bool) -> Result<(), StatusCode> {
        let value = pressed as u8;
        if let Err(e) = self.server.lbs.button_set(&value) {
            warn!("Couldn't store button state: {:?}", e);
        }
        self.server
            .lbs
            .button_notify(peer, &value)
            .map_err(|e| match e {
                NotifyValueError::Disconnected => NOT_CONNECTED,
                NotifyValueError::Raw(err) => StatusCode(err as u32 as i32),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Radio adapter
// ═══════════════════════════════════════════════════════════════════════════

pub struct SdRadio {
    sd: &'static Softdevice,
}

impl SdRadio {
    pub fn new(sd: &'static Softdevice) -> Self {
        Self { sd }
    }

    fn submit(
        &self,
        adv: &[u8],
        scan: &[u8],
        params: Option<&AdvParams>,
    ) -> Result<(), StatusCode> {
        let (Ok(adv), Ok(scan)) = (AdData::from_slice(adv), AdData::from_slice(scan)) else {
            return Err(StatusCode(raw::NRF_ERROR_DATA_SIZE as i32));
        };
        PAYLOAD.lock(|cell| {
            let mut slot = cell.borrow_mut();
            let params = params
                .copied()
                .or(slot.as_ref().map(|(_, p)| *p))
                .unwrap_or_default();
            *slot = Some((EncodedPayload { adv, scan }, params));
        });
        Ok(())
    }
}

/// Map a GATT table registration failure to its raw status.
pub fn register_status(err: RegisterError) -> StatusCode {
    match err {
        RegisterError::Raw(e) => StatusCode(e as u32 as i32),
    }
}

/// Swap new data into the running set without stopping it.
fn configure_in_place(adv: &[u8], scan: &[u8]) -> Result<(), StatusCode> {
    UPDATE_BUFFERS.lock(|cell| {
        let mut bufs = cell.borrow_mut();
        let slot = bufs.next;
        bufs.adv[slot][..adv.len()].copy_from_slice(adv);
        bufs.scan[slot][..scan.len()].copy_from_slice(scan);

        let data = raw::ble_gap_adv_data_t {
            adv_data: raw::ble_gap_data_t {
                p_data: bufs.adv[slot].as_mut_ptr(),
                len: adv.len() as u16,
            },
            scan_rsp_data: raw::ble_gap_data_t {
                p_data: bufs.scan[slot].as_mut_ptr(),
                len: scan.len() as u16,
            },
        };
        let mut handle = ADV_SET_HANDLE;
        // NULL params: data-only update of the configured set.
        check(unsafe {
            raw::sd_ble_gap_adv_set_configure(&mut handle, &data, core::ptr::null())
        })?;
        bufs.next ^= 1;
        Ok(())
    })
}

fn check(ret: u32) -> Result<(), StatusCode> {
    StatusCode::check(ret as i32)
}

fn phy_bits(phy: Phy) -> u8 {
    (match phy {
        Phy::Le1M => raw::BLE_GAP_PHY_1MBPS,
        Phy::Le2M => raw::BLE_GAP_PHY_2MBPS,
        Phy::Coded => raw::BLE_GAP_PHY_CODED,
    }) as u8
}

impl RadioStack for SdRadio {
    type Peer = Connection;

    fn enable(&mut self) -> Result<(), StatusCode> {
        let mut enabled = 0u8;
        check(unsafe { raw::sd_softdevice_is_enabled(&mut enabled) })?;
        if enabled == 0 {
            return Err(StatusCode(raw::NRF_ERROR_SOFTDEVICE_NOT_ENABLED as i32));
        }

        let addr = raw::ble_gap_addr_t {
            _bitfield_1: raw::ble_gap_addr_t::new_bitfield_1(
                0,
                raw::BLE_GAP_ADDR_TYPE_RANDOM_STATIC as u8,
            ),
            addr: STATIC_ADDRESS,
        };
        if let Err(status) = check(unsafe { raw::sd_ble_gap_addr_set(&addr) }) {
            warn!("Creating new ID failed (err {})", status.0);
        }
        info!("Identity address: {}", nrf_softdevice::ble::get_address(self.sd));
        Ok(())
    }

    fn advertising_start(
        &mut self,
        adv_data: &[u8],
        scan_data: &[u8],
        params: &AdvParams,
    ) -> Result<(), StatusCode> {
        self.submit(adv_data, scan_data, Some(params))?;
        ADV_START.signal(());
        Ok(())
    }

    fn advertising_update(&mut self, adv_data: &[u8], scan_data: &[u8]) -> Result<(), StatusCode> {
        // Buffered for the next start; also applied live if the set is up.
        self.submit(adv_data, scan_data, None)?;
        if ADVERTISING.load(Ordering::Acquire) {
            configure_in_place(adv_data, scan_data)?;
        }
        Ok(())
    }

    fn conn_params(&mut self, peer: &Connection) -> Result<ConnParams, StatusCode> {
        peer.handle().ok_or(NOT_CONNECTED)?;
        // The SoftDevice exposes no getter for the live parameters; report
        // the peripheral preferred ones it negotiates with.
        let mut params: raw::ble_gap_conn_params_t = unsafe { core::mem::zeroed() };
        check(unsafe { raw::sd_ble_gap_ppcp_get(&mut params) })?;
        Ok(ConnParams {
            interval: params.max_conn_interval,
            latency: params.slave_latency,
            timeout: params.conn_sup_timeout,
        })
    }

    fn phy_update(&mut self, peer: &Connection, pref: PhyPreference) -> Result<(), StatusCode> {
        let handle = peer.handle().ok_or(NOT_CONNECTED)?;
        let phys = raw::ble_gap_phys_t {
            tx_phys: phy_bits(pref.tx),
            rx_phys: phy_bits(pref.rx),
        };
        check(unsafe { raw::sd_ble_gap_phy_update(handle, &phys) })
    }

    fn data_length_update(
        &mut self,
        peer: &Connection,
        params: DataLengthParams,
    ) -> Result<(), StatusCode> {
        let handle = peer.handle().ok_or(NOT_CONNECTED)?;
        let dl = raw::ble_gap_data_length_params_t {
            max_tx_octets: params.tx_max_len,
            max_rx_octets: params.tx_max_len,
            max_tx_time_us: params.tx_max_time_us,
            max_rx_time_us: params.tx_max_time_us,
        };
        check(unsafe {
            raw::sd_ble_gap_data_length_update(handle, &dl, core::ptr::null_mut())
        })
    }

    fn mtu_exchange(&mut self, peer: &Connection) -> Result<(), StatusCode> {
        let handle = peer.handle().ok_or(NOT_CONNECTED)?;
        check(unsafe { raw::sd_ble_gattc_exchange_mtu_request(handle, PREFERRED_ATT_MTU) })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tasks
// ═══════════════════════════════════════════════════════════════════════════

#[embassy_executor::task]
pub async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

/// Runs connectable advertising whenever the coordinator asks for it and
/// serves the GATT server while a central is connected.
#[embassy_executor::task]
pub async fn advertiser_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    loop {
        ADV_START.wait().await;

        let Some((payload, params)) = PAYLOAD.lock(|cell| cell.borrow().clone()) else {
            continue;
        };
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &payload.adv,
            scan_data: &payload.scan,
        };
        let config = peripheral::Config {
            interval: params.interval_min,
            ..Default::default()
        };

        // The set is configured and started before the first yield, so no
        // in-place update can land ahead of it.
        ADVERTISING.store(true, Ordering::Release);
        let result = peripheral::advertise_connectable(sd, adv, &config).await;
        ADVERTISING.store(false, Ordering::Release);

        let conn = match result {
            Ok(conn) => conn,
            Err(e) => {
                error!("Advertising stopped: {:?}", e);
                continue;
            }
        };

        EVENTS
            .send(RadioEvent::Connected {
                peer: conn.clone(),
                err: 0,
            })
            .await;

        // Returns when the link drops.
        let _ = gatt_server::run(&conn, server, |e| match e {
            ServerEvent::Lbs(LedButtonServiceEvent::ButtonCccdWrite { notifications }) => {
                info!("Button notifications enabled: {}", notifications);
            }
        })
        .await;

        // The wrapper does not report the HCI reason.
        EVENTS.send(RadioEvent::Disconnected { reason: 0 }).await;
        drop(conn);
        EVENTS.send(RadioEvent::Recycled).await;
    }
}
