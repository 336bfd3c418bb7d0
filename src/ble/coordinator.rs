//! Event dispatcher for the BLE side.
//!
//! The radio stack, the button task and the timers all post [`RadioEvent`]s
//! into one queue. The coordinator drains it from a single task, so the
//! lifecycle controller and the advertiser never see concurrent calls.
//! After every event (and whenever the deadline from [`service`] expires)
//! the owner calls [`service`] to flush due work.
//!
//! [`service`]: BleCoordinator::service

use embassy_time::Instant;

use crate::ble::advertising::{Advertiser, PressCounter};
use crate::ble::connection::{ConnectionController, NegotiationRequest, RequestOutcome};
use crate::ble::radio::{
    AdvParams, ConnParams, DataLengthInfo, NotificationSink, PhyInfo, RadioStack,
};
use crate::config::NegotiationConfig;
use crate::error::{BootstrapError, Error, LinkError, RadioOp, RadioStackError, StatusCode};
use crate::ui::{ButtonTransition, Leds};

/// Everything the coordinator reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RadioEvent<P> {
    /// Connection established (`err == 0`) or failed (HCI error).
    Connected { peer: P, err: u8 },
    Disconnected { reason: u8 },
    /// The stack released the previous connection object.
    Recycled,
    ParamsUpdated(ConnParams),
    PhyUpdated(Result<PhyInfo, StatusCode>),
    DataLengthUpdated(Result<DataLengthInfo, StatusCode>),
    /// ATT MTU on success.
    MtuExchanged(Result<u16, StatusCode>),
    Button(ButtonTransition),
}

pub struct BleCoordinator<'c, R: RadioStack, L, N> {
    radio: R,
    link: ConnectionController<R::Peer, L>,
    advertiser: Advertiser<'c>,
    notifier: N,
}

impl<'c, R, L, N> BleCoordinator<'c, R, L, N>
where
    R: RadioStack,
    L: Leds,
    N: NotificationSink<R::Peer>,
{
    pub fn new(
        radio: R,
        counter: &'c PressCounter,
        config: NegotiationConfig,
        leds: L,
        notifier: N,
    ) -> Self {
        Self {
            radio,
            link: ConnectionController::new(config, leds),
            advertiser: Advertiser::new(counter, AdvParams::default()),
            notifier,
        }
    }

    /// Enable the Bluetooth stack. Failure is fatal.
    pub fn enable(&mut self) -> Result<(), BootstrapError> {
        self.radio.enable().map_err(|status| {
            error!("Bluetooth init failed (err {})", status.0);
            BootstrapError::BluetoothEnable(status)
        })?;
        info!("Bluetooth initialized");
        Ok(())
    }

    /// Start advertising. Failure is logged and the firmware carries on.
    pub fn start(&mut self) -> Result<(), Error> {
        self.advertiser.start(&mut self.radio)
    }

    pub fn handle(&mut self, event: RadioEvent<R::Peer>, now: Instant) {
        match event {
            RadioEvent::Connected { peer, err } => {
                match self.link.on_connect(&peer, err, now) {
                    Ok(()) => self.advertiser.on_connected(),
                    Err(LinkError::ConnectFailed(_)) => self.advertiser.on_connect_failed(),
                    Err(LinkError::AlreadyConnected) => {}
                }
                // `peer` dropped here; the session holds its own handle.
            }
            RadioEvent::Disconnected { reason } => {
                if self.link.on_disconnect(reason) {
                    self.advertiser.on_link_closed();
                }
            }
            RadioEvent::Recycled => {
                let _ = self.advertiser.on_peer_recycled(&mut self.radio);
            }
            RadioEvent::ParamsUpdated(params) => self.link.on_le_param_updated(params),
            RadioEvent::PhyUpdated(result) => self.link.on_phy_updated(result),
            RadioEvent::DataLengthUpdated(result) => self.link.on_data_length_updated(result),
            RadioEvent::MtuExchanged(result) => self.link.on_mtu_exchange_result(result),
            RadioEvent::Button(transition) => self.on_button(transition),
        }
    }

    fn on_button(&mut self, transition: ButtonTransition) {
        if transition.is_press() {
            let _ = self.advertiser.on_button_rising_edge(&mut self.radio);
        }
        let Some(peer) = self.link.peer() else {
            return;
        };
        if let Err(status) = self.notifier.send_button_state(peer, transition.is_press()) {
            let err = RadioStackError::new(RadioOp::Notify, status);
            warn!("Couldn't send button state: {}", err);
        }
    }

    /// Flush pending work and return when it must be called again.
    ///
    /// Republishes the advertising payload if presses are pending, then
    /// issues every negotiation request that is due at `now`.
    pub fn service(&mut self, now: Instant) -> Option<Instant> {
        let _ = self.advertiser.republish(&mut self.radio);

        while let Some(request) = self.link.poll(now) {
            let Some(peer) = self.link.peer() else {
                break;
            };
            let outcome = issue(&mut self.radio, peer, request);
            self.link.complete(outcome, now);
        }

        self.link.next_deadline()
    }

    pub fn link(&self) -> &ConnectionController<R::Peer, L> {
        &self.link
    }

    pub fn advertiser(&self) -> &Advertiser<'c> {
        &self.advertiser
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }
}

fn issue<R: RadioStack>(
    radio: &mut R,
    peer: &R::Peer,
    request: NegotiationRequest,
) -> RequestOutcome {
    match request {
        NegotiationRequest::ReadConnParams => RequestOutcome::ConnParams(radio.conn_params(peer)),
        NegotiationRequest::Phy(pref) => {
            debug!("Requesting PHY update");
            RequestOutcome::Phy(radio.phy_update(peer, pref))
        }
        NegotiationRequest::DataLength(params) => {
            debug!("Requesting data length update");
            RequestOutcome::DataLength(radio.data_length_update(peer, params))
        }
        NegotiationRequest::Mtu => {
            debug!("Requesting MTU exchange");
            RequestOutcome::Mtu(radio.mtu_exchange(peer))
        }
    }
}
