//! Connection lifecycle controller.
//!
//! Single peripheral role: at most one [`ConnectionSession`] is live.
//!
//! ```text
//! Idle ──connect(0)──▶ Connected(Negotiating) ──all settled──▶ Connected(Ready)
//!   ▲                          │                                   │
//!   └────────── disconnect ────┴───────────────────────────────────┘
//! ```
//!
//! After a connection is accepted the controller schedules, strictly in
//! order and never in parallel:
//!
//! 1. a settle delay, then a snapshot of the connection parameters,
//! 2. the PHY request (2M both ways),
//! 3. the inter-request delay (or, with [`Pacing::AwaitConfirmation`], the
//!    PHY confirmation),
//! 4. the data-length request, then the MTU exchange.
//!
//! The controller performs no I/O. The coordinator asks [`poll`] for the
//! next due request, issues it against the radio, and reports back through
//! [`complete`]. Confirmations arrive separately as events; only they move
//! a sub-state to `Confirmed` or `Failed`. Nothing is retried and there is
//! no timeout: a confirmation that never comes leaves its sub-state at
//! `Requested`.
//!
//! [`poll`]: ConnectionController::poll
//! [`complete`]: ConnectionController::complete

use embassy_time::Instant;
use heapless::Vec;

use crate::ble::radio::{ConnParams, DataLengthInfo, DataLengthParams, PhyInfo, PhyPreference};
use crate::config::{NegotiationConfig, Pacing, ATT_HEADER_LEN};
use crate::error::{LinkError, RadioOp, RadioStackError, StatusCode};
use crate::ui::{Led, Leds};

/// Progress of one negotiation procedure within a session.
///
/// Only ever moves `Pending → Requested → {Confirmed | Failed}`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStep {
    Pending,
    Requested,
    Confirmed,
    Failed,
}

impl LinkStep {
    pub fn is_settled(&self) -> bool {
        matches!(self, LinkStep::Confirmed | LinkStep::Failed)
    }

    fn request(&mut self) {
        if *self == LinkStep::Pending {
            *self = LinkStep::Requested;
        }
    }

    /// Settle a requested step. Returns `false` if the step was not waiting.
    fn settle(&mut self, ok: bool) -> bool {
        if *self != LinkStep::Requested {
            return false;
        }
        *self = if ok {
            LinkStep::Confirmed
        } else {
            LinkStep::Failed
        };
        true
    }
}

/// Coarse state of the controller.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkPhase {
    Idle,
    Negotiating,
    Ready,
}

/// A radio call the controller wants issued.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationRequest {
    ReadConnParams,
    Phy(PhyPreference),
    DataLength(DataLengthParams),
    Mtu,
}

impl NegotiationRequest {
    pub fn op(&self) -> RadioOp {
        match self {
            NegotiationRequest::ReadConnParams => RadioOp::ConnInfo,
            NegotiationRequest::Phy(_) => RadioOp::PhyUpdate,
            NegotiationRequest::DataLength(_) => RadioOp::DataLengthUpdate,
            NegotiationRequest::Mtu => RadioOp::MtuExchange,
        }
    }
}

/// What the radio returned when a [`NegotiationRequest`] was issued.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    ConnParams(Result<ConnParams, StatusCode>),
    Phy(Result<(), StatusCode>),
    DataLength(Result<(), StatusCode>),
    Mtu(Result<(), StatusCode>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Settle(Instant),
    ReadParams,
    RequestPhy,
    Gap(Instant),
    AwaitPhy,
    RequestDataLength,
    AwaitDataLength,
    RequestMtu,
    /// A request was handed out and its issue result is not back yet.
    Issued(RadioOp),
    Done,
    /// The parameter snapshot failed; no requests are made for this session.
    Abandoned,
}

/// State of the single live connection.
pub struct ConnectionSession<P> {
    peer: P,
    phy: LinkStep,
    data_length: LinkStep,
    mtu: LinkStep,
    negotiated_mtu: Option<u16>,
    params: Option<ConnParams>,
    phy_info: Option<PhyInfo>,
    data_length_info: Option<DataLengthInfo>,
    rejected: Vec<RadioStackError, 3>,
    stage: Stage,
}

impl<P> ConnectionSession<P> {
    fn new(peer: P, settle_until: Instant) -> Self {
        Self {
            peer,
            phy: LinkStep::Pending,
            data_length: LinkStep::Pending,
            mtu: LinkStep::Pending,
            negotiated_mtu: None,
            params: None,
            phy_info: None,
            data_length_info: None,
            rejected: Vec::new(),
            stage: Stage::Settle(settle_until),
        }
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn phy_state(&self) -> LinkStep {
        self.phy
    }

    pub fn data_length_state(&self) -> LinkStep {
        self.data_length
    }

    pub fn mtu_state(&self) -> LinkStep {
        self.mtu
    }

    /// ATT MTU agreed in the exchange.
    pub fn negotiated_mtu(&self) -> Option<u16> {
        self.negotiated_mtu
    }

    /// Usable attribute payload per PDU.
    pub fn payload_mtu(&self) -> Option<u16> {
        self.negotiated_mtu
            .map(|mtu| mtu.saturating_sub(ATT_HEADER_LEN))
    }

    pub fn conn_params(&self) -> Option<ConnParams> {
        self.params
    }

    pub fn phy_info(&self) -> Option<PhyInfo> {
        self.phy_info
    }

    pub fn data_length_info(&self) -> Option<DataLengthInfo> {
        self.data_length_info
    }

    /// Requests the radio refused at issue time.
    pub fn rejected_requests(&self) -> &[RadioStackError] {
        &self.rejected
    }

    fn was_rejected(&self, op: RadioOp) -> bool {
        self.rejected.iter().any(|e| e.op == op)
    }

    fn is_negotiating(&self) -> bool {
        let finished = matches!(self.stage, Stage::Done | Stage::Abandoned);
        !finished || [self.phy, self.data_length, self.mtu].contains(&LinkStep::Requested)
    }
}

pub struct ConnectionController<P, L> {
    config: NegotiationConfig,
    preferred_phy: PhyPreference,
    leds: L,
    session: Option<ConnectionSession<P>>,
}

impl<P: Clone, L: Leds> ConnectionController<P, L> {
    pub fn new(config: NegotiationConfig, leds: L) -> Self {
        Self {
            config,
            preferred_phy: PhyPreference::symmetric_2m(),
            leds,
            session: None,
        }
    }

    /// A central connected (`err == 0`) or a connection attempt failed.
    ///
    /// On success a session is created holding its own reference to `peer`
    /// and the negotiation sequence is scheduled from `now`.
    pub fn on_connect(&mut self, peer: &P, err: u8, now: Instant) -> Result<(), LinkError> {
        if err != 0 {
            error!("connection error, on_connected, err: {}", err);
            return Err(LinkError::ConnectFailed(err));
        }
        if self.session.is_some() {
            warn!("Connection while a session is live, ignoring");
            return Err(LinkError::AlreadyConnected);
        }

        info!("Connected");
        self.session = Some(ConnectionSession::new(
            peer.clone(),
            now + self.config.connect_settle,
        ));
        self.leds.set(Led::ConnectionStatus, true);
        Ok(())
    }

    /// The link went down. Releases the peer handle.
    ///
    /// Returns `true` if a session was closed. Advertising is not restarted
    /// here; that waits for the stack to recycle the connection.
    pub fn on_disconnect(&mut self, reason: u8) -> bool {
        info!("Disconnected because {}", reason);
        let closed = self.session.take().is_some();
        if !closed {
            warn!("Disconnect without a live session");
        }
        self.leds.set(Led::ConnectionStatus, false);
        closed
    }

    pub fn on_le_param_updated(&mut self, params: ConnParams) {
        info!(
            "Connection parameters updated: interval {} ms, latency {} intervals, timeout {} ms",
            params.interval_ms(),
            params.latency,
            params.timeout_ms()
        );
        if let Some(session) = self.session.as_mut() {
            session.params = Some(params);
        }
    }

    pub fn on_phy_updated(&mut self, result: Result<PhyInfo, StatusCode>) {
        let preferred = self.preferred_phy;
        let Some(session) = self.session.as_mut() else {
            warn!("PHY update without a live session");
            return;
        };
        let ok = match result {
            Ok(info) => {
                info!("PHY updated. New PHY: {}", info.tx.label());
                session.phy_info = Some(info);
                info.tx == preferred.tx && info.rx == preferred.rx
            }
            Err(status) => {
                error!("PHY update failed (err {})", status.0);
                false
            }
        };
        if session.phy.settle(ok) && !ok {
            warn!("PHY negotiation failed, staying on current PHY");
        }
    }

    pub fn on_data_length_updated(&mut self, result: Result<DataLengthInfo, StatusCode>) {
        let Some(session) = self.session.as_mut() else {
            warn!("Data length update without a live session");
            return;
        };
        let ok = match result {
            Ok(info) => {
                info!(
                    "Data length updated. Length {}/{} bytes, time {}/{} us",
                    info.tx_max_len,
                    info.rx_max_len,
                    info.tx_max_time_us,
                    info.rx_max_time_us
                );
                session.data_length_info = Some(info);
                true
            }
            Err(status) => {
                error!("Data length update failed (err {})", status.0);
                false
            }
        };
        session.data_length.settle(ok);
    }

    /// Result of the MTU exchange; `Ok` carries the ATT MTU.
    pub fn on_mtu_exchange_result(&mut self, result: Result<u16, StatusCode>) {
        let Some(session) = self.session.as_mut() else {
            warn!("MTU exchange result without a live session");
            return;
        };
        match result {
            Ok(att_mtu) => {
                info!("MTU exchange successful");
                session.negotiated_mtu = Some(att_mtu);
                info!("New MTU: {} bytes", att_mtu.saturating_sub(ATT_HEADER_LEN));
                session.mtu.settle(true);
            }
            Err(status) => {
                info!("MTU exchange failed (err {})", status.0);
                session.mtu.settle(false);
            }
        }
    }

    /// Next negotiation request due at `now`, if any.
    pub fn poll(&mut self, now: Instant) -> Option<NegotiationRequest> {
        let preferred = self.preferred_phy;
        let session = self.session.as_mut()?;

        loop {
            match session.stage {
                Stage::Settle(until) | Stage::Gap(until) if now < until => return None,
                Stage::Settle(_) => session.stage = Stage::ReadParams,
                Stage::Gap(_) => session.stage = Stage::RequestDataLength,
                Stage::AwaitPhy => {
                    if session.phy.is_settled() || session.was_rejected(RadioOp::PhyUpdate) {
                        session.stage = Stage::RequestDataLength;
                    } else {
                        return None;
                    }
                }
                Stage::AwaitDataLength => {
                    if session.data_length.is_settled()
                        || session.was_rejected(RadioOp::DataLengthUpdate)
                    {
                        session.stage = Stage::RequestMtu;
                    } else {
                        return None;
                    }
                }
                Stage::ReadParams => {
                    session.stage = Stage::Issued(RadioOp::ConnInfo);
                    return Some(NegotiationRequest::ReadConnParams);
                }
                Stage::RequestPhy => {
                    session.phy.request();
                    session.stage = Stage::Issued(RadioOp::PhyUpdate);
                    return Some(NegotiationRequest::Phy(preferred));
                }
                Stage::RequestDataLength => {
                    session.data_length.request();
                    session.stage = Stage::Issued(RadioOp::DataLengthUpdate);
                    return Some(NegotiationRequest::DataLength(DataLengthParams::maximum()));
                }
                Stage::RequestMtu => {
                    session.mtu.request();
                    session.stage = Stage::Issued(RadioOp::MtuExchange);
                    return Some(NegotiationRequest::Mtu);
                }
                Stage::Issued(_) | Stage::Done | Stage::Abandoned => return None,
            }
        }
    }

    /// Report what the radio returned for the request handed out by [`poll`].
    ///
    /// [`poll`]: ConnectionController::poll
    pub fn complete(&mut self, outcome: RequestOutcome, now: Instant) {
        let config = self.config;
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let (op, issue) = match outcome {
            RequestOutcome::ConnParams(result) => {
                match result {
                    Ok(params) => {
                        info!(
                            "connection params: interval {} ms, latency {} intervals, timeout {} ms",
                            params.interval_ms(),
                            params.latency,
                            params.timeout_ms()
                        );
                        session.params = Some(params);
                        session.stage = Stage::RequestPhy;
                    }
                    Err(status) => {
                        error!("Cannot get connection info err: {}", status.0);
                        session.stage = Stage::Abandoned;
                    }
                }
                return;
            }
            RequestOutcome::Phy(r) => (RadioOp::PhyUpdate, r),
            RequestOutcome::DataLength(r) => (RadioOp::DataLengthUpdate, r),
            RequestOutcome::Mtu(r) => (RadioOp::MtuExchange, r),
        };

        if session.stage != Stage::Issued(op) {
            warn!("Unexpected completion for {}", op);
            return;
        }

        if let Err(status) = issue {
            error!("{} request failed (err {})", op, status.0);
            let _ = session.rejected.push(RadioStackError::new(op, status));
        }

        session.stage = match (op, config.pacing) {
            (RadioOp::PhyUpdate, Pacing::FixedDelay) => {
                Stage::Gap(now + config.inter_request_delay)
            }
            (RadioOp::PhyUpdate, Pacing::AwaitConfirmation) => Stage::AwaitPhy,
            (RadioOp::DataLengthUpdate, Pacing::FixedDelay) => Stage::RequestMtu,
            (RadioOp::DataLengthUpdate, Pacing::AwaitConfirmation) => Stage::AwaitDataLength,
            _ => Stage::Done,
        };
    }

    /// When [`poll`] should be called next for a time-based stage.
    ///
    /// [`poll`]: ConnectionController::poll
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.session.as_ref()?.stage {
            Stage::Settle(t) | Stage::Gap(t) => Some(t),
            _ => None,
        }
    }

    pub fn phase(&self) -> LinkPhase {
        match &self.session {
            None => LinkPhase::Idle,
            Some(s) if s.is_negotiating() => LinkPhase::Negotiating,
            Some(_) => LinkPhase::Ready,
        }
    }

    pub fn session(&self) -> Option<&ConnectionSession<P>> {
        self.session.as_ref()
    }

    /// Handle to the connected peer, for the notification path.
    pub fn peer(&self) -> Option<&P> {
        self.session.as_ref().map(|s| &s.peer)
    }

    pub fn leds(&self) -> &L {
        &self.leds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::radio::Phy;
    use embassy_time::Duration;
    use std::rc::Rc;

    #[derive(Default)]
    struct LedState {
        connection: bool,
    }

    impl Leds for LedState {
        fn set(&mut self, led: Led, on: bool) {
            if led == Led::ConnectionStatus {
                self.connection = on;
            }
        }
    }

    const PARAMS: ConnParams = ConnParams {
        interval: 24,
        latency: 0,
        timeout: 400,
    };

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn controller(pacing: Pacing) -> ConnectionController<Rc<u8>, LedState> {
        let config = NegotiationConfig {
            pacing,
            ..Default::default()
        };
        ConnectionController::new(config, LedState::default())
    }

    fn issue_ok(
        c: &mut ConnectionController<Rc<u8>, LedState>,
        now: Instant,
    ) -> Option<NegotiationRequest> {
        let req = c.poll(now)?;
        let outcome = match req {
            NegotiationRequest::ReadConnParams => RequestOutcome::ConnParams(Ok(PARAMS)),
            NegotiationRequest::Phy(_) => RequestOutcome::Phy(Ok(())),
            NegotiationRequest::DataLength(_) => RequestOutcome::DataLength(Ok(())),
            NegotiationRequest::Mtu => RequestOutcome::Mtu(Ok(())),
        };
        c.complete(outcome, now);
        Some(req)
    }

    /// Issue every request, stepping time to each deadline. Returns the
    /// requests in issue order.
    fn negotiate_all(
        c: &mut ConnectionController<Rc<u8>, LedState>,
        start: Instant,
    ) -> std::vec::Vec<NegotiationRequest> {
        let mut now = start;
        let mut issued = std::vec::Vec::new();
        loop {
            if let Some(req) = issue_ok(c, now) {
                issued.push(req);
                continue;
            }
            match c.next_deadline() {
                Some(deadline) => now = now.max(deadline),
                None => return issued,
            }
        }
    }

    #[test]
    fn failed_connect_creates_no_session() {
        let mut c = controller(Pacing::FixedDelay);
        let peer = Rc::new(0);
        assert_eq!(
            c.on_connect(&peer, 0x3e, at(0)),
            Err(LinkError::ConnectFailed(0x3e))
        );
        assert_eq!(c.phase(), LinkPhase::Idle);
        assert!(c.poll(at(10_000)).is_none());
        assert!(!c.leds().connection);
        assert_eq!(Rc::strong_count(&peer), 1);
    }

    #[test]
    fn second_connect_is_rejected() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(1), 0, at(0)).unwrap();
        assert_eq!(
            c.on_connect(&Rc::new(2), 0, at(5)),
            Err(LinkError::AlreadyConnected)
        );
        assert_eq!(**c.peer().unwrap(), 1);
    }

    #[test]
    fn fixed_delay_sequence_order_and_timing() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        assert!(c.leds().connection);
        assert_eq!(c.phase(), LinkPhase::Negotiating);

        // Settle delay before anything is read.
        assert_eq!(c.next_deadline(), Some(at(100)));
        assert!(c.poll(at(99)).is_none());

        assert_eq!(
            issue_ok(&mut c, at(100)),
            Some(NegotiationRequest::ReadConnParams)
        );
        assert_eq!(
            issue_ok(&mut c, at(100)),
            Some(NegotiationRequest::Phy(PhyPreference::symmetric_2m()))
        );
        assert_eq!(c.session().unwrap().phy_state(), LinkStep::Requested);

        // Inter-request gap.
        assert_eq!(c.next_deadline(), Some(at(1100)));
        assert!(issue_ok(&mut c, at(1099)).is_none());

        assert_eq!(
            issue_ok(&mut c, at(1100)),
            Some(NegotiationRequest::DataLength(DataLengthParams::maximum()))
        );
        assert_eq!(issue_ok(&mut c, at(1100)), Some(NegotiationRequest::Mtu));
        assert!(issue_ok(&mut c, at(5000)).is_none());

        let s = c.session().unwrap();
        assert_eq!(s.conn_params(), Some(PARAMS));
        assert_eq!(s.data_length_state(), LinkStep::Requested);
        assert_eq!(s.mtu_state(), LinkStep::Requested);
        // Nothing is observed until the stack reports it.
        assert_eq!(s.phy_info(), None);
        assert_eq!(s.data_length_info(), None);
        assert_eq!(s.payload_mtu(), None);
        assert_eq!(c.phase(), LinkPhase::Negotiating);
    }

    #[test]
    fn confirmations_make_the_link_ready() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        assert_eq!(negotiate_all(&mut c, at(0)).len(), 4);
        assert_eq!(c.session().unwrap().mtu_state(), LinkStep::Requested);

        c.on_phy_updated(Ok(PhyInfo {
            tx: Phy::Le2M,
            rx: Phy::Le2M,
        }));
        c.on_data_length_updated(Ok(DataLengthInfo {
            tx_max_len: 251,
            tx_max_time_us: 2120,
            rx_max_len: 251,
            rx_max_time_us: 2120,
        }));
        c.on_mtu_exchange_result(Ok(247));

        let s = c.session().unwrap();
        assert_eq!(s.phy_state(), LinkStep::Confirmed);
        assert_eq!(s.data_length_state(), LinkStep::Confirmed);
        assert_eq!(s.mtu_state(), LinkStep::Confirmed);
        assert_eq!(s.negotiated_mtu(), Some(247));
        assert_eq!(s.payload_mtu(), Some(244));
        assert_eq!(c.phase(), LinkPhase::Ready);
    }

    #[test]
    fn failures_are_terminal_and_not_retried() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        assert_eq!(negotiate_all(&mut c, at(0)).len(), 4);

        // Peer stays on 1M: PHY negotiation failed, link still usable.
        c.on_phy_updated(Ok(PhyInfo {
            tx: Phy::Le1M,
            rx: Phy::Le1M,
        }));
        c.on_data_length_updated(Err(StatusCode(0x1a)));
        c.on_mtu_exchange_result(Err(StatusCode(0x0e)));

        // A late success must not revisit a settled step.
        c.on_phy_updated(Ok(PhyInfo {
            tx: Phy::Le2M,
            rx: Phy::Le2M,
        }));

        let s = c.session().unwrap();
        assert_eq!(s.phy_state(), LinkStep::Failed);
        assert_eq!(s.data_length_state(), LinkStep::Failed);
        assert_eq!(s.mtu_state(), LinkStep::Failed);
        assert_eq!(s.phy_info().unwrap().tx, Phy::Le2M);
        assert_eq!(s.negotiated_mtu(), None);
        assert!(c.poll(at(20_000)).is_none());
        assert_eq!(c.phase(), LinkPhase::Ready);
    }

    #[test]
    fn peer_initiated_update_does_not_advance_pending_step() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        c.on_phy_updated(Ok(PhyInfo {
            tx: Phy::Le2M,
            rx: Phy::Le2M,
        }));
        assert_eq!(c.session().unwrap().phy_state(), LinkStep::Pending);
    }

    #[test]
    fn rejected_request_stays_requested() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        issue_ok(&mut c, at(100));
        assert!(matches!(c.poll(at(100)), Some(NegotiationRequest::Phy(_))));
        c.complete(RequestOutcome::Phy(Err(StatusCode(-12))), at(100));

        let s = c.session().unwrap();
        assert_eq!(s.phy_state(), LinkStep::Requested);
        assert_eq!(
            s.rejected_requests(),
            &[RadioStackError::new(RadioOp::PhyUpdate, StatusCode(-12))]
        );
        // The sequence carries on after the gap.
        assert!(matches!(
            c.poll(at(1100)),
            Some(NegotiationRequest::DataLength(_))
        ));
    }

    #[test]
    fn conn_info_failure_abandons_negotiation() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        assert_eq!(c.poll(at(100)), Some(NegotiationRequest::ReadConnParams));
        c.complete(RequestOutcome::ConnParams(Err(StatusCode(-22))), at(100));

        assert!(c.poll(at(10_000)).is_none());
        let s = c.session().unwrap();
        assert_eq!(s.phy_state(), LinkStep::Pending);
        assert_eq!(c.phase(), LinkPhase::Ready);
    }

    #[test]
    fn await_confirmation_waits_for_each_step() {
        let mut c = controller(Pacing::AwaitConfirmation);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        issue_ok(&mut c, at(100));
        assert!(matches!(
            issue_ok(&mut c, at(100)),
            Some(NegotiationRequest::Phy(_))
        ));

        // No time-based gap; blocked on the PHY confirmation.
        assert_eq!(c.next_deadline(), None);
        assert!(c.poll(at(60_000)).is_none());

        c.on_phy_updated(Ok(PhyInfo {
            tx: Phy::Le2M,
            rx: Phy::Le2M,
        }));
        assert!(matches!(
            issue_ok(&mut c, at(60_001)),
            Some(NegotiationRequest::DataLength(_))
        ));
        assert!(c.poll(at(60_002)).is_none());

        c.on_data_length_updated(Err(StatusCode(0x1a)));
        assert_eq!(issue_ok(&mut c, at(60_003)), Some(NegotiationRequest::Mtu));
    }

    #[test]
    fn await_confirmation_skips_past_rejected_request() {
        let mut c = controller(Pacing::AwaitConfirmation);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        issue_ok(&mut c, at(100));
        c.poll(at(100)).unwrap();
        c.complete(RequestOutcome::Phy(Err(StatusCode(-5))), at(100));

        assert!(matches!(
            c.poll(at(101)),
            Some(NegotiationRequest::DataLength(_))
        ));
    }

    #[test]
    fn disconnect_releases_peer_and_clears_led() {
        let mut c = controller(Pacing::FixedDelay);
        let peer = Rc::new(7);
        c.on_connect(&peer, 0, at(0)).unwrap();
        assert_eq!(Rc::strong_count(&peer), 2);

        assert!(c.on_disconnect(0x13));
        assert_eq!(Rc::strong_count(&peer), 1);
        assert!(!c.leds().connection);
        assert_eq!(c.phase(), LinkPhase::Idle);
        assert!(c.poll(at(10_000)).is_none());

        assert!(!c.on_disconnect(0x13));
    }

    #[test]
    fn disconnect_mid_negotiation_drops_schedule() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        issue_ok(&mut c, at(100));
        issue_ok(&mut c, at(100));
        c.on_disconnect(0x08);

        assert_eq!(c.next_deadline(), None);
        c.on_connect(&Rc::new(1), 0, at(2000)).unwrap();
        assert_eq!(c.session().unwrap().phy_state(), LinkStep::Pending);
        assert_eq!(
            c.next_deadline(),
            Some(at(2000) + Duration::from_millis(crate::config::CONNECT_SETTLE_MS))
        );
    }

    #[test]
    fn param_update_is_recorded_without_renegotiation() {
        let mut c = controller(Pacing::FixedDelay);
        c.on_connect(&Rc::new(0), 0, at(0)).unwrap();
        assert_eq!(negotiate_all(&mut c, at(0)).len(), 4);

        let updated = ConnParams {
            interval: 6,
            latency: 2,
            timeout: 200,
        };
        c.on_le_param_updated(updated);
        assert_eq!(c.session().unwrap().conn_params(), Some(updated));
        assert!(c.poll(at(20_000)).is_none());
    }
}
