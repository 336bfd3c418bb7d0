//! Boundary to the Bluetooth stack.
//!
//! Everything the lifecycle controller and the advertiser need from the
//! radio is expressed through [`RadioStack`]; the embedded binary backs it
//! with the SoftDevice, tests back it with a recording mock. Every call is
//! a request: its outcome, when there is one, arrives later as an event.

use crate::error::StatusCode;

/// Radio-layer modulation of a link direction.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phy {
    /// 1 Mbps.
    Le1M,
    /// 2 Mbps.
    Le2M,
    /// Long range (coded).
    Coded,
}

impl Phy {
    pub fn label(&self) -> &'static str {
        match self {
            Phy::Le1M => "1M",
            Phy::Le2M => "2M",
            Phy::Coded => "Long Range",
        }
    }
}

/// Preferred PHY sent with the PHY update request.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhyPreference {
    pub tx: Phy,
    pub rx: Phy,
}

impl PhyPreference {
    /// 2 Mbps in both directions.
    pub const fn symmetric_2m() -> Self {
        Self {
            tx: Phy::Le2M,
            rx: Phy::Le2M,
        }
    }
}

/// Result of a completed PHY update procedure.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhyInfo {
    pub tx: Phy,
    pub rx: Phy,
}

/// Data length requested for the link-layer packets.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataLengthParams {
    pub tx_max_len: u16,
    pub tx_max_time_us: u16,
}

impl DataLengthParams {
    pub const fn maximum() -> Self {
        Self {
            tx_max_len: crate::config::DATA_LEN_MAX,
            tx_max_time_us: crate::config::DATA_TIME_MAX,
        }
    }
}

/// Data length in effect after a data-length update.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataLengthInfo {
    pub tx_max_len: u16,
    pub tx_max_time_us: u16,
    pub rx_max_len: u16,
    pub rx_max_time_us: u16,
}

/// Connection parameters in controller units.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnParams {
    /// Connection interval, 1.25 ms units.
    pub interval: u16,
    /// Peripheral latency, in connection events.
    pub latency: u16,
    /// Supervision timeout, 10 ms units.
    pub timeout: u16,
}

impl ConnParams {
    /// Connection interval in milliseconds.
    pub fn interval_ms(&self) -> f32 {
        self.interval as f32 * 1.25
    }

    /// Supervision timeout in milliseconds.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout as u32 * 10
    }
}

/// Advertising parameters for a connectable, identity-address set.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdvParams {
    /// Advertise with the identity address rather than a private one.
    pub use_identity: bool,
    /// Accept connections.
    pub connectable: bool,
    /// Interval window, 0.625 ms units.
    pub interval_min: u32,
    pub interval_max: u32,
}

impl Default for AdvParams {
    fn default() -> Self {
        Self {
            use_identity: true,
            connectable: true,
            interval_min: crate::config::ADV_INTERVAL_MIN,
            interval_max: crate::config::ADV_INTERVAL_MAX,
        }
    }
}

/// Operations the firmware issues against the Bluetooth stack.
///
/// All calls are made from one execution context (the BLE coordinator), so
/// implementations need no internal locking.
pub trait RadioStack {
    /// Owning, reference-counted handle to a connection.
    type Peer: Clone;

    fn enable(&mut self) -> Result<(), StatusCode>;

    fn advertising_start(
        &mut self,
        adv_data: &[u8],
        scan_data: &[u8],
        params: &AdvParams,
    ) -> Result<(), StatusCode>;

    /// Replace the payload of the running advertising set in place.
    fn advertising_update(&mut self, adv_data: &[u8], scan_data: &[u8]) -> Result<(), StatusCode>;

    /// Snapshot of the current connection parameters.
    fn conn_params(&mut self, peer: &Self::Peer) -> Result<ConnParams, StatusCode>;

    fn phy_update(&mut self, peer: &Self::Peer, pref: PhyPreference) -> Result<(), StatusCode>;

    fn data_length_update(
        &mut self,
        peer: &Self::Peer,
        params: DataLengthParams,
    ) -> Result<(), StatusCode>;

    fn mtu_exchange(&mut self, peer: &Self::Peer) -> Result<(), StatusCode>;
}

/// Sink for the button-state characteristic.
pub trait NotificationSink<P> {
    fn send_button_state(&mut self, peer: &P, pressed: bool) -> Result<(), StatusCode>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_params_unit_conversions() {
        let p = ConnParams {
            interval: 24,
            latency: 0,
            timeout: 400,
        };
        assert_eq!(p.interval_ms(), 30.0);
        assert_eq!(ConnParams { interval: 6, ..p }.interval_ms(), 7.5);
        assert_eq!(p.timeout_ms(), 4000);
    }

    #[test]
    fn default_adv_params_match_half_second_window() {
        let p = AdvParams::default();
        assert!(p.connectable && p.use_identity);
        assert_eq!(p.interval_min * 625, 500_000);
        assert_eq!(p.interval_max * 625, 500_625);
    }

    #[test]
    fn phy_labels() {
        assert_eq!(Phy::Le1M.label(), "1M");
        assert_eq!(Phy::Le2M.label(), "2M");
        assert_eq!(Phy::Coded.label(), "Long Range");
    }
}
