//! Advertising payload manager.
//!
//! Owns the lifecycle of the advertising set: the first start at boot,
//! in-place payload updates after button presses, and the restart once a
//! disconnected link has been fully recycled by the stack.
//!
//! The press counter is shared with the button context. The button side
//! only bumps the counter and raises a pending flag; the coordinator side
//! consumes the flag and republishes whatever the counter holds at that
//! moment. Several presses between two republishes therefore coalesce into
//! one update, but none is lost.

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::ble::adv_payload::{AdvertisingPayload, EncodedPayload};
use crate::ble::radio::{AdvParams, RadioStack};
use crate::error::{Error, PayloadError, RadioOp, RadioStackError};

/// Button press counter embedded in the manufacturer data.
pub struct PressCounter {
    count: AtomicU16,
    pending: AtomicBool,
}

impl PressCounter {
    pub const fn new() -> Self {
        Self {
            count: AtomicU16::new(0),
            pending: AtomicBool::new(false),
        }
    }

    /// Count one rising edge. Safe from any context; wraps at 2^16.
    pub fn record_press(&self) -> u16 {
        let n = self.count.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        self.pending.store(true, Ordering::Release);
        n
    }

    pub fn count(&self) -> u16 {
        self.count.load(Ordering::Acquire)
    }

    /// Whether a republish is owed.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Clear the pending flag, returning whether it was set.
    ///
    /// Must be called before reading the count for the republish, so a press
    /// landing in between re-arms the flag.
    fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for PressCounter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Advertiser<'c> {
    counter: &'c PressCounter,
    params: AdvParams,
    advertising: bool,
    awaiting_recycle: bool,
    last_published: Option<u16>,
}

impl<'c> Advertiser<'c> {
    pub fn new(counter: &'c PressCounter, params: AdvParams) -> Self {
        Self {
            counter,
            params,
            advertising: false,
            awaiting_recycle: false,
            last_published: None,
        }
    }

    fn snapshot(&self) -> Result<(u16, EncodedPayload), PayloadError> {
        let count = self.counter.count();
        let encoded = AdvertisingPayload::new(count).encode()?;
        Ok((count, encoded))
    }

    /// Submit the current payload and start connectable advertising.
    ///
    /// Failure is logged; the firmware keeps running without advertising.
    pub fn start<R: RadioStack>(&mut self, radio: &mut R) -> Result<(), Error> {
        // Anything pending is covered by this snapshot.
        self.counter.take_pending();
        let (count, payload) = self.snapshot()?;

        match radio.advertising_start(&payload.adv, &payload.scan, &self.params) {
            Ok(()) => {
                info!("Advertising successfully started (press count {})", count);
                self.advertising = true;
                self.last_published = Some(count);
                Ok(())
            }
            Err(status) => {
                error!("Advertising failed to start (err {})", status.0);
                Err(RadioStackError::new(RadioOp::AdvertisingStart, status).into())
            }
        }
    }

    /// Republish the payload if presses arrived since the last publish.
    ///
    /// Uses the in-place update so a live connection is not disturbed.
    /// Returns `None` when nothing was pending.
    pub fn republish<R: RadioStack>(&mut self, radio: &mut R) -> Option<Result<(), Error>> {
        if !self.counter.take_pending() {
            return None;
        }
        let (count, payload) = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => return Some(Err(e.into())),
        };

        let result = match radio.advertising_update(&payload.adv, &payload.scan) {
            Ok(()) => {
                debug!("Advertising data updated (press count {})", count);
                self.last_published = Some(count);
                Ok(())
            }
            Err(status) => {
                warn!("Advertising data update failed (err {})", status.0);
                Err(RadioStackError::new(RadioOp::AdvertisingUpdate, status).into())
            }
        };
        Some(result)
    }

    /// Rising edge of the user button, delivered on the serialized radio
    /// context: count it and republish immediately.
    pub fn on_button_rising_edge<R: RadioStack>(&mut self, radio: &mut R) -> Result<(), Error> {
        self.counter.record_press();
        self.republish(radio).unwrap_or(Ok(()))
    }

    /// A central connected; connectable advertising has stopped.
    pub fn on_connected(&mut self) {
        self.advertising = false;
    }

    /// A connection attempt failed. The stack has stopped the set, so the
    /// next recycle restarts it.
    pub fn on_connect_failed(&mut self) {
        self.advertising = false;
        self.awaiting_recycle = true;
    }

    /// A session was torn down; advertising restarts on the next recycle.
    pub fn on_link_closed(&mut self) {
        self.advertising = false;
        self.awaiting_recycle = true;
    }

    /// The stack released the previous connection object.
    ///
    /// Restarts advertising once per closed link or failed connection.
    /// Returns `None` when nothing was waiting for this recycle.
    pub fn on_peer_recycled<R: RadioStack>(&mut self, radio: &mut R) -> Option<Result<(), Error>> {
        if !self.awaiting_recycle {
            debug!("Recycle without a closed link, ignoring");
            return None;
        }
        self.awaiting_recycle = false;
        info!("Connection object available from previous conn. Disconnect is complete!");
        Some(self.start(radio))
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn awaiting_recycle(&self) -> bool {
        self.awaiting_recycle
    }

    /// Press count carried by the most recent successful submit.
    pub fn last_published(&self) -> Option<u16> {
        self.last_published
    }
}
