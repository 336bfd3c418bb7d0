//! Bluetooth Low Energy subsystem.
//!
//! The firmware runs the radio in **Peripheral** role:
//!
//! 1. **Advertising** - connectable advertising with the device name and a
//!    button press counter in the manufacturer data, updated in place on
//!    every press and restarted once a dropped link has been recycled.
//! 2. **Connection lifecycle** - tracks the single live connection and,
//!    after a short settle time, negotiates 2M PHY, maximum data length
//!    and the ATT MTU one request at a time.
//! 3. **Coordinator** - drains the event queue fed by the stack callbacks
//!    and the button task, and drives the two state machines above.
//!
//! All radio calls go through [`radio::RadioStack`]; the embedded binary
//! backs it with the SoftDevice.

pub mod adv_payload;
pub mod advertising;
pub mod connection;
pub mod coordinator;
pub mod radio;

pub use advertising::{Advertiser, PressCounter};
pub use connection::{ConnectionController, LinkPhase, LinkStep};
pub use coordinator::{BleCoordinator, RadioEvent};
pub use radio::{NotificationSink, RadioStack};
