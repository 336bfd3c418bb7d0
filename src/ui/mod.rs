//! User-facing I/O - status LEDs and the user button.
//!
//! The button driver reports `(button_state, has_changed)` bit masks, one
//! bit per button. [`ButtonTransition::from_masks`] turns that into a press
//! or release of the monitored button; only a press bumps the advertised
//! counter, both ends are notified to the central.
//!
//! ## Components
//!
//! - **LED1**: run status, blinks while the firmware is alive
//! - **LED2**: connection status, lit while a central is connected
//! - **Button 1**: user button

/// LEDs driven by the firmware.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Led {
    RunStatus,
    ConnectionStatus,
}

/// LED boundary.
pub trait Leds {
    fn set(&mut self, led: Led, on: bool);
}

/// Edge of the monitored button.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonTransition {
    Pressed,
    Released,
}

impl ButtonTransition {
    /// Decode the driver's masks for the button selected by `mask`.
    ///
    /// Returns `None` when that button did not change.
    pub fn from_masks(button_state: u32, has_changed: u32, mask: u32) -> Option<Self> {
        if has_changed & mask == 0 {
            return None;
        }
        if button_state & mask != 0 {
            Some(ButtonTransition::Pressed)
        } else {
            Some(ButtonTransition::Released)
        }
    }

    pub fn is_press(&self) -> bool {
        matches!(self, ButtonTransition::Pressed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BTN1: u32 = 1 << 0;
    const BTN2: u32 = 1 << 1;

    #[test]
    fn rising_edge_is_a_press() {
        assert_eq!(
            ButtonTransition::from_masks(BTN1, BTN1, BTN1),
            Some(ButtonTransition::Pressed)
        );
    }

    #[test]
    fn falling_edge_is_a_release() {
        assert_eq!(
            ButtonTransition::from_masks(0, BTN1, BTN1),
            Some(ButtonTransition::Released)
        );
    }

    #[test]
    fn other_buttons_are_ignored() {
        assert_eq!(ButtonTransition::from_masks(BTN2, BTN2, BTN1), None);
        // Held but unchanged.
        assert_eq!(ButtonTransition::from_masks(BTN1 | BTN2, BTN2, BTN1), None);
    }
}
