//! FT4222H vendor protocol constants and helpers
//!
//! The FT4222H is driven entirely with vendor control transfers; there is
//! no MPSSE engine. Configuration commands are packed into `wValue` as
//! `(data << 8) | cmd` and sent with `CONFIG_REQUEST`.
//!
//! When strapped into mode 3 the chip enumerates a second interface that
//! carries the four GPIO ports. Ports 2 and 3 double as the suspend-out and
//! wake-up pins and must be released from those roles before use.

/// FTDI vendor ID
pub const FTDI_VID: u16 = 0x0403;
/// FT4222H product ID
pub const FT4222H_PID: u16 = 0x601C;

/// USB request codes
pub const FT4222_RESET_REQUEST: u8 = 0x00;
pub const FT4222_INFO_REQUEST: u8 = 0x20;
pub const FT4222_CONFIG_REQUEST: u8 = 0x21;

/// Reset command values (wValue for RESET_REQUEST)
pub const FT4222_RESET_SIO: u16 = 0x0000;
pub const FT4222_OUTPUT_FLUSH: u16 = 0x0001;
pub const FT4222_INPUT_FLUSH: u16 = 0x0002;

/// Info command values (wValue for INFO_REQUEST)
pub const FT4222_GET_VERSION: u16 = 0x0000;
pub const FT4222_GET_CONFIG: u16 = 0x0001;
/// Unverified against hardware
pub const FT4222_GET_GPIO: u16 = 0x0003;

/// Config command codes (low byte of wValue)
pub const FT4222_SET_SUSPEND_OUT: u8 = 0x06;
pub const FT4222_SET_WAKEUP_INTERRUPT: u8 = 0x07;
/// Unverified against hardware
pub const FT4222_GPIO_SET_DIR: u8 = 0x30;
/// Unverified against hardware
pub const FT4222_GPIO_WRITE: u8 = 0x31;

/// Chip mode reporting a GPIO interface
pub const FT4222_MODE_GPIO: u8 = 3;

/// Number of GPIO ports
pub const GPIO_PORTS: u32 = 4;

/// Port shared with the suspend-out function
pub const GPIO_PORT_SUSPEND_OUT: u32 = 2;
/// Port shared with the wake-up interrupt function
pub const GPIO_PORT_WAKEUP: u32 = 3;

/// Timeout for control transfers, in milliseconds
pub const CONTROL_TIMEOUT_MS: u64 = 5000;

/// Pack a config command and its data byte into `wValue`
pub fn config_value(cmd: u8, data: u8) -> u16 {
    ((data as u16) << 8) | (cmd as u16)
}

/// Interface number carrying the GPIO ports, if the mode has one
///
/// The GPIO interface is the last one the device enumerates.
pub fn gpio_interface(mode: u8, num_interfaces: u8) -> Option<u8> {
    if mode == FT4222_MODE_GPIO && num_interfaces > 1 {
        Some(num_interfaces - 1)
    } else {
        None
    }
}

/// Direction and output latch of the four ports
///
/// Bit `n` of `outputs` is set when port `n` drives; bit `n` of `levels` is
/// the level it drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortState {
    pub outputs: u8,
    pub levels: u8,
}

impl PortState {
    fn mask(port: u32) -> u8 {
        1 << port
    }

    /// Switch a port between input and output
    pub fn set_output(&mut self, port: u32, output: bool) {
        if output {
            self.outputs |= Self::mask(port);
        } else {
            self.outputs &= !Self::mask(port);
        }
    }

    /// Whether a port drives
    pub fn is_output(&self, port: u32) -> bool {
        self.outputs & Self::mask(port) != 0
    }

    /// Latch an output level
    pub fn set_level(&mut self, port: u32, level: bool) {
        if level {
            self.levels |= Self::mask(port);
        } else {
            self.levels &= !Self::mask(port);
        }
    }

    /// Level of a port in a GET_GPIO response byte
    pub fn level_in(response: u8, port: u32) -> bool {
        response & Self::mask(port) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_value_packing() {
        assert_eq!(config_value(FT4222_GPIO_SET_DIR, 0x05), 0x0530);
        assert_eq!(config_value(FT4222_SET_SUSPEND_OUT, 0), 0x0006);
    }

    #[test]
    fn only_mode_three_has_gpio() {
        assert_eq!(gpio_interface(3, 2), Some(1));
        assert_eq!(gpio_interface(0, 2), None);
        assert_eq!(gpio_interface(3, 1), None);
    }

    #[test]
    fn port_state_masks() {
        let mut state = PortState::default();
        state.set_output(1, true);
        state.set_output(3, true);
        state.set_level(3, true);
        assert_eq!(state.outputs, 0b1010);
        assert_eq!(state.levels, 0b1000);
        assert!(state.is_output(1));
        assert!(!state.is_output(0));

        state.set_output(1, false);
        state.set_level(3, false);
        assert_eq!(state.outputs, 0b1000);
        assert_eq!(state.levels, 0);

        assert!(PortState::level_in(0b0100, 2));
        assert!(!PortState::level_in(0b0100, 0));
    }
}
