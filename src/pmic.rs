// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Bring-up of the power management IC.
//!
//! The PMIC is reached over RSB when the bus controller and chip support it, and over plain I2C
//! otherwise.

use crate::error::Error;
use log::info;

/// 12-bit bus address of the PMIC.
pub const PMIC_HW_ADDRESS: u16 = 0x3a3;
/// 8-bit runtime address assigned to the PMIC on the RSB bus.
pub const PMIC_RUNTIME_ADDRESS: u8 = 0x2d;
/// I2C write of 0x7c to register 0x3e, which switches the PMIC to RSB mode.
pub const RSB_MODE_SWITCH_COMMAND: u32 = 0x7c_3e00;

const INITIAL_BUS_SPEED_HZ: u32 = 400_000;
const RSB_BUS_SPEED_HZ: u32 = 3_000_000;

/// The bus protocol used to talk to the PMIC.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BusMode {
    /// Allwinner Reduced Serial Bus.
    Rsb,
    /// Plain I2C.
    I2c,
}

/// The bus controller the PMIC is attached to, along with the PMIC's own driver hooks.
pub trait PmicBus {
    /// Resets the controller and sets it up for the given protocol.
    ///
    /// Returns `Unsupported` if the controller or chip revision can't use the protocol.
    fn init_controller(&mut self, mode: BusMode) -> Result<(), Error>;

    /// Sets the bus clock.
    fn set_bus_speed(&mut self, hz: u32) -> Result<(), Error>;

    /// Sends a device mode command to all devices on the bus.
    fn set_device_mode(&mut self, command: u32) -> Result<(), Error>;

    /// Assigns a runtime address to the device with the given hardware address.
    fn assign_runtime_address(&mut self, hw_address: u16, runtime_address: u8)
    -> Result<(), Error>;

    /// Checks that the expected PMIC answers on the bus.
    fn check_id(&mut self) -> Result<(), Error>;

    /// Configures the regulators as described by the device tree.
    fn setup_regulators(&mut self) -> Result<(), Error>;
}

fn init_rsb<B: PmicBus + ?Sized>(bus: &mut B) -> Result<(), Error> {
    bus.init_controller(BusMode::Rsb)?;
    // The mode switch command is sent at I2C speed.
    bus.set_bus_speed(INITIAL_BUS_SPEED_HZ)?;
    bus.set_device_mode(RSB_MODE_SWITCH_COMMAND)?;
    bus.set_bus_speed(RSB_BUS_SPEED_HZ)?;
    bus.assign_runtime_address(PMIC_HW_ADDRESS, PMIC_RUNTIME_ADDRESS)?;
    bus.check_id()
}

fn init_i2c<B: PmicBus + ?Sized>(bus: &mut B) -> Result<(), Error> {
    bus.init_controller(BusMode::I2c)?;
    bus.set_bus_speed(INITIAL_BUS_SPEED_HZ)?;
    bus.check_id()
}

/// Brings up the bus to the PMIC and configures its regulators.
///
/// RSB is tried first, falling back to I2C if it is `Unsupported`. Returns the mode in use.
pub fn setup<B: PmicBus + ?Sized>(bus: &mut B) -> Result<BusMode, Error> {
    info!("PMIC: Probing on RSB");
    let mode = match init_rsb(bus) {
        Ok(()) => BusMode::Rsb,
        Err(Error::Unsupported) => {
            info!("PMIC: RSB not supported, probing on I2C");
            init_i2c(bus)?;
            BusMode::I2c
        }
        Err(e) => return Err(e),
    };
    bus.setup_regulators()?;
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::FakePmicBus;

    #[test]
    fn rsb_sequence() {
        let mut bus = FakePmicBus::default();
        assert_eq!(setup(&mut bus), Ok(BusMode::Rsb));
        assert_eq!(
            bus.calls,
            vec![
                "init_controller(Rsb)",
                "set_bus_speed(400000)",
                "set_device_mode(0x7c3e00)",
                "set_bus_speed(3000000)",
                "assign_runtime_address(0x3a3, 0x2d)",
                "check_id",
                "setup_regulators",
            ]
        );
    }

    #[test]
    fn falls_back_to_i2c() {
        let mut bus = FakePmicBus {
            rsb_supported: false,
            ..Default::default()
        };
        assert_eq!(setup(&mut bus), Ok(BusMode::I2c));
        assert_eq!(
            bus.calls,
            vec![
                "init_controller(Rsb)",
                "init_controller(I2c)",
                "set_bus_speed(400000)",
                "check_id",
                "setup_regulators",
            ]
        );
    }

    #[test]
    fn other_errors_propagate() {
        let mut bus = FakePmicBus {
            id_error: Some(Error::ResourceUnavailable),
            ..Default::default()
        };
        assert_eq!(setup(&mut bus), Err(Error::ResourceUnavailable));
        assert!(!bus.calls.contains(&"init_controller(I2c)".to_string()));
        assert!(!bus.calls.contains(&"setup_regulators".to_string()));
    }
}
