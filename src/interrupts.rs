// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Dispatch of secure (FIQ) interrupts.

pub mod gicv2;

use crate::error::Error;
use arm_gic::IntId;
use log::error;

/// The secure physical timer PPI.
pub const SEC_PHY_TIMER: IntId = IntId::ppi(13);
/// SGI used to park a core.
pub const SEC_SGI_1: IntId = IntId::sgi(1);
/// TZC400 memory firewall violation.
pub const TZC400_IRQ: IntId = IntId::spi(4);
/// RCC wakeup event.
pub const RCC_WAKEUP_IRQ: IntId = IntId::spi(145);
/// Independent watchdog 1 early wakeup.
pub const IWDG1_IRQ: IntId = IntId::spi(150);
/// Independent watchdog 2 early wakeup.
pub const IWDG2_IRQ: IntId = IntId::spi(151);
/// MCU send event.
pub const MCU_SEV_IRQ: IntId = IntId::spi(176);
/// Secure tamper event.
pub const TAMP_SEC_IRQ: IntId = IntId::spi(197);
/// AXI interconnect error.
pub const AXI_ERROR_IRQ: IntId = IntId::spi(212);

/// Highest peripheral interrupt id on STM32MP1.
pub const MAX_SPI_ID: u32 = 287;

/// Routes of all secure interrupts on STM32MP1.
pub const SECURE_INTERRUPT_ROUTES: &[InterruptRoute] = &[
    (SEC_PHY_TIMER, SecureInterrupt::Calibration),
    (MCU_SEV_IRQ, SecureInterrupt::Calibration),
    (RCC_WAKEUP_IRQ, SecureInterrupt::Calibration),
    (TZC400_IRQ, SecureInterrupt::SecurityViolation),
    (AXI_ERROR_IRQ, SecureInterrupt::BusError),
    (TAMP_SEC_IRQ, SecureInterrupt::Tamper),
    (IWDG1_IRQ, SecureInterrupt::Watchdog),
    (IWDG2_IRQ, SecureInterrupt::Watchdog),
    (SEC_SGI_1, SecureInterrupt::CorePark),
];

const INT_ID_MASK: u32 = 0x3ff;
const SGI_END: u32 = 16;
const PPI_END: u32 = 32;
const SPECIAL_START: u32 = 1020;

/// Converts a raw interrupt id read from the CPU interface to an `IntId`.
///
/// Returns `None` for the special ids, e.g. when no interrupt is pending.
pub fn int_id_from_raw(raw: u32) -> Option<IntId> {
    let id = raw & INT_ID_MASK;
    if id < SGI_END {
        Some(IntId::sgi(id))
    } else if id < PPI_END {
        Some(IntId::ppi(id - SGI_END))
    } else if id < SPECIAL_START {
        Some(IntId::spi(id - PPI_END))
    } else {
        None
    }
}

/// The interrupt controller operations the dispatcher needs.
///
/// These take `&self` because the CPU interface registers are banked per core.
pub trait InterruptController {
    /// Returns the highest priority pending interrupt, if any.
    fn pending_interrupt(&self) -> Option<IntId>;

    /// Signals the end of handling of the given interrupt.
    fn end_of_interrupt(&self, int_id: IntId);

    /// Disables forwarding of the given interrupt.
    fn disable_interrupt(&self, int_id: IntId);
}

/// Handlers for the secure interrupt sources, implemented by their drivers.
pub trait SecureInterruptHandlers {
    /// Handles a clock calibration interrupt.
    fn calibrate(&self, int_id: IntId);

    /// Handles a tamper event.
    fn tamper(&self);

    /// Handles an independent watchdog early wakeup.
    fn watchdog(&self, int_id: IntId);

    /// Reports the details of a security violation before the system halts.
    fn report_security_violation(&self, int_id: IntId);

    /// Masks the local periodic timer of the calling core.
    fn mask_local_timer(&self);

    /// Waits for the calling core to be reset.
    fn wait_for_reset(&self) -> !;
}

/// What a secure interrupt is routed to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SecureInterrupt {
    /// Clock calibration.
    Calibration,
    /// Memory firewall violation, fatal.
    SecurityViolation,
    /// AXI bus error, fatal.
    BusError,
    /// Tamper event.
    Tamper,
    /// Watchdog early wakeup.
    Watchdog,
    /// Request to park the calling core.
    CorePark,
}

/// Route of a secure interrupt.
pub type InterruptRoute = (IntId, SecureInterrupt);

/// Routes secure interrupts to their handlers.
pub struct Dispatcher<C: InterruptController, H: SecureInterruptHandlers> {
    controller: C,
    handlers: H,
    routes: &'static [InterruptRoute],
    max_spi_id: u32,
}

impl<C: InterruptController, H: SecureInterruptHandlers> Dispatcher<C, H> {
    /// Creates a dispatcher with the given routing table.
    ///
    /// `max_spi_id` is the highest peripheral interrupt id, above which the core park procedure
    /// stops draining pending interrupts.
    pub const fn new(
        controller: C,
        handlers: H,
        routes: &'static [InterruptRoute],
        max_spi_id: u32,
    ) -> Self {
        Self {
            controller,
            handlers,
            routes,
            max_spi_id,
        }
    }

    /// Returns the route of the given interrupt, if it has one.
    pub fn route(&self, int_id: IntId) -> Option<SecureInterrupt> {
        self.routes
            .iter()
            .find(|(id, _)| *id == int_id)
            .map(|(_, route)| *route)
    }

    /// Handles the secure interrupt with the given raw id.
    ///
    /// Returns `SecurityViolation` for fatal interrupts, which the caller must not return from.
    /// Unknown interrupts are logged and dropped.
    pub fn dispatch(&self, raw_id: u32) -> Result<(), Error> {
        let Some(int_id) = int_id_from_raw(raw_id) else {
            error!("Spurious secure interrupt {raw_id}");
            return Ok(());
        };
        match self.route(int_id) {
            Some(SecureInterrupt::Calibration) => self.handlers.calibrate(int_id),
            Some(SecureInterrupt::SecurityViolation) => {
                self.handlers.report_security_violation(int_id);
                return Err(Error::SecurityViolation(u32::from(int_id)));
            }
            Some(SecureInterrupt::BusError) => {
                error!("AXI bus error interrupt {int_id:?}");
                return Err(Error::SecurityViolation(u32::from(int_id)));
            }
            Some(SecureInterrupt::Tamper) => self.handlers.tamper(),
            Some(SecureInterrupt::Watchdog) => self.handlers.watchdog(int_id),
            Some(SecureInterrupt::CorePark) => self.park_core(int_id),
            None => error!("No secure handler for interrupt {int_id:?}"),
        }
        Ok(())
    }

    /// Parks the calling core until it is reset.
    ///
    /// Every pending peripheral interrupt is acknowledged and disabled first, so none is left
    /// active on the core.
    pub fn park_core(&self, trigger: IntId) -> ! {
        self.handlers.mask_local_timer();
        self.controller.end_of_interrupt(trigger);

        while let Some(int_id) = self.controller.pending_interrupt() {
            if u32::from(int_id) > self.max_spi_id {
                break;
            }
            self.controller.end_of_interrupt(int_id);
            self.controller.disable_interrupt(int_id);
        }

        self.handlers.wait_for_reset()
    }
}
