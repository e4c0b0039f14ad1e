// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Platform hooks, and selection of the platform being built for.

macro_rules! select_platform {
    (platform = $condition:literal, $mod:ident) => {
        #[cfg(platform = $condition)]
        mod $mod;
    };
    (test, $mod:ident) => {
        #[cfg(test)]
        pub mod $mod;
    };
}

select_platform!(platform = "stm32mp1", stm32mp1);
select_platform!(test, test);

use crate::{
    error::Error,
    etzpc::{EtzpcRegisters, TZMA_ALL_SECURE},
    handoff::{BackupDomain, context::ContextStore},
    memory_map::MemoryRegion,
    sequencer::SecureDrivers,
    tamper::TamperSlots,
};

/// The hooks implemented by all platforms.
pub trait Platform {
    /// TZMA range value for the secure part of SYSRAM.
    const TZMA_SYSRAM_RANGE: u16 = TZMA_ALL_SECURE;

    /// Number of internal tamper sources.
    const INTERNAL_TAMPER_COUNT: usize;

    /// Number of external tamper inputs.
    const EXTERNAL_TAMPER_COUNT: usize;

    /// Drivers brought up by the sequencer.
    type Drivers: SecureDrivers;

    /// Access to the ETZPC registers.
    type EtzpcRegisters: EtzpcRegisters;

    /// The backup register domain holding the resume evidence.
    type BackupDomain: BackupDomain;

    /// Storage of the non-secure context saved before standby.
    type ContextStore: ContextStore;

    /// Returns the region holding the SP_MIN image.
    fn code_region() -> MemoryRegion;

    /// Returns the other regions to map before enabling the MMU.
    fn memory_regions() -> &'static [MemoryRegion];

    /// Fills in the tamper sources to enable.
    ///
    /// Both tables start out with every slot unused.
    fn fill_tamper_slots(
        _internal: &mut TamperSlots,
        _external: &mut TamperSlots,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Stops the system after a fatal error.
    fn halt() -> !;
}
