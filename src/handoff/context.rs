// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The non-secure CPU context saved before entering standby and restored on resume.

use crate::error::{Corruption, Error};
use bitflags::bitflags;
use log::debug;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

/// An AArch32 saved program status register value.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, FromBytes, Immutable, IntoBytes, KnownLayout,
)]
#[repr(transparent)]
pub struct Spsr(u32);

bitflags! {
    impl Spsr: u32 {
        /// Thumb execution state.
        const T = 1 << 5;
        /// FIQ mask.
        const F = 1 << 6;
        /// IRQ mask.
        const I = 1 << 7;
        /// Asynchronous abort mask.
        const A = 1 << 8;
        /// Big-endian data accesses.
        const E = 1 << 9;

        const _ = !0;
    }
}

impl Spsr {
    const MODE_MASK: u32 = 0x1f;

    /// Supervisor mode.
    pub const MODE_SVC: u32 = 0x13;
    /// Hypervisor mode.
    pub const MODE_HYP: u32 = 0x1a;

    /// Returns the processor mode field.
    pub const fn mode(self) -> u32 {
        self.0 & Self::MODE_MASK
    }
}

/// Non-secure CPU registers restored when resuming from standby.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, FromBytes, Immutable, IntoBytes, KnownLayout,
)]
#[repr(C)]
pub struct NonSecureContext {
    /// r0 to r12.
    pub gpregs: [u32; 13],
    /// Monitor mode link register, the address execution returns to.
    pub lr: u32,
    /// Saved program status register for the return.
    pub spsr: Spsr,
    /// Secure configuration register.
    pub scr: u32,
    /// Non-secure system control register.
    pub sctlr: u32,
}

/// Magic number identifying a [`SavedContext`] in the layout this crate understands.
pub const SAVED_CONTEXT_MAGIC: u32 = (0x0001 << 16) | 1;

/// The persisted blob, as stored in backup SRAM.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromBytes, Immutable, IntoBytes, KnownLayout)]
#[repr(C)]
pub struct SavedContext {
    /// Must be [`SAVED_CONTEXT_MAGIC`].
    pub magic: u32,
    /// The saved non-secure context.
    pub non_secure: NonSecureContext,
}

/// Persistent storage holding the context saved before standby.
pub trait ContextStore {
    /// Copies the persisted blob into `buffer`, returning the number of bytes copied.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Error>;

    /// Makes `context` the live non-secure CPU context, to be used on the next world switch.
    fn install(&mut self, context: &NonSecureContext);
}

/// Loads the saved context from `store`, validates it and installs it.
///
/// Any failure is reported as `CorruptedState`, as there is no way to resume without the context.
pub fn restore<S: ContextStore + ?Sized>(store: &mut S) -> Result<NonSecureContext, Error> {
    let mut saved = SavedContext::new_zeroed();
    let length = store
        .read(saved.as_mut_bytes())
        .map_err(|_| Corruption::InvalidSavedContext)?;
    if length != size_of::<SavedContext>() || saved.magic != SAVED_CONTEXT_MAGIC {
        return Err(Corruption::InvalidSavedContext.into());
    }

    store.install(&saved.non_secure);
    debug!(
        "Restored non-secure context, lr {:#x}",
        saved.non_secure.lr
    );
    Ok(saved.non_secure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test::FakeContextStore;

    #[test]
    fn spsr_fields() {
        let spsr = Spsr::from_bits_retain(0x1d3);
        assert_eq!(spsr.mode(), Spsr::MODE_SVC);
        assert!(spsr.contains(Spsr::F | Spsr::I | Spsr::A));
        assert!(!spsr.intersects(Spsr::T | Spsr::E));

        let spsr = Spsr::from_bits_retain(0x0d3);
        assert!(!spsr.contains(Spsr::A));
        assert_eq!(spsr.bits(), 0x1d3);
    }

    #[test]
    fn restore_valid_context() {
        let context = NonSecureContext {
            lr: 0xc010_0000,
            spsr: Spsr::from_bits_retain(0x1da),
            ..Default::default()
        };
        let mut store = FakeContextStore::with_context(context);
        assert_eq!(restore(&mut store), Ok(context));
        assert_eq!(store.installed, Some(context));
    }

    #[test]
    fn restore_bad_magic() {
        let mut store = FakeContextStore::with_context(NonSecureContext::default());
        store.blob[0] ^= 1;
        assert_eq!(
            restore(&mut store),
            Err(Error::CorruptedState(Corruption::InvalidSavedContext))
        );
        assert_eq!(store.installed, None);
    }

    #[test]
    fn restore_truncated() {
        let mut store = FakeContextStore::with_context(NonSecureContext::default());
        store.blob.truncate(8);
        assert_eq!(
            restore(&mut store),
            Err(Error::CorruptedState(Corruption::InvalidSavedContext))
        );
        assert_eq!(store.installed, None);
    }

    #[test]
    fn restore_read_failure() {
        let mut store = FakeContextStore::with_context(NonSecureContext::default());
        store.fail_read = true;
        assert_eq!(
            restore(&mut store),
            Err(Error::CorruptedState(Corruption::InvalidSavedContext))
        );
    }
}
