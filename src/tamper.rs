// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Tamper slot tables handed to the TAMP driver.

use crate::error::{DomainKind, Error};
use arrayvec::ArrayVec;

/// Maximum number of slots in a [`TamperSlots`] table.
pub const MAX_TAMPER_SLOTS: usize = 8;

/// How the TAMP peripheral reacts to a tamper event.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TamperMode {
    /// Backup registers and secure SRAM are erased as soon as the event is detected.
    Confirmed,
    /// The event is reported and software decides whether to erase.
    Potential,
}

/// Configuration of an enabled tamper source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TamperConfig {
    /// Hardware id of the tamper source.
    pub id: u32,
    /// Reaction to an event.
    pub mode: TamperMode,
}

/// One entry of a tamper table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TamperSlot {
    /// Nothing is configured in this slot.
    #[default]
    Unused,
    /// The slot holds an enabled tamper source.
    Enabled(TamperConfig),
}

/// A fixed-size table of tamper slots.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TamperSlots {
    slots: ArrayVec<TamperSlot, MAX_TAMPER_SLOTS>,
}

impl TamperSlots {
    /// Creates a table of `count` unused slots.
    ///
    /// Returns `Unsupported` if `count` is more than [`MAX_TAMPER_SLOTS`].
    pub fn unused(count: usize) -> Result<Self, Error> {
        if count > MAX_TAMPER_SLOTS {
            return Err(Error::Unsupported);
        }
        Ok(Self {
            slots: (0..count).map(|_| TamperSlot::Unused).collect(),
        })
    }

    /// Returns the number of slots in the table.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns whether the table has no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Replaces the slot at the given index.
    pub fn set(&mut self, index: usize, slot: TamperSlot) -> Result<(), Error> {
        let count = self.slots.len();
        let entry = self.slots.get_mut(index).ok_or(Error::InvalidId {
            kind: DomainKind::TamperSlot,
            id: index as u32,
            count: count as u32,
        })?;
        *entry = slot;
        Ok(())
    }

    /// Returns all slots, including unused ones.
    pub fn slots(&self) -> &[TamperSlot] {
        &self.slots
    }

    /// Returns the enabled slots along with their indices.
    pub fn enabled(&self) -> impl Iterator<Item = (usize, &TamperConfig)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                TamperSlot::Unused => None,
                TamperSlot::Enabled(config) => Some((index, config)),
            })
    }
}

/// Settings shared by all external tamper inputs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExternalTamperConfig {
    /// Input filter configuration.
    pub filter: u32,
    /// Active tamper configuration.
    pub active: u32,
}
