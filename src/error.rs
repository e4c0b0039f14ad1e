// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Error types shared by the secure platform layer.

use core::fmt::{self, Display, Formatter};
use thiserror::Error;

/// The kind of security domain an id refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DomainKind {
    /// A peripheral, protected by a DECPROT field.
    Peripheral,
    /// A memory zone, protected by a TZMA split point.
    MemoryZone,
    /// A tamper slot.
    TamperSlot,
}

impl Display for DomainKind {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Peripheral => f.write_str("peripheral"),
            Self::MemoryZone => f.write_str("memory zone"),
            Self::TamperSlot => f.write_str("tamper slot"),
        }
    }
}

/// Reasons why persisted or handed-over state can't be trusted.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum Corruption {
    /// The saved resume address is outside of non-secure DRAM.
    #[error("resume address {pc:#x} is outside of DRAM")]
    ResumeAddressOutOfRange {
        /// The rejected address.
        pc: usize,
    },
    /// The persisted non-secure context is missing, truncated or has a bad magic number.
    #[error("saved non-secure context is invalid")]
    InvalidSavedContext,
    /// The parameters handed over by the previous boot stage are malformed.
    #[error("invalid boot parameters from previous stage")]
    InvalidHandoff,
}

/// An error from the secure platform layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum Error {
    /// A peripheral or memory zone id at or above the count reported by the hardware.
    #[error("invalid {kind} id {id}, controller has {count}")]
    InvalidId {
        /// Whether the id refers to a peripheral or a memory zone.
        kind: DomainKind,
        /// The rejected id.
        id: u32,
        /// The number of ids the controller supports.
        count: u32,
    },
    /// A required device or driver is not present or failed to probe.
    #[error("resource unavailable")]
    ResourceUnavailable,
    /// Persisted or handed-over state failed validation.
    #[error("corrupted state: {0}")]
    CorruptedState(#[from] Corruption),
    /// The operation is not supported by this hardware variant.
    #[error("operation not supported")]
    Unsupported,
    /// A write was dropped because the target is locked.
    #[error("{kind} {id} is locked")]
    Locked {
        /// Whether the id refers to a peripheral or a memory zone.
        kind: DomainKind,
        /// The locked id.
        id: u32,
    },
    /// A security violation was signalled by the given interrupt.
    #[error("security violation signalled by interrupt {0}")]
    SecurityViolation(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_domain() {
        let error = Error::InvalidId {
            kind: DomainKind::Peripheral,
            id: 7,
            count: 4,
        };
        assert_eq!(
            error.to_string(),
            "invalid peripheral id 7, controller has 4"
        );
        assert_eq!(
            Error::Locked {
                kind: DomainKind::MemoryZone,
                id: 0
            }
            .to_string(),
            "memory zone 0 is locked"
        );
    }

    #[test]
    fn corruption_converts() {
        let error: Error = Corruption::ResumeAddressOutOfRange { pc: 0x1000 }.into();
        assert_eq!(
            error.to_string(),
            "corrupted state: resume address 0x1000 is outside of DRAM"
        );
    }
}
