// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Driver for the Extended TrustZone Protection Controller (ETZPC).
//!
//! The ETZPC holds a 2-bit DECPROT security attribute for each peripheral and a TZMA split point
//! for each protected memory zone. Each of these has a write-once lock bit. Once set, the hardware
//! drops further writes to the field until the next reset.

pub mod registers;

use crate::error::{DomainKind, Error};
use log::{debug, info, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Number of DECPROT registers in the register file.
pub const DECPROT_REGISTER_COUNT: usize = 8;
/// Number of DECPROT_LOCK registers in the register file.
pub const DECPROT_LOCK_REGISTER_COUNT: usize = 4;
/// Number of TZMA_SIZE registers in the register file.
pub const TZMA_REGISTER_COUNT: usize = 2;

/// TZMA zone covering the boot ROM.
pub const TZMA_ROM: u32 = 0;
/// TZMA zone covering SYSRAM.
pub const TZMA_SYSRAM: u32 = 1;
/// TZMA range value which makes a whole zone secure.
pub const TZMA_ALL_SECURE: u16 = 0x3ff;

const FOUR_KB_SHIFT: u32 = 12;

/// Returns the TZMA range value for a zone whose first `secure_bytes` bytes are secure.
///
/// Returns `None` if that is less than one 4 KiB block or more than the field can hold.
pub const fn tzma_secure_range(secure_bytes: usize) -> Option<u16> {
    let blocks = secure_bytes >> FOUR_KB_SHIFT;
    if blocks == 0 || blocks > TZMA_ALL_SECURE as usize + 1 {
        None
    } else {
        Some((blocks - 1) as u16)
    }
}

/// Security attribute of a peripheral.
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum DecprotAttribute {
    /// Read and write from the secure world only.
    SecureReadWrite = 0,
    /// Read from either world, write from the secure world only.
    NonSecureReadSecureWrite = 1,
    /// Only accessible to the MCU co-processor, not to the main CPU in either world.
    McuIsolation = 2,
    /// Read and write from either world.
    NonSecureReadWrite = 3,
}

/// Snapshot of a DECPROT register, holding the attributes of 16 peripherals.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DecprotWord(pub u32);

impl DecprotWord {
    /// The number of peripherals covered by one register.
    pub const IDS_PER_WORD: u32 = 16;

    const FIELD_MASK: u32 = 0b11;

    /// Returns the attribute of the peripheral in the given slot of this register.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not less than [`Self::IDS_PER_WORD`].
    pub fn get(self, slot: u32) -> DecprotAttribute {
        assert!(slot < Self::IDS_PER_WORD, "DECPROT slot {slot} out of range");
        let field = (self.0 >> (slot * 2)) & Self::FIELD_MASK;
        // Every two-bit value is a variant.
        DecprotAttribute::try_from(field).unwrap_or(DecprotAttribute::SecureReadWrite)
    }

    /// Returns a copy of this register with the given slot changed, leaving all other slots as
    /// they are.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not less than [`Self::IDS_PER_WORD`].
    pub fn with(self, slot: u32, attribute: DecprotAttribute) -> Self {
        assert!(slot < Self::IDS_PER_WORD, "DECPROT slot {slot} out of range");
        let shift = slot * 2;
        Self((self.0 & !(Self::FIELD_MASK << shift)) | (u32::from(attribute) << shift))
    }
}

/// Snapshot of a DECPROT_LOCK register, holding the lock bits of 32 peripherals.
///
/// The register is write-1-to-set: writing a word sets the lock bits which are set in it and
/// leaves all others unchanged.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LockWord(pub u32);

impl LockWord {
    /// The number of peripherals covered by one register.
    pub const IDS_PER_WORD: u32 = 32;

    /// Returns a word with only the lock bit for the given slot set.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not less than [`Self::IDS_PER_WORD`].
    pub const fn slot(slot: u32) -> Self {
        assert!(slot < Self::IDS_PER_WORD, "DECPROT_LOCK slot out of range");
        Self(1 << slot)
    }

    /// Returns whether the lock bit for the given slot is set.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not less than [`Self::IDS_PER_WORD`].
    pub const fn is_locked(self, slot: u32) -> bool {
        assert!(slot < Self::IDS_PER_WORD, "DECPROT_LOCK slot out of range");
        self.0 & (1 << slot) != 0
    }
}

/// Snapshot of a TZMA_SIZE register.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TzmaRegister {
    /// Number of secure 4 KiB blocks at the start of the zone, minus one.
    pub range: u16,
    /// Whether the register is locked.
    pub locked: bool,
}

/// Contents of the ETZPC hardware configuration register.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct HwConfig {
    /// Number of TZMA memory zones.
    pub memory_zones: u32,
    /// Number of peripherals with a DECPROT field.
    pub peripherals: u32,
    /// Number of AHB peripherals with a DECPROT field.
    pub ahb_peripherals: u32,
    /// TZMA chunk size in 4 KiB units.
    pub chunk_size: u32,
}

/// Access to the ETZPC registers, in terms of typed snapshots.
pub trait EtzpcRegisters {
    /// Returns the physical base address of the register block.
    fn base_address(&self) -> usize;

    /// Reads the hardware configuration register.
    fn hwcfg(&self) -> HwConfig;

    /// Reads the IP version register.
    fn version(&self) -> u8;

    /// Reads the DECPROT register with the given index.
    fn decprot(&self, index: usize) -> DecprotWord;

    /// Writes the DECPROT register with the given index.
    fn write_decprot(&mut self, index: usize, value: DecprotWord);

    /// Reads the DECPROT_LOCK register with the given index.
    fn decprot_lock(&self, index: usize) -> LockWord;

    /// Sets the lock bits which are set in `value` in the DECPROT_LOCK register with the given
    /// index.
    fn set_decprot_lock(&mut self, index: usize, value: LockWord);

    /// Reads the TZMA_SIZE register of the given zone.
    fn tzma(&self, zone: usize) -> TzmaRegister;

    /// Writes the TZMA_SIZE register of the given zone.
    fn write_tzma(&mut self, zone: usize, value: TzmaRegister);
}

/// ETZPC driver.
///
/// Every accessor reads the hardware, so attribute changes made by another bus master are
/// observed.
#[derive(Debug)]
pub struct Etzpc<R: EtzpcRegisters> {
    regs: R,
    peripheral_count: u32,
    memory_zone_count: u32,
    revision: u8,
    frozen: bool,
}

impl<R: EtzpcRegisters> Etzpc<R> {
    /// Maximum number of peripherals the register file can describe.
    pub const MAX_PERIPHERALS: u32 = DECPROT_REGISTER_COUNT as u32 * DecprotWord::IDS_PER_WORD;

    /// Checks that an ETZPC is present and reads its configuration.
    ///
    /// Returns `ResourceUnavailable` if the controller reports no peripherals or no memory zones,
    /// or `Unsupported` if it reports more than the register file can describe.
    pub fn probe(regs: R) -> Result<Self, Error> {
        let hwcfg = regs.hwcfg();
        if hwcfg.peripherals == 0 || hwcfg.memory_zones == 0 {
            warn!("ETZPC at {:#x} not found", regs.base_address());
            return Err(Error::ResourceUnavailable);
        }
        if hwcfg.peripherals > Self::MAX_PERIPHERALS
            || hwcfg.memory_zones > TZMA_REGISTER_COUNT as u32
        {
            warn!("Unsupported ETZPC configuration {hwcfg:?}");
            return Err(Error::Unsupported);
        }

        let revision = regs.version();
        info!(
            "ETZPC revision {}.{}: {} peripherals, {} memory zones",
            revision >> 4,
            revision & 0xf,
            hwcfg.peripherals,
            hwcfg.memory_zones
        );
        Ok(Self {
            regs,
            peripheral_count: hwcfg.peripherals,
            memory_zone_count: hwcfg.memory_zones,
            revision,
            frozen: false,
        })
    }

    /// Returns the number of peripherals with a DECPROT field.
    pub fn peripheral_count(&self) -> u32 {
        self.peripheral_count
    }

    /// Returns the number of TZMA memory zones.
    pub fn memory_zone_count(&self) -> u32 {
        self.memory_zone_count
    }

    /// Returns the IP revision, with the major revision in the upper nibble.
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Returns the base address of the controller's registers.
    pub fn base_address(&self) -> usize {
        self.regs.base_address()
    }

    /// Stops any further attribute or range changes through this driver.
    ///
    /// Locking stays possible, as it can only narrow access.
    pub fn freeze(&mut self) {
        info!("ETZPC configuration frozen");
        self.frozen = true;
    }

    /// Returns whether `freeze` has been called.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn check_peripheral(&self, id: u32) -> Result<(), Error> {
        if id < self.peripheral_count {
            Ok(())
        } else {
            Err(Error::InvalidId {
                kind: DomainKind::Peripheral,
                id,
                count: self.peripheral_count,
            })
        }
    }

    fn check_zone(&self, zone: u32) -> Result<usize, Error> {
        if zone < self.memory_zone_count {
            Ok(zone as usize)
        } else {
            Err(Error::InvalidId {
                kind: DomainKind::MemoryZone,
                id: zone,
                count: self.memory_zone_count,
            })
        }
    }

    /// Sets the security attribute of the given peripheral.
    ///
    /// The write is always issued. If the hardware dropped it because the peripheral is locked,
    /// this returns `Locked` and the attribute is unchanged. Setting the attribute a locked
    /// peripheral already has succeeds.
    pub fn configure_decprot(&mut self, id: u32, attribute: DecprotAttribute) -> Result<(), Error> {
        self.check_peripheral(id)?;
        let locked = Error::Locked {
            kind: DomainKind::Peripheral,
            id,
        };
        if self.frozen {
            return Err(locked);
        }

        let index = (id / DecprotWord::IDS_PER_WORD) as usize;
        let slot = id % DecprotWord::IDS_PER_WORD;
        let value = self.regs.decprot(index).with(slot, attribute);
        self.regs.write_decprot(index, value);

        if self.regs.decprot(index).get(slot) == attribute {
            debug!("ETZPC peripheral {id} set to {attribute:?}");
            Ok(())
        } else {
            Err(locked)
        }
    }

    /// Returns the current security attribute of the given peripheral.
    pub fn decprot(&self, id: u32) -> Result<DecprotAttribute, Error> {
        self.check_peripheral(id)?;
        let index = (id / DecprotWord::IDS_PER_WORD) as usize;
        Ok(self.regs.decprot(index).get(id % DecprotWord::IDS_PER_WORD))
    }

    /// Locks the security attribute of the given peripheral until the next reset.
    ///
    /// Locking an already locked peripheral has no effect.
    pub fn lock_decprot(&mut self, id: u32) -> Result<(), Error> {
        self.check_peripheral(id)?;
        let index = (id / LockWord::IDS_PER_WORD) as usize;
        self.regs
            .set_decprot_lock(index, LockWord::slot(id % LockWord::IDS_PER_WORD));
        Ok(())
    }

    /// Returns whether the security attribute of the given peripheral is locked.
    pub fn decprot_locked(&self, id: u32) -> Result<bool, Error> {
        self.check_peripheral(id)?;
        let index = (id / LockWord::IDS_PER_WORD) as usize;
        Ok(self
            .regs
            .decprot_lock(index)
            .is_locked(id % LockWord::IDS_PER_WORD))
    }

    /// Sets the secure range of the given memory zone.
    ///
    /// As with [`Self::configure_decprot`], the write is always issued and `Locked` is returned if
    /// the hardware dropped it. Ranges above [`TZMA_ALL_SECURE`] are `Unsupported`.
    pub fn configure_tzma(&mut self, zone: u32, range: u16) -> Result<(), Error> {
        let index = self.check_zone(zone)?;
        if range > TZMA_ALL_SECURE {
            return Err(Error::Unsupported);
        }
        let locked = Error::Locked {
            kind: DomainKind::MemoryZone,
            id: zone,
        };
        if self.frozen {
            return Err(locked);
        }

        let current = self.regs.tzma(index);
        self.regs.write_tzma(index, TzmaRegister { range, ..current });

        if self.regs.tzma(index).range == range {
            debug!("ETZPC memory zone {zone} secure range set to {range:#x}");
            Ok(())
        } else {
            Err(locked)
        }
    }

    /// Returns the secure range of the given memory zone.
    pub fn tzma(&self, zone: u32) -> Result<u16, Error> {
        let index = self.check_zone(zone)?;
        Ok(self.regs.tzma(index).range)
    }

    /// Locks the secure range of the given memory zone until the next reset.
    ///
    /// Locking an already locked zone has no effect.
    pub fn lock_tzma(&mut self, zone: u32) -> Result<(), Error> {
        let index = self.check_zone(zone)?;
        let current = self.regs.tzma(index);
        self.regs.write_tzma(
            index,
            TzmaRegister {
                locked: true,
                ..current
            },
        );
        Ok(())
    }

    /// Returns whether the secure range of the given memory zone is locked.
    pub fn tzma_locked(&self, zone: u32) -> Result<bool, Error> {
        let index = self.check_zone(zone)?;
        Ok(self.regs.tzma(index).locked)
    }
}
