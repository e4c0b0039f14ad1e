// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Memory-mapped ETZPC register block.

use super::{
    DECPROT_LOCK_REGISTER_COUNT, DECPROT_REGISTER_COUNT, DecprotWord, EtzpcRegisters, HwConfig,
    LockWord, TZMA_REGISTER_COUNT, TzmaRegister,
};
use crate::mmio::MmioDerefWrapper;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite},
};

register_bitfields! {
    u32,

    /// TZMA size register
    TZMA_SIZE [
        R0SIZE OFFSET(0) NUMBITS(10) [],
        LOCK OFFSET(31) NUMBITS(1) []
    ],

    /// Hardware configuration register
    HWCFGR [
        NUM_TZMA OFFSET(0) NUMBITS(8) [],
        NUM_PER_SEC OFFSET(8) NUMBITS(8) [],
        NUM_AHB_SEC OFFSET(16) NUMBITS(8) [],
        CHUNKS1N4 OFFSET(24) NUMBITS(8) []
    ],

    /// IP version register
    VERR [
        MINREV OFFSET(0) NUMBITS(4) [],
        MAJREV OFFSET(4) NUMBITS(4) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    pub RegisterBlock {
        (0x000 => TZMA_SIZE: [ReadWrite<u32, TZMA_SIZE::Register>; TZMA_REGISTER_COUNT]),
        (0x008 => _reserved0),
        (0x010 => DECPROT: [ReadWrite<u32>; DECPROT_REGISTER_COUNT]),
        (0x030 => DECPROT_LOCK: [ReadWrite<u32>; DECPROT_LOCK_REGISTER_COUNT]),
        (0x040 => _reserved1),
        (0x3F0 => HWCFGR: ReadOnly<u32, HWCFGR::Register>),
        (0x3F4 => VERR: ReadOnly<u32, VERR::Register>),
        (0x3F8 => @END),
    }
}

/// ETZPC registers accessed through MMIO.
pub struct MmioEtzpc {
    registers: MmioDerefWrapper<RegisterBlock>,
}

impl MmioEtzpc {
    /// Creates an instance for the ETZPC at the given base address.
    ///
    /// # Safety
    ///
    /// `base_address` must be the address of a mapped ETZPC register block, and nothing else may
    /// create another instance for the same block.
    pub const unsafe fn new(base_address: usize) -> Self {
        Self {
            // SAFETY: Our caller guarantees the address is that of a mapped ETZPC.
            registers: unsafe { MmioDerefWrapper::new(base_address) },
        }
    }
}

impl EtzpcRegisters for MmioEtzpc {
    fn base_address(&self) -> usize {
        self.registers.start_addr()
    }

    fn hwcfg(&self) -> HwConfig {
        let hwcfgr = &self.registers.HWCFGR;
        HwConfig {
            memory_zones: hwcfgr.read(HWCFGR::NUM_TZMA),
            peripherals: hwcfgr.read(HWCFGR::NUM_PER_SEC),
            ahb_peripherals: hwcfgr.read(HWCFGR::NUM_AHB_SEC),
            chunk_size: hwcfgr.read(HWCFGR::CHUNKS1N4),
        }
    }

    fn version(&self) -> u8 {
        let verr = &self.registers.VERR;
        ((verr.read(VERR::MAJREV) << 4) | verr.read(VERR::MINREV)) as u8
    }

    fn decprot(&self, index: usize) -> DecprotWord {
        DecprotWord(self.registers.DECPROT[index].get())
    }

    fn write_decprot(&mut self, index: usize, value: DecprotWord) {
        self.registers.DECPROT[index].set(value.0);
    }

    fn decprot_lock(&self, index: usize) -> LockWord {
        LockWord(self.registers.DECPROT_LOCK[index].get())
    }

    fn set_decprot_lock(&mut self, index: usize, value: LockWord) {
        self.registers.DECPROT_LOCK[index].set(value.0);
    }

    fn tzma(&self, zone: usize) -> TzmaRegister {
        let tzma = &self.registers.TZMA_SIZE[zone];
        TzmaRegister {
            range: tzma.read(TZMA_SIZE::R0SIZE) as u16,
            locked: tzma.is_set(TZMA_SIZE::LOCK),
        }
    }

    fn write_tzma(&mut self, zone: usize, value: TzmaRegister) {
        self.registers.TZMA_SIZE[zone].write(
            TZMA_SIZE::R0SIZE.val(value.range.into()) + TZMA_SIZE::LOCK.val(value.locked.into()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORDS: usize = 0x3F8 / 4;

    /// Runs `f` on an `MmioEtzpc` backed by `memory`, so the raw words can be checked afterwards.
    fn with_mmio<T>(memory: &mut [u32; WORDS], f: impl FnOnce(&mut MmioEtzpc) -> T) -> T {
        // SAFETY: `memory` is a live, suitably aligned buffer the size of the register block, and
        // isn't accessed any other way until `regs` is dropped.
        let mut regs = unsafe { MmioEtzpc::new(memory.as_mut_ptr() as usize) };
        f(&mut regs)
    }

    #[test]
    fn reads_configuration() {
        let mut memory = Box::new([0u32; WORDS]);
        memory[0x3F0 / 4] = 0x0102_6002;
        memory[0x3F4 / 4] = 0x0000_0021;
        let (hwcfg, version) = with_mmio(&mut memory, |regs| (regs.hwcfg(), regs.version()));
        assert_eq!(
            hwcfg,
            HwConfig {
                memory_zones: 2,
                peripherals: 0x60,
                ahb_peripherals: 2,
                chunk_size: 1,
            }
        );
        assert_eq!(version, 0x21);
    }

    #[test]
    fn register_offsets() {
        let mut memory = Box::new([0u32; WORDS]);
        with_mmio(&mut memory, |regs| {
            regs.write_tzma(
                1,
                TzmaRegister {
                    range: 0x3e,
                    locked: true,
                },
            );
            regs.write_decprot(2, DecprotWord(0x0000_00c0));
            regs.set_decprot_lock(1, LockWord::slot(4));
        });
        assert_eq!(memory[1], 0x8000_003e);
        assert_eq!(memory[0x010 / 4 + 2], 0x0000_00c0);
        assert_eq!(memory[0x030 / 4 + 1], 0x0000_0010);

        let (tzma, decprot, lock) = with_mmio(&mut memory, |regs| {
            (regs.tzma(1), regs.decprot(2), regs.decprot_lock(1))
        });
        assert_eq!(
            tzma,
            TzmaRegister {
                range: 0x3e,
                locked: true
            }
        );
        assert_eq!(decprot.get(3), crate::etzpc::DecprotAttribute::NonSecureReadWrite);
        assert!(lock.is_locked(4));
    }
}
