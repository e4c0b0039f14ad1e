// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! The GICv2 registers used by the secure interrupt dispatcher.

use super::{InterruptController, int_id_from_raw};
use crate::mmio::MmioDerefWrapper;
use arm_gic::IntId;
use tock_registers::{
    interfaces::{Readable, Writeable},
    register_bitfields, register_structs,
    registers::{ReadOnly, ReadWrite, WriteOnly},
};

register_bitfields! {
    u32,

    /// End of Interrupt Register
    EOIR [
        EOIINTID OFFSET(0) NUMBITS(10) [],
        CPUID OFFSET(10) NUMBITS(3) []
    ],

    /// Highest Priority Pending Interrupt Register
    HPPIR [
        PENDINTID OFFSET(0) NUMBITS(10) [],
        CPUID OFFSET(10) NUMBITS(3) []
    ]
}

register_structs! {
    #[allow(non_snake_case)]
    pub GiccRegisterBlock {
        (0x000 => _reserved0),
        (0x010 => EOIR: WriteOnly<u32, EOIR::Register>),
        (0x014 => _reserved1),
        (0x018 => HPPIR: ReadOnly<u32, HPPIR::Register>),
        (0x01C => @END),
    }
}

register_structs! {
    #[allow(non_snake_case)]
    pub GicdRegisterBlock {
        (0x000 => _reserved0),
        (0x180 => ICENABLER: [ReadWrite<u32>; 32]),
        (0x200 => @END),
    }
}

/// The GICv2 CPU interface and distributor, as far as secure interrupt handling needs them.
pub struct GicV2 {
    gicc: MmioDerefWrapper<GiccRegisterBlock>,
    gicd: MmioDerefWrapper<GicdRegisterBlock>,
}

impl GicV2 {
    /// Creates an instance for the GIC with the given distributor and CPU interface base
    /// addresses.
    ///
    /// # Safety
    ///
    /// The addresses must be those of a mapped GICv2 distributor and CPU interface.
    pub const unsafe fn new(gicd_base: usize, gicc_base: usize) -> Self {
        Self {
            // SAFETY: Our caller guarantees the address is that of a mapped GICC.
            gicc: unsafe { MmioDerefWrapper::new(gicc_base) },
            // SAFETY: Our caller guarantees the address is that of a mapped GICD.
            gicd: unsafe { MmioDerefWrapper::new(gicd_base) },
        }
    }
}

impl InterruptController for GicV2 {
    fn pending_interrupt(&self) -> Option<IntId> {
        int_id_from_raw(self.gicc.HPPIR.read(HPPIR::PENDINTID))
    }

    fn end_of_interrupt(&self, int_id: IntId) {
        self.gicc
            .EOIR
            .write(EOIR::EOIINTID.val(u32::from(int_id)));
    }

    fn disable_interrupt(&self, int_id: IntId) {
        let id = u32::from(int_id);
        // ICENABLER is write-1-to-clear, so other interrupts are unaffected.
        self.gicd.ICENABLER[(id / 32) as usize].set(1 << (id % 32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gic_registers() {
        let mut gicc = Box::new([0u32; 0x1C / 4]);
        let mut gicd = Box::new([0u32; 0x200 / 4]);
        gicc[0x18 / 4] = 0x0000_1400 | 1023;
        {
            // SAFETY: Both buffers are live, suitably aligned and the size of the register
            // blocks, and aren't accessed any other way until `gic` is dropped.
            let gic = unsafe {
                GicV2::new(gicd.as_mut_ptr() as usize, gicc.as_mut_ptr() as usize)
            };
            assert_eq!(gic.pending_interrupt(), None);
            gic.end_of_interrupt(IntId::spi(4));
            gic.disable_interrupt(IntId::spi(212));
        }
        assert_eq!(gicc[0x10 / 4], 36);
        assert_eq!(gicd[0x180 / 4 + 7], 1 << 20);

        gicc[0x18 / 4] = 29;
        // SAFETY: As above.
        let gic = unsafe { GicV2::new(gicd.as_mut_ptr() as usize, gicc.as_mut_ptr() as usize) };
        assert_eq!(gic.pending_interrupt(), Some(IntId::ppi(13)));
    }
}
