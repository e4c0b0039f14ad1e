// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Resolution of the non-secure (BL33) entry point, for both cold boot and resume from standby.

pub mod bl_params;
pub mod context;

use self::{
    bl_params::{ImageDescriptor, ImageId},
    context::{ContextStore, Spsr},
};
use crate::{
    error::{Corruption, Error},
    memory_map::AddressRange,
};
use log::{debug, info};
use zerocopy::FromZeros;

/// Value the ROM code writes to the magic number backup register when the resume address in the
/// branch address register is valid.
pub const RESUME_MAGIC: u32 = 0xCA7F_ACE0;

/// Backup registers used for the resume handoff.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BackupRegister {
    /// Magic number written before entering standby.
    Core1MagicNumber,
    /// Address to branch to on resume.
    Core1BranchAddress,
}

impl BackupRegister {
    /// Returns the index of the register within the backup register bank.
    pub const fn index(self) -> usize {
        match self {
            Self::Core1MagicNumber => 4,
            Self::Core1BranchAddress => 5,
        }
    }
}

/// The power-gated backup register domain.
pub trait BackupDomain {
    /// Opens the clock gate to the backup registers.
    fn enable_access(&mut self);

    /// Closes the clock gate to the backup registers.
    fn disable_access(&mut self);

    /// Reads a backup register. Access must be enabled.
    fn read(&self, register: BackupRegister) -> u32;
}

/// Open access to a backup domain, closed again when dropped.
pub struct BackupDomainAccess<'a, B: BackupDomain + ?Sized> {
    domain: &'a mut B,
}

impl<'a, B: BackupDomain + ?Sized> BackupDomainAccess<'a, B> {
    /// Enables access to `domain` until the returned value is dropped.
    pub fn new(domain: &'a mut B) -> Self {
        domain.enable_access();
        Self { domain }
    }

    /// Reads a backup register.
    pub fn read(&self, register: BackupRegister) -> u32 {
        self.domain.read(register)
    }
}

impl<B: BackupDomain + ?Sized> Drop for BackupDomainAccess<'_, B> {
    fn drop(&mut self) {
        self.domain.disable_access();
    }
}

/// What the previous stage left in the backup registers before standby.
///
/// This is only advisory, and must be validated before use.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResumeEvidence {
    /// Magic number, [`RESUME_MAGIC`] if `saved_pc` was written.
    pub magic: u32,
    /// Saved resume address.
    pub saved_pc: u32,
}

impl ResumeEvidence {
    /// Reads the evidence through an open backup domain.
    pub fn read<B: BackupDomain + ?Sized>(access: &BackupDomainAccess<B>) -> Self {
        Self {
            magic: access.read(BackupRegister::Core1MagicNumber),
            saved_pc: access.read(BackupRegister::Core1BranchAddress),
        }
    }
}

/// Where and how to enter the non-secure world.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromZeros)]
pub struct BootTargetInfo {
    attr: u32,
    pc: usize,
    spsr: Spsr,
    lr_svc: usize,
    args: [usize; 4],
    resolved: bool,
}

impl BootTargetInfo {
    /// Returns the entry point address.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Returns the processor state to enter with.
    pub fn spsr(&self) -> Spsr {
        self.spsr
    }

    /// Returns the r0 to r3 values BL2 passed. These are all 0 on resume.
    pub fn args(&self) -> [usize; 4] {
        self.args
    }

    /// Returns the entry point attribute bits BL2 passed.
    pub fn attr(&self) -> u32 {
        self.attr
    }

    /// Returns the supervisor mode link register BL2 passed.
    pub fn lr_svc(&self) -> usize {
        self.lr_svc
    }

    /// Returns whether the entry point has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

/// The BL33 handoff state.
///
/// This starts out with whatever BL2 passed for BL33, and is resolved the first time the entry
/// point is requested. After that it never changes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootHandoff {
    target: BootTargetInfo,
}

impl Default for BootHandoff {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BootHandoff {
    /// Creates the handoff state from the BL33 descriptor, if there was one.
    ///
    /// Without a descriptor, or with a descriptor whose entry point is 0, the entry point is taken
    /// from the saved context on resolution.
    pub fn new(bl33: Option<&ImageDescriptor>) -> Self {
        let mut target = BootTargetInfo::new_zeroed();
        if let Some(bl33) = bl33 {
            target.attr = bl33.attr;
            target.pc = bl33.pc;
            target.spsr = bl33.spsr;
            target.lr_svc = bl33.lr_svc;
            target.args = bl33.args;
        }
        Self { target }
    }

    /// Creates the handoff state by looking for BL33 in the images passed by BL2.
    pub fn from_images(images: impl IntoIterator<Item = ImageDescriptor>) -> Self {
        let bl33_id = u32::from(ImageId::Bl33);
        let bl33 = images.into_iter().find(|image| image.image_id == bl33_id);
        match &bl33 {
            Some(image) => debug!("BL33 entry point {:#x}", image.pc),
            None => debug!("No BL33 descriptor"),
        }
        Self::new(bl33.as_ref())
    }

    /// Returns the current state, which may not be resolved yet.
    pub fn target(&self) -> &BootTargetInfo {
        &self.target
    }

    /// Returns the non-secure entry point, resolving it on the first call.
    ///
    /// On cold boot this is the entry point BL2 passed. Otherwise the system is resuming from
    /// standby: the saved non-secure context is restored from `store`, and the entry point is the
    /// address saved in the backup registers if they hold [`RESUME_MAGIC`], or else the context's
    /// link register. A saved address outside of `dram` is rejected.
    ///
    /// Errors are all `CorruptedState`, and leave the handoff unresolved.
    pub fn next_entry_point<B, S>(
        &mut self,
        backup: &mut B,
        store: &mut S,
        dram: &AddressRange,
    ) -> Result<&BootTargetInfo, Error>
    where
        B: BackupDomain + ?Sized,
        S: ContextStore + ?Sized,
    {
        if self.target.resolved {
            return Ok(&self.target);
        }
        if self.target.pc != 0 {
            self.target.resolved = true;
            return Ok(&self.target);
        }

        let evidence = ResumeEvidence::read(&BackupDomainAccess::new(backup));
        let context = context::restore(store)?;

        let pc = if evidence.magic == RESUME_MAGIC {
            let pc = evidence.saved_pc as usize;
            if !dram.contains(pc) {
                return Err(Corruption::ResumeAddressOutOfRange { pc }.into());
            }
            pc
        } else {
            context.lr as usize
        };
        info!("Resuming non-secure world at {pc:#x}");

        self.target = BootTargetInfo {
            pc,
            spsr: context.spsr,
            args: [0; 4],
            resolved: true,
            ..self.target
        };
        Ok(&self.target)
    }
}
