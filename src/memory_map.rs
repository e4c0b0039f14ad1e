// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Description of the memory regions SP_MIN maps before enabling the MMU.

use crate::error::Error;
use arrayvec::ArrayVec;
use bitflags::bitflags;
use log::debug;

/// Maximum number of regions in a [`MemoryMap`].
pub const MAX_MMAP_REGIONS: usize = 16;

bitflags! {
    /// Attributes of a mapped memory region.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct MemoryAttributes: u32 {
        /// Device memory rather than normal cacheable memory.
        const DEVICE = 1 << 0;
        /// Writable.
        const RW = 1 << 1;
        /// Not executable.
        const EXECUTE_NEVER = 1 << 2;
        /// Accessible from the non-secure world.
        const NON_SECURE = 1 << 3;

        /// Secure executable code.
        const CODE = 0;
        /// Secure read-only data.
        const RO_DATA = Self::EXECUTE_NEVER.bits();
        /// Secure read-write data.
        const RW_DATA = Self::RW.bits() | Self::EXECUTE_NEVER.bits();
        /// Secure device registers.
        const DEVICE_RW = Self::DEVICE.bits() | Self::RW.bits() | Self::EXECUTE_NEVER.bits();
    }
}

/// A contiguous range of physical addresses.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AddressRange {
    /// First address of the range.
    pub base: usize,
    /// Size of the range in bytes.
    pub size: usize,
}

impl AddressRange {
    /// Creates a new range.
    pub const fn new(base: usize, size: usize) -> Self {
        Self { base, size }
    }

    /// Returns whether `address` lies within the range.
    pub const fn contains(&self, address: usize) -> bool {
        address >= self.base && address - self.base < self.size
    }

    /// Returns the address one past the end of the range, or `None` if that overflows.
    pub const fn end(&self) -> Option<usize> {
        self.base.checked_add(self.size)
    }
}

/// A region to be identity mapped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MemoryRegion {
    /// The physical addresses covered by the region.
    pub range: AddressRange,
    /// How the region is mapped.
    pub attributes: MemoryAttributes,
}

impl MemoryRegion {
    /// Creates a region covering `size` bytes from `base`.
    pub const fn new(base: usize, size: usize, attributes: MemoryAttributes) -> Self {
        Self {
            range: AddressRange::new(base, size),
            attributes,
        }
    }
}

/// The set of regions to map, in the order they were added.
#[derive(Clone, Debug, Default)]
pub struct MemoryMap {
    regions: ArrayVec<MemoryRegion, MAX_MMAP_REGIONS>,
}

impl MemoryMap {
    /// Creates an empty memory map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a region.
    ///
    /// Returns `Unsupported` for empty or wrapping regions, or for regions which are both writable
    /// and executable, and `ResourceUnavailable` if the map is full.
    pub fn add(&mut self, region: MemoryRegion) -> Result<(), Error> {
        if region.range.size == 0 || region.range.end().is_none() {
            return Err(Error::Unsupported);
        }
        if region.attributes.contains(MemoryAttributes::RW)
            && !region.attributes.contains(MemoryAttributes::EXECUTE_NEVER)
        {
            return Err(Error::Unsupported);
        }
        debug!(
            "mmap: {:#010x}+{:#x} {:?}",
            region.range.base, region.range.size, region.attributes
        );
        self.regions
            .try_push(region)
            .map_err(|_| Error::ResourceUnavailable)
    }

    /// Returns the regions added so far.
    pub fn regions(&self) -> &[MemoryRegion] {
        &self.regions
    }
}
