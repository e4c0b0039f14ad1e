// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

use core::{marker::PhantomData, ops::Deref};

/// Gives typed access to a block of memory-mapped registers at a fixed address.
pub struct MmioDerefWrapper<T> {
    start_addr: usize,
    phantom: PhantomData<fn() -> T>,
}

impl<T> MmioDerefWrapper<T> {
    /// Creates a wrapper for the register block starting at `start_addr`.
    ///
    /// # Safety
    ///
    /// `start_addr` must be the suitably aligned address of a register block with the layout of
    /// `T`, which stays mapped for as long as the wrapper exists and is only accessed through
    /// `T`'s interior mutability.
    pub const unsafe fn new(start_addr: usize) -> Self {
        Self {
            start_addr,
            phantom: PhantomData,
        }
    }

    /// Returns the address of the register block.
    pub const fn start_addr(&self) -> usize {
        self.start_addr
    }
}

impl<T> Deref for MmioDerefWrapper<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // SAFETY: The caller of `new` promised that `start_addr` points to a valid, mapped `T`
        // which lives as long as the wrapper.
        unsafe { &*(self.start_addr as *const T) }
    }
}
