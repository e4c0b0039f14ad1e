// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! SP_MIN platform layer for STM32MP1: secure boot handoff, ETZPC isolation and secure interrupt
//! dispatch for the minimal AArch32 secure payload.

#![cfg_attr(not(test), no_std)]

pub mod debug;
pub mod error;
pub mod etzpc;
pub mod handoff;
pub mod interrupts;
pub mod logger;
pub mod memory_map;
mod mmio;
pub mod platform;
pub mod pmic;
pub mod sequencer;
pub mod tamper;

pub use error::Error;
