// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Build script for the SP_MIN platform layer.

/// Platforms which can be selected with `--cfg platform="..."`.
const PLATFORMS: [&str; 1] = ["stm32mp1"];

fn main() {
    println!(
        "cargo::rustc-check-cfg=cfg(platform, values(\"{}\"))",
        PLATFORMS.join("\", \""),
    );
    println!("cargo::rerun-if-env-changed=LOG_LEVEL");
}
