// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Build script for the motorcore firmware.
//!
//! Passes the `cortex-m-rt` linker scripts to the firmware binary when building for a bare-metal
//! ARM target. Host builds (unit and integration tests) get no extra link arguments.
//!
//! `memory.x` for the STM32F777 is generated by `stm32f7xx-hal`.

use std::env;

fn main() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.starts_with("thumbv") {
        println!("cargo:rustc-link-arg-bins=-Tlink.x");

        if env::var_os("CARGO_FEATURE_DEFMT").is_some() {
            println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
        }
    }

    println!("cargo:rerun-if-changed=build.rs");
}
