//! Build script for pixel-wire: picks the linker memory layout for the selected board.

use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rustc-check-cfg=cfg(rust_analyzer)");

    let target = env::var("TARGET").expect("TARGET is set by cargo");
    let memory_file = if target.starts_with("thumbv8m") {
        "memory-pico2.x"
    } else if target.starts_with("riscv32imac") {
        "memory-pico2-riscv.x"
    } else if target.starts_with("thumbv6m") {
        "memory-pico1.x"
    } else {
        // Host builds (tests) link normally.
        return;
    };

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let memory_x = fs::read_to_string(memory_file)
        .unwrap_or_else(|err| panic!("Failed to read {memory_file}: {err}"));
    fs::write(out_dir.join("memory.x"), memory_x).expect("Failed to write memory.x");
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed={memory_file}");

    // Demo binaries only; the library itself is linked by the application.
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    if target.starts_with("thumbv6m") {
        println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    }
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
