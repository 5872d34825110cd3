use std::{env, path::PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let ld = manifest_dir.join("linker.ld");

    println!("cargo:rerun-if-changed={}", ld.display());

    // Host builds (unit tests) link normally; only the bare-metal kernel uses the script.
    if env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("x86") {
        println!("cargo:rustc-link-arg-bins=-T{}", ld.display());
    }
}
