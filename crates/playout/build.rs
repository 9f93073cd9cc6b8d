use std::{env, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-env-changed=DECKLINK_SDK_DIR");

    // The driver shim is only pulled in for real-hardware builds.
    if env::var_os("CARGO_FEATURE_HARDWARE").is_none() {
        return;
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    match target_os.as_str() {
        "macos" => {
            println!("cargo:rustc-link-search=framework=/Library/Frameworks");
            println!("cargo:rustc-link-lib=framework=DeckLinkAPI");
            println!("cargo:rustc-link-lib=framework=CoreFoundation");
        }
        "linux" => {
            // Desktop Video drivers install the shared library system-wide,
            // typically as /usr/lib/libDeckLinkAPI.so.
            println!("cargo:rustc-link-lib=DeckLinkAPI");
            if let Some(sdk) = env::var_os("DECKLINK_SDK_DIR").map(PathBuf::from) {
                for dir in [sdk.join("Linux").join("Libraries"), sdk.join("lib")] {
                    if dir.exists() {
                        println!("cargo:rustc-link-search=native={}", dir.display());
                    }
                }
            }
        }
        "windows" => {
            println!("cargo:rustc-link-lib=ole32");
        }
        _ => {}
    }
}
