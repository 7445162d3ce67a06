//! Build script for storefront crate.
//!
//! Hashes everything under `static/` so asset URLs change whenever an asset
//! does; `/static` is served with immutable caching.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

fn main() {
    let manifest_dir =
        env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set by Cargo");
    let static_dir = Path::new(&manifest_dir).join("static");

    println!("cargo:rerun-if-changed={}", static_dir.display());

    let mut files = Vec::new();
    collect_files(&static_dir, &mut files);
    files.sort();

    let mut hasher = Sha256::new();
    for path in &files {
        println!("cargo:rerun-if-changed={}", path.display());
        match fs::read(path) {
            Ok(content) => {
                hasher.update(path.strip_prefix(&static_dir).unwrap_or(path).to_string_lossy().as_bytes());
                hasher.update(&content);
            }
            Err(e) => println!("cargo:warning=Could not read {}: {e}", path.display()),
        }
    }

    // First 8 hex chars are plenty for cache busting
    let hash = format!("{:x}", hasher.finalize());
    let short_hash = hash.get(..8).unwrap_or(&hash);
    println!("cargo:rustc-env=STATIC_VERSION={short_hash}");
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}
