// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use sha2::{Digest, Sha256};
use std::{path::Path, time::UNIX_EPOCH};

/// How the cache fingerprint is derived from the source files
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FingerprintMode {
    /// Hash each path with its mtime. Fast; fooled by touch-based
    /// redeploys that restore identical timestamps.
    #[default]
    Mtime,

    /// Hash each path with its full contents. Robust; reads every file.
    Digest,
}

/// Computes the hex SHA-256 fingerprint over an ordered list of source
/// file paths.
///
/// Two stores agree on a fingerprint exactly when they would load the same
/// ordered file list with unchanged files (mtime mode) or unchanged
/// contents (digest mode).
pub fn fingerprint<P: AsRef<Path>>(paths: &[P], mode: FingerprintMode) -> std::io::Result<String> {
    let mut hasher = Sha256::new();

    match mode {
        FingerprintMode::Mtime => {
            let mut lines = Vec::with_capacity(paths.len());

            for path in paths {
                let path = path.as_ref();
                let mtime = std::fs::metadata(path)?
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .map_err(|e| std::io::Error::other(e.to_string()))?
                    .as_secs();

                lines.push(format!("{}:{mtime}", path.display()));
            }

            hasher.update(lines.join("\n").as_bytes());
        }
        FingerprintMode::Digest => {
            for path in paths {
                let path = path.as_ref();
                hasher.update(path.as_os_str().as_encoded_bytes());
                hasher.update([0]);
                hasher.update(std::fs::read(path)?);
                hasher.update([0]);
            }
        }
    }

    Ok(hex::encode(hasher.finalize()))
}
