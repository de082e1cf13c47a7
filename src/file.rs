// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Magic prefix of a cache file (`"I18NC"`)
pub const MAGIC_BYTES: [u8; 5] = *b"I18NC";

/// Current cache format version
pub const FORMAT_VERSION: u8 = 1;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}.tmp", std::process::id()));
    PathBuf::from(name)
}

/// Atomically rewrites a file.
///
/// Writes to a pid-tagged sibling first, then renames over the target, so
/// concurrent readers observe either the old or the new content. The temp
/// file is unlinked if any step fails.
pub fn rewrite_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let tmp = temp_path(path);

    let result = (|| {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content)?;
        file.flush()?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    })();

    if result.is_err() {
        // Leftover temp files would pile up across process restarts
        let _ = std::fs::remove_file(&tmp);
        return result;
    }

    #[cfg(not(target_os = "windows"))]
    if let Some(folder) = path.parent() {
        fsync_directory(folder)?;
    }

    Ok(())
}

#[cfg(not(target_os = "windows"))]
pub fn fsync_directory(path: &Path) -> std::io::Result<()> {
    let file = std::fs::File::open(path)?;
    debug_assert!(file.metadata()?.is_dir());
    file.sync_all()
}

#[cfg(target_os = "windows")]
pub fn fsync_directory(_path: &Path) -> std::io::Result<()> {
    // Cannot fsync directory on Windows
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn atomic_rewrite() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let path = dir.path().join("test.txt");
        std::fs::write(&path, "asdasdasdasdasd")?;

        rewrite_atomic(&path, b"newcontent")?;

        let content = std::fs::read_to_string(&path)?;
        assert_eq!("newcontent", content);

        Ok(())
    }

    #[test]
    fn atomic_rewrite_creates_file() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        let path = dir.path().join("fresh.bin");
        rewrite_atomic(&path, b"abc")?;

        assert_eq!(b"abc".as_slice(), std::fs::read(&path)?.as_slice());
        Ok(())
    }

    #[test]
    fn atomic_rewrite_failure_cleans_up_temp() {
        let dir = tempfile::tempdir().expect("tempdir");

        // target inside a directory that does not exist
        let path = dir.path().join("nope").join("cache.bin");
        assert!(rewrite_atomic(&path, b"abc").is_err());

        let leftovers = std::fs::read_dir(dir.path()).expect("read_dir").count();
        assert_eq!(0, leftovers);
    }
}
