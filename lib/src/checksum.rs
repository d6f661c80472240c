use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

const BUF_SIZE: usize = 256 * 1024;

/// SHA-1 hex digest of a file's raw bytes, streamed through a fixed buffer.
/// Directories hash to the empty string so that archive-style outputs can be
/// recorded without content.
///
/// SHA-1 is retained for compatibility with existing custody caches; nothing
/// downstream assumes collision resistance.
pub fn checksum(path: &Path) -> Result<String> {
    if path.is_dir() {
        return Ok(String::new());
    }

    let mut file = File::open(path).map_err(|source| Error::io("open", path, source))?;

    let mut digest = Sha1::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|source| Error::io("read", path, source))?;

        if n == 0 {
            break;
        }

        digest.update(&buf[..n]);
    }

    Ok(format!("{:x}", digest.finalize()))
}

/// SHA-1 hex digest of an in-memory byte string.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut digest = Sha1::new();
    digest.update(data);
    format!("{:x}", digest.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digests() {
        assert_eq!(checksum_bytes(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(checksum_bytes(b"hello"), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
    }

    #[test]
    fn file_matches_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.bin");
        std::fs::write(&path, b"some file content").unwrap();

        assert_eq!(checksum(&path).unwrap(), checksum_bytes(b"some file content"));
    }

    #[test]
    fn directory_hashes_empty() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(checksum(tmp.path()).unwrap(), "");
    }

    #[test]
    fn missing_file_errors() {
        assert!(checksum(Path::new("/nonexistent/zzz.bin")).is_err());
    }
}
