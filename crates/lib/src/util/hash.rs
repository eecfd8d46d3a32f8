//! SHA-256 helpers for content fingerprints and cache verification.
//!
//! Digests are always lowercase hex strings of 64 characters.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Hash a file's contents.
///
/// Returns the digest together with the number of bytes hashed.
pub fn hash_file(path: &Path) -> io::Result<(String, u64)> {
  let mut file = fs::File::open(path)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];
  let mut total = 0u64;

  loop {
    let bytes_read = file.read(&mut buffer)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
    total += bytes_read as u64;
  }

  Ok((hex::encode(hasher.finalize()), total))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(data);
  hex::encode(hasher.finalize())
}

/// Returns true if `digest` looks like a hex SHA-256 digest.
pub fn is_sha256_hex(digest: &str) -> bool {
  digest.len() == SHA256_HEX_LEN && digest.bytes().all(|b| b.is_ascii_hexdigit())
}
