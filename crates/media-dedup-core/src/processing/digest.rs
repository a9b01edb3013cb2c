//! Streaming SHA-256 content digests.
//!
//! Files are read in fixed-size chunks so memory use stays bounded by the
//! buffer size no matter how large the file is.

use sha2::{Digest as _, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::types::Digest;

/// Default read buffer (1 MiB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Compute the SHA-256 digest of a file using a `buffer_size` read buffer
pub fn compute_digest<P: AsRef<Path>>(path: P, buffer_size: usize) -> io::Result<Digest> {
    let mut file = File::open(path)?;
    digest_reader(&mut file, buffer_size)
}

/// Compute the SHA-256 digest of everything `reader` yields
pub fn digest_reader<R: Read>(reader: &mut R, buffer_size: usize) -> io::Result<Digest> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(Digest::from_bytes(&hasher.finalize()))
}
