// Content hashing
mod digest;
mod pool;

pub use digest::{compute_digest, digest_reader, DEFAULT_BUFFER_SIZE};
pub use pool::{HashJob, HashOutcome, HashPool};
