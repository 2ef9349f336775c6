use gridclear_types::{IterationTrace, Result};
use sha2::{Digest, Sha256};

/// Hash reference (hex-encoded SHA256)
pub type HashRef = String;

/// Compute SHA256 hash of data
pub fn compute_hash(data: &[u8]) -> HashRef {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute hash of JSON-serialized data
pub fn compute_json_hash<T: serde::Serialize>(data: &T) -> Result<HashRef> {
    let json = serde_json::to_vec(data)?;
    Ok(compute_hash(&json))
}

/// Fingerprint of the local agent's price and quantity trajectories over
/// iterations `0..columns`
pub fn trace_fingerprint(trace: &IterationTrace, columns: usize) -> Result<HashRef> {
    compute_json_hash(&(trace.price_rows(0, columns), trace.quantity_rows(0, columns)))
}
