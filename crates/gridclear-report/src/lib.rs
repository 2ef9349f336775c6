mod recorder;
mod hashing;

pub use recorder::{ConvergenceRecorder, FailureRecord, WindowReport};
pub use hashing::{compute_hash, compute_json_hash, trace_fingerprint, HashRef};
