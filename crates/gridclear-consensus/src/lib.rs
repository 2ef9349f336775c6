mod config;
mod weights;
mod outcome;
mod solver;

pub use config::{AgentConfig, SolverConfig, StaleFill};
pub use weights::LaplacianWeights;
pub use outcome::{ConsensusOutcome, Termination};
pub use solver::ConsensusSolver;

#[cfg(test)]
mod tests;
