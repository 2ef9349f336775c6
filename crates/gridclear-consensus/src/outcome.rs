use gridclear_report::WindowReport;
use gridclear_types::{ClearingType, IterationTrace, SimTime};
use serde::{Deserialize, Serialize};

/// Why the iteration stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Every slot's mismatch is within tolerance
    Converged,
    /// The clearing deadline was reached first
    DeadlineReached,
    /// All step-size backoffs were used up
    BackoffExhausted,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged)
    }
}

/// Result of one market window, already written back to the market state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    /// Cleared price per slot
    pub price: Vec<f64>,
    /// Cleared quantity per slot, market sign convention
    pub quantity: Vec<f64>,
    pub clear_type: ClearingType,
    /// Iteration index reached in the last pass
    pub iterations: usize,
    pub backoffs: usize,
    pub termination: Termination,
    /// Time granted when the window closed
    pub granted: SimTime,
    pub trace: IterationTrace,
    /// Diagnostics written for the window, if a recorder was attached
    pub report: Option<WindowReport>,
}

impl ConsensusOutcome {
    /// Largest absolute mismatch over all slots at the final iteration
    pub fn final_mismatch(&self) -> f64 {
        self.trace.max_abs_mismatch(self.iterations)
    }
}
