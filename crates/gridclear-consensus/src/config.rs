use gridclear_types::{GridClearError, Result, SimTime};
use serde::{Deserialize, Serialize};

/// What a peer's price reads as in an iteration where it sent nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleFill {
    /// Carry the last received price and quantity forward
    Previous,
    /// Price reads as zero for that iteration; the quantity still carries forward
    Zero,
}

/// Tunables of the consensus iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Initial gradient step size
    pub gamma: f64,
    /// Iterations per pass before the step size is backed off
    pub iter_max: usize,
    /// Backoffs allowed before giving up
    pub gamma_max: usize,
    /// Simulated seconds per iteration
    pub microstep: SimTime,
    /// Mismatch tolerance per slot
    pub rela_eps: f64,
    /// Points per normalized bid curve
    pub bid_size: usize,
    pub stale_fill: StaleFill,
    /// Max distance of the local quantity from the previously cleared one
    pub ramp_limit: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            gamma: 0.0025,
            iter_max: 1600,
            gamma_max: 10,
            microstep: 0.010,
            rela_eps: 5e-2,
            bid_size: 100,
            stale_fill: StaleFill::Previous,
            ramp_limit: None,
        }
    }
}

impl SolverConfig {
    /// Day-ahead defaults: silent peers read as zero price
    pub fn day_ahead() -> Self {
        SolverConfig {
            stale_fill: StaleFill::Zero,
            ..Self::default()
        }
    }

    /// Real-time defaults: silent peers keep their last values
    pub fn real_time() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.gamma > 0.0) {
            return Err(GridClearError::InvalidConfig(format!("gamma must be positive, got {}", self.gamma)));
        }
        if self.iter_max < 3 {
            return Err(GridClearError::InvalidConfig(format!(
                "iter_max must be at least 3, got {}",
                self.iter_max
            )));
        }
        if !(self.microstep > 0.0) {
            return Err(GridClearError::InvalidConfig(format!(
                "microstep must be positive, got {}",
                self.microstep
            )));
        }
        if !(self.rela_eps > 0.0) {
            return Err(GridClearError::InvalidConfig(format!(
                "rela_eps must be positive, got {}",
                self.rela_eps
            )));
        }
        if self.bid_size < 2 {
            return Err(GridClearError::InvalidConfig(format!(
                "bid_size must be at least 2, got {}",
                self.bid_size
            )));
        }
        if let Some(limit) = self.ramp_limit {
            if !(limit >= 0.0) {
                return Err(GridClearError::InvalidConfig(format!("ramp_limit must be non-negative, got {limit}")));
            }
        }
        Ok(())
    }
}

/// Identity of the agent running the solver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    /// Peers in index order; the local agent is index 0
    pub peers: Vec<String>,
    /// Snap the local quantity back inside the curve bounds after inversion.
    /// A guard for providers whose curves do not clamp on their own.
    #[serde(default)]
    pub applies_hub_bounding: bool,
}

impl AgentConfig {
    pub fn new(name: &str, peers: &[&str]) -> Self {
        AgentConfig {
            name: name.to_string(),
            peers: peers.iter().map(|p| p.to_string()).collect(),
            applies_hub_bounding: false,
        }
    }

    pub fn with_hub_bounding(mut self) -> Self {
        self.applies_hub_bounding = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GridClearError::InvalidConfig("agent name is empty".to_string()));
        }
        for (i, peer) in self.peers.iter().enumerate() {
            if *peer == self.name || self.peers[..i].contains(peer) {
                return Err(GridClearError::InvalidConfig(format!(
                    "peer {peer} of {} is listed twice or is the agent itself",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
