use gridclear_consensus::{ConsensusOutcome, ConsensusSolver, Termination};
use gridclear_report::{trace_fingerprint, ConvergenceRecorder, HashRef};
use gridclear_transport::LocalBroker;
use gridclear_types::{ClearingType, GridClearError, MarketKind, Result, SimTime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

use crate::peer::{PeerStats, ResponsivePeer};
use crate::scenario::Scenario;

/// Result of one simulated market window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimResult {
    pub scenario_name: String,
    pub market: MarketKind,
    pub price: Vec<f64>,
    /// Hub's cleared quantity, market sign convention
    pub quantity: Vec<f64>,
    pub clear_type: ClearingType,
    pub iterations: usize,
    pub backoffs: usize,
    pub termination: Termination,
    pub granted: SimTime,
    pub final_mismatch: f64,
    pub fingerprint: HashRef,
    /// Diagnostics files written for the window
    pub files: Vec<PathBuf>,
    pub peers: Vec<PeerStats>,
    pub runtime_ms: f64,
    pub passed: bool,
    pub failure_reasons: Vec<String>,
}

/// Runs a scenario's hub and peers against an in-process broker
#[derive(Debug, Clone, Default)]
pub struct SimRunner {
    out_dir: Option<PathBuf>,
}

impl SimRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write convergence diagnostics and the failure log under `dir`
    pub fn with_output(dir: impl Into<PathBuf>) -> Self {
        SimRunner {
            out_dir: Some(dir.into()),
        }
    }

    /// Clear one `kind` window of the scenario
    pub fn run_scenario(&self, scenario: &Scenario, kind: MarketKind) -> Result<SimResult> {
        scenario.validate()?;
        let started = Instant::now();

        let config = scenario.solver_config(kind);
        let recorder = self.out_dir.as_ref().map(ConvergenceRecorder::in_dir);
        let solver = ConsensusSolver::new(config.clone(), scenario.agent_config(), recorder)?;

        let mut market = scenario.market_state();
        let provider = scenario.provider(&market, kind);
        let slots = scenario.slots(kind);

        let peers = scenario
            .peers
            .iter()
            .map(|p| {
                let bids = p.bids.iter().take(slots).cloned().collect();
                Ok(
                    ResponsivePeer::from_bids(&p.name, &scenario.hub.name, kind, bids, config.bid_size)?
                        .with_silent_steps(p.silent_steps.iter().copied()),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        // every federate joins before anyone requests time
        let broker = LocalBroker::new();
        let mut hub = broker.register(&scenario.hub.name, scenario.start)?;
        let peer_feds = peers
            .iter()
            .map(|p| broker.register(p.name(), scenario.start))
            .collect::<Result<Vec<_>>>()?;

        let start = scenario.start;
        let deadline = scenario.deadline();
        let microstep = config.microstep;

        info!(scenario = %scenario.name, market = %kind, peers = peers.len(), "running scenario");

        let (outcome, peer_stats) = thread::scope(|s| -> Result<(ConsensusOutcome, Vec<PeerStats>)> {
            let handles: Vec<_> = peers
                .iter()
                .zip(peer_feds)
                .map(|(peer, mut fed)| {
                    s.spawn(move || -> Result<PeerStats> {
                        let stats = peer.run(&mut fed, start, deadline, microstep);
                        fed.finalize()?;
                        stats
                    })
                })
                .collect();

            let outcome = solver.clear_with(&mut hub, &mut market, provider.as_ref(), kind, start, deadline);
            let finalized = hub.finalize();

            let mut stats = Vec::with_capacity(handles.len());
            for handle in handles {
                match handle.join() {
                    Ok(Ok(peer_stats)) => stats.push(peer_stats),
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(GridClearError::Transport("peer thread panicked".to_string())),
                }
            }
            finalized?;
            Ok((outcome?, stats))
        })?;

        // same columns as the recorded diagnostics
        let (fingerprint, files) = match &outcome.report {
            Some(report) => (report.fingerprint.clone(), report.paths.clone()),
            None => (trace_fingerprint(&outcome.trace, outcome.iterations)?, Vec::new()),
        };

        let mut result = SimResult {
            scenario_name: scenario.name.clone(),
            market: kind,
            final_mismatch: outcome.final_mismatch(),
            price: outcome.price,
            quantity: outcome.quantity,
            clear_type: outcome.clear_type,
            iterations: outcome.iterations,
            backoffs: outcome.backoffs,
            termination: outcome.termination,
            granted: outcome.granted,
            fingerprint,
            files,
            peers: peer_stats,
            runtime_ms: started.elapsed().as_secs_f64() * 1000.0,
            passed: true,
            failure_reasons: Vec::new(),
        };
        self.check_expectations(scenario, &mut result);

        if result.passed {
            info!(scenario = %result.scenario_name, iterations = result.iterations, price = ?result.price, "scenario passed");
        } else {
            warn!(scenario = %result.scenario_name, reasons = ?result.failure_reasons, "scenario failed");
        }
        Ok(result)
    }

    fn check_expectations(&self, scenario: &Scenario, result: &mut SimResult) {
        let Some(expected) = &scenario.expected else {
            return;
        };
        let mut reasons = Vec::new();

        if let Some(converged) = expected.converged {
            if result.termination.is_converged() != converged {
                reasons.push(format!(
                    "Expected converged={converged}, got {:?}",
                    result.termination
                ));
            }
        }
        if let Some(max_iterations) = expected.max_iterations {
            if result.iterations > max_iterations {
                reasons.push(format!(
                    "Iterations {} exceed limit {max_iterations}",
                    result.iterations
                ));
            }
        }
        if let Some((lo, hi)) = expected.price_range {
            for (slot, p) in result.price.iter().enumerate() {
                if *p < lo || *p > hi {
                    reasons.push(format!("Slot {slot} price {p:.4} outside [{lo}, {hi}]"));
                }
            }
        }

        result.passed = reasons.is_empty();
        result.failure_reasons = reasons;
    }
}
