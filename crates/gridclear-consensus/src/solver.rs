use gridclear_curves::{BidCurve, BidProvider, InterpolatedCurveProvider};
use gridclear_report::{ConvergenceRecorder, FailureRecord, WindowReport};
use gridclear_transport::{advance_to, Federate, PeerChannel};
use gridclear_types::{
    advance_by, ClearingType, GridClearError, IterationTrace, MarketKind, MarketState, Result, SimTime,
};
use tracing::{debug, info, trace, warn};

use crate::config::{AgentConfig, SolverConfig, StaleFill};
use crate::outcome::{ConsensusOutcome, Termination};
use crate::weights::LaplacianWeights;

/// Last values received from one peer
#[derive(Debug, Clone)]
struct PeerMemory {
    price: Vec<f64>,
    quantity: Vec<f64>,
}

/// Distributed gradient-consensus clearing for one agent.
///
/// Each call to [`ConsensusSolver::clear`] runs one market window: it seeds
/// the local estimate from the previously cleared quantity, then alternates
/// time advances, peer exchange and price updates until every slot's
/// mismatch is within tolerance, the deadline is reached or the step-size
/// backoffs run out. The last iterate is always written back.
#[derive(Debug, Clone)]
pub struct ConsensusSolver {
    config: SolverConfig,
    agent: AgentConfig,
    recorder: Option<ConvergenceRecorder>,
}

impl ConsensusSolver {
    pub fn new(config: SolverConfig, agent: AgentConfig, recorder: Option<ConvergenceRecorder>) -> Result<Self> {
        config.validate()?;
        agent.validate()?;
        Ok(ConsensusSolver {
            config,
            agent,
            recorder,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn agent(&self) -> &AgentConfig {
        &self.agent
    }

    /// Clear one window using the bid curves stored in the market state
    pub fn clear<F: Federate + ?Sized>(
        &self,
        federate: &mut F,
        market: &mut MarketState,
        kind: MarketKind,
        granted: SimTime,
        deadline: SimTime,
    ) -> Result<ConsensusOutcome> {
        let provider = InterpolatedCurveProvider::from_market(market, kind);
        self.clear_with(federate, market, &provider, kind, granted, deadline)
    }

    /// Clear one window with curves from `provider`
    pub fn clear_with<F, P>(
        &self,
        federate: &mut F,
        market: &mut MarketState,
        provider: &P,
        kind: MarketKind,
        granted: SimTime,
        deadline: SimTime,
    ) -> Result<ConsensusOutcome>
    where
        F: Federate + ?Sized,
        P: BidProvider + ?Sized,
    {
        let horizon = provider.horizon();
        if horizon == 0 || (!kind.is_day_ahead() && horizon != 1) {
            return Err(GridClearError::InvalidConfig(format!(
                "{kind} market cannot clear a horizon of {horizon} slots"
            )));
        }

        let curves = provider.curves(self.config.bid_size)?;
        let n = 1 + self.agent.peers.len();
        let weights = LaplacianWeights::build(n);
        let channels: Vec<PeerChannel> = self
            .agent
            .peers
            .iter()
            .map(|peer| PeerChannel::new(&self.agent.name, peer, kind))
            .collect();
        let demand = market.uncontrolled_demand(kind, horizon);
        let previous = market.previous_cleared(kind, horizon);

        debug!(agent = %self.agent.name, market = %kind, horizon, agents = n, "solving consensus");

        let mut trace = IterationTrace::new(horizon, n, self.config.iter_max);
        let start: Vec<f64> = curves
            .iter()
            .zip(&previous)
            .map(|(curve, q)| curve.clamp_quantity(-q))
            .collect();
        for (slot, curve) in curves.iter().enumerate() {
            trace.set_quantity(slot, 0, 0, start[slot]);
            trace.set_price(slot, 0, 0, curve.price_at(start[slot]));
            trace.set_mismatch(slot, 0, demand[slot] - trace.total_quantity(slot, 0));
        }
        publish(federate, &channels, &trace, 0)?;

        let mut memory = vec![
            PeerMemory {
                price: vec![0.0; horizon],
                quantity: vec![0.0; horizon],
            };
            channels.len()
        ];
        let mut k = 0;
        let mut backoffs = 0;
        let mut gamma = self.config.gamma;
        let mut time = granted;
        let mut granted = granted;

        let termination = loop {
            if k >= 2 && self.within_tolerance(&trace, k) {
                break Termination::Converged;
            }
            if granted >= deadline {
                break Termination::DeadlineReached;
            }
            if k + 1 >= self.config.iter_max {
                if backoffs >= self.config.gamma_max {
                    backoffs += 1;
                    break Termination::BackoffExhausted;
                }
                k = 0;
                backoffs += 1;
                gamma /= (backoffs as f64).sqrt();
                debug!(agent = %self.agent.name, backoffs, gamma, "step size backed off");
            }

            time = advance_by(time, self.config.microstep).min(deadline);
            granted = advance_to(federate, time)?;

            self.collect(federate, &channels, &mut memory, &mut trace, k)?;
            self.update(&curves, &weights, &demand, &start, gamma, &mut trace, k);
            k += 1;
            publish(federate, &channels, &trace, k)?;

            trace!(agent = %self.agent.name, k, mismatch = trace.max_abs_mismatch(k), "iteration");
        };

        let price = trace.price_column(0, k);
        // market convention counts injection as negative
        let quantity: Vec<f64> = trace.quantity_column(0, k).iter().map(|q| -q).collect();
        market.write_clearing(kind, &quantity, &price, ClearingType::Uncongested);

        match termination {
            Termination::Converged => {
                info!(agent = %self.agent.name, market = %kind, iterations = k, backoffs, "consensus reached");
            }
            Termination::DeadlineReached => {
                let err = GridClearError::TimeoutExpired { at: granted };
                warn!(agent = %self.agent.name, market = %kind, mismatch = trace.max_abs_mismatch(k), "{err}");
            }
            Termination::BackoffExhausted => {
                let err = GridClearError::ConvergenceFailed {
                    iterations: k,
                    backoffs,
                };
                warn!(agent = %self.agent.name, market = %kind, "{err}");
                self.log_failure(kind, granted, k, backoffs);
            }
        }

        if granted < deadline {
            granted = advance_to(federate, deadline)?;
        }
        let mut dropped = 0;
        for channel in &channels {
            dropped += channel.drain(federate)?;
        }
        if dropped > 0 {
            debug!(agent = %self.agent.name, dropped, "discarded late peer messages");
        }

        let report = self.record(kind, granted, &trace, k);

        Ok(ConsensusOutcome {
            price,
            quantity,
            clear_type: ClearingType::Uncongested,
            iterations: k,
            backoffs,
            termination,
            granted,
            trace,
            report,
        })
    }

    fn within_tolerance(&self, trace: &IterationTrace, k: usize) -> bool {
        (0..trace.horizon()).all(|slot| trace.mismatch(slot, k).abs() <= self.config.rela_eps)
    }

    /// Read at most one price and quantity per peer into column `k`; silent
    /// peers are filled according to the stale policy
    fn collect<F: Federate + ?Sized>(
        &self,
        federate: &mut F,
        channels: &[PeerChannel],
        memory: &mut [PeerMemory],
        trace: &mut IterationTrace,
        k: usize,
    ) -> Result<()> {
        let horizon = trace.horizon();
        for (idx, (channel, last)) in channels.iter().zip(memory.iter_mut()).enumerate() {
            let agent = idx + 1;
            let update = channel.poll(federate, horizon)?;

            let fresh_price = update.price.is_some();
            if let Some(price) = update.price {
                trace.set_delay_price(agent, k, price.time);
                last.price = price.values;
            }
            if let Some(quantity) = update.quantity {
                trace.set_delay_quantity(agent, k, quantity.time);
                last.quantity = quantity.values;
            } else {
                trace!(peer = channel.peer(), k, "peer silent");
            }

            let keep_price = fresh_price || self.config.stale_fill == StaleFill::Previous;
            for slot in 0..horizon {
                trace.set_price(slot, agent, k, if keep_price { last.price[slot] } else { 0.0 });
                trace.set_quantity(slot, agent, k, last.quantity[slot]);
            }
        }
        Ok(())
    }

    /// Compute mismatch `k + 1` from column `k`, then the local price and
    /// quantity for `k + 1`
    #[allow(clippy::too_many_arguments)]
    fn update(
        &self,
        curves: &[BidCurve],
        weights: &LaplacianWeights,
        demand: &[f64],
        start: &[f64],
        gamma: f64,
        trace: &mut IterationTrace,
        k: usize,
    ) {
        let step = gamma / (0.9 * (k + 1) as f64);
        let row = weights.row(0);

        for (slot, curve) in curves.iter().enumerate() {
            let mismatch = demand[slot] - trace.total_quantity(slot, k);
            trace.set_mismatch(slot, k + 1, mismatch);

            let consensus: f64 = row
                .iter()
                .enumerate()
                .map(|(j, w)| w * trace.price(slot, j, k))
                .sum();
            let price = curve.clamp_price(consensus + step * mismatch);

            let mut quantity = curve.quantity_at(price);
            if self.agent.applies_hub_bounding {
                quantity = curve.clamp_quantity(quantity);
            }
            if let Some(limit) = self.config.ramp_limit {
                quantity = quantity.clamp(start[slot] - limit, start[slot] + limit);
            }

            trace.set_price(slot, 0, k + 1, price);
            trace.set_quantity(slot, 0, k + 1, quantity);
        }
    }

    fn log_failure(&self, kind: MarketKind, time: SimTime, iterations: usize, backoffs: usize) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let record = FailureRecord {
            agent: self.agent.name.clone(),
            kind,
            time,
            iterations,
            backoffs,
        };
        if let Err(e) = recorder.append_failure(&record) {
            warn!(agent = %self.agent.name, error = %e, "could not append to failure log");
        }
    }

    fn record(&self, kind: MarketKind, granted: SimTime, trace: &IterationTrace, k: usize) -> Option<WindowReport> {
        let recorder = self.recorder.as_ref()?;
        match recorder.record_window(&self.agent.name, kind, granted, trace, k) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(agent = %self.agent.name, error = %e, "could not write convergence diagnostics");
                None
            }
        }
    }
}

fn publish<F: Federate + ?Sized>(
    federate: &mut F,
    channels: &[PeerChannel],
    trace: &IterationTrace,
    k: usize,
) -> Result<()> {
    let prices = trace.price_column(0, k);
    let quantities = trace.quantity_column(0, k);
    for channel in channels {
        channel.publish(federate, &prices, &quantities)?;
    }
    Ok(())
}
