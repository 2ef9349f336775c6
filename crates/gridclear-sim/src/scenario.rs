use gridclear_consensus::{AgentConfig, SolverConfig};
use gridclear_curves::{BidProvider, GeneratorCost, InterpolatedCurveProvider, QuadraticCostCurveProvider};
use gridclear_types::{GridClearError, MarketKind, MarketState, RawBid, Result, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// How the hub's bid is described
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubBid {
    /// One raw curve per day-ahead slot; real-time uses the first
    Curves { bids: Vec<RawBid> },
    /// Dispatchable generator with a quadratic cost
    Generator { cost: GeneratorCost, horizon: usize },
}

/// The agent running the consensus solver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub name: String,
    #[serde(default)]
    pub applies_hub_bounding: bool,
    pub bid: HubBid,
    /// Previously cleared quantity per slot, market sign convention
    #[serde(default)]
    pub previous_cleared: Vec<f64>,
    #[serde(default)]
    pub uncontrolled_demand: Vec<f64>,
}

/// A downstream agent answering the hub's prices from its own bid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    /// One raw curve per day-ahead slot, market sign convention
    pub bids: Vec<RawBid>,
    /// 1-based steps on which the peer stays silent
    #[serde(default)]
    pub silent_steps: BTreeSet<usize>,
}

/// Expected outcomes for scenario validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectedOutcomes {
    pub converged: Option<bool>,
    pub max_iterations: Option<usize>,
    /// Inclusive band every cleared price must fall in
    pub price_range: Option<(f64, f64)>,
}

/// One market window: a hub, its peers and the solver tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start: SimTime,
    /// Seconds until the clearing deadline
    pub window: SimTime,
    /// Entries in the day-ahead output arrays; defaults to the horizon
    #[serde(default)]
    pub window_length: Option<usize>,
    pub hub: HubConfig,
    pub peers: Vec<PeerConfig>,
    /// Overrides the per-market solver defaults
    #[serde(default)]
    pub solver: Option<SolverConfig>,
    #[serde(default)]
    pub expected: Option<ExpectedOutcomes>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Day-ahead slot count
    pub fn horizon(&self) -> usize {
        match &self.hub.bid {
            HubBid::Curves { bids } => bids.len(),
            HubBid::Generator { horizon, .. } => *horizon,
        }
    }

    pub fn deadline(&self) -> SimTime {
        self.start + self.window
    }

    /// Slots cleared in a window of `kind`
    pub fn slots(&self, kind: MarketKind) -> usize {
        match kind {
            MarketKind::DayAhead => self.horizon(),
            MarketKind::RealTime => 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon() == 0 {
            return Err(invalid(&self.name, "hub bid has no slots"));
        }
        if !(self.window > 0.0) {
            return Err(invalid(&self.name, "window must be positive"));
        }
        let mut names = BTreeSet::from([self.hub.name.as_str()]);
        for peer in &self.peers {
            if !names.insert(peer.name.as_str()) {
                return Err(invalid(&self.name, &format!("agent {} listed twice", peer.name)));
            }
            if peer.bids.len() < self.horizon() {
                return Err(invalid(
                    &self.name,
                    &format!("peer {} has {} bids for {} slots", peer.name, peer.bids.len(), self.horizon()),
                ));
            }
        }
        if let Some(solver) = &self.solver {
            solver.validate()?;
        }
        Ok(())
    }

    pub fn solver_config(&self, kind: MarketKind) -> SolverConfig {
        match (&self.solver, kind) {
            (Some(config), _) => config.clone(),
            (None, MarketKind::DayAhead) => SolverConfig::day_ahead(),
            (None, MarketKind::RealTime) => SolverConfig::real_time(),
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            name: self.hub.name.clone(),
            peers: self.peers.iter().map(|p| p.name.clone()).collect(),
            applies_hub_bounding: self.hub.applies_hub_bounding,
        }
    }

    /// Market state as the hub's market layer would hand it over
    pub fn market_state(&self) -> MarketState {
        let horizon = self.horizon();
        let mut state = MarketState::new(horizon, self.window_length.unwrap_or(horizon));
        if let HubBid::Curves { bids } = &self.hub.bid {
            state.curve_da = bids.clone();
            state.curve_rt = bids.first().cloned().unwrap_or_default();
        }
        state.cleared_q_da = self.hub.previous_cleared.clone();
        state.cleared_q_rt = self.hub.previous_cleared.first().copied().unwrap_or(0.0);
        state.uncontrolled_demand_da = self.hub.uncontrolled_demand.clone();
        state.uncontrolled_demand_rt = self.hub.uncontrolled_demand.first().copied().unwrap_or(0.0);
        state
    }

    /// The hub's curve source for a window of `kind`
    pub fn provider(&self, state: &MarketState, kind: MarketKind) -> Box<dyn BidProvider> {
        match &self.hub.bid {
            HubBid::Curves { .. } => Box::new(InterpolatedCurveProvider::from_market(state, kind)),
            HubBid::Generator { cost, .. } => Box::new(QuadraticCostCurveProvider::new(*cost, self.slots(kind))),
        }
    }

    /// Hub supplying up to 400 kW at 0 to 1 $/kWh against one microgrid
    /// whose demand falls from 200 kW (slot 0) and 100 kW (slot 1) as the
    /// price rises
    pub fn single_microgrid() -> Self {
        Scenario {
            name: "single_microgrid".to_string(),
            description: "One hub, one price-responsive microgrid".to_string(),
            start: 0.0,
            window: 300.0,
            window_length: Some(4),
            hub: HubConfig {
                name: "Sub_1".to_string(),
                applies_hub_bounding: true,
                bid: HubBid::Curves {
                    bids: vec![supply_bid(400.0), supply_bid(400.0)],
                },
                previous_cleared: Vec::new(),
                uncontrolled_demand: Vec::new(),
            },
            peers: vec![PeerConfig {
                name: "MG_1".to_string(),
                bids: vec![demand_bid(200.0, 100.0), demand_bid(100.0, 100.0)],
                silent_steps: BTreeSet::new(),
            }],
            solver: None,
            expected: Some(ExpectedOutcomes {
                converged: Some(true),
                max_iterations: Some(400),
                price_range: Some((0.19, 0.41)),
            }),
        }
    }

    /// Two microgrids sharing one hub
    pub fn two_microgrids() -> Self {
        Scenario {
            name: "two_microgrids".to_string(),
            description: "One hub, two price-responsive microgrids".to_string(),
            hub: HubConfig {
                bid: HubBid::Curves {
                    bids: vec![supply_bid(400.0)],
                },
                ..Self::single_microgrid().hub
            },
            peers: vec![
                PeerConfig {
                    name: "MG_1".to_string(),
                    bids: vec![demand_bid(100.0, 50.0)],
                    silent_steps: BTreeSet::new(),
                },
                PeerConfig {
                    name: "MG_2".to_string(),
                    bids: vec![demand_bid(120.0, 50.0)],
                    silent_steps: BTreeSet::new(),
                },
            ],
            window_length: None,
            expected: Some(ExpectedOutcomes {
                converged: Some(true),
                max_iterations: Some(400),
                price_range: Some((0.43, 0.45)),
            }),
            ..Self::single_microgrid()
        }
    }

    /// Generator hub with marginal cost `q / 400` against one microgrid
    pub fn generator_hub() -> Self {
        Scenario {
            name: "generator_hub".to_string(),
            description: "Quadratic-cost generator serving one microgrid".to_string(),
            hub: HubConfig {
                name: "DG_1".to_string(),
                applies_hub_bounding: true,
                bid: HubBid::Generator {
                    cost: GeneratorCost {
                        a: 0.00125,
                        b: 0.0,
                        c: 10.0,
                        size: 400.0,
                    },
                    horizon: 2,
                },
                previous_cleared: Vec::new(),
                uncontrolled_demand: Vec::new(),
            },
            ..Self::single_microgrid()
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "single_microgrid" => Some(Self::single_microgrid()),
            "two_microgrids" => Some(Self::two_microgrids()),
            "generator_hub" => Some(Self::generator_hub()),
            _ => None,
        }
    }

    pub fn builtin_names() -> &'static [&'static str] {
        &["single_microgrid", "two_microgrids", "generator_hub"]
    }
}

/// Supply of up to `capacity` kW between 0 and 1 $/kWh, market sign convention
fn supply_bid(capacity: f64) -> RawBid {
    RawBid::new(vec![0.0, 1.0], vec![0.0, -capacity])
}

/// Demand of `base - slope·p` kW between 0 and 1 $/kWh
fn demand_bid(base: f64, slope: f64) -> RawBid {
    RawBid::new(vec![0.0, 1.0], vec![base, base - slope])
}

fn invalid(scenario: &str, reason: &str) -> GridClearError {
    GridClearError::InvalidConfig(format!("scenario {scenario}: {reason}"))
}
