use gridclear_types::{GridClearError, MarketKind, MarketState, RawBid, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::curve::BidCurve;

/// Source of the local agent's bid curve for each horizon slot
pub trait BidProvider {
    /// Number of slots this provider can supply
    fn horizon(&self) -> usize;

    /// Curve for `slot`, in the engine sign convention (supply positive)
    fn curve(&self, slot: usize, bid_size: usize) -> Result<BidCurve>;

    /// All curves for the horizon
    fn curves(&self, bid_size: usize) -> Result<Vec<BidCurve>> {
        (0..self.horizon()).map(|slot| self.curve(slot, bid_size)).collect()
    }
}

/// Wraps raw price/quantity arrays built by the market layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolatedCurveProvider {
    bids: Vec<RawBid>,
}

impl InterpolatedCurveProvider {
    pub fn new(bids: Vec<RawBid>) -> Self {
        InterpolatedCurveProvider { bids }
    }

    /// Take the curves for `kind` from the market state
    pub fn from_market(state: &MarketState, kind: MarketKind) -> Self {
        Self::new(state.raw_bids(kind))
    }
}

impl BidProvider for InterpolatedCurveProvider {
    fn horizon(&self) -> usize {
        self.bids.len()
    }

    fn curve(&self, slot: usize, bid_size: usize) -> Result<BidCurve> {
        let bid = self.bids.get(slot).ok_or_else(|| {
            GridClearError::InvalidCurve(format!("no bid for slot {slot} of {}", self.bids.len()))
        })?;

        // market convention counts injection as negative
        let quantities: Vec<f64> = bid.quantities.iter().map(|q| -q).collect();

        match BidCurve::normalize(&bid.prices, &quantities, bid_size) {
            Err(GridClearError::DegenerateCurve { points }) => {
                debug!(slot, points, "degenerate bid curve, using raw points");
                BidCurve::from_raw_reversed(&bid.prices, &quantities)
            }
            other => other,
        }
    }
}

/// Quadratic generator cost `a·q² + b·q + c` over `[0, size]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneratorCost {
    pub a: f64,
    pub b: f64,
    /// Fixed cost; does not enter the marginal curve
    pub c: f64,
    /// Capacity in kW
    pub size: f64,
}

impl GeneratorCost {
    /// Marginal cost `2·a·q + b`
    pub fn marginal_price(&self, quantity: f64) -> f64 {
        2.0 * self.a * quantity + self.b
    }

    pub fn total_cost(&self, quantity: f64) -> f64 {
        self.a * quantity * quantity + self.b * quantity + self.c
    }
}

/// Marginal-cost curve of a dispatchable generator, identical for every slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuadraticCostCurveProvider {
    cost: GeneratorCost,
    horizon: usize,
}

impl QuadraticCostCurveProvider {
    pub fn new(cost: GeneratorCost, horizon: usize) -> Self {
        QuadraticCostCurveProvider { cost, horizon }
    }

    pub fn cost(&self) -> &GeneratorCost {
        &self.cost
    }
}

impl BidProvider for QuadraticCostCurveProvider {
    fn horizon(&self) -> usize {
        self.horizon
    }

    fn curve(&self, slot: usize, bid_size: usize) -> Result<BidCurve> {
        if slot >= self.horizon {
            return Err(GridClearError::InvalidCurve(format!(
                "no bid for slot {slot} of {}",
                self.horizon
            )));
        }
        if bid_size < 2 || !(self.cost.size > 0.0) {
            return Err(GridClearError::InvalidCurve(format!(
                "generator curve needs size > 0 and at least 2 points (size={}, points={bid_size})",
                self.cost.size
            )));
        }

        let step = self.cost.size / (bid_size - 1) as f64;
        let quantities: Vec<f64> = (0..bid_size)
            .map(|i| if i + 1 == bid_size { self.cost.size } else { step * i as f64 })
            .collect();
        let prices = quantities.iter().map(|q| self.cost.marginal_price(*q)).collect();

        BidCurve::from_points(prices, quantities)
    }
}
