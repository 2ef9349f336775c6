use serde::{Deserialize, Serialize};

use crate::{ClearingType, MarketKind};

/// A bid curve as the market layer builds it: prices ascending, quantities
/// descending, quantities in the market sign convention (net injection negative).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBid {
    pub prices: Vec<f64>,
    pub quantities: Vec<f64>,
}

impl RawBid {
    pub fn new(prices: Vec<f64>, quantities: Vec<f64>) -> Self {
        RawBid { prices, quantities }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Market-layer state shared with the consensus engine.
///
/// Inputs are the per-slot bid curves, the previously cleared quantities and
/// the uncontrolled demand; outputs are the `trial_*` and `pwclear_*` fields,
/// which the engine overwrites once per window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketState {
    /// Number of entries in the day-ahead output arrays
    pub window_length: usize,

    pub curve_da: Vec<RawBid>,
    pub curve_rt: RawBid,

    /// Previously cleared quantities (market sign convention)
    pub cleared_q_da: Vec<f64>,
    pub cleared_q_rt: f64,

    /// Exogenous demand per slot; zero unless a caller wires one in
    pub uncontrolled_demand_da: Vec<f64>,
    pub uncontrolled_demand_rt: f64,

    pub trial_cleared_quantity_da: Vec<f64>,
    pub pwclear_da: Vec<f64>,
    pub trial_clear_type_da: Vec<ClearingType>,

    pub trial_cleared_quantity_rt: f64,
    pub pwclear_rt: f64,
    pub trial_clear_type_rt: ClearingType,
}

impl MarketState {
    /// Create an empty state for a day-ahead horizon of `horizon` slots whose
    /// output window holds `window_length` entries.
    pub fn new(horizon: usize, window_length: usize) -> Self {
        MarketState {
            window_length,
            curve_da: vec![RawBid::default(); horizon],
            curve_rt: RawBid::default(),
            cleared_q_da: vec![0.0; horizon],
            cleared_q_rt: 0.0,
            uncontrolled_demand_da: vec![0.0; horizon],
            uncontrolled_demand_rt: 0.0,
            trial_cleared_quantity_da: Vec::new(),
            pwclear_da: Vec::new(),
            trial_clear_type_da: Vec::new(),
            trial_cleared_quantity_rt: 0.0,
            pwclear_rt: 0.0,
            trial_clear_type_rt: ClearingType::default(),
        }
    }

    /// Number of day-ahead slots
    pub fn horizon(&self) -> usize {
        self.curve_da.len()
    }

    /// Raw bid curves for `kind`, one per slot
    pub fn raw_bids(&self, kind: MarketKind) -> Vec<RawBid> {
        match kind {
            MarketKind::DayAhead => self.curve_da.clone(),
            MarketKind::RealTime => vec![self.curve_rt.clone()],
        }
    }

    /// Previously cleared quantity per slot, in the market sign convention.
    /// Missing day-ahead entries read as zero.
    pub fn previous_cleared(&self, kind: MarketKind, horizon: usize) -> Vec<f64> {
        match kind {
            MarketKind::DayAhead => pad(&self.cleared_q_da, horizon),
            MarketKind::RealTime => vec![self.cleared_q_rt; horizon],
        }
    }

    pub fn uncontrolled_demand(&self, kind: MarketKind, horizon: usize) -> Vec<f64> {
        match kind {
            MarketKind::DayAhead => pad(&self.uncontrolled_demand_da, horizon),
            MarketKind::RealTime => vec![self.uncontrolled_demand_rt; horizon],
        }
    }

    /// Write a clearing result back. `quantities` must already be in the
    /// market sign convention. Day-ahead results are repeated to fill
    /// `window_length` entries.
    pub fn write_clearing(
        &mut self,
        kind: MarketKind,
        quantities: &[f64],
        prices: &[f64],
        clear_type: ClearingType,
    ) {
        match kind {
            MarketKind::DayAhead => {
                let len = self.window_length.max(quantities.len());
                self.trial_cleared_quantity_da = tile(quantities, len);
                self.pwclear_da = tile(prices, len);
                self.trial_clear_type_da = vec![clear_type; len];
            }
            MarketKind::RealTime => {
                self.trial_cleared_quantity_rt = quantities.first().copied().unwrap_or(0.0);
                self.pwclear_rt = prices.first().copied().unwrap_or(0.0);
                self.trial_clear_type_rt = clear_type;
            }
        }
    }
}

fn pad(values: &[f64], len: usize) -> Vec<f64> {
    (0..len).map(|i| values.get(i).copied().unwrap_or(0.0)).collect()
}

fn tile(values: &[f64], len: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    values.iter().copied().cycle().take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_ahead_results_fill_window() {
        let mut state = MarketState::new(2, 4);
        state.write_clearing(
            MarketKind::DayAhead,
            &[-1.0, -2.0],
            &[10.0, 20.0],
            ClearingType::Uncongested,
        );

        assert_eq!(state.trial_cleared_quantity_da, vec![-1.0, -2.0, -1.0, -2.0]);
        assert_eq!(state.pwclear_da, vec![10.0, 20.0, 10.0, 20.0]);
        assert_eq!(state.trial_clear_type_da.len(), 4);
    }

    #[test]
    fn test_real_time_scalar_write() {
        let mut state = MarketState::new(0, 0);
        state.write_clearing(MarketKind::RealTime, &[-3.5], &[0.04], ClearingType::Uncongested);

        assert_eq!(state.trial_cleared_quantity_rt, -3.5);
        assert_eq!(state.pwclear_rt, 0.04);
        assert_eq!(state.trial_clear_type_rt, ClearingType::Uncongested);
    }

    #[test]
    fn test_previous_cleared_pads_short_input() {
        let mut state = MarketState::new(3, 3);
        state.cleared_q_da = vec![5.0];

        assert_eq!(state.previous_cleared(MarketKind::DayAhead, 3), vec![5.0, 0.0, 0.0]);
    }
}
