use gridclear_types::{GridClearError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Monotone price/quantity curve in the engine's sign convention (supply positive).
///
/// Quantities are non-decreasing. Two lookup tables are kept: one keyed by
/// distinct quantity for `price_at` and one keyed by distinct price for
/// `quantity_at`. Both lookups clamp the query to the curve's domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidCurve {
    prices: Vec<f64>,
    quantities: Vec<f64>,
    by_quantity: Table,
    by_price: Table,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Table {
    keys: Vec<f64>,
    values: Vec<f64>,
}

impl Table {
    /// Sorted unique keys, each paired with the value at its first occurrence
    fn unique(keys: &[f64], values: &[f64]) -> Self {
        let (keys, values) = unique_by_key(keys, values);
        Table { keys, values }
    }

    fn lookup(&self, x: f64) -> f64 {
        interpolate(&self.keys, &self.values, x)
    }

    fn min_key(&self) -> f64 {
        self.keys[0]
    }

    fn max_key(&self) -> f64 {
        self.keys[self.keys.len() - 1]
    }
}

impl BidCurve {
    /// Normalize a raw bid.
    ///
    /// The raw arrays are stored quantity-descending, so both are reversed
    /// first. Points are then deduplicated by quantity (first occurrence wins)
    /// and, when fewer than `bid_size` distinct points remain, resampled onto
    /// `bid_size` evenly spaced quantities.
    ///
    /// Returns `DegenerateCurve` when fewer than two distinct quantities exist;
    /// callers fall back to [`BidCurve::from_raw_reversed`].
    pub fn normalize(raw_prices: &[f64], raw_quantities: &[f64], bid_size: usize) -> Result<Self> {
        check_lengths(raw_prices, raw_quantities)?;

        let prices: Vec<f64> = raw_prices.iter().rev().copied().collect();
        let quantities: Vec<f64> = raw_quantities.iter().rev().copied().collect();
        let (quantities, prices) = unique_by_key(&quantities, &prices);

        let points = quantities.len();
        if points < 2 {
            return Err(GridClearError::DegenerateCurve { points });
        }

        if points < bid_size {
            let q_lo = quantities[0];
            let q_hi = quantities[points - 1];
            let step = (q_hi - q_lo) / (bid_size - 1) as f64;
            let resampled_q: Vec<f64> = (0..bid_size)
                .map(|i| if i + 1 == bid_size { q_hi } else { q_lo + step * i as f64 })
                .collect();
            let resampled_p = resampled_q
                .iter()
                .map(|q| interpolate(&quantities, &prices, *q))
                .collect();
            Ok(Self::build(resampled_p, resampled_q))
        } else {
            Ok(Self::build(prices, quantities))
        }
    }

    /// Reversed raw arrays without deduplication or resampling
    pub fn from_raw_reversed(raw_prices: &[f64], raw_quantities: &[f64]) -> Result<Self> {
        check_lengths(raw_prices, raw_quantities)?;

        let mut points: Vec<(f64, f64)> = raw_quantities
            .iter()
            .rev()
            .copied()
            .zip(raw_prices.iter().rev().copied())
            .collect();
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (quantities, prices) = points.into_iter().unzip();
        Ok(Self::build(prices, quantities))
    }

    /// Curve from points already in engine order (quantity non-decreasing)
    pub fn from_points(prices: Vec<f64>, quantities: Vec<f64>) -> Result<Self> {
        check_lengths(&prices, &quantities)?;
        if quantities.windows(2).any(|w| w[1] < w[0]) {
            return Err(GridClearError::InvalidCurve(
                "quantities must be non-decreasing".to_string(),
            ));
        }
        Ok(Self::build(prices, quantities))
    }

    fn build(prices: Vec<f64>, quantities: Vec<f64>) -> Self {
        let by_quantity = Table::unique(&quantities, &prices);
        let by_price = Table::unique(&prices, &quantities);
        BidCurve {
            prices,
            quantities,
            by_quantity,
            by_price,
        }
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn quantities(&self) -> &[f64] {
        &self.quantities
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn q_min(&self) -> f64 {
        self.by_quantity.min_key()
    }

    pub fn q_max(&self) -> f64 {
        self.by_quantity.max_key()
    }

    pub fn price_min(&self) -> f64 {
        self.by_price.min_key()
    }

    pub fn price_max(&self) -> f64 {
        self.by_price.max_key()
    }

    pub fn clamp_quantity(&self, quantity: f64) -> f64 {
        quantity.max(self.q_min()).min(self.q_max())
    }

    pub fn clamp_price(&self, price: f64) -> f64 {
        price.max(self.price_min()).min(self.price_max())
    }

    /// Price on the curve at `quantity`, clamped to the quantity domain
    pub fn price_at(&self, quantity: f64) -> f64 {
        self.by_quantity.lookup(quantity)
    }

    /// Quantity on the curve at `price`, clamped to the price domain
    pub fn quantity_at(&self, price: f64) -> f64 {
        self.by_price.lookup(price)
    }
}

fn check_lengths(prices: &[f64], quantities: &[f64]) -> Result<()> {
    if prices.len() != quantities.len() {
        return Err(GridClearError::InvalidCurve(format!(
            "{} prices for {} quantities",
            prices.len(),
            quantities.len()
        )));
    }
    if prices.is_empty() {
        return Err(GridClearError::InvalidCurve("empty bid".to_string()));
    }
    if prices.iter().chain(quantities).any(|v| !v.is_finite()) {
        return Err(GridClearError::InvalidCurve("non-finite bid value".to_string()));
    }
    Ok(())
}

/// Sort by key (stable, so the first occurrence of a key stays first) and
/// keep one entry per distinct key.
fn unique_by_key(keys: &[f64], values: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| keys[a].partial_cmp(&keys[b]).unwrap_or(Ordering::Equal));
    order.dedup_by(|b, a| keys[*a] == keys[*b]);

    let unique_keys = order.iter().map(|&i| keys[i]).collect();
    let unique_values = order.iter().map(|&i| values[i]).collect();
    (unique_keys, unique_values)
}

/// Piecewise-linear interpolation over strictly increasing `xs`; queries
/// outside the domain return the nearest endpoint value.
fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let last = xs.len() - 1;
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[last] {
        return ys[last];
    }

    let hi = xs.partition_point(|v| *v < x);
    if xs[hi] == x {
        return ys[hi];
    }
    let lo = hi - 1;
    let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
    ys[lo] + t * (ys[hi] - ys[lo])
}
