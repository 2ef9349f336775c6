mod curve;
mod provider;

pub use curve::BidCurve;
pub use provider::{BidProvider, GeneratorCost, InterpolatedCurveProvider, QuadraticCostCurveProvider};
