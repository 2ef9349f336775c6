use serde::{Deserialize, Serialize};
use std::fmt;

/// Which market window is being cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketKind {
    /// Day-ahead: one clearing per hourly slot of the horizon
    DayAhead,
    /// Real-time: a single short window
    RealTime,
}

impl MarketKind {
    /// Suffix used in endpoint names and diagnostic file names
    pub fn tag(&self) -> &'static str {
        match self {
            MarketKind::DayAhead => "DA",
            MarketKind::RealTime => "RT",
        }
    }

    pub fn is_day_ahead(&self) -> bool {
        matches!(self, MarketKind::DayAhead)
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Which value a peer channel carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantityKind {
    Price,
    Quantity,
}

impl QuantityKind {
    pub fn tag(&self) -> &'static str {
        match self {
            QuantityKind::Price => "cleared_price",
            QuantityKind::Quantity => "cleared_quantity",
        }
    }
}

/// Market clearing classification written back to the market state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClearingType {
    #[default]
    Uncongested,
}

impl fmt::Display for ClearingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClearingType::Uncongested => "UNCONGESTED",
        };
        f.write_str(name)
    }
}
