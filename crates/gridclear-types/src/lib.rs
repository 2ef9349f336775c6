mod error;
mod market;
mod time;
mod state;
mod trace;

pub use error::{GridClearError, Result};
pub use market::{ClearingType, MarketKind, QuantityKind};
pub use time::{advance_by, SimTime};
pub use state::{MarketState, RawBid};
pub use trace::IterationTrace;

#[cfg(test)]
mod tests;
