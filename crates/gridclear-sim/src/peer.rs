use gridclear_curves::{BidCurve, BidProvider, InterpolatedCurveProvider};
use gridclear_transport::{advance_to, Federate, PeerChannel};
use gridclear_types::{advance_by, MarketKind, RawBid, Result, SimTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// What a peer did during one window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerStats {
    pub name: String,
    /// Time steps taken
    pub steps: usize,
    /// Replies sent back to the hub
    pub replies: usize,
    pub last_price: Vec<f64>,
    /// Last reported quantity, engine sign convention
    pub last_quantity: Vec<f64>,
}

/// Downstream agent that answers each hub price with the quantity its own
/// bid curve gives at that price.
///
/// The peer runs half a microstep out of phase with the hub, so every reply
/// is visible to the hub's next collection and every hub publication reaches
/// the peer one step later.
#[derive(Debug, Clone)]
pub struct ResponsivePeer {
    name: String,
    channel: PeerChannel,
    curves: Vec<BidCurve>,
    silent_steps: BTreeSet<usize>,
}

impl ResponsivePeer {
    pub fn new(name: &str, hub: &str, kind: MarketKind, curves: Vec<BidCurve>) -> Self {
        ResponsivePeer {
            name: name.to_string(),
            channel: PeerChannel::new(name, hub, kind),
            curves,
            silent_steps: BTreeSet::new(),
        }
    }

    /// Build from raw bids in the market sign convention
    pub fn from_bids(name: &str, hub: &str, kind: MarketKind, bids: Vec<RawBid>, bid_size: usize) -> Result<Self> {
        let curves = InterpolatedCurveProvider::new(bids).curves(bid_size)?;
        Ok(Self::new(name, hub, kind, curves))
    }

    /// Stay silent on these 1-based steps
    pub fn with_silent_steps(mut self, steps: impl IntoIterator<Item = usize>) -> Self {
        self.silent_steps = steps.into_iter().collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn horizon(&self) -> usize {
        self.curves.len()
    }

    /// Quantity per slot at the given prices
    pub fn respond(&self, prices: &[f64]) -> Vec<f64> {
        self.curves
            .iter()
            .zip(prices)
            .map(|(curve, p)| curve.quantity_at(*p))
            .collect()
    }

    /// Answer the hub until `deadline`, then discard anything left over
    pub fn run<F: Federate + ?Sized>(
        &self,
        federate: &mut F,
        start: SimTime,
        deadline: SimTime,
        microstep: SimTime,
    ) -> Result<PeerStats> {
        let mut stats = PeerStats {
            name: self.name.clone(),
            ..PeerStats::default()
        };
        let horizon = self.horizon();
        let mut time = advance_by(start, microstep / 2.0);

        while time < deadline {
            advance_to(federate, time)?;
            stats.steps += 1;

            let update = self.channel.poll(federate, horizon)?;
            if let Some(price) = update.price {
                if self.silent_steps.contains(&stats.steps) {
                    trace!(peer = %self.name, step = stats.steps, "staying silent");
                } else {
                    let quantity = self.respond(&price.values);
                    self.channel.publish(federate, &price.values, &quantity)?;
                    stats.replies += 1;
                    stats.last_price = price.values;
                    stats.last_quantity = quantity;
                }
            }

            time = advance_by(time, microstep);
        }

        advance_to(federate, deadline)?;
        let dropped = self.channel.drain(federate)?;
        debug!(peer = %self.name, steps = stats.steps, replies = stats.replies, dropped, "peer window closed");
        Ok(stats)
    }
}
