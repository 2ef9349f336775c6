use gridclear_types::{MarketKind, QuantityKind, Result, SimTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named message endpoint, `"{owner}/{peer}/{cleared_price|cleared_quantity}_{DA|RT}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(owner: &str, peer: &str, quantity: QuantityKind, market: MarketKind) -> Self {
        Endpoint(format!("{owner}/{peer}/{}_{}", quantity.tag(), market.tag()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message delivered to an endpoint, stamped with the sender's granted time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub source: Endpoint,
    pub destination: Endpoint,
    pub payload: String,
    pub time: SimTime,
}

/// Host co-simulation boundary: a time barrier plus endpoint messaging.
///
/// A message sent at simulated time `t` becomes visible to its receiver once
/// the receiver has been granted a time `>= t`.
pub trait Federate {
    fn name(&self) -> &str;

    /// Block until the host grants a time. The grant may be smaller than
    /// `target`; use [`advance_to`] to insist on reaching it.
    fn request_time(&mut self, target: SimTime) -> Result<SimTime>;

    fn send(&mut self, source: &Endpoint, destination: &Endpoint, payload: String) -> Result<()>;

    fn has_message(&mut self, endpoint: &Endpoint) -> Result<bool>;

    /// Take the oldest visible message on `endpoint`
    fn receive(&mut self, endpoint: &Endpoint) -> Result<Option<Message>>;

    fn pending_messages(&mut self, endpoint: &Endpoint) -> Result<usize>;
}

/// Request `target` repeatedly until the host has granted at least that time
pub fn advance_to<F: Federate + ?Sized>(federate: &mut F, target: SimTime) -> Result<SimTime> {
    let mut granted = federate.request_time(target)?;
    while granted < target {
        granted = federate.request_time(target)?;
    }
    Ok(granted)
}
