use gridclear_types::{MarketKind, QuantityKind, Result, SimTime};
use tracing::warn;

use crate::codec::{decode, encode};
use crate::federate::{Endpoint, Federate};

/// Values received from a peer together with the message timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct PeerValue {
    pub values: Vec<f64>,
    pub time: SimTime,
}

/// Result of one poll: each side is `None` when nothing usable was pending
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerUpdate {
    pub price: Option<PeerValue>,
    pub quantity: Option<PeerValue>,
}

/// Price and quantity links between the local agent and one peer.
///
/// Outbound messages leave from `"{local}/{peer}/..."` addressed to
/// `"{peer}/{local}/..."`; inbound messages arrive on the local endpoints.
#[derive(Debug, Clone)]
pub struct PeerChannel {
    peer: String,
    kind: MarketKind,
    local_price: Endpoint,
    remote_price: Endpoint,
    local_quantity: Endpoint,
    remote_quantity: Endpoint,
}

impl PeerChannel {
    pub fn new(local: &str, peer: &str, kind: MarketKind) -> Self {
        PeerChannel {
            peer: peer.to_string(),
            kind,
            local_price: Endpoint::new(local, peer, QuantityKind::Price, kind),
            remote_price: Endpoint::new(peer, local, QuantityKind::Price, kind),
            local_quantity: Endpoint::new(local, peer, QuantityKind::Quantity, kind),
            remote_quantity: Endpoint::new(peer, local, QuantityKind::Quantity, kind),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn kind(&self) -> MarketKind {
        self.kind
    }

    /// Send the local price and quantity vectors to the peer
    pub fn publish<F: Federate + ?Sized>(
        &self,
        federate: &mut F,
        prices: &[f64],
        quantities: &[f64],
    ) -> Result<()> {
        federate.send(&self.local_price, &self.remote_price, encode(prices, self.kind)?)?;
        federate.send(
            &self.local_quantity,
            &self.remote_quantity,
            encode(quantities, self.kind)?,
        )
    }

    /// Consume at most one pending message per endpoint. A payload that does
    /// not decode to `horizon` values is dropped and reported as absent.
    pub fn poll<F: Federate + ?Sized>(&self, federate: &mut F, horizon: usize) -> Result<PeerUpdate> {
        Ok(PeerUpdate {
            price: self.poll_one(federate, &self.local_price, horizon)?,
            quantity: self.poll_one(federate, &self.local_quantity, horizon)?,
        })
    }

    fn poll_one<F: Federate + ?Sized>(
        &self,
        federate: &mut F,
        endpoint: &Endpoint,
        horizon: usize,
    ) -> Result<Option<PeerValue>> {
        if !federate.has_message(endpoint)? {
            return Ok(None);
        }
        let Some(message) = federate.receive(endpoint)? else {
            return Ok(None);
        };

        match decode(&message.payload, self.kind, horizon) {
            Ok(values) => Ok(Some(PeerValue {
                values,
                time: message.time,
            })),
            Err(e) => {
                warn!(peer = %self.peer, endpoint = %endpoint, error = %e, "dropping malformed peer message");
                Ok(None)
            }
        }
    }

    /// Discard everything still pending on the inbound endpoints
    pub fn drain<F: Federate + ?Sized>(&self, federate: &mut F) -> Result<usize> {
        let mut dropped = 0;
        for endpoint in [&self.local_price, &self.local_quantity] {
            while federate.pending_messages(endpoint)? > 0 {
                if federate.receive(endpoint)?.is_none() {
                    break;
                }
                dropped += 1;
            }
        }
        Ok(dropped)
    }
}
