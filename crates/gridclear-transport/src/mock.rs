use gridclear_types::{advance_by, MarketKind, QuantityKind, Result, SimTime};
use std::collections::{HashMap, VecDeque};

use crate::codec::{decode_any, encode};
use crate::federate::{Endpoint, Federate, Message};

/// What a scripted peer sends back after a grant
#[derive(Debug, Clone, PartialEq)]
pub struct PeerReply {
    pub prices: Vec<f64>,
    pub quantities: Vec<f64>,
}

/// View a peer script gets on every time grant
#[derive(Debug, Clone, Copy)]
pub struct ScriptContext<'a> {
    /// 1-based count of grants so far
    pub grant: usize,
    pub time: SimTime,
    /// Latest price vector the local agent sent to this peer
    pub latest_price: Option<&'a [f64]>,
    /// Latest quantity vector the local agent sent to this peer
    pub latest_quantity: Option<&'a [f64]>,
}

type PeerScript = Box<dyn FnMut(&ScriptContext<'_>) -> Option<PeerReply> + Send>;

struct ScriptedPeer {
    name: String,
    script: PeerScript,
    latest_price: Option<Vec<f64>>,
    latest_quantity: Option<Vec<f64>>,
}

/// Single-process stand-in for a co-simulation host.
///
/// Peers are closures invoked after every time grant; their replies are
/// queued on the local agent's inbound endpoints, stamped with the grant time.
/// Useful for deterministic tests and demos.
pub struct ScriptedFederate {
    name: String,
    kind: MarketKind,
    granted: SimTime,
    max_grant_step: Option<SimTime>,
    grants: usize,
    peers: Vec<ScriptedPeer>,
    inbox: HashMap<Endpoint, VecDeque<Message>>,
    sent: Vec<Message>,
}

impl ScriptedFederate {
    pub fn new(name: &str, kind: MarketKind, start: SimTime) -> Self {
        ScriptedFederate {
            name: name.to_string(),
            kind,
            granted: start,
            max_grant_step: None,
            grants: 0,
            peers: Vec::new(),
            inbox: HashMap::new(),
            sent: Vec::new(),
        }
    }

    /// Grant at most `step` seconds per request, like a host that hands out
    /// smaller increments than asked for
    pub fn with_max_grant_step(mut self, step: SimTime) -> Self {
        self.max_grant_step = Some(step);
        self
    }

    pub fn with_peer<S>(mut self, name: &str, script: S) -> Self
    where
        S: FnMut(&ScriptContext<'_>) -> Option<PeerReply> + Send + 'static,
    {
        self.peers.push(ScriptedPeer {
            name: name.to_string(),
            script: Box::new(script),
            latest_price: None,
            latest_quantity: None,
        });
        self
    }

    pub fn granted(&self) -> SimTime {
        self.granted
    }

    pub fn grants(&self) -> usize {
        self.grants
    }

    pub fn sent(&self) -> &[Message] {
        &self.sent
    }

    /// Queue a raw payload on one of the local inbound endpoints
    pub fn inject(&mut self, peer: &str, quantity: QuantityKind, payload: &str) {
        let destination = Endpoint::new(&self.name, peer, quantity, self.kind);
        let source = Endpoint::new(peer, &self.name, quantity, self.kind);
        self.inbox.entry(destination.clone()).or_default().push_back(Message {
            source,
            destination,
            payload: payload.to_string(),
            time: self.granted,
        });
    }

    /// Messages still queued on an inbound endpoint
    pub fn queued(&self, peer: &str, quantity: QuantityKind) -> usize {
        let endpoint = Endpoint::new(&self.name, peer, quantity, self.kind);
        self.inbox.get(&endpoint).map(VecDeque::len).unwrap_or(0)
    }

    fn run_scripts(&mut self) -> Result<()> {
        let mut replies = Vec::new();
        for peer in &mut self.peers {
            let ctx = ScriptContext {
                grant: self.grants,
                time: self.granted,
                latest_price: peer.latest_price.as_deref(),
                latest_quantity: peer.latest_quantity.as_deref(),
            };
            if let Some(reply) = (peer.script)(&ctx) {
                replies.push((peer.name.clone(), reply));
            }
        }

        for (peer, reply) in replies {
            let prices = encode(&reply.prices, self.kind)?;
            let quantities = encode(&reply.quantities, self.kind)?;
            self.inject(&peer, QuantityKind::Price, &prices);
            self.inject(&peer, QuantityKind::Quantity, &quantities);
        }
        Ok(())
    }
}

impl Federate for ScriptedFederate {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_time(&mut self, target: SimTime) -> Result<SimTime> {
        if target <= self.granted {
            return Ok(self.granted);
        }
        self.granted = match self.max_grant_step {
            Some(step) => target.min(advance_by(self.granted, step)),
            None => target,
        };
        self.grants += 1;
        self.run_scripts()?;
        Ok(self.granted)
    }

    fn send(&mut self, source: &Endpoint, destination: &Endpoint, payload: String) -> Result<()> {
        for peer in &mut self.peers {
            let price = Endpoint::new(&peer.name, &self.name, QuantityKind::Price, self.kind);
            let quantity = Endpoint::new(&peer.name, &self.name, QuantityKind::Quantity, self.kind);
            if *destination == price {
                peer.latest_price = Some(decode_any(&payload, self.kind)?);
            } else if *destination == quantity {
                peer.latest_quantity = Some(decode_any(&payload, self.kind)?);
            }
        }
        self.sent.push(Message {
            source: source.clone(),
            destination: destination.clone(),
            payload,
            time: self.granted,
        });
        Ok(())
    }

    fn has_message(&mut self, endpoint: &Endpoint) -> Result<bool> {
        Ok(self.pending_messages(endpoint)? > 0)
    }

    fn receive(&mut self, endpoint: &Endpoint) -> Result<Option<Message>> {
        Ok(self.inbox.get_mut(endpoint).and_then(VecDeque::pop_front))
    }

    fn pending_messages(&mut self, endpoint: &Endpoint) -> Result<usize> {
        Ok(self.inbox.get(endpoint).map(VecDeque::len).unwrap_or(0))
    }
}
