use gridclear_types::{GridClearError, Result, SimTime};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tracing::trace;

use crate::federate::{Endpoint, Federate, Message};

/// In-process co-simulation broker.
///
/// Implements a conservative time barrier for federates running on separate
/// threads: a request for time `t` is granted once every other active
/// federate has requested at least `t` or has finalized.
#[derive(Debug, Clone, Default)]
pub struct LocalBroker {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    changed: Condvar,
}

#[derive(Debug, Default)]
struct BrokerState {
    members: HashMap<String, Member>,
    queues: HashMap<Endpoint, VecDeque<Message>>,
}

#[derive(Debug, Clone, Copy)]
struct Member {
    requested: SimTime,
    granted: SimTime,
    finalized: bool,
}

impl BrokerState {
    fn member(&self, name: &str) -> Result<Member> {
        self.members
            .get(name)
            .copied()
            .ok_or_else(|| GridClearError::Transport(format!("unknown federate {name}")))
    }

    fn member_mut(&mut self, name: &str) -> Result<&mut Member> {
        self.members
            .get_mut(name)
            .ok_or_else(|| GridClearError::Transport(format!("unknown federate {name}")))
    }

    fn others_reached(&self, name: &str, target: SimTime) -> bool {
        self.members
            .iter()
            .filter(|(other, _)| other.as_str() != name)
            .all(|(_, m)| m.finalized || m.requested >= target)
    }

    fn visible(&self, endpoint: &Endpoint, granted: SimTime) -> usize {
        self.queues
            .get(endpoint)
            .map(|q| q.iter().take_while(|m| m.time <= granted).count())
            .unwrap_or(0)
    }
}

impl Shared {
    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>> {
        self.state
            .lock()
            .map_err(|_| GridClearError::Transport("broker state poisoned".to_string()))
    }
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a federate at simulated time `start`. All participants should be
    /// registered before any of them starts requesting time.
    pub fn register(&self, name: &str, start: SimTime) -> Result<LocalFederate> {
        let mut state = self.shared.lock()?;
        if state.members.contains_key(name) {
            return Err(GridClearError::Transport(format!("federate {name} already registered")));
        }
        state.members.insert(
            name.to_string(),
            Member {
                requested: start,
                granted: start,
                finalized: false,
            },
        );
        Ok(LocalFederate {
            name: name.to_string(),
            shared: Arc::clone(&self.shared),
            finalized: false,
        })
    }

    /// Messages queued on `endpoint` regardless of visibility
    pub fn queued(&self, endpoint: &Endpoint) -> Result<usize> {
        let state = self.shared.lock()?;
        Ok(state.queues.get(endpoint).map(VecDeque::len).unwrap_or(0))
    }
}

/// One participant's handle on a [`LocalBroker`]. Finalizes on drop.
#[derive(Debug)]
pub struct LocalFederate {
    name: String,
    shared: Arc<Shared>,
    finalized: bool,
}

impl LocalFederate {
    pub fn granted(&self) -> Result<SimTime> {
        Ok(self.shared.lock()?.member(&self.name)?.granted)
    }

    /// Leave the barrier so other federates are no longer held back by this one
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        let mut state = self.shared.lock()?;
        state.member_mut(&self.name)?.finalized = true;
        self.finalized = true;
        drop(state);
        self.shared.changed.notify_all();
        Ok(())
    }
}

impl Drop for LocalFederate {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

impl Federate for LocalFederate {
    fn name(&self) -> &str {
        &self.name
    }

    fn request_time(&mut self, target: SimTime) -> Result<SimTime> {
        let mut state = self.shared.lock()?;
        let me = state.member(&self.name)?;
        if me.finalized {
            return Err(GridClearError::Transport(format!("federate {} is finalized", self.name)));
        }
        if target <= me.granted {
            return Ok(me.granted);
        }

        state.member_mut(&self.name)?.requested = target;
        self.shared.changed.notify_all();

        while !state.others_reached(&self.name, target) {
            state = self
                .shared
                .changed
                .wait(state)
                .map_err(|_| GridClearError::Transport("broker state poisoned".to_string()))?;
        }

        state.member_mut(&self.name)?.granted = target;
        trace!(federate = %self.name, granted = target, "time granted");
        Ok(target)
    }

    fn send(&mut self, source: &Endpoint, destination: &Endpoint, payload: String) -> Result<()> {
        let mut state = self.shared.lock()?;
        let time = state.member(&self.name)?.granted;
        state
            .queues
            .entry(destination.clone())
            .or_default()
            .push_back(Message {
                source: source.clone(),
                destination: destination.clone(),
                payload,
                time,
            });
        Ok(())
    }

    fn has_message(&mut self, endpoint: &Endpoint) -> Result<bool> {
        Ok(self.pending_messages(endpoint)? > 0)
    }

    fn receive(&mut self, endpoint: &Endpoint) -> Result<Option<Message>> {
        let mut state = self.shared.lock()?;
        let granted = state.member(&self.name)?.granted;
        if state.visible(endpoint, granted) == 0 {
            return Ok(None);
        }
        Ok(state.queues.get_mut(endpoint).and_then(VecDeque::pop_front))
    }

    fn pending_messages(&mut self, endpoint: &Endpoint) -> Result<usize> {
        let state = self.shared.lock()?;
        let granted = state.member(&self.name)?.granted;
        Ok(state.visible(endpoint, granted))
    }
}
