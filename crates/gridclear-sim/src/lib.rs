mod scenario;
mod peer;
mod runner;

pub use scenario::{ExpectedOutcomes, HubBid, HubConfig, PeerConfig, Scenario};
pub use peer::{PeerStats, ResponsivePeer};
pub use runner::{SimResult, SimRunner};
