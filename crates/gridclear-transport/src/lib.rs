mod federate;
mod codec;
mod channel;
mod broker;
mod mock;

pub use federate::{advance_to, Endpoint, Federate, Message};
pub use codec::{decode, decode_any, encode};
pub use channel::{PeerChannel, PeerUpdate, PeerValue};
pub use broker::{LocalBroker, LocalFederate};
pub use mock::{PeerReply, ScriptContext, ScriptedFederate};
