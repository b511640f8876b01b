//! Client half of the netcode core: connects to a server, mirrors its clock via the sync/bracket/
//! adjustment protocol, and feeds a sliding window of sampled input into outgoing packets.

pub mod network;
pub mod session;
