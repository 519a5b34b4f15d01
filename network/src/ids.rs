//! Peer and request identifiers.

use std::fmt;
use ethereum_types::H512;

/// A peer's long-term identity, derived from its public key.
///
/// Opaque outside of equality/hashing and display; the key recovery that
/// produces it is out of scope for this workspace.
pub type NodeId = H512;

/// Short-lived index into the local peer table, assigned on connect and
/// reused across a session. Not persisted; `NodeId` is the durable key.
pub type PeerId = usize;

/// A request identifier, unique for the lifetime of one peer connection.
/// Chosen by the client when sending; echoed back by the server on reply
/// so the reply can be matched to the outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReqId(pub u64);

impl fmt::Display for ReqId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl ReqId {
	/// The underlying numeric value.
	pub fn as_u64(&self) -> u64 {
		self.0
	}
}
