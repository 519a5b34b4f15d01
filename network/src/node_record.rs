//! Dial candidates, as produced by discovery and consumed by `ServerPool`.

use ethereum_types::H512;
use ids::NodeId;

/// A signed node record: enough to dial a peer. Signature verification
/// and the DNS-tree/discv4 machinery that produces these are out of
/// scope (spec.md §1) — `ServerPool` treats this as an opaque, already
/// validated dial target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRecord {
	pub id: NodeId,
	pub endpoint: String,
	/// Monotonic sequence number; higher supersedes lower for the same id.
	pub seq: u64,
}

impl NodeRecord {
	pub fn new(id: NodeId, endpoint: impl Into<String>, seq: u64) -> Self {
		NodeRecord { id, endpoint: endpoint.into(), seq }
	}
}

/// Placeholder for raw key material backing a `NodeId`, used only in
/// tests to fabricate distinct identities.
pub fn node_id_from_seed(seed: u64) -> H512 {
	let mut bytes = [0u8; 64];
	bytes[0..8].copy_from_slice(&seed.to_be_bytes());
	H512::from(bytes)
}
