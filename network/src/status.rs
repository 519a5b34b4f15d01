//! The handshake `Status` message.

use ethereum_types::{H256, U256};

use announcement::Announcement;
use messages::CostTable;

/// A checkpoint, as advertised by a peer at handshake and compared
/// against the locally trusted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
	pub section_index: u64,
	pub section_head: H256,
	pub cht_root: H256,
	pub bloom_root: H256,
}

/// Handshake payload, sent by both sides on connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
	pub protocol_version: u32,
	pub network_id: u64,
	pub genesis_hash: H256,
	pub head_hash: H256,
	pub head_number: u64,
	pub head_td: U256,
	pub checkpoint: Option<Checkpoint>,
	pub buffer_limit: u64,
	pub min_recharge: u64,
	pub cost_table: CostTable,
}

impl Status {
	/// Apply a head update carried in an announcement. Capability
	/// changes are handled by `Capabilities::update_from`; monotonicity
	/// of total difficulty is the caller's responsibility (spec.md §5 —
	/// rejecting it is a protocol concern, not a data-model one).
	pub fn update_from(&mut self, announcement: &Announcement) {
		self.head_hash = announcement.head_hash;
		self.head_number = announcement.head_number;
		self.head_td = announcement.head_td;
	}

	/// Whether `self` (the locally negotiated status) is compatible with
	/// a peer's handshake: same protocol version, network id and genesis.
	pub fn compatible_with(&self, peer: &Status) -> bool {
		self.protocol_version == peer.protocol_version &&
			self.network_id == peer.network_id &&
			self.genesis_hash == peer.genesis_hash
	}
}
