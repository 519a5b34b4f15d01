//! The unsolicited `Announce` message a server sends when its head moves.

use ethereum_types::{H256, U256};

/// A new-head announcement, optionally carrying capability changes (for
/// example after the server prunes history it previously served).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
	pub head_hash: H256,
	pub head_number: u64,
	pub head_td: U256,
	/// Depth of the re-organisation that produced this head, 0 if the new
	/// head simply extends the previous one.
	pub reorg_depth: u64,
	pub update_serve_headers: Option<bool>,
	pub update_serve_chain_since: Option<u64>,
	pub update_serve_state_since: Option<u64>,
}

impl Announcement {
	/// A plain extension announcement with no capability changes.
	pub fn simple(head_hash: H256, head_number: u64, head_td: U256) -> Self {
		Announcement {
			head_hash,
			head_number,
			head_td,
			reorg_depth: 0,
			update_serve_headers: None,
			update_serve_chain_since: None,
			update_serve_state_since: None,
		}
	}
}
