// Copyright 2015-2018 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

//! One connected server's state (spec.md §3, §4.2).
//!
//! Only the peer's owning inbound loop mutates `flow_control` and
//! `outstanding`; the mutex exists for the brief window where a sibling
//! task (the distributor, choosing where to send) needs a consistent
//! read, not to allow concurrent writers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use lc_network::{
	PeerId, NodeId, ReqId, Status, Capabilities, Announcement, Request, MessageKind,
	BasicContext, NetworkError,
};

use flow_control::FlowControl;
use value_tracker::ValueTracker;

/// Bookkeeping kept per outstanding request on a peer, used to validate
/// the eventual reply's credit field and to feed the adaptive timeout.
#[derive(Debug, Clone, Copy)]
pub struct Outstanding {
	pub kind: MessageKind,
	pub sent_at: Instant,
	pub reserved_after: u64,
}

struct PeerState {
	status: Status,
	capabilities: Capabilities,
	flow_control: FlowControl,
	outstanding: HashMap<ReqId, Outstanding>,
}

/// A connected server, as seen by the retrieval core.
pub struct Peer {
	id: PeerId,
	node_id: NodeId,
	state: Mutex<PeerState>,
	frozen: AtomicBool,
	value_tracker: ValueTracker,
}

impl Peer {
	pub fn new(
		id: PeerId,
		node_id: NodeId,
		status: Status,
		capabilities: Capabilities,
		value_tracker: ValueTracker,
	) -> Self {
		let flow_control = FlowControl::new(status.buffer_limit, status.min_recharge, status.cost_table.clone());
		Peer {
			id,
			node_id,
			state: Mutex::new(PeerState {
				status,
				capabilities,
				flow_control,
				outstanding: HashMap::new(),
			}),
			frozen: AtomicBool::new(false),
			value_tracker,
		}
	}

	pub fn id(&self) -> PeerId {
		self.id
	}

	pub fn node_id(&self) -> NodeId {
		self.node_id
	}

	pub fn value_tracker(&self) -> &ValueTracker {
		&self.value_tracker
	}

	pub fn is_frozen(&self) -> bool {
		self.frozen.load(Ordering::Acquire)
	}

	pub fn mark_frozen(&self) {
		self.frozen.store(true, Ordering::Release);
	}

	pub fn mark_thawed(&self) {
		self.frozen.store(false, Ordering::Release);
	}

	/// Whether this peer's announced head covers everything `request`
	/// needs (spec.md §4.2).
	pub fn capable_of(&self, request: &Request) -> bool {
		let state = self.state.lock();
		let required = required_capabilities(request);
		state.capabilities.can_fulfill(&required)
	}

	pub fn outstanding_count(&self) -> usize {
		self.state.lock().outstanding.len()
	}

	/// Whether this peer's synced head is far enough along to possibly
	/// hold the data `request` names. Only `HeaderByNumber` carries an
	/// explicit block number; every other request is hash-addressed and
	/// a capable peer may hold historical data regardless of its current
	/// head, so this only narrows the header case (spec.md §8, "No
	/// capable peer": three peers at head 50 can never serve header 200).
	pub fn head_covers(&self, request: &Request) -> bool {
		match *request {
			Request::HeaderByNumber { number } => self.state.lock().status.head_number >= number,
			_ => true,
		}
	}

	/// The buffer, projected to `now`, without reserving anything.
	pub fn projected_buffer(&self, now: Instant) -> u64 {
		self.state.lock().flow_control.projected_buffer(now)
	}

	pub fn time_until_affordable(&self, cost: u64, now: Instant) -> Option<::std::time::Duration> {
		self.state.lock().flow_control.time_until_affordable(cost, now)
	}

	pub fn estimate_cost(&self, request: &Request) -> Option<u64> {
		let state = self.state.lock();
		state.flow_control.estimate_cost(request.kind(), request.item_count())
	}

	/// Install a new cost table, effective for requests reserved after
	/// this call (spec.md §4.1).
	pub fn update_cost_table(&self, cost_table: ::lc_network::CostTable) {
		self.state.lock().flow_control.update_cost_table(cost_table);
	}

	/// Attempt to send `request` to this peer through `ctx`. Reserves
	/// flow-control budget first so a concurrent sender can't double
	/// spend the same credit.
	pub fn send(&self, ctx: &BasicContext, request: Request, now: Instant) -> Result<ReqId, NetworkError> {
		if self.is_frozen() {
			return Err(NetworkError::NoCredits);
		}

		let kind = request.kind();
		let mut state = self.state.lock();
		let cost = match state.flow_control.estimate_cost(kind, request.item_count()) {
			Some(c) => c,
			None => return Err(NetworkError::Other(format!("no cost entry for {:?}", kind))),
		};
		let reserved_after = match state.flow_control.try_reserve(cost, now) {
			Some(v) => v,
			None => return Err(NetworkError::NoCredits),
		};

		match ctx.request_from(self.id, request) {
			Ok(req_id) => {
				state.outstanding.insert(req_id, Outstanding { kind, sent_at: now, reserved_after });
				Ok(req_id)
			}
			Err(e) => {
				// the send never reached the transport; give the reservation back.
				state.flow_control.refund(cost);
				Err(e)
			}
		}
	}

	/// Remove `req_id` from the outstanding map, returning its
	/// bookkeeping if present. Used both on reply and on cancellation;
	/// credits are never refunded (spec.md §4.4, "conservative
	/// accounting").
	pub fn take_outstanding(&self, req_id: ReqId) -> Option<Outstanding> {
		self.state.lock().outstanding.remove(&req_id)
	}

	pub fn outstanding_ids(&self) -> Vec<ReqId> {
		self.state.lock().outstanding.keys().cloned().collect()
	}

	/// Process a reply's credit field against the bookkeeping for
	/// `req_id`. Returns an error if the server's claim is impossible,
	/// in which case the caller must disconnect this peer.
	pub fn observe_reply_credit(
		&self,
		outstanding: &Outstanding,
		buffer_value_after: u64,
		now: Instant,
	) -> Result<(), ::flow_control::BogusCredit> {
		let mut state = self.state.lock();
		state.flow_control.observe_reply(buffer_value_after, outstanding.reserved_after, outstanding.sent_at, now)
	}

	pub fn update_head(&self, announcement: &Announcement) {
		let mut state = self.state.lock();
		state.status.update_from(announcement);
		state.capabilities.update_from(announcement);
	}

	pub fn head(&self) -> (::ethereum_types::H256, u64, ::ethereum_types::U256) {
		let state = self.state.lock();
		(state.status.head_hash, state.status.head_number, state.status.head_td)
	}

	pub fn status(&self) -> Status {
		self.state.lock().status.clone()
	}
}

/// Translate a typed request into the capability requirement a peer must
/// meet to serve it.
fn required_capabilities(request: &Request) -> Capabilities {
	let mut caps = Capabilities::default();
	match *request {
		Request::HeaderByNumber { .. } => caps.serve_headers = true,
		Request::BlockBodyByHash { .. } | Request::ReceiptsByHash { .. } => {
			caps.serve_chain_since = Some(0);
		}
		Request::StateProof { .. } | Request::CodeByHash { .. } => {
			caps.serve_state_since = Some(0);
		}
		Request::TransactionStatus { .. } => caps.serve_chain_since = Some(0),
		Request::HelperTrieProof { .. } => caps.serve_headers = true,
	}
	caps
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap as StdHashMap;
	use lc_network::{Cost, CostTable, Checkpoint};
	use ethereum_types::{H256, U256};

	fn test_status() -> Status {
		let mut costs = StdHashMap::new();
		costs.insert(MessageKind::GetBlockHeaders, Cost { base: 10, per_item: 5 });
		Status {
			protocol_version: 2,
			network_id: 1,
			genesis_hash: H256::zero(),
			head_hash: H256::repeat_byte(9),
			head_number: 100,
			head_td: U256::from(1000),
			checkpoint: None::<Checkpoint>,
			buffer_limit: 1000,
			min_recharge: 100,
			cost_table: CostTable::new(costs),
		}
	}

	fn test_caps() -> Capabilities {
		Capabilities { serve_headers: true, serve_chain_since: Some(0), serve_state_since: Some(0), tx_relay: false }
	}

	#[test]
	fn capable_of_respects_announced_head() {
		let peer = Peer::new(0, NodeId::zero(), test_status(), test_caps(), ValueTracker::new());
		assert!(peer.capable_of(&Request::HeaderByNumber { number: 42 }));
	}

	#[test]
	fn estimate_cost_matches_cost_table() {
		let peer = Peer::new(0, NodeId::zero(), test_status(), test_caps(), ValueTracker::new());
		let cost = peer.estimate_cost(&Request::HeaderByNumber { number: 42 }).unwrap();
		assert_eq!(cost, 15);
	}

	#[test]
	fn head_covers_rejects_a_header_beyond_the_peers_synced_head() {
		let peer = Peer::new(0, NodeId::zero(), test_status(), test_caps(), ValueTracker::new());
		assert!(peer.head_covers(&Request::HeaderByNumber { number: 42 }));
		assert!(!peer.head_covers(&Request::HeaderByNumber { number: 1000 }));
	}

	#[test]
	fn head_covers_is_unconditional_for_hash_addressed_requests() {
		let peer = Peer::new(0, NodeId::zero(), test_status(), test_caps(), ValueTracker::new());
		assert!(peer.head_covers(&Request::CodeByHash { code_hash: H256::zero() }));
	}
}
