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

//! Owns one request's full lifecycle: send, match reply, verify, retry
//! (spec.md §4.5).

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender, RecvTimeoutError};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use lc_network::{PeerId, ReqId, Request, Reply};

use distributor::{RequestDistributor, QueueOutcome};
use flow_control::BogusCredit;
use peer::Peer;
use peer_set::{PeerSet, PeerSetSubscriber};
use error::{Error, ErrorKind};

const INACTIVITY_LIMIT: Duration = Duration::from_millis(10_000);

fn now_unix() -> u64 {
	use std::time::SystemTime;
	SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Event delivered to a request's lifecycle loop. Unlike a one-shot
/// completion channel, a request may be dispatched, fail, and be
/// re-dispatched several times before it resolves, so this channel stays
/// open for the whole lifecycle rather than firing once.
enum LifecycleEvent {
	Dispatched { peer: PeerId, req_id: ReqId },
	NoPeers,
	TimedOutInQueue,
	Reply(Reply),
	PeerDisconnected,
	Cancelled,
}

/// One in-flight retrieval (spec.md §3, "Request").
pub struct PendingRequest {
	pub id: u64,
	pub payload: Request,
	pub deadline: Instant,
	capable_peers: Option<HashSet<PeerId>>,
	tried: Mutex<HashSet<PeerId>>,
	/// Distinct peers whose reply failed verification. Tracked separately
	/// from `tried` (which also grows on disconnects and timeouts) so a
	/// majority-disagreement verdict reflects only peers that actually
	/// answered and were wrong, not ones that never got the chance.
	bad_responses: Mutex<HashSet<PeerId>>,
	inactive_since: Mutex<Option<Instant>>,
	events: Sender<LifecycleEvent>,
}

impl PendingRequest {
	fn new(
		id: u64,
		payload: Request,
		deadline: Instant,
		capable_peers: Option<HashSet<PeerId>>,
		events: Sender<LifecycleEvent>,
	) -> Self {
		PendingRequest {
			id, payload, deadline, capable_peers,
			tried: Mutex::new(HashSet::new()),
			bad_responses: Mutex::new(HashSet::new()),
			inactive_since: Mutex::new(None),
			events,
		}
	}

	pub fn is_eligible_peer(&self, peer: PeerId) -> bool {
		if self.tried.lock().contains(&peer) {
			return false;
		}
		match self.capable_peers {
			Some(ref allowed) => allowed.contains(&peer),
			None => true,
		}
	}

	pub fn add_tried(&self, peer: PeerId) {
		self.tried.lock().insert(peer);
	}

	/// Record that `peer`'s reply failed verification. Returns the number
	/// of distinct peers that have now given a bad response to this
	/// logical request, used to detect a request that no honest peer can
	/// answer rather than one peer that happened to lie (spec.md §9,
	/// "majority disagreement").
	pub fn mark_bad_response(&self, peer: PeerId) -> usize {
		let mut bad = self.bad_responses.lock();
		bad.insert(peer);
		bad.len()
	}

	pub fn mark_dispatched(&self, peer: PeerId, req_id: ReqId) {
		*self.inactive_since.lock() = None;
		let _ = self.events.send(LifecycleEvent::Dispatched { peer, req_id });
	}

	pub fn fail_no_peers(&self) {
		let _ = self.events.send(LifecycleEvent::NoPeers);
	}

	pub fn fail_timeout(&self) {
		let _ = self.events.send(LifecycleEvent::TimedOutInQueue);
	}

	/// Used only by `RetrieveManager::shutdown` to drain requests still
	/// sitting in the distributor's queue when the client stops.
	pub fn cancel(&self) {
		let _ = self.events.send(LifecycleEvent::Cancelled);
	}

	/// Record that no candidate peer was found on this pass; returns
	/// `true` once the inactivity window has elapsed with no candidate
	/// appearing (spec.md §9, "query_inactive_time_limit").
	pub fn note_no_candidates_and_check_inactive(&self, now: Instant) -> bool {
		let mut inactive = self.inactive_since.lock();
		match *inactive {
			Some(since) => now.saturating_duration_since(since) > INACTIVITY_LIMIT,
			None => {
				*inactive = Some(now);
				false
			}
		}
	}
}

/// Orchestrates the lifetime of requests end to end.
pub struct RetrieveManager {
	distributor: Arc<RequestDistributor>,
	peer_set: Arc<PeerSet>,
	next_id: AtomicUsize,
	/// `ReqId` is only meaningful for the peer that issued it, but ids
	/// are assigned by the transport and we trust them to be unique per
	/// connection for the connection's lifetime.
	routes: Mutex<::std::collections::HashMap<ReqId, Sender<LifecycleEvent>>>,
}

/// The outcome of verifying a reply against the local header chain
/// (spec.md §3, "validation predicate").
pub type VerifyResult<V> = Result<V, String>;

impl RetrieveManager {
	pub fn new(distributor: Arc<RequestDistributor>, peer_set: Arc<PeerSet>) -> Arc<Self> {
		Arc::new(RetrieveManager { distributor, peer_set, next_id: AtomicUsize::new(1), routes: Mutex::new(::std::collections::HashMap::new()) })
	}

	/// Retrieve and verify one typed request, retrying against other
	/// peers as needed. Blocks the calling thread until the request
	/// resolves, one way or another, by its deadline.
	pub fn retrieve<V, F>(
		&self,
		payload: Request,
		deadline: Instant,
		capable_peers: Option<HashSet<PeerId>>,
		verify: F,
	) -> Result<V, Error>
	where
		F: Fn(&Peer, &Reply) -> VerifyResult<V>,
	{
		let id = self.next_id.fetch_add(1, Ordering::Relaxed) as u64;
		let (tx, rx) = mpsc::channel();
		let request = Arc::new(PendingRequest::new(id, payload, deadline, capable_peers, tx));

		if let QueueOutcome::Overloaded = self.distributor.queue(request.clone()) {
			return Err(ErrorKind::Overloaded.into());
		}

		let mut bound_peer: Option<PeerId> = None;
		let mut bound_req_id: Option<ReqId> = None;
		let mut sent_at = Instant::now();

		let result = loop {
			let now = Instant::now();
			if now >= deadline {
				if let Some(req_id) = bound_req_id.take() {
					self.routes.lock().remove(&req_id);
				}
				self.distributor.cancel(id);
				break Err(ErrorKind::Timeout.into());
			}

			let wait = match bound_peer {
				Some(peer) => deadline.saturating_duration_since(now).min(self.distributor.get_timeout(peer)),
				None => deadline.saturating_duration_since(now),
			};

			match rx.recv_timeout(wait) {
				Ok(LifecycleEvent::Dispatched { peer, req_id }) => {
					bound_peer = Some(peer);
					bound_req_id = Some(req_id);
					sent_at = Instant::now();
					self.routes.lock().insert(req_id, request.events.clone());
				}
				Ok(LifecycleEvent::Reply(reply)) => {
					let req_id = reply.req_id;
					self.routes.lock().remove(&req_id);
					let peer_id = bound_peer.take();
					bound_req_id = None;

					let peer = peer_id.and_then(|p| self.peer_set.get(p));
					match peer {
						Some(peer) => {
							self.distributor.record_response_time(peer.id(), Instant::now().saturating_duration_since(sent_at));
							match verify(&*peer, &reply) {
								Ok(value) => {
									let cost = peer.estimate_cost(&request.payload).unwrap_or(1);
									peer.value_tracker().record_success(&peer.node_id(), request.payload.kind(), reply_value(&reply), cost, now_unix());
									break Ok(value);
								}
								Err(_reason) => {
									peer.value_tracker().penalize(&peer.node_id(), request.payload.kind());
									request.add_tried(peer.id());

									let bad = request.mark_bad_response(peer.id());
									let total_peers = self.peer_set.len();
									if total_peers > 0 && bad * 2 > total_peers {
										self.distributor.cancel(id);
										break Err(ErrorKind::FaultyRequest(ReqId(id), bad, total_peers).into());
									}

									self.distributor.queue(request.clone());
								}
							}
						}
						None => {
							// peer vanished between reply and lookup; treat like disconnect.
							request.add_tried(peer_id.unwrap_or(0));
							self.distributor.queue(request.clone());
						}
					}
				}
				Ok(LifecycleEvent::PeerDisconnected) => {
					if let Some(peer) = bound_peer.take() {
						request.add_tried(peer);
					}
					bound_req_id = None;
					self.distributor.queue(request.clone());
				}
				Ok(LifecycleEvent::NoPeers) => break Err(ErrorKind::NoPeers.into()),
				Ok(LifecycleEvent::TimedOutInQueue) => break Err(ErrorKind::Timeout.into()),
				Ok(LifecycleEvent::Cancelled) => break Err(ErrorKind::Cancelled.into()),
				Err(RecvTimeoutError::Timeout) => {
					match bound_peer.take() {
						Some(peer) => {
							// adaptive per-peer timeout elapsed; the hard
							// deadline has not, so retry elsewhere.
							if let Some(req_id) = bound_req_id.take() {
								self.routes.lock().remove(&req_id);
							}
							request.add_tried(peer);
							self.distributor.queue(request.clone());
						}
						None => continue, // still queued; loop re-checks the hard deadline.
					}
				}
				Err(RecvTimeoutError::Disconnected) => break Err(ErrorKind::Cancelled.into()),
			}
		};

		result
	}

	/// Deliver a reply that arrived for `req_id` on `peer`, validating
	/// its credit field first. On a bogus credit claim, the caller must
	/// disconnect the peer; the reply itself is not trusted, and the
	/// waiting request is requeued onto another peer immediately rather
	/// than waiting on the transport to actually tear the connection down
	/// (spec.md §8, "byzantine credit field").
	pub fn deliver_reply(&self, peer: &Arc<Peer>, reply: Reply) -> Result<(), BogusCredit> {
		let outstanding = match peer.take_outstanding(reply.req_id) {
			Some(o) => o,
			None => return Ok(()), // unknown or already-handled request id; drop silently
		};

		let credit_result = peer.observe_reply_credit(&outstanding, reply.buffer_value_after, Instant::now());
		if credit_result.is_err() {
			if let Some(tx) = self.routes.lock().remove(&reply.req_id) {
				let _ = tx.send(LifecycleEvent::PeerDisconnected);
			}
			return credit_result;
		}

		if let Some(tx) = self.routes.lock().get(&reply.req_id) {
			let _ = tx.send(LifecycleEvent::Reply(reply));
		}

		Ok(())
	}

	/// A peer vanished with requests still outstanding; route a
	/// disconnect event to each of their lifecycles.
	pub fn handle_disconnect(&self, peer: &Arc<Peer>) {
		let mut routes = self.routes.lock();
		for req_id in peer.outstanding_ids() {
			if let Some(tx) = routes.remove(&req_id) {
				let _ = tx.send(LifecycleEvent::PeerDisconnected);
			}
		}
	}

	/// Cancel every request this manager knows about, dispatched or not
	/// (spec.md §9: stopping the client drains in-flight requests to
	/// `Cancelled` rather than leaving them to time out on their own).
	pub fn shutdown(&self) {
		for request in self.distributor.drain_all() {
			request.cancel();
		}
		let routes = self.routes.lock();
		for tx in routes.values() {
			let _ = tx.send(LifecycleEvent::Cancelled);
		}
	}
}

impl PeerSetSubscriber for RetrieveManager {
	fn on_register(&self, _peer: &Arc<Peer>) {}

	fn on_unregister(&self, peer: &Arc<Peer>) {
		self.handle_disconnect(peer);
	}
}

/// Convenience used by tests and by `Odr` to score replies for
/// `ValueTracker` (spec.md §4.8): number of leaf items the reply
/// actually carried.
pub fn reply_value(reply: &Reply) -> f64 {
	use lc_network::Response::*;
	match &reply.response {
		BlockHeader(_) => 1.0,
		BlockBody(b) => (b.transactions.len() + b.uncles.len()) as f64,
		Receipts(r) => r.len().max(1) as f64,
		StateProof(nodes) => nodes.len().max(1) as f64,
		Code(bytes) => bytes.len().max(1) as f64,
		TransactionStatus(_) => 1.0,
		HelperTrieProof(nodes) => nodes.len().max(1) as f64,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(id: u64) -> PendingRequest {
		let (tx, _rx) = mpsc::channel();
		PendingRequest::new(id, Request::HeaderByNumber { number: 1 }, Instant::now() + Duration::from_secs(1), None, tx)
	}

	#[test]
	fn bad_response_count_grows_only_on_distinct_peers() {
		let req = request(1);
		assert_eq!(req.mark_bad_response(1), 1);
		assert_eq!(req.mark_bad_response(2), 2);
		assert_eq!(req.mark_bad_response(1), 2); // same peer again, no growth
	}

	#[test]
	fn add_tried_excludes_a_peer_from_future_selection() {
		let req = request(1);
		assert!(req.is_eligible_peer(5));
		req.add_tried(5);
		assert!(!req.is_eligible_peer(5));
	}

	use lc_network::{Status, Capabilities, CostTable, NodeId, Checkpoint, NetworkError};
	use ethereum_types::{H256, U256};
	use peer_set::PeerSet;
	use value_tracker::ValueTracker;

	struct OneShotContext;
	impl ::lc_network::BasicContext for OneShotContext {
		fn request_from(&self, _peer: PeerId, _request: Request) -> Result<ReqId, NetworkError> { Ok(ReqId(1)) }
		fn persistent_peer_id(&self, _peer: PeerId) -> Option<NodeId> { Some(NodeId::zero()) }
		fn disconnect_peer(&self, _peer: PeerId) {}
		fn report_peer(&self, _peer: PeerId, _reason: &str) {}
	}

	fn test_status() -> Status {
		Status {
			protocol_version: 2,
			network_id: 1,
			genesis_hash: H256::zero(),
			head_hash: H256::zero(),
			head_number: 100,
			head_td: U256::zero(),
			checkpoint: None::<Checkpoint>,
			buffer_limit: 100,
			min_recharge: 10,
			cost_table: CostTable::flat(10, 0),
		}
	}

	/// A bogus credit claim must not complete the waiting request with
	/// the (untrustworthy) reply; it must requeue onto another peer
	/// instead, the same as an outright disconnect (spec.md §8, "byzantine
	/// credit field").
	#[test]
	fn bogus_credit_requeues_rather_than_completing_the_request() {
		let peer_set = PeerSet::new(10);
		let peer = Arc::new(Peer::new(0, NodeId::zero(), test_status(), Capabilities::default(), ValueTracker::new()));
		peer_set.register(peer.clone()).unwrap();

		let distributor = RequestDistributor::new(Arc::new(peer_set), 10);
		let manager = RetrieveManager::new(distributor, Arc::new(PeerSet::new(10)));

		let req_id = peer.send(&OneShotContext, Request::HeaderByNumber { number: 1 }, Instant::now()).unwrap();

		let (tx, rx) = mpsc::channel();
		manager.routes.lock().insert(req_id, tx);

		let header = ::lc_network::Header {
			parent_hash: H256::zero(),
			number: 1,
			total_difficulty: U256::zero(),
			state_root: H256::zero(),
			body_hash: H256::zero(),
			receipts_root: H256::zero(),
			transactions_root: H256::zero(),
			extra_data: Vec::new(),
		};
		let reply = Reply {
			req_id,
			response: ::lc_network::Response::BlockHeader(header),
			buffer_value_after: 10_000, // far beyond anything recharge could produce
		};

		let result = manager.deliver_reply(&peer, reply);
		assert!(result.is_err());
		assert!(manager.routes.lock().get(&req_id).is_none());

		match rx.recv_timeout(Duration::from_millis(100)) {
			Ok(LifecycleEvent::PeerDisconnected) => {}
			other => panic!("expected PeerDisconnected, got a different or no event: {}", other.is_ok()),
		}
	}
}
