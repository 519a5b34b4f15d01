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

//! Capacity-aware scheduler mapping pending requests to eligible peers
//! (spec.md §4.4).
//!
//! Modeled on the teacher's `OnDemand::dispatch_pending`: a linear pass
//! over the pending set on every wake-up, rather than a fancier index,
//! because the pending set is small relative to how often peers'
//! capacity changes.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, Condvar};
use rand::{self, Rng};

use lc_network::{PeerId, BasicContext};

use peer::Peer;
use peer_set::{PeerSet, PeerSetSubscriber};
use retrieve::PendingRequest;

/// Sample window for a peer's adaptive timeout (spec.md §4.4,
/// "get_timeout").
const RESPONSE_SAMPLE_WINDOW: usize = 64;
/// Margin added on top of the observed 95th percentile.
const TIMEOUT_MARGIN: Duration = Duration::from_millis(500);
/// Used for a peer with no observations yet.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

struct ResponseTimeStats {
	samples: VecDeque<Duration>,
}

impl ResponseTimeStats {
	fn new() -> Self {
		ResponseTimeStats { samples: VecDeque::with_capacity(RESPONSE_SAMPLE_WINDOW) }
	}

	fn record(&mut self, duration: Duration) {
		if self.samples.len() == RESPONSE_SAMPLE_WINDOW {
			self.samples.pop_front();
		}
		self.samples.push_back(duration);
	}

	/// 95th-percentile observed latency, plus a fixed margin.
	fn quantile_95_plus_margin(&self) -> Duration {
		if self.samples.is_empty() {
			return DEFAULT_TIMEOUT;
		}
		let mut sorted: Vec<Duration> = self.samples.iter().cloned().collect();
		sorted.sort();
		let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
		let idx = idx.min(sorted.len() - 1);
		sorted[idx] + TIMEOUT_MARGIN
	}
}

struct Inner {
	queue: Vec<Arc<PendingRequest>>,
	response_times: HashMap<PeerId, ResponseTimeStats>,
	max_queue_len: usize,
}

/// Central scheduler. One instance is shared between `RetrieveManager`
/// (which queues requests) and a background thread (which dispatches
/// them); `PeerSet` notifies it when peers come and go.
pub struct RequestDistributor {
	inner: Mutex<Inner>,
	wake: Condvar,
	peer_set: Arc<PeerSet>,
}

/// Whether a just-queued request was accepted or rejected outright
/// because the queue was already full (spec.md §5, "Overloaded").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
	Queued,
	Overloaded,
}

impl RequestDistributor {
	pub fn new(peer_set: Arc<PeerSet>, max_queue_len: usize) -> Arc<Self> {
		Arc::new(RequestDistributor {
			inner: Mutex::new(Inner { queue: Vec::new(), response_times: HashMap::new(), max_queue_len }),
			wake: Condvar::new(),
			peer_set,
		})
	}

	/// Queue `request` for dispatch. Rejects low-priority work outright
	/// once the queue is at capacity (spec.md §5, "Backpressure").
	pub fn queue(&self, request: Arc<PendingRequest>) -> QueueOutcome {
		let mut inner = self.inner.lock();
		if inner.queue.len() >= inner.max_queue_len {
			return QueueOutcome::Overloaded;
		}
		inner.queue.push(request);
		self.wake.notify_one();
		QueueOutcome::Queued
	}

	/// Remove `request` from the queue without dispatching it (the
	/// consumer cancelled, or its deadline already elapsed while
	/// waiting). No-op if it was already dispatched.
	pub fn cancel(&self, request_id: u64) {
		let mut inner = self.inner.lock();
		inner.queue.retain(|r| r.id != request_id);
	}

	/// Remove and return every request still waiting for dispatch.
	/// Used by `RetrieveManager::shutdown` to cancel the whole queue at
	/// once rather than one deadline at a time.
	pub fn drain_all(&self) -> Vec<Arc<PendingRequest>> {
		let mut inner = self.inner.lock();
		inner.queue.drain(..).collect()
	}

	pub fn record_response_time(&self, peer: PeerId, duration: Duration) {
		let mut inner = self.inner.lock();
		inner.response_times.entry(peer).or_insert_with(ResponseTimeStats::new).record(duration);
	}

	/// Adaptive per-peer timeout: a moving 95th-percentile of observed
	/// response times, plus margin.
	pub fn get_timeout(&self, peer: PeerId) -> Duration {
		let inner = self.inner.lock();
		inner.response_times.get(&peer).map(|s| s.quantile_95_plus_margin()).unwrap_or(DEFAULT_TIMEOUT)
	}

	/// Wake the background dispatch loop (used by `PeerSet` on
	/// registration and by the periodic driver).
	pub fn wake_now(&self) {
		self.wake.notify_one();
	}

	/// Run the dispatch loop. Blocks the calling thread; intended to be
	/// the body of a dedicated background thread started at
	/// `Client::start`.
	pub fn run(&self, ctx: &BasicContext, stop: &::std::sync::atomic::AtomicBool) {
		use std::sync::atomic::Ordering;

		loop {
			if stop.load(Ordering::Acquire) {
				return;
			}

			let sleep_for = self.dispatch_pass(ctx);

			let mut inner = self.inner.lock();
			if !inner.queue.is_empty() {
				let _ = self.wake.wait_for(&mut inner, sleep_for.unwrap_or(Duration::from_millis(200)));
			} else {
				let _ = self.wake.wait_for(&mut inner, Duration::from_millis(500));
			}
		}
	}

	/// One sweep over the pending queue: dispatch whatever can be
	/// dispatched now, and return how long to sleep before the next
	/// sweep is worth attempting (the soonest any peer's buffer becomes
	/// affordable for some remaining request).
	fn dispatch_pass(&self, ctx: &BasicContext) -> Option<Duration> {
		let now = Instant::now();
		let peers = self.peer_set.snapshot();
		let mut inner = self.inner.lock();

		let mut remaining = Vec::with_capacity(inner.queue.len());
		let mut earliest_wait: Option<Duration> = None;

		for request in inner.queue.drain(..).collect::<Vec<_>>() {
			if now >= request.deadline {
				request.fail_timeout();
				continue;
			}

			match select_peer(&peers, &request, now) {
				Selection::Send(peer) => {
					match peer.send(ctx, request.payload.clone(), now) {
						Ok(req_id) => {
							request.mark_dispatched(peer.id(), req_id);
							continue;
						}
						Err(_) => {
							request.add_tried(peer.id());
							remaining.push(request);
						}
					}
				}
				Selection::WaitFor(wait) => {
					earliest_wait = Some(match earliest_wait {
						Some(existing) => existing.min(wait),
						None => wait,
					});
					remaining.push(request);
				}
				Selection::NoCandidates => {
					if request.note_no_candidates_and_check_inactive(now) {
						request.fail_no_peers();
					} else {
						remaining.push(request);
					}
				}
				Selection::NeverServable => {
					// at least one peer is connected, but none of them
					// could ever serve this request no matter how long
					// we wait - fail now instead of spending the
					// inactivity window or the hard deadline on it.
					request.fail_no_peers();
				}
			}
		}

		inner.queue = remaining;
		earliest_wait
	}
}

impl PeerSetSubscriber for RequestDistributor {
	fn on_register(&self, _peer: &Arc<Peer>) {
		self.wake_now();
	}

	fn on_unregister(&self, _peer: &Arc<Peer>) {
		self.wake_now();
	}
}

enum Selection<'a> {
	Send(&'a Arc<Peer>),
	WaitFor(Duration),
	NoCandidates,
	/// At least one peer is connected, but none of them is structurally
	/// able to serve this request — e.g. every peer's head is behind the
	/// requested block number. No amount of waiting changes this, unlike
	/// `NoCandidates` (which also covers "no peer connected yet").
	NeverServable,
}

/// Pick the best eligible peer for `request` among `peers`, or report why
/// none is usable yet.
fn select_peer<'a>(peers: &'a [Arc<Peer>], request: &PendingRequest, now: Instant) -> Selection<'a> {
	let mut best: Option<&Arc<Peer>> = None;
	let mut best_score = ::std::f64::NEG_INFINITY;
	let mut earliest_wait: Option<Duration> = None;
	let mut any_capable = false;

	if !peers.is_empty() && !peers.iter().any(|p| p.capable_of(&request.payload) && p.head_covers(&request.payload)) {
		return Selection::NeverServable;
	}

	// randomize the starting point so that, among equally scored peers,
	// load spreads out instead of always hitting the first in the list.
	let offset = if peers.is_empty() { 0 } else { rand::thread_rng().gen_range(0, peers.len()) };

	for i in 0..peers.len() {
		let peer = &peers[(i + offset) % peers.len()];

		if peer.is_frozen() { continue; }
		if !request.is_eligible_peer(peer.id()) { continue; }
		if !peer.capable_of(&request.payload) { continue; }
		if !peer.head_covers(&request.payload) { continue; }
		any_capable = true;

		let cost = match peer.estimate_cost(&request.payload) {
			Some(c) => c,
			None => continue,
		};

		if peer.projected_buffer(now) < cost {
			if let Some(wait) = peer.time_until_affordable(cost, now) {
				earliest_wait = Some(match earliest_wait {
					Some(existing) => existing.min(wait),
					None => wait,
				});
			}
			continue;
		}

		let score = peer.value_tracker().score(&peer.node_id(), request.payload.kind());
		let tie_break = -(peer.outstanding_count() as f64); // fewer outstanding is better
		let combined = score + tie_break * 1e-9; // score dominates; tie-break only among near-equal scores
		if combined > best_score || best.is_none() {
			if combined >= best_score {
				best_score = combined;
				best = Some(peer);
			}
		}
	}

	if let Some(peer) = best {
		return Selection::Send(peer);
	}
	if let Some(wait) = earliest_wait {
		return Selection::WaitFor(wait);
	}
	if any_capable {
		// capable peers exist but none currently affordable and we
		// couldn't compute a wait (e.g. zero min_recharge) — treat as
		// indefinitely blocked, equivalent to no candidates for timeout
		// accounting purposes.
		return Selection::NoCandidates;
	}
	Selection::NoCandidates
}
