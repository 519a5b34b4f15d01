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

//! The top-level façade tying peers, flow control, the distributor, Odr
//! and the server pool into one `Handler` a transport can drive
//! (spec.md §9, "Client lifecycle").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ethereum_types::{H256, U256};
use parking_lot::Mutex;

use lc_network::{
	Status, Capabilities, Announcement, Reply, ReqId,
	BasicContext, EventContext, Handler, PeerStatus,
};

use chain::HeaderChain;
use config::Config;
use distributor::RequestDistributor;
use odr::Odr;
use peer::Peer;
use peer_set::{PeerSet, PeerSetSubscriber};
use retrieve::RetrieveManager;
use server_pool::{ServerPool, Outcome};
use store::LocalStore;
use value_tracker::ValueTracker;

/// How many requests the distributor will hold in its pending queue
/// before rejecting new work outright (spec.md §5, "Backpressure").
const DEFAULT_QUEUE_LEN: usize = 256;

/// Owns every long-lived piece of the retrieval core and presents the
/// single `Handler` a transport drives. Constructing one does not start
/// any background work; call `start` once a transport context is ready.
pub struct Client {
	config: Config,
	chain: Arc<HeaderChain>,
	store: LocalStore,
	local_status: Status,
	peer_set: Arc<PeerSet>,
	distributor: Arc<RequestDistributor>,
	retrieve: Arc<RetrieveManager>,
	value_tracker: ValueTracker,
	server_pool: Mutex<ServerPool>,
	pub odr: Odr,
	stop: Arc<AtomicBool>,
	dispatch_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
	/// Build a client from `config`, a validated header chain, and an
	/// opened local store. `genesis_hash` identifies the network being
	/// synced; it is not part of `Config` because it comes from the
	/// chain spec the embedding binary already holds, not from user
	/// configuration.
	pub fn init(config: Config, chain: Arc<HeaderChain>, store: LocalStore, genesis_hash: H256) -> Result<Arc<Self>, String> {
		config.validate()?;

		let value_tracker = ValueTracker::load(&store);
		let server_pool = ServerPool::load(&store);
		for bootnode in &config.bootnodes {
			let record = ::config::to_node_record(bootnode)?;
			server_pool.add_candidate(record, 0);
		}

		let peer_set = Arc::new(PeerSet::new(config.max_peers));
		let distributor = RequestDistributor::new(peer_set.clone(), DEFAULT_QUEUE_LEN);
		let retrieve = RetrieveManager::new(distributor.clone(), peer_set.clone());
		peer_set.subscribe(distributor.clone() as Arc<PeerSetSubscriber>);
		peer_set.subscribe(retrieve.clone() as Arc<PeerSetSubscriber>);

		let (head_hash, head_number, head_td) = chain.head();
		let local_status = Status {
			protocol_version: 2,
			network_id: config.network_id,
			genesis_hash,
			head_hash,
			head_number,
			head_td,
			checkpoint: None,
			// a pure client serves nothing; these fields exist on Status
			// only because the same struct is exchanged by servers too.
			buffer_limit: 0,
			min_recharge: 0,
			cost_table: ::lc_network::CostTable::new(Default::default()),
		};

		let odr = Odr::new(chain.clone(), store.clone(), retrieve.clone());

		Ok(Arc::new(Client {
			config,
			chain,
			store,
			local_status,
			peer_set,
			distributor,
			retrieve,
			value_tracker,
			server_pool: Mutex::new(server_pool),
			odr,
			stop: Arc::new(AtomicBool::new(false)),
			dispatch_thread: Mutex::new(None),
		}))
	}

	/// Start the background dispatch loop (spec.md §4.4). `ctx` is the
	/// transport's handle for sending requests and managing connections;
	/// it must outlive the dispatch thread, hence the `'static` bound.
	pub fn start(&self, ctx: Arc<BasicContext>) {
		let distributor = self.distributor.clone();
		let stop = self.stop.clone();
		let handle = thread::spawn(move || distributor.run(&*ctx, &stop));
		*self.dispatch_thread.lock() = Some(handle);
	}

	/// Stop the dispatch loop, cancel every in-flight request, and flush
	/// persisted state. Does not disconnect peers itself — that is the
	/// transport's responsibility once this returns, since only the
	/// transport holds live connections.
	pub fn stop(&self) {
		self.stop.store(true, Ordering::Release);
		self.distributor.wake_now();
		if let Some(handle) = self.dispatch_thread.lock().take() {
			let _ = handle.join();
		}

		self.retrieve.shutdown();

		if let Err(e) = self.value_tracker.flush(&self.store) {
			warn!("failed to flush value tracker on shutdown: {}", e);
		}
		if let Err(e) = self.server_pool.lock().flush(&self.store) {
			warn!("failed to flush server pool on shutdown: {}", e);
		}
	}

	/// Dial candidates the embedding binary's transport should attempt
	/// to connect to next (spec.md §4.7).
	pub fn dial_candidates(&self) -> Vec<::lc_network::NodeRecord> {
		self.server_pool.lock().dial_candidates()
	}

	/// Feed back the outcome of a dial attempt (spec.md §4.7).
	pub fn report_dial_outcome(&self, node_id: &::lc_network::NodeId, outcome: Outcome) {
		self.server_pool.lock().report_outcome(node_id, outcome);
	}

	pub fn prune_server_pool(&self) {
		if !self.config.no_prune {
			self.server_pool.lock().decay_and_prune();
		}
	}

	fn local_status(&self) -> &Status {
		&self.local_status
	}
}

impl Handler for Client {
	fn on_connect(&self, ctx: &EventContext, status: &Status, capabilities: &Capabilities) -> PeerStatus {
		let peer_id = ctx.peer();
		let node_id = match ctx.as_basic().persistent_peer_id(peer_id) {
			Some(id) => id,
			None => return PeerStatus::Kill,
		};

		if !self.local_status().compatible_with(status) {
			return PeerStatus::Kill;
		}

		let peer = Arc::new(Peer::new(peer_id, node_id, status.clone(), *capabilities, self.value_tracker.clone()));
		match self.peer_set.register(peer) {
			Ok(()) => {
				self.report_dial_outcome(&node_id, Outcome::Connected);
				PeerStatus::Kept
			}
			Err(()) => PeerStatus::Kill,
		}
	}

	fn on_disconnect(&self, ctx: &EventContext, _unfulfilled: &[ReqId]) {
		let peer_id = ctx.peer();
		if let Some(peer) = self.peer_set.get(peer_id) {
			self.report_dial_outcome(&peer.node_id(), Outcome::DisconnectedCleanly);
		}
		self.peer_set.unregister(peer_id);
	}

	fn on_announcement(&self, ctx: &EventContext, announcement: &Announcement) {
		if let Some(peer) = self.peer_set.get(ctx.peer()) {
			peer.update_head(announcement);
			self.distributor.wake_now();
		}
	}

	fn on_reply(&self, ctx: &EventContext, reply: &Reply) {
		let peer_id = ctx.peer();
		if let Some(peer) = self.peer_set.get(peer_id) {
			if let Err(_bogus) = self.retrieve.deliver_reply(&peer, reply.clone()) {
				self.report_dial_outcome(&peer.node_id(), Outcome::DisconnectedProtocolViolation);
				ctx.as_basic().report_peer(peer_id, "reply claimed more buffer credit than possible");
				ctx.as_basic().disconnect_peer(peer_id);
			}
		}
	}

	fn on_freeze_state_change(&self, ctx: &EventContext, frozen: bool) {
		if let Some(peer) = self.peer_set.get(ctx.peer()) {
			if frozen {
				peer.mark_frozen();
			} else {
				peer.mark_thawed();
				self.distributor.wake_now();
			}
		}
	}

	fn tick(&self, _ctx: &BasicContext) {
		self.distributor.wake_now();
	}
}
