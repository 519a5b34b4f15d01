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

//! A concurrent registry of live peers (spec.md §4.3).

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;

use lc_network::PeerId;
use peer::Peer;

/// Notified synchronously, under the set's write lock, whenever a peer
/// joins or leaves. Implementations must not block or re-enter the set.
pub trait PeerSetSubscriber: Send + Sync {
	fn on_register(&self, peer: &Arc<Peer>);
	fn on_unregister(&self, peer: &Arc<Peer>);
}

struct Inner {
	peers: HashMap<PeerId, Arc<Peer>>,
	subscribers: Vec<Arc<PeerSetSubscriber>>,
	max_peers: usize,
}

/// Registry of currently connected peers. Enforces `max_peers` at
/// registration time; a peer over the cap should be rejected at
/// handshake by the caller before `register` is even attempted, but the
/// check here is the authoritative one.
pub struct PeerSet {
	inner: RwLock<Inner>,
}

impl PeerSet {
	pub fn new(max_peers: usize) -> Self {
		PeerSet { inner: RwLock::new(Inner { peers: HashMap::new(), subscribers: Vec::new(), max_peers }) }
	}

	pub fn subscribe(&self, subscriber: Arc<PeerSetSubscriber>) {
		self.inner.write().subscribers.push(subscriber);
	}

	/// Register a newly handshaken peer. Fails if the set is already at
	/// capacity.
	pub fn register(&self, peer: Arc<Peer>) -> Result<(), ()> {
		let mut inner = self.inner.write();
		if inner.peers.len() >= inner.max_peers {
			return Err(());
		}
		inner.peers.insert(peer.id(), peer.clone());
		for subscriber in inner.subscribers.clone() {
			subscriber.on_register(&peer);
		}
		Ok(())
	}

	pub fn unregister(&self, id: PeerId) {
		let mut inner = self.inner.write();
		if let Some(peer) = inner.peers.remove(&id) {
			for subscriber in inner.subscribers.clone() {
				subscriber.on_unregister(&peer);
			}
		}
	}

	pub fn get(&self, id: PeerId) -> Option<Arc<Peer>> {
		self.inner.read().peers.get(&id).cloned()
	}

	/// A consistent snapshot of currently registered peers.
	pub fn snapshot(&self) -> Vec<Arc<Peer>> {
		self.inner.read().peers.values().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.inner.read().peers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
