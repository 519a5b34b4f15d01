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

//! Peer discovery, quality scoring, and dial-candidate iteration
//! (spec.md §4.7).

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use rand::{self, Rng};
use serde_derive::{Serialize, Deserialize};

use lc_network::NodeRecord;
use store::{self, LocalStore, COL_SERVER_POOL};

/// Initial score given to a record nobody has dialed yet.
const INITIAL_SCORE: f64 = 0.0;
/// Reward for a clean, useful connection.
const CONNECTED_BONUS: f64 = 10.0;
/// Penalty for a peer that never completed the handshake.
const HANDSHAKE_FAILED_PENALTY: f64 = 20.0;
/// Penalty for a clean disconnect (neutral-ish; peers come and go).
const DISCONNECTED_CLEANLY_PENALTY: f64 = 2.0;
/// Heavy penalty for a peer caught violating the protocol.
const PROTOCOL_VIOLATION_PENALTY: f64 = 100.0;
/// Multiplicative decay applied to every score once per sweep.
const DECAY_FACTOR: f64 = 0.98;
/// Entries scoring below this, and not connected, are pruned.
const PRUNE_THRESHOLD: f64 = -50.0;
/// One in this many dial picks ignores score entirely, to keep
/// refreshing the pool with unknown/underused records.
const EXPLORATION_RATE: u32 = 8;

/// How a connection attempt to a pool entry concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Connected,
	HandshakeFailed,
	DisconnectedCleanly,
	DisconnectedProtocolViolation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
	record: SerializableRecord,
	score: f64,
	known_since_unix: u64,
	connected: bool,
}

/// `NodeRecord`'s `NodeId` is a plain `H512` with no serde impl of its
/// own; this mirrors it byte-for-byte for (de)serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableRecord {
	id: [u8; 64],
	endpoint: String,
	seq: u64,
}

impl From<&NodeRecord> for SerializableRecord {
	fn from(r: &NodeRecord) -> Self {
		let mut id = [0u8; 64];
		id.copy_from_slice(r.id.as_bytes());
		SerializableRecord { id, endpoint: r.endpoint.clone(), seq: r.seq }
	}
}

impl SerializableRecord {
	fn to_record(&self) -> NodeRecord {
		NodeRecord::new(::ethereum_types::H512::from(self.id), self.endpoint.clone(), self.seq)
	}
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
	entries: Vec<Entry>,
}

struct Inner {
	entries: HashMap<[u8; 64], Entry>,
}

/// Ranked candidate set of dial targets, backed by persisted scores so
/// rankings survive a restart (spec.md §4.7, §4.8).
pub struct ServerPool {
	inner: Mutex<Inner>,
}

impl ServerPool {
	pub fn new() -> Self {
		ServerPool { inner: Mutex::new(Inner { entries: HashMap::new() }) }
	}

	/// Load a previously flushed snapshot, if present.
	pub fn load(store: &LocalStore) -> Self {
		let pool = ServerPool::new();
		if let Ok(Some(bytes)) = store::get(store, COL_SERVER_POOL, b"snapshot") {
			if let Ok(snapshot) = ::bincode::deserialize::<Snapshot>(&bytes) {
				let mut inner = pool.inner.lock();
				for mut entry in snapshot.entries {
					entry.connected = false; // nothing is connected right after a restart
					inner.entries.insert(entry.record.id, entry);
				}
			}
		}
		pool
	}

	pub fn flush(&self, store: &LocalStore) -> Result<(), String> {
		let inner = self.inner.lock();
		let snapshot = Snapshot { entries: inner.entries.values().cloned().collect() };
		let bytes = ::bincode::serialize(&snapshot).map_err(|e| e.to_string())?;
		store::put(store, COL_SERVER_POOL, b"snapshot", &bytes)
	}

	/// Add or refresh a dial candidate, e.g. one produced by a bootnode
	/// list or a DNS-discovery sweep. A record with a lower or equal
	/// `seq` than what's already known is ignored.
	pub fn add_candidate(&self, record: NodeRecord, now_unix: u64) {
		let mut inner = self.inner.lock();
		let mut id = [0u8; 64];
		id.copy_from_slice(record.id.as_bytes());

		let replace = match inner.entries.get(&id) {
			Some(existing) => record.seq > existing.record.seq,
			None => true,
		};
		if replace {
			inner.entries.insert(id, Entry {
				record: SerializableRecord::from(&record),
				score: INITIAL_SCORE,
				known_since_unix: now_unix,
				connected: false,
			});
		}
	}

	/// Record the outcome of a connection attempt, adjusting the entry's
	/// score accordingly (spec.md §4.7, "After a connection attempt the
	/// pool is informed of the outcome").
	pub fn report_outcome(&self, node_id: &::lc_network::NodeId, outcome: Outcome) {
		let mut id = [0u8; 64];
		id.copy_from_slice(node_id.as_bytes());

		let mut inner = self.inner.lock();
		if let Some(entry) = inner.entries.get_mut(&id) {
			match outcome {
				Outcome::Connected => { entry.score += CONNECTED_BONUS; entry.connected = true; }
				Outcome::HandshakeFailed => { entry.score -= HANDSHAKE_FAILED_PENALTY; entry.connected = false; }
				Outcome::DisconnectedCleanly => { entry.score -= DISCONNECTED_CLEANLY_PENALTY; entry.connected = false; }
				Outcome::DisconnectedProtocolViolation => { entry.score -= PROTOCOL_VIOLATION_PENALTY; entry.connected = false; }
			}
		}
	}

	/// Decay every score and evict entries that have fallen below the
	/// prune threshold and are not currently connected (spec.md §4.7,
	/// "Pruning").
	pub fn decay_and_prune(&self) {
		let mut inner = self.inner.lock();
		for entry in inner.entries.values_mut() {
			entry.score *= DECAY_FACTOR;
		}
		inner.entries.retain(|_, e| e.connected || e.score >= PRUNE_THRESHOLD);
	}

	/// Dial candidates in an order that favors known-good entries, with
	/// occasional exploration of lower-ranked or brand-new ones (spec.md
	/// §4.7, "recency... with exploration").
	pub fn dial_candidates(&self) -> Vec<NodeRecord> {
		let inner = self.inner.lock();
		let mut ranked: Vec<&Entry> = inner.entries.values().filter(|e| !e.connected).collect();
		ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(::std::cmp::Ordering::Equal));

		if ranked.len() > 1 && rand::thread_rng().gen_range(0, EXPLORATION_RATE) == 0 {
			let i = rand::thread_rng().gen_range(0, ranked.len());
			ranked.swap(0, i);
		}

		ranked.into_iter().map(|e| e.record.to_record()).collect()
	}

	pub fn len(&self) -> usize {
		self.inner.lock().entries.len()
	}
}

/// How often an embedding binary should call `decay_and_prune`.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(300);
