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

//! Persistent per-peer reputation statistics (spec.md §4.8).
//!
//! For each `(peer, request kind)` pair, an exponentially weighted
//! average of value delivered per unit cost. `RequestDistributor` reads
//! this to rank candidates; `RetrieveManager` writes to it on every
//! reply and penalizes it on verification failure or timeout.

use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::Mutex;
use serde_derive::{Serialize, Deserialize};

use lc_network::{NodeId, MessageKind};
use store::{self, LocalStore, COL_VALUE_TRACKER};

/// Smoothing factor for the exponential moving average; higher weights
/// recent observations more heavily. 0.3 matches the teacher's general
/// practice of favoring recent peer behavior over ancient history.
const EWMA_ALPHA: f64 = 0.3;
/// Multiplicative penalty applied to a kind's average on timeout or
/// verification failure, without erasing history outright.
const PENALTY_FACTOR: f64 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
struct Stat {
	ewma_value_per_cost: f64,
	total_served_cost: u64,
	session_count: u64,
	last_seen_unix: u64,
}

#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
	entries: Vec<(NodeIdBytes, MessageKindTag, Stat)>,
}

// `NodeId`/`MessageKind` don't implement serde themselves (the former is
// an ethereum-types fixed array, the latter an enum defined without
// derives in lc-network); these small wrappers give the snapshot a
// stable on-disk shape without requiring upstream changes.
type NodeIdBytes = [u8; 64];
type MessageKindTag = u8;

fn node_id_bytes(id: &NodeId) -> NodeIdBytes {
	let mut out = [0u8; 64];
	out.copy_from_slice(id.as_bytes());
	out
}

fn kind_tag(kind: MessageKind) -> MessageKindTag {
	use lc_network::MessageKind::*;
	match kind {
		Status => 0, Announce => 1, GetBlockHeaders => 2, BlockHeaders => 3,
		GetBlockBodies => 4, BlockBodies => 5, GetReceipts => 6, Receipts => 7,
		GetCode => 8, Code => 9, GetProofs => 10, Proofs => 11,
		GetHelperTrieProofs => 12, HelperTrieProofs => 13, SendTx => 14,
		GetTxStatus => 15, TxStatus => 16, Stop => 17, Resume => 18,
	}
}

struct Inner {
	stats: HashMap<(NodeIdBytes, MessageKindTag), Stat>,
}

/// Handle to the persisted reputation table, cheap to clone and share
/// across peers.
#[derive(Clone)]
pub struct ValueTracker {
	inner: Arc<Mutex<Inner>>,
}

impl ValueTracker {
	pub fn new() -> Self {
		ValueTracker { inner: Arc::new(Mutex::new(Inner { stats: HashMap::new() })) }
	}

	/// Load a previously flushed snapshot from the store, if present.
	pub fn load(store: &LocalStore) -> Self {
		let tracker = ValueTracker::new();
		if let Ok(Some(bytes)) = store::get(store, COL_VALUE_TRACKER, b"snapshot") {
			if let Ok(snapshot) = ::bincode::deserialize::<Snapshot>(&bytes) {
				let mut inner = tracker.inner.lock();
				for (id, tag, stat) in snapshot.entries {
					inner.stats.insert((id, tag), stat);
				}
			}
		}
		tracker
	}

	/// Flush the current table to the store (spec.md §4.8: "at process
	/// shutdown and periodically during runtime").
	pub fn flush(&self, store: &LocalStore) -> Result<(), String> {
		let inner = self.inner.lock();
		let entries = inner.stats.iter().map(|(&(id, tag), &stat)| (id, tag, stat)).collect();
		let snapshot = Snapshot { entries };
		let bytes = ::bincode::serialize(&snapshot).map_err(|e| e.to_string())?;
		store::put(store, COL_VALUE_TRACKER, b"snapshot", &bytes)
	}

	/// A request of `kind` to `peer` completed successfully, delivering
	/// `value` units of payload at `cost` units of credit.
	pub fn record_success(&self, peer: &NodeId, kind: MessageKind, value: f64, cost: u64, now_unix: u64) {
		let mut inner = self.inner.lock();
		let key = (node_id_bytes(peer), kind_tag(kind));
		let stat = inner.stats.entry(key).or_insert_with(Stat::default);
		let sample = if cost == 0 { value } else { value / cost as f64 };
		stat.ewma_value_per_cost = EWMA_ALPHA * sample + (1.0 - EWMA_ALPHA) * stat.ewma_value_per_cost;
		stat.total_served_cost = stat.total_served_cost.saturating_add(cost);
		stat.session_count += 1;
		stat.last_seen_unix = now_unix;
	}

	/// A request of `kind` to `peer` timed out or failed verification;
	/// decay its average without resetting history (spec.md §4.8: "decayed
	/// on timeouts").
	pub fn penalize(&self, peer: &NodeId, kind: MessageKind) {
		let mut inner = self.inner.lock();
		let key = (node_id_bytes(peer), kind_tag(kind));
		if let Some(stat) = inner.stats.get_mut(&key) {
			stat.ewma_value_per_cost *= PENALTY_FACTOR;
		}
	}

	/// Current score for `(peer, kind)`, used by the distributor to rank
	/// candidates. Unseen peers score 0.0, the lowest possible value, so
	/// fresh peers are tried but never preferred over known-good ones.
	pub fn score(&self, peer: &NodeId, kind: MessageKind) -> f64 {
		let inner = self.inner.lock();
		inner.stats.get(&(node_id_bytes(peer), kind_tag(kind)))
			.map(|s| s.ewma_value_per_cost)
			.unwrap_or(0.0)
	}

	pub fn session_count(&self, peer: &NodeId, kind: MessageKind) -> u64 {
		let inner = self.inner.lock();
		inner.stats.get(&(node_id_bytes(peer), kind_tag(kind))).map(|s| s.session_count).unwrap_or(0)
	}
}
