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

//! Per-peer token bucket with a conservative server-side mirror
//! (spec.md §4.1).
//!
//! The invariant this module exists to hold: the client never believes
//! it can send a request the server's buffer can't actually cover, and
//! it catches a server that claims otherwise.

use std::time::{Duration, Instant};

use lc_network::{CostTable, MessageKind};

/// Client-side flow-control state for one peer.
#[derive(Debug, Clone)]
pub struct FlowControl {
	buffer_value: u64,
	buffer_limit: u64,
	min_recharge: u64,
	last_update: Instant,
	cost_table: CostTable,
	/// Running lower bound on what the server believes our buffer is.
	server_buffer_estimate: u64,
}

/// Why a reply's credit field was rejected outright (spec.md §8:
/// "every `buffer_value_after` reported by a server is ≤ the client's
/// pre-send estimate + the peer's `min_recharge · elapsed`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BogusCredit {
	pub claimed: u64,
	pub max_possible: u64,
}

impl FlowControl {
	pub fn new(buffer_limit: u64, min_recharge: u64, cost_table: CostTable) -> Self {
		FlowControl {
			buffer_value: buffer_limit,
			buffer_limit,
			min_recharge,
			last_update: Instant::now(),
			cost_table,
			server_buffer_estimate: buffer_limit,
		}
	}

	/// Recharge `buffer_value` up to `now`, capped at `buffer_limit`.
	fn recharge_to(&mut self, now: Instant) {
		let elapsed = now.saturating_duration_since(self.last_update);
		let recharge = self.min_recharge.saturating_mul(elapsed.as_secs());
		self.buffer_value = self.buffer_value.saturating_add(recharge).min(self.buffer_limit);
		self.last_update = now;
	}

	/// What the buffer will be at `now`, without mutating state. Used by
	/// the distributor to decide eligibility and to compute wait times.
	pub fn projected_buffer(&self, now: Instant) -> u64 {
		let elapsed = now.saturating_duration_since(self.last_update);
		let recharge = self.min_recharge.saturating_mul(elapsed.as_secs());
		self.buffer_value.saturating_add(recharge).min(self.buffer_limit)
	}

	/// The earliest instant at which the buffer will cover `cost`, or
	/// `None` if it already does.
	pub fn time_until_affordable(&self, cost: u64, now: Instant) -> Option<Duration> {
		let projected = self.projected_buffer(now);
		if projected >= cost {
			return None;
		}
		if self.min_recharge == 0 {
			return None; // will never recharge; distributor treats this peer as ineligible
		}
		let deficit = cost - projected;
		let secs = (deficit + self.min_recharge - 1) / self.min_recharge; // ceiling division
		Some(Duration::from_secs(secs))
	}

	/// Estimate the cost of a request of `kind` addressing `item_count`
	/// items, using the peer's current cost table.
	pub fn estimate_cost(&self, kind: MessageKind, item_count: usize) -> Option<u64> {
		self.cost_table.cost_of(kind, item_count)
	}

	/// Attempt to reserve `cost` units at `now`. On success, debits the
	/// buffer and returns the new estimate to record alongside the
	/// outstanding request (used later to bound a cheating server's
	/// claimed `buffer_value_after`).
	pub fn try_reserve(&mut self, cost: u64, now: Instant) -> Option<u64> {
		self.recharge_to(now);
		if self.buffer_value < cost {
			return None;
		}
		self.buffer_value -= cost;
		Some(self.buffer_value)
	}

	/// Credit `cost` back to the buffer. Used only when a reservation's
	/// matching send never actually reached the peer (a transport-level
	/// failure, not a reply or a cancellation) — spec.md §4.4's
	/// "credits are not refunded" rule is about cancelling requests that
	/// were genuinely sent, not about failed sends.
	pub fn refund(&mut self, cost: u64) {
		self.buffer_value = self.buffer_value.saturating_add(cost).min(self.buffer_limit);
	}

	/// Install a new cost table. Applies only to requests estimated
	/// after this call; in-flight requests keep whatever cost was
	/// estimated when they were reserved (spec.md §4.1, §9).
	pub fn update_cost_table(&mut self, cost_table: CostTable) {
		self.cost_table = cost_table;
	}

	/// Process a reply's `buffer_value_after`, validating it against the
	/// maximum the server could honestly report.
	///
	/// `sent_at` and `reserved_after` are the moment the request was sent
	/// and the buffer value we computed at that moment via
	/// `try_reserve`; `now` is reply-arrival time.
	pub fn observe_reply(
		&mut self,
		claimed_buffer_value_after: u64,
		reserved_after: u64,
		sent_at: Instant,
		now: Instant,
	) -> Result<(), BogusCredit> {
		let elapsed = now.saturating_duration_since(sent_at);
		let max_possible = reserved_after
			.saturating_add(self.min_recharge.saturating_mul(elapsed.as_secs()))
			.min(self.buffer_limit);

		if claimed_buffer_value_after > max_possible {
			return Err(BogusCredit { claimed: claimed_buffer_value_after, max_possible });
		}

		self.server_buffer_estimate = claimed_buffer_value_after;
		self.last_update = now;
		self.buffer_value = claimed_buffer_value_after;
		Ok(())
	}

	pub fn buffer_value(&self) -> u64 {
		self.buffer_value
	}

	pub fn buffer_limit(&self) -> u64 {
		self.buffer_limit
	}

	pub fn server_buffer_estimate(&self) -> u64 {
		self.server_buffer_estimate
	}

	pub fn min_recharge(&self) -> u64 {
		self.min_recharge
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;
	use lc_network::Cost;

	fn table() -> CostTable {
		let mut m = HashMap::new();
		m.insert(MessageKind::GetBlockHeaders, Cost { base: 10, per_item: 5 });
		CostTable::new(m)
	}

	#[test]
	fn reserve_debits_and_recharges() {
		let mut fc = FlowControl::new(1000, 100, table());
		let t0 = Instant::now();
		let after = fc.try_reserve(15, t0).unwrap();
		assert_eq!(after, 985);

		let t1 = t0 + Duration::from_secs(1);
		assert_eq!(fc.projected_buffer(t1), 1000); // recharge capped at limit
	}

	#[test]
	fn insufficient_buffer_waits() {
		let mut fc = FlowControl::new(1000, 10, table());
		let t0 = Instant::now();
		fc.try_reserve(1000, t0).unwrap();
		assert!(fc.try_reserve(20, t0).is_none());
		let wait = fc.time_until_affordable(20, t0).unwrap();
		assert_eq!(wait, Duration::from_secs(2));
	}

	#[test]
	fn bogus_credit_is_rejected() {
		let mut fc = FlowControl::new(1000, 100, table());
		let t0 = Instant::now();
		let reserved_after = fc.try_reserve(15, t0).unwrap();
		let result = fc.observe_reply(10 * fc.buffer_limit(), reserved_after, t0, t0);
		assert!(result.is_err());
	}

	#[test]
	fn honest_credit_is_accepted() {
		let mut fc = FlowControl::new(1000, 100, table());
		let t0 = Instant::now();
		let reserved_after = fc.try_reserve(15, t0).unwrap();
		assert_eq!(reserved_after, 985);
		assert!(fc.observe_reply(985, reserved_after, t0, t0).is_ok());
		assert_eq!(fc.server_buffer_estimate(), 985);
	}
}
