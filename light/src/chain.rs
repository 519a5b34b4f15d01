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

//! The external collaborator that knows how to validate and index
//! headers. Consensus rules, state transition, and transaction execution
//! all live behind this trait and are out of scope here (spec.md §1).

use ethereum_types::H256;
use lc_network::Header;

/// A minimal view onto a locally-validated header chain.
pub trait HeaderChain: Send + Sync {
	/// Validate `headers` as a contiguous sequence extending (or
	/// side-chaining from) the local chain. Returns an error description
	/// on the first header that fails validation.
	fn validate_headers(&self, headers: &[Header]) -> Result<(), String>;

	/// Map a block number to its canonical hash, if known locally.
	fn hash_of_number(&self, number: u64) -> Option<H256>;

	/// Map a hash to its header, if known locally.
	fn header_by_hash(&self, hash: H256) -> Option<Header>;

	/// The current local head (hash, number, total difficulty).
	fn head(&self) -> (H256, u64, ::ethereum_types::U256);

	/// The root of the canonical hash trie section covering `number`, if
	/// the local chain has synced far enough to know it.
	fn cht_root_for(&self, number: u64) -> Option<H256>;
}
