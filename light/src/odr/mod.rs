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

//! On-demand database façade (spec.md §4.6).
//!
//! `Odr` is the only thing most callers touch: hand it a typed request and
//! a deadline, get back a verified value, with a transparent `LocalStore`
//! cache in front of the network round-trip.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ethereum_types::H256;
use parity_bytes::Bytes;

use chain::HeaderChain;
use error::{Error, ErrorKind};
use retrieve::RetrieveManager;
use store::{self, LocalStore, COL_CHAIN_DATA};
use lc_network::Response;

pub mod request;
pub mod cht;

pub use self::request::{CheckedRequest, Verified, CacheKey};

/// The on-demand database façade described by spec.md §4.6.
pub struct Odr {
	chain: Arc<HeaderChain>,
	store: LocalStore,
	retrieve: Arc<RetrieveManager>,
}

impl Odr {
	pub fn new(chain: Arc<HeaderChain>, store: LocalStore, retrieve: Arc<RetrieveManager>) -> Self {
		Odr { chain, store, retrieve }
	}

	/// Resolve one typed request, either from the local cache or by
	/// retrieving and verifying it from the network (spec.md §4.6, steps
	/// 1-3).
	pub fn retrieve(&self, request: CheckedRequest, timeout: Duration) -> Result<Verified, Error> {
		let key = request.cache_key();

		if let Some(cached) = self.cached(&key) {
			return Ok(cached);
		}

		let deadline = Instant::now() + timeout;
		let wire = request.to_wire();
		let chain = self.chain.clone();
		let store_for_verify = self.store.clone();
		let request_for_verify = request.clone();

		let verified = self.retrieve.retrieve(wire, deadline, None, move |_peer, reply| {
			request_for_verify.verify(&*chain, &store_for_verify, &reply.response)
		})?;

		self.cache(&key, &verified)?;
		Ok(verified)
	}

	fn cached(&self, key: &CacheKey) -> Option<Verified> {
		let bytes = store::get(&self.store, COL_CHAIN_DATA, &key.to_bytes()).ok()??;
		decode_cached(key, &bytes)
	}

	fn cache(&self, key: &CacheKey, value: &Verified) -> Result<(), Error> {
		store::put(&self.store, COL_CHAIN_DATA, &key.to_bytes(), &value.to_bytes())
			.map_err(|e| ErrorKind::Store(e).into())
	}

	/// Fetch a header by number, using the CHT to verify it (spec.md
	/// §4.6, "header-by-number"). If the local chain doesn't already
	/// know this number's hash directly, the CHT leaf covering it is
	/// fetched and proven first (`ensure_cht_section`) — without this,
	/// `verify_header_against_chain` would have nothing to verify the
	/// reply against and the request could never succeed.
	pub fn header_by_number(&self, number: u64, timeout: Duration) -> Result<::lc_network::Header, Error> {
		let key = CheckedRequest::HeaderByNumber(number).cache_key();
		if let Some(Verified::Header(header)) = self.cached(&key) {
			return Ok(header);
		}

		if self.chain.hash_of_number(number).is_none() {
			self.ensure_cht_section(number, timeout)?;
		}

		match self.retrieve(CheckedRequest::HeaderByNumber(number), timeout)? {
			Verified::Header(header) => Ok(header),
			_ => unreachable!("CheckedRequest::HeaderByNumber only ever verifies to Verified::Header"),
		}
	}

	pub fn body_by_hash(&self, hash: H256, timeout: Duration) -> Result<::lc_network::Body, Error> {
		match self.retrieve(CheckedRequest::BodyByHash(hash), timeout)? {
			Verified::Body(body) => Ok(body),
			_ => unreachable!("CheckedRequest::BodyByHash only ever verifies to Verified::Body"),
		}
	}

	pub fn code_by_hash(&self, code_hash: H256, timeout: Duration) -> Result<Bytes, Error> {
		match self.retrieve(CheckedRequest::CodeByHash(code_hash), timeout)? {
			Verified::Code(bytes) => Ok(bytes),
			_ => unreachable!("CheckedRequest::CodeByHash only ever verifies to Verified::Code"),
		}
	}

	/// Resolve the CHT leaf covering `number`, fetching and verifying a
	/// `HelperTrieProof` if it isn't already cached — the background
	/// indexer's job, run here inline on first use (spec.md §4.6, "Odr
	/// also coordinates two auxiliary indexers").
	pub fn ensure_cht_section(&self, number: u64, timeout: Duration) -> Result<cht::SectionEntry, Error> {
		if let Some(entry) = cht::cached_entry(&self.store, number) {
			return Ok(entry);
		}

		let root = self.chain.cht_root_for(number)
			.ok_or_else(|| Error::from(ErrorKind::Store(format!("no CHT root known for section {}", cht::section_index(number)))))?;

		let deadline = Instant::now() + timeout;
		let request = ::lc_network::Request::HelperTrieProof { helper_root: root, key: cht_leaf_key(number) };

		let proof = self.retrieve.retrieve(request, deadline, None, move |_peer, reply| {
			match reply.response {
				Response::HelperTrieProof(ref nodes) => Ok(nodes.clone()),
				_ => Err("expected a HelperTrieProof reply".to_string()),
			}
		})?;

		cht::verify_and_cache_leaf(&*self.chain, &self.store, number, &proof).map_err(|e| ErrorKind::Store(e).into())
	}
}

fn cht_leaf_key(number: u64) -> Bytes {
	let mut stream = ::rlp::RlpStream::new();
	stream.append(&number);
	stream.out()
}

/// Reverse `Verified::to_bytes` for each cache key shape. Kept alongside
/// `to_bytes` rather than as a `Decodable` impl on `Verified` itself,
/// since which variant to expect is determined by the key, not the bytes.
fn decode_cached(key: &CacheKey, bytes: &[u8]) -> Option<Verified> {
	Some(match *key {
		CacheKey::HeaderByNumber(_) => Verified::Header(::rlp::decode(bytes)),
		CacheKey::BodyByHash(_) => Verified::Body(::rlp::decode(bytes)),
		CacheKey::ReceiptsByHash(_) => Verified::Receipts(::rlp::decode_list(bytes)),
		CacheKey::StateValue { .. } => Verified::StateProof(::rlp::decode_list(bytes)),
		CacheKey::Code(_) => Verified::Code(bytes.to_vec()),
		CacheKey::TxStatus(_) => Verified::TransactionStatus(decode_tx_status(bytes)),
	})
}

fn decode_tx_status(bytes: &[u8]) -> Option<::lc_network::TxInclusion> {
	if bytes.is_empty() {
		return None;
	}
	let rlp = ::rlp::Rlp::new(bytes);
	Some(::lc_network::TxInclusion {
		block_hash: rlp.val_at(0).ok()?,
		block_number: rlp.val_at(1).ok()?,
		proof: rlp.iter().skip(2).map(|item| item.as_val().ok()).collect::<Option<Vec<_>>>()?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use ethereum_types::U256;
	use lc_network::Header;
	use peer_set::PeerSet;
	use distributor::RequestDistributor;

	struct StubChain;
	impl HeaderChain for StubChain {
		fn validate_headers(&self, _headers: &[Header]) -> Result<(), String> { Ok(()) }
		fn hash_of_number(&self, _number: u64) -> Option<H256> { None }
		fn header_by_hash(&self, _hash: H256) -> Option<Header> { None }
		fn head(&self) -> (H256, u64, U256) { (H256::zero(), 0, U256::zero()) }
		fn cht_root_for(&self, _number: u64) -> Option<H256> { None }
	}

	fn sample_code_bytes() -> Bytes {
		b"deadbeef".to_vec()
	}

	#[test]
	fn cache_round_trips_code() {
		let store = store::memory_store();
		let key = CacheKey::Code(H256::repeat_byte(2));
		let value = Verified::Code(sample_code_bytes());
		store::put(&store, COL_CHAIN_DATA, &key.to_bytes(), &value.to_bytes()).unwrap();

		let reloaded = decode_cached(&key, &store::get(&store, COL_CHAIN_DATA, &key.to_bytes()).unwrap().unwrap());
		assert_eq!(reloaded, Some(value));
	}

	#[test]
	fn ensure_cht_section_fails_fast_without_a_known_root() {
		let store = store::memory_store();
		let peer_set = Arc::new(PeerSet::new(4));
		let distributor = RequestDistributor::new(peer_set.clone(), 8);
		let retrieve = RetrieveManager::new(distributor, peer_set);
		let odr = Odr::new(Arc::new(StubChain), store, retrieve);

		// StubChain never knows a CHT root, so this must fail without
		// ever attempting a network round-trip.
		assert!(odr.ensure_cht_section(99, Duration::from_millis(10)).is_err());
	}
}
