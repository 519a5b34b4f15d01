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

//! Typed on-demand requests and their validation predicates (spec.md §4.6).
//!
//! Each variant knows how to turn itself into a wire `Request`, and how to
//! check a `Reply` against the local header chain once it arrives. Keeping
//! both next to each other is deliberate: the predicate is meaningless
//! without knowing exactly what was asked for.

use ethereum_types::H256;
use parity_bytes::Bytes;
use keccak_hash::keccak;

use lc_network::{self, Header, Body, Receipt, Response, TxInclusion};

use chain::HeaderChain;
use store::LocalStore;
use odr::cht;

/// A canonical key under which a verified result is cached in `LocalStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
	HeaderByNumber(u64),
	BodyByHash(H256),
	ReceiptsByHash(H256),
	StateValue { state_root: H256, key: H256, storage_key: Option<H256> },
	Code(H256),
	TxStatus(H256),
}

impl CacheKey {
	pub fn to_bytes(&self) -> Bytes {
		match *self {
			CacheKey::HeaderByNumber(n) => format!("hdr#{}", n).into_bytes(),
			CacheKey::BodyByHash(h) => format!("body:{:x}", h).into_bytes(),
			CacheKey::ReceiptsByHash(h) => format!("receipts:{:x}", h).into_bytes(),
			CacheKey::StateValue { state_root, key, storage_key } => match storage_key {
				Some(sk) => format!("state:{:x}:{:x}:{:x}", state_root, key, sk).into_bytes(),
				None => format!("state:{:x}:{:x}", state_root, key).into_bytes(),
			},
			CacheKey::Code(h) => format!("code:{:x}", h).into_bytes(),
			CacheKey::TxStatus(h) => format!("txstatus:{:x}", h).into_bytes(),
		}
	}
}

/// A typed on-demand request, independent of any wire encoding. Odr converts
/// one of these into an `lc_network::Request` plus a validation closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckedRequest {
	HeaderByNumber(u64),
	BodyByHash(H256),
	ReceiptsByHash(H256),
	StateProof { state_root: H256, key: H256, storage_key: Option<H256> },
	CodeByHash(H256),
	TransactionStatus(H256),
}

impl CheckedRequest {
	pub fn cache_key(&self) -> CacheKey {
		match *self {
			CheckedRequest::HeaderByNumber(n) => CacheKey::HeaderByNumber(n),
			CheckedRequest::BodyByHash(h) => CacheKey::BodyByHash(h),
			CheckedRequest::ReceiptsByHash(h) => CacheKey::ReceiptsByHash(h),
			CheckedRequest::StateProof { state_root, key, storage_key } => CacheKey::StateValue { state_root, key, storage_key },
			CheckedRequest::CodeByHash(h) => CacheKey::Code(h),
			CheckedRequest::TransactionStatus(h) => CacheKey::TxStatus(h),
		}
	}

	/// The wire request this typed request lowers to.
	pub fn to_wire(&self) -> lc_network::Request {
		match *self {
			CheckedRequest::HeaderByNumber(number) => lc_network::Request::HeaderByNumber { number },
			CheckedRequest::BodyByHash(hash) => lc_network::Request::BlockBodyByHash { hash },
			CheckedRequest::ReceiptsByHash(hash) => lc_network::Request::ReceiptsByHash { hash },
			CheckedRequest::StateProof { state_root, key, storage_key } => lc_network::Request::StateProof { state_root, key, storage_key },
			CheckedRequest::CodeByHash(code_hash) => lc_network::Request::CodeByHash { code_hash },
			CheckedRequest::TransactionStatus(tx_hash) => lc_network::Request::TransactionStatus { tx_hash },
		}
	}

	/// Check a reply against this request's validation predicate (spec.md
	/// §4.6's "Verification" column). `chain` supplies header lookups and
	/// the CHT root needed to verify a header-by-number proof; `store`
	/// holds any number→hash bindings the CHT indexer has already proven.
	pub fn verify(&self, chain: &HeaderChain, store: &LocalStore, response: &Response) -> Result<Verified, String> {
		match (self, response) {
			(&CheckedRequest::HeaderByNumber(number), &Response::BlockHeader(ref header)) => {
				if header.number != number {
					return Err(format!("header number {} does not match requested {}", header.number, number));
				}
				cht::verify_header_against_chain(chain, store, header)?;
				Ok(Verified::Header(header.clone()))
			}
			(&CheckedRequest::BodyByHash(hash), &Response::BlockBody(ref body)) => {
				let header = chain.header_by_hash(hash).ok_or_else(|| "no local header for body request".to_string())?;
				if body.hash() != header.body_hash {
					return Err("body hash does not match header's body_hash".into());
				}
				Ok(Verified::Body(body.clone()))
			}
			(&CheckedRequest::ReceiptsByHash(hash), &Response::Receipts(ref receipts)) => {
				let header = chain.header_by_hash(hash).ok_or_else(|| "no local header for receipts request".to_string())?;
				let root = receipts_root(receipts);
				if root != header.receipts_root {
					return Err("receipts root does not match header".into());
				}
				Ok(Verified::Receipts(receipts.clone()))
			}
			(&CheckedRequest::StateProof { state_root, key, .. }, &Response::StateProof(ref nodes)) => {
				verify_trie_proof(state_root, key, nodes)?;
				Ok(Verified::StateProof(nodes.clone()))
			}
			(&CheckedRequest::CodeByHash(code_hash), &Response::Code(ref bytes)) => {
				if keccak(bytes) != code_hash {
					return Err("code hash mismatch".into());
				}
				Ok(Verified::Code(bytes.clone()))
			}
			(&CheckedRequest::TransactionStatus(tx_hash), &Response::TransactionStatus(ref status)) => {
				match *status {
					None => Ok(Verified::TransactionStatus(None)),
					Some(ref inclusion) => {
						verify_tx_inclusion(chain, tx_hash, inclusion)?;
						Ok(Verified::TransactionStatus(Some(inclusion.clone())))
					}
				}
			}
			_ => Err("reply kind does not match request kind".into()),
		}
	}
}

/// The verified value produced by `CheckedRequest::verify`, ready to cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verified {
	Header(Header),
	Body(Body),
	Receipts(Vec<Receipt>),
	StateProof(Vec<Bytes>),
	Code(Bytes),
	TransactionStatus(Option<TxInclusion>),
}

impl Verified {
	pub fn to_bytes(&self) -> Bytes {
		match *self {
			Verified::Header(ref h) => ::rlp::encode(h),
			Verified::Body(ref b) => ::rlp::encode(b),
			Verified::Receipts(ref r) => {
				let mut stream = ::rlp::RlpStream::new_list(r.len());
				for receipt in r {
					stream.append(receipt);
				}
				stream.out()
			}
			Verified::StateProof(ref nodes) => {
				let mut stream = ::rlp::RlpStream::new_list(nodes.len());
				for node in nodes {
					stream.append(node);
				}
				stream.out()
			}
			Verified::Code(ref bytes) => bytes.clone(),
			Verified::TransactionStatus(ref status) => match *status {
				None => Vec::new(),
				Some(ref inclusion) => {
					let mut stream = ::rlp::RlpStream::new_list(3 + inclusion.proof.len());
					stream.append(&inclusion.block_hash).append(&inclusion.block_number);
					for node in &inclusion.proof {
						stream.append(node);
					}
					stream.out()
				}
			},
		}
	}
}

/// The merkle root of a list of receipts, using each receipt's RLP encoding
/// as the trie's leaf values (spec.md §4.6, "receipts-by-hash").
fn receipts_root(receipts: &[Receipt]) -> H256 {
	use rlp::Encodable;
	let encoded: Vec<Bytes> = receipts.iter().map(|r| r.rlp_bytes()).collect();
	::triehash_ethereum::ordered_trie_root(encoded)
}

/// Verify a Merkle proof for `key` under `root` and return the bound
/// value. The proof is a sequence of RLP-encoded trie nodes, exactly what
/// `patricia_trie`'s proof verifier expects once loaded into a `MemoryDB`
/// keyed by each node's own hash.
pub fn verify_trie_proof_value(root: H256, key: H256, proof: &[Bytes]) -> Result<Bytes, String> {
	use hashdb::HashDB;
	use memorydb::MemoryDB;
	use patricia_trie::{TrieDB, Trie};
	use keccak_hasher::KeccakHasher;

	let mut db = MemoryDB::<KeccakHasher>::new();
	for node in proof {
		db.insert(node);
	}

	let trie = TrieDB::new(&db, &root).map_err(|e| format!("malformed proof: {}", e))?;
	match trie.get(key.as_bytes()) {
		Ok(Some(value)) => Ok(value.to_vec()),
		Ok(None) => Err("key not present under proof root".into()),
		Err(e) => Err(format!("malformed proof: {}", e)),
	}
}

/// Verify only that `key` is present under `root`; the bound value, if
/// any use needs it, is discarded.
fn verify_trie_proof(root: H256, key: H256, proof: &[Bytes]) -> Result<(), String> {
	verify_trie_proof_value(root, key, proof).map(|_| ())
}

/// Verify that `inclusion` is a valid proof that `tx_hash` is included in
/// the block it names, rooted in that block's locally-known header.
fn verify_tx_inclusion(chain: &HeaderChain, tx_hash: H256, inclusion: &TxInclusion) -> Result<(), String> {
	let header = chain.header_by_hash(inclusion.block_hash)
		.ok_or_else(|| "no local header for claimed inclusion block".to_string())?;
	if header.number != inclusion.block_number {
		return Err("inclusion block number does not match local header".into());
	}
	verify_trie_proof(header.transactions_root, tx_hash, &inclusion.proof)
}

#[cfg(test)]
mod tests {
	use super::*;
	use ethereum_types::U256;

	struct NullChain;
	impl HeaderChain for NullChain {
		fn validate_headers(&self, _headers: &[Header]) -> Result<(), String> { Ok(()) }
		fn hash_of_number(&self, _number: u64) -> Option<H256> { None }
		fn header_by_hash(&self, _hash: H256) -> Option<Header> { None }
		fn head(&self) -> (H256, u64, U256) { (H256::zero(), 0, U256::zero()) }
		fn cht_root_for(&self, _number: u64) -> Option<H256> { None }
	}

	#[test]
	fn code_hash_mismatch_is_rejected() {
		let store = ::store::memory_store();
		let request = CheckedRequest::CodeByHash(H256::repeat_byte(9));
		let response = Response::Code(b"not the right code".to_vec());
		assert!(request.verify(&NullChain, &store, &response).is_err());
	}

	#[test]
	fn code_hash_match_is_accepted() {
		let store = ::store::memory_store();
		let bytes = b"some bytecode".to_vec();
		let hash = keccak(&bytes);
		let request = CheckedRequest::CodeByHash(hash);
		let response = Response::Code(bytes);
		assert!(request.verify(&NullChain, &store, &response).is_ok());
	}

	#[test]
	fn mismatched_reply_kind_is_rejected() {
		let store = ::store::memory_store();
		let request = CheckedRequest::CodeByHash(H256::zero());
		let response = Response::TransactionStatus(None);
		assert!(request.verify(&NullChain, &store, &response).is_err());
	}
}
