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

//! Canonical hash trie helpers (spec.md §4.6, GLOSSARY "CHT").
//!
//! A CHT section covers `SECTION_SIZE` consecutive block numbers and is
//! itself a small Merkle trie mapping number → (hash, total_difficulty),
//! rooted at a value either already known to the local `HeaderChain` or
//! proven on demand by fetching a `HelperTrieProof` and checking it
//! against the section's root (spec.md §4.6, "Odr also coordinates two
//! auxiliary indexers").
//!
//! Once a number→hash binding is proven this way it is cached in
//! `LocalStore` so later header-by-number verifications for the same
//! section become a plain lookup instead of a fresh proof fetch.

use ethereum_types::{H256, U256};
use rlp::{Rlp, RlpStream, Encodable, Decodable, DecoderError};

use chain::HeaderChain;
use lc_network::Header;
use store::{self, LocalStore, COL_CHAIN_DATA};

/// Block numbers per CHT section.
pub const SECTION_SIZE: u64 = 2048;

pub fn section_index(number: u64) -> u64 {
	number / SECTION_SIZE
}

/// The value a CHT leaf binds a block number to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntry {
	pub hash: H256,
	pub total_difficulty: U256,
}

impl Encodable for SectionEntry {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(2).append(&self.hash).append(&self.total_difficulty);
	}
}

impl Decodable for SectionEntry {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		Ok(SectionEntry { hash: rlp.val_at(0)?, total_difficulty: rlp.val_at(1)? })
	}
}

fn cache_key(number: u64) -> Vec<u8> {
	format!("cht-leaf:{}", number).into_bytes()
}

/// A previously proven leaf, if cached locally.
pub fn cached_entry(store: &LocalStore, number: u64) -> Option<SectionEntry> {
	let bytes = store::get(store, COL_CHAIN_DATA, &cache_key(number)).ok()??;
	Some(::rlp::decode(&bytes))
}

/// Record a freshly proven leaf.
fn cache_entry(store: &LocalStore, number: u64, entry: &SectionEntry) -> Result<(), String> {
	store::put(store, COL_CHAIN_DATA, &cache_key(number), &::rlp::encode(entry))
}

/// Verify a `HelperTrieProof` reply for `number`'s CHT leaf against the
/// section root known to `chain`, and cache the result in `store` on
/// success (the background indexer's job, spec.md §4.6).
pub fn verify_and_cache_leaf(
	chain: &HeaderChain,
	store: &LocalStore,
	number: u64,
	proof: &[::parity_bytes::Bytes],
) -> Result<SectionEntry, String> {
	let root = chain.cht_root_for(number)
		.ok_or_else(|| format!("no known CHT root for section {}", section_index(number)))?;

	let key = leaf_key(number);
	let value = super::request::verify_trie_proof_value(root, key, proof)?;
	let entry: SectionEntry = ::rlp::decode(&value);

	cache_entry(store, number, &entry)?;
	Ok(entry)
}

/// The trie key a CHT binds a block number under: its big-endian RLP
/// encoding, matching how the number is committed to the section's
/// ordering.
fn leaf_key(number: u64) -> H256 {
	use keccak_hash::keccak;
	let mut stream = RlpStream::new();
	stream.append(&number);
	keccak(stream.out())
}

/// Verify `header` against a number→hash binding already available —
/// either the local `HeaderChain` has synced far enough to know it
/// directly, or the CHT indexer has already proven and cached it.
pub fn verify_header_against_chain(chain: &HeaderChain, store: &LocalStore, header: &Header) -> Result<(), String> {
	if let Some(known_hash) = chain.hash_of_number(header.number) {
		return if known_hash == header.hash() {
			Ok(())
		} else {
			Err("header hash does not match the local chain's number→hash binding".into())
		};
	}

	match cached_entry(store, header.number) {
		Some(entry) if entry.hash == header.hash() => Ok(()),
		Some(_) => Err("header hash does not match the cached CHT leaf".into()),
		None => Err("no proven number\u{2192}hash binding yet; CHT indexer has not covered this section".into()),
	}
}
