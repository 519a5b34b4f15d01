//! Minimal block header and body shapes.
//!
//! These carry exactly the fields the retrieval core's verification
//! predicates need (spec.md §4.6): a header commits to the hash of its
//! full body encoding and to a receipts root, and is itself
//! content-addressed by its own RLP hash.

use ethereum_types::{H256, U256};
use parity_bytes::Bytes;
use rlp::{Rlp, RlpStream, Encodable, Decodable, DecoderError};
use keccak_hash::keccak;

/// A block header as carried over the wire and cached locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
	pub parent_hash: H256,
	pub number: u64,
	pub total_difficulty: U256,
	pub state_root: H256,
	/// Hash of the RLP encoding of the `Body` this header commits to.
	pub body_hash: H256,
	/// Root of the receipts trie for this block.
	pub receipts_root: H256,
	/// Root of the transaction-inclusion trie for this block.
	pub transactions_root: H256,
	pub extra_data: Bytes,
}

impl Header {
	/// The canonical hash of this header: keccak256 of its RLP encoding.
	pub fn hash(&self) -> H256 {
		keccak(self.rlp_bytes())
	}
}

impl Encodable for Header {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(8)
			.append(&self.parent_hash)
			.append(&self.number)
			.append(&self.total_difficulty)
			.append(&self.state_root)
			.append(&self.body_hash)
			.append(&self.receipts_root)
			.append(&self.transactions_root)
			.append(&self.extra_data);
	}
}

impl Decodable for Header {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 8 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(Header {
			parent_hash: rlp.val_at(0)?,
			number: rlp.val_at(1)?,
			total_difficulty: rlp.val_at(2)?,
			state_root: rlp.val_at(3)?,
			body_hash: rlp.val_at(4)?,
			receipts_root: rlp.val_at(5)?,
			transactions_root: rlp.val_at(6)?,
			extra_data: rlp.val_at(7)?,
		})
	}
}

/// A block body: the raw encoded transactions and uncle headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Body {
	pub transactions: Vec<Bytes>,
	pub uncles: Vec<Header>,
}

impl Body {
	/// Hash of this body's RLP encoding, expected to match a header's
	/// `body_hash` field.
	pub fn hash(&self) -> H256 {
		keccak(self.rlp_bytes())
	}
}

impl Encodable for Body {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(2);
		s.begin_list(self.transactions.len());
		for tx in &self.transactions {
			s.append(tx);
		}
		s.append_list(&self.uncles);
	}
}

impl Decodable for Body {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 2 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(Body {
			transactions: rlp.list_at(0)?,
			uncles: rlp.list_at(1)?,
		})
	}
}

/// A single receipt, simplified to the fields a light client needs to
/// fold into the receipts-root Merkle computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
	pub status: bool,
	pub gas_used: U256,
	pub logs_bloom: Bytes,
	pub logs: Vec<LogEntry>,
}

impl Encodable for Receipt {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(4)
			.append(&self.status)
			.append(&self.gas_used)
			.append(&self.logs_bloom)
			.append_list(&self.logs);
	}
}

impl Decodable for Receipt {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 4 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(Receipt {
			status: rlp.val_at(0)?,
			gas_used: rlp.val_at(1)?,
			logs_bloom: rlp.val_at(2)?,
			logs: rlp.list_at(3)?,
		})
	}
}

/// A single event log entry within a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
	pub address: ethereum_types::H160,
	pub topics: Vec<H256>,
	pub data: Bytes,
}

impl Encodable for LogEntry {
	fn rlp_append(&self, s: &mut RlpStream) {
		s.begin_list(3)
			.append(&self.address)
			.append_list(&self.topics)
			.append(&self.data);
	}
}

impl Decodable for LogEntry {
	fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
		if rlp.item_count()? != 3 {
			return Err(DecoderError::RlpIncorrectListLen);
		}
		Ok(LogEntry {
			address: rlp.val_at(0)?,
			topics: rlp.list_at(1)?,
			data: rlp.val_at(2)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_header(body_hash: H256) -> Header {
		Header {
			parent_hash: H256::zero(),
			number: 42,
			total_difficulty: 1000.into(),
			state_root: H256::repeat_byte(1),
			body_hash,
			receipts_root: H256::repeat_byte(2),
			transactions_root: H256::repeat_byte(3),
			extra_data: b"test".to_vec(),
		}
	}

	#[test]
	fn header_round_trips_through_rlp() {
		let header = sample_header(H256::repeat_byte(4));
		let encoded = header.rlp_bytes();
		let decoded: Header = ::rlp::decode(&encoded);
		assert_eq!(header, decoded);
	}

	#[test]
	fn body_hash_matches_header_body_hash_when_consistent() {
		let body = Body { transactions: vec![b"tx1".to_vec()], uncles: vec![] };
		let header = sample_header(body.hash());
		assert_eq!(header.body_hash, body.hash());
	}
}
