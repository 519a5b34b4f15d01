//! Message kinds, per-kind costs, and the typed request/response payloads
//! exchanged once a connection is up (spec.md §6).

use ethereum_types::H256;
use parity_bytes::Bytes;
use std::collections::HashMap;

use header::{Header, Body, Receipt};
use ids::ReqId;

/// The kind of a wire message. `Status` and `Announce` are handled during
/// handshake/head-tracking respectively and never flow through the
/// request/response path below; the rest each have a `Get*` request and a
/// matching reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
	Status,
	Announce,
	GetBlockHeaders,
	BlockHeaders,
	GetBlockBodies,
	BlockBodies,
	GetReceipts,
	Receipts,
	GetCode,
	Code,
	GetProofs,
	Proofs,
	GetHelperTrieProofs,
	HelperTrieProofs,
	SendTx,
	GetTxStatus,
	TxStatus,
	Stop,
	Resume,
}

/// Base and per-item cost for a message kind, in abstract cost units
/// (spec.md §3, "CostTable").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cost {
	pub base: u64,
	pub per_item: u64,
}

impl Cost {
	pub fn estimate(&self, item_count: usize) -> u64 {
		self.base.saturating_add(self.per_item.saturating_mul(item_count as u64))
	}
}

/// The full per-peer cost table, received at handshake and replaceable by
/// later signed parameter updates (spec.md §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostTable(HashMap<MessageKind, Cost>);

impl CostTable {
	pub fn new(entries: HashMap<MessageKind, Cost>) -> Self {
		CostTable(entries)
	}

	/// A reasonable default for tests and for peers that haven't yet sent
	/// an explicit table.
	pub fn flat(base: u64, per_item: u64) -> Self {
		let kinds = [
			MessageKind::GetBlockHeaders, MessageKind::GetBlockBodies,
			MessageKind::GetReceipts, MessageKind::GetCode,
			MessageKind::GetProofs, MessageKind::GetHelperTrieProofs,
			MessageKind::SendTx, MessageKind::GetTxStatus,
		];
		let mut entries = HashMap::new();
		for kind in &kinds {
			entries.insert(*kind, Cost { base, per_item });
		}
		CostTable(entries)
	}

	pub fn cost_of(&self, kind: MessageKind, item_count: usize) -> Option<u64> {
		self.0.get(&kind).map(|c| c.estimate(item_count))
	}

	pub fn set(&mut self, kind: MessageKind, cost: Cost) {
		self.0.insert(kind, cost);
	}
}

/// A typed outbound request, ready to hand to a `Peer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
	HeaderByNumber { number: u64 },
	BlockBodyByHash { hash: H256 },
	ReceiptsByHash { hash: H256 },
	StateProof { state_root: H256, key: H256, storage_key: Option<H256> },
	CodeByHash { code_hash: H256 },
	TransactionStatus { tx_hash: H256 },
	HelperTrieProof { helper_root: H256, key: Bytes },
}

impl Request {
	pub fn kind(&self) -> MessageKind {
		match *self {
			Request::HeaderByNumber { .. } => MessageKind::GetBlockHeaders,
			Request::BlockBodyByHash { .. } => MessageKind::GetBlockBodies,
			Request::ReceiptsByHash { .. } => MessageKind::GetReceipts,
			Request::StateProof { .. } => MessageKind::GetProofs,
			Request::CodeByHash { .. } => MessageKind::GetCode,
			Request::TransactionStatus { .. } => MessageKind::GetTxStatus,
			Request::HelperTrieProof { .. } => MessageKind::GetHelperTrieProofs,
		}
	}

	/// Number of discrete items the cost table should multiply by; every
	/// request here addresses a single item.
	pub fn item_count(&self) -> usize {
		1
	}
}

/// A typed inbound reply, matched back to its `Request` by `ReqId`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
	BlockHeader(Header),
	BlockBody(Body),
	Receipts(Vec<Receipt>),
	/// Merkle proof nodes, innermost first.
	StateProof(Vec<Bytes>),
	Code(Bytes),
	/// `None` means the peer asserts the transaction is unknown to it.
	TransactionStatus(Option<TxInclusion>),
	HelperTrieProof(Vec<Bytes>),
}

/// Proof that a transaction is included in a specific block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInclusion {
	pub block_hash: H256,
	pub block_number: u64,
	pub proof: Vec<Bytes>,
}

/// An envelope carrying the server's post-service buffer estimate
/// alongside the reply payload (spec.md §6: "every reply carries
/// `buffer_value_after`").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
	pub req_id: ReqId,
	pub response: Response,
	pub buffer_value_after: u64,
}
