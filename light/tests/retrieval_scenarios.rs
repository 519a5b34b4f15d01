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

//! End-to-end scenarios driving `Client`/`Odr` through a fake transport,
//! matching the six walkthroughs in spec.md §8.

extern crate ethcore_light;
extern crate lc_network;
extern crate ethereum_types;
extern crate kvdb_memorydb;
extern crate rlp;
extern crate keccak_hash;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ethereum_types::{H256, H512, U256};
use lc_network::{
	BasicContext, Capabilities, Checkpoint, CostTable, Cost, EventContext, Handler, Header,
	MessageKind, NetworkError, NodeId, PeerId, Reply, ReqId, Request, Response, Status,
};

use ethcore_light::{Client, Config, ErrorKind, HeaderChain};
use ethcore_light::odr::cht::SectionEntry;

struct TestChain {
	hashes: Mutex<HashMap<u64, H256>>,
	cht_roots: Mutex<HashMap<u64, H256>>,
}

impl TestChain {
	fn new() -> Self {
		TestChain { hashes: Mutex::new(HashMap::new()), cht_roots: Mutex::new(HashMap::new()) }
	}

	fn set_hash(&self, number: u64, hash: H256) {
		self.hashes.lock().unwrap().insert(number, hash);
	}

	fn set_cht_root(&self, number: u64, root: H256) {
		self.cht_roots.lock().unwrap().insert(number, root);
	}
}

impl HeaderChain for TestChain {
	fn validate_headers(&self, _headers: &[Header]) -> Result<(), String> { Ok(()) }
	fn hash_of_number(&self, number: u64) -> Option<H256> { self.hashes.lock().unwrap().get(&number).cloned() }
	fn header_by_hash(&self, _hash: H256) -> Option<Header> { None }
	fn head(&self) -> (H256, u64, U256) { (H256::zero(), 0, U256::zero()) }
	fn cht_root_for(&self, number: u64) -> Option<H256> { self.cht_roots.lock().unwrap().get(&number).cloned() }
}

/// The trie key a CHT binds a block number under, matching
/// `light::odr::cht`'s private `leaf_key` (keccak of the number's RLP
/// encoding).
fn cht_leaf_trie_key(number: u64) -> H256 {
	let mut stream = ::rlp::RlpStream::new();
	stream.append(&number);
	::keccak_hash::keccak(stream.out())
}

/// Builds the single-leaf Merkle proof a trie with exactly one entry
/// reduces to: one leaf node whose hex-prefix-encoded path is the whole
/// key (nothing to branch against), value appended verbatim. Returns
/// the node's root hash and its RLP bytes (the one-element proof list
/// `Odr::ensure_cht_section` expects back in a `HelperTrieProof` reply).
fn single_leaf_proof(key: H256, value: &[u8]) -> (H256, Vec<u8>) {
	let mut path = vec![0x20u8]; // hex-prefix: even nibble count, leaf
	path.extend_from_slice(key.as_bytes());

	let mut stream = ::rlp::RlpStream::new_list(2);
	stream.append(&path);
	stream.append(&value.to_vec());
	let node = stream.out();
	let root = ::keccak_hash::keccak(&node);
	(root, node)
}

/// Records every request a `Client` hands it and lets the test script
/// reply, disconnect, or report a peer on cue.
struct FakeTransport {
	next_req_id: AtomicU64,
	sent: Mutex<Vec<(PeerId, ReqId, Request)>>,
	disconnected: Mutex<Vec<PeerId>>,
	reported: Mutex<Vec<(PeerId, String)>>,
	node_ids: Mutex<HashMap<PeerId, NodeId>>,
}

impl FakeTransport {
	fn new() -> Arc<Self> {
		Arc::new(FakeTransport {
			next_req_id: AtomicU64::new(1),
			sent: Mutex::new(Vec::new()),
			disconnected: Mutex::new(Vec::new()),
			reported: Mutex::new(Vec::new()),
			node_ids: Mutex::new(HashMap::new()),
		})
	}

	fn register_node(&self, peer: PeerId, node: NodeId) {
		self.node_ids.lock().unwrap().insert(peer, node);
	}

	/// Block until at least `count` requests have been sent, returning the
	/// `count`-th one (1-indexed). `None` on timeout.
	fn wait_for_request(&self, count: usize, timeout: Duration) -> Option<(PeerId, ReqId, Request)> {
		let deadline = Instant::now() + timeout;
		loop {
			{
				let sent = self.sent.lock().unwrap();
				if sent.len() >= count {
					return sent.get(count - 1).cloned();
				}
			}
			if Instant::now() >= deadline {
				return None;
			}
			thread::sleep(Duration::from_millis(10));
		}
	}

	fn disconnected_peers(&self) -> Vec<PeerId> {
		self.disconnected.lock().unwrap().clone()
	}

	fn reported_peers(&self) -> Vec<PeerId> {
		self.reported.lock().unwrap().iter().map(|&(p, _)| p).collect()
	}
}

impl BasicContext for FakeTransport {
	fn request_from(&self, peer: PeerId, request: Request) -> Result<ReqId, NetworkError> {
		let req_id = ReqId(self.next_req_id.fetch_add(1, Ordering::SeqCst));
		self.sent.lock().unwrap().push((peer, req_id, request));
		Ok(req_id)
	}

	fn persistent_peer_id(&self, peer: PeerId) -> Option<NodeId> {
		self.node_ids.lock().unwrap().get(&peer).cloned()
	}

	fn disconnect_peer(&self, peer: PeerId) {
		self.disconnected.lock().unwrap().push(peer);
	}

	fn report_peer(&self, peer: PeerId, reason: &str) {
		self.reported.lock().unwrap().push((peer, reason.to_string()));
	}
}

struct Ctx {
	peer: PeerId,
	transport: Arc<FakeTransport>,
}

impl EventContext for Ctx {
	fn peer(&self) -> PeerId { self.peer }
	fn as_basic(&self) -> &BasicContext { &*self.transport }
}

fn header(number: u64, salt: u8) -> Header {
	Header {
		parent_hash: H256::repeat_byte(salt),
		number,
		total_difficulty: U256::zero(),
		state_root: H256::zero(),
		body_hash: H256::zero(),
		receipts_root: H256::zero(),
		transactions_root: H256::zero(),
		extra_data: Vec::new(),
	}
}

fn status_with(head_number: u64, buffer_limit: u64, min_recharge: u64, cost_table: CostTable) -> Status {
	Status {
		protocol_version: 2,
		network_id: 1,
		genesis_hash: H256::zero(),
		head_hash: H256::zero(),
		head_number,
		head_td: U256::zero(),
		checkpoint: None::<Checkpoint>,
		buffer_limit,
		min_recharge,
		cost_table,
	}
}

fn connect_peer(client: &Client, transport: &Arc<FakeTransport>, peer: PeerId, status: Status) {
	transport.register_node(peer, H512::repeat_byte(peer as u8 + 1));
	let ctx = Ctx { peer, transport: transport.clone() };
	let outcome = client.on_connect(&ctx, &status, &Capabilities { serve_headers: true, serve_chain_since: Some(0), serve_state_since: Some(0), tx_relay: false });
	assert_eq!(outcome, ::lc_network::PeerStatus::Kept, "peer {} was not accepted", peer);
}

fn new_client(chain: Arc<TestChain>) -> (Arc<Client>, Arc<FakeTransport>) {
	let store = Arc::new(::kvdb_memorydb::create(ethcore_light::store::NUM_COLUMNS)) as ethcore_light::store::LocalStore;
	let client = Client::init(Config::default(), chain, store, H256::zero()).unwrap();
	let transport = FakeTransport::new();
	client.start(transport.clone());
	(client, transport)
}

/// Scenario 1: a single capable peer answers correctly; the retrieval
/// succeeds and the verified header is returned.
#[test]
fn header_retrieval_succeeds_against_a_single_honest_peer() {
	let chain = Arc::new(TestChain::new());
	let want = header(42, 1);
	chain.set_hash(42, want.hash());

	let (client, transport) = new_client(chain);
	connect_peer(&client, &transport, 0, status_with(1000, 1000, 10, CostTable::flat(10, 5)));

	let client2 = client.clone();
	let handle = thread::spawn(move || client2.odr.header_by_number(42, Duration::from_secs(2)));

	let (peer, req_id, request) = transport.wait_for_request(1, Duration::from_secs(1)).expect("request never sent");
	assert_eq!(peer, 0);
	assert_eq!(request, Request::HeaderByNumber { number: 42 });

	let ctx = Ctx { peer, transport: transport.clone() };
	client.on_reply(&ctx, &Reply { req_id, response: Response::BlockHeader(want.clone()), buffer_value_after: 0 });

	let result = handle.join().unwrap();
	assert_eq!(result.unwrap(), want);
	client.stop();
}

/// Scenario 2: the first peer tried answers with a header that doesn't
/// verify; the request is retried against the second peer rather than
/// failing outright.
#[test]
fn verification_failure_retries_against_another_peer() {
	let chain = Arc::new(TestChain::new());
	let want = header(42, 1);
	chain.set_hash(42, want.hash());

	let (client, transport) = new_client(chain);
	connect_peer(&client, &transport, 0, status_with(1000, 1000, 10, CostTable::flat(10, 5)));
	connect_peer(&client, &transport, 1, status_with(1000, 1000, 10, CostTable::flat(10, 5)));

	let client2 = client.clone();
	let handle = thread::spawn(move || client2.odr.header_by_number(42, Duration::from_secs(3)));

	let (first_peer, first_req, _) = transport.wait_for_request(1, Duration::from_secs(1)).expect("first request never sent");
	let wrong = header(42, 9); // same number, different hash
	let ctx = Ctx { peer: first_peer, transport: transport.clone() };
	client.on_reply(&ctx, &Reply { req_id: first_req, response: Response::BlockHeader(wrong), buffer_value_after: 0 });

	let (second_peer, second_req, _) = transport.wait_for_request(2, Duration::from_secs(2)).expect("retry never dispatched");
	assert_ne!(second_peer, first_peer);

	let ctx2 = Ctx { peer: second_peer, transport: transport.clone() };
	client.on_reply(&ctx2, &Reply { req_id: second_req, response: Response::BlockHeader(want.clone()), buffer_value_after: 0 });

	let result = handle.join().unwrap();
	assert_eq!(result.unwrap(), want);
	client.stop();
}

/// Scenario 3: every connected peer's head is behind the requested
/// block number. No amount of waiting would help, so the request must
/// fail fast rather than sit out its full deadline or the inactivity
/// window.
#[test]
fn no_capable_peer_fails_fast_instead_of_waiting_out_the_deadline() {
	let chain = Arc::new(TestChain::new());
	let (client, transport) = new_client(chain);

	for peer in 0..3 {
		connect_peer(&client, &transport, peer, status_with(50, 1000, 10, CostTable::flat(10, 5)));
	}

	let start = Instant::now();
	let result = client.odr.header_by_number(200, Duration::from_secs(5));
	let elapsed = start.elapsed();

	match result {
		Err(ref e) => match *e.kind() {
			ErrorKind::NoPeers => {}
			ref other => panic!("expected NoPeers, got {:?}", other),
		},
		Ok(_) => panic!("expected failure, request should have been unanswerable"),
	}
	assert!(elapsed < Duration::from_secs(1), "took {:?}, should have failed almost immediately", elapsed);
	client.stop();
}

/// Scenario 4: the only peer's buffer is too low to afford the request
/// right now. The distributor must wait for it to recharge rather than
/// failing, and the wait must be at least as long as the flow-control
/// math requires.
#[test]
fn insufficient_buffer_delays_dispatch_until_recharged() {
	let chain = Arc::new(TestChain::new());
	let want = header(7, 3);
	chain.set_hash(7, want.hash());

	let mut costs = HashMap::new();
	costs.insert(MessageKind::GetCode, Cost { base: 95, per_item: 0 });
	costs.insert(MessageKind::GetBlockHeaders, Cost { base: 20, per_item: 0 });
	let cost_table = CostTable::new(costs);

	let (client, transport) = new_client(chain);
	connect_peer(&client, &transport, 0, status_with(1000, 100, 10, cost_table));

	// drain the peer's buffer from 100 down to 5 with a throwaway request;
	// its own outcome doesn't matter, only that it reserves 95 units.
	let client_priming = client.clone();
	let _ = thread::spawn(move || client_priming.odr.code_by_hash(H256::repeat_byte(9), Duration::from_millis(200)));
	transport.wait_for_request(1, Duration::from_secs(1)).expect("priming request never sent");

	let start = Instant::now();
	let client2 = client.clone();
	let handle = thread::spawn(move || client2.odr.header_by_number(7, Duration::from_secs(5)));

	let (peer, req_id, request) = transport.wait_for_request(2, Duration::from_secs(4)).expect("header request never dispatched");
	let elapsed = start.elapsed();
	assert_eq!(request, Request::HeaderByNumber { number: 7 });
	assert!(elapsed >= Duration::from_millis(1500), "dispatch happened after only {:?}, expected a flow-control wait", elapsed);

	let ctx = Ctx { peer, transport: transport.clone() };
	client.on_reply(&ctx, &Reply { req_id, response: Response::BlockHeader(want.clone()), buffer_value_after: 0 });

	let result = handle.join().unwrap();
	assert_eq!(result.unwrap(), want);
	client.stop();
}

/// Scenario 5: the peer holding an in-flight request disconnects before
/// replying. The request must be requeued onto a still-connected peer
/// rather than failing.
#[test]
fn mid_flight_disconnect_requeues_onto_a_surviving_peer() {
	let chain = Arc::new(TestChain::new());
	let want = header(42, 1);
	chain.set_hash(42, want.hash());

	let (client, transport) = new_client(chain);
	connect_peer(&client, &transport, 0, status_with(1000, 1000, 10, CostTable::flat(10, 5)));
	connect_peer(&client, &transport, 1, status_with(1000, 1000, 10, CostTable::flat(10, 5)));

	let client2 = client.clone();
	let handle = thread::spawn(move || client2.odr.header_by_number(42, Duration::from_secs(3)));

	let (first_peer, _, _) = transport.wait_for_request(1, Duration::from_secs(1)).expect("first request never sent");
	let ctx = Ctx { peer: first_peer, transport: transport.clone() };
	client.on_disconnect(&ctx, &[]);

	let (second_peer, second_req, _) = transport.wait_for_request(2, Duration::from_secs(2)).expect("retry never dispatched");
	assert_ne!(second_peer, first_peer);

	let ctx2 = Ctx { peer: second_peer, transport: transport.clone() };
	client.on_reply(&ctx2, &Reply { req_id: second_req, response: Response::BlockHeader(want.clone()), buffer_value_after: 0 });

	let result = handle.join().unwrap();
	assert_eq!(result.unwrap(), want);
	client.stop();
}

/// Scenario 6: a peer's reply claims a buffer credit the flow-control
/// math says is impossible. The connection must be flagged as a
/// protocol violation and torn down, and the request must move on to
/// another peer rather than completing against the untrusted reply.
#[test]
fn byzantine_credit_claim_disconnects_and_requeues() {
	let chain = Arc::new(TestChain::new());
	let want = header(42, 1);
	chain.set_hash(42, want.hash());

	let (client, transport) = new_client(chain);
	connect_peer(&client, &transport, 0, status_with(1000, 1000, 10, CostTable::flat(10, 5)));
	connect_peer(&client, &transport, 1, status_with(1000, 1000, 10, CostTable::flat(10, 5)));

	let client2 = client.clone();
	let handle = thread::spawn(move || client2.odr.header_by_number(42, Duration::from_secs(3)));

	let (first_peer, first_req, _) = transport.wait_for_request(1, Duration::from_secs(1)).expect("first request never sent");
	let ctx = Ctx { peer: first_peer, transport: transport.clone() };
	// otherwise-correct header, but an impossible buffer claim.
	client.on_reply(&ctx, &Reply { req_id: first_req, response: Response::BlockHeader(want.clone()), buffer_value_after: 1_000_000 });

	assert_eq!(transport.disconnected_peers(), vec![first_peer]);
	assert_eq!(transport.reported_peers(), vec![first_peer]);

	let (second_peer, second_req, _) = transport.wait_for_request(2, Duration::from_secs(2)).expect("retry never dispatched");
	assert_ne!(second_peer, first_peer);

	let ctx2 = Ctx { peer: second_peer, transport: transport.clone() };
	client.on_reply(&ctx2, &Reply { req_id: second_req, response: Response::BlockHeader(want.clone()), buffer_value_after: 0 });

	let result = handle.join().unwrap();
	assert_eq!(result.unwrap(), want);
	client.stop();
}

/// Scenario 7: the chain doesn't know block 5000's hash directly, so
/// `header_by_number` must first fetch and verify a `HelperTrieProof`
/// binding it to a trusted CHT root (`ensure_cht_section`) before the
/// header itself can verify against the now-cached leaf.
#[test]
fn on_demand_cht_proof_verifies_a_header_the_chain_does_not_know_directly() {
	let chain = Arc::new(TestChain::new());
	let want = header(5000, 4);

	let entry = SectionEntry { hash: want.hash(), total_difficulty: U256::from(77) };
	let entry_bytes = ::rlp::encode(&entry);
	let (root, proof_node) = single_leaf_proof(cht_leaf_trie_key(5000), &entry_bytes);
	chain.set_cht_root(5000, root);

	let (client, transport) = new_client(chain);
	connect_peer(&client, &transport, 0, status_with(10_000, 1000, 10, CostTable::flat(10, 5)));

	let client2 = client.clone();
	let handle = thread::spawn(move || client2.odr.header_by_number(5000, Duration::from_secs(3)));

	let (peer, req_id, request) = transport.wait_for_request(1, Duration::from_secs(1)).expect("CHT proof request never sent");
	match request {
		Request::HelperTrieProof { helper_root, .. } => assert_eq!(helper_root, root),
		other => panic!("expected a HelperTrieProof request, got {:?}", other),
	}
	let ctx = Ctx { peer, transport: transport.clone() };
	client.on_reply(&ctx, &Reply { req_id, response: Response::HelperTrieProof(vec![proof_node]), buffer_value_after: 0 });

	let (peer2, req_id2, request2) = transport.wait_for_request(2, Duration::from_secs(2)).expect("header request never dispatched");
	assert_eq!(request2, Request::HeaderByNumber { number: 5000 });
	let ctx2 = Ctx { peer: peer2, transport: transport.clone() };
	client.on_reply(&ctx2, &Reply { req_id: req_id2, response: Response::BlockHeader(want.clone()), buffer_value_after: 0 });

	let result = handle.join().unwrap();
	assert_eq!(result.unwrap(), want);
	client.stop();
}
