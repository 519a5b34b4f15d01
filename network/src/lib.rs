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

//! Wire-level types for the light-client retrieval protocol.
//!
//! This crate only describes shapes: peer identity, handshake and
//! announcement payloads, message kinds and their RLP encodings, and the
//! small set of traits (`Handler`, `NetworkContext`, `MessageChannel`) a
//! transport implementation must satisfy. It does not open a socket,
//! frame a stream, run discovery, or implement any cryptography — all of
//! that is external to this workspace (see `spec.md` §1).

extern crate ethereum_types;
extern crate rlp;
extern crate parity_bytes;
extern crate smallvec;
extern crate keccak_hash;
#[macro_use]
extern crate error_chain;

pub mod error;
pub mod ids;
pub mod header;
pub mod capabilities;
pub mod status;
pub mod announcement;
pub mod messages;
pub mod node_record;
pub mod context;

pub use ids::{NodeId, PeerId, ReqId};
pub use header::{Header, Body, Receipt, LogEntry};
pub use capabilities::Capabilities;
pub use status::{Status, Checkpoint};
pub use announcement::Announcement;
pub use messages::{MessageKind, Cost, CostTable, Request, Response, Reply, TxInclusion};
pub use node_record::NodeRecord;
pub use context::{Handler, BasicContext, EventContext, NetworkError, PeerStatus};
