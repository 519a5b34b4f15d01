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

//! On-demand retrieval core for a light client: flow control, request
//! dispatch, and Merkle-proof verification against a locally trusted
//! header chain. A transport implementing `lc_network`'s `Handler` seam
//! drives `Client`; discovery, consensus and execution are out of scope
//! (see `lc_network` for the wire-level types this builds on).

extern crate lc_network;
extern crate parity_bytes;
extern crate ethereum_types;
extern crate memorydb;
extern crate patricia_trie;
extern crate hashdb;
extern crate rlp;
extern crate smallvec;
extern crate rand;
extern crate bincode;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate parking_lot;
extern crate keccak_hash;
extern crate keccak_hasher;
extern crate triehash_ethereum;
extern crate kvdb;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;

#[cfg(test)]
extern crate kvdb_memorydb;
#[cfg(test)]
extern crate tempdir;

pub mod error;
pub mod chain;
pub mod store;
pub mod config;
pub mod flow_control;
pub mod value_tracker;
pub mod peer;
pub mod peer_set;
pub mod distributor;
pub mod retrieve;
pub mod odr;
pub mod server_pool;
pub mod client;

pub use error::{Error, ErrorKind};
pub use chain::HeaderChain;
pub use store::LocalStore;
pub use config::Config;
pub use client::Client;
pub use odr::{Odr, CheckedRequest, Verified};
pub use server_pool::{ServerPool, Outcome as DialOutcome};
