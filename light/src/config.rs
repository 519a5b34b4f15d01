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

//! Recognized configuration (spec.md §6). Loading this from a file or CLI
//! flags is out of scope here; this is the data shape plus a sane
//! default and a validation pass.

use lc_network::NodeRecord;

/// Trusted starting point for syncing headers without downloading the
/// full chain, identified by a CHT section index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedCheckpoint {
	pub section_index: u64,
	#[serde(with = "hex_h256")]
	pub section_head: [u8; 32],
	#[serde(with = "hex_h256")]
	pub cht_root: [u8; 32],
	#[serde(with = "hex_h256")]
	pub bloom_root: [u8; 32],
}

mod hex_h256 {
	use serde::{Serializer, Deserializer, Deserialize};

	pub fn serialize<S: Serializer>(v: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&format!("0x{}", v.iter().map(|b| format!("{:02x}", b)).collect::<String>()))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
		use serde::de::Error;
		let s = String::deserialize(d)?;
		let s = s.trim_start_matches("0x");
		if s.len() != 64 {
			return Err(D::Error::custom("expected 32-byte hex string"));
		}
		let mut out = [0u8; 32];
		for i in 0..32 {
			out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(D::Error::custom)?;
		}
		Ok(out)
	}
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
	pub network_id: u64,
	pub bootnodes: Vec<NodeRecordConfig>,
	pub discovery_urls: Vec<String>,
	pub trusted_checkpoint: Option<TrustedCheckpoint>,
	pub ultra_light_servers: Vec<String>,
	pub ultra_light_fraction: u8,
	pub max_peers: usize,
	pub no_prune: bool,
}

/// A serializable stand-in for `NodeRecord`, which carries a non-`serde`
/// `NodeId`; converted via `to_node_record` once a real key type is
/// available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecordConfig {
	pub id_hex: String,
	pub endpoint: String,
}

impl Config {
	/// Check the invariants this spec requires of a config before it is
	/// handed to `Client::init`.
	pub fn validate(&self) -> Result<(), String> {
		if self.ultra_light_fraction > 100 {
			return Err("ultra_light_fraction must be a percentage in 0..=100".into());
		}
		if self.max_peers == 0 {
			return Err("max_peers must be at least 1".into());
		}
		Ok(())
	}
}

impl Default for Config {
	fn default() -> Self {
		Config {
			network_id: 1,
			bootnodes: Vec::new(),
			discovery_urls: Vec::new(),
			trusted_checkpoint: None,
			ultra_light_servers: Vec::new(),
			ultra_light_fraction: 100,
			max_peers: 32,
			no_prune: false,
		}
	}
}

/// Best-effort conversion from the config's hex-encoded placeholder to a
/// real `NodeRecord`. Fails if the hex doesn't decode to a 64-byte id.
pub fn to_node_record(cfg: &NodeRecordConfig) -> Result<NodeRecord, String> {
	let hex = cfg.id_hex.trim_start_matches("0x");
	if hex.len() != 128 {
		return Err(format!("node id {} is not 64 bytes of hex", cfg.id_hex));
	}
	let mut bytes = [0u8; 64];
	for i in 0..64 {
		bytes[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|e| e.to_string())?;
	}
	Ok(NodeRecord::new(::ethereum_types::H512::from(bytes), cfg.endpoint.clone(), 0))
}
