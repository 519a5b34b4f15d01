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

//! The local key/value store, and the three logical tables kept in it
//! (spec.md §6, "Persisted state").
//!
//! `LocalStore` is `kvdb::KeyValueDB` directly — the same trait the
//! teacher crate's sibling storage crates implement against rocksdb.
//! Which concrete backend to open is a decision for the binary that
//! embeds this workspace; tests here use `kvdb-memorydb`.

use std::sync::Arc;
use kvdb::KeyValueDB;

/// Column layout. `kvdb`'s column-family model gives each logical table
/// its own namespace without prefixing keys by hand.
pub const COL_CHAIN_DATA: Option<u32> = Some(0);
pub const COL_SERVER_POOL: Option<u32> = Some(1);
pub const COL_VALUE_TRACKER: Option<u32> = Some(2);
pub const NUM_COLUMNS: u32 = 3;

/// A locally persisted store. Reads and writes are assumed non-blocking
/// (spec.md §5); a store backed by an async I/O layer would wrap this
/// behind a suspension point at the call site instead of here.
pub type LocalStore = Arc<KeyValueDB>;

/// Write a single key, wrapping the backend's error into a `String` so
/// callers don't need to depend on `kvdb`'s own error type.
pub fn put(store: &LocalStore, col: Option<u32>, key: &[u8], value: &[u8]) -> Result<(), String> {
	let mut tx = store.transaction();
	tx.put(col, key, value);
	store.write(tx).map_err(|e| e.to_string())
}

/// Read a single key.
pub fn get(store: &LocalStore, col: Option<u32>, key: &[u8]) -> Result<Option<Vec<u8>>, String> {
	store.get(col, key).map(|v| v.map(|v| v.to_vec())).map_err(|e| e.to_string())
}

#[cfg(test)]
pub fn memory_store() -> LocalStore {
	Arc::new(::kvdb_memorydb::create(NUM_COLUMNS)) as LocalStore
}
