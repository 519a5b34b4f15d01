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

//! Errors surfaced to consumers of `Odr::retrieve` (spec.md §7).
//!
//! Protocol violations that terminate a peer connection live in
//! `lc_network::error`; everything here is what `RetrieveManager` can
//! report back once it has exhausted its options (or never had any).

use lc_network::ReqId;

error_chain! {
	links {
		Protocol(::lc_network::error::Error, ::lc_network::error::ErrorKind) #[doc = "an underlying protocol violation"];
	}

	errors {
		/// The request's deadline elapsed before a verified reply arrived.
		Timeout {
			description("request timed out")
			display("request timed out before a verified reply arrived")
		}
		/// No peer was, or was ever likely to become, capable of serving
		/// this request before its deadline.
		NoPeers {
			description("no capable peer")
			display("no peer capable of serving this request is available")
		}
		/// The distributor's pending-request queue is full.
		Overloaded {
			description("request queue overloaded")
			display("request queue is full; try again later")
		}
		/// Every peer that attempted this logical request gave either no
		/// answer or a conflicting one; a majority disagree on the data
		/// itself rather than any single peer being provably dishonest.
		FaultyRequest(req_id: ReqId, bad_responses: usize, total_peers: usize) {
			description("faulty request")
			display("request {} found faulty: {}/{} peers gave a bad response", req_id, bad_responses, total_peers)
		}
		/// The local key-value store failed; not attributable to any peer.
		Store(detail: String) {
			description("local store error")
			display("local store error: {}", detail)
		}
		/// The consumer cancelled the request, or dropped its receiver.
		Cancelled {
			description("request cancelled")
			display("request was cancelled")
		}
	}
}
