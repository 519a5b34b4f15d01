//! Protocol-violation taxonomy (spec.md §7).
//!
//! These are the faults that terminate a connection outright, as opposed
//! to `light::error::RetrievalError`, which is surfaced to callers of
//! `Odr::retrieve` without necessarily implicating any one peer.

use ids::ReqId;

error_chain! {
	errors {
		/// A reply referenced a request id the peer was never sent.
		UnknownRequestId(id: ReqId) {
			description("unknown request id")
			display("peer replied to unknown request id {}", id)
		}
		/// A reply's `buffer_value_after` exceeded what the peer could
		/// possibly have after serving this request honestly.
		BogusCredit { claimed: u64, max_possible: u64 } {
			description("bogus credit value")
			display("peer claimed buffer_value_after={} but max possible was {}", claimed, max_possible)
		}
		/// A reply payload exceeded the size the request's cost implied.
		OversizedPayload { limit: usize, actual: usize } {
			description("oversized payload")
			display("reply payload of {} bytes exceeds limit of {} bytes", actual, limit)
		}
		/// An announcement lowered total difficulty without a re-org marker.
		TdNotMonotonic { previous: String, announced: String } {
			description("total difficulty not monotonic")
			display("announced td {} is less than previous td {} with no re-org", announced, previous)
		}
		/// Handshake proposed an unsupported protocol version.
		UnsupportedVersion(version: u32) {
			description("unsupported protocol version")
			display("unsupported protocol version {}", version)
		}
		/// Handshake genesis hash, network id, or trusted checkpoint
		/// mismatched ours.
		HandshakeMismatch(reason: String) {
			description("handshake mismatch")
			display("handshake mismatch: {}", reason)
		}
	}
}
