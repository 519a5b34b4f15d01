//! What a peer claims it can serve.

use announcement::Announcement;

/// Capability flags advertised by a server at handshake and refreshed by
/// later `Announce` messages, for example after the server prunes old
/// history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
	/// Whether the peer serves any headers at all.
	pub serve_headers: bool,
	/// The earliest block number for which the peer serves full bodies
	/// and receipts, or `None` if it serves none.
	pub serve_chain_since: Option<u64>,
	/// The earliest block number for which the peer serves state and
	/// code lookups, or `None` if it serves none.
	pub serve_state_since: Option<u64>,
	/// Whether the peer relays transactions submitted to it.
	pub tx_relay: bool,
}

impl Capabilities {
	/// Whether this set of capabilities covers everything `request`
	/// needs.
	pub fn can_fulfill(&self, request: &Capabilities) -> bool {
		let can_serve_since = |req: Option<u64>, local: Option<u64>| match (req, local) {
			(Some(block), Some(since)) => block >= since,
			(Some(_), None) => false,
			(None, _) => true,
		};

		self.serve_headers >= request.serve_headers &&
			can_serve_since(request.serve_chain_since, self.serve_chain_since) &&
			can_serve_since(request.serve_state_since, self.serve_state_since)
	}

	/// Apply capability changes carried in an announcement, if any.
	pub fn update_from(&mut self, announcement: &Announcement) {
		if let Some(serve_headers) = announcement.update_serve_headers {
			self.serve_headers = serve_headers;
		}
		if let Some(since) = announcement.update_serve_chain_since {
			self.serve_chain_since = Some(since);
		}
		if let Some(since) = announcement.update_serve_state_since {
			self.serve_state_since = Some(since);
		}
	}
}

impl Default for Capabilities {
	fn default() -> Self {
		Capabilities {
			serve_headers: false,
			serve_chain_since: None,
			serve_state_since: None,
			tx_relay: false,
		}
	}
}
