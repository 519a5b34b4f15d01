//! The seam between this workspace's retrieval core and an actual
//! transport. A transport implements `BasicContext`/`EventContext` and
//! drives a `Handler` on connect, disconnect, announcement, reply and a
//! periodic tick; this workspace never opens a socket itself (spec.md §1).

use std::fmt;

use capabilities::Capabilities;
use status::Status;
use announcement::Announcement;
use messages::{Request, Reply};
use ids::{PeerId, ReqId, NodeId};

/// What the transport should do with a peer after a `Handler` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
	Kept,
	Kill,
}

/// Failure to dispatch a request through the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
	/// The peer's flow-control buffer could not cover the request.
	NoCredits,
	/// The peer does not serve LES requests (e.g. it's a pure relay).
	NotServer,
	/// The peer's connection is no longer live.
	Disconnected,
	Other(String),
}

impl fmt::Display for NetworkError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			NetworkError::NoCredits => write!(f, "no credits"),
			NetworkError::NotServer => write!(f, "peer is not a server"),
			NetworkError::Disconnected => write!(f, "disconnected"),
			NetworkError::Other(ref s) => write!(f, "{}", s),
		}
	}
}

/// Operations available outside of a specific peer callback (e.g. from a
/// `tick`).
pub trait BasicContext: Send + Sync {
	/// Send `request` to `peer`, returning the id it was assigned.
	fn request_from(&self, peer: PeerId, request: Request) -> Result<ReqId, NetworkError>;
	/// The peer's durable identity, if still connected.
	fn persistent_peer_id(&self, peer: PeerId) -> Option<NodeId>;
	/// Terminate the connection to `peer`.
	fn disconnect_peer(&self, peer: PeerId);
	/// Record a protocol violation against `peer`; the transport decides
	/// whether this alone is cause for disconnection.
	fn report_peer(&self, peer: PeerId, reason: &str);
}

/// Operations available within a callback scoped to one peer.
pub trait EventContext: Send + Sync {
	fn peer(&self) -> PeerId;
	fn as_basic(&self) -> &BasicContext;
}

/// Callbacks a transport drives on a registered retrieval core.
pub trait Handler: Send + Sync {
	fn on_connect(&self, ctx: &EventContext, status: &Status, capabilities: &Capabilities) -> PeerStatus;
	fn on_disconnect(&self, ctx: &EventContext, unfulfilled: &[ReqId]);
	fn on_announcement(&self, ctx: &EventContext, announcement: &Announcement);
	fn on_reply(&self, ctx: &EventContext, reply: &Reply);
	/// A peer sent an explicit `Stop` or `Resume` message (spec.md §6).
	/// Unlike flow-control recharge, this takes effect immediately rather
	/// than on the next affordability check.
	fn on_freeze_state_change(&self, ctx: &EventContext, frozen: bool);
	/// Called periodically by the transport's event loop; used to retry
	/// dispatch of requests that were waiting on flow-control budget or a
	/// new peer.
	fn tick(&self, ctx: &BasicContext);
}
