//! Cluster participation: lease-backed self-registration, the membership
//! view of live peers, and the client used to reach them.

pub mod lease;
pub mod member;
pub mod peer;

pub use lease::LeaseRegistry;
pub use member::{Member, MemberChangeEvent, MemberChangeType, ServerMemberManager};
pub use peer::{HttpPeerClient, PeerClient};

/// Prefix under which every node registers its internal RPC address.
pub const SERVER_KEY_PREFIX: &str = "/pombo/servers/";
