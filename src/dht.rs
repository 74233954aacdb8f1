//! Kademlia routing for trackerless peer discovery (BEP-5).
//!
//! Only the data structures live here: 160-bit ids with the XOR metric and
//! the splitting-bucket routing table. The RPC layer (ping, find_node,
//! get_peers) runs in the host's DHT task and drives the table through
//! [`RoutingTable::add`] / `mark_seen` / `mark_failed`; wrap the table in
//! [`SharedRoutingTable`] when that task shares it.

mod node;
mod routing;

pub use node::{Distance, Node, NodeId};
pub use routing::{Bucket, InsertOutcome, RoutingTable, SharedRoutingTable};
