use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::node::{Node, NodeId};
use crate::constants::{MAX_BUCKET_NODES, MAX_BUCKET_REPLACEMENTS};

/// Result of inserting a node into the routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The node was appended to a bucket with room (possibly after splits).
    Added,
    /// A node with this id was already present; its LRU clock was refreshed.
    AlreadyPresent,
    /// The target bucket was full and non-splittable; the node went to the
    /// bucket's replacement cache.
    Rejected,
    /// The node took the slot of a dead node in a full bucket.
    Replaced,
}

/// A contiguous slice `[min, max]` of the id space.
///
/// Bounds are inclusive so that the top bucket's upper bound is
/// representable in 160 bits; together the buckets cover the whole space.
#[derive(Debug)]
pub struct Bucket {
    min: NodeId,
    max: NodeId,
    nodes: VecDeque<Node>,
    replacements: VecDeque<Node>,
}

impl Bucket {
    fn spanning(min: NodeId, max: NodeId) -> Self {
        Self {
            min,
            max,
            nodes: VecDeque::with_capacity(MAX_BUCKET_NODES),
            replacements: VecDeque::with_capacity(MAX_BUCKET_REPLACEMENTS),
        }
    }

    pub fn min(&self) -> &NodeId {
        &self.min
    }

    pub fn max(&self) -> &NodeId {
        &self.max
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.min <= *id && *id <= self.max
    }

    /// Live nodes, least-recently-seen first.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn replacement_count(&self) -> usize {
        self.replacements.len()
    }

    fn can_split(&self) -> bool {
        self.min != self.max
    }
}

/// Kademlia routing table with splitting buckets.
///
/// An ordered list of buckets partitions the id space with no gaps or
/// overlaps; exactly one bucket contains the local id and only that bucket
/// splits on overflow. Purely a data structure: liveness probing belongs to
/// the DHT RPC layer, and sharing across tasks requires external
/// synchronization (see [`SharedRoutingTable`]).
pub struct RoutingTable {
    local_id: NodeId,
    buckets: Vec<Bucket>,
    on_node_added: Option<Box<dyn FnMut(&Node) + Send>>,
}

/// The wrapper to use when the DHT task shares the table with others.
pub type SharedRoutingTable = Arc<RwLock<RoutingTable>>;

impl RoutingTable {
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            buckets: vec![Bucket::spanning(NodeId::MIN, NodeId::MAX)],
            on_node_added: None,
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// Registers a callback fired whenever a node enters a bucket.
    pub fn set_node_added_observer(&mut self, observer: Box<dyn FnMut(&Node) + Send>) {
        self.on_node_added = Some(observer);
    }

    /// Inserts a node, splitting the local-id bucket as needed.
    pub fn add(&mut self, node: Node) -> InsertOutcome {
        if node.id == self.local_id {
            return InsertOutcome::Rejected;
        }

        {
            let idx = self.bucket_index(&node.id);
            let bucket = &mut self.buckets[idx];
            if let Some(pos) = bucket.nodes.iter().position(|n| n.id == node.id) {
                // LRU refresh: move to the back as most recently seen
                if let Some(mut existing) = bucket.nodes.remove(pos) {
                    existing.touch();
                    bucket.nodes.push_back(existing);
                }
                return InsertOutcome::AlreadyPresent;
            }
        }

        loop {
            let idx = self.bucket_index(&node.id);
            let splittable =
                self.buckets[idx].contains(&self.local_id) && self.buckets[idx].can_split();

            let bucket = &mut self.buckets[idx];
            if bucket.nodes.len() < MAX_BUCKET_NODES {
                bucket.nodes.push_back(node.clone());
                if let Some(observer) = self.on_node_added.as_mut() {
                    observer(&node);
                }
                return InsertOutcome::Added;
            }

            if splittable {
                self.split(idx);
                continue;
            }

            if let Some(pos) = bucket.nodes.iter().position(Node::is_bad) {
                bucket.nodes.remove(pos);
                bucket.nodes.push_back(node.clone());
                if let Some(observer) = self.on_node_added.as_mut() {
                    observer(&node);
                }
                return InsertOutcome::Replaced;
            }

            if bucket.replacements.len() >= MAX_BUCKET_REPLACEMENTS {
                bucket.replacements.pop_front();
            }
            bucket.replacements.push_back(node);
            return InsertOutcome::Rejected;
        }
    }

    /// Removes a node, promoting the oldest replacement into its slot.
    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let idx = self.bucket_index(id);
        let bucket = &mut self.buckets[idx];
        let pos = bucket.nodes.iter().position(|n| &n.id == id)?;
        let removed = bucket.nodes.remove(pos);
        if let Some(replacement) = bucket.replacements.pop_front() {
            bucket.nodes.push_back(replacement);
        }
        removed
    }

    /// Records a failed RPC; evicts the node once past the failure
    /// threshold and a replacement exists.
    pub fn mark_failed(&mut self, id: &NodeId) {
        let idx = self.bucket_index(id);
        let dead = {
            let Some(node) = self.buckets[idx].nodes.iter_mut().find(|n| &n.id == id) else {
                return;
            };
            node.fail();
            node.is_bad()
        };
        if dead && self.buckets[idx].replacement_count() > 0 {
            trace!(node = %id, "evicting dead node");
            self.remove(id);
        }
    }

    /// Refreshes a node's LRU clock after it responded.
    pub fn mark_seen(&mut self, id: &NodeId) {
        let idx = self.bucket_index(id);
        let bucket = &mut self.buckets[idx];
        if let Some(pos) = bucket.nodes.iter().position(|n| &n.id == id) {
            if let Some(mut node) = bucket.nodes.remove(pos) {
                node.touch();
                bucket.nodes.push_back(node);
            }
        }
    }

    /// Up to `k` nodes closest to `target` by XOR distance, ascending.
    /// Ties break on the ids themselves.
    pub fn closest(&self, target: &NodeId, k: usize) -> Vec<Node> {
        let mut candidates: Vec<&Node> = self
            .buckets
            .iter()
            .flat_map(|b| b.nodes.iter())
            .collect();
        candidates.sort_by_key(|n| (n.id.distance(target), n.id));
        candidates.into_iter().take(k).cloned().collect()
    }

    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.buckets[self.bucket_index(id)]
            .nodes
            .iter()
            .find(|n| &n.id == id)
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn node_count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn clear(&mut self) {
        self.buckets = vec![Bucket::spanning(NodeId::MIN, NodeId::MAX)];
    }

    fn bucket_index(&self, id: &NodeId) -> usize {
        // the buckets partition the space, so this always finds one
        self.buckets
            .iter()
            .position(|b| b.contains(id))
            .unwrap_or(0)
    }

    /// Halves the bucket at `idx`, redistributing nodes and replacements.
    fn split(&mut self, idx: usize) {
        let bucket = &mut self.buckets[idx];
        let lower_max = bucket.min.offset_by(&bucket.max.offset_from(&bucket.min).half());
        let upper_min = lower_max.next();
        trace!(lower_max = %lower_max, "splitting bucket");

        let mut lower = Bucket::spanning(bucket.min, lower_max);
        let mut upper = Bucket::spanning(upper_min, bucket.max);

        for node in bucket.nodes.drain(..) {
            if lower.contains(&node.id) {
                lower.nodes.push_back(node);
            } else {
                upper.nodes.push_back(node);
            }
        }
        for node in bucket.replacements.drain(..) {
            if lower.contains(&node.id) {
                lower.replacements.push_back(node);
            } else {
                upper.replacements.push_back(node);
            }
        }

        self.buckets.splice(idx..=idx, [lower, upper]);
    }

    /// Checks the structural invariants, returning a description of the
    /// first violation. Used by tests and the poisoning path.
    pub fn verify_invariants(&self) -> Result<(), String> {
        if self.buckets.is_empty() {
            return Err("no buckets".into());
        }
        if self.buckets[0].min != NodeId::MIN {
            return Err("first bucket does not start at the id space minimum".into());
        }
        if self.buckets[self.buckets.len() - 1].max != NodeId::MAX {
            return Err("last bucket does not end at the id space maximum".into());
        }
        for pair in self.buckets.windows(2) {
            if pair[0].max.next() != pair[1].min {
                return Err(format!(
                    "gap or overlap between buckets at {}",
                    pair[0].max
                ));
            }
        }
        for bucket in &self.buckets {
            if bucket.len() > MAX_BUCKET_NODES {
                return Err(format!("bucket {} over capacity", bucket.min));
            }
            for node in bucket.nodes() {
                if !bucket.contains(&node.id) {
                    return Err(format!("node {} outside its bucket", node.id));
                }
            }
        }
        let holding_local = self
            .buckets
            .iter()
            .filter(|b| b.contains(&self.local_id))
            .count();
        if holding_local != 1 {
            return Err(format!("{holding_local} buckets contain the local id"));
        }
        Ok(())
    }
}
