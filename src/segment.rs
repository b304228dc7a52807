//! Dislocation segments and the network that collects them into a frame's final output.

use crate::cluster::ClusterIdx;
use nalgebra::Vector3;

/// Index of a node within a [`DislocationNetwork`]'s node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub usize);

/// One endpoint of a dislocation segment: a circuit tracing one side of the defect neck.
///
/// Pairs with `opposite_node` (the segment's other endpoint) and threads into a
/// `junction_ring`, a doubly-circular list of every node endpoint meeting at the same
/// junction point. A fresh, unjoined node's ring points to itself.
#[derive(Debug, Clone)]
pub struct DislocationNode {
    /// Index into the [`crate::circuit::CircuitPool`] this node traces.
    pub circuit: crate::circuit::CircuitIdx,
    /// Segment this node belongs to.
    pub segment: SegmentIdx,
    /// The other endpoint of the same segment.
    pub opposite_node: Option<NodeIdx>,
    /// Next node around this node's junction ring.
    pub junction_ring_next: NodeIdx,
    /// Previous node around this node's junction ring.
    pub junction_ring_prev: NodeIdx,
}

/// Index of a segment within a [`DislocationNetwork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentIdx(pub usize);

/// A traced dislocation line: a polyline plus its Burgers vector and bookkeeping carried
/// through refinement, junction formation, and finalization.
#[derive(Debug, Clone)]
pub struct DislocationSegment {
    /// Stable id, equal to this segment's index in the network's arena.
    pub id: SegmentIdx,
    /// Burgers vector, expressed in `cluster`'s lattice frame.
    pub burgers_vector: Vector3<f64>,
    /// Cluster the Burgers vector is expressed in.
    pub cluster: Option<ClusterIdx>,
    /// Ordered polyline points, simulation-frame coordinates.
    pub line: Vec<Vector3<f64>>,
    /// Number of points at each end reserved for trim-back during finalization.
    pub num_preliminary_points: usize,
    /// Per-point core size along `line` (decreasing toward a tight core), if §4.E.8 ran.
    /// Invariant: `core_size.len() == line.len()` once populated.
    pub core_size: Vec<i32>,
    /// This segment's forward endpoint node.
    pub forward_node: NodeIdx,
    /// This segment's backward endpoint node.
    pub backward_node: NodeIdx,
    /// Whether this segment was absorbed into another by a two-arm junction merge.
    pub replaced_by: Option<SegmentIdx>,
    /// Whether tracing reached a closed or junction-terminated state on both ends.
    pub is_dangling: bool,
}

impl DislocationSegment {
    /// The segment's length: the sum of consecutive point distances.
    pub fn length(&self) -> f64 {
        self.line.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// Burgers vector formatted as a fractional string (§4.E.7).
    pub fn burgers_vector_string(&self) -> String {
        crate::burgers_fraction::burgers_to_fractional_string(self.burgers_vector)
    }
}

/// The complete set of dislocation segments extracted from one frame.
#[derive(Debug, Clone, Default)]
pub struct DislocationNetwork {
    segments: Vec<DislocationSegment>,
    nodes: Vec<DislocationNode>,
}

impl DislocationNetwork {
    /// Add a segment, assigning it the next id.
    pub fn push(&mut self, mut segment: DislocationSegment) -> SegmentIdx {
        let id = SegmentIdx(self.segments.len());
        segment.id = id;
        self.segments.push(segment);
        id
    }

    /// Borrow a segment.
    pub fn segment(&self, idx: SegmentIdx) -> &DislocationSegment {
        &self.segments[idx.0]
    }

    /// Mutably borrow a segment.
    pub fn segment_mut(&mut self, idx: SegmentIdx) -> &mut DislocationSegment {
        &mut self.segments[idx.0]
    }

    /// Number of segments, including any later replaced by a junction merge.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the network has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate over segments that survived to the final output (not absorbed by a merge).
    pub fn live_segments(&self) -> impl Iterator<Item = &DislocationSegment> {
        self.segments.iter().filter(|s| s.replaced_by.is_none())
    }

    /// Total line length across all live segments.
    pub fn total_length(&self) -> f64 {
        self.live_segments().map(|s| s.length()).sum()
    }

    /// Allocate a fresh node, its junction ring initially pointing to itself.
    pub fn new_node(&mut self, circuit: crate::circuit::CircuitIdx, segment: SegmentIdx) -> NodeIdx {
        let id = NodeIdx(self.nodes.len());
        self.nodes.push(DislocationNode { circuit, segment, opposite_node: None, junction_ring_next: id, junction_ring_prev: id });
        id
    }

    /// Allocate a segment's forward/backward node pair, paired as each other's opposite node.
    pub fn new_node_pair(&mut self, circuit: crate::circuit::CircuitIdx, segment: SegmentIdx) -> (NodeIdx, NodeIdx) {
        let forward = self.new_node(circuit, segment);
        let backward = self.new_node(circuit, segment);
        self.nodes[forward.0].opposite_node = Some(backward);
        self.nodes[backward.0].opposite_node = Some(forward);
        (forward, backward)
    }

    /// Borrow a node.
    pub fn node(&self, idx: NodeIdx) -> &DislocationNode {
        &self.nodes[idx.0]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, idx: NodeIdx) -> &mut DislocationNode {
        &mut self.nodes[idx.0]
    }

    /// Splice `b`'s junction ring in next to `a`'s, merging the two doubly-circular lists
    /// into one (§9 "cyclic junction_ring of nodes").
    pub fn splice_junction_ring(&mut self, a: NodeIdx, b: NodeIdx) {
        if a == b {
            return;
        }
        let a_next = self.nodes[a.0].junction_ring_next;
        let b_next = self.nodes[b.0].junction_ring_next;
        self.nodes[a.0].junction_ring_next = b_next;
        self.nodes[b_next.0].junction_ring_prev = a;
        self.nodes[b.0].junction_ring_next = a_next;
        self.nodes[a_next.0].junction_ring_prev = b;
    }

    /// Walk a node's junction ring starting at `start`, visiting each member exactly once.
    pub fn junction_ring(&self, start: NodeIdx) -> Vec<NodeIdx> {
        let mut out = vec![start];
        let mut cursor = self.nodes[start.0].junction_ring_next;
        let mut guard = 0;
        while cursor != start {
            out.push(cursor);
            cursor = self.nodes[cursor.0].junction_ring_next;
            guard += 1;
            if guard > self.nodes.len() {
                break; // defensive: malformed ring, never loop forever
            }
        }
        out
    }

    /// A segment is closed when both of its nodes' opposite-node pointers are each other (§3).
    pub fn segment_is_closed(&self, seg: SegmentIdx) -> bool {
        let s = self.segment(seg);
        self.node(s.forward_node).opposite_node == Some(s.backward_node) && self.node(s.backward_node).opposite_node == Some(s.forward_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_segment(net: &mut DislocationNetwork, line: Vec<Vector3<f64>>) -> DislocationSegment {
        let (forward, backward) = net.new_node_pair(crate::circuit::CircuitIdx(0), SegmentIdx(0));
        let core_size = vec![0; line.len()];
        DislocationSegment {
            id: SegmentIdx(0),
            burgers_vector: Vector3::new(0.5, 0.5, 0.0),
            cluster: None,
            line,
            num_preliminary_points: 0,
            core_size,
            forward_node: forward,
            backward_node: backward,
            replaced_by: None,
            is_dangling: false,
        }
    }

    #[test]
    fn test_segment_length_sums_consecutive_distances() {
        let mut net = DislocationNetwork::default();
        let seg = make_segment(&mut net, vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 0.0)]);
        assert!((seg.length() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_network_live_segments_excludes_replaced() {
        let mut net = DislocationNetwork::default();
        let seg_a = make_segment(&mut net, vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)]);
        let seg_b = make_segment(&mut net, vec![Vector3::zeros(), Vector3::new(2.0, 0.0, 0.0)]);
        let a = net.push(seg_a);
        let _b = net.push(seg_b);
        net.segment_mut(a).replaced_by = Some(SegmentIdx(1));
        assert_eq!(net.live_segments().count(), 1, "[BUG] replaced segments must not appear in live_segments");
        assert!(net.total_length() > 0.0);
    }

    #[test]
    fn test_segment_is_closed_when_nodes_point_to_each_other() {
        let mut net = DislocationNetwork::default();
        let seg = make_segment(&mut net, vec![Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)]);
        let id = net.push(seg);
        assert!(net.segment_is_closed(id), "[BUG] freshly paired nodes must be each other's opposite");
    }

    #[test]
    fn test_junction_ring_splice_links_three_nodes() {
        let mut net = DislocationNetwork::default();
        let a = net.new_node(crate::circuit::CircuitIdx(0), SegmentIdx(0));
        let b = net.new_node(crate::circuit::CircuitIdx(1), SegmentIdx(1));
        let c = net.new_node(crate::circuit::CircuitIdx(2), SegmentIdx(2));
        net.splice_junction_ring(a, b);
        net.splice_junction_ring(a, c);
        let ring = net.junction_ring(a);
        assert_eq!(ring.len(), 3, "[BUG] splicing two more nodes into a's ring must yield three members");
        assert!(ring.contains(&b) && ring.contains(&c));
    }
}
