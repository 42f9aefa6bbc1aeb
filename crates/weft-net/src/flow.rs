use serde::{Deserialize, Serialize};
use weft_smt::value::Decoded;

/// What a path-tree node wraps: an intermediate switch or a terminal device.
///
/// A closed sum type so extraction dispatches by exhaustive match instead of
/// runtime type tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRef {
    Switch(String),
    Device(String),
}

impl NodeRef {
    pub fn name(&self) -> &str {
        match self {
            NodeRef::Switch(name) | NodeRef::Device(name) => name,
        }
    }
}

/// One flow's traversal of one switch hop.
///
/// Timing sequences grow append-only during extraction, one entry per packet
/// instance; the priority is set exactly once from the solved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowFragment {
    pub name: String,
    pub node_name: String,
    pub next_hop: String,
    pub packet_period: f64,
    pub packets_sent: u32,
    pub priority: Option<u32>,
    pub departures: Vec<Decoded>,
    pub arrivals: Vec<Decoded>,
    pub scheduled: Vec<Decoded>,
}

impl FlowFragment {
    pub fn new(name: String, node_name: String, next_hop: String) -> Self {
        Self {
            name,
            node_name,
            next_hop,
            packet_period: 0.0,
            packets_sent: 0,
            priority: None,
            departures: Vec::new(),
            arrivals: Vec::new(),
            scheduled: Vec::new(),
        }
    }

    /// Set the solved priority. First write wins; the extractor visits each
    /// fragment exactly once.
    pub fn set_priority(&mut self, priority: u32) {
        if self.priority.is_none() {
            self.priority = Some(priority);
        }
    }

    pub fn add_departure(&mut self, value: Decoded) {
        self.departures.push(value);
    }

    pub fn add_arrival(&mut self, value: Decoded) {
        self.arrivals.push(value);
    }

    pub fn add_scheduled(&mut self, value: Decoded) {
        self.scheduled.push(value);
    }
}

/// A node of a multicast distribution tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub node: NodeRef,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Switch nodes own one fragment per child, in child order; device
    /// nodes own none.
    pub fragments: Vec<FlowFragment>,
}

/// An arena-backed tree mirroring a flow's multicast distribution.
///
/// Indices instead of owned recursion keep the extraction walk an explicit
/// iterative traversal regardless of topology depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathTree {
    pub nodes: Vec<PathNode>,
    pub root: usize,
}

impl PathTree {
    pub fn new(root: NodeRef) -> Self {
        Self {
            nodes: vec![PathNode {
                node: root,
                parent: None,
                children: Vec::new(),
                fragments: Vec::new(),
            }],
            root: 0,
        }
    }

    pub fn add_child(&mut self, parent: usize, node: NodeRef) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(PathNode {
            node,
            parent: Some(parent),
            children: Vec::new(),
            fragments: Vec::new(),
        });
        self.nodes[parent].children.push(idx);
        idx
    }

    /// Indices of terminal device nodes, in depth-first order.
    pub fn leaves(&self) -> Vec<usize> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if node.children.is_empty() && matches!(node.node, NodeRef::Device(_)) {
                if node.parent.is_some() {
                    leaves.push(idx);
                }
            } else {
                // Reverse so children pop in stored order.
                for &child in node.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        leaves
    }

    /// Node indices from the root to `node`, inclusive.
    pub fn path_from_root(&self, node: usize) -> Vec<usize> {
        let mut path = vec![node];
        let mut current = node;
        while let Some(parent) = self.nodes[current].parent {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }
}

/// Flow variant: legacy unicast hop chains must be converted to the
/// multicast representation before any synthesis step runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowKind {
    Unicast { chain: Vec<NodeRef> },
    PublishSubscribe { tree: PathTree },
}

/// A periodic traffic demand from one source device to one or more
/// destination devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    pub start_device: String,
    pub packets_sent: u32,
    pub kind: FlowKind,
    /// Aggregate transmissions recorded during extraction. Fragments of the
    /// same flow each contribute their packet count; the double counting is
    /// intentional (transmissions, not distinct packets).
    pub total_packets: u32,
}

impl Flow {
    /// A multicast flow rooted at its start device.
    pub fn publish_subscribe(name: &str, start_device: &str, packets_sent: u32) -> Self {
        Self {
            name: name.to_string(),
            start_device: start_device.to_string(),
            packets_sent,
            kind: FlowKind::PublishSubscribe {
                tree: PathTree::new(NodeRef::Device(start_device.to_string())),
            },
            total_packets: 0,
        }
    }

    /// A legacy unicast flow over an explicit device/switch chain.
    pub fn unicast(name: &str, chain: Vec<NodeRef>, packets_sent: u32) -> Self {
        let start_device = chain
            .first()
            .map(|n| n.name().to_string())
            .unwrap_or_default();
        Self {
            name: name.to_string(),
            start_device,
            packets_sent,
            kind: FlowKind::Unicast { chain },
            total_packets: 0,
        }
    }

    pub fn tree(&self) -> Option<&PathTree> {
        match &self.kind {
            FlowKind::PublishSubscribe { tree } => Some(tree),
            FlowKind::Unicast { .. } => None,
        }
    }

    pub fn tree_mut(&mut self) -> Option<&mut PathTree> {
        match &mut self.kind {
            FlowKind::PublishSubscribe { tree } => Some(tree),
            FlowKind::Unicast { .. } => None,
        }
    }

    /// Rewrite a unicast hop chain into a single-leaf path tree. A no-op for
    /// flows already in the multicast representation.
    pub fn convert_unicast(&mut self) {
        let chain = match &self.kind {
            FlowKind::Unicast { chain } => chain.clone(),
            FlowKind::PublishSubscribe { .. } => return,
        };
        let mut iter = chain.into_iter();
        let root = match iter.next() {
            Some(node) => node,
            None => NodeRef::Device(self.start_device.clone()),
        };
        let mut tree = PathTree::new(root);
        let mut parent = tree.root;
        for node in iter {
            parent = tree.add_child(parent, node);
        }
        self.kind = FlowKind::PublishSubscribe { tree };
    }

    /// Create fragments along the tree and propagate the packet period and
    /// packet count from the root. Runs once, before constraint encoding.
    pub fn set_up_periods(&mut self, packet_period: f64) {
        let packets_sent = self.packets_sent;
        let flow_name = self.name.clone();
        let tree = match self.tree_mut() {
            Some(tree) => tree,
            None => return,
        };

        let mut frag_counter = 0usize;
        let mut stack = vec![tree.root];
        while let Some(idx) = stack.pop() {
            let (node_ref, children) = {
                let node = &tree.nodes[idx];
                (node.node.clone(), node.children.clone())
            };
            if let NodeRef::Switch(switch_name) = &node_ref {
                if tree.nodes[idx].fragments.is_empty() {
                    for &child in &children {
                        let next_hop = tree.nodes[child].node.name().to_string();
                        let mut frag = FlowFragment::new(
                            format!("{flow_name}_f{frag_counter}"),
                            switch_name.clone(),
                            next_hop,
                        );
                        frag.packet_period = packet_period;
                        frag.packets_sent = packets_sent;
                        tree.nodes[idx].fragments.push(frag);
                        frag_counter += 1;
                    }
                } else {
                    for frag in &mut tree.nodes[idx].fragments {
                        frag.packet_period = packet_period;
                        frag.packets_sent = packets_sent;
                        frag_counter += 1;
                    }
                }
            }
            for &child in children.iter().rev() {
                stack.push(child);
            }
        }
    }

    /// Nodes on the root-to-leaf path, in order.
    pub fn nodes_root_to_leaf(&self, leaf: usize) -> Vec<&PathNode> {
        match self.tree() {
            Some(tree) => tree
                .path_from_root(leaf)
                .into_iter()
                .map(|i| &tree.nodes[i])
                .collect(),
            None => Vec::new(),
        }
    }

    /// Fragments along the root-to-leaf path, one per switch hop, in order.
    pub fn fragments_root_to_leaf(&self, leaf: usize) -> Vec<&FlowFragment> {
        let tree = match self.tree() {
            Some(tree) => tree,
            None => return Vec::new(),
        };
        let path = tree.path_from_root(leaf);
        let mut fragments = Vec::new();
        for pair in path.windows(2) {
            let (here, next) = (pair[0], pair[1]);
            let node = &tree.nodes[here];
            if matches!(node.node, NodeRef::Switch(_)) {
                if let Some(pos) = node.children.iter().position(|&c| c == next) {
                    if let Some(frag) = node.fragments.get(pos) {
                        fragments.push(frag);
                    }
                }
            }
        }
        fragments
    }

    pub fn add_to_total_packets(&mut self, count: u32) {
        self.total_packets += count;
    }
}
