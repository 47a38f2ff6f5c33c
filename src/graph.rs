use crate::geom::{sort_clockwise, Vector2d};
use crate::simulation::SimulationConfig;
use crate::{EdgeId, EdgeSet, NodeId, NodeSet};
use self::edge::{DirectedEdge, EdgeAttributes, Orientation};
use self::node::Node;
use std::collections::HashMap;

pub mod edge;
pub mod node;

/// The street graph: an arena of nodes and directed edges addressed by
/// stable keys. Vehicles and connectors refer to graph entities by id, never
/// by owning reference, so the cyclic node/edge/lane/vehicle relationships
/// of the domain stay acyclic in memory.
pub struct Graph {
    pub(crate) nodes: NodeSet,
    pub(crate) edges: EdgeSet,
    /// External node id to handle.
    node_index: HashMap<u64, NodeId>,
    /// External street id and orientation to handle.
    edge_index: HashMap<(u64, Orientation), EdgeId>,
    meters_per_cell: f64,
    global_max_velocity: u32,
    driving_on_the_right: bool,
    /// Bumped on every structural change; consumed by routing overlays.
    version: u64,
    finalized: bool,
}

impl Graph {
    /// Creates an empty graph. The config supplies the unit conversion and
    /// right-of-way parameters that are baked in at build time.
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            nodes: NodeSet::default(),
            edges: EdgeSet::default(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            meters_per_cell: config.meters_per_cell,
            global_max_velocity: config.global_max_velocity,
            driving_on_the_right: config.crossing.driving_on_the_right,
            version: 0,
            finalized: false,
        }
    }

    /// Adds a node, or returns the existing handle for its external id.
    pub fn add_node(&mut self, external_id: u64, coordinate: crate::Coordinate) -> NodeId {
        if let Some(id) = self.node_index.get(&external_id) {
            return *id;
        }
        let id = self.nodes.insert(Node::new(external_id, coordinate));
        self.node_index.insert(external_id, id);
        self.version += 1;
        self.finalized = false;
        id
    }

    /// Adds a directed edge, or returns the existing handle for its external
    /// id and orientation. Registers the edge at both endpoint nodes.
    pub fn add_edge(&mut self, attribs: &EdgeAttributes) -> EdgeId {
        if let Some(id) = self.edge_index.get(&(attribs.id, attribs.orientation)) {
            return *id;
        }
        let (meters_per_cell, global_max_velocity) =
            (self.meters_per_cell, self.global_max_velocity);
        let id = self
            .edges
            .insert_with_key(|id| DirectedEdge::new(id, attribs, meters_per_cell, global_max_velocity));
        self.edge_index.insert((attribs.id, attribs.orientation), id);
        self.nodes[attribs.origin].add_leaving(id);
        self.nodes[attribs.destination].add_incoming(id);
        self.version += 1;
        self.finalized = false;
        id
    }

    /// Records a permitted lane-to-lane turn at a node.
    pub fn add_connector(&mut self, node: NodeId, from: (EdgeId, u8), to: (EdgeId, u8)) {
        debug_assert_eq!(self.edges[from.0].destination(), node);
        debug_assert_eq!(self.edges[to.0].origin(), node);
        self.nodes[node].add_connector(from, to);
        self.version += 1;
    }

    /// Assigns the crossing indices every node needs for right-of-way
    /// ranking. Must run after the last edge is added; idempotent.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        let node_ids: Vec<NodeId> = self.nodes.keys().collect();
        for node_id in node_ids {
            self.assign_crossing_indices(node_id);
        }
        self.finalized = true;
        log::debug!(
            "finalized graph: {} nodes, {} edges",
            self.nodes.len(),
            self.edges.len()
        );
    }

    /// Orders the edges incident to one node clockwise (counter-clockwise in
    /// left-hand traffic) and hands out crossing indices, leaving edges of a
    /// street before incoming ones.
    fn assign_crossing_indices(&mut self, node_id: NodeId) {
        let node = &self.nodes[node_id];
        let own_coord = node.coordinate();

        // Group incident edges by the street geometry they share, which for
        // straight-line directions is the far endpoint.
        let mut incident: Vec<(EdgeId, bool)> = node
            .leaving_edges()
            .map(|id| (id, true))
            .chain(node.incoming_edges().map(|id| (id, false)))
            .collect();
        // Leaving before incoming, then stable by external identity.
        incident.sort_by_key(|(id, leaving)| {
            let edge = &self.edges[*id];
            (!leaving, edge.external_id(), edge.orientation())
        });

        let mut groups: Vec<(NodeId, Vector2d, Vec<(EdgeId, bool)>)> = Vec::new();
        for (edge_id, leaving) in incident {
            let edge = &self.edges[edge_id];
            let far = if leaving {
                edge.destination()
            } else {
                edge.origin()
            };
            match groups.iter_mut().find(|(node, _, _)| *node == far) {
                Some((_, _, members)) => members.push((edge_id, leaving)),
                None => {
                    // All vectors point from the far endpoint towards this node.
                    let direction = self.nodes[far].coordinate().direction_to(&own_coord);
                    groups.push((far, direction, vec![(edge_id, leaving)]));
                }
            }
        }
        if groups.is_empty() {
            return;
        }

        let zero = groups[0].1;
        let mut directed: Vec<(Vector2d, Vec<(EdgeId, bool)>)> = groups
            .into_iter()
            .map(|(_, direction, members)| (direction, members))
            .collect();
        // Turn paths sweep the side of the crossing vehicles keep to, so the
        // indices ascend counter-clockwise in right-hand traffic and
        // clockwise in left-hand traffic.
        sort_clockwise(zero, &mut directed, self.driving_on_the_right);

        let node = &mut self.nodes[node_id];
        let mut next_index = 0u8;
        for (_, members) in &directed {
            for (edge_id, leaving) in members.iter().filter(|(_, leaving)| *leaving) {
                node.set_crossing_index(*edge_id, *leaving, next_index);
                next_index += 1;
            }
            for (edge_id, leaving) in members.iter().filter(|(_, leaving)| !*leaving) {
                node.set_crossing_index(*edge_id, *leaving, next_index);
                next_index += 1;
            }
        }
    }

    /// Gets a node by its handle.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Gets an edge by its handle.
    pub fn edge(&self, id: EdgeId) -> &DirectedEdge {
        &self.edges[id]
    }

    /// Looks up a node handle by external id.
    pub fn node_by_external_id(&self, external_id: u64) -> Option<NodeId> {
        self.node_index.get(&external_id).copied()
    }

    /// Looks up an edge handle by external id and orientation.
    pub fn edge_by_external_id(
        &self,
        external_id: u64,
        orientation: Orientation,
    ) -> Option<EdgeId> {
        self.edge_index.get(&(external_id, orientation)).copied()
    }

    /// Iterates over all nodes in a stable order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Iterates over all edges in a stable order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &DirectedEdge)> {
        self.edges.iter()
    }

    /// The number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The topology version, bumped on every structural change.
    pub fn version(&self) -> u64 {
        self.version
    }
}
