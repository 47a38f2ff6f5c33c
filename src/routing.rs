//! Shortest-path search over the street graph, producing the [Route]s
//! vehicles consume.

use crate::graph::edge::DirectedEdge;
use crate::graph::node::Node;
use crate::{EdgeId, Graph, NodeId, Route};
use slotmap::SecondaryMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub mod ch;

type WeightFn = Box<dyn Fn(&DirectedEdge) -> f64 + Send + Sync>;
type EstimateFn = Box<dyn Fn(&Node, &Node) -> f64 + Send + Sync>;

/// An A* shortest-path scout with pluggable edge weight and remaining-cost
/// estimate.
///
/// The estimate must never overestimate the true remaining cost, otherwise
/// the returned path is not guaranteed to be optimal. The named
/// constructors all satisfy this.
pub struct AStar {
    weight: WeightFn,
    estimate: EstimateFn,
}

/// A frontier entry, ordered by lowest `g + h` first, ties broken by
/// insertion order.
struct FrontierNode {
    node: NodeId,
    g: f64,
    f: f64,
    seq: u64,
}

impl PartialEq for FrontierNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierNode {}

impl PartialOrd for FrontierNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Inverted: BinaryHeap is a max-heap, we pop the cheapest entry.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl AStar {
    /// Creates a scout with a custom weight and estimate. All weights and
    /// estimates must be non-negative.
    pub fn new(
        weight: impl Fn(&DirectedEdge) -> f64 + Send + Sync + 'static,
        estimate: impl Fn(&Node, &Node) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            weight: Box::new(weight),
            estimate: Box::new(estimate),
        }
    }

    /// Minimises travel time. The estimate converts the haversine distance
    /// into the travel time at the global maximum velocity, which no edge
    /// can beat.
    pub fn fastest_way(meters_per_cell: f64, global_max_velocity: u32) -> Self {
        let best_cells_per_tick = u32::max(global_max_velocity, 1) as f64;
        Self::new(
            |edge| edge.time_cost_millis(),
            move |node, goal| {
                let cells = node.coordinate().distance(&goal.coordinate()) / meters_per_cell;
                1000.0 * cells / best_cells_per_tick
            },
        )
    }

    /// Minimises distance in cells. The haversine distance is a lower bound
    /// on any path's metre length, and edge cell counts only ever round up.
    pub fn shortest_way(meters_per_cell: f64) -> Self {
        Self::new(
            |edge| edge.length() as f64,
            move |node, goal| node.coordinate().distance(&goal.coordinate()) / meters_per_cell,
        )
    }

    /// Minimises distance with a zero estimate - Dijkstra's algorithm.
    pub fn shortest_way_dijkstra() -> Self {
        Self::new(|edge| edge.length() as f64, |_, _| 0.0)
    }

    /// Finds a cheapest path from `start` to `end`, honouring the turn
    /// connectors recorded at the nodes. Returns `None` when the goal is
    /// unreachable; that is an ordinary result, not an error.
    pub fn find_shortest_path(&self, graph: &Graph, start: NodeId, end: NodeId) -> Option<Route> {
        if start == end {
            return Some(Route::new([], start, end));
        }

        let goal = graph.node(end);
        let mut visited: SecondaryMap<NodeId, ()> = SecondaryMap::new();
        // Cheapest known arrival per node: cost and the edge it came over.
        let mut arrival: SecondaryMap<NodeId, (f64, EdgeId)> = SecondaryMap::new();
        let mut queue = BinaryHeap::new();
        let mut seq = 0u64;

        queue.push(FrontierNode {
            node: start,
            g: 0.0,
            f: (self.estimate)(graph.node(start), goal),
            seq,
        });

        while let Some(current) = queue.pop() {
            if visited.contains_key(current.node) {
                continue;
            }
            if current.node == end {
                return Some(self.unwind(graph, &arrival, start, end));
            }
            visited.insert(current.node, ());

            let incoming = arrival.get(current.node).map(|(_, edge)| *edge);
            for edge_id in graph.node(current.node).reachable_edges(incoming) {
                let edge = graph.edge(edge_id);
                let next = edge.destination();
                if visited.contains_key(next) {
                    continue;
                }
                let g = current.g + (self.weight)(edge);
                let better = arrival.get(next).map_or(true, |(best, _)| g < *best);
                if better {
                    arrival.insert(next, (g, edge_id));
                    seq += 1;
                    queue.push(FrontierNode {
                        node: next,
                        g,
                        f: g + (self.estimate)(graph.node(next), goal),
                        seq,
                    });
                }
            }
        }

        None
    }

    /// Rebuilds the edge sequence from the arrival map.
    fn unwind(
        &self,
        graph: &Graph,
        arrival: &SecondaryMap<NodeId, (f64, EdgeId)>,
        start: NodeId,
        end: NodeId,
    ) -> Route {
        let mut edges = Vec::new();
        let mut node = end;
        while node != start {
            let (_, edge_id) = arrival[node];
            edges.push(edge_id);
            node = graph.edge(edge_id).origin();
        }
        edges.reverse();
        Route::new(edges, start, end)
    }
}
