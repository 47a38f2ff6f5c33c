//! Contraction hierarchies: a one-time preprocessing pass over the street
//! graph that inserts shortcut edges for contracted nodes, so that repeated
//! shortest-path queries reduce to a bidirectional upward search.

use crate::graph::edge::DirectedEdge;
use crate::{EdgeId, Graph, NodeId, Route};
use slotmap::SecondaryMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// The cost model a hierarchy is built for. A hierarchy answers queries for
/// exactly this metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    /// Cell length of the edges.
    Distance,
    /// Travel time at each edge's max velocity.
    TravelTime,
}

impl Metric {
    fn weight(&self, edge: &DirectedEdge) -> f64 {
        match self {
            Self::Distance => edge.length() as f64,
            Self::TravelTime => edge.time_cost_millis(),
        }
    }
}

/// An arc of the augmented search graph: an original edge or a shortcut
/// standing in for a contracted node.
struct ChArc {
    from: NodeId,
    to: NodeId,
    weight: f64,
    kind: ArcKind,
}

enum ArcKind {
    Edge(EdgeId),
    /// The two arcs this shortcut replaced; unpacked recursively at query
    /// time to recover the original edge sequence.
    Shortcut(usize, usize),
}

/// Witness searches settle at most this many nodes. Giving up early only
/// admits a redundant shortcut, never a wrong one.
const WITNESS_SETTLE_LIMIT: usize = 64;

/// A preprocessed contraction hierarchy over one graph revision.
///
/// The hierarchy records the graph's topology version; once the graph
/// changes, the hierarchy is stale and refuses to answer until it is built
/// again. Preprocessing is a pure function of the graph, so rebuilding is
/// always safe.
///
/// The overlay is built from the plain edge graph; per-lane turn connectors
/// are not encoded. Use [AStar] where turn restrictions must hold.
///
/// [AStar]: crate::AStar
pub struct ContractionHierarchies {
    version: u64,
    metric: Metric,
    rank: SecondaryMap<NodeId, u32>,
    /// Upward arcs leaving each node, for the forward search.
    forward: SecondaryMap<NodeId, Vec<usize>>,
    /// Upward arcs entering each node, for the backward search.
    backward: SecondaryMap<NodeId, Vec<usize>>,
    arcs: Vec<ChArc>,
}

/// Min-ordered Dijkstra frontier entry.
struct QueueEntry {
    cost: f64,
    node: NodeId,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl ContractionHierarchies {
    /// Builds the hierarchy: contracts all nodes, cheapest-to-contract
    /// first, inserting a shortcut wherever removing a node would lose the
    /// only shortest path between two of its neighbours.
    pub fn preprocess(graph: &Graph, metric: Metric) -> Self {
        let mut arcs: Vec<ChArc> = Vec::new();
        let mut leaving: SecondaryMap<NodeId, Vec<usize>> = SecondaryMap::new();
        let mut entering: SecondaryMap<NodeId, Vec<usize>> = SecondaryMap::new();
        for (node_id, _) in graph.nodes() {
            leaving.insert(node_id, Vec::new());
            entering.insert(node_id, Vec::new());
        }
        for (edge_id, edge) in graph.edges() {
            if edge.origin() == edge.destination() {
                continue;
            }
            let idx = arcs.len();
            arcs.push(ChArc {
                from: edge.origin(),
                to: edge.destination(),
                weight: metric.weight(edge),
                kind: ArcKind::Edge(edge_id),
            });
            leaving[edge.origin()].push(idx);
            entering[edge.destination()].push(idx);
        }

        // Contract low-degree nodes first; the stable sort keeps the graph
        // iteration order between equal degrees, so the hierarchy is a pure
        // function of the graph.
        let mut order: Vec<NodeId> = graph.nodes().map(|(id, _)| id).collect();
        order.sort_by_key(|id| leaving[*id].len() + entering[*id].len());
        let mut rank: SecondaryMap<NodeId, u32> = SecondaryMap::new();
        for (pos, id) in order.iter().enumerate() {
            rank.insert(*id, pos as u32);
        }

        let mut contracted: SecondaryMap<NodeId, ()> = SecondaryMap::new();
        let mut shortcuts = 0usize;
        for &u in &order {
            let incoming: Vec<usize> = entering[u]
                .iter()
                .copied()
                .filter(|&a| !contracted.contains_key(arcs[a].from))
                .collect();
            let outgoing: Vec<usize> = leaving[u]
                .iter()
                .copied()
                .filter(|&a| !contracted.contains_key(arcs[a].to))
                .collect();
            for &in_arc in &incoming {
                for &out_arc in &outgoing {
                    let (v, w) = (arcs[in_arc].from, arcs[out_arc].to);
                    if v == w {
                        continue;
                    }
                    let via = arcs[in_arc].weight + arcs[out_arc].weight;
                    if witness_exists(&arcs, &leaving, &contracted, v, w, u, via) {
                        continue;
                    }
                    let idx = arcs.len();
                    arcs.push(ChArc {
                        from: v,
                        to: w,
                        weight: via,
                        kind: ArcKind::Shortcut(in_arc, out_arc),
                    });
                    leaving[v].push(idx);
                    entering[w].push(idx);
                    shortcuts += 1;
                }
            }
            contracted.insert(u, ());
        }
        log::debug!(
            "contraction hierarchy: {} nodes, {} arcs ({} shortcuts)",
            order.len(),
            arcs.len(),
            shortcuts
        );

        // Split into the two upward search graphs.
        let mut forward: SecondaryMap<NodeId, Vec<usize>> = SecondaryMap::new();
        let mut backward: SecondaryMap<NodeId, Vec<usize>> = SecondaryMap::new();
        for (node_id, _) in graph.nodes() {
            forward.insert(node_id, Vec::new());
            backward.insert(node_id, Vec::new());
        }
        for (idx, arc) in arcs.iter().enumerate() {
            if rank[arc.to] > rank[arc.from] {
                forward[arc.from].push(idx);
            } else {
                backward[arc.to].push(idx);
            }
        }

        Self {
            version: graph.version(),
            metric,
            rank,
            forward,
            backward,
            arcs,
        }
    }

    /// The metric this hierarchy answers queries for.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Whether the graph changed since this hierarchy was built.
    pub fn is_stale(&self, graph: &Graph) -> bool {
        self.version != graph.version()
    }

    /// Bidirectional upward search. Returns `None` when the goal is
    /// unreachable, or when the hierarchy is stale - a stale overlay must
    /// not answer, callers rebuild it via [preprocess](Self::preprocess).
    pub fn find_shortest_path(&self, graph: &Graph, start: NodeId, end: NodeId) -> Option<Route> {
        if self.is_stale(graph) {
            log::warn!("contraction hierarchy is stale, rebuild it before querying");
            return None;
        }
        if start == end {
            return Some(Route::new([], start, end));
        }

        let (dist_fwd, pred_fwd) = self.upward_search(start, false);
        let (dist_bwd, pred_bwd) = self.upward_search(end, true);

        // The cheapest meeting node decides the path.
        let mut best: Option<(f64, NodeId)> = None;
        for (node, df) in dist_fwd.iter() {
            if let Some(db) = dist_bwd.get(node) {
                let total = df + db;
                if best.map_or(true, |(cost, _)| total < cost) {
                    best = Some((total, node));
                }
            }
        }
        let (_, meet) = best?;

        // Forward half: start -> meet.
        let mut chain = Vec::new();
        let mut node = meet;
        while node != start {
            let arc = pred_fwd[node];
            chain.push(arc);
            node = self.arcs[arc].from;
        }
        chain.reverse();
        let mut edges = Vec::new();
        for arc in chain {
            self.unpack(arc, &mut edges);
        }

        // Backward half: meet -> end.
        let mut node = meet;
        while node != end {
            let arc = pred_bwd[node];
            self.unpack(arc, &mut edges);
            node = self.arcs[arc].to;
        }

        Some(Route::new(edges, start, end))
    }

    /// Dijkstra over one of the upward graphs, run to exhaustion.
    fn upward_search(
        &self,
        origin: NodeId,
        backward: bool,
    ) -> (SecondaryMap<NodeId, f64>, SecondaryMap<NodeId, usize>) {
        let adjacency = if backward { &self.backward } else { &self.forward };
        let mut dist: SecondaryMap<NodeId, f64> = SecondaryMap::new();
        let mut pred: SecondaryMap<NodeId, usize> = SecondaryMap::new();
        let mut queue = BinaryHeap::new();
        let mut seq = 0u64;

        dist.insert(origin, 0.0);
        queue.push(QueueEntry {
            cost: 0.0,
            node: origin,
            seq,
        });
        while let Some(entry) = queue.pop() {
            if entry.cost > dist[entry.node] {
                continue;
            }
            for &arc_idx in &adjacency[entry.node] {
                let arc = &self.arcs[arc_idx];
                let next = if backward { arc.from } else { arc.to };
                let cost = entry.cost + arc.weight;
                if dist.get(next).map_or(true, |best| cost < *best) {
                    dist.insert(next, cost);
                    pred.insert(next, arc_idx);
                    seq += 1;
                    queue.push(QueueEntry {
                        cost,
                        node: next,
                        seq,
                    });
                }
            }
        }
        (dist, pred)
    }

    /// Expands an arc into the original edges it stands for.
    fn unpack(&self, arc: usize, edges: &mut Vec<EdgeId>) {
        match self.arcs[arc].kind {
            ArcKind::Edge(edge) => edges.push(edge),
            ArcKind::Shortcut(first, second) => {
                self.unpack(first, edges);
                self.unpack(second, edges);
            }
        }
    }
}

/// Checks whether a path from `from` to `to` no longer than `limit` exists
/// in the not-yet-contracted graph without passing through `excluded`.
fn witness_exists(
    arcs: &[ChArc],
    leaving: &SecondaryMap<NodeId, Vec<usize>>,
    contracted: &SecondaryMap<NodeId, ()>,
    from: NodeId,
    to: NodeId,
    excluded: NodeId,
    limit: f64,
) -> bool {
    let mut dist: SecondaryMap<NodeId, f64> = SecondaryMap::new();
    let mut queue = BinaryHeap::new();
    let mut settled = 0usize;
    let mut seq = 0u64;

    dist.insert(from, 0.0);
    queue.push(QueueEntry {
        cost: 0.0,
        node: from,
        seq,
    });
    while let Some(entry) = queue.pop() {
        if entry.cost > limit {
            return false;
        }
        if entry.node == to {
            return true;
        }
        if entry.cost > dist[entry.node] {
            continue;
        }
        settled += 1;
        if settled > WITNESS_SETTLE_LIMIT {
            return false;
        }
        for &arc_idx in &leaving[entry.node] {
            let arc = &arcs[arc_idx];
            if arc.to == excluded || contracted.contains_key(arc.to) {
                continue;
            }
            let cost = entry.cost + arc.weight;
            if dist.get(arc.to).map_or(true, |best| cost < *best) {
                dist.insert(arc.to, cost);
                seq += 1;
                queue.push(QueueEntry {
                    cost,
                    node: arc.to,
                    seq,
                });
            }
        }
    }
    false
}
