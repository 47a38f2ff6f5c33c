use crate::geom::Coordinate;
use crate::{EdgeId, VehicleId};
use smallvec::SmallVec;

/// Crossing index value before [Graph::finalize] has run.
///
/// [Graph::finalize]: crate::Graph::finalize
pub(crate) const INDEX_UNASSIGNED: u8 = u8::MAX;

/// A crossing point of two or more [DirectedEdge]s.
///
/// Besides the static topology (incident edges, turn connectors), a node
/// carries the per-tick arbitration state of the crossing logic: which
/// vehicles are waiting at its boundary, and which of them may cross this
/// tick.
///
/// [DirectedEdge]: crate::DirectedEdge
#[derive(Clone)]
pub struct Node {
    /// The external id, e.g. an OSM node id.
    external_id: u64,
    /// The geographic position.
    coordinate: Coordinate,
    /// Edges entering this node, each with its crossing index.
    pub(crate) incoming: SmallVec<[(EdgeId, u8); 4]>,
    /// Edges leaving this node, each with its crossing index.
    pub(crate) leaving: SmallVec<[(EdgeId, u8); 4]>,
    /// Permitted lane-to-lane turns. Empty for an incoming edge means every
    /// leaving edge is permitted.
    connectors: SmallVec<[Connector; 8]>,
    /// Vehicles waiting at this node's boundary, ordered by their stable
    /// sequence number.
    pub(crate) registered: Vec<(u64, VehicleId)>,
    /// The vehicles granted passage for the current tick.
    pub(crate) granted: SmallVec<[VehicleId; 2]>,
}

/// A permitted turn from one lane to another across a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connector {
    pub from: (EdgeId, u8),
    pub to: (EdgeId, u8),
}

impl Node {
    pub(crate) fn new(external_id: u64, coordinate: Coordinate) -> Self {
        Self {
            external_id,
            coordinate,
            incoming: SmallVec::new(),
            leaving: SmallVec::new(),
            connectors: SmallVec::new(),
            registered: Vec::new(),
            granted: SmallVec::new(),
        }
    }

    /// The external id this node was built from.
    pub fn external_id(&self) -> u64 {
        self.external_id
    }

    /// The geographic position of the node.
    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// The edges entering this node.
    pub fn incoming_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.incoming.iter().map(|(id, _)| *id)
    }

    /// The edges leaving this node.
    pub fn leaving_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.leaving.iter().map(|(id, _)| *id)
    }

    pub(crate) fn add_incoming(&mut self, edge: EdgeId) {
        if !self.incoming.iter().any(|(id, _)| *id == edge) {
            self.incoming.push((edge, INDEX_UNASSIGNED));
        }
    }

    pub(crate) fn add_leaving(&mut self, edge: EdgeId) {
        if !self.leaving.iter().any(|(id, _)| *id == edge) {
            self.leaving.push((edge, INDEX_UNASSIGNED));
        }
    }

    pub(crate) fn add_connector(&mut self, from: (EdgeId, u8), to: (EdgeId, u8)) {
        let connector = Connector { from, to };
        if !self.connectors.contains(&connector) {
            self.connectors.push(connector);
        }
    }

    pub(crate) fn set_crossing_index(&mut self, edge: EdgeId, leaving: bool, index: u8) {
        let list = if leaving {
            &mut self.leaving
        } else {
            &mut self.incoming
        };
        if let Some(entry) = list.iter_mut().find(|(id, _)| *id == edge) {
            entry.1 = index;
        }
    }

    /// The crossing index of an incoming edge.
    pub(crate) fn incoming_index(&self, edge: EdgeId) -> Option<u8> {
        self.incoming
            .iter()
            .find(|(id, _)| *id == edge)
            .map(|(_, idx)| *idx)
    }

    /// The crossing index of a leaving edge.
    pub(crate) fn leaving_index(&self, edge: EdgeId) -> Option<u8> {
        self.leaving
            .iter()
            .find(|(id, _)| *id == edge)
            .map(|(_, idx)| *idx)
    }

    /// The total number of crossing indices handed out at this node.
    pub(crate) fn indices_per_node(&self) -> u8 {
        (self.incoming.len() + self.leaving.len()) as u8
    }

    /// The lane a vehicle coming from `(from_edge, from_lane)` enters when
    /// turning into `to_edge`, or `None` if that turn is not permitted.
    /// A node without connectors for the incoming edge permits every leaving
    /// edge via lane 0.
    pub fn connector_target(
        &self,
        from_edge: EdgeId,
        from_lane: u8,
        to_edge: EdgeId,
    ) -> Option<u8> {
        let mut restricted = false;
        for connector in &self.connectors {
            if connector.from.0 != from_edge {
                continue;
            }
            restricted = true;
            if connector.from.1 == from_lane && connector.to.0 == to_edge {
                return Some(connector.to.1);
            }
        }
        if restricted {
            None
        } else {
            self.leaving
                .iter()
                .any(|(id, _)| *id == to_edge)
                .then_some(0)
        }
    }

    /// The leaving edges reachable when arriving over `incoming`, which is
    /// what route search expands. `None` stands for a search origin with no
    /// arrival edge and permits everything.
    pub fn reachable_edges(&self, incoming: Option<EdgeId>) -> SmallVec<[EdgeId; 4]> {
        let mut out = SmallVec::new();
        if let Some(from) = incoming {
            let mut restricted = false;
            for connector in &self.connectors {
                if connector.from.0 == from {
                    restricted = true;
                    if !out.contains(&connector.to.0) {
                        out.push(connector.to.0);
                    }
                }
            }
            if restricted {
                return out;
            }
        }
        out.extend(self.leaving.iter().map(|(id, _)| *id));
        out
    }

    /// Registers a vehicle for crossing arbitration. Idempotent.
    pub(crate) fn register_vehicle(&mut self, seq: u64, vehicle: VehicleId) {
        if let Err(pos) = self.registered.binary_search_by_key(&seq, |(s, _)| *s) {
            self.registered.insert(pos, (seq, vehicle));
        }
    }

    /// Removes a vehicle from arbitration, e.g. after it crossed or despawned.
    pub(crate) fn unregister_vehicle(&mut self, vehicle: VehicleId) {
        self.registered.retain(|(_, v)| *v != vehicle);
        self.granted.retain(|v| *v != vehicle);
    }

    /// Whether the vehicle may cross this node during the current tick.
    pub fn permission_to_cross(&self, vehicle: VehicleId) -> bool {
        self.granted.contains(&vehicle)
    }

    /// The number of vehicles currently waiting at this node.
    pub fn waiting_count(&self) -> usize {
        self.registered.len()
    }
}
