use crate::error::RouteDefect;
use crate::{EdgeId, Graph, NodeId, SimulationError};
use itertools::Itertools;
use std::collections::VecDeque;

/// An origin-to-destination sequence of edges, consumed from the front as
/// the vehicle traverses the network. Produced by the routing layer;
/// immutable once assigned except for the pop-as-consumed cursor.
#[derive(Clone, Debug)]
pub struct Route {
    /// The remaining edges; the front is the next edge to enter.
    edges: VecDeque<EdgeId>,
    origin: NodeId,
    destination: NodeId,
    /// Ticks to wait before the vehicle attempts to spawn.
    spawn_delay: u32,
}

impl Route {
    /// Creates a route from an ordered edge sequence.
    pub fn new(
        edges: impl IntoIterator<Item = EdgeId>,
        origin: NodeId,
        destination: NodeId,
    ) -> Self {
        Self {
            edges: edges.into_iter().collect(),
            origin,
            destination,
            spawn_delay: 0,
        }
    }

    /// Sets the number of ticks the vehicle waits before spawning.
    pub fn with_spawn_delay(mut self, spawn_delay: u32) -> Self {
        self.spawn_delay = spawn_delay;
        self
    }

    /// The declared start node.
    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// The declared goal node.
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// Ticks to wait before the vehicle attempts to spawn.
    pub fn spawn_delay(&self) -> u32 {
        self.spawn_delay
    }

    /// The next edge to enter, without consuming it.
    pub fn peek(&self) -> Option<EdgeId> {
        self.edges.front().copied()
    }

    /// Consumes the next edge.
    pub(crate) fn pop(&mut self) -> Option<EdgeId> {
        self.edges.pop_front()
    }

    /// Whether all edges have been consumed.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The number of remaining edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Iterates over the remaining edges, next-to-enter first.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.iter().copied()
    }

    /// Checks the route against the graph: contiguous and touching the
    /// declared origin and destination. An empty route is only consistent
    /// when it starts at its destination; such a vehicle despawns without
    /// ever being placed.
    pub fn validate(&self, graph: &Graph) -> Result<(), SimulationError> {
        let defect = |reason| SimulationError::RouteUndefined {
            vehicle: None,
            reason,
        };

        let (Some(first), Some(last)) = (self.edges.front(), self.edges.back()) else {
            return if self.origin == self.destination {
                Ok(())
            } else {
                Err(defect(RouteDefect::Empty))
            };
        };
        if graph.edge(*first).origin() != self.origin {
            return Err(defect(RouteDefect::WrongOrigin));
        }
        if graph.edge(*last).destination() != self.destination {
            return Err(defect(RouteDefect::WrongDestination));
        }
        for (i, (a, b)) in self.edges.iter().tuple_windows().enumerate() {
            if graph.edge(*a).destination() != graph.edge(*b).origin() {
                return Err(defect(RouteDefect::DisconnectedAt(i)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::{EdgeAttributes, Orientation, StreetKind, StreetType};
    use crate::{Coordinate, SimulationConfig};

    fn residential(
        id: u64,
        origin: NodeId,
        destination: NodeId,
        length_m: f64,
    ) -> EdgeAttributes {
        EdgeAttributes {
            id,
            orientation: Orientation::Forwards,
            origin,
            destination,
            length_m,
            lanes: 1,
            max_velocity_kmh: 30.0,
            street_type: StreetType::new(StreetKind::Residential),
        }
    }

    #[test]
    fn validates_contiguity_and_endpoints() {
        let config = SimulationConfig::default();
        let mut graph = Graph::new(&config);
        let a = graph.add_node(0, Coordinate::new(48.0, 9.0));
        let b = graph.add_node(1, Coordinate::new(48.001, 9.0));
        let c = graph.add_node(2, Coordinate::new(48.001, 9.001));
        let ab = graph.add_edge(&residential(0, a, b, 100.0));
        let bc = graph.add_edge(&residential(1, b, c, 100.0));

        assert!(Route::new([ab, bc], a, c).validate(&graph).is_ok());

        let empty = Route::new([], a, c);
        assert!(matches!(
            empty.validate(&graph),
            Err(SimulationError::RouteUndefined {
                reason: RouteDefect::Empty,
                ..
            })
        ));

        // Already at the destination: consistent, despawns unplaced.
        assert!(Route::new([], a, a).validate(&graph).is_ok());

        let gap = Route::new([ab], a, c);
        assert!(matches!(
            gap.validate(&graph),
            Err(SimulationError::RouteUndefined {
                reason: RouteDefect::WrongDestination,
                ..
            })
        ));

        let disconnected = Route::new([bc, ab], b, b);
        assert!(matches!(
            disconnected.validate(&graph),
            Err(SimulationError::RouteUndefined {
                reason: RouteDefect::DisconnectedAt(0),
                ..
            })
        ));
    }
}
