use self::driver::Driver;
use crate::error::RouteDefect;
use crate::route::Route;
use crate::{EdgeId, EdgeSet, NodeId, NodeSet, SimulationError, VehicleId};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub mod driver;

/// A simulated vehicle of the Nagel-Schreckenberg cellular automaton.
///
/// All dynamic quantities are integers: the position is a cell index on a
/// lane, the velocity is in cells per tick. Rounding happened once when the
/// edges were built, never during stepping.
pub struct Vehicle {
    /// The vehicle's ID.
    pub(crate) id: VehicleId,
    /// Stable creation index; seeds the RNG and breaks arbitration ties.
    seq: u64,
    /// Lifecycle state.
    state: VehicleState,
    /// Current edge, lane and cell; `None` unless spawned.
    location: Option<(EdgeId, u8, u32)>,
    /// Velocity in cells per tick.
    velocity: u32,
    /// The behaviour strategy.
    driver: Box<dyn Driver>,
    /// The remaining route; the current edge is already consumed.
    route: Route,
    /// Private random source, so dawdling is independent of thread count.
    rng: ChaCha8Rng,
    /// Ticks since the vehicle was added to the simulation.
    age: u32,
    /// An externally blocked vehicle brakes to zero and holds its cell.
    blocked: bool,
    /// Lane targeted by the pending lane-change intent.
    lane_change: Option<u8>,
}

/// The lifecycle state of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleState {
    /// Created but not yet placed on its origin edge.
    NotSpawned,
    /// On the network.
    Spawned,
    /// Removed from the network for good.
    Despawned,
}

/// Occupancy bookkeeping a vehicle's move phase produced, applied at the
/// phase barrier by the step executor.
pub(crate) enum MoveEvent {
    /// Moved forward within its lane.
    Advance {
        from: (EdgeId, u8, u32),
        to: (EdgeId, u8, u32),
    },
    /// Crossed a node onto the next route edge.
    Cross {
        node: NodeId,
        from: (EdgeId, u8, u32),
        to: (EdgeId, u8, u32),
    },
    /// Reached its destination and left the network.
    Despawn {
        node: NodeId,
        from: (EdgeId, u8, u32),
    },
}

/// Outcome of a spawn-phase check.
pub(crate) enum SpawnCheck {
    /// Not ready or no capacity; try again next tick.
    Defer,
    /// The route is empty, the vehicle despawns without ever being placed.
    DespawnUnplaced,
    /// Entry looks free; the executor re-checks and places at the barrier.
    Attempt { edge: EdgeId },
}

impl Vehicle {
    pub(crate) fn new(
        id: VehicleId,
        seq: u64,
        driver: Box<dyn Driver>,
        route: Route,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            id,
            seq,
            state: VehicleState::NotSpawned,
            location: None,
            velocity: 0,
            driver,
            route,
            rng,
            age: 0,
            blocked: false,
            lane_change: None,
        }
    }

    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The stable creation index of the vehicle.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The lifecycle state.
    pub fn state(&self) -> VehicleState {
        self.state
    }

    /// Current edge, lane and cell; `None` unless spawned.
    pub fn location(&self) -> Option<(EdgeId, u8, u32)> {
        self.location
    }

    /// The velocity in cells per tick.
    pub fn velocity(&self) -> u32 {
        self.velocity
    }

    /// Ticks since the vehicle was added, including its spawn delay.
    pub fn age(&self) -> u32 {
        self.age
    }

    /// Ticks spent travelling, i.e. the age minus the spawn delay.
    pub fn travel_time(&self) -> u32 {
        self.age.saturating_sub(self.route.spawn_delay())
    }

    /// The remaining route.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Whether the vehicle is externally blocked.
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub(crate) fn set_blocked(&mut self, blocked: bool) {
        self.blocked = blocked;
    }

    pub(crate) fn take_lane_change(&mut self) -> Option<u8> {
        self.lane_change.take()
    }

    pub(crate) fn set_location(&mut self, location: (EdgeId, u8, u32)) {
        self.location = Some(location);
    }

    /// Phase 1a: speed up by one cell per tick, up to the driver's cap.
    pub(crate) fn accelerate(&mut self, edges: &EdgeSet) {
        if self.state != VehicleState::Spawned {
            return;
        }
        let (edge_id, _, _) = self.location.expect("spawned vehicle has a location");
        let cap = self.driver.max_velocity(edges[edge_id].max_velocity());
        self.velocity = u32::min(self.velocity + 1, cap);
    }

    /// Phase 1b: decide whether to change lanes. An intent is formed when
    /// the route's next turn needs a different lane, or when the own lane is
    /// congested and a neighbour lane offers more room. The actual change is
    /// an atomic reservation applied between phases.
    pub(crate) fn plan_lane_change(&mut self, edges: &EdgeSet, nodes: &NodeSet) {
        self.lane_change = None;
        if self.state != VehicleState::Spawned {
            return;
        }
        let (edge_id, lane_idx, cell) = self.location.expect("spawned vehicle has a location");
        let edge = &edges[edge_id];
        if edge.num_lanes() < 2 {
            return;
        }
        // A vehicle holding a crossing grant keeps its lane: the grant's
        // destination claim was made for the lane it stood on.
        if nodes[edge.destination()].permission_to_cross(self.id) {
            return;
        }

        let target = self
            .lane_required_for_turn(edge_id, lane_idx, edges, nodes)
            .or_else(|| self.lane_with_more_room(edge_id, lane_idx, cell, edges));

        // Reject a target whose cell is taken or that a follower is about to
        // reach; contested reservations are resolved at the barrier.
        if let Some(target) = target {
            let lane = edge.lane(target);
            let safe_behind = u32::min(cell, edge.max_velocity());
            let rear_clear = (cell - safe_behind..cell).all(|c| lane.occupant(c).is_none());
            if lane.occupant(cell).is_none() && rear_clear {
                self.lane_change = Some(target);
            }
        }
    }

    /// The neighbouring lane to move towards so the route's next turn stays
    /// reachable, if the current lane cannot serve it.
    fn lane_required_for_turn(
        &self,
        edge_id: EdgeId,
        lane_idx: u8,
        edges: &EdgeSet,
        nodes: &NodeSet,
    ) -> Option<u8> {
        let next_edge = self.route.peek()?;
        let edge = &edges[edge_id];
        let node = &nodes[edge.destination()];
        if node.connector_target(edge_id, lane_idx, next_edge).is_some() {
            return None;
        }
        let serving = (0..edge.num_lanes())
            .find(|lane| node.connector_target(edge_id, *lane, next_edge).is_some())?;
        // One lateral step per tick towards the serving lane.
        Some(if serving > lane_idx {
            lane_idx + 1
        } else {
            lane_idx - 1
        })
    }

    /// A neighbouring lane with a longer gap, when the own gap is shorter
    /// than the intended velocity.
    fn lane_with_more_room(
        &self,
        edge_id: EdgeId,
        lane_idx: u8,
        cell: u32,
        edges: &EdgeSet,
    ) -> Option<u8> {
        let edge = &edges[edge_id];
        let own_gap = edge.lane(lane_idx).gap_ahead(cell, self.velocity);
        if own_gap >= self.velocity {
            return None;
        }
        let candidates = [lane_idx.checked_sub(1), lane_idx.checked_add(1)];
        candidates
            .into_iter()
            .flatten()
            .filter(|lane| *lane < edge.num_lanes())
            .map(|lane| (lane, edge.lane(lane).gap_ahead(cell, self.velocity)))
            .filter(|(_, gap)| *gap > own_gap)
            .max_by_key(|(_, gap)| *gap)
            .map(|(lane, _)| lane)
    }

    /// Phase 3a: cap the velocity against the next obstacle - a vehicle
    /// ahead, the lane end, or a denied crossing.
    pub(crate) fn brake(&mut self, edges: &EdgeSet, nodes: &NodeSet) {
        if self.state != VehicleState::Spawned {
            return;
        }
        if self.blocked {
            self.velocity = 0;
            return;
        }
        let (edge_id, lane_idx, cell) = self.location.expect("spawned vehicle has a location");
        let edge = &edges[edge_id];
        let lane = edge.lane(lane_idx);
        let distance = edge.length() - cell;

        if let Some(obstacle) = lane.next_occupied(cell, self.velocity) {
            // Brake for the vehicle ahead.
            self.velocity = u32::min(self.velocity, obstacle - cell - 1);
        } else if self.velocity >= distance {
            // The lane end is within reach.
            let node = &nodes[edge.destination()];
            let allowed = self
                .route
                .peek()
                .filter(|_| node.permission_to_cross(self.id))
                .and_then(|next_edge| {
                    let target = node.connector_target(edge_id, lane_idx, next_edge)?;
                    let insertion = edges[next_edge].lane(target).max_insertion_index();
                    // Up to the first free stretch of the next lane.
                    Some((distance as i64 + insertion).max(0) as u32)
                })
                // Denied or out of route: stop at the last cell.
                .unwrap_or(distance - 1);
            self.velocity = u32::min(self.velocity, allowed);
        }

        self.velocity = u32::min(self.velocity, edge.max_velocity());
    }

    /// Phase 3b: random hesitation, one cell down with the driver's
    /// probability.
    pub(crate) fn dawdle(&mut self) {
        if self.state != VehicleState::Spawned || self.velocity == 0 {
            return;
        }
        if self.rng.gen::<f64>() < self.driver.dawdle_probability() {
            self.velocity -= 1;
        }
    }

    /// Phase 4: advance by the braked velocity, crossing into the next route
    /// edge if the lane end is passed. Updates the vehicle's own location;
    /// the returned event carries the occupancy bookkeeping for the barrier.
    pub(crate) fn advance(
        &mut self,
        edges: &EdgeSet,
        nodes: &NodeSet,
    ) -> Result<Option<MoveEvent>, SimulationError> {
        if self.state != VehicleState::Spawned {
            return Ok(None);
        }
        let (edge_id, lane_idx, cell) = self.location.expect("spawned vehicle has a location");
        let edge = &edges[edge_id];
        let distance = edge.length() - cell;

        if self.velocity >= distance {
            // Brake only lets a granted vehicle past the lane end.
            let node_id = edge.destination();
            let next_edge = self.route.pop().ok_or(SimulationError::RouteUndefined {
                vehicle: Some(self.id),
                reason: RouteDefect::ExhaustedEarly,
            })?;
            let target_lane = nodes[node_id]
                .connector_target(edge_id, lane_idx, next_edge)
                .unwrap_or(0);
            let entry_cell = self.velocity - distance;
            self.location = Some((next_edge, target_lane, entry_cell));
            return Ok(Some(MoveEvent::Cross {
                node: node_id,
                from: (edge_id, lane_idx, cell),
                to: (next_edge, target_lane, entry_cell),
            }));
        }

        if self.velocity == 0 && distance == 1 && self.route.is_empty() {
            // Standing at the destination: leave the network.
            self.state = VehicleState::Despawned;
            self.location = None;
            self.driver.on_despawn();
            return Ok(Some(MoveEvent::Despawn {
                node: edge.destination(),
                from: (edge_id, lane_idx, cell),
            }));
        }

        if self.velocity > 0 {
            let to = cell + self.velocity;
            self.location = Some((edge_id, lane_idx, to));
            return Ok(Some(MoveEvent::Advance {
                from: (edge_id, lane_idx, cell),
                to: (edge_id, lane_idx, to),
            }));
        }

        Ok(None)
    }

    /// Phase 5: post-move bookkeeping. Ages the vehicle and reports the node
    /// to register at when the vehicle now waits at a lane boundary.
    pub(crate) fn did_move(&mut self, edges: &EdgeSet) -> Option<(NodeId, u64, VehicleId)> {
        if self.state != VehicleState::Spawned {
            return None;
        }
        self.age += 1;
        if self.route.is_empty() {
            return None;
        }
        let (edge_id, lane_idx, cell) = self.location.expect("spawned vehicle has a location");
        let edge = &edges[edge_id];
        let distance = edge.length() - cell;
        let max_velocity = self.driver.max_velocity(edge.max_velocity());
        let first_in_lane = edge.lane(lane_idx).next_occupied(cell, distance).is_none();
        if max_velocity >= distance && first_in_lane {
            Some((edge.destination(), self.seq, self.id))
        } else {
            None
        }
    }

    /// Phase 6: a not-yet-spawned vehicle whose delay has elapsed tries to
    /// claim the entry cell of its first route edge. Spawning is never
    /// forced; a full entry defers to a later tick.
    pub(crate) fn try_spawn(&mut self, edges: &EdgeSet) -> SpawnCheck {
        if self.state != VehicleState::NotSpawned {
            return SpawnCheck::Defer;
        }
        let ready = self.age >= self.route.spawn_delay();
        self.age += 1;
        if !ready {
            return SpawnCheck::Defer;
        }
        let Some(first) = self.route.peek() else {
            self.state = VehicleState::Despawned;
            self.driver.on_despawn();
            return SpawnCheck::DespawnUnplaced;
        };
        if edges[first].lane(0).max_insertion_index() >= 0 {
            SpawnCheck::Attempt { edge: first }
        } else {
            SpawnCheck::Defer
        }
    }

    /// Completes a successful spawn attempt: the executor has placed the
    /// vehicle at cell 0 of its first edge.
    pub(crate) fn complete_spawn(&mut self, edge: EdgeId) {
        debug_assert_eq!(self.route.peek(), Some(edge));
        self.route.pop();
        self.state = VehicleState::Spawned;
        self.location = Some((edge, 0, 0));
        self.velocity = 1;
        self.driver.on_spawn();
    }
}
