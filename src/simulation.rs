use crate::crossing::{self, CrossingLogicConfig};
use crate::executor::StepExecutor;
use crate::route::Route;
use crate::vehicle::driver::Driver;
use crate::vehicle::{MoveEvent, SpawnCheck, Vehicle, VehicleState};
use crate::{Graph, SimulationError, VehicleId, VehicleSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The parameters of a simulation run, treated as an immutable snapshot
/// once the simulation is constructed.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    /// Cell size; 7.5 m is the classic Nagel-Schreckenberg value.
    pub meters_per_cell: f64,
    /// Upper bound on any edge's max velocity, in cells per tick.
    pub global_max_velocity: u32,
    /// Seed for all random sources of the run.
    pub seed: u64,
    /// Right-of-way policy.
    pub crossing: CrossingLogicConfig,
    /// Worker pool and chunking parameters.
    pub multi_threading: MultiThreadingConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            meters_per_cell: 7.5,
            global_max_velocity: 6,
            seed: 0,
            crossing: CrossingLogicConfig::default(),
            multi_threading: MultiThreadingConfig::default(),
        }
    }
}

/// Worker pool sizing. A thread count of one (or zero) selects the
/// sequential executor.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultiThreadingConfig {
    pub n_threads: usize,
    pub vehicles_per_chunk: usize,
    pub nodes_per_chunk: usize,
}

impl Default for MultiThreadingConfig {
    fn default() -> Self {
        Self {
            n_threads: 1,
            vehicles_per_chunk: 200,
            nodes_per_chunk: 100,
        }
    }
}

/// A lifecycle change a tick produced for one vehicle. The monitoring layer
/// consumes these from [Simulation::step]'s return value instead of
/// registering callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleTransition {
    /// The vehicle entered the network on its origin edge.
    Spawned,
    /// The vehicle left the network, either at its destination or because
    /// its route was empty to begin with.
    Despawned,
}

/// Cancels a running simulation cooperatively: the next phase boundary of
/// [Simulation::step] notices the interrupt and aborts the tick.
#[derive(Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    /// Requests that the current (or next) tick aborts.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

/// A cellular-automaton traffic simulation over a street graph.
pub struct Simulation {
    /// The street network; occupancy state lives in its lanes.
    graph: Graph,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// The immutable run configuration.
    config: SimulationConfig,
    /// The phase executor, sequential or pooled.
    executor: StepExecutor,
    /// Completed ticks.
    age: u64,
    /// Creation counter handed to vehicles.
    next_seq: u64,
    /// Cooperative cancellation flag, shared with [InterruptHandle]s.
    interrupt: Arc<AtomicBool>,
}

impl Simulation {
    /// Creates a simulation over a finished street graph. The graph is
    /// finalized (crossing indices assigned) if the builder did not do so.
    pub fn new(mut graph: Graph, config: SimulationConfig) -> Self {
        graph.finalize();
        Self {
            graph,
            vehicles: VehicleSet::default(),
            config,
            executor: StepExecutor::new(&config.multi_threading),
            age: 0,
            next_seq: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adds a vehicle in the not-yet-spawned state. The route is validated
    /// against the graph before the vehicle is accepted.
    pub fn add_vehicle(
        &mut self,
        driver: Box<dyn Driver>,
        route: Route,
    ) -> Result<VehicleId, SimulationError> {
        route.validate(&self.graph)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        let rng = ChaCha8Rng::seed_from_u64(
            self.config
                .seed
                .wrapping_add(seq.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        );
        let id = self
            .vehicles
            .insert_with_key(|id| Vehicle::new(id, seq, driver, route, rng));
        Ok(id)
    }

    /// The number of vehicles currently known to the simulation, spawned
    /// or still waiting to spawn.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Iterates over the vehicles currently on the network.
    pub fn spawned_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles
            .values()
            .filter(|veh| veh.state() == VehicleState::Spawned)
    }

    /// Iterates over all vehicles.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a vehicle by ID. Despawned vehicles are removed at the end of
    /// the tick that despawned them.
    pub fn get_vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// Marks a vehicle as blocked or unblocked. A blocked vehicle brakes to
    /// zero and holds its cell until released.
    pub fn set_vehicle_blocked(&mut self, id: VehicleId, blocked: bool) {
        if let Some(vehicle) = self.vehicles.get_mut(id) {
            vehicle.set_blocked(blocked);
        }
    }

    /// Gets the `blocked` attribute of a vehicle.
    pub fn get_vehicle_blocked(&self, id: VehicleId) -> bool {
        self.vehicles.get(id).is_some_and(Vehicle::is_blocked)
    }

    /// The street graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The run configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The number of completed ticks.
    pub fn age(&self) -> u64 {
        self.age
    }

    /// A handle that cancels the simulation between phases.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            flag: Arc::clone(&self.interrupt),
        }
    }

    /// Runs one tick: the fixed phase sequence with a full barrier between
    /// phases. Returns the vehicle lifecycle transitions of the tick.
    ///
    /// On error the tick is aborted and the age stays unchanged; an
    /// interrupted tick leaves the graph in the state of the last completed
    /// phase.
    pub fn step(&mut self) -> Result<Vec<(VehicleId, VehicleTransition)>, SimulationError> {
        let begin = std::time::Instant::now();
        let mut transitions = Vec::new();
        let mut despawned = Vec::new();

        // (1) accelerate and form lane-change intents
        self.check_interrupt()?;
        {
            let Self {
                graph,
                vehicles,
                executor,
                ..
            } = self;
            let (edges, nodes) = (&graph.edges, &graph.nodes);
            let mut set: Vec<&mut Vehicle> = vehicles.values_mut().collect();
            executor.vehicle_phase(&mut set, |veh| {
                veh.accelerate(edges);
                veh.plan_lane_change(edges, nodes);
            });
        }

        // (2) apply lane changes as atomic reservations
        self.check_interrupt()?;
        self.apply_lane_changes()?;

        // (3) brake against obstacles and crossing denials, then dawdle
        self.check_interrupt()?;
        {
            let Self {
                graph,
                vehicles,
                executor,
                ..
            } = self;
            let (edges, nodes) = (&graph.edges, &graph.nodes);
            let mut set: Vec<&mut Vehicle> = vehicles.values_mut().collect();
            executor.vehicle_phase(&mut set, |veh| {
                veh.brake(edges, nodes);
                veh.dawdle();
            });
        }

        // (4) move, transferring occupancy at the barrier
        self.check_interrupt()?;
        let events = {
            let Self {
                graph,
                vehicles,
                executor,
                ..
            } = self;
            let (edges, nodes) = (&graph.edges, &graph.nodes);
            let mut set: Vec<&mut Vehicle> = vehicles.values_mut().collect();
            executor.vehicle_phase(&mut set, |veh| veh.advance(edges, nodes))
        };
        self.apply_move_events(events, &mut transitions, &mut despawned)?;

        // (5) post-move: age vehicles, register boundary vehicles at nodes
        self.check_interrupt()?;
        let registrations = {
            let Self {
                graph,
                vehicles,
                executor,
                ..
            } = self;
            let edges = &graph.edges;
            let mut set: Vec<&mut Vehicle> = vehicles.values_mut().collect();
            executor.vehicle_phase(&mut set, |veh| veh.did_move(edges))
        };
        for (node, seq, vehicle) in registrations.into_iter().flatten() {
            self.graph.nodes[node].register_vehicle(seq, vehicle);
        }

        // (6) spawn newly ready vehicles
        self.check_interrupt()?;
        let checks = {
            let Self {
                graph,
                vehicles,
                executor,
                ..
            } = self;
            let edges = &graph.edges;
            let mut set: Vec<&mut Vehicle> = vehicles.values_mut().collect();
            executor.vehicle_phase(&mut set, |veh| (veh.id, veh.try_spawn(edges)))
        };
        self.apply_spawns(checks, &mut transitions, &mut despawned)?;

        // (7) next tick's crossing grants
        self.check_interrupt()?;
        {
            let Self {
                graph,
                vehicles,
                config,
                executor,
                ..
            } = self;
            let edges = &graph.edges;
            let vehicles = &*vehicles;
            let crossing_config = &config.crossing;
            let mut set: Vec<&mut crate::Node> = graph.nodes.values_mut().collect();
            executor.node_phase(&mut set, |node| {
                crossing::update_node(node, vehicles, edges, crossing_config);
            });
        }

        for id in despawned {
            self.vehicles.remove(id);
        }

        self.age += 1;
        log::trace!(
            "tick {} done in {:?}, {} vehicles, {} transitions",
            self.age,
            begin.elapsed(),
            self.vehicles.len(),
            transitions.len()
        );
        Ok(transitions)
    }

    fn check_interrupt(&self) -> Result<(), SimulationError> {
        if self.interrupt.swap(false, Ordering::Relaxed) {
            log::debug!("tick interrupted at age {}", self.age);
            return Err(SimulationError::Interrupted);
        }
        Ok(())
    }

    /// Performs the queued lane changes. Vehicles are visited in arena
    /// order, so the first claimant of a contested cell wins and the loser
    /// keeps its lane - on every thread count alike.
    fn apply_lane_changes(&mut self) -> Result<(), SimulationError> {
        let Self {
            graph, vehicles, ..
        } = self;
        for (id, vehicle) in vehicles.iter_mut() {
            let Some(target) = vehicle.take_lane_change() else {
                continue;
            };
            let Some((edge_id, lane, cell)) = vehicle.location() else {
                continue;
            };
            let edge = &mut graph.edges[edge_id];
            if edge.lane(target).occupant(cell).is_some() {
                continue;
            }
            let moved = edge.lane_mut(lane).vacate(cell);
            debug_assert_eq!(moved, Some(id));
            edge.place(target, cell, id)?;
            vehicle.set_location((edge_id, target, cell));
        }
        Ok(())
    }

    /// Applies the occupancy bookkeeping of the move phase. Any occupancy
    /// violation aborts the tick: it is a bug, not a condition to skip.
    fn apply_move_events(
        &mut self,
        events: Vec<Result<Option<MoveEvent>, SimulationError>>,
        transitions: &mut Vec<(VehicleId, VehicleTransition)>,
        despawned: &mut Vec<VehicleId>,
    ) -> Result<(), SimulationError> {
        for event in events {
            match event? {
                None => {}
                Some(MoveEvent::Advance { from, to }) => {
                    let vehicle = self.graph.edges[from.0].lane_mut(from.1).vacate(from.2);
                    debug_assert!(vehicle.is_some());
                    if let Some(vehicle) = vehicle {
                        self.graph.edges[to.0].place(to.1, to.2, vehicle)?;
                    }
                }
                Some(MoveEvent::Cross { node, from, to }) => {
                    let vehicle = self.graph.edges[from.0].lane_mut(from.1).vacate(from.2);
                    debug_assert!(vehicle.is_some());
                    if let Some(vehicle) = vehicle {
                        self.graph.edges[to.0].place(to.1, to.2, vehicle)?;
                        self.graph.nodes[node].unregister_vehicle(vehicle);
                    }
                }
                Some(MoveEvent::Despawn { node, from }) => {
                    let vehicle = self.graph.edges[from.0].lane_mut(from.1).vacate(from.2);
                    debug_assert!(vehicle.is_some());
                    if let Some(vehicle) = vehicle {
                        self.graph.nodes[node].unregister_vehicle(vehicle);
                        transitions.push((vehicle, VehicleTransition::Despawned));
                        despawned.push(vehicle);
                        log::debug!("vehicle {vehicle:?} reached its destination");
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolves the spawn attempts of the tick. Attempts are visited in
    /// arena order; the first claimant of an entry cell spawns, later ones
    /// defer to a future tick.
    fn apply_spawns(
        &mut self,
        checks: Vec<(VehicleId, SpawnCheck)>,
        transitions: &mut Vec<(VehicleId, VehicleTransition)>,
        despawned: &mut Vec<VehicleId>,
    ) -> Result<(), SimulationError> {
        for (id, check) in checks {
            match check {
                SpawnCheck::Defer => {}
                SpawnCheck::DespawnUnplaced => {
                    transitions.push((id, VehicleTransition::Despawned));
                    despawned.push(id);
                }
                SpawnCheck::Attempt { edge } => {
                    if self.graph.edges[edge].lane(0).max_insertion_index() < 0 {
                        continue;
                    }
                    self.graph.edges[edge].place(0, 0, id)?;
                    self.vehicles[id].complete_spawn(edge);
                    transitions.push((id, VehicleTransition::Spawned));
                    log::debug!("vehicle {id:?} spawned onto edge {edge:?}");
                }
            }
        }
        Ok(())
    }
}
