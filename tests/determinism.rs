//! The same scenario must produce identical trajectories tick for tick,
//! no matter how many worker threads execute the phases.

use microsim::{
    AStar, BasicDriver, Coordinate, EdgeAttributes, EdgeId, Graph, MultiThreadingConfig, NodeId,
    Orientation, Simulation, SimulationConfig, SimulationError, StreetKind, StreetType,
    VehicleState,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const GRID: usize = 4;
const VEHICLES: usize = 24;
const TICKS: usize = 150;

fn build_grid(config: &SimulationConfig) -> (Graph, Vec<NodeId>) {
    let mut graph = Graph::new(config);
    let nodes: Vec<NodeId> = (0..GRID * GRID)
        .map(|i| {
            let (x, y) = (i % GRID, i / GRID);
            graph.add_node(
                i as u64,
                Coordinate::new(48.0 + y as f64 * 0.001, 9.0 + x as f64 * 0.001),
            )
        })
        .collect();
    let mut street = 0u64;
    for y in 0..GRID {
        for x in 0..GRID {
            let here = nodes[y * GRID + x];
            let connect = |graph: &mut Graph, a: NodeId, b: NodeId, id: u64| {
                for (orientation, origin, destination) in [
                    (Orientation::Forwards, a, b),
                    (Orientation::Backwards, b, a),
                ] {
                    graph.add_edge(&EdgeAttributes {
                        id,
                        orientation,
                        origin,
                        destination,
                        length_m: 110.0,
                        lanes: 2,
                        max_velocity_kmh: 50.0,
                        street_type: StreetType::new(StreetKind::Residential),
                    });
                }
            };
            if x + 1 < GRID {
                connect(&mut graph, here, nodes[y * GRID + x + 1], street);
                street += 1;
            }
            if y + 1 < GRID {
                connect(&mut graph, here, nodes[(y + 1) * GRID + x], street);
                street += 1;
            }
        }
    }
    (graph, nodes)
}

type Snapshot = Vec<(u64, VehicleState, Option<(EdgeId, u8, u32)>, u32)>;

fn audit_occupancy(sim: &Simulation) {
    let mut cells: Vec<_> = sim
        .graph()
        .edges()
        .flat_map(|(edge_id, edge)| {
            edge.lanes().enumerate().flat_map(move |(lane, l)| {
                l.vehicles()
                    .map(move |(cell, veh)| (edge_id, lane as u8, cell, veh))
            })
        })
        .collect();
    let mut vehicles: Vec<_> = sim
        .spawned_vehicles()
        .map(|veh| {
            let (edge, lane, cell) = veh.location().unwrap();
            (edge, lane, cell, veh.id())
        })
        .collect();
    cells.sort();
    vehicles.sort();
    assert_eq!(cells, vehicles, "occupancy out of sync at age {}", sim.age());
}

/// Runs the reference scenario and returns one snapshot per tick.
fn run_scenario(n_threads: usize) -> Vec<Snapshot> {
    let config = SimulationConfig {
        meters_per_cell: 10.0,
        seed: 99,
        multi_threading: MultiThreadingConfig {
            n_threads,
            // Tiny chunks so the pool actually splits the working set.
            vehicles_per_chunk: 3,
            nodes_per_chunk: 2,
        },
        ..Default::default()
    };
    let (graph, nodes) = build_grid(&config);
    let mut sim = Simulation::new(graph, config);

    let scout = AStar::shortest_way_dijkstra();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    for driver in BasicDriver::randomised(VEHICLES, 0.2, 0.1, 77) {
        let start = nodes[rng.gen_range(0..nodes.len())];
        let end = nodes[rng.gen_range(0..nodes.len())];
        let Some(route) = scout.find_shortest_path(sim.graph(), start, end) else {
            continue;
        };
        let route = route.with_spawn_delay(rng.gen_range(0..10));
        sim.add_vehicle(Box::new(driver), route).unwrap();
    }

    let mut snapshots = Vec::with_capacity(TICKS);
    for _ in 0..TICKS {
        sim.step().unwrap();
        audit_occupancy(&sim);
        let mut snapshot: Snapshot = sim
            .iter_vehicles()
            .map(|veh| (veh.seq(), veh.state(), veh.location(), veh.velocity()))
            .collect();
        snapshot.sort_by_key(|entry| entry.0);
        snapshots.push(snapshot);
    }
    snapshots
}

#[test]
fn single_and_multi_threaded_runs_are_identical() {
    let sequential = run_scenario(1);
    let parallel = run_scenario(4);
    for (tick, (a, b)) in sequential.iter().zip(parallel.iter()).enumerate() {
        assert_eq!(a, b, "trajectories diverged at tick {}", tick + 1);
    }
}

#[test]
fn interrupt_aborts_the_tick_and_leaves_age_unchanged() {
    let config = SimulationConfig {
        meters_per_cell: 10.0,
        ..Default::default()
    };
    let (graph, _) = build_grid(&config);
    let mut sim = Simulation::new(graph, config);

    sim.step().unwrap();
    assert_eq!(sim.age(), 1);

    let handle = sim.interrupt_handle();
    handle.interrupt();
    assert_eq!(sim.step(), Err(SimulationError::Interrupted));
    assert_eq!(sim.age(), 1);

    // The interrupt is consumed; the simulation carries on afterwards.
    sim.step().unwrap();
    assert_eq!(sim.age(), 2);
}
