use microsim::{
    AStar, BasicDriver, Coordinate, EdgeAttributes, Graph, MultiThreadingConfig, NodeId,
    Orientation, Simulation, SimulationConfig, StreetKind, StreetType, VehicleTransition,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Instant;

const GRID: usize = 12;
const VEHICLES: usize = 600;
const TICKS: usize = 1_000;

fn main() {
    env_logger::init();

    let config = SimulationConfig {
        seed: 1234,
        multi_threading: MultiThreadingConfig {
            n_threads: 4,
            ..Default::default()
        },
        ..Default::default()
    };

    let (graph, nodes) = build_grid(GRID, &config);
    let mut sim = Simulation::new(graph, config);

    let scout = AStar::fastest_way(config.meters_per_cell, config.global_max_velocity);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut added = 0usize;
    for driver in BasicDriver::randomised(VEHICLES, 0.2, 0.05, config.seed) {
        let start = nodes[rng.gen_range(0..nodes.len())];
        let end = nodes[rng.gen_range(0..nodes.len())];
        let Some(route) = scout.find_shortest_path(sim.graph(), start, end) else {
            continue;
        };
        if route.is_empty() {
            continue;
        }
        let route = route.with_spawn_delay(rng.gen_range(0..100));
        if sim.add_vehicle(Box::new(driver), route).is_ok() {
            added += 1;
        }
    }
    log::info!("simulating {added} vehicles on a {GRID}x{GRID} grid");

    let begin = Instant::now();
    let mut finished = 0usize;
    for _ in 0..TICKS {
        match sim.step() {
            Ok(transitions) => {
                finished += transitions
                    .iter()
                    .filter(|(_, t)| *t == VehicleTransition::Despawned)
                    .count();
            }
            Err(err) => {
                log::error!("tick failed: {err}");
                break;
            }
        }
    }
    let elapsed = begin.elapsed();
    log::info!(
        "{} ticks in {:?} ({:.0} ticks/s), {} vehicles arrived, {} still travelling",
        sim.age(),
        elapsed,
        sim.age() as f64 / elapsed.as_secs_f64(),
        finished,
        sim.vehicle_count(),
    );
}

/// Builds a Manhattan grid with two-way residential streets.
fn build_grid(n: usize, config: &SimulationConfig) -> (Graph, Vec<NodeId>) {
    let mut graph = Graph::new(config);
    let spacing = 0.001; // degrees, roughly 100 m
    let nodes: Vec<NodeId> = (0..n * n)
        .map(|i| {
            let (x, y) = (i % n, i / n);
            graph.add_node(
                i as u64,
                Coordinate::new(48.0 + y as f64 * spacing, 9.0 + x as f64 * spacing),
            )
        })
        .collect();

    let mut street = 0u64;
    let mut connect = |graph: &mut Graph, a: NodeId, b: NodeId| {
        let length_m = graph
            .node(a)
            .coordinate()
            .distance(&graph.node(b).coordinate());
        for (orientation, origin, destination) in [
            (Orientation::Forwards, a, b),
            (Orientation::Backwards, b, a),
        ] {
            graph.add_edge(&EdgeAttributes {
                id: street,
                orientation,
                origin,
                destination,
                length_m,
                lanes: 1,
                max_velocity_kmh: 30.0,
                street_type: StreetType::new(StreetKind::Residential),
            });
        }
        street += 1;
    };

    for y in 0..n {
        for x in 0..n {
            let here = nodes[y * n + x];
            if x + 1 < n {
                connect(&mut graph, here, nodes[y * n + x + 1]);
            }
            if y + 1 < n {
                connect(&mut graph, here, nodes[(y + 1) * n + x]);
            }
        }
    }
    (graph, nodes)
}
