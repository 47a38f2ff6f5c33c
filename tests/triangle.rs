//! The 3-4-5 triangle scenario: a single vehicle crossing two edges at
//! constant velocity, with the occupancy invariant audited on every tick.

use microsim::{
    BasicDriver, Coordinate, EdgeAttributes, Graph, NodeId, Orientation, Route, Simulation,
    SimulationConfig, StreetKind, StreetType, VehicleTransition,
};

fn residential(id: u64, origin: NodeId, destination: NodeId, length_m: f64) -> EdgeAttributes {
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

/// Checks the cell-capacity invariant: the lanes' occupancy entries and the
/// spawned vehicles' positions must be the same set, one vehicle per cell.
fn audit_occupancy(sim: &Simulation) {
    let mut cells: Vec<_> = sim
        .graph()
        .edges()
        .flat_map(|(edge_id, edge)| {
            edge.lanes().enumerate().flat_map(move |(lane, l)| {
                l.vehicles().map(move |(cell, veh)| (edge_id, lane as u8, cell, veh))
            })
        })
        .collect();
    let mut vehicles: Vec<_> = sim
        .spawned_vehicles()
        .map(|veh| {
            let (edge, lane, cell) = veh.location().expect("spawned vehicle has a location");
            (edge, lane, cell, veh.id())
        })
        .collect();
    cells.sort();
    vehicles.sort();
    assert_eq!(cells, vehicles, "lane occupancy out of sync at age {}", sim.age());
}

#[test]
fn vehicle_crosses_triangle_in_exact_time() {
    let config = SimulationConfig {
        meters_per_cell: 10.0,
        ..Default::default()
    };
    let mut graph = Graph::new(&config);
    let a = graph.add_node(0, Coordinate::new(48.0, 9.0));
    let b = graph.add_node(1, Coordinate::new(48.0003, 9.0));
    let c = graph.add_node(2, Coordinate::new(48.0003, 9.00055));
    let ab = graph.add_edge(&residential(0, a, b, 30.0));
    let bc = graph.add_edge(&residential(1, b, c, 40.0));
    let ca = graph.add_edge(&residential(2, c, a, 50.0));

    assert_eq!(graph.edge(ab).length(), 3);
    assert_eq!(graph.edge(bc).length(), 4);
    assert_eq!(graph.edge(ca).length(), 5);
    // 30 km/h at 10 m/cell is a single cell per tick.
    assert_eq!(graph.edge(ab).max_velocity(), 1);

    let mut sim = Simulation::new(graph, config);
    let driver = BasicDriver::new(0.0).with_max_velocity(1);
    let veh = sim
        .add_vehicle(Box::new(driver), Route::new([ab, bc], a, c))
        .unwrap();

    let mut spawned_at = None;
    let mut despawned_at = None;
    for _ in 0..20 {
        let transitions = sim.step().unwrap();
        audit_occupancy(&sim);
        for (id, transition) in transitions {
            assert_eq!(id, veh);
            match transition {
                VehicleTransition::Spawned => spawned_at = Some(sim.age()),
                VehicleTransition::Despawned => despawned_at = Some(sim.age()),
            }
        }
    }

    // Despawn follows the spawn after exactly one tick per cell of the
    // two traversed edges.
    let spawned_at = spawned_at.expect("vehicle never spawned");
    let despawned_at = despawned_at.expect("vehicle never despawned");
    assert_eq!(spawned_at, 1);
    assert_eq!(despawned_at - spawned_at, 3 + 4);
    assert_eq!(sim.vehicle_count(), 0);
}

#[test]
fn spawn_defers_while_entry_is_occupied() {
    let config = SimulationConfig {
        meters_per_cell: 10.0,
        ..Default::default()
    };
    let mut graph = Graph::new(&config);
    let a = graph.add_node(0, Coordinate::new(48.0, 9.0));
    let b = graph.add_node(1, Coordinate::new(48.001, 9.0));
    let ab = graph.add_edge(&residential(0, a, b, 100.0));

    let mut sim = Simulation::new(graph, config);
    // The blocker sits at cell 0 and never moves.
    let blocker = sim
        .add_vehicle(
            Box::new(BasicDriver::new(0.0)),
            Route::new([ab], a, b),
        )
        .unwrap();
    let follower = sim
        .add_vehicle(
            Box::new(BasicDriver::new(0.0)),
            Route::new([ab], a, b),
        )
        .unwrap();

    sim.step().unwrap();
    sim.set_vehicle_blocked(blocker, true);
    assert_eq!(sim.get_vehicle(blocker).unwrap().location(), Some((ab, 0, 0)));
    // The follower cannot spawn while cell 0 is taken.
    for _ in 0..5 {
        sim.step().unwrap();
        audit_occupancy(&sim);
        assert_eq!(
            sim.get_vehicle(follower).unwrap().state(),
            microsim::VehicleState::NotSpawned
        );
    }

    sim.set_vehicle_blocked(blocker, false);
    for _ in 0..3 {
        sim.step().unwrap();
        audit_occupancy(&sim);
    }
    // The blocker moved on, so the follower got its entry cell.
    assert_eq!(
        sim.get_vehicle(follower).unwrap().state(),
        microsim::VehicleState::Spawned
    );
}

#[test]
fn empty_route_despawns_without_spawning() {
    let config = SimulationConfig::default();
    let mut graph = Graph::new(&config);
    let a = graph.add_node(0, Coordinate::new(48.0, 9.0));
    let b = graph.add_node(1, Coordinate::new(48.001, 9.0));
    graph.add_edge(&residential(0, a, b, 100.0));

    let mut sim = Simulation::new(graph, config);
    let veh = sim
        .add_vehicle(Box::new(BasicDriver::new(0.0)), Route::new([], a, a))
        .unwrap();

    let transitions = sim.step().unwrap();
    assert_eq!(transitions, vec![(veh, VehicleTransition::Despawned)]);
    assert_eq!(sim.vehicle_count(), 0);
}
