//! Right-of-way scenarios on a plus-shaped crossroad.

use microsim::{
    BasicDriver, Coordinate, CrossingLogicConfig, EdgeAttributes, EdgeId, Graph, NodeId,
    Orientation, Route, Simulation, SimulationConfig, StreetKind, StreetType, VehicleId,
};

const NORTH: usize = 0;
const EAST: usize = 1;
const SOUTH: usize = 2;
const WEST: usize = 3;

/// Node and edge handles of the plus crossing, indexed north/east/south/west.
struct Roads {
    outer: [NodeId; 4],
    inbound: [EdgeId; 4],
    outbound: [EdgeId; 4],
}

/// Builds a plus crossing with 50 m arms. Every arm is residential unless
/// its index is in `primary`.
fn plus_crossing(config: &SimulationConfig, primary: &[usize]) -> (Graph, Roads) {
    let mut graph = Graph::new(config);
    let center = graph.add_node(4, Coordinate::new(48.0, 9.0));
    let coords = [
        Coordinate::new(48.0005, 9.0),
        Coordinate::new(48.0, 9.0005),
        Coordinate::new(47.9995, 9.0),
        Coordinate::new(48.0, 8.9995),
    ];
    let outer = std::array::from_fn(|i| graph.add_node(i as u64, coords[i]));

    let mut inbound = [EdgeId::default(); 4];
    let mut outbound = [EdgeId::default(); 4];
    for i in 0..4 {
        let street_type = if primary.contains(&i) {
            StreetType::new(StreetKind::Primary)
        } else {
            StreetType::new(StreetKind::Residential)
        };
        let attribs = |orientation, origin, destination| EdgeAttributes {
            id: i as u64,
            orientation,
            origin,
            destination,
            length_m: 50.0,
            lanes: 1,
            max_velocity_kmh: 30.0,
            street_type,
        };
        inbound[i] = graph.add_edge(&attribs(Orientation::Forwards, outer[i], center));
        outbound[i] = graph.add_edge(&attribs(Orientation::Backwards, center, outer[i]));
    }

    (
        graph,
        Roads {
            outer,
            inbound,
            outbound,
        },
    )
}

fn config(crossing: CrossingLogicConfig) -> SimulationConfig {
    SimulationConfig {
        meters_per_cell: 10.0,
        crossing,
        ..Default::default()
    }
}

/// Starts a vehicle travelling from one arm across the crossing.
fn add_vehicle(sim: &mut Simulation, roads: &Roads, from: usize, to: usize) -> VehicleId {
    let route = Route::new(
        [roads.inbound[from], roads.outbound[to]],
        roads.outer[from],
        roads.outer[to],
    );
    sim.add_vehicle(Box::new(BasicDriver::new(0.0)), route)
        .unwrap()
}

/// Runs until every vehicle stands at the crossing boundary and the grants
/// for the next tick are decided: one spawn tick, then one tick per cell.
fn run_to_boundary(sim: &mut Simulation) {
    for _ in 0..5 {
        sim.step().unwrap();
    }
    for veh in sim.spawned_vehicles() {
        let (_, _, cell) = veh.location().unwrap();
        assert_eq!(cell, 4, "vehicle not at the boundary yet");
    }
}

fn location(sim: &Simulation, id: VehicleId) -> (EdgeId, u8, u32) {
    sim.get_vehicle(id).unwrap().location().unwrap()
}

#[test]
fn right_before_left_grants_the_vehicle_from_the_right() {
    let crossing = CrossingLogicConfig {
        go_without_priority: false,
        ..Default::default()
    };
    let (graph, roads) = plus_crossing(&config(crossing), &[]);
    let mut sim = Simulation::new(graph, config(crossing));
    let from_north = add_vehicle(&mut sim, &roads, NORTH, SOUTH);
    let from_west = add_vehicle(&mut sim, &roads, WEST, EAST);

    run_to_boundary(&mut sim);
    sim.step().unwrap();

    // The west vehicle approaches from the north vehicle's right: it
    // crosses, the other one holds its cell for this tick.
    assert_eq!(location(&sim, from_west), (roads.outbound[EAST], 0, 0));
    assert_eq!(location(&sim, from_north), (roads.inbound[NORTH], 0, 4));
    assert_eq!(sim.get_vehicle(from_north).unwrap().velocity(), 0);

    // Freed crossing: the held vehicle goes next tick.
    sim.step().unwrap();
    assert_eq!(location(&sim, from_north), (roads.outbound[SOUTH], 0, 0));
}

#[test]
fn left_hand_traffic_mirrors_the_relation() {
    let crossing = CrossingLogicConfig {
        driving_on_the_right: false,
        go_without_priority: false,
        ..Default::default()
    };
    let (graph, roads) = plus_crossing(&config(crossing), &[]);
    let mut sim = Simulation::new(graph, config(crossing));
    let from_north = add_vehicle(&mut sim, &roads, NORTH, SOUTH);
    let from_west = add_vehicle(&mut sim, &roads, WEST, EAST);

    run_to_boundary(&mut sim);
    sim.step().unwrap();

    assert_eq!(location(&sim, from_north), (roads.outbound[SOUTH], 0, 0));
    assert_eq!(location(&sim, from_west), (roads.inbound[WEST], 0, 4));
}

#[test]
fn street_priority_outranks_right_before_left() {
    let crossing = CrossingLogicConfig {
        go_without_priority: false,
        ..Default::default()
    };
    // The north-south road is primary, so the north vehicle wins although
    // the west vehicle comes from its right.
    let (graph, roads) = plus_crossing(&config(crossing), &[NORTH, SOUTH]);
    let mut sim = Simulation::new(graph, config(crossing));
    let from_north = add_vehicle(&mut sim, &roads, NORTH, SOUTH);
    let from_west = add_vehicle(&mut sim, &roads, WEST, EAST);

    run_to_boundary(&mut sim);
    sim.step().unwrap();

    assert_eq!(location(&sim, from_north), (roads.outbound[SOUTH], 0, 0));
    assert_eq!(location(&sim, from_west), (roads.inbound[WEST], 0, 4));
}

#[test]
fn without_right_priority_exactly_one_crosses() {
    let crossing = CrossingLogicConfig {
        priority_to_the_right_enabled: false,
        ..Default::default()
    };
    assert!(crossing.is_only_one_vehicle_enabled());

    let (graph, roads) = plus_crossing(&config(crossing), &[]);
    let mut sim = Simulation::new(graph, config(crossing));
    let vehicles = [
        add_vehicle(&mut sim, &roads, NORTH, SOUTH),
        add_vehicle(&mut sim, &roads, WEST, EAST),
    ];

    run_to_boundary(&mut sim);
    sim.step().unwrap();

    let crossed = |sim: &Simulation| {
        vehicles
            .iter()
            .filter(|id| roads.outbound.contains(&location(sim, **id).0))
            .count()
    };
    assert_eq!(crossed(&sim), 1, "exactly one grant per tick");

    sim.step().unwrap();
    assert_eq!(crossed(&sim), 2);
}

#[test]
fn disjoint_turns_cross_in_the_same_tick() {
    let crossing = CrossingLogicConfig {
        go_without_priority: false,
        ..Default::default()
    };
    let (graph, roads) = plus_crossing(&config(crossing), &[]);
    let mut sim = Simulation::new(graph, config(crossing));

    // North turns west while south turns east; the paths never meet, so
    // both may go in one tick even though only disjoint grants are allowed.
    let north_to_west = add_vehicle(&mut sim, &roads, NORTH, WEST);
    let south_to_east = add_vehicle(&mut sim, &roads, SOUTH, EAST);

    run_to_boundary(&mut sim);
    sim.step().unwrap();

    assert_eq!(location(&sim, north_to_west), (roads.outbound[WEST], 0, 0));
    assert_eq!(location(&sim, south_to_east), (roads.outbound[EAST], 0, 0));
}
