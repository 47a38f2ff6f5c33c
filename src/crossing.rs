//! Intersection arbitration: decides, per node and tick, which of the
//! vehicles waiting at a lane boundary may cross, such that no two granted
//! vehicles claim the same destination cell.

use crate::graph::node::Node;
use crate::vehicle::VehicleState;
use crate::{EdgeId, EdgeSet, VehicleId, VehicleSet};
use arrayvec::ArrayVec;
use smallvec::SmallVec;
use std::cmp::{Ordering, Reverse};

/// Right-of-way policy of a simulation run.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CrossingLogicConfig {
    /// Right-hand traffic; mirrors the right-before-left relation when false.
    pub driving_on_the_right: bool,
    /// Rank candidates by street-type priority first.
    pub edge_priority_enabled: bool,
    /// Rank equal-priority candidates by right-before-left.
    pub priority_to_the_right_enabled: bool,
    /// Grant at most one vehicle per node and tick. See
    /// [is_only_one_vehicle_enabled](Self::is_only_one_vehicle_enabled) for
    /// the effective value.
    pub only_one_vehicle: bool,
    /// Withhold candidates whose target lane is full, so grants are not
    /// wasted on vehicles that cannot move anyway.
    pub friendly_standing_in_jam: bool,
    /// Let a lower-ranked candidate cross in the same tick as long as its
    /// destination is disjoint from every higher-ranked grantee's.
    pub go_without_priority: bool,
}

impl Default for CrossingLogicConfig {
    fn default() -> Self {
        Self {
            driving_on_the_right: true,
            edge_priority_enabled: true,
            priority_to_the_right_enabled: true,
            only_one_vehicle: false,
            friendly_standing_in_jam: true,
            go_without_priority: false,
        }
    }
}

impl CrossingLogicConfig {
    /// Without right-before-left there is no deterministic tie-break between
    /// equal-priority candidates, so crossing hard-degrades to one grantee
    /// per tick regardless of the configured `only_one_vehicle`.
    pub fn is_only_one_vehicle_enabled(&self) -> bool {
        self.only_one_vehicle || !self.priority_to_the_right_enabled
    }
}

/// Upper bound on crossing indices per node; 16 streets meeting in one
/// point is beyond anything map data produces.
const MAX_INDICES: usize = 32;

/// The cyclic index arc a turning vehicle sweeps, from its incoming index
/// to its leaving index.
fn turn_path(origin: u8, destination: u8, supremum: u8) -> ArrayVec<u8, MAX_INDICES> {
    let mut path = ArrayVec::new();
    let mut index = origin;
    while index != destination {
        path.push(index);
        index = (index + 1) % supremum;
    }
    path.push(destination);
    path
}

/// Whether two turning movements cross each other's way.
///
/// Walks the crossing indices once around the node and watches in which
/// order the two movements' endpoints appear: an interleaved A-B-A pattern
/// means the swept arcs overlap partially, i.e. the paths cross. A shared
/// destination always counts as crossing.
pub(crate) fn indices_crossing(
    origin1: u8,
    destination1: u8,
    origin2: u8,
    destination2: u8,
    supremum: u8,
) -> bool {
    let mut i = origin1;
    let mut state_a = true;
    for _ in 0..2 * supremum {
        i = (i + 1) % supremum;
        if state_a {
            if i == origin2 || i == destination2 {
                state_a = false;
            } else if i == destination1 {
                return false;
            }
        } else {
            if i == destination1 || destination1 == destination2 {
                return true;
            }
            if i == origin2 || i == destination2 {
                return false;
            }
        }
    }
    false
}

/// The first index shared by both turn paths, scanning with growing offset;
/// the movement whose origin equals this index comes "from the right" (in
/// right-hand traffic) and outranks the other.
pub(crate) fn leftmost_index_in_matching(
    origin1: u8,
    destination1: u8,
    origin2: u8,
    destination2: u8,
    supremum: u8,
) -> Option<u8> {
    let s1 = turn_path(origin1, destination1, supremum);
    let s2 = turn_path(origin2, destination2, supremum);
    let n = s1.len() + s2.len();
    let first = |j: usize| (j < s1.len()).then(|| s1[j]);
    let second = |j: usize| (j >= s1.len()).then(|| s2[j - s1.len()]);
    for offset in 0..n {
        for j in 0..n - offset {
            if let (Some(a), Some(b)) = (first(j), second(j + offset)) {
                if a == b {
                    return Some(a);
                }
            }
        }
    }
    None
}

/// A waiting vehicle, resolved against the graph for ranking.
struct Candidate {
    vehicle: VehicleId,
    /// Stable creation index; the final deterministic tie-break.
    seq: u64,
    origin_index: u8,
    destination_index: u8,
    /// Street priority of the incoming edge.
    in_priority: u8,
    /// Street priority of the edge the vehicle wants to enter.
    out_priority: u8,
    /// The lane the vehicle would enter.
    target: (EdgeId, u8),
    /// Whether the target lane's entry is currently free.
    has_space: bool,
}

/// Compares two candidates whose turning paths cross. Returns `Equal` for
/// non-crossing paths (the movements are independent) and for ties the
/// configured rules cannot resolve.
fn compare(a: &Candidate, b: &Candidate, supremum: u8, config: &CrossingLogicConfig) -> Ordering {
    if !indices_crossing(
        a.origin_index,
        a.destination_index,
        b.origin_index,
        b.destination_index,
        supremum,
    ) {
        return Ordering::Equal;
    }

    if config.edge_priority_enabled {
        let by_origin = a.in_priority.cmp(&b.in_priority);
        if by_origin != Ordering::Equal {
            return by_origin;
        }
        let by_destination = a.out_priority.cmp(&b.out_priority);
        if by_destination != Ordering::Equal {
            return by_destination;
        }
    }

    if config.priority_to_the_right_enabled {
        let leftmost = leftmost_index_in_matching(
            a.origin_index,
            a.destination_index,
            b.origin_index,
            b.destination_index,
            supremum,
        );
        if leftmost == Some(a.origin_index) {
            return Ordering::Greater;
        }
        if leftmost == Some(b.origin_index) {
            return Ordering::Less;
        }
    }

    Ordering::Equal
}

/// Runs one arbitration pass for a node: collect the waiting vehicles, rank
/// them, and fill the node's granted set for the coming tick.
pub(crate) fn update_node(
    node: &mut Node,
    vehicles: &VehicleSet,
    edges: &EdgeSet,
    config: &CrossingLogicConfig,
) {
    node.granted.clear();
    if node.registered.is_empty() {
        return;
    }

    // Collect: resolve each registered vehicle against the graph. Vehicles
    // that despawned or whose turn is not permitted drop out here.
    let mut candidates: Vec<Candidate> = Vec::with_capacity(node.registered.len());
    for &(seq, vehicle_id) in &node.registered {
        let Some(vehicle) = vehicles.get(vehicle_id) else {
            continue;
        };
        if vehicle.state() != VehicleState::Spawned {
            continue;
        }
        let Some((edge_id, lane, _)) = vehicle.location() else {
            continue;
        };
        let Some(next_edge) = vehicle.route().peek() else {
            continue;
        };
        let (Some(origin_index), Some(destination_index)) =
            (node.incoming_index(edge_id), node.leaving_index(next_edge))
        else {
            continue;
        };
        let Some(target_lane) = node.connector_target(edge_id, lane, next_edge) else {
            continue;
        };
        let has_space = edges[next_edge].lane(target_lane).max_insertion_index() >= 0;
        if config.friendly_standing_in_jam && !has_space {
            continue;
        }
        candidates.push(Candidate {
            vehicle: vehicle_id,
            seq,
            origin_index,
            destination_index,
            in_priority: edges[edge_id].priority(),
            out_priority: edges[next_edge].priority(),
            target: (next_edge, target_lane),
            has_space,
        });
    }
    if candidates.is_empty() {
        return;
    }

    let supremum = node.indices_per_node();

    // Rank: each pairwise win counts one up, each loss one down. Ties beyond
    // the right-of-way rules fall back to the documented total order:
    // incoming crossing index, then vehicle sequence number.
    let mut score = vec![0i32; candidates.len()];
    for i in 0..candidates.len() {
        for j in i + 1..candidates.len() {
            match compare(&candidates[i], &candidates[j], supremum, config) {
                Ordering::Greater => {
                    score[i] += 1;
                    score[j] -= 1;
                }
                Ordering::Less => {
                    score[i] -= 1;
                    score[j] += 1;
                }
                Ordering::Equal => {}
            }
        }
    }
    let mut ranking: Vec<usize> = (0..candidates.len()).collect();
    ranking.sort_by_key(|&i| {
        (
            Reverse(score[i]),
            candidates[i].origin_index,
            candidates[i].seq,
        )
    });

    // Grant: walk the ranking, claiming destination lane entries. Distinct
    // lane entries are disjoint cells, so lane-level claims enforce the
    // cell-capacity invariant across grantees.
    let mut claimed: SmallVec<[(EdgeId, u8); 4]> = SmallVec::new();
    let mut grantees: SmallVec<[usize; 4]> = SmallVec::new();
    for &i in &ranking {
        let candidate = &candidates[i];
        if !candidate.has_space || claimed.contains(&candidate.target) {
            continue;
        }
        let crosses_grantee = grantees.iter().any(|&g| {
            indices_crossing(
                candidate.origin_index,
                candidate.destination_index,
                candidates[g].origin_index,
                candidates[g].destination_index,
                supremum,
            )
        });
        if crosses_grantee && !config.go_without_priority {
            continue;
        }
        node.granted.push(candidate.vehicle);
        claimed.push(candidate.target);
        grantees.push(i);
        if config.is_only_one_vehicle_enabled() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A four-way crossing in right-hand traffic: indices ascend counter-
    // clockwise, leaving before incoming per street.
    //   north: leaving 0, incoming 1     west: leaving 2, incoming 3
    //   south: leaving 4, incoming 5     east: leaving 6, incoming 7
    const SUPREMUM: u8 = 8;

    #[test]
    fn straight_movements_cross() {
        // North->south against west->east.
        assert!(indices_crossing(1, 4, 3, 6, SUPREMUM));
        assert!(indices_crossing(3, 6, 1, 4, SUPREMUM));
    }

    #[test]
    fn opposite_turns_do_not_cross() {
        // North turning west against south turning east.
        assert!(!indices_crossing(1, 2, 5, 6, SUPREMUM));
        assert!(!indices_crossing(5, 6, 1, 2, SUPREMUM));
    }

    #[test]
    fn shared_destination_counts_as_crossing() {
        // North->south and west->south merge into the same edge.
        assert!(indices_crossing(1, 4, 3, 4, SUPREMUM));
    }

    #[test]
    fn right_before_left_picks_the_right_vehicle() {
        // North->south meets west->east; the west vehicle approaches from
        // the right of the north vehicle and its origin wins the matching.
        let leftmost = leftmost_index_in_matching(1, 4, 3, 6, SUPREMUM);
        assert_eq!(leftmost, Some(3));
    }

    #[test]
    fn compare_prefers_the_right() {
        let config = CrossingLogicConfig::default();
        let from_north = candidate(1, 1, 4);
        let from_west = candidate(2, 3, 6);
        assert_eq!(
            compare(&from_north, &from_west, SUPREMUM, &config),
            Ordering::Less
        );
        assert_eq!(
            compare(&from_west, &from_north, SUPREMUM, &config),
            Ordering::Greater
        );
    }

    #[test]
    fn compare_prefers_street_priority() {
        let config = CrossingLogicConfig::default();
        let mut from_north = candidate(1, 1, 4);
        from_north.in_priority = 14; // e.g. a secondary road
        let from_west = candidate(2, 3, 6);
        assert_eq!(
            compare(&from_north, &from_west, SUPREMUM, &config),
            Ordering::Greater
        );
    }

    #[test]
    fn compare_without_tie_break_is_equal() {
        let config = CrossingLogicConfig {
            priority_to_the_right_enabled: false,
            ..CrossingLogicConfig::default()
        };
        assert!(config.is_only_one_vehicle_enabled());
        let from_north = candidate(1, 1, 4);
        let from_west = candidate(2, 3, 6);
        assert_eq!(
            compare(&from_north, &from_west, SUPREMUM, &config),
            Ordering::Equal
        );
    }

    fn candidate(seq: u64, origin_index: u8, destination_index: u8) -> Candidate {
        Candidate {
            vehicle: VehicleId::default(),
            seq,
            origin_index,
            destination_index,
            in_priority: 10,
            out_priority: 10,
            target: (EdgeId::default(), 0),
            has_space: true,
        }
    }
}
