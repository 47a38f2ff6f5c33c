use crate::{EdgeId, NodeId, SimulationError, VehicleId};

/// A directed street between two nodes, carrying one or more lanes.
///
/// The two travel directions of a physical street are two independent
/// `DirectedEdge`s which share geometry but no state.
#[derive(Clone)]
pub struct DirectedEdge {
    /// The edge ID.
    pub(crate) id: EdgeId,
    /// The id of the street this edge was built from, e.g. an OSM way id.
    external_id: u64,
    /// Which direction of the underlying street this edge represents.
    orientation: Orientation,
    /// The node this edge leaves.
    origin: NodeId,
    /// The node this edge enters.
    destination: NodeId,
    /// Street length in metres, as supplied by the map data.
    length_m: f64,
    /// Street length in cells.
    length: u32,
    /// Max velocity in cells per tick.
    max_velocity: u32,
    /// Right-of-way rank of the street type.
    priority: u8,
    /// The lanes, outermost first.
    lanes: Vec<Lane>,
}

/// The attributes of a directed edge.
#[derive(Clone, Copy, Debug)]
pub struct EdgeAttributes {
    /// External street id; together with `orientation` it identifies the edge.
    pub id: u64,
    /// The direction of travel relative to the underlying street.
    pub orientation: Orientation,
    /// The node the edge leaves.
    pub origin: NodeId,
    /// The node the edge enters.
    pub destination: NodeId,
    /// Street length in metres.
    pub length_m: f64,
    /// Number of lanes in this direction.
    pub lanes: u8,
    /// Speed limit in km/h.
    pub max_velocity_kmh: f64,
    /// The street classification, which decides right-of-way rank.
    pub street_type: StreetType,
}

/// The direction of a [DirectedEdge] relative to its underlying street.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Orientation {
    Forwards,
    Backwards,
}

/// An OSM-style street classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StreetType {
    pub kind: StreetKind,
    /// Whether this is a link street (on/off ramp) of its kind.
    pub link: bool,
    /// Roundabout carriageways outrank everything else.
    pub roundabout: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StreetKind {
    Road,
    Track,
    Service,
    LivingStreet,
    Residential,
    Unclassified,
    Tertiary,
    Secondary,
    Primary,
    Trunk,
    Motorway,
}

impl StreetType {
    pub const fn new(kind: StreetKind) -> Self {
        Self {
            kind,
            link: false,
            roundabout: false,
        }
    }

    /// The right-of-way rank of this street type; higher ranks win.
    pub fn priority(&self) -> u8 {
        if self.roundabout {
            return u8::MAX;
        }
        let rank = self.kind as u8 + 1;
        let mut priority = 2 * rank;
        if self.link {
            priority -= 1;
        }
        priority
    }
}

/// Number of cells of an edge of the given length.
///
/// Together with [cell_velocity_from_kmh] this is the only place real-world
/// units enter the automaton; everything downstream is integer cells.
pub fn cells_from_meters(length_m: f64, meters_per_cell: f64) -> u32 {
    u32::max(2, (length_m / meters_per_cell).ceil() as u32)
}

/// Approximate metre length of a cell run, the inverse of [cells_from_meters].
pub fn meters_from_cells(cells: u32, meters_per_cell: f64) -> f64 {
    cells as f64 * meters_per_cell
}

/// Max velocity in cells per tick for a speed limit in km/h.
pub fn cell_velocity_from_kmh(kmh: f64, meters_per_cell: f64) -> u32 {
    u32::max(1, (kmh / 3.6 / meters_per_cell).round() as u32)
}

impl DirectedEdge {
    /// Creates a new edge, computing its cell count and cell velocity.
    pub(crate) fn new(
        id: EdgeId,
        attribs: &EdgeAttributes,
        meters_per_cell: f64,
        global_max_velocity: u32,
    ) -> Self {
        let length = cells_from_meters(attribs.length_m, meters_per_cell);
        let max_velocity = u32::min(
            cell_velocity_from_kmh(attribs.max_velocity_kmh, meters_per_cell),
            global_max_velocity,
        );
        let num_lanes = usize::max(1, attribs.lanes as usize);
        Self {
            id,
            external_id: attribs.id,
            orientation: attribs.orientation,
            origin: attribs.origin,
            destination: attribs.destination,
            length_m: attribs.length_m,
            length,
            max_velocity,
            priority: attribs.street_type.priority(),
            lanes: (0..num_lanes).map(|_| Lane::new(length)).collect(),
        }
    }

    /// Gets the edge's ID.
    pub fn id(&self) -> EdgeId {
        self.id
    }

    /// The external street id this edge was built from.
    pub fn external_id(&self) -> u64 {
        self.external_id
    }

    /// The direction of travel relative to the underlying street.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// The node this edge leaves.
    pub fn origin(&self) -> NodeId {
        self.origin
    }

    /// The node this edge enters.
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// The length of the edge in cells.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// The length of the edge in metres.
    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    /// Max velocity in cells per tick.
    pub fn max_velocity(&self) -> u32 {
        self.max_velocity
    }

    /// The street-type right-of-way rank.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Time to traverse the edge at its max velocity, in milliseconds,
    /// assuming one tick per second.
    pub fn time_cost_millis(&self) -> f64 {
        1000.0 * self.length as f64 / self.max_velocity as f64
    }

    /// The number of lanes.
    pub fn num_lanes(&self) -> u8 {
        self.lanes.len() as u8
    }

    /// Gets a lane by index, outermost first.
    pub fn lane(&self, index: u8) -> &Lane {
        &self.lanes[index as usize]
    }

    pub(crate) fn lane_mut(&mut self, index: u8) -> &mut Lane {
        &mut self.lanes[index as usize]
    }

    /// Iterates over the lanes.
    pub fn lanes(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.iter()
    }

    /// Places a vehicle, reporting an occupancy violation with full context.
    pub(crate) fn place(
        &mut self,
        lane: u8,
        cell: u32,
        vehicle: VehicleId,
    ) -> Result<(), SimulationError> {
        let id = self.id;
        self.lane_mut(lane)
            .place(cell, vehicle)
            .map_err(|_| SimulationError::CellOccupied {
                edge: id,
                lane,
                cell,
            })
    }
}

/// A single lane: a fixed array of cells, each holding at most one vehicle.
#[derive(Clone)]
pub struct Lane {
    cells: Vec<Option<VehicleId>>,
}

impl Lane {
    fn new(length: u32) -> Self {
        Self {
            cells: vec![None; length as usize],
        }
    }

    /// The number of cells.
    pub fn len(&self) -> u32 {
        self.cells.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// The vehicle occupying the given cell, if any.
    pub fn occupant(&self, cell: u32) -> Option<VehicleId> {
        self.cells[cell as usize]
    }

    /// The number of vehicles on the lane.
    pub fn vehicle_count(&self) -> usize {
        self.cells.iter().flatten().count()
    }

    /// Iterates over `(cell, vehicle)` pairs in ascending cell order.
    pub fn vehicles(&self) -> impl Iterator<Item = (u32, VehicleId)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(cell, veh)| veh.map(|v| (cell as u32, v)))
    }

    /// Puts a vehicle into a cell. Fails with the current occupant if the
    /// cell is not free; the cell is left untouched in that case.
    pub(crate) fn place(&mut self, cell: u32, vehicle: VehicleId) -> Result<(), VehicleId> {
        let slot = &mut self.cells[cell as usize];
        match slot {
            Some(occupant) => Err(*occupant),
            None => {
                *slot = Some(vehicle);
                Ok(())
            }
        }
    }

    /// Clears a cell, returning the vehicle that was in it.
    pub(crate) fn vacate(&mut self, cell: u32) -> Option<VehicleId> {
        self.cells[cell as usize].take()
    }

    /// The first occupied cell, counted from the lane start.
    pub fn first_occupied(&self) -> Option<u32> {
        self.cells.iter().position(Option::is_some).map(|c| c as u32)
    }

    /// The highest cell a newly entering vehicle could land on, or -1 if the
    /// lane entry is blocked.
    pub fn max_insertion_index(&self) -> i64 {
        match self.first_occupied() {
            Some(cell) => cell as i64 - 1,
            None => self.len() as i64 - 1,
        }
    }

    /// The first occupied cell strictly ahead of `cell`, looking at most
    /// `limit` cells and never past the lane end.
    pub fn next_occupied(&self, cell: u32, limit: u32) -> Option<u32> {
        let last = u32::min(cell.saturating_add(limit), self.len() - 1);
        (cell + 1..=last).find(|c| self.cells[*c as usize].is_some())
    }

    /// Number of free cells strictly ahead of `cell`, looking at most
    /// `limit` cells and never past the lane end.
    pub fn gap_ahead(&self, cell: u32, limit: u32) -> u32 {
        let last = u32::min(cell.saturating_add(limit), self.len() - 1);
        match self.next_occupied(cell, limit) {
            Some(occupied) => occupied - cell - 1,
            None => last - cell,
        }
    }
}
