pub use crossing::CrossingLogicConfig;
pub use error::{RouteDefect, SimulationError};
pub use geom::Coordinate;
pub use graph::edge::{DirectedEdge, EdgeAttributes, Lane, Orientation, StreetKind, StreetType};
pub use graph::node::Node;
pub use graph::Graph;
pub use route::Route;
pub use routing::ch::{ContractionHierarchies, Metric};
pub use routing::AStar;
pub use simulation::{
    InterruptHandle, MultiThreadingConfig, Simulation, SimulationConfig, VehicleTransition,
};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use vehicle::driver::{BasicDriver, Driver};
pub use vehicle::{Vehicle, VehicleState};

mod crossing;
mod error;
mod executor;
pub mod geom;
mod graph;
mod route;
mod routing;
mod simulation;
mod vehicle;

new_key_type! {
    /// Unique ID of a [Node].
    pub struct NodeId;
    /// Unique ID of a [DirectedEdge].
    pub struct EdgeId;
    /// Unique ID of a [Vehicle].
    pub struct VehicleId;
}

type NodeSet = SlotMap<NodeId, Node>;
type EdgeSet = SlotMap<EdgeId, DirectedEdge>;
type VehicleSet = SlotMap<VehicleId, Vehicle>;
