use crate::{EdgeId, VehicleId};
use thiserror::Error;

/// Errors surfaced by the simulation core.
///
/// Unreachable routing destinations are deliberately not represented here;
/// path queries return `None` and leave the decision to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// A vehicle was placed into a cell that already holds another vehicle.
    /// This is an occupancy-invariant violation and aborts the running tick.
    #[error("cell {cell} of lane {lane} on edge {edge:?} is already occupied")]
    CellOccupied { edge: EdgeId, lane: u8, cell: u32 },

    /// A route is inconsistent with its declared endpoints, or a vehicle ran
    /// out of route edges before reaching its destination.
    #[error("route of vehicle {vehicle:?} is undefined: {reason}")]
    RouteUndefined {
        vehicle: Option<VehicleId>,
        reason: RouteDefect,
    },

    /// A tick was cancelled between phases via an [InterruptHandle].
    ///
    /// [InterruptHandle]: crate::InterruptHandle
    #[error("simulation step was interrupted")]
    Interrupted,
}

/// The specific way in which a route failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDefect {
    Empty,
    DisconnectedAt(usize),
    WrongOrigin,
    WrongDestination,
    ExhaustedEarly,
}

impl std::fmt::Display for RouteDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "route contains no edges"),
            Self::DisconnectedAt(i) => {
                write!(f, "edges {} and {} do not share a node", i, i + 1)
            }
            Self::WrongOrigin => write!(f, "first edge does not leave the declared origin"),
            Self::WrongDestination => {
                write!(f, "last edge does not reach the declared destination")
            }
            Self::ExhaustedEarly => {
                write!(f, "no next edge although the destination is not reached")
            }
        }
    }
}
