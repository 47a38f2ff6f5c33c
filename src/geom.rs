//! Geographic coordinates and the small amount of planar geometry the
//! crossing logic and routing heuristics need.

use cgmath::prelude::*;
use cgmath::Vector2;

/// A 2D direction vector.
pub type Vector2d = Vector2<f64>;

/// Mean earth radius in metres.
const EARTH_RADIUS: f64 = 6_371_000.0;

/// A geographic coordinate in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    /// Creates a new coordinate.
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in metres (haversine formula).
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (0.5 * dlat).sin().powi(2) + lat1.cos() * lat2.cos() * (0.5 * dlon).sin().powi(2);
        2.0 * EARTH_RADIUS * a.sqrt().asin()
    }

    /// Unit vector pointing from this coordinate towards `other`, in a local
    /// east/north plane. Good enough at street scale, where edges span a few
    /// hundred metres at most.
    pub fn direction_to(&self, other: &Coordinate) -> Vector2d {
        let east = (other.lon - self.lon).to_radians() * self.lat.to_radians().cos();
        let north = (other.lat - self.lat).to_radians();
        let v = Vector2d::new(east, north);
        if v.magnitude2() > 0.0 {
            v.normalize()
        } else {
            Vector2d::new(1.0, 0.0)
        }
    }
}

/// The angle of `v`, measured from `zero` in the given turn direction,
/// in `[0, 2pi)`. The `zero` vector itself maps to 0 either way.
fn directed_angle(zero: Vector2d, v: Vector2d, counter_clockwise: bool) -> f64 {
    let ccw = f64::atan2(zero.perp_dot(v), zero.dot(v));
    let signed = if counter_clockwise { ccw } else { -ccw };
    signed.rem_euclid(std::f64::consts::TAU)
}

/// Sorts direction vectors clockwise, starting at the `zero` reference.
/// With `counter_clockwise` the turn direction mirrors, which is how nodes
/// derive left-hand-traffic crossing indices from the same geometry.
pub fn sort_clockwise<T>(
    zero: Vector2d,
    items: &mut [(Vector2d, T)],
    counter_clockwise: bool,
) {
    items.sort_by(|a, b| {
        let x = directed_angle(zero, a.0, counter_clockwise);
        let y = directed_angle(zero, b.0, counter_clockwise);
        x.total_cmp(&y)
    });
}
