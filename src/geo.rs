use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn distance_to(&self, other: &Coord) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Great-circle distance between two points in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Travel direction of a route variant, taken from its dominant axis of displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Compares the absolute latitude and longitude deltas between `start` and `end`.
    /// Equal deltas count as north/south. Returns `None` when the points coincide.
    pub fn between(start: Coord, end: Coord) -> Option<Self> {
        let d_lat = end.lat - start.lat;
        let d_lon = end.lon - start.lon;

        if d_lat == 0.0 && d_lon == 0.0 {
            return None;
        }

        let direction = if d_lat.abs() >= d_lon.abs() {
            if d_lat > 0.0 {
                Direction::North
            } else {
                Direction::South
            }
        } else if d_lon > 0.0 {
            Direction::East
        } else {
            Direction::West
        };

        Some(direction)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::North => "Northbound",
            Direction::South => "Southbound",
            Direction::East => "Eastbound",
            Direction::West => "Westbound",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        assert_eq!(haversine_distance(40.7128, -74.0060, 40.7128, -74.0060), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = Coord::new(40.7128, -74.0060);
        let b = Coord::new(40.7228, -74.0160);
        assert!(a.distance_to(&b) > 0.0);
        assert_eq!(a.distance_to(&b), b.distance_to(&a));
    }

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_distance(40.0, -74.0, 41.0, -74.0);
        assert!((d - 111_000.0).abs() < 1_500.0, "got {d}");
    }

    #[test]
    fn pole_to_pole_is_half_circumference() {
        let d = haversine_distance(90.0, 0.0, -90.0, 0.0);
        assert!(d > 19_000_000.0 && d < 21_000_000.0);
    }

    #[test]
    fn across_the_prime_meridian() {
        let d = haversine_distance(51.5074, -0.1278, 51.5074, 0.1278);
        assert!(d > 0.0 && d < 50_000.0);
    }

    #[test]
    fn compass_directions() {
        let origin = Coord::new(40.0, -74.0);
        assert_eq!(Direction::between(origin, Coord::new(41.0, -74.0)), Some(Direction::North));
        assert_eq!(Direction::between(Coord::new(41.0, -74.0), origin), Some(Direction::South));
        assert_eq!(Direction::between(Coord::new(40.0, -75.0), origin), Some(Direction::East));
        assert_eq!(Direction::between(origin, Coord::new(40.0, -75.0)), Some(Direction::West));
    }

    #[test]
    fn equal_deltas_favour_latitude() {
        let start = Coord::new(40.0, -74.0);
        assert_eq!(Direction::between(start, Coord::new(41.0, -73.0)), Some(Direction::North));
        assert_eq!(Direction::between(start, Coord::new(39.0, -73.0)), Some(Direction::South));
    }

    #[test]
    fn no_direction_for_a_closed_loop() {
        let p = Coord::new(40.0, -74.0);
        assert_eq!(Direction::between(p, p), None);
    }
}
