use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        EARTH_RADIUS_METERS * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// The point `meters` due north of this one.
    pub fn offset_north(&self, meters: f64) -> GeoPoint {
        let d_lat = (meters / EARTH_RADIUS_METERS).to_degrees();
        GeoPoint::new(self.lat + d_lat, self.lng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = GeoPoint::new(10.0, 123.0);
        assert_eq!(p.distance_meters(&p), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let d = a.distance_meters(&b);
        assert!((d - 111_194.9).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_offset_north_round_trips_distance() {
        let origin = GeoPoint::new(10.0, 123.0);
        for meters in [5.0, 10.0, 50.0] {
            let d = origin.distance_meters(&origin.offset_north(meters));
            assert!((d - meters).abs() < 1e-6, "{meters}m came back as {d}");
        }
    }

    #[test]
    fn test_validity() {
        assert!(GeoPoint::new(10.3, 123.9).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }
}
