//! Link cost model and geodesy helpers
//!
//! Fuses heterogeneous link attributes (latency, inverse bandwidth,
//! reliability, weather degradation) into one additive scalar for
//! shortest-path accumulation. Penalty constants are configuration,
//! not literals; the defaults keep a single unreliable or
//! weather-degraded hop more expensive than several clean hops of
//! comparable bandwidth.

use crate::{GeoPosition, Link};
use serde::{Deserialize, Serialize};

/// Mean Earth equatorial radius (km)
pub const EARTH_RADIUS_KM: f64 = 6378.137;

/// Speed of light in vacuum, km per millisecond.
///
/// The A* heuristic divides great-circle distance by this. No physical
/// link carries a signal faster, so the estimate never overshoots the
/// true remaining latency (admissibility).
pub const C_VACUUM_KM_PER_MS: f64 = 299.792_458;

/// Tunable fusion constants for the link cost model
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostWeights {
    /// Cost per unit of missing reliability
    pub penalty_reliability: f64,
    /// Cost per unit of weather multiplier above 1.0
    pub penalty_weather: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            penalty_reliability: 100.0,
            penalty_weather: 50.0,
        }
    }
}

/// Scalar cost of traversing a link. Pure and deterministic for a
/// given attribute snapshot.
///
/// Callers must filter unusable links (inactive, zero bandwidth,
/// offline endpoint) before costing; they are absent from the search,
/// never infinite-cost.
pub fn link_cost(link: &Link, weights: &CostWeights) -> f64 {
    link.latency_ms
        + 1000.0 / link.bandwidth_gbps
        + (1.0 - link.reliability) * weights.penalty_reliability
        + (link.weather_multiplier - 1.0) * weights.penalty_weather
}

/// Great-circle distance between two positions, ignoring altitude
pub fn haversine_km(a: &GeoPosition, b: &GeoPosition) -> f64 {
    let lat_a = a.latitude_deg.to_radians();
    let lat_b = b.latitude_deg.to_radians();
    let d_lat = (b.latitude_deg - a.latitude_deg).to_radians();
    let d_lon = (b.longitude_deg - a.longitude_deg).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Optimistic latency for covering a distance: straight line at c.
pub fn optimistic_latency_ms(distance_km: f64) -> f64 {
    distance_km / C_VACUUM_KM_PER_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    // Backbone-class fixture; on thin links the inverse-bandwidth term
    // dominates every penalty
    fn clean_link(latency_ms: f64) -> Link {
        Link::new("L", "A", "B", latency_ms, 100.0, 0.99)
    }

    #[test]
    fn cost_is_additive_over_attributes() {
        let weights = CostWeights::default();
        let link = clean_link(10.0);

        let expected = 10.0 + 1000.0 / 100.0 + 0.01 * 100.0;
        assert!((link_cost(&link, &weights) - expected).abs() < 1e-9);
    }

    #[test]
    fn one_unreliable_hop_outweighs_several_clean_hops() {
        let weights = CostWeights::default();
        let clean = clean_link(10.0);
        let flaky = Link::new("F", "A", "B", 10.0, 100.0, 0.5);

        assert!(link_cost(&flaky, &weights) > 3.0 * link_cost(&clean, &weights) - 3.0 * 10.0);
        assert!(link_cost(&flaky, &weights) > 2.0 * link_cost(&clean, &weights));
    }

    #[test]
    fn one_storm_hop_outweighs_clean_hops() {
        let weights = CostWeights::default();
        let clean = clean_link(10.0);
        let stormy = clean_link(10.0).with_weather(2.5);

        assert!(link_cost(&stormy, &weights) > 2.0 * link_cost(&clean, &weights));
    }

    #[test]
    fn weights_are_configuration() {
        let link = Link::new("F", "A", "B", 10.0, 10.0, 0.5);
        let lenient = CostWeights {
            penalty_reliability: 0.0,
            penalty_weather: 0.0,
        };

        assert!((link_cost(&link, &lenient) - (10.0 + 100.0)).abs() < 1e-9);
    }

    #[test]
    fn haversine_matches_known_distance() {
        let nyc = GeoPosition {
            latitude_deg: 40.7128,
            longitude_deg: -74.0060,
            altitude_km: 0.0,
        };
        let london = GeoPosition {
            latitude_deg: 51.5074,
            longitude_deg: -0.1278,
            altitude_km: 0.0,
        };

        let d = haversine_km(&nyc, &london);
        assert!((d - 5570.0).abs() < 60.0, "got {d}");
    }

    #[test]
    fn optimistic_latency_is_optimistic() {
        // 3000 km at c is ~10 ms; any real fiber/FSO link is slower
        let estimate = optimistic_latency_ms(3000.0);
        assert!(estimate > 9.0 && estimate < 11.0);
    }
}
