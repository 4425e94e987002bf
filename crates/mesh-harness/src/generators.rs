//! Proptest strategies for random mesh topologies
//!
//! Generated networks mirror production shape: a fully ringed relay
//! backbone with one to three ground feeds per station, random weather
//! degradation on the feeds, clean high-reliability relay links.

use mesh_core::{Link, NetworkState, Node};
use proptest::prelude::*;

pub fn ground_id(i: usize) -> String {
    format!("GS-{i:02}")
}

pub fn relay_id(i: usize) -> String {
    format!("RELAY-{i:02}")
}

#[derive(Debug, Clone)]
pub struct FeedSpec {
    pub relay: usize,
    pub latency_ms: f64,
    pub reliability: f64,
    pub weather_multiplier: f64,
}

fn arb_feed(relays: usize) -> impl Strategy<Value = FeedSpec> {
    (0..relays, 20.0..60.0f64, 0.85..0.999f64, 1.0..2.0f64).prop_map(
        |(relay, latency_ms, reliability, weather_multiplier)| FeedSpec {
            relay,
            latency_ms,
            reliability,
            weather_multiplier,
        },
    )
}

/// Random mesh: 4..=10 ground stations, 3..=6 relays in a ring
pub fn mesh_network() -> impl Strategy<Value = NetworkState> {
    (4usize..=10, 3usize..=6).prop_flat_map(|(stations, relays)| {
        (
            Just(stations),
            Just(relays),
            prop::collection::vec((-55.0..55.0f64, -170.0..170.0f64), stations),
            prop::collection::vec(prop::collection::vec(arb_feed(relays), 1..=3), stations),
        )
            .prop_map(|(stations, relays, positions, feeds)| {
                build_mesh(stations, relays, &positions, &feeds)
            })
    })
}

fn build_mesh(
    stations: usize,
    relays: usize,
    positions: &[(f64, f64)],
    feeds: &[Vec<FeedSpec>],
) -> NetworkState {
    let mut state = NetworkState::new();

    for (i, (lat, lon)) in positions.iter().enumerate() {
        state.upsert_node(Node::ground_station(
            ground_id(i),
            format!("Station {i}"),
            *lat,
            *lon,
            (i % 3 + 1) as u8,
        ));
    }
    for i in 0..relays {
        let lon = 360.0 * i as f64 / relays as f64 - 180.0;
        state.upsert_node(Node::relay(
            relay_id(i),
            format!("Relay {i}"),
            0.0,
            lon,
            8_000.0,
        ));
    }

    // Relay backbone ring
    for i in 0..relays {
        let link = Link::new(
            format!("ISL-{i:02}"),
            relay_id(i),
            relay_id((i + 1) % relays),
            22.0,
            40.0,
            0.999,
        )
        .secure();
        state.upsert_link(link).expect("relay ring link");
    }

    // Ground feeds; duplicate relay picks collapse to one link
    for (i, station_feeds) in feeds.iter().enumerate() {
        for feed in station_feeds {
            let link = Link::new(
                format!("FEED-{i:02}-{:02}", feed.relay),
                ground_id(i),
                relay_id(feed.relay),
                feed.latency_ms,
                20.0,
                feed.reliability,
            )
            .secure()
            .with_weather(feed.weather_multiplier);
            state.upsert_link(link).expect("feed link");
        }
    }

    state
}

/// Distinct (source, destination) ground-station pair for a network
/// with `stations` ground stations
pub fn station_pair(stations: usize) -> impl Strategy<Value = (String, String)> {
    (0..stations, 0..stations)
        .prop_filter("distinct endpoints", |(a, b)| a != b)
        .prop_map(|(a, b)| (ground_id(a), ground_id(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_mesh_is_well_formed() {
        let mut runner = TestRunner::deterministic();
        for _ in 0..16 {
            let state = mesh_network()
                .new_tree(&mut runner)
                .expect("strategy")
                .current();
            let stats = state.stats();

            assert!(stats.ground_stations >= 4);
            assert!(stats.relays >= 3);
            assert_eq!(stats.offline_nodes, 0);
            // Every ground station has at least one feed
            for node in state.nodes().filter(|n| n.is_ground_station()) {
                assert!(!state.incident_links(&node.id).is_empty(), "{}", node.id);
            }
        }
    }
}
