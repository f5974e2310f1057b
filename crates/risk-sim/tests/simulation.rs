//! Simulation scenarios on fixture networks and random road grids

use fuzz_harness::prelude::*;
use hazard::{BernoulliDamageModel, GaussianEarthquake};
use risk_sim::{HubConnectivity, Metric, MonteCarloSimulator, NodeDegree};
use road_network::{GeoLocation, RawNetwork, RoadNetwork, SettlementBuilder, TileIndex};
use std::collections::BTreeSet;
use std::sync::Arc;

fn build(raw: &RawNetwork, tile_size: f64) -> Arc<RoadNetwork> {
    let segments = raw.segment_graph().unwrap();
    let tiles = TileIndex::build(&segments, tile_size).unwrap();
    let sites = raw.settlement_sites().unwrap();
    let build = SettlementBuilder::new().build(&sites, segments, &tiles).unwrap();
    Arc::new(RoadNetwork::new(build.segments, tiles, build.settlements))
}

fn loc(lat: f64, lon: f64) -> GeoLocation {
    GeoLocation::new(lat, lon).unwrap()
}

fn metrics() -> Vec<Box<dyn Metric>> {
    vec![Box::new(HubConnectivity::new(100_000, 1000.0)), Box::new(NodeDegree)]
}

/// Damage is certain at magnitude 1 and impossible near 0
fn certain() -> BernoulliDamageModel {
    BernoulliDamageModel::new(-50.0, 100.0)
}

/// Full-strength shaking over the tile centred at `center` and nowhere else
fn pinpoint(center: GeoLocation) -> GaussianEarthquake {
    GaussianEarthquake::new(center, 20.0, 1.0)
}

#[test]
fn test_line_scenario_loses_hub() {
    let network = build(&line_scenario(), FIXTURE_TILE_SIZE_DEG);
    // Centre of B's tile
    let mut sim = MonteCarloSimulator::new(pinpoint(loc(0.5, 1.5)), network, certain(), metrics());

    let result = sim.run(3).unwrap();
    assert_eq!(result.metric("hub_connectivity").unwrap(), &[0.0, 0.0]);
    assert_eq!(result.metric("node_degree").unwrap(), &[0.0, 0.0]);
    assert_eq!(result.mean_damaged_tiles, 1.0);
}

#[test]
fn test_damage_at_representative_keeps_route() {
    let network = build(&line_scenario(), FIXTURE_TILE_SIZE_DEG);
    // Centre of A's tile; X itself is ~78 km away and stays intact
    let mut sim = MonteCarloSimulator::new(pinpoint(loc(0.5, 0.5)), network, certain(), metrics());
    sim.prepare();

    let outcome = sim.run_single_trial(0).unwrap();
    assert_eq!(outcome.damaged_tile_count(), 1);
    assert_eq!(outcome.city_damaged, vec![false, false]);
    assert_eq!(outcome.metrics[0], vec![0.0, 1.0]);
}

#[test]
fn test_damaged_city_is_not_a_hub() {
    let network = build(&line_scenario(), FIXTURE_TILE_SIZE_DEG);
    // Right on X, away from every tile centre
    let mut sim = MonteCarloSimulator::new(pinpoint(loc(0.001, 0.001)), network, certain(), metrics());
    sim.prepare();

    let outcome = sim.run_single_trial(0).unwrap();
    assert_eq!(outcome.city_damaged, vec![true, false]);
    assert_eq!(outcome.metrics[0], vec![0.0, 0.0]);
    // The route itself survives
    assert_eq!(outcome.metrics[1], vec![1.0, 1.0]);
}

#[test]
fn test_isolated_settlement_scores_zero() {
    let network = build(&line_scenario_with_isolated(), FIXTURE_TILE_SIZE_DEG);
    let quiet = GaussianEarthquake::new(loc(0.0, 0.0), 10.0, 0.0);
    let mut sim = MonteCarloSimulator::new(quiet, network, BernoulliDamageModel::default(), metrics());

    let result = sim.run(4).unwrap();
    assert_eq!(result.metric("hub_connectivity").unwrap(), &[0.0, 1.0, 0.0]);
    assert_eq!(result.metric("node_degree").unwrap(), &[1.0, 1.0, 0.0]);
}

#[test]
fn test_detour_does_not_save_route() {
    let network = build(&detour_scenario(), FIXTURE_TILE_SIZE_DEG);
    // Centre of m1's tile
    let mut sim = MonteCarloSimulator::new(pinpoint(loc(0.5, 1.5)), network, certain(), metrics());

    let result = sim.run(2).unwrap();
    assert_eq!(result.metric("hub_connectivity").unwrap(), &[0.0, 0.0]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn one_value_per_settlement(
        raw in road_grid(4),
        center in location_near(loc(10.05, 20.05), 0.1),
        intensity in magnitude(),
        trials in 0usize..4,
    ) {
        let network = build(&raw, GRID_SPACING_DEG);
        let settlements = network.settlements().node_count();
        let quake = GaussianEarthquake::new(center, 5.0, intensity);
        let mut sim = MonteCarloSimulator::new(quake, network, BernoulliDamageModel::default(), metrics());

        let result = sim.run(trials).unwrap();
        prop_assert_eq!(result.trials, trials);
        for metric in &result.metrics {
            prop_assert_eq!(metric.values.len(), settlements);
            for v in &metric.values {
                prop_assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn parallel_run_matches_sequential(
        raw in road_grid(4),
        intensity in 5.0f64..=10.0,
        trials in 1usize..12,
    ) {
        let network = build(&raw, GRID_SPACING_DEG);
        let quake = GaussianEarthquake::new(loc(10.03, 20.03), 5.0, intensity);
        let damage = BernoulliDamageModel::default();

        let mut seq = MonteCarloSimulator::new(quake.clone(), Arc::clone(&network), damage, metrics());
        let mut par = MonteCarloSimulator::new(quake, network, damage, metrics());
        prop_assert_eq!(seq.run(trials).unwrap(), par.run_parallel(trials).unwrap());
    }

    #[test]
    fn stronger_quake_damages_a_superset(
        raw in road_grid(4),
        intensity in magnitude(),
        boost in 0.0f64..=5.0,
    ) {
        let network = build(&raw, GRID_SPACING_DEG);
        let center = loc(10.03, 20.03);
        let damage = BernoulliDamageModel::default();

        let mut weak = MonteCarloSimulator::new(
            GaussianEarthquake::new(center, 5.0, intensity),
            Arc::clone(&network),
            damage,
            metrics(),
        );
        let mut strong = MonteCarloSimulator::new(
            GaussianEarthquake::new(center, 5.0, intensity + boost),
            network,
            damage,
            metrics(),
        );
        weak.prepare();
        strong.prepare();

        for seed in 0..20u64 {
            let w = weak.run_single_trial(seed).unwrap();
            let s = strong.run_single_trial(seed).unwrap();
            let w_tiles: BTreeSet<_> = w.damaged_tiles.iter().collect();
            let s_tiles: BTreeSet<_> = s.damaged_tiles.iter().collect();
            prop_assert!(w_tiles.is_subset(&s_tiles));
            for (wd, sd) in w.city_damaged.iter().zip(&s.city_damaged) {
                prop_assert!(!wd || *sd);
            }
        }
    }
}
