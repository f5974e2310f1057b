//! Monte-Carlo damage simulation over a shared road network
//!
//! Intensities are computed once per simulator; every trial then samples
//! city and tile damage from its own seed, projects the destroyed tiles
//! onto a private copy of the settlement view and evaluates the metrics.

use crate::metrics::Metric;
use crate::{Result, SimulationError};
use geo_location::GeoLocation;
use hazard::{DamageModel, DisasterModel};
use rayon::prelude::*;
use road_network::{RoadNetwork, TileId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Stream tag for settlement damage draws
pub const CITY_STREAM: u32 = 1;
/// Stream tag for tile damage draws
pub const TILE_STREAM: u32 = 2;

/// Mix a trial seed with a stream tag so that the city and tile draws of
/// one trial are independent but reproducible.
pub fn derive_seed(seed: u64, stream: u32) -> u64 {
    let mut mixed = seed;
    mixed = mixed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    mixed ^= (stream as u64).wrapping_mul(1103515245);
    mixed = mixed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    mixed
}

/// Simulator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulatorState {
    Constructed,
    Ready,
    Running { trial: usize, of: usize },
    Done,
}

/// Disaster magnitudes at every tile centre and every settlement
#[derive(Debug, Clone, PartialEq)]
pub struct IntensitySnapshot {
    pub tile_ids: Vec<TileId>,
    pub tile_points: Vec<GeoLocation>,
    pub tile_magnitudes: Vec<f64>,
    pub city_points: Vec<GeoLocation>,
    pub city_magnitudes: Vec<f64>,
}

/// Everything one trial produced
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub seed: u64,
    pub damaged_tiles: Vec<TileId>,
    pub city_damaged: Vec<bool>,
    /// One vector per metric, in settlement node order
    pub metrics: Vec<Vec<f64>>,
}

impl TrialOutcome {
    pub fn damaged_tile_count(&self) -> usize {
        self.damaged_tiles.len()
    }
}

/// Mean of one metric over all trials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricMeans {
    pub name: String,
    pub values: Vec<f64>,
}

/// Averaged result of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub metrics: Vec<MetricMeans>,
    pub trials: usize,
    pub mean_damaged_tiles: f64,
}

impl SimulationResult {
    pub fn metric(&self, name: &str) -> Option<&[f64]> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.values.as_slice())
    }
}

pub struct MonteCarloSimulator<D, M> {
    disaster: D,
    damage: M,
    network: Arc<RoadNetwork>,
    metrics: Vec<Box<dyn Metric>>,
    state: SimulatorState,
    snapshot: Option<IntensitySnapshot>,
    cancel: Arc<AtomicBool>,
}

impl<D: DisasterModel, M: DamageModel> MonteCarloSimulator<D, M> {
    pub fn new(disaster: D, network: Arc<RoadNetwork>, damage: M, metrics: Vec<Box<dyn Metric>>) -> Self {
        Self {
            disaster,
            damage,
            network,
            metrics,
            state: SimulatorState::Constructed,
            snapshot: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn network(&self) -> &Arc<RoadNetwork> {
        &self.network
    }

    pub fn snapshot(&self) -> Option<&IntensitySnapshot> {
        self.snapshot.as_ref()
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.metrics.iter().map(|m| m.name().to_string()).collect()
    }

    /// Flag checked between trials; setting it stops the current run
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Compute the intensity snapshot; a no-op once prepared
    pub fn prepare(&mut self) {
        if self.snapshot.is_some() {
            return;
        }

        let tiles = self.network.tiles();
        let tile_ids: Vec<TileId> = tiles.ids().collect();
        let tile_points = tiles.centers();
        let city_points: Vec<GeoLocation> =
            self.network.settlements().nodes().map(|n| n.position).collect();

        let tile_magnitudes = self.disaster.magnitudes_at(&tile_points);
        let city_magnitudes = self.disaster.magnitudes_at(&city_points);

        info!(
            "Computed intensities at {} tiles and {} settlements",
            tile_points.len(),
            city_points.len()
        );

        self.snapshot = Some(IntensitySnapshot {
            tile_ids,
            tile_points,
            tile_magnitudes,
            city_points,
            city_magnitudes,
        });
        self.state = SimulatorState::Ready;
    }

    /// One independent trial; a pure function of the network, the
    /// snapshot and `seed`
    pub fn run_single_trial(&self, seed: u64) -> Result<TrialOutcome> {
        let snapshot = self.snapshot.as_ref().ok_or(SimulationError::NotPrepared)?;

        let city_damaged = self.damage.sample_damage(
            &snapshot.city_points,
            &snapshot.city_magnitudes,
            derive_seed(seed, CITY_STREAM),
        );
        let tile_flags = self.damage.sample_damage(
            &snapshot.tile_points,
            &snapshot.tile_magnitudes,
            derive_seed(seed, TILE_STREAM),
        );
        let damaged_tiles: Vec<TileId> = snapshot
            .tile_ids
            .iter()
            .zip(&tile_flags)
            .filter(|(_, damaged)| **damaged)
            .map(|(id, _)| *id)
            .collect();

        let projection = self.network.projector().project(&damaged_tiles);
        let metrics = self
            .metrics
            .iter()
            .map(|metric| metric.evaluate(&projection.settlements, &city_damaged))
            .collect();

        debug!(
            "Trial {}: {} tiles and {} settlements damaged, {} routes lost",
            seed,
            damaged_tiles.len(),
            city_damaged.iter().filter(|d| **d).count(),
            projection.removed_routes.len()
        );

        Ok(TrialOutcome {
            seed,
            damaged_tiles,
            city_damaged,
            metrics,
        })
    }

    /// Run trials `0..trials` in order and average the metrics.
    ///
    /// Clears any earlier cancellation request. When cancelled, partial
    /// results are dropped and the simulator returns to `Ready`.
    pub fn run(&mut self, trials: usize) -> Result<SimulationResult> {
        self.prepare();
        self.cancel.store(false, Ordering::SeqCst);
        info!("Running {} trials", trials);

        let mut totals = Totals::new(self.metrics.len(), self.network.settlements().node_count());
        for trial in 0..trials {
            if self.cancel.load(Ordering::SeqCst) {
                self.state = SimulatorState::Ready;
                info!("Run cancelled after {} of {} trials", trial, trials);
                return Err(SimulationError::Cancelled {
                    completed: trial,
                    requested: trials,
                });
            }
            self.state = SimulatorState::Running { trial, of: trials };
            let outcome = self.run_single_trial(trial as u64)?;
            totals.add(&outcome);
        }

        self.state = SimulatorState::Done;
        Ok(totals.finish(&self.metrics, trials))
    }
}

impl<D, M> MonteCarloSimulator<D, M>
where
    D: DisasterModel + Sync,
    M: DamageModel + Sync,
{
    /// Same trials and result as [`Self::run`], spread over the rayon pool.
    ///
    /// On cancellation `completed` is read once every worker has stopped, so it
    /// counts all trials that ran to the end. Which trials those are depends on
    /// scheduling.
    pub fn run_parallel(&mut self, trials: usize) -> Result<SimulationResult> {
        self.prepare();
        self.cancel.store(false, Ordering::SeqCst);
        self.state = SimulatorState::Running { trial: 0, of: trials };
        info!("Running {} trials in parallel", trials);

        let completed = AtomicUsize::new(0);
        let sim = &*self;
        let outcomes: Result<Vec<TrialOutcome>> = (0..trials)
            .into_par_iter()
            .map(|trial| {
                if sim.cancel.load(Ordering::SeqCst) {
                    return Err(SimulationError::Cancelled { completed: 0, requested: trials });
                }
                let outcome = sim.run_single_trial(trial as u64)?;
                completed.fetch_add(1, Ordering::SeqCst);
                Ok(outcome)
            })
            .collect();

        let outcomes = match outcomes {
            Ok(outcomes) => outcomes,
            Err(SimulationError::Cancelled { requested, .. }) => {
                self.state = SimulatorState::Ready;
                let completed = completed.load(Ordering::SeqCst);
                info!("Cancelled after {} of {} trials", completed, requested);
                return Err(SimulationError::Cancelled { completed, requested });
            }
            Err(e) => {
                self.state = SimulatorState::Ready;
                return Err(e);
            }
        };

        // Sum in trial order so the result matches the sequential run
        let mut totals = Totals::new(self.metrics.len(), self.network.settlements().node_count());
        for outcome in &outcomes {
            totals.add(outcome);
        }

        self.state = SimulatorState::Done;
        Ok(totals.finish(&self.metrics, trials))
    }
}

struct Totals {
    sums: Vec<Vec<f64>>,
    damaged_tiles: usize,
}

impl Totals {
    fn new(metrics: usize, cities: usize) -> Self {
        Self {
            sums: vec![vec![0.0; cities]; metrics],
            damaged_tiles: 0,
        }
    }

    fn add(&mut self, outcome: &TrialOutcome) {
        for (sum, values) in self.sums.iter_mut().zip(&outcome.metrics) {
            for (s, v) in sum.iter_mut().zip(values) {
                *s += v;
            }
        }
        self.damaged_tiles += outcome.damaged_tile_count();
    }

    fn finish(self, metrics: &[Box<dyn Metric>], trials: usize) -> SimulationResult {
        let divisor = trials.max(1) as f64;
        let means = metrics
            .iter()
            .zip(self.sums)
            .map(|(metric, sum)| MetricMeans {
                name: metric.name().to_string(),
                values: sum.into_iter().map(|s| s / divisor).collect(),
            })
            .collect();

        SimulationResult {
            metrics: means,
            trials,
            mean_damaged_tiles: self.damaged_tiles as f64 / divisor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{HubConnectivity, NodeDegree};
    use hazard::{BernoulliDamageModel, GaussianEarthquake};
    use road_network::{
        SegmentEdge, SegmentGraph, SegmentNode, SettlementBuilder, SettlementId, SettlementSite,
        TileIndex,
    };

    fn loc(lat: f64, lon: f64) -> GeoLocation {
        GeoLocation::new(lat, lon).unwrap()
    }

    fn site(id: u64, population: u64, lat: f64, lon: f64) -> SettlementSite {
        SettlementSite {
            id: SettlementId(id),
            name: format!("Town {}", id),
            population,
            position: loc(lat, lon),
        }
    }

    /// X near A, Y near C on the road A(0,0) - B(0,1) - C(0,2)
    fn create_test_network() -> Arc<RoadNetwork> {
        let segments = SegmentGraph::build(
            vec![
                SegmentNode::new("A", loc(0.0, 0.0)),
                SegmentNode::new("B", loc(0.0, 1.0)),
                SegmentNode::new("C", loc(0.0, 2.0)),
            ],
            vec![SegmentEdge::new("A", "B", 1.0), SegmentEdge::new("B", "C", 1.0)],
        )
        .unwrap();
        let tiles = TileIndex::build(&segments, 1.0).unwrap();
        let sites = [site(1, 200_000, 0.001, 0.001), site(2, 1000, 0.001, 2.001)];
        let build = SettlementBuilder::new().build(&sites, segments, &tiles).unwrap();
        Arc::new(RoadNetwork::new(build.segments, tiles, build.settlements))
    }

    fn metrics() -> Vec<Box<dyn Metric>> {
        vec![Box::new(HubConnectivity::new(100_000, 1000.0)), Box::new(NodeDegree)]
    }

    fn quiet() -> GaussianEarthquake {
        GaussianEarthquake::new(loc(0.0, 0.0), 10.0, 0.0)
    }

    /// Damage is certain at magnitude 1 and impossible near 0
    fn certain() -> BernoulliDamageModel {
        BernoulliDamageModel::new(-50.0, 100.0)
    }

    fn quiet_simulator() -> MonteCarloSimulator<GaussianEarthquake, BernoulliDamageModel> {
        MonteCarloSimulator::new(
            quiet(),
            create_test_network(),
            BernoulliDamageModel::default(),
            metrics(),
        )
    }

    #[test]
    fn test_state_transitions() {
        let mut sim = quiet_simulator();
        assert_eq!(sim.state(), SimulatorState::Constructed);
        assert!(matches!(sim.run_single_trial(0), Err(SimulationError::NotPrepared)));

        sim.prepare();
        assert_eq!(sim.state(), SimulatorState::Ready);
        assert_eq!(sim.snapshot().unwrap().city_points.len(), 2);

        sim.run(3).unwrap();
        assert_eq!(sim.state(), SimulatorState::Done);
    }

    #[test]
    fn test_quiet_disaster_keeps_baseline() {
        let mut sim = quiet_simulator();
        let result = sim.run(5).unwrap();

        assert_eq!(result.trials, 5);
        assert_eq!(result.mean_damaged_tiles, 0.0);
        // Only X is a hub and it cannot count for itself
        assert_eq!(result.metric("hub_connectivity").unwrap(), &[0.0, 1.0]);
        assert_eq!(result.metric("node_degree").unwrap(), &[1.0, 1.0]);
    }

    #[test]
    fn test_zero_trials() {
        let mut sim = quiet_simulator();
        let result = sim.run(0).unwrap();
        assert_eq!(result.trials, 0);
        assert_eq!(result.metrics.len(), 2);
        assert_eq!(result.metrics[0].values, vec![0.0, 0.0]);
    }

    #[test]
    fn test_middle_quake_cuts_route() {
        // Centred on B's tile centre; the other tiles and both towns are
        // over 100 km away
        let quake = GaussianEarthquake::new(loc(0.5, 1.5), 20.0, 1.0);
        let mut sim = MonteCarloSimulator::new(quake, create_test_network(), certain(), metrics());
        sim.prepare();

        let outcome = sim.run_single_trial(5).unwrap();
        assert_eq!(outcome.damaged_tile_count(), 1);
        assert_eq!(outcome.city_damaged, vec![false, false]);
        assert_eq!(outcome.metrics[0], vec![0.0, 0.0]);
        assert_eq!(outcome.metrics[1], vec![0.0, 0.0]);
    }

    #[test]
    fn test_single_trial_is_reproducible() {
        let quake = GaussianEarthquake::new(loc(0.0, 1.0), 150.0, 9.0);
        let mut sim = MonteCarloSimulator::new(
            quake,
            create_test_network(),
            BernoulliDamageModel::default(),
            metrics(),
        );
        sim.prepare();
        assert_eq!(sim.run_single_trial(5).unwrap(), sim.run_single_trial(5).unwrap());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let quake = GaussianEarthquake::new(loc(0.0, 1.0), 150.0, 9.0);
        let network = create_test_network();
        let damage = BernoulliDamageModel::default();
        let mut seq = MonteCarloSimulator::new(quake.clone(), Arc::clone(&network), damage, metrics());
        let mut par = MonteCarloSimulator::new(quake, network, damage, metrics());
        assert_eq!(seq.run(40).unwrap(), par.run_parallel(40).unwrap());
    }

    #[test]
    fn test_streams_differ() {
        assert_ne!(derive_seed(5, CITY_STREAM), derive_seed(5, TILE_STREAM));
        assert_eq!(derive_seed(5, CITY_STREAM), derive_seed(5, CITY_STREAM));
    }

    #[test]
    fn test_cancelled_run_returns_to_ready() {
        let mut sim = quiet_simulator();
        let network = Arc::clone(sim.network());
        sim.prepare();

        // A metric that requests cancellation from inside the first trial
        struct Canceller(Arc<AtomicBool>);
        impl Metric for Canceller {
            fn name(&self) -> &str {
                "canceller"
            }
            fn evaluate(&self, graph: &road_network::SettlementGraph, _: &[bool]) -> Vec<f64> {
                self.0.store(true, Ordering::SeqCst);
                vec![0.0; graph.node_count()]
            }
        }
        let handle = sim.cancel_handle();
        sim.metrics.push(Box::new(Canceller(handle)));

        let err = sim.run(10).unwrap_err();
        assert!(matches!(err, SimulationError::Cancelled { completed: 1, requested: 10 }));
        assert_eq!(sim.state(), SimulatorState::Ready);
        assert_eq!(network.settlements().edge_count(), 1);
    }

    #[test]
    fn test_parallel_cancel_counts_finished_trials() {
        let mut sim = quiet_simulator();
        sim.prepare();

        // Every trial that reaches its metrics raises the flag and is counted
        struct Canceller(Arc<AtomicBool>, Arc<AtomicUsize>);
        impl Metric for Canceller {
            fn name(&self) -> &str {
                "canceller"
            }
            fn evaluate(&self, graph: &road_network::SettlementGraph, _: &[bool]) -> Vec<f64> {
                self.1.fetch_add(1, Ordering::SeqCst);
                self.0.store(true, Ordering::SeqCst);
                vec![0.0; graph.node_count()]
            }
        }
        let evaluated = Arc::new(AtomicUsize::new(0));
        let handle = sim.cancel_handle();
        sim.metrics.push(Box::new(Canceller(handle, Arc::clone(&evaluated))));

        let err = sim.run_parallel(1000).unwrap_err();
        match err {
            SimulationError::Cancelled { completed, requested } => {
                assert_eq!(requested, 1000);
                assert_eq!(completed, evaluated.load(Ordering::SeqCst));
                assert!(completed >= 1 && completed < 1000);
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert_eq!(sim.state(), SimulatorState::Ready);
    }
}
