mod behavior;
pub mod telemetry;
#[cfg(test)]
mod tests;

pub use telemetry::{CellSnapshot, ExperimentError, RunSummary, Telemetry};

use crate::analytics::PopulationHistory;
use crate::config::{ConfigError, EngineConfig, Tuning};
use crate::environment::Environment;
use crate::events::{Event, EventQueue};
use crate::genome::Genome;
use crate::spatial::UniformGrid;
use crate::species::SpeciesTracker;
use crate::store::CellStore;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

/// The simulation core. Owns the store, environment, spatial index, species
/// tracker, analytics, and event queue; the host drives it with `tick(dt)`
/// and reads state or drains events between ticks.
///
/// Everything inside a tick is single-threaded and sequential: one cell is
/// processed to completion before the next, in index order, against current
/// store state. When cell `i` eats cell `j`, cells after `i` see `j` gone
/// the same tick. Collaborators may read the store buffers between ticks but
/// never mutate them.
pub struct Engine {
    pub(crate) store: CellStore,
    pub(crate) env: Environment,
    pub(crate) grid: UniformGrid,
    pub(crate) species: SpeciesTracker,
    pub(crate) history: PopulationHistory,
    pub(crate) events: EventQueue,
    pub(crate) config: EngineConfig,
    pub(crate) rng: ChaCha12Rng,
    pub(crate) tick_index: u64,
    pub(crate) total_births: u64,
    pub(crate) total_deaths: u64,
    pub(crate) births_last_tick: u32,
    pub(crate) deaths_last_tick: u32,
    pub(crate) next_alliance_id: i32,
    pub(crate) extinction_emitted: bool,
    // Reusable buffers so the per-tick passes never allocate.
    pub(crate) neighbor_scratch: Vec<u32>,
    pub(crate) cluster_scratch: Vec<u32>,
    pub(crate) visited_scratch: Vec<bool>,
    pub(crate) candidate_scratch: Vec<u32>,
}

impl Engine {
    /// Upper bound on a single step; larger host dts are truncated.
    pub const MAX_DT: f32 = 0.1;
    /// Search radius for `nearest` picking.
    pub const PICK_RADIUS: f32 = 100.0;

    pub const MAX_EXPERIMENT_STEPS: u64 = 1_000_000;
    pub const MAX_EXPERIMENT_SAMPLES: u64 = 50_000;

    pub fn new(world_size: f32, capacity: usize) -> Self {
        Self::try_new(EngineConfig {
            world_size,
            capacity,
            ..EngineConfig::default()
        })
        .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut config = config;
        config.clamp_tunables();

        let mut env = Environment::new(config.world_size, config.seed);
        env.set_solar_constant(config.solar_constant);
        Ok(Self {
            store: CellStore::new(config.capacity, config.world_size, config.friction),
            env,
            grid: UniformGrid::new(config.world_size, config.grid_resolution, config.capacity),
            species: SpeciesTracker::new(),
            history: PopulationHistory::new(config.history_capacity),
            events: EventQueue::new(config.event_capacity),
            rng: ChaCha12Rng::seed_from_u64(config.seed),
            tick_index: 0,
            total_births: 0,
            total_deaths: 0,
            births_last_tick: 0,
            deaths_last_tick: 0,
            next_alliance_id: 1,
            extinction_emitted: false,
            neighbor_scratch: Vec::with_capacity(64),
            cluster_scratch: Vec::with_capacity(32),
            visited_scratch: vec![false; config.capacity],
            candidate_scratch: Vec::with_capacity(32),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply a partial reconfiguration; present fields are clamped into
    /// their documented ranges, non-finite values ignored.
    pub fn configure(&mut self, tuning: Tuning) {
        if let Some(v) = tuning.mutation_rate.filter(|v| v.is_finite()) {
            let (lo, hi) = EngineConfig::MUTATION_RATE_RANGE;
            self.config.mutation_rate = v.clamp(lo, hi);
        }
        if let Some(v) = tuning.food_abundance.filter(|v| v.is_finite()) {
            let (lo, hi) = EngineConfig::FOOD_ABUNDANCE_RANGE;
            self.config.food_abundance = v.clamp(lo, hi);
        }
        if let Some(v) = tuning.friction.filter(|v| v.is_finite()) {
            let (lo, hi) = EngineConfig::FRICTION_RANGE;
            self.config.friction = v.clamp(lo, hi);
            self.store.set_friction(self.config.friction);
        }
        if let Some(v) = tuning.solar_constant.filter(|v| v.is_finite()) {
            let (lo, hi) = EngineConfig::SOLAR_CONSTANT_RANGE;
            self.config.solar_constant = v.clamp(lo, hi);
            self.env.set_solar_constant(self.config.solar_constant);
        }
    }

    /// Seed a cell from outside the simulation. `None` when the store is
    /// full or the genome is rejected; no event in either failure case.
    pub fn spawn(&mut self, x: f32, y: f32, genome: Genome) -> Option<u32> {
        let index = self.store.spawn(x, y, genome)?;
        self.total_births += 1;
        self.events.push(Event::Birth {
            index,
            generation: 1,
        });
        Some(index)
    }

    /// Copy out one live cell; `None` for dead or out-of-range indices.
    pub fn snapshot(&self, index: u32) -> Option<CellSnapshot> {
        if !self.store.is_live(index) {
            return None;
        }
        let i = index as usize;
        Some(CellSnapshot {
            index,
            x: self.store.pos_x[i],
            y: self.store.pos_y[i],
            energy: self.store.energy[i],
            mass: self.store.mass[i],
            genome: self.store.genome[i],
            generation: self.store.generation[i],
            archetype: self.store.archetype[i],
            species_id: self.store.species[i],
            alliance_id: self.store.alliance[i],
        })
    }

    /// Resolve a pick: a live follow hint wins, otherwise the nearest live
    /// cell within the pick radius (lowest index breaks ties).
    pub fn nearest(&self, x: f32, y: f32, follow: Option<u32>) -> Option<CellSnapshot> {
        if let Some(hint) = follow {
            if let Some(snapshot) = self.snapshot(hint) {
                return Some(snapshot);
            }
        }
        let radius_sq = Self::PICK_RADIUS * Self::PICK_RADIUS;
        let mut best: Option<(u32, f32)> = None;
        for i in 0..self.store.capacity {
            if !self.store.active[i] {
                continue;
            }
            let dx = self.store.pos_x[i] - x;
            let dy = self.store.pos_y[i] - y;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq > radius_sq {
                continue;
            }
            if best.map_or(true, |(_, b)| dist_sq < b) {
                best = Some((i as u32, dist_sq));
            }
        }
        best.and_then(|(i, _)| self.snapshot(i))
    }

    /// Current digest; both histograms sum to the live population.
    pub fn telemetry(&self) -> Telemetry {
        self.collect_digest()
    }

    /// Hand pending events to the host. Call between ticks.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    /// Events lost to queue overflow since construction.
    pub fn events_dropped(&self) -> u64 {
        self.events.dropped()
    }

    pub fn store(&self) -> &CellStore {
        &self.store
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn species(&self) -> &SpeciesTracker {
        &self.species
    }

    pub fn history(&self) -> &PopulationHistory {
        &self.history
    }

    pub fn active_count(&self) -> usize {
        self.store.active_count
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    pub fn total_births(&self) -> u64 {
        self.total_births
    }

    pub fn total_deaths(&self) -> u64 {
        self.total_deaths
    }

    pub fn births_last_tick(&self) -> u32 {
        self.births_last_tick
    }

    pub fn deaths_last_tick(&self) -> u32 {
        self.deaths_last_tick
    }

    pub fn run_experiment(&mut self, steps: u64, dt: f32, sample_every: u64) -> RunSummary {
        self.try_run_experiment(steps, dt, sample_every)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Drive the engine headless for `steps` ticks, sampling telemetry every
    /// `sample_every` ticks (and at the end). Events are drained each tick
    /// and only counted.
    pub fn try_run_experiment(
        &mut self,
        steps: u64,
        dt: f32,
        sample_every: u64,
    ) -> Result<RunSummary, ExperimentError> {
        if sample_every == 0 {
            return Err(ExperimentError::InvalidSampleEvery);
        }
        if steps > Self::MAX_EXPERIMENT_STEPS {
            return Err(ExperimentError::TooManySteps {
                max: Self::MAX_EXPERIMENT_STEPS,
                actual: steps,
            });
        }
        let estimated_samples = if steps == 0 {
            0
        } else {
            ((steps - 1) / sample_every) + 1
        };
        if estimated_samples > Self::MAX_EXPERIMENT_SAMPLES {
            return Err(ExperimentError::TooManySamples {
                max: Self::MAX_EXPERIMENT_SAMPLES,
                actual: estimated_samples,
            });
        }

        let mut samples = Vec::with_capacity(estimated_samples as usize);
        let mut total_events = 0u64;
        for step in 1..=steps {
            self.tick(dt);
            total_events += self.drain_events().len() as u64;
            if step % sample_every == 0 || step == steps {
                samples.push(self.telemetry());
            }
        }
        Ok(RunSummary {
            schema_version: 1,
            steps,
            dt,
            sample_every,
            final_active: self.store.active_count as u32,
            total_events,
            samples,
        })
    }
}
