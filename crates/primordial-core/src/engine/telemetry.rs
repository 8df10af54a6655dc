use super::Engine;
use crate::genome::{Archetype, Genome, ARCHETYPE_COUNT, GENE_COUNT};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Ticks per reported "generation" epoch.
const GENERATION_TICKS: u64 = 500;

/// Per-frame digest of the world, cheap enough for the host to poll every
/// tick. Both histograms sum to the live population.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Telemetry {
    pub tick: u64,
    pub alive: u32,
    pub total_births: u64,
    pub total_deaths: u64,
    /// Coarse epoch counter, `tick / 500`.
    pub generation: u64,
    /// Live cells bucketed by their largest gene.
    pub dominant_genes: [u32; GENE_COUNT],
    /// Live cells bucketed by archetype.
    pub archetypes: [u32; ARCHETYPE_COUNT],
    pub species_alive: u32,
}

/// Copy of one cell's state for inspection and follow-cam picking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub index: u32,
    pub x: f32,
    pub y: f32,
    pub energy: f32,
    pub mass: f32,
    pub genome: Genome,
    pub generation: u32,
    pub archetype: Archetype,
    pub species_id: i32,
    pub alliance_id: i32,
}

/// Result of a headless experiment run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub steps: u64,
    pub dt: f32,
    pub sample_every: u64,
    pub final_active: u32,
    /// Events produced over the whole run (the runner drains per tick).
    pub total_events: u64,
    pub samples: Vec<Telemetry>,
}

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExperimentError {
    InvalidSampleEvery,
    TooManySteps { max: u64, actual: u64 },
    TooManySamples { max: u64, actual: u64 },
}

impl fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentError::InvalidSampleEvery => write!(f, "sample_every must be positive"),
            ExperimentError::TooManySteps { max, actual } => {
                write!(f, "steps ({actual}) exceed supported maximum ({max})")
            }
            ExperimentError::TooManySamples { max, actual } => {
                write!(
                    f,
                    "sample count ({actual}) exceeds supported maximum ({max})"
                )
            }
        }
    }
}

impl Error for ExperimentError {}

impl Engine {
    /// Assemble the digest from current store state. The reduction only
    /// reads, so it can fan out across the slot range.
    pub(crate) fn collect_digest(&self) -> Telemetry {
        let store = &self.store;
        let zero = || ([0u32; GENE_COUNT], [0u32; ARCHETYPE_COUNT]);
        let (dominant_genes, archetypes) = (0..store.capacity)
            .into_par_iter()
            .fold(zero, |(mut genes, mut archs), i| {
                if store.active[i] {
                    genes[store.genome[i].dominant()] += 1;
                    archs[store.archetype[i] as usize] += 1;
                }
                (genes, archs)
            })
            .reduce(zero, |(mut genes_a, mut archs_a), (genes_b, archs_b)| {
                for (a, b) in genes_a.iter_mut().zip(genes_b.iter()) {
                    *a += b;
                }
                for (a, b) in archs_a.iter_mut().zip(archs_b.iter()) {
                    *a += b;
                }
                (genes_a, archs_a)
            });

        Telemetry {
            tick: self.tick_index,
            alive: store.active_count as u32,
            total_births: self.total_births,
            total_deaths: self.total_deaths,
            generation: self.tick_index / GENERATION_TICKS,
            dominant_genes,
            archetypes,
            species_alive: self.species.len() as u32,
        }
    }
}
