//! Primordial simulation core: a fixed-capacity population of autonomous
//! cells that move, feed, fight, reproduce, mutate, cluster into colonies
//! and alliances, and are periodically classified into emergent species.
//!
//! The core exposes a pure data/command interface: the host constructs an
//! [`Engine`], drives it with `tick(dt)`, reads store buffers or snapshots
//! between ticks, and drains typed events. Rendering, input routing, and
//! persistence are the host's business.

pub mod analytics;
pub mod config;
pub mod engine;
pub mod environment;
pub mod events;
pub mod genome;
pub mod spatial;
pub mod species;
pub mod store;

pub use config::{ConfigError, EngineConfig, Tuning};
pub use engine::{CellSnapshot, Engine, ExperimentError, RunSummary, Telemetry};
pub use events::Event;
pub use genome::{Archetype, Genome, ARCHETYPE_COUNT, GENE_COUNT};
pub use species::{SpeciesRecord, SpeciesTracker};
pub use store::CellStore;
