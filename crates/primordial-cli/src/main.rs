use anyhow::{Context, Result};
use clap::Parser;
use primordial_core::{Engine, EngineConfig, Genome};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

/// Headless experiment runner for the Primordial simulation core.
///
/// Seeds a random population, runs the engine for a fixed number of ticks,
/// and prints telemetry as JSON.
#[derive(Parser, Debug)]
#[command(name = "primordial")]
struct Args {
    /// Side length of the square world.
    #[arg(long, default_value_t = 1000.0)]
    world_size: f32,
    /// Cell capacity of the store.
    #[arg(long, default_value_t = 4096)]
    capacity: usize,
    /// Cells seeded before the run.
    #[arg(long, default_value_t = 500)]
    cells: usize,
    /// Ticks to run.
    #[arg(long, default_value_t = 2000)]
    ticks: u64,
    /// Step size per tick (the engine truncates to 0.1).
    #[arg(long, default_value_t = 0.1)]
    dt: f32,
    /// Telemetry sampling cadence, in ticks.
    #[arg(long, default_value_t = 100)]
    sample_every: u64,
    /// Seed for the engine, environment, and initial population.
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Print each telemetry sample as a JSON line instead of one summary.
    #[arg(long)]
    samples: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = EngineConfig {
        world_size: args.world_size,
        capacity: args.capacity,
        seed: args.seed,
        ..EngineConfig::default()
    };
    let mut engine = Engine::try_new(config).context("invalid engine configuration")?;

    let mut rng = ChaCha12Rng::seed_from_u64(args.seed);
    let mut seeded = 0usize;
    for _ in 0..args.cells {
        let genome = Genome(std::array::from_fn(|_| rng.random::<f32>()));
        let x = rng.random_range(0.0..args.world_size);
        let y = rng.random_range(0.0..args.world_size);
        if engine.spawn(x, y, genome).is_some() {
            seeded += 1;
        }
    }
    engine.drain_events();
    eprintln!(
        "seeded {seeded} cells in a {}x{} world, running {} ticks",
        args.world_size, args.world_size, args.ticks
    );

    let summary = engine
        .try_run_experiment(args.ticks, args.dt, args.sample_every)
        .context("experiment rejected")?;

    if args.samples {
        for sample in &summary.samples {
            println!("{}", serde_json::to_string(sample)?);
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}
