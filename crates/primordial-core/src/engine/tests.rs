use super::*;
use crate::events::Event;
use crate::genome::{Archetype, Genome, AGG, DEF, GENE_COUNT, LIF, PHO, SIZ, SPD, VIS};
use crate::store::flags;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

/// Engine with solar switched off, so energy balances in the scenarios
/// below depend only on thermodynamics and interactions.
fn dark_engine(world_size: f32, capacity: usize) -> Engine {
    Engine::try_new(EngineConfig {
        world_size,
        capacity,
        solar_constant: 0.0,
        ..EngineConfig::default()
    })
    .unwrap_or_else(|e| panic!("{e}"))
}

fn mid_genome() -> Genome {
    Genome([0.5; GENE_COUNT])
}

/// The environment is procedurally generated, so scenario fixtures search
/// for ground clear of poison and barriers within `clearance` units.
fn calm_spot(engine: &Engine, clearance: f32) -> (f32, f32) {
    let world = engine.config().world_size;
    let env = engine.environment();
    let steps = 24;
    let offsets = [
        (0.0, 0.0),
        (clearance, 0.0),
        (-clearance, 0.0),
        (0.0, clearance),
        (0.0, -clearance),
    ];
    for gy in 2..steps - 1 {
        for gx in 2..steps - 1 {
            let x = world * gx as f32 / steps as f32;
            let y = world * gy as f32 / steps as f32;
            let calm = offsets
                .iter()
                .all(|&(ox, oy)| env.poison(x + ox, y + oy) < 1e-3 && !env.blocked(x + ox, y + oy));
            if calm {
                return (x, y);
            }
        }
    }
    panic!("no calm spot in this environment");
}

/// A ~300-unit triangle of calm positions (all pairwise distances < 400).
fn calm_triangle(engine: &Engine) -> [(f32, f32); 3] {
    let world = engine.config().world_size;
    let env = engine.environment();
    let offsets = [(0.0f32, 0.0f32), (300.0, 0.0), (150.0, 260.0)];
    let steps = 24;
    for gy in 1..steps {
        for gx in 1..steps {
            let x0 = world * gx as f32 / steps as f32;
            let y0 = world * gy as f32 / steps as f32;
            let calm = offsets.iter().all(|&(ox, oy)| {
                let (x, y) = (x0 + ox, y0 + oy);
                x < world && y < world && env.poison(x, y) < 1e-3 && !env.blocked(x, y)
            });
            if calm {
                return [
                    (x0, y0),
                    (x0 + 300.0, y0),
                    (x0 + 150.0, y0 + 260.0),
                ];
            }
        }
    }
    panic!("no calm triangle in this environment");
}

#[test]
fn lone_cell_only_wanders_and_burns_energy() {
    let mut engine = dark_engine(1000.0, 8);
    let i = engine.spawn(500.0, 500.0, mid_genome()).unwrap();
    engine.drain_events();

    engine.tick(0.1);

    let snap = engine.nearest(500.0, 500.0, Some(i)).unwrap();
    assert!(snap.energy < 100.0);
    assert_eq!(engine.births_last_tick(), 0);
    assert_eq!(engine.deaths_last_tick(), 0);
    let moved = (snap.x - 500.0).abs() + (snap.y - 500.0).abs();
    assert!(moved > 0.0);
    assert!(engine.drain_events().is_empty());
}

#[test]
fn adjacent_prey_is_taken_within_five_ticks() {
    let mut engine = dark_engine(1000.0, 8);
    let (cx, cy) = calm_spot(&engine, 10.0);
    let mut hunter = [0.5f32; GENE_COUNT];
    hunter[SPD] = 0.9;
    hunter[AGG] = 0.9;
    hunter[VIS] = 0.5;
    let mut prey = [0.5f32; GENE_COUNT];
    prey[DEF] = 0.1;
    prey[AGG] = 0.1;
    let h = engine.spawn(cx, cy, Genome(hunter)).unwrap();
    let p = engine.spawn(cx + 1.0, cy, Genome(prey)).unwrap();
    engine.drain_events();

    let mut deaths = 0;
    let mut events = Vec::new();
    for _ in 0..5 {
        engine.tick(0.1);
        deaths += engine.deaths_last_tick();
        events.extend(engine.drain_events());
        if engine.active_count() == 1 {
            break;
        }
    }

    assert_eq!(engine.active_count(), 1);
    assert_eq!(deaths, 1);
    assert!(!engine.store().is_live(p));
    let snap = engine.nearest(cx, cy, Some(h)).unwrap();
    assert!(snap.energy >= 129.0);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Death { index, .. } if *index == p)));
}

#[test]
fn producer_monoculture_fuses_into_a_colony() {
    let mut engine = dark_engine(1000.0, 64);
    let (cx, cy) = calm_spot(&engine, 20.0);
    let mut genes = [0.0f32; GENE_COUNT];
    genes[PHO] = 0.8;
    genes[LIF] = 0.5;
    for k in 0..20 {
        let angle = k as f32 / 20.0 * std::f32::consts::TAU;
        let radius = 10.0 + (k % 5) as f32;
        engine
            .spawn(
                cx + angle.cos() * radius,
                cy + angle.sin() * radius,
                Genome(genes),
            )
            .unwrap();
    }
    assert_eq!(engine.active_count(), 20);
    engine.drain_events();

    for _ in 0..30 {
        engine.tick(0.1);
    }

    assert_eq!(engine.active_count(), 1);
    let snap = engine.nearest(cx, cy, None).unwrap();
    assert!((snap.mass - 20.0).abs() < 1e-3);
    assert!(snap.energy >= 299.0);
    assert_eq!(snap.archetype, Archetype::Producer);
    assert_eq!(engine.total_deaths(), 19);
    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Colony { mass, .. } if (mass - 20.0).abs() < 1e-3)));
}

#[test]
fn compatible_heavy_triplet_fuses_into_a_super_colony() {
    let mut engine = dark_engine(2000.0, 16);
    let spots = calm_triangle(&engine);
    let mut genes = [0.0f32; GENE_COUNT];
    genes[SIZ] = 0.2;
    genes[LIF] = 0.5;
    for (k, &(x, y)) in spots.iter().enumerate() {
        let i = engine.spawn(x, y, Genome(genes)).unwrap() as usize;
        engine.store.mass[i] = 40.0;
        engine.store.energy[i] = 100.0 + k as f32 * 10.0;
    }
    engine.drain_events();

    for _ in 0..60 {
        engine.tick(0.1);
    }

    assert_eq!(engine.active_count(), 1);
    let centroid = (spots[0].0 + 150.0, spots[0].1 + 86.7);
    let snap = engine.nearest(centroid.0, centroid.1, None).unwrap();
    assert!((snap.mass - 132.0).abs() < 0.01);
    assert_eq!(snap.energy, 5000.0);
    assert_eq!(engine.total_deaths(), 2);
    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Fusion { mass, .. } if (mass - 132.0).abs() < 0.01)));
}

#[test]
fn light_triplet_is_tagged_as_an_alliance_instead_of_fusing() {
    let mut engine = dark_engine(2000.0, 16);
    let spots = calm_triangle(&engine);
    // Mass 10 keeps the bodies above the alliance floor without entering
    // the fragmentation band, and 3 x 10 stays below the fuse threshold.
    let mut genes = [0.0f32; GENE_COUNT];
    genes[SIZ] = 0.2;
    genes[LIF] = 0.5;
    let mut ids = Vec::new();
    for &(x, y) in spots.iter() {
        let i = engine.spawn(x, y, Genome(genes)).unwrap();
        engine.store.mass[i as usize] = 10.0;
        ids.push(i);
    }
    engine.drain_events();

    for _ in 0..60 {
        engine.tick(0.1);
    }

    assert_eq!(engine.active_count(), 3);
    assert_eq!(engine.total_deaths(), 0);
    let shared = engine.store().alliance_ids()[ids[0] as usize];
    assert!(shared >= 1);
    for &i in &ids {
        assert_eq!(engine.store().alliance_ids()[i as usize], shared);
    }
    let events = engine.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Alliance { count: 3, .. }));
}

#[test]
fn heavyweight_aggressor_siphons_mass_from_a_lighter_neighbor() {
    let mut engine = dark_engine(1000.0, 8);
    let (cx, cy) = calm_spot(&engine, 45.0);
    let mut robber = [0.0f32; GENE_COUNT];
    robber[AGG] = 0.9;
    robber[VIS] = 0.5;
    robber[LIF] = 0.5;
    // 40 units: outside the eat radius of a mass-40 body (~31.6) but
    // inside its 50-unit vision, so only the siphon rule applies.
    let a = engine.spawn(cx, cy, Genome(robber)).unwrap();
    let v = engine.spawn(cx + 40.0, cy, mid_genome()).unwrap();
    engine.store.mass[a as usize] = 40.0;
    engine.drain_events();

    engine.tick(0.1);

    assert!(engine.store().is_live(v));
    assert!((engine.store().masses()[v as usize] - 0.85).abs() < 1e-4);
    assert!((engine.store().masses()[a as usize] - 40.15).abs() < 1e-4);
    let energy = engine.store().energies()[a as usize];
    assert!(energy > 101.0 && energy < 102.0);
    assert_eq!(engine.deaths_last_tick(), 0);
    assert!(engine.drain_events().is_empty());
}

#[test]
fn draining_below_the_floor_assimilates_the_victim() {
    let mut engine = dark_engine(1000.0, 8);
    let (cx, cy) = calm_spot(&engine, 45.0);
    let mut robber = [0.0f32; GENE_COUNT];
    robber[AGG] = 0.9;
    robber[VIS] = 0.5;
    robber[LIF] = 0.5;
    let a = engine.spawn(cx, cy, Genome(robber)).unwrap();
    let v = engine.spawn(cx + 40.0, cy, mid_genome()).unwrap();
    engine.store.mass[a as usize] = 40.0;
    // A body already drained close to the floor; the next siphon tips it.
    engine.store.mass[v as usize] = 0.2;
    engine.drain_events();

    engine.tick(0.1);

    assert!(!engine.store().is_live(v));
    assert!((engine.store().masses()[a as usize] - 40.2).abs() < 1e-4);
    assert_eq!(engine.deaths_last_tick(), 1);
    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Assimilation { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::Death { .. })));
    assert!(!events.iter().any(|e| matches!(e, Event::Absorption { .. })));
}

#[test]
fn allied_donor_shares_energy_with_a_starving_neighbor() {
    let mut engine = dark_engine(1000.0, 8);
    let (cx, cy) = calm_spot(&engine, 15.0);
    let donor = engine.spawn(cx, cy, mid_genome()).unwrap();
    let recipient = engine.spawn(cx + 10.0, cy, mid_genome()).unwrap();
    engine.store.alliance[donor as usize] = 7;
    engine.store.alliance[recipient as usize] = 7;
    engine.store.energy[donor as usize] = 120.0;
    engine.store.energy[recipient as usize] = 40.0;
    engine.drain_events();

    engine.tick(0.1);

    // One transfer of 10 * dt on top of each cell's own upkeep (0.0375).
    let donor_energy = engine.store().energies()[donor as usize];
    let recipient_energy = engine.store().energies()[recipient as usize];
    assert!((donor_energy - (120.0 - 1.0 - 0.0375)).abs() < 0.01);
    assert!((recipient_energy - (40.0 + 1.0 - 0.0375)).abs() < 0.01);
    assert_eq!(engine.deaths_last_tick(), 0);
    assert!(engine.drain_events().is_empty());
}

#[test]
fn mid_sized_body_fragments_into_genome_copies() {
    let mut engine = dark_engine(1000.0, 16);
    let (cx, cy) = calm_spot(&engine, 35.0);
    let mut genes = [0.0f32; GENE_COUNT];
    genes[PHO] = 0.3;
    genes[LIF] = 0.5;
    let parent = engine.spawn(cx, cy, Genome(genes)).unwrap();
    engine.store.mass[parent as usize] = 5.0;
    engine.store.generation[parent as usize] = 3;
    engine.drain_events();

    engine.tick(0.1);

    // min(5, floor(5 / 2)) = 2 children replace the parent.
    assert_eq!(engine.active_count(), 2);
    assert_eq!(engine.births_last_tick(), 2);
    assert_eq!(engine.deaths_last_tick(), 1);
    for i in 0..engine.store().capacity() {
        if !engine.store().is_active()[i] {
            continue;
        }
        assert_eq!(engine.store().masses()[i], 1.0);
        assert_eq!(engine.store().genomes()[i], Genome(genes));
        assert_eq!(engine.store().generations()[i], 3);
        assert!(engine.store().cooldowns()[i] >= 2.8);
        let dx = engine.store().positions_x()[i] - cx;
        let dy = engine.store().positions_y()[i] - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        assert!((9.9..=30.1).contains(&dist));
    }
    let events = engine.drain_events();
    let births = events
        .iter()
        .filter(|e| matches!(e, Event::Birth { generation: 3, .. }))
        .count();
    assert_eq!(births, 2);
    assert!(!events.iter().any(|e| matches!(e, Event::Death { .. })));
}

#[test]
fn energetic_parent_reproduces_with_bounded_mutation() {
    let mut engine = dark_engine(1000.0, 8);
    let (cx, cy) = calm_spot(&engine, 10.0);
    let parent_genome = mid_genome();
    let parent = engine.spawn(cx, cy, parent_genome).unwrap();
    engine.store.energy[parent as usize] = 200.0;
    engine.drain_events();

    engine.tick(0.1);

    assert_eq!(engine.active_count(), 2);
    assert_eq!(engine.births_last_tick(), 1);
    let child_index = (0..engine.store().capacity())
        .find(|&i| engine.store().is_active()[i] && i != parent as usize)
        .unwrap() as u32;
    let child = engine.snapshot(child_index).unwrap();
    assert_eq!(child.generation, 2);
    let bound = 0.5 * 0.1 + f32::EPSILON;
    for (c, p) in child.genome.genes().iter().zip(parent_genome.genes()) {
        assert!((c - p).abs() <= bound);
        assert!((0.0..=1.0).contains(c));
    }
    let parent_snap = engine.snapshot(parent).unwrap();
    assert!(parent_snap.energy <= 120.0);
    assert!(parent_snap.energy > 119.0);
    assert_ne!(
        engine.store().flag_bits()[parent as usize] & flags::RECENT_BIRTH,
        0
    );
    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Birth { index, .. } if *index == child_index)));
}

#[test]
fn spawn_at_capacity_is_rejected_without_event() {
    let mut engine = dark_engine(500.0, 8);
    for k in 0..8 {
        assert!(engine
            .spawn(50.0 + k as f32 * 10.0, 50.0, mid_genome())
            .is_some());
    }
    assert!(engine.spawn(250.0, 50.0, mid_genome()).is_none());
    assert_eq!(engine.active_count(), 8);
    let births = engine
        .drain_events()
        .iter()
        .filter(|e| matches!(e, Event::Birth { .. }))
        .count();
    assert_eq!(births, 8);
}

#[test]
fn extinction_is_announced_exactly_once() {
    let mut engine = dark_engine(500.0, 4);
    let i = engine.spawn(100.0, 100.0, mid_genome()).unwrap();
    engine.store.energy[i as usize] = 0.001;
    engine.drain_events();

    engine.tick(0.1);
    assert_eq!(engine.active_count(), 0);
    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::Milestone(m) if m.as_str() == "extinction")));

    engine.tick(0.1);
    engine.tick(0.1);
    assert!(engine
        .drain_events()
        .iter()
        .all(|e| !matches!(e, Event::Milestone(_))));
}

#[test]
fn universal_invariants_hold_over_a_long_run() {
    let config = EngineConfig {
        world_size: 1000.0,
        capacity: 256,
        seed: 7,
        ..EngineConfig::default()
    };
    let mut engine = Engine::try_new(config).unwrap();
    let mut rng = ChaCha12Rng::seed_from_u64(7);
    for _ in 0..120 {
        let genome = Genome(std::array::from_fn(|_| rng.random::<f32>()));
        let x = rng.random_range(0.0..1000.0);
        let y = rng.random_range(0.0..1000.0);
        let _ = engine.spawn(x, y, genome);
    }

    for _ in 0..200 {
        engine.tick(0.1);
        let store = engine.store();
        assert_eq!(store.active_count() + store.free_count(), 256);
        let telemetry = engine.telemetry();
        assert_eq!(
            telemetry.dominant_genes.iter().sum::<u32>(),
            store.active_count() as u32
        );
        assert_eq!(
            telemetry.archetypes.iter().sum::<u32>(),
            store.active_count() as u32
        );
        for i in 0..store.capacity() {
            if !store.is_active()[i] {
                continue;
            }
            assert!(store.energies()[i] > 0.0);
            assert!(store.masses()[i] >= 0.1);
            assert!(store.genomes()[i]
                .genes()
                .iter()
                .all(|g| (0.0..=1.0).contains(g)));
            let species_id = store.species_ids()[i];
            assert!(species_id == -1 || engine.species().contains(species_id));
        }
        engine.drain_events();
    }
}

#[test]
fn identical_seeds_produce_identical_runs() {
    let build = || {
        let mut engine = Engine::try_new(EngineConfig {
            world_size: 800.0,
            capacity: 128,
            seed: 11,
            ..EngineConfig::default()
        })
        .unwrap();
        let mut rng = ChaCha12Rng::seed_from_u64(90);
        for _ in 0..60 {
            let genome = Genome(std::array::from_fn(|_| rng.random::<f32>()));
            let _ = engine.spawn(
                rng.random_range(0.0..800.0),
                rng.random_range(0.0..800.0),
                genome,
            );
        }
        engine
    };
    let mut a = build();
    let mut b = build();
    for _ in 0..100 {
        a.tick(0.1);
        b.tick(0.1);
        a.drain_events();
        b.drain_events();
    }
    assert_eq!(a.active_count(), b.active_count());
    assert_eq!(a.store().positions_x(), b.store().positions_x());
    assert_eq!(a.store().positions_y(), b.store().positions_y());
    assert_eq!(a.store().energies(), b.store().energies());
    assert_eq!(a.telemetry(), b.telemetry());
}

#[test]
fn species_assignment_runs_on_first_tick() {
    let mut engine = dark_engine(500.0, 8);
    let a = engine
        .spawn(100.0, 100.0, Genome([0.2; GENE_COUNT]))
        .unwrap();
    let b = engine
        .spawn(300.0, 300.0, Genome([0.8; GENE_COUNT]))
        .unwrap();
    engine.tick(0.1);
    assert!(engine.store().species_ids()[a as usize] >= 0);
    assert!(engine.store().species_ids()[b as usize] >= 0);
    assert_ne!(
        engine.store().species_ids()[a as usize],
        engine.store().species_ids()[b as usize]
    );
    assert_eq!(engine.species().len(), 2);
    assert_eq!(engine.history().len(), 1);
    assert_eq!(engine.history().latest().unwrap().total(), 2);
}

#[test]
fn nearest_prefers_live_follow_hint_and_falls_back_to_radius() {
    let mut engine = dark_engine(1000.0, 8);
    let a = engine.spawn(100.0, 100.0, mid_genome()).unwrap();
    let b = engine.spawn(400.0, 400.0, mid_genome()).unwrap();

    let followed = engine.nearest(400.0, 400.0, Some(a)).unwrap();
    assert_eq!(followed.index, a);

    let picked = engine.nearest(390.0, 400.0, None).unwrap();
    assert_eq!(picked.index, b);

    assert!(engine.nearest(700.0, 700.0, None).is_none());

    engine.store.remove(a);
    let fallback = engine.nearest(395.0, 400.0, Some(a)).unwrap();
    assert_eq!(fallback.index, b);
}

#[test]
fn bad_dt_is_ignored_and_large_dt_is_truncated() {
    let mut engine = dark_engine(500.0, 4);
    let (cx, cy) = calm_spot(&engine, 10.0);
    engine.spawn(cx, cy, mid_genome()).unwrap();
    engine.tick(f32::NAN);
    engine.tick(-1.0);
    engine.tick(0.0);
    assert_eq!(engine.tick_index(), 0);
    engine.tick(5.0);
    assert_eq!(engine.tick_index(), 1);
    // A truncated step drains at most MAX_DT worth of upkeep.
    let snap = engine.nearest(cx, cy, None).unwrap();
    assert!(snap.energy > 99.0);
}

#[test]
fn configure_clamps_tunables() {
    let mut engine = dark_engine(500.0, 4);
    engine.configure(Tuning {
        mutation_rate: Some(99.0),
        food_abundance: Some(0.0),
        friction: Some(2.0),
        solar_constant: Some(f32::NAN),
    });
    assert_eq!(engine.config().mutation_rate, 10.0);
    assert_eq!(engine.config().food_abundance, 0.1);
    assert_eq!(engine.config().friction, 1.0);
    // NaN is ignored, the constructed value stays.
    assert_eq!(engine.config().solar_constant, 0.0);
}

#[test]
fn experiment_runner_samples_on_cadence() {
    let mut engine = Engine::try_new(EngineConfig {
        world_size: 500.0,
        capacity: 64,
        seed: 3,
        ..EngineConfig::default()
    })
    .unwrap();
    let mut rng = ChaCha12Rng::seed_from_u64(3);
    for _ in 0..20 {
        let genome = Genome(std::array::from_fn(|_| rng.random::<f32>()));
        let _ = engine.spawn(
            rng.random_range(0.0..500.0),
            rng.random_range(0.0..500.0),
            genome,
        );
    }
    let summary = engine.run_experiment(45, 0.1, 10);
    assert_eq!(summary.steps, 45);
    assert_eq!(summary.samples.len(), 5);
    assert_eq!(summary.samples.last().unwrap().tick, 45);
    assert_eq!(summary.final_active as usize, engine.active_count());

    assert!(matches!(
        engine.try_run_experiment(10, 0.1, 0),
        Err(ExperimentError::InvalidSampleEvery)
    ));
    assert!(matches!(
        engine.try_run_experiment(Engine::MAX_EXPERIMENT_STEPS + 1, 0.1, 1),
        Err(ExperimentError::TooManySteps { .. })
    ));
}

#[test]
fn telemetry_round_trips_through_json() {
    let mut engine = dark_engine(500.0, 8);
    engine.spawn(100.0, 100.0, mid_genome()).unwrap();
    engine.tick(0.1);
    let telemetry = engine.telemetry();
    let json = serde_json::to_string(&telemetry).unwrap();
    let back: Telemetry = serde_json::from_str(&json).unwrap();
    assert_eq!(back, telemetry);
}

#[test]
fn absorption_folds_the_smaller_body_into_the_larger() {
    let mut engine = dark_engine(1000.0, 8);
    let (cx, cy) = calm_spot(&engine, 15.0);
    let mut big = [0.0f32; GENE_COUNT];
    big[VIS] = 0.5;
    big[LIF] = 0.5;
    let a = engine.spawn(cx, cy, Genome(big)).unwrap();
    let b = engine.spawn(cx + 10.0, cy, mid_genome()).unwrap();
    engine.store.mass[a as usize] = 40.0;
    engine.drain_events();

    engine.tick(0.1);

    assert!(!engine.store().is_live(b));
    let snap = engine.snapshot(a).unwrap();
    assert!((snap.mass - 41.0).abs() < 1e-3);
    let events = engine.drain_events();
    assert!(events.iter().any(|e| matches!(e, Event::Absorption { .. })));
    assert_eq!(engine.deaths_last_tick(), 1);
}
