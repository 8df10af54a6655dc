use super::Engine;
use crate::analytics::PopulationSample;
use crate::config::EngineConfig;
use crate::environment::Environment;
use crate::events::{Event, EventQueue};
use crate::genome::Genome;
use crate::spatial::UniformGrid;
use crate::store::{flags, CellStore};
use rand::Rng;
use rand_chacha::ChaCha12Rng;
use std::f32::consts::TAU;

// Bodies between these masses are unstable and break apart.
const FRAGMENT_MIN_MASS: f32 = 1.5;
const FRAGMENT_MAX_MASS: f32 = 10.0;
const FRAGMENT_MAX_CHILDREN: f32 = 5.0;

// A body must outweigh a neighbor by this ratio to absorb or rob it.
const PREDATION_MASS_RATIO: f32 = 1.2;
const COOP_DONOR_MIN: f32 = 100.0;
const COOP_RECIPIENT_MAX: f32 = 50.0;
const COOP_RATE: f32 = 10.0;
const STEAL_RATE: f32 = 1.5;
const STEAL_ENERGY_RATE: f32 = 15.0;
// Below this remaining mass a robbed body is assimilated outright.
const STEAL_FLOOR: f32 = 0.1;
const HUNGER_THRESHOLD: f32 = 60.0;
const EAT_GAIN: f32 = 30.0;
const REPRODUCE_THRESHOLD: f32 = 150.0;
const REPRODUCE_COST: f32 = 80.0;
const WANDER_KICK: f32 = 5.0;
// Keeps fusion products and fragments out of the next clustering pass.
const FUSION_COOLDOWN: f32 = 3.0;
// Slight impulse amplification so reflected cells escape barrier cells.
const BOUNCE_FACTOR: f32 = -1.2;
const BOUNCE_STEP: f32 = 0.1;

const ALLIANCE_MIN_MASS: f32 = 2.0;
const ALLIANCE_RANGE: f32 = 400.0;
const ALLIANCE_AFFINITY: f32 = 0.3;
const ALLIANCE_FUSE_MASS: f32 = 100.0;
const FUSION_SYNERGY: f32 = 1.1;
const FUSION_ENERGY: f32 = 5000.0;

/// Absorption reach of a body; grows with the square root of its mass.
fn eat_radius(mass: f32) -> f32 {
    5.0 * mass.sqrt()
}

/// Gene-space compatibility for alliances: L1 distance over SPD, AGG, PHO.
fn gene_affinity(a: &Genome, b: &Genome) -> f32 {
    (a.spd() - b.spd()).abs() + (a.agg() - b.agg()).abs() + (a.pho() - b.pho()).abs()
}

/// Births and deaths accumulated across one pass.
#[derive(Default)]
struct PassDelta {
    births: u32,
    deaths: u32,
}

impl Engine {
    /// Advance the world one step. Non-finite or non-positive dts are
    /// ignored; oversized dts are truncated to [`Engine::MAX_DT`].
    pub fn tick(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let dt = dt.min(Self::MAX_DT);
        self.tick_index += 1;
        self.births_last_tick = 0;
        self.deaths_last_tick = 0;

        self.grid
            .rebuild(&self.store.pos_x, &self.store.pos_y, &self.store.active);

        let species_every = self.config.species_interval;
        if self.tick_index % species_every == 1 % species_every {
            self.species_pass();
        }

        self.behavior_pass(dt);
        self.store.integrate(dt);
        self.boundary_pass();

        if self.tick_index % self.config.colony_interval == 0 {
            // Re-index so clustering sees post-integration positions.
            self.grid
                .rebuild(&self.store.pos_x, &self.store.pos_y, &self.store.active);
            self.colony_pass();
        }
        if self.tick_index % self.config.alliance_interval == 0 {
            self.alliance_pass();
        }

        if self.store.active_count == 0 && !self.extinction_emitted {
            self.events.push(Event::Milestone("extinction".into()));
            self.extinction_emitted = true;
        }
    }

    /// The sequential per-cell pass. Strictly index order, read-modify-write
    /// against current state: removals by earlier cells are visible to later
    /// ones within the same tick.
    fn behavior_pass(&mut self, dt: f32) {
        let Self {
            store,
            grid,
            env,
            events,
            rng,
            config,
            neighbor_scratch,
            ..
        } = self;
        let mut delta = PassDelta::default();
        for i in 0..store.capacity {
            if !store.active[i] {
                continue;
            }
            store.flags[i] &= !flags::RECENT_BIRTH;
            store.cooldown[i] = (store.cooldown[i] - dt).max(0.0);
            update_cell(
                store,
                grid,
                env,
                events,
                rng,
                config,
                neighbor_scratch,
                i,
                dt,
                &mut delta,
            );
        }
        self.births_last_tick += delta.births;
        self.deaths_last_tick += delta.deaths;
        self.total_births += delta.births as u64;
        self.total_deaths += delta.deaths as u64;
    }

    /// Reflect off barrier cells, wrap around world edges.
    fn boundary_pass(&mut self) {
        let Self {
            store, env, config, ..
        } = self;
        let world = config.world_size;
        for i in 0..store.capacity {
            if !store.active[i] {
                continue;
            }
            if env.blocked(store.pos_x[i], store.pos_y[i]) {
                store.vel_x[i] *= BOUNCE_FACTOR;
                store.vel_y[i] *= BOUNCE_FACTOR;
                store.pos_x[i] += store.vel_x[i] * BOUNCE_STEP;
                store.pos_y[i] += store.vel_y[i] * BOUNCE_STEP;
            }
            if store.pos_x[i] < 0.0 || store.pos_x[i] > world {
                store.pos_x[i] = store.pos_x[i].rem_euclid(world);
            }
            if store.pos_y[i] < 0.0 || store.pos_y[i] > world {
                store.pos_y[i] = store.pos_y[i].rem_euclid(world);
            }
        }
    }

    /// Re-identify every live cell, drop emptied species, and record a
    /// population sample.
    fn species_pass(&mut self) {
        let Self {
            store,
            species,
            events,
            history,
            tick_index,
            ..
        } = self;
        species.reset_counts();
        for i in 0..store.capacity {
            if !store.active[i] {
                continue;
            }
            store.species[i] = species.identify(store.genome[i]) as i32;
        }
        for id in species.prune() {
            events.push(Event::Milestone(format!("species {id} went extinct")));
        }
        history.push(PopulationSample {
            tick: *tick_index,
            counts: species
                .records()
                .iter()
                .map(|r| (r.id, r.population))
                .collect(),
        });
    }

    /// Fuse dense single-archetype clusters into one large body.
    fn colony_pass(&mut self) {
        let Self {
            store,
            grid,
            events,
            neighbor_scratch,
            cluster_scratch,
            visited_scratch,
            ..
        } = self;
        let (threshold, radius) = if store.active_count > 2000 {
            (5usize, 80.0f32)
        } else {
            (15usize, 50.0f32)
        };
        let radius_sq = radius * radius;
        visited_scratch.clear();
        visited_scratch.resize(store.capacity, false);
        let mut deaths = 0u32;

        for i in 0..store.capacity {
            if !store.active[i] || visited_scratch[i] {
                continue;
            }
            visited_scratch[i] = true;
            if store.cooldown[i] > 0.0 {
                continue;
            }
            let archetype = store.archetype[i];
            cluster_scratch.clear();
            cluster_scratch.push(i as u32);
            grid.gather(store.pos_x[i], store.pos_y[i], radius, neighbor_scratch);
            for k in 0..neighbor_scratch.len() {
                let j = neighbor_scratch[k] as usize;
                if j == i || !store.active[j] || visited_scratch[j] {
                    continue;
                }
                if store.archetype[j] != archetype || store.cooldown[j] > 0.0 {
                    continue;
                }
                let dx = store.pos_x[j] - store.pos_x[i];
                let dy = store.pos_y[j] - store.pos_y[i];
                if dx * dx + dy * dy > radius_sq {
                    continue;
                }
                visited_scratch[j] = true;
                cluster_scratch.push(j as u32);
            }
            if cluster_scratch.len() <= threshold {
                continue;
            }

            let mut centroid_x = 0.0f32;
            let mut centroid_y = 0.0f32;
            let mut total_mass = 0.0f32;
            let mut best = cluster_scratch[0] as usize;
            for &member in cluster_scratch.iter() {
                let m = member as usize;
                centroid_x += store.pos_x[m];
                centroid_y += store.pos_y[m];
                total_mass += store.mass[m];
                if store.energy[m] > store.energy[best] {
                    best = m;
                }
            }
            let count = cluster_scratch.len() as f32;
            centroid_x /= count;
            centroid_y /= count;
            let genome = store.genome[best];
            let max_energy = store.energy[best];
            let generation = store.generation[best];

            for &member in cluster_scratch.iter() {
                store.remove(member);
            }
            deaths += cluster_scratch.len() as u32 - 1;

            // Cannot fail: the members just freed more than one slot.
            if let Some(index) = store.spawn(centroid_x, centroid_y, genome) {
                let s = index as usize;
                store.mass[s] = total_mass;
                store.energy[s] = max_energy + 10.0 * total_mass;
                store.generation[s] = generation;
                store.cooldown[s] = FUSION_COOLDOWN;
                events.push(Event::Colony {
                    archetype: store.archetype[s],
                    mass: total_mass,
                });
            }
        }
        self.deaths_last_tick += deaths;
        self.total_deaths += deaths as u64;
    }

    /// Link compatible heavy bodies into triplet alliances; fuse triplets
    /// whose combined mass crosses the super-colony threshold.
    fn alliance_pass(&mut self) {
        let Self {
            store,
            events,
            candidate_scratch,
            visited_scratch,
            next_alliance_id,
            ..
        } = self;

        // Alliance tags only live between two passes.
        for i in 0..store.capacity {
            if store.active[i] {
                store.alliance[i] = -1;
            }
        }

        candidate_scratch.clear();
        for i in 0..store.capacity {
            if store.active[i] && store.mass[i] > ALLIANCE_MIN_MASS {
                candidate_scratch.push(i as u32);
            }
        }
        visited_scratch.clear();
        visited_scratch.resize(store.capacity, false);
        let range_sq = ALLIANCE_RANGE * ALLIANCE_RANGE;
        let mut deaths = 0u32;

        for ci in 0..candidate_scratch.len() {
            let a = candidate_scratch[ci] as usize;
            if visited_scratch[a] || !store.active[a] {
                continue;
            }
            visited_scratch[a] = true;
            let mut members = [a, 0, 0];
            let mut count = 1;
            for cj in (ci + 1)..candidate_scratch.len() {
                let b = candidate_scratch[cj] as usize;
                if visited_scratch[b] || !store.active[b] {
                    continue;
                }
                let dx = store.pos_x[b] - store.pos_x[a];
                let dy = store.pos_y[b] - store.pos_y[a];
                if dx * dx + dy * dy >= range_sq {
                    continue;
                }
                if gene_affinity(&store.genome[a], &store.genome[b]) >= ALLIANCE_AFFINITY {
                    continue;
                }
                visited_scratch[b] = true;
                members[count] = b;
                count += 1;
                if count == 3 {
                    break;
                }
            }
            if count < 3 {
                continue;
            }

            let total_mass: f32 = members.iter().map(|&m| store.mass[m]).sum();
            if total_mass > ALLIANCE_FUSE_MASS {
                let mut centroid_x = 0.0f32;
                let mut centroid_y = 0.0f32;
                let mut best = members[0];
                for &m in &members {
                    centroid_x += store.pos_x[m];
                    centroid_y += store.pos_y[m];
                    if store.energy[m] > store.energy[best] {
                        best = m;
                    }
                }
                centroid_x /= 3.0;
                centroid_y /= 3.0;
                let genome = store.genome[best];
                let generation = store.generation[best];
                for &m in &members {
                    store.remove(m as u32);
                }
                deaths += 2;
                if let Some(index) = store.spawn(centroid_x, centroid_y, genome) {
                    let s = index as usize;
                    store.mass[s] = total_mass * FUSION_SYNERGY;
                    store.energy[s] = FUSION_ENERGY;
                    store.generation[s] = generation;
                    store.cooldown[s] = FUSION_COOLDOWN;
                    events.push(Event::Fusion {
                        archetype: store.archetype[s],
                        mass: store.mass[s],
                    });
                }
            } else {
                let id = *next_alliance_id;
                *next_alliance_id += 1;
                for &m in &members {
                    store.alliance[m] = id;
                }
                events.push(Event::Alliance {
                    archetype: store.archetype[a],
                    count: 3,
                });
            }
        }
        self.deaths_last_tick += deaths;
        self.total_deaths += deaths as u64;
    }
}

/// One cell's update: thermodynamics, fragmentation, perception and
/// interaction, locomotion, reproduction, death. See the engine docs for the
/// ordering contract.
#[allow(clippy::too_many_arguments)]
fn update_cell(
    store: &mut CellStore,
    grid: &UniformGrid,
    env: &Environment,
    events: &mut EventQueue,
    rng: &mut ChaCha12Rng,
    config: &EngineConfig,
    scratch: &mut Vec<u32>,
    i: usize,
    dt: f32,
    delta: &mut PassDelta,
) {
    let genome = store.genome[i];
    let x = store.pos_x[i];
    let y = store.pos_y[i];
    let (vx, vy) = (store.vel_x[i], store.vel_y[i]);
    let mut mass = store.mass[i];
    let mut energy = store.energy[i];

    // Thermodynamics: motion, body bulk, and sensory upkeep drain energy;
    // photosynthesis feeds it, scaled for colonies with diminishing returns.
    let upkeep = (vx * vx + vy * vy) * 0.5 + genome.siz().powi(3) + genome.vis() * 100.0 * 0.005;
    energy -= upkeep * dt;
    let mut intake = env.solar(x, y) * genome.pho() * 45.0 * config.food_abundance;
    if mass > 2.0 {
        intake *= 1.0 + mass.log2();
    }
    energy += intake * dt;
    energy -= env.poison(x, y) * 50.0 * dt;

    if mass > FRAGMENT_MIN_MASS && mass < FRAGMENT_MAX_MASS {
        fragment(store, events, rng, i, mass, delta);
        return;
    }

    // Perception: one broad-phase query, then interaction rules in order
    // per neighbor, stopping at the first that removes it.
    let vision = genome.vis() * 100.0;
    let mut prey: Option<(usize, f32)> = None;
    let mut threat: Option<(usize, f32)> = None;
    if vision > 0.0 {
        grid.gather(x, y, vision, scratch);
        let vision_sq = vision * vision;
        let energy_snapshot = energy;
        for k in 0..scratch.len() {
            let j = scratch[k] as usize;
            if j == i || !store.active[j] {
                continue;
            }
            let dx = store.pos_x[j] - x;
            let dy = store.pos_y[j] - y;
            let dist_sq = dx * dx + dy * dy;
            if dist_sq > vision_sq {
                continue;
            }
            let neighbor_mass = store.mass[j];
            let allied = store.alliance[i] >= 0 && store.alliance[i] == store.alliance[j];

            // Absorption by the strictly larger body.
            if !allied && mass > neighbor_mass * PREDATION_MASS_RATIO {
                let reach = eat_radius(mass);
                if dist_sq <= reach * reach {
                    mass += neighbor_mass;
                    energy += 0.5 * energy_snapshot;
                    store.remove(j as u32);
                    delta.deaths += 1;
                    events.push(Event::Absorption { mass });
                    continue;
                }
            }

            // Energy sharing inside an alliance.
            if allied && energy > COOP_DONOR_MIN && store.energy[j] < COOP_RECIPIENT_MAX {
                let transfer = COOP_RATE * dt;
                energy -= transfer;
                store.energy[j] += transfer;
            }

            // Aggressive heavyweights siphon mass from outsiders.
            if !allied && genome.agg() > 0.5 && mass > neighbor_mass * PREDATION_MASS_RATIO {
                let drain = STEAL_RATE * dt;
                if neighbor_mass - drain < STEAL_FLOOR {
                    events.push(Event::Assimilation {
                        predator: store.archetype[i],
                        prey: store.archetype[j],
                    });
                    mass += neighbor_mass;
                    store.remove(j as u32);
                    delta.deaths += 1;
                    energy += STEAL_ENERGY_RATE * dt;
                    continue;
                }
                store.mass[j] = neighbor_mass - drain;
                mass += drain;
                energy += STEAL_ENERGY_RATE * dt;
            }

            // Remember the closest viable prey and the closest threat.
            if store.genome[j].def() < genome.agg()
                && mass >= store.mass[j]
                && prey.is_none_or(|(_, best)| dist_sq < best)
            {
                prey = Some((j, dist_sq));
            }
            if store.genome[j].agg() > genome.def()
                && threat.is_none_or(|(_, best)| dist_sq < best)
            {
                threat = Some((j, dist_sq));
            }
        }
    }

    // Locomotion: fleeing overrides hunting. A viable prey already inside
    // contact range is eaten outright; pursuit only starts when hungry.
    if let Some((t, dist_sq)) = threat {
        let dist = dist_sq.sqrt().max(1e-6);
        let speed = genome.spd() * 100.0;
        store.vel_x[i] = (x - store.pos_x[t]) / dist * speed;
        store.vel_y[i] = (y - store.pos_y[t]) / dist * speed;
    } else if let Some((p, dist_sq)) = prey {
        let contact = (genome.siz() + store.genome[p].siz()) * 10.0;
        if dist_sq.sqrt() < contact {
            energy += EAT_GAIN;
            let archetype = store.archetype[p];
            store.remove(p as u32);
            delta.deaths += 1;
            events.push(Event::Death {
                index: p as u32,
                archetype,
            });
        } else if energy < HUNGER_THRESHOLD {
            let dist = dist_sq.sqrt().max(1e-6);
            let speed = genome.spd() * 100.0;
            store.vel_x[i] = (store.pos_x[p] - x) / dist * speed;
            store.vel_y[i] = (store.pos_y[p] - y) / dist * speed;
        } else {
            wander(store, rng, i, genome.spd());
        }
    } else {
        wander(store, rng, i, genome.spd());
    }

    if energy > REPRODUCE_THRESHOLD {
        if let Some(child) = store.reproduce(i as u32, config.mutation_rate, rng) {
            energy -= REPRODUCE_COST;
            delta.births += 1;
            store.flags[i] |= flags::RECENT_BIRTH;
            events.push(Event::Birth {
                index: child,
                generation: store.generation[child as usize],
            });
        }
    }

    if energy <= 0.0 {
        let archetype = store.archetype[i];
        store.remove(i as u32);
        delta.deaths += 1;
        events.push(Event::Death {
            index: i as u32,
            archetype,
        });
    } else {
        store.energy[i] = energy;
        store.mass[i] = mass;
    }
}

/// Random-walk impulse capped by the SPD gene.
fn wander(store: &mut CellStore, rng: &mut ChaCha12Rng, i: usize, spd: f32) {
    store.vel_x[i] += rng.random_range(-WANDER_KICK..WANDER_KICK);
    store.vel_y[i] += rng.random_range(-WANDER_KICK..WANDER_KICK);
    let cap = spd * 50.0;
    let speed_sq = store.vel_x[i] * store.vel_x[i] + store.vel_y[i] * store.vel_y[i];
    if speed_sq > cap * cap {
        let scale = cap / speed_sq.sqrt();
        store.vel_x[i] *= scale;
        store.vel_y[i] *= scale;
    }
}

/// Dissolve a mid-sized body into up to five copies of itself scattered on
/// a ring around its position.
fn fragment(
    store: &mut CellStore,
    events: &mut EventQueue,
    rng: &mut ChaCha12Rng,
    i: usize,
    mass: f32,
    delta: &mut PassDelta,
) {
    let children = (mass / 2.0).floor().min(FRAGMENT_MAX_CHILDREN) as u32;
    let genome = store.genome[i];
    let generation = store.generation[i];
    let x = store.pos_x[i];
    let y = store.pos_y[i];
    store.remove(i as u32);
    delta.deaths += 1;
    for _ in 0..children {
        let angle = rng.random_range(0.0..TAU);
        let radius = rng.random_range(10.0f32..30.0);
        let child_x = x + angle.cos() * radius;
        let child_y = y + angle.sin() * radius;
        if let Some(child) = store.spawn(child_x, child_y, genome) {
            store.generation[child as usize] = generation;
            store.cooldown[child as usize] = FUSION_COOLDOWN;
            delta.births += 1;
            events.push(Event::Birth {
                index: child,
                generation,
            });
        }
    }
}
