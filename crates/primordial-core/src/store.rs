use crate::genome::{Archetype, Genome};
use rand::Rng;

/// Per-cell flag bits. The render collaborator reads these for transient
/// effects; the engine clears them at the top of each cell's update.
pub mod flags {
    /// Set when the cell reproduced this tick (birth glow).
    pub const RECENT_BIRTH: u8 = 1 << 0;
}

/// Fixed-capacity Structure-of-Arrays store for all cell fields.
///
/// Slot indices are stable for the lifetime of a cell; freed indices are
/// recycled through a free-list. Active and free slots partition
/// `[0, capacity)` at all times. Removal zeroes the slot so collaborators
/// reading the raw buffers between ticks never see stale cell state.
pub struct CellStore {
    pub(crate) capacity: usize,
    pub(crate) world_size: f32,
    pub(crate) friction: f32,
    pub(crate) pos_x: Vec<f32>,
    pub(crate) pos_y: Vec<f32>,
    pub(crate) vel_x: Vec<f32>,
    pub(crate) vel_y: Vec<f32>,
    pub(crate) energy: Vec<f32>,
    pub(crate) mass: Vec<f32>,
    pub(crate) cooldown: Vec<f32>,
    pub(crate) genome: Vec<Genome>,
    pub(crate) archetype: Vec<Archetype>,
    pub(crate) species: Vec<i32>,
    pub(crate) generation: Vec<u32>,
    pub(crate) alliance: Vec<i32>,
    pub(crate) flags: Vec<u8>,
    pub(crate) active: Vec<bool>,
    free: Vec<u32>,
    pub(crate) active_count: usize,
}

impl CellStore {
    /// Energy granted to a fresh spawn.
    pub const SPAWN_ENERGY: f32 = 100.0;

    /// Half-width of the square a child spawns in around its parent.
    const BIRTH_SCATTER: f32 = 5.0;

    pub fn new(capacity: usize, world_size: f32, friction: f32) -> Self {
        Self {
            capacity,
            world_size,
            friction,
            pos_x: vec![0.0; capacity],
            pos_y: vec![0.0; capacity],
            vel_x: vec![0.0; capacity],
            vel_y: vec![0.0; capacity],
            energy: vec![0.0; capacity],
            mass: vec![0.0; capacity],
            cooldown: vec![0.0; capacity],
            genome: vec![Genome::ZERO; capacity],
            archetype: vec![Archetype::Average; capacity],
            species: vec![0; capacity],
            generation: vec![0; capacity],
            alliance: vec![0; capacity],
            flags: vec![0; capacity],
            active: vec![false; capacity],
            // Reversed so the lowest index is handed out first.
            free: (0..capacity as u32).rev().collect(),
            active_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn is_live(&self, index: u32) -> bool {
        (index as usize) < self.capacity && self.active[index as usize]
    }

    pub(crate) fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    fn wrap(&self, v: f32) -> f32 {
        if (0.0..=self.world_size).contains(&v) {
            v
        } else {
            v.rem_euclid(self.world_size)
        }
    }

    /// Allocate a slot for a new cell. `None` when the store is full or the
    /// genome is rejected. Out-of-world positions wrap.
    pub fn spawn(&mut self, x: f32, y: f32, genome: Genome) -> Option<u32> {
        let genome = genome.sanitized()?;
        let index = self.free.pop()?;
        let i = index as usize;
        self.pos_x[i] = self.wrap(x);
        self.pos_y[i] = self.wrap(y);
        self.vel_x[i] = 0.0;
        self.vel_y[i] = 0.0;
        self.energy[i] = Self::SPAWN_ENERGY;
        self.mass[i] = 1.0;
        self.cooldown[i] = 0.0;
        self.genome[i] = genome;
        self.archetype[i] = genome.archetype();
        self.species[i] = -1;
        self.generation[i] = 1;
        self.alliance[i] = -1;
        self.flags[i] = 0;
        self.active[i] = true;
        self.active_count += 1;
        Some(index)
    }

    /// Asexual reproduction: mutated copy of the parent genome, placed in a
    /// small square around the parent, one generation deeper.
    pub fn reproduce<R: Rng + ?Sized>(
        &mut self,
        parent: u32,
        mutation_rate: f32,
        rng: &mut R,
    ) -> Option<u32> {
        if !self.is_live(parent) {
            return None;
        }
        let p = parent as usize;
        let mut child_genome = self.genome[p];
        child_genome.mutate(rng, mutation_rate);
        let x = self.pos_x[p] + rng.random_range(-Self::BIRTH_SCATTER..Self::BIRTH_SCATTER);
        let y = self.pos_y[p] + rng.random_range(-Self::BIRTH_SCATTER..Self::BIRTH_SCATTER);
        let generation = self.generation[p].saturating_add(1);
        let child = self.spawn(x, y, child_genome)?;
        self.generation[child as usize] = generation;
        Some(child)
    }

    /// Free a slot. Idempotent; invalid or inactive indices are a no-op.
    /// The slot's buffers read zero until the index is reused.
    pub fn remove(&mut self, index: u32) {
        let i = index as usize;
        if i >= self.capacity || !self.active[i] {
            return;
        }
        self.pos_x[i] = 0.0;
        self.pos_y[i] = 0.0;
        self.vel_x[i] = 0.0;
        self.vel_y[i] = 0.0;
        self.energy[i] = 0.0;
        self.mass[i] = 0.0;
        self.cooldown[i] = 0.0;
        self.genome[i] = Genome::ZERO;
        self.archetype[i] = Archetype::Average;
        self.species[i] = 0;
        self.generation[i] = 0;
        self.alliance[i] = 0;
        self.flags[i] = 0;
        self.active[i] = false;
        self.active_count -= 1;
        self.free.push(index);
    }

    /// Apply friction and advance positions. Friction is multiplicative per
    /// call, not scaled by dt; scaling it by dt as well would double-damp.
    pub fn integrate(&mut self, dt: f32) {
        for i in 0..self.capacity {
            if !self.active[i] {
                continue;
            }
            self.vel_x[i] *= self.friction;
            self.vel_y[i] *= self.friction;
            self.pos_x[i] += self.vel_x[i] * dt;
            self.pos_y[i] += self.vel_y[i] * dt;
        }
    }

    // Read accessors over the live buffers. Collaborators must check
    // `is_active` before trusting a slot and must tolerate recycling
    // between ticks.

    pub fn positions_x(&self) -> &[f32] {
        &self.pos_x
    }

    pub fn positions_y(&self) -> &[f32] {
        &self.pos_y
    }

    pub fn velocities_x(&self) -> &[f32] {
        &self.vel_x
    }

    pub fn velocities_y(&self) -> &[f32] {
        &self.vel_y
    }

    pub fn energies(&self) -> &[f32] {
        &self.energy
    }

    pub fn masses(&self) -> &[f32] {
        &self.mass
    }

    pub fn cooldowns(&self) -> &[f32] {
        &self.cooldown
    }

    pub fn genomes(&self) -> &[Genome] {
        &self.genome
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetype
    }

    pub fn species_ids(&self) -> &[i32] {
        &self.species
    }

    pub fn generations(&self) -> &[u32] {
        &self.generation
    }

    pub fn alliance_ids(&self) -> &[i32] {
        &self.alliance
    }

    pub fn flag_bits(&self) -> &[u8] {
        &self.flags
    }

    pub fn is_active(&self) -> &[bool] {
        &self.active
    }
}
