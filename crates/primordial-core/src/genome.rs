use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of genes per cell.
pub const GENE_COUNT: usize = 8;

/// Gene indices. Order is fixed; buffers and histograms index by these.
pub const SPD: usize = 0;
pub const AGG: usize = 1;
pub const PHO: usize = 2;
pub const SIZ: usize = 3;
pub const DEF: usize = 4;
pub const VIS: usize = 5;
pub const MUT: usize = 6;
pub const LIF: usize = 7;

/// Behavioral archetype, derived from the genome at spawn and never mutated
/// afterwards. Behavior code inspects the tag directly; there is no
/// per-archetype dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Archetype {
    #[default]
    Average = 0,
    Predator = 1,
    Producer = 2,
    Tank = 3,
    Speedster = 4,
}

/// Number of archetype variants, for histogram buckets.
pub const ARCHETYPE_COUNT: usize = 5;

/// A cell genome: eight traits, each held in [0, 1] at all times.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Genome(pub [f32; GENE_COUNT]);

impl Genome {
    pub const ZERO: Genome = Genome([0.0; GENE_COUNT]);

    /// Minimum dominant trait required for a non-Average archetype.
    const ARCHETYPE_THRESHOLD: f32 = 0.7;

    pub fn genes(&self) -> &[f32; GENE_COUNT] {
        &self.0
    }

    pub fn spd(&self) -> f32 {
        self.0[SPD]
    }

    pub fn agg(&self) -> f32 {
        self.0[AGG]
    }

    pub fn pho(&self) -> f32 {
        self.0[PHO]
    }

    pub fn siz(&self) -> f32 {
        self.0[SIZ]
    }

    pub fn def(&self) -> f32 {
        self.0[DEF]
    }

    pub fn vis(&self) -> f32 {
        self.0[VIS]
    }

    pub fn mut_factor(&self) -> f32 {
        self.0[MUT]
    }

    pub fn lif(&self) -> f32 {
        self.0[LIF]
    }

    /// Normalize a host-supplied genome: NaN becomes 0, everything else is
    /// clamped into [0, 1]. An all-zero result (which also covers all-NaN
    /// input) is rejected; such a cell could never act.
    pub fn sanitized(&self) -> Option<Genome> {
        let mut out = [0.0f32; GENE_COUNT];
        for (dst, &g) in out.iter_mut().zip(self.0.iter()) {
            *dst = if g.is_nan() { 0.0 } else { g.clamp(0.0, 1.0) };
        }
        if out.iter().all(|&g| g == 0.0) {
            return None;
        }
        Some(Genome(out))
    }

    /// Mutate every gene by `U(-1, 1) * MUT * 0.1 * rate`, clamped to [0, 1].
    /// The MUT gene is read once before the loop so it scales its own
    /// mutation with the parent's value.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R, rate: f32) {
        let scale = self.0[MUT] * 0.1 * rate;
        for g in &mut self.0 {
            let delta = rng.random_range(-1.0f32..1.0) * scale;
            *g = (*g + delta).clamp(0.0, 1.0);
        }
    }

    /// Normalized Euclidean distance, in [0, 1] for in-range genomes.
    pub fn distance(&self, other: &Genome) -> f32 {
        let sum_sq: f32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        sum_sq.sqrt() / (GENE_COUNT as f32).sqrt()
    }

    /// Index of the largest gene; the first wins ties.
    pub fn dominant(&self) -> usize {
        let mut best = 0;
        for (i, &g) in self.0.iter().enumerate().skip(1) {
            if g > self.0[best] {
                best = i;
            }
        }
        best
    }

    /// Derive the archetype: the maximum of (SPD, AGG, PHO, DEF) decides,
    /// provided it reaches the threshold; ties resolve in that order.
    pub fn archetype(&self) -> Archetype {
        let candidates = [
            (self.spd(), Archetype::Speedster),
            (self.agg(), Archetype::Predator),
            (self.pho(), Archetype::Producer),
            (self.def(), Archetype::Tank),
        ];
        let (mut best_value, mut best_tag) = candidates[0];
        for &(value, tag) in &candidates[1..] {
            if value > best_value {
                best_value = value;
                best_tag = tag;
            }
        }
        if best_value >= Self::ARCHETYPE_THRESHOLD {
            best_tag
        } else {
            Archetype::Average
        }
    }
}
