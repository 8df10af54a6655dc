use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;

/// Cells per axis of every scalar field.
pub const FIELD_RESOLUTION: usize = 64;

/// Lattice intervals for the solar value noise.
const SOLAR_LATTICE: usize = 8;
/// Poison hotspot count.
const POISON_HOTSPOTS: usize = 6;
/// Barrier blob count.
const BARRIER_BLOBS: usize = 4;

/// Static environment: solar, poison, and barrier fields over the world
/// square, generated once from the seed. The same coordinate always returns
/// the same sample. Samples outside the world read as zero solar, zero
/// poison, blocked.
pub struct Environment {
    world_size: f32,
    inv_cell: f32,
    solar_base: Vec<f32>,
    poison: Vec<f32>,
    barrier: Vec<bool>,
    solar_constant: f32,
}

impl Environment {
    pub fn new(world_size: f32, seed: u64) -> Self {
        // Salted so the environment draws are independent of the engine rng.
        let mut rng = ChaCha12Rng::seed_from_u64(seed.wrapping_add(0x5eed));
        let solar_base = gen_solar(&mut rng);
        let poison = gen_poison(&mut rng);
        let barrier = gen_barrier(&mut rng);
        Self {
            world_size,
            inv_cell: FIELD_RESOLUTION as f32 / world_size,
            solar_base,
            poison,
            barrier,
            solar_constant: 1.0,
        }
    }

    pub fn set_solar_constant(&mut self, value: f32) {
        self.solar_constant = value;
    }

    pub fn solar_constant(&self) -> f32 {
        self.solar_constant
    }

    fn cell(&self, x: f32, y: f32) -> Option<usize> {
        if !(0.0..=self.world_size).contains(&x) || !(0.0..=self.world_size).contains(&y) {
            return None;
        }
        let cx = ((x * self.inv_cell) as usize).min(FIELD_RESOLUTION - 1);
        let cy = ((y * self.inv_cell) as usize).min(FIELD_RESOLUTION - 1);
        Some(cy * FIELD_RESOLUTION + cx)
    }

    /// Solar intensity at a world coordinate, in `[0, solar_constant]`.
    pub fn solar(&self, x: f32, y: f32) -> f32 {
        match self.cell(x, y) {
            Some(c) => self.solar_base[c] * self.solar_constant,
            None => 0.0,
        }
    }

    /// Poison concentration at a world coordinate, zero outside hotspots.
    pub fn poison(&self, x: f32, y: f32) -> f32 {
        match self.cell(x, y) {
            Some(c) => self.poison[c],
            None => 0.0,
        }
    }

    /// Whether a world coordinate is inside a barrier. Out-of-world counts
    /// as blocked.
    pub fn blocked(&self, x: f32, y: f32) -> bool {
        match self.cell(x, y) {
            Some(c) => self.barrier[c],
            None => true,
        }
    }
}

/// Low-frequency value noise: bilinear interpolation over a coarse random
/// lattice, min-max normalized to [0, 1].
fn gen_solar(rng: &mut ChaCha12Rng) -> Vec<f32> {
    let mut lattice = [[0.0f32; SOLAR_LATTICE + 1]; SOLAR_LATTICE + 1];
    for row in &mut lattice {
        for v in row.iter_mut() {
            *v = rng.random::<f32>();
        }
    }

    let mut field = vec![0.0f32; FIELD_RESOLUTION * FIELD_RESOLUTION];
    let scale = SOLAR_LATTICE as f32 / FIELD_RESOLUTION as f32;
    for cy in 0..FIELD_RESOLUTION {
        for cx in 0..FIELD_RESOLUTION {
            let u = cx as f32 * scale;
            let v = cy as f32 * scale;
            let (i0, fu) = (u as usize, u.fract());
            let (j0, fv) = (v as usize, v.fract());
            let tu = fu * fu * (3.0 - 2.0 * fu);
            let tv = fv * fv * (3.0 - 2.0 * fv);
            let a = lattice[j0][i0] * (1.0 - tu) + lattice[j0][i0 + 1] * tu;
            let b = lattice[j0 + 1][i0] * (1.0 - tu) + lattice[j0 + 1][i0 + 1] * tu;
            field[cy * FIELD_RESOLUTION + cx] = a * (1.0 - tv) + b * tv;
        }
    }

    let (mut lo, mut hi) = (f32::INFINITY, f32::NEG_INFINITY);
    for &v in &field {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    let span = (hi - lo).max(f32::EPSILON);
    for v in &mut field {
        *v = (*v - lo) / span;
    }
    field
}

/// Sparse Gaussian hotspots, clamped to [0, 1], near zero elsewhere.
fn gen_poison(rng: &mut ChaCha12Rng) -> Vec<f32> {
    let mut field = vec![0.0f32; FIELD_RESOLUTION * FIELD_RESOLUTION];
    for _ in 0..POISON_HOTSPOTS {
        let hx = rng.random_range(0.0..FIELD_RESOLUTION as f32);
        let hy = rng.random_range(0.0..FIELD_RESOLUTION as f32);
        let peak = rng.random_range(0.6f32..1.0);
        let sigma = rng.random_range(2.0f32..5.0);
        let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);
        for cy in 0..FIELD_RESOLUTION {
            for cx in 0..FIELD_RESOLUTION {
                let dx = cx as f32 + 0.5 - hx;
                let dy = cy as f32 + 0.5 - hy;
                let contribution = peak * (-(dx * dx + dy * dy) * inv_two_sigma_sq).exp();
                let cell = &mut field[cy * FIELD_RESOLUTION + cx];
                *cell = (*cell + contribution).min(1.0);
            }
        }
    }
    field
}

/// A few circular blocked blobs.
fn gen_barrier(rng: &mut ChaCha12Rng) -> Vec<bool> {
    let mut field = vec![false; FIELD_RESOLUTION * FIELD_RESOLUTION];
    for _ in 0..BARRIER_BLOBS {
        let bx = rng.random_range(0.0..FIELD_RESOLUTION as f32);
        let by = rng.random_range(0.0..FIELD_RESOLUTION as f32);
        let radius = rng.random_range(1.0f32..3.0);
        let r_sq = radius * radius;
        for cy in 0..FIELD_RESOLUTION {
            for cx in 0..FIELD_RESOLUTION {
                let dx = cx as f32 + 0.5 - bx;
                let dy = cy as f32 + 0.5 - by;
                if dx * dx + dy * dy <= r_sq {
                    field[cy * FIELD_RESOLUTION + cx] = true;
                }
            }
        }
    }
    field
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic_for_fixed_seed() {
        let a = Environment::new(1000.0, 42);
        let b = Environment::new(1000.0, 42);
        for &(x, y) in &[(0.0, 0.0), (123.4, 567.8), (999.9, 1.2)] {
            assert_eq!(a.solar(x, y), b.solar(x, y));
            assert_eq!(a.poison(x, y), b.poison(x, y));
            assert_eq!(a.blocked(x, y), b.blocked(x, y));
        }
    }

    #[test]
    fn different_seeds_differ() {
        let a = Environment::new(1000.0, 1);
        let b = Environment::new(1000.0, 2);
        let differs = (0..32).any(|i| {
            let x = i as f32 * 31.25;
            a.solar(x, x) != b.solar(x, x)
        });
        assert!(differs);
    }

    #[test]
    fn samples_stay_in_contract_ranges() {
        let env = Environment::new(500.0, 7);
        for cy in 0..20 {
            for cx in 0..20 {
                let x = cx as f32 * 25.0;
                let y = cy as f32 * 25.0;
                let s = env.solar(x, y);
                assert!((0.0..=1.0).contains(&s));
                assert!(env.poison(x, y) >= 0.0);
            }
        }
    }

    #[test]
    fn solar_constant_scales_samples() {
        let mut env = Environment::new(500.0, 7);
        let base = env.solar(250.0, 250.0);
        env.set_solar_constant(2.0);
        assert!((env.solar(250.0, 250.0) - base * 2.0).abs() < 1e-6);
        env.set_solar_constant(0.0);
        assert_eq!(env.solar(250.0, 250.0), 0.0);
    }

    #[test]
    fn out_of_world_reads_as_dead_blocked_space() {
        let env = Environment::new(500.0, 7);
        assert_eq!(env.solar(-1.0, 10.0), 0.0);
        assert_eq!(env.poison(10.0, 501.0), 0.0);
        assert!(env.blocked(-1.0, 10.0));
        assert!(env.blocked(10.0, 9999.0));
    }
}
