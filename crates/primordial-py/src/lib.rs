use primordial_core::{Engine, EngineConfig, Genome, Tuning, GENE_COUNT};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

/// Thin Python surface over the simulation core: construct, seed, tick,
/// tune, and read telemetry or events as JSON payloads.
#[pyclass]
struct Simulation {
    engine: Engine,
}

#[pymethods]
impl Simulation {
    #[new]
    #[pyo3(signature = (world_size, capacity, seed = 42))]
    fn new(world_size: f32, capacity: usize, seed: u64) -> PyResult<Self> {
        let config = EngineConfig {
            world_size,
            capacity,
            seed,
            ..EngineConfig::default()
        };
        Engine::try_new(config)
            .map(|engine| Self { engine })
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Seed a cell; returns its index, or None when the store is full or
    /// the genome is rejected.
    fn spawn(&mut self, x: f32, y: f32, genome: Vec<f32>) -> PyResult<Option<u32>> {
        if genome.len() != GENE_COUNT {
            return Err(PyValueError::new_err(format!(
                "genome must have {GENE_COUNT} entries"
            )));
        }
        let mut genes = [0.0f32; GENE_COUNT];
        genes.copy_from_slice(&genome);
        Ok(self.engine.spawn(x, y, Genome(genes)))
    }

    fn tick(&mut self, dt: f32) {
        self.engine.tick(dt);
    }

    #[pyo3(signature = (mutation_rate = None, food_abundance = None, friction = None, solar_constant = None))]
    fn configure(
        &mut self,
        mutation_rate: Option<f32>,
        food_abundance: Option<f32>,
        friction: Option<f32>,
        solar_constant: Option<f32>,
    ) {
        self.engine.configure(Tuning {
            mutation_rate,
            food_abundance,
            friction,
            solar_constant,
        });
    }

    fn active_count(&self) -> usize {
        self.engine.active_count()
    }

    fn tick_index(&self) -> u64 {
        self.engine.tick_index()
    }

    fn telemetry_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.engine.telemetry())
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn drain_events_json(&mut self) -> PyResult<String> {
        serde_json::to_string(&self.engine.drain_events())
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    #[pyo3(signature = (x, y, follow = None))]
    fn nearest_json(&self, x: f32, y: f32, follow: Option<u32>) -> PyResult<Option<String>> {
        self.engine
            .nearest(x, y, follow)
            .map(|snapshot| {
                serde_json::to_string(&snapshot).map_err(|e| PyValueError::new_err(e.to_string()))
            })
            .transpose()
    }
}

#[pyfunction]
fn version() -> &'static str {
    "0.1.0"
}

#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Simulation>()?;
    m.add_function(wrap_pyfunction!(version, m)?)?;
    Ok(())
}
