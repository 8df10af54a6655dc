use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Population by species at one identification pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PopulationSample {
    pub tick: u64,
    /// `(species_id, population)` pairs, in tracker order.
    pub counts: Vec<(u32, u32)>,
}

impl PopulationSample {
    pub fn total(&self) -> u32 {
        self.counts.iter().map(|&(_, n)| n).sum()
    }
}

/// Bounded ring of population snapshots, one per species pass. The oldest
/// sample is evicted once the ring is full.
pub struct PopulationHistory {
    samples: VecDeque<PopulationSample>,
    capacity: usize,
}

impl PopulationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: PopulationSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&PopulationSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PopulationSample> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tick: u64) -> PopulationSample {
        PopulationSample {
            tick,
            counts: vec![(0, 3), (1, 2)],
        }
    }

    #[test]
    fn ring_evicts_oldest_at_capacity() {
        let mut history = PopulationHistory::new(3);
        for t in 0..5 {
            history.push(sample(t));
        }
        assert_eq!(history.len(), 3);
        let ticks: Vec<u64> = history.iter().map(|s| s.tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
        assert_eq!(history.latest().unwrap().tick, 4);
    }

    #[test]
    fn sample_total_sums_species() {
        assert_eq!(sample(0).total(), 5);
    }
}
