use rand::seq::SliceRandom;
use rand::Rng;

/// Draws `num_samp` distinct row indices from `[0, population)` per call.
///
/// Every call starts from the identity ordering and shuffles it, so each
/// draw is a fresh uniform permutation rather than a pass over a fixed
/// partition. The index buffer is reused across calls.
#[derive(Debug, Clone)]
pub struct RowSampler {
    perm: Vec<usize>,
    num_samp: usize,
}

impl RowSampler {
    /// Panics if `num_samp > population`; callers validate through
    /// [`Params::validate`](crate::Params::validate) first.
    pub fn new(population: usize, num_samp: usize) -> Self {
        assert!(
            num_samp <= population,
            "num_samp {num_samp} exceeds population {population}"
        );
        Self {
            perm: (0..population).collect(),
            num_samp,
        }
    }

    pub fn population(&self) -> usize {
        self.perm.len()
    }

    pub fn num_samp(&self) -> usize {
        self.num_samp
    }

    /// Returns the first `num_samp` entries of a fresh permutation.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R) -> &[usize] {
        for (i, slot) in self.perm.iter_mut().enumerate() {
            *slot = i;
        }
        self.perm.shuffle(rng);
        &self.perm[..self.num_samp]
    }
}

/// One-shot form of [`RowSampler::sample`].
pub fn sample<R: Rng + ?Sized>(n: usize, num_samp: usize, rng: &mut R) -> Vec<usize> {
    RowSampler::new(n, num_samp).sample(rng).to_vec()
}
