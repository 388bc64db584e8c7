use std::marker::PhantomData;

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::Dataset;

/// Shuffled a dataset.
///
/// The permutation is drawn once, at creation, from the given seed.
pub struct ShuffledDataset<D, I> {
    dataset: D,
    indices: Vec<usize>,
    input: PhantomData<I>,
}

impl<D, I> ShuffledDataset<D, I>
where
    D: Dataset<I>,
{
    /// Creates a new shuffled dataset.
    pub fn new(dataset: D, rng: &mut StdRng) -> Self {
        let mut indices = (0..dataset.len()).collect::<Vec<_>>();
        indices.shuffle(rng);

        Self {
            dataset,
            indices,
            input: PhantomData,
        }
    }

    /// Creates a new shuffled dataset with a fixed seed.
    pub fn with_seed(dataset: D, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new(dataset, &mut rng)
    }

    /// Index in the wrapped dataset of each item.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl<D, I> Dataset<I> for ShuffledDataset<D, I>
where
    D: Dataset<I>,
    I: Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        let index = *self.indices.get(index)?;
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}
