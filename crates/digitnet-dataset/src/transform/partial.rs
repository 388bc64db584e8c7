use std::marker::PhantomData;

use crate::Dataset;

/// Only use a fraction of an existing dataset lazily.
///
/// The range is clamped to the wrapped dataset: asking for more items than it holds yields the
/// available ones, never an error.
#[derive(Clone)]
pub struct PartialDataset<D, I> {
    dataset: D,
    start_index: usize,
    end_index: usize,
    input: PhantomData<I>,
}

impl<D, I> PartialDataset<D, I>
where
    D: Dataset<I>,
{
    /// Create a new partial dataset over `[start_index, end_index)`.
    pub fn new(dataset: D, start_index: usize, end_index: usize) -> Self {
        let len = dataset.len();
        let end_index = end_index.min(len);
        let start_index = start_index.min(end_index);

        Self {
            dataset,
            start_index,
            end_index,
            input: PhantomData,
        }
    }

    /// The first `num` items of the dataset.
    pub fn take(dataset: D, num: usize) -> Self {
        Self::new(dataset, 0, num)
    }

    /// Every item of the dataset after the first `num`.
    pub fn skip(dataset: D, num: usize) -> Self {
        let len = dataset.len();
        Self::new(dataset, num, len)
    }
}

impl<D, I> Dataset<I> for PartialDataset<D, I>
where
    D: Dataset<I>,
    I: Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        let index = index + self.start_index;
        if index < self.start_index || index >= self.end_index {
            return None;
        }
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.end_index - self.start_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemDataset;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_start_from_beginning() {
        let dataset_original = Arc::new(InMemDataset::new((0..1000).collect::<Vec<usize>>()));
        let dataset_partial = PartialDataset::new(dataset_original.clone(), 0, 10);

        let items_original = dataset_original.iter().take(10).collect::<Vec<_>>();
        let items_partial = dataset_partial.iter().collect::<Vec<_>>();

        assert_eq!(dataset_partial.len(), 10);
        assert_eq!(items_original, items_partial);
    }

    #[test]
    fn test_start_inside() {
        let dataset_original = Arc::new(InMemDataset::new((0..1000).collect::<Vec<usize>>()));
        let dataset_partial = PartialDataset::new(dataset_original.clone(), 10, 20);

        let items_partial = dataset_partial.iter().collect::<Vec<_>>();

        assert_eq!(dataset_partial.len(), 10);
        assert_eq!(items_partial, (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn take_and_skip_are_disjoint_and_cover_the_dataset() {
        let dataset = Arc::new(InMemDataset::new((0..100).collect::<Vec<usize>>()));
        let train = PartialDataset::take(dataset.clone(), 80);
        let valid = PartialDataset::skip(dataset.clone(), 80);

        let train: HashSet<_> = train.iter().collect();
        let valid: HashSet<_> = valid.iter().collect();

        assert_eq!(train.len(), 80);
        assert_eq!(valid.len(), 20);
        assert!(train.is_disjoint(&valid));
        assert_eq!(train.union(&valid).count(), 100);
    }

    #[test]
    fn over_long_ranges_yield_fewer_items() {
        let dataset = Arc::new(InMemDataset::new((0..10).collect::<Vec<usize>>()));

        assert_eq!(PartialDataset::take(dataset.clone(), 25).iter().count(), 10);
        assert_eq!(PartialDataset::skip(dataset.clone(), 25).iter().count(), 0);
        assert!(PartialDataset::skip(dataset, 25).is_empty());
    }
}
