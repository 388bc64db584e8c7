use crate::Dataset;

/// Dataset where all items are stored in ram.
#[derive(new, Debug, Clone)]
pub struct InMemDataset<I> {
    items: Vec<I>,
}

impl<I> Dataset<I> for InMemDataset<I>
where
    I: Clone + Send + Sync,
{
    fn get(&self, index: usize) -> Option<I> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

impl<I> InMemDataset<I>
where
    I: Clone + Send + Sync,
{
    /// Copies every item of another dataset into memory.
    pub fn from_dataset(dataset: &impl Dataset<I>) -> Self {
        Self::new(dataset.iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_data;

    #[test]
    pub fn given_in_memory_dataset_when_iterate_should_iterate_through_all_items() {
        let items_original = test_data::string_items();
        let dataset = InMemDataset::new(items_original.clone());

        let items: Vec<String> = dataset.iter().collect();

        assert_eq!(items_original, items);
    }

    #[test]
    pub fn iterating_twice_restarts_from_the_first_item() {
        let dataset = InMemDataset::new(test_data::string_items());

        let first: Vec<String> = dataset.iter().collect();
        let second: Vec<String> = dataset.iter().collect();

        assert_eq!(first, second);
        assert_eq!(dataset.iter().size_hint(), (4, Some(4)));
    }

    #[test]
    pub fn copies_another_dataset() {
        let dataset = InMemDataset::new(vec![1, 2, 3]);

        let copy = InMemDataset::from_dataset(&dataset);

        assert_eq!(copy.len(), 3);
        assert_eq!(copy.get(2), Some(3));
        assert_eq!(copy.get(3), None);
    }
}
