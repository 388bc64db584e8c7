use digitnet_dataset::vision::{DigitItem, Sample, SampleError};
use digitnet_dataset::Dataset;
use digitnet_tensor::{Arena, Shape, Tensor, TensorCollection};

use crate::TrainingError;

/// Images and one-hot targets of a batch.
#[derive(Debug)]
pub struct SampleBatch {
    /// Images of shape `[batch_size, height, width, channels]`.
    pub images: Tensor,
    /// One-hot targets of shape `[batch_size, num_classes]`.
    pub targets: Tensor,
    /// Number of items left out of the batch because they were invalid.
    pub skipped: usize,
}

impl SampleBatch {
    /// Number of samples in the batch.
    pub fn batch_size(&self) -> usize {
        self.images.shape().batch_size()
    }
}

impl TensorCollection for SampleBatch {
    fn tensor_count(&self) -> usize {
        2
    }
}

/// Turns items into [batches](SampleBatch), skipping the invalid ones.
#[derive(new, Debug, Clone)]
pub struct SampleBatcher {
    image_shape: Shape,
    num_classes: usize,
}

impl SampleBatcher {
    /// Shape every image must have.
    pub fn image_shape(&self) -> &Shape {
        &self.image_shape
    }

    /// Converts and stacks items.
    ///
    /// Returns `None` when every item was skipped. Only the batch tensors are left in the arena.
    pub fn batch(
        &self,
        arena: &Arena,
        items: &[DigitItem],
    ) -> Result<Option<SampleBatch>, TrainingError> {
        arena.run_scoped(|| {
            let mut samples = Vec::with_capacity(items.len());
            let mut skipped = 0;

            for item in items {
                match Sample::from_item(arena, item, &self.image_shape, self.num_classes) {
                    Ok(sample) => samples.push(sample),
                    Err(err) if err.is_skippable() => {
                        log::warn!("Skipping sample with label {}: {err}", item.label);
                        skipped += 1;
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            let batch = self.batch_samples(arena, samples)?;

            Ok(batch.map(|batch| SampleBatch {
                skipped: batch.skipped + skipped,
                ..batch
            }))
        })
    }

    /// Validates and stacks samples built elsewhere.
    ///
    /// Returns `None` when every sample was skipped.
    pub fn batch_samples(
        &self,
        arena: &Arena,
        samples: Vec<Sample>,
    ) -> Result<Option<SampleBatch>, TrainingError> {
        let mut skipped = 0;
        let mut valid = Vec::with_capacity(samples.len());

        for sample in samples {
            match sample.validate(&self.image_shape, self.num_classes) {
                Ok(()) => valid.push(sample),
                Err(SampleError::Tensor(err)) => return Err(err.into()),
                Err(err) => {
                    log::warn!("Skipping sample: {err}");
                    skipped += 1;
                }
            }
        }

        if valid.is_empty() {
            return Ok(None);
        }

        let images = valid.iter().map(|sample| &sample.image).collect::<Vec<_>>();
        let targets = valid.iter().map(|sample| &sample.label).collect::<Vec<_>>();

        Ok(Some(SampleBatch {
            images: Tensor::stack(arena, &images)?,
            targets: Tensor::stack(arena, &targets)?,
            skipped,
        }))
    }
}

/// Iterator over consecutive chunks of a dataset.
///
/// The last chunk holds the remaining items and may be smaller than the batch size.
pub struct BatchIterator<'a, D> {
    dataset: &'a D,
    batch_size: usize,
    current: usize,
}

impl<'a, D> BatchIterator<'a, D>
where
    D: Dataset<DigitItem>,
{
    /// Creates the iterator. A batch size of zero is treated as one.
    pub fn new(dataset: &'a D, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            current: 0,
        }
    }

    /// Number of items already yielded.
    pub fn items_processed(&self) -> usize {
        self.current.min(self.dataset.len())
    }
}

impl<D> Iterator for BatchIterator<'_, D>
where
    D: Dataset<DigitItem>,
{
    type Item = Vec<DigitItem>;

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.dataset.len();
        if self.current >= len {
            return None;
        }

        let end = (self.current + self.batch_size).min(len);
        let items = (self.current..end)
            .filter_map(|index| self.dataset.get(index))
            .collect();
        self.current = end;

        Some(items)
    }
}
