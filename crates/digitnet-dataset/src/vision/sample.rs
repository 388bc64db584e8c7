use digitnet_tensor::{Arena, Shape, Tensor, TensorCollection, TensorError};
use thiserror::Error;

use super::DigitItem;

/// Errors raised while turning an item into a [sample](Sample).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    /// The image or label does not have the shape the model is trained on.
    #[error("Invalid sample shape: expected {expected}, got {actual}")]
    InvalidSampleShape {
        /// The expected shape.
        expected: Shape,
        /// The shape found.
        actual: Shape,
    },

    /// The label is not a valid class.
    #[error("Invalid label: {reason}")]
    InvalidLabel {
        /// What is wrong with the label.
        reason: String,
    },

    /// Tensor allocation failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

impl SampleError {
    /// Whether the sample can be skipped and training continue.
    ///
    /// Allocation failures are not skippable.
    pub fn is_skippable(&self) -> bool {
        !matches!(self, SampleError::Tensor(_))
    }
}

/// An image and its one-hot label.
#[derive(new, Debug)]
pub struct Sample {
    /// Image of shape `[height, width, channels]`.
    pub image: Tensor,
    /// One-hot label of shape `[num_classes]`.
    pub label: Tensor,
}

impl Sample {
    /// Allocates the tensors of an item.
    ///
    /// The item is checked against `image_shape` and `num_classes` before anything is allocated.
    pub fn from_item(
        arena: &Arena,
        item: &DigitItem,
        image_shape: &Shape,
        num_classes: usize,
    ) -> Result<Self, SampleError> {
        let shape = Shape::from(item.shape);
        if &shape != image_shape {
            return Err(SampleError::InvalidSampleShape {
                expected: image_shape.clone(),
                actual: shape,
            });
        }

        if item.image.len() != shape.num_elements() {
            return Err(SampleError::InvalidSampleShape {
                expected: image_shape.clone(),
                actual: Shape::new([item.image.len()]),
            });
        }

        if item.label >= num_classes {
            return Err(SampleError::InvalidLabel {
                reason: format!("class {} with {num_classes} classes", item.label),
            });
        }

        let image = Tensor::from_floats(arena, shape, &item.image)?;
        let label = Tensor::one_hot(arena, item.label, num_classes)?;

        Ok(Self::new(image, label))
    }

    /// Checks the shapes of the sample and that its label is one-hot.
    pub fn validate(&self, image_shape: &Shape, num_classes: usize) -> Result<(), SampleError> {
        if self.image.shape() != image_shape {
            return Err(SampleError::InvalidSampleShape {
                expected: image_shape.clone(),
                actual: self.image.shape().clone(),
            });
        }

        let label_shape = Shape::new([num_classes]);
        if self.label.shape() != &label_shape {
            return Err(SampleError::InvalidSampleShape {
                expected: label_shape,
                actual: self.label.shape().clone(),
            });
        }

        let ones = self.label.as_slice().iter().filter(|v| **v == 1.0).count();
        let zeros = self.label.as_slice().iter().filter(|v| **v == 0.0).count();
        if ones != 1 || ones + zeros != num_classes {
            return Err(SampleError::InvalidLabel {
                reason: format!("{:?} is not one-hot", self.label.as_slice()),
            });
        }

        Ok(())
    }

    /// The class the label points to.
    pub fn class(&self) -> Option<usize> {
        self.label.as_slice().iter().position(|v| *v == 1.0)
    }
}

impl TensorCollection for Sample {
    fn tensor_count(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_shape() -> Shape {
        Shape::new([28, 28, 1])
    }

    #[test]
    fn item_becomes_image_and_one_hot_label() {
        let arena = Arena::new();
        let item = DigitItem::new(vec![0.5; 28 * 28], [28, 28, 1], 3);

        let sample = Sample::from_item(&arena, &item, &image_shape(), 10).unwrap();

        assert_eq!(sample.image.dims(), &[28, 28, 1]);
        assert_eq!(sample.class(), Some(3));
        assert!(sample.validate(&image_shape(), 10).is_ok());
        assert_eq!(arena.live_tensors(), 2);
    }

    #[test]
    fn wrong_image_shape_is_refused_before_allocating() {
        let arena = Arena::new();
        let item = DigitItem::new(vec![0.0; 32 * 32], [32, 32, 1], 1);

        let err = Sample::from_item(&arena, &item, &image_shape(), 10).unwrap_err();

        assert!(matches!(err, SampleError::InvalidSampleShape { .. }));
        assert!(err.is_skippable());
        assert_eq!(arena.live_tensors(), 0);
    }

    #[test]
    fn truncated_image_is_refused() {
        let arena = Arena::new();
        let item = DigitItem::new(vec![0.0; 10], [28, 28, 1], 1);

        let err = Sample::from_item(&arena, &item, &image_shape(), 10).unwrap_err();

        assert_eq!(
            err,
            SampleError::InvalidSampleShape {
                expected: image_shape(),
                actual: Shape::new([10]),
            }
        );
    }

    #[test]
    fn label_out_of_range_is_refused() {
        let arena = Arena::new();
        let item = DigitItem::new(vec![0.0; 28 * 28], [28, 28, 1], 10);

        let err = Sample::from_item(&arena, &item, &image_shape(), 10).unwrap_err();

        assert!(matches!(err, SampleError::InvalidLabel { .. }));
    }

    #[test]
    fn label_must_be_one_hot() {
        let arena = Arena::new();
        let image = Tensor::zeros(&arena, [28, 28, 1]).unwrap();
        let label = Tensor::full(&arena, [10], 0.1).unwrap();

        let err = Sample::new(image, label)
            .validate(&image_shape(), 10)
            .unwrap_err();

        assert!(matches!(err, SampleError::InvalidLabel { .. }));
    }

    #[test]
    fn label_length_is_checked() {
        let arena = Arena::new();
        let image = Tensor::zeros(&arena, [28, 28, 1]).unwrap();
        let label = Tensor::one_hot(&arena, 0, 5).unwrap();

        let err = Sample::new(image, label)
            .validate(&image_shape(), 10)
            .unwrap_err();

        assert_eq!(
            err,
            SampleError::InvalidSampleShape {
                expected: Shape::new([10]),
                actual: Shape::new([5]),
            }
        );
    }
}
