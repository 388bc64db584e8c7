use core::fmt;

use serde::{Deserialize, Serialize};

/// The highest rank a tensor can have in this engine (batches of images).
pub const MAX_RANK: usize = 4;

/// Shape of a tensor.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape {
    /// The size of each dimension.
    pub dims: Vec<usize>,
}

impl Shape {
    /// Creates a new shape.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        Self { dims: dims.into() }
    }

    /// Returns the number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the total number of elements of a tensor having this shape.
    ///
    /// A rank 0 shape describes a scalar and holds one element.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the shape with a leading batch dimension of the given size.
    pub fn batched(&self, batch_size: usize) -> Self {
        let mut dims = Vec::with_capacity(self.rank() + 1);
        dims.push(batch_size);
        dims.extend_from_slice(&self.dims);

        Self { dims }
    }

    /// Returns the shape without its leading dimension.
    pub fn unbatched(&self) -> Self {
        Self::new(self.dims.get(1..).unwrap_or_default())
    }

    /// Returns the size of the leading dimension, 1 for scalars.
    pub fn batch_size(&self) -> usize {
        self.dims.first().copied().unwrap_or(1)
    }
}

impl<const D: usize> From<[usize; D]> for Shape {
    fn from(dims: [usize; D]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{:?}", self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_elements() {
        let shape = Shape::new([2, 3, 4, 5]);
        assert_eq!(120, shape.num_elements());
        assert_eq!(1, Shape::new([]).num_elements());
    }

    #[test]
    fn batch_dimension_is_added_and_removed() {
        let shape = Shape::new([28, 28, 1]);
        let batched = shape.batched(64);

        assert_eq!(batched.dims, vec![64, 28, 28, 1]);
        assert_eq!(batched.batch_size(), 64);
        assert_eq!(batched.unbatched(), shape);
    }

    #[test]
    fn display_lists_the_dimensions() {
        assert_eq!(Shape::new([1, 10]).to_string(), "[1, 10]");
    }
}
