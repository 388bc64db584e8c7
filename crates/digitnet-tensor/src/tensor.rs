use core::fmt;

use rand::Rng;

use crate::arena::Allocation;
use crate::{Arena, Distribution, Result, Shape, TensorError, MAX_RANK};

/// A fixed-shape buffer of 32-bit floats allocated from an [arena](Arena).
///
/// Tensors are never mutated once created: every operation allocates its output from the arena
/// of its (left) operand. A tensor has a single owner and is not `Clone`; use
/// [try_clone](Tensor::try_clone) to copy the buffer into a new allocation.
pub struct Tensor {
    data: Vec<f32>,
    shape: Shape,
    allocation: Allocation,
}

impl Tensor {
    /// Creates a tensor from its elements in row-major order.
    pub fn from_vec<S: Into<Shape>>(arena: &Arena, shape: S, data: Vec<f32>) -> Result<Self> {
        let shape = shape.into();
        let expected = shape.num_elements();

        if shape.rank() > MAX_RANK {
            return Err(TensorError::InvalidRank {
                op: "from_vec",
                expected: MAX_RANK,
                actual: shape,
            });
        }

        if data.len() != expected {
            return Err(TensorError::DataLength {
                shape,
                expected,
                actual: data.len(),
            });
        }

        let allocation = arena.reserve(data.len() * core::mem::size_of::<f32>())?;

        Ok(Self {
            data,
            shape,
            allocation,
        })
    }

    /// Creates a tensor from a slice of elements.
    pub fn from_floats<S: Into<Shape>>(arena: &Arena, shape: S, data: &[f32]) -> Result<Self> {
        Self::from_vec(arena, shape, data.to_vec())
    }

    /// Creates a tensor filled with `value`.
    pub fn full<S: Into<Shape>>(arena: &Arena, shape: S, value: f32) -> Result<Self> {
        let shape = shape.into();
        let data = vec![value; shape.num_elements()];

        Self::from_vec(arena, shape, data)
    }

    /// Creates a tensor filled with zeros.
    pub fn zeros<S: Into<Shape>>(arena: &Arena, shape: S) -> Result<Self> {
        Self::full(arena, shape, 0.0)
    }

    /// Creates a tensor filled with ones.
    pub fn ones<S: Into<Shape>>(arena: &Arena, shape: S) -> Result<Self> {
        Self::full(arena, shape, 1.0)
    }

    /// Creates a tensor whose elements are computed from their flat index.
    pub fn from_fn<S, F>(arena: &Arena, shape: S, func: F) -> Result<Self>
    where
        S: Into<Shape>,
        F: FnMut(usize) -> f32,
    {
        let shape = shape.into();
        let data = (0..shape.num_elements()).map(func).collect();

        Self::from_vec(arena, shape, data)
    }

    /// Creates a tensor with values sampled from the given distribution.
    pub fn random<S: Into<Shape>, R: Rng>(
        arena: &Arena,
        shape: S,
        distribution: Distribution,
        rng: &mut R,
    ) -> Result<Self> {
        let shape = shape.into();
        let mut sampler = distribution.sampler(rng)?;
        let data = (0..shape.num_elements()).map(|_| sampler.sample()).collect();

        Self::from_vec(arena, shape, data)
    }

    /// Creates a one-hot vector of length `num_classes` with a 1 at `index`.
    pub fn one_hot(arena: &Arena, index: usize, num_classes: usize) -> Result<Self> {
        if index >= num_classes {
            return Err(TensorError::InvalidArgument {
                op: "one_hot",
                reason: format!("index {index} is out of range for {num_classes} classes"),
            });
        }

        Self::from_fn(arena, [num_classes], |i| if i == index { 1.0 } else { 0.0 })
    }

    /// Stacks tensors of the same shape along a new leading dimension.
    pub fn stack(arena: &Arena, tensors: &[&Tensor]) -> Result<Self> {
        let first = tensors.first().ok_or_else(|| TensorError::InvalidArgument {
            op: "stack",
            reason: "no tensor to stack".to_string(),
        })?;

        let mut data = Vec::with_capacity(first.num_elements() * tensors.len());
        for tensor in tensors {
            if tensor.shape != first.shape {
                return Err(TensorError::IncompatibleShapes {
                    op: "stack",
                    lhs: first.shape.clone(),
                    rhs: tensor.shape.clone(),
                });
            }
            data.extend_from_slice(&tensor.data);
        }

        Self::from_vec(arena, first.shape.batched(tensors.len()), data)
    }

    /// The shape of the tensor.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The size of each dimension.
    pub fn dims(&self) -> &[usize] {
        &self.shape.dims
    }

    /// The number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// The number of elements.
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// The number of bytes the tensor holds in its arena.
    pub fn num_bytes(&self) -> usize {
        self.allocation.bytes()
    }

    /// The arena the tensor was allocated from.
    pub fn arena(&self) -> &Arena {
        self.allocation.arena()
    }

    /// The elements in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Copies the elements into a vector.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.clone()
    }

    /// Consumes the tensor, releasing its allocation, and returns its elements.
    pub fn into_vec(self) -> Vec<f32> {
        let Self { data, .. } = self;
        data
    }

    /// Returns the single element of a tensor holding exactly one value.
    pub fn into_scalar(self) -> Result<f32> {
        match self.data.as_slice() {
            [value] => Ok(*value),
            _ => Err(TensorError::InvalidArgument {
                op: "into_scalar",
                reason: format!("tensor of shape {} holds more than one value", self.shape),
            }),
        }
    }

    /// Copies the tensor into a new allocation of the same arena.
    pub fn try_clone(&self) -> Result<Self> {
        Self::from_vec(self.arena(), self.shape.clone(), self.data.clone())
    }

    /// Returns a tensor with the same elements and a new shape.
    pub fn reshape<S: Into<Shape>>(&self, shape: S) -> Result<Self> {
        let shape = shape.into();

        if shape.num_elements() != self.num_elements() {
            return Err(TensorError::IncompatibleShapes {
                op: "reshape",
                lhs: self.shape.clone(),
                rhs: shape,
            });
        }

        Self::from_vec(self.arena(), shape, self.data.clone())
    }

    /// Returns the item at `index` along the leading dimension.
    pub fn select(&self, index: usize) -> Result<Self> {
        let batch_size = self.shape.batch_size();

        if self.rank() == 0 || index >= batch_size {
            return Err(TensorError::InvalidArgument {
                op: "select",
                reason: format!("index {index} is out of range for shape {}", self.shape),
            });
        }

        let item = self.shape.unbatched();
        let size = item.num_elements();
        let data = self.data[index * size..(index + 1) * size].to_vec();

        Self::from_vec(self.arena(), item, data)
    }

    /// Applies `func` to every element.
    pub fn map<F: Fn(f32) -> f32>(&self, func: F) -> Result<Self> {
        let data = self.data.iter().map(|value| func(*value)).collect();

        Self::from_vec(self.arena(), self.shape.clone(), data)
    }

    /// Combines two tensors of the same shape element-wise.
    pub fn zip_map<F: Fn(f32, f32) -> f32>(
        &self,
        other: &Tensor,
        op: &'static str,
        func: F,
    ) -> Result<Self> {
        self.check_same_shape(other, op)?;

        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(lhs, rhs)| func(*lhs, *rhs))
            .collect();

        Self::from_vec(self.arena(), self.shape.clone(), data)
    }

    /// Element-wise addition.
    pub fn add(&self, other: &Tensor) -> Result<Self> {
        self.zip_map(other, "add", |lhs, rhs| lhs + rhs)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, other: &Tensor) -> Result<Self> {
        self.zip_map(other, "sub", |lhs, rhs| lhs - rhs)
    }

    /// Element-wise multiplication.
    pub fn mul(&self, other: &Tensor) -> Result<Self> {
        self.zip_map(other, "mul", |lhs, rhs| lhs * rhs)
    }

    /// Adds a scalar to every element.
    pub fn add_scalar(&self, value: f32) -> Result<Self> {
        self.map(|elem| elem + value)
    }

    /// Multiplies every element by a scalar.
    pub fn mul_scalar(&self, value: f32) -> Result<Self> {
        self.map(|elem| elem * value)
    }

    /// Divides every element by a scalar.
    pub fn div_scalar(&self, value: f32) -> Result<Self> {
        self.map(|elem| elem / value)
    }

    /// Adds `bias` to every row, `bias` having the size of the last dimension.
    pub fn add_row_broadcast(&self, bias: &Tensor) -> Result<Self> {
        let width = self.last_dim();

        if bias.rank() != 1 || bias.num_elements() != width {
            return Err(TensorError::IncompatibleShapes {
                op: "add_row_broadcast",
                lhs: self.shape.clone(),
                rhs: bias.shape.clone(),
            });
        }

        let data = self
            .data
            .chunks(width.max(1))
            .flat_map(|row| row.iter().zip(bias.data.iter()).map(|(x, b)| x + b))
            .collect();

        Self::from_vec(self.arena(), self.shape.clone(), data)
    }

    /// Sums the rows of the tensor, returning a vector the size of the last dimension.
    pub fn sum_rows(&self) -> Result<Self> {
        let width = self.last_dim();
        let mut sums = vec![0.0; width];

        for row in self.data.chunks(width.max(1)) {
            for (sum, value) in sums.iter_mut().zip(row) {
                *sum += value;
            }
        }

        Self::from_vec(self.arena(), [width], sums)
    }

    /// Sum of all the elements.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Mean of all the elements.
    pub fn mean(&self) -> f32 {
        match self.data.len() {
            0 => 0.0,
            len => self.sum() / len as f32,
        }
    }

    /// Index of the highest value of each row of a rank 2 tensor.
    pub fn argmax_rows(&self) -> Result<Vec<usize>> {
        let [_rows, cols] = self.dims2("argmax_rows")?;

        Ok(self
            .data
            .chunks(cols.max(1))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (index, value)| {
                        if *value > best.1 {
                            (index, *value)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect())
    }

    /// Checks every element is within `tolerance` of the expected value.
    ///
    /// # Panics
    ///
    /// Panics with the first mismatching position when the values differ.
    pub fn assert_approx_eq(&self, expected: &[f32], tolerance: f32) {
        assert_eq!(
            self.data.len(),
            expected.len(),
            "Tensor of shape {} compared to {} values",
            self.shape,
            expected.len()
        );

        for (index, (actual, expected)) in self.data.iter().zip(expected).enumerate() {
            assert!(
                (actual - expected).abs() <= tolerance,
                "Mismatch at position {index}: {actual} != {expected} (tolerance {tolerance})"
            );
        }
    }

    pub(crate) fn dims2(&self, op: &'static str) -> Result<[usize; 2]> {
        match self.dims() {
            [rows, cols] => Ok([*rows, *cols]),
            _ => Err(self.rank_error(op, 2)),
        }
    }

    pub(crate) fn dims3(&self, op: &'static str) -> Result<[usize; 3]> {
        match self.dims() {
            [d0, d1, d2] => Ok([*d0, *d1, *d2]),
            _ => Err(self.rank_error(op, 3)),
        }
    }

    pub(crate) fn dims4(&self, op: &'static str) -> Result<[usize; 4]> {
        match self.dims() {
            [d0, d1, d2, d3] => Ok([*d0, *d1, *d2, *d3]),
            _ => Err(self.rank_error(op, 4)),
        }
    }

    /// Fails with [IncompatibleShapes](TensorError::IncompatibleShapes) unless both tensors have
    /// the same shape.
    pub fn check_same_shape(&self, other: &Tensor, op: &'static str) -> Result<()> {
        if self.shape != other.shape {
            return Err(TensorError::IncompatibleShapes {
                op,
                lhs: self.shape.clone(),
                rhs: other.shape.clone(),
            });
        }

        Ok(())
    }

    fn rank_error(&self, op: &'static str, expected: usize) -> TensorError {
        TensorError::InvalidRank {
            op,
            expected,
            actual: self.shape.clone(),
        }
    }

    fn last_dim(&self) -> usize {
        self.dims().last().copied().unwrap_or(1)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 8;

        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data", &&self.data[..self.data.len().min(PREVIEW)])
            .finish()
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn from_vec_checks_the_length() {
        let arena = Arena::new();
        let result = Tensor::from_vec(&arena, [2, 2], vec![1.0; 3]);

        assert_eq!(
            result.unwrap_err(),
            TensorError::DataLength {
                shape: Shape::new([2, 2]),
                expected: 4,
                actual: 3,
            }
        );
        assert_eq!(arena.live_tensors(), 0);
    }

    #[test]
    fn rank_above_four_is_refused() {
        let arena = Arena::new();
        let result = Tensor::zeros(&arena, [1, 1, 1, 1, 1]);

        assert!(matches!(result, Err(TensorError::InvalidRank { .. })));
    }

    #[test]
    fn reshape_creates_a_new_tensor() {
        let arena = Arena::new();
        let tensor = Tensor::from_fn(&arena, [2, 3], |i| i as f32).unwrap();
        let reshaped = tensor.reshape([3, 2]).unwrap();

        assert_eq!(tensor.dims(), &[2, 3]);
        assert_eq!(reshaped.dims(), &[3, 2]);
        assert_eq!(reshaped.as_slice(), tensor.as_slice());
        assert_eq!(arena.live_tensors(), 2);
        assert!(tensor.reshape([4, 2]).is_err());
    }

    #[test]
    fn one_hot_has_a_single_one() {
        let arena = Arena::new();
        let tensor = Tensor::one_hot(&arena, 3, 10).unwrap();

        assert_eq!(tensor.sum(), 1.0);
        assert_eq!(tensor.as_slice()[3], 1.0);
        assert!(Tensor::one_hot(&arena, 10, 10).is_err());
    }

    #[test]
    fn stack_and_select_are_inverse() {
        let arena = Arena::new();
        let a = Tensor::from_floats(&arena, [2], &[1.0, 2.0]).unwrap();
        let b = Tensor::from_floats(&arena, [2], &[3.0, 4.0]).unwrap();
        let stacked = Tensor::stack(&arena, &[&a, &b]).unwrap();

        assert_eq!(stacked.dims(), &[2, 2]);
        assert_eq!(stacked.select(1).unwrap(), b);
        assert!(stacked.select(2).is_err());
    }

    #[test]
    fn row_broadcast_and_row_sum() {
        let arena = Arena::new();
        let matrix = Tensor::from_floats(&arena, [2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let bias = Tensor::from_floats(&arena, [3], &[1.0, 0.0, -1.0]).unwrap();

        matrix
            .add_row_broadcast(&bias)
            .unwrap()
            .assert_approx_eq(&[2.0, 2.0, 2.0, 5.0, 5.0, 5.0], 0.0);
        matrix
            .sum_rows()
            .unwrap()
            .assert_approx_eq(&[5.0, 7.0, 9.0], 0.0);
    }

    #[test]
    fn argmax_per_row() {
        let arena = Arena::new();
        let tensor = Tensor::from_floats(
            &arena,
            [3, 3],
            &[0.0, 0.2, 0.8, 1.0, 2.0, 0.5, 0.4, 0.1, 0.2],
        )
        .unwrap();

        assert_eq!(tensor.argmax_rows().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn random_is_reproducible_with_a_seed() {
        let arena = Arena::new();
        let a = Tensor::random(
            &arena,
            [16],
            Distribution::Normal(0.0, 1.0),
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();
        let b = Tensor::random(
            &arena,
            [16],
            Distribution::Normal(0.0, 1.0),
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn into_vec_releases_the_allocation() {
        let arena = Arena::new();
        let tensor = Tensor::ones(&arena, [3]).unwrap();
        let data = tensor.into_vec();

        assert_eq!(data, vec![1.0; 3]);
        assert_eq!(arena.live_tensors(), 0);
    }
}
