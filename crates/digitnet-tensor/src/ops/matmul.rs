use ndarray::ArrayView2;

use crate::{Result, Tensor, TensorError};

/// Matrix product of `lhs` `[m, k]` and `rhs` `[k, n]`.
pub fn matmul(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let a = view(lhs, "matmul")?;
    let b = view(rhs, "matmul")?;

    if a.ncols() != b.nrows() {
        return Err(incompatible("matmul", lhs, rhs));
    }

    product(lhs, a.dot(&b))
}

/// Matrix product of the transpose of `lhs` `[k, m]` and `rhs` `[k, n]`.
pub fn matmul_lhs_transposed(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let a = view(lhs, "matmul_lhs_transposed")?;
    let b = view(rhs, "matmul_lhs_transposed")?;

    if a.nrows() != b.nrows() {
        return Err(incompatible("matmul_lhs_transposed", lhs, rhs));
    }

    product(lhs, a.t().dot(&b))
}

/// Matrix product of `lhs` `[m, k]` and the transpose of `rhs` `[n, k]`.
pub fn matmul_rhs_transposed(lhs: &Tensor, rhs: &Tensor) -> Result<Tensor> {
    let a = view(lhs, "matmul_rhs_transposed")?;
    let b = view(rhs, "matmul_rhs_transposed")?;

    if a.ncols() != b.ncols() {
        return Err(incompatible("matmul_rhs_transposed", lhs, rhs));
    }

    product(lhs, a.dot(&b.t()))
}

fn view<'a>(tensor: &'a Tensor, op: &'static str) -> Result<ArrayView2<'a, f32>> {
    let [rows, cols] = tensor.dims2(op)?;

    ArrayView2::from_shape((rows, cols), tensor.as_slice()).map_err(|err| {
        TensorError::InvalidArgument {
            op,
            reason: err.to_string(),
        }
    })
}

fn product(lhs: &Tensor, output: ndarray::Array2<f32>) -> Result<Tensor> {
    let (rows, cols) = output.dim();
    let data = output.iter().copied().collect();

    Tensor::from_vec(lhs.arena(), [rows, cols], data)
}

fn incompatible(op: &'static str, lhs: &Tensor, rhs: &Tensor) -> TensorError {
    TensorError::IncompatibleShapes {
        op,
        lhs: lhs.shape().clone(),
        rhs: rhs.shape().clone(),
    }
}
