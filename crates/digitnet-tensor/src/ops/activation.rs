use rayon::prelude::*;

use crate::{Result, Tensor};

/// Rectified linear unit, `max(x, 0)` element-wise.
pub fn relu(tensor: &Tensor) -> Result<Tensor> {
    tensor.map(|value| value.max(0.0))
}

/// Gradient of [relu] given its input and the gradient of its output.
pub fn relu_backward(input: &Tensor, grad: &Tensor) -> Result<Tensor> {
    input.zip_map(grad, "relu_backward", |x, grad| if x > 0.0 { grad } else { 0.0 })
}

/// Softmax over the last dimension.
///
/// Rows are shifted by their maximum before exponentiation and accumulated in `f64`, so large
/// logits do not overflow.
pub fn softmax(tensor: &Tensor) -> Result<Tensor> {
    let width = last_dim(tensor);
    let mut data = tensor.to_vec();

    data.par_chunks_mut(width).for_each(|row| {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f64;

        for value in row.iter_mut() {
            let exp = ((*value - max) as f64).exp();
            sum += exp;
            *value = exp as f32;
        }

        for value in row.iter_mut() {
            *value = (*value as f64 / sum) as f32;
        }
    });

    Tensor::from_vec(tensor.arena(), tensor.shape().clone(), data)
}

/// Gradient of [softmax] given its output `y` and the gradient of its output `g`.
///
/// Computes `y * (g - sum(g * y))` per row.
pub fn softmax_backward(output: &Tensor, grad: &Tensor) -> Result<Tensor> {
    output.check_same_shape(grad, "softmax_backward")?;

    let width = last_dim(output);
    let mut data = vec![0.0; output.num_elements()];

    data.par_chunks_mut(width)
        .zip(output.as_slice().par_chunks(width))
        .zip(grad.as_slice().par_chunks(width))
        .for_each(|((out, y), g)| {
            let dot: f32 = y.iter().zip(g).map(|(y, g)| y * g).sum();

            for ((out, y), g) in out.iter_mut().zip(y).zip(g) {
                *out = y * (g - dot);
            }
        });

    Tensor::from_vec(output.arena(), output.shape().clone(), data)
}

fn last_dim(tensor: &Tensor) -> usize {
    tensor.dims().last().copied().unwrap_or(1).max(1)
}
