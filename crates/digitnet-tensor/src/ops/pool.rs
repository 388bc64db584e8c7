use rayon::prelude::*;

use super::conv_output_size;
use crate::{Result, Tensor, TensorError};

/// Max pooling options. Pooling windows never extend past the input.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPool2dOptions {
    /// Window size along height and width.
    pub kernel_size: [usize; 2],
    /// Stride along height and width.
    pub stride: [usize; 2],
}

impl MaxPool2dOptions {
    /// Output height and width for an input of the given spatial size.
    pub fn output_size(&self, height: usize, width: usize) -> Option<[usize; 2]> {
        let out_height = conv_output_size(height, self.kernel_size[0], self.stride[0], 0)?;
        let out_width = conv_output_size(width, self.kernel_size[1], self.stride[1], 0)?;

        Some([out_height, out_width])
    }
}

/// 2D max pooling of a channels-last batch `[N, H, W, C]`.
pub fn max_pool2d(input: &Tensor, options: MaxPool2dOptions) -> Result<Tensor> {
    let [batch_size, height, width, channels] = input.dims4("max_pool2d")?;
    let [out_height, out_width] = output_size(input, options, height, width)?;
    let item_size = height * width * channels;
    let out_item_size = out_height * out_width * channels;
    let mut data = vec![0.0; batch_size * out_item_size];

    data.par_chunks_mut(out_item_size.max(1))
        .zip(input.as_slice().par_chunks(item_size.max(1)))
        .for_each(|(output, item)| {
            for oh in 0..out_height {
                for ow in 0..out_width {
                    for c in 0..channels {
                        let index = argmax_in_window(item, options, width, channels, oh, ow, c);
                        output[(oh * out_width + ow) * channels + c] = item[index];
                    }
                }
            }
        });

    Tensor::from_vec(
        input.arena(),
        [batch_size, out_height, out_width, channels],
        data,
    )
}

/// Backward pass of [max_pool2d]: each output gradient flows to the position that held the
/// maximum of its window.
pub fn max_pool2d_backward(
    input: &Tensor,
    grad: &Tensor,
    options: MaxPool2dOptions,
) -> Result<Tensor> {
    let [batch_size, height, width, channels] = input.dims4("max_pool2d_backward")?;
    let [out_height, out_width] = output_size(input, options, height, width)?;

    if grad.dims() != [batch_size, out_height, out_width, channels] {
        return Err(TensorError::IncompatibleShapes {
            op: "max_pool2d_backward",
            lhs: input.shape().clone(),
            rhs: grad.shape().clone(),
        });
    }

    let item_size = height * width * channels;
    let out_item_size = out_height * out_width * channels;
    let mut data = vec![0.0; input.num_elements()];

    data.par_chunks_mut(item_size.max(1))
        .zip(input.as_slice().par_chunks(item_size.max(1)))
        .zip(grad.as_slice().par_chunks(out_item_size.max(1)))
        .for_each(|((output, item), grad)| {
            for oh in 0..out_height {
                for ow in 0..out_width {
                    for c in 0..channels {
                        let index = argmax_in_window(item, options, width, channels, oh, ow, c);
                        output[index] += grad[(oh * out_width + ow) * channels + c];
                    }
                }
            }
        });

    Tensor::from_vec(input.arena(), input.shape().clone(), data)
}

fn output_size(
    input: &Tensor,
    options: MaxPool2dOptions,
    height: usize,
    width: usize,
) -> Result<[usize; 2]> {
    options
        .output_size(height, width)
        .ok_or_else(|| TensorError::InvalidArgument {
            op: "max_pool2d",
            reason: format!("{options:?} does not fit input {}", input.shape()),
        })
}

/// Flat index within one batch item of the window maximum, first occurrence on ties.
fn argmax_in_window(
    item: &[f32],
    options: MaxPool2dOptions,
    width: usize,
    channels: usize,
    oh: usize,
    ow: usize,
    c: usize,
) -> usize {
    let mut best = None::<(usize, f32)>;

    for kh in 0..options.kernel_size[0] {
        let ih = oh * options.stride[0] + kh;
        for kw in 0..options.kernel_size[1] {
            let iw = ow * options.stride[1] + kw;
            let index = (ih * width + iw) * channels + c;
            let value = item[index];

            match best {
                Some((_, max)) if value <= max => {}
                _ => best = Some((index, value)),
            }
        }
    }

    best.map_or(c, |(index, _)| index)
}
