use rayon::prelude::*;

use super::{matmul, matmul_lhs_transposed, matmul_rhs_transposed};
use crate::{Result, Tensor, TensorError};

/// Convolution options.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dOptions {
    /// Stride along height and width.
    pub stride: [usize; 2],
    /// Zero padding added on both sides of height and width.
    pub padding: [usize; 2],
}

impl Default for Conv2dOptions {
    fn default() -> Self {
        Self::new([1, 1], [0, 0])
    }
}

/// Gradients of a 2D convolution.
#[derive(Debug)]
pub struct Conv2dGrads {
    /// Gradient of the input `[N, H, W, C]`.
    pub input: Tensor,
    /// Gradient of the weight `[KH, KW, C, F]`.
    pub weight: Tensor,
    /// Gradient of the bias `[F]`.
    pub bias: Tensor,
}

/// Calculate the expected output size when doing a convolution operation.
///
/// Returns `None` when the kernel does not fit in the padded input or the stride is zero.
pub fn conv_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> Option<usize> {
    if stride == 0 || kernel_size == 0 {
        return None;
    }

    (input_size + 2 * padding)
        .checked_sub(kernel_size)
        .map(|size| size / stride + 1)
}

/// Padding keeping the spatial size unchanged for an odd kernel with a stride of 1.
pub fn same_padding(kernel_size: usize) -> usize {
    kernel_size.saturating_sub(1) / 2
}

/// 2D convolution of a channels-last batch.
///
/// * `input` - `[N, H, W, C]`
/// * `weight` - `[KH, KW, C, F]`
/// * `bias` - `[F]`
///
/// Returns `[N, OH, OW, F]`. The input is unfolded into patches which are multiplied with the
/// flattened kernel.
pub fn conv2d(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    options: Conv2dOptions,
) -> Result<Tensor> {
    let geometry = Geometry::new(input, weight, options)?;
    let columns = im2col(input, &geometry)?;
    let kernel = weight.reshape([geometry.patch_size(), geometry.filters])?;
    let output = matmul(&columns, &kernel)?;

    let output = match bias {
        Some(bias) => output.add_row_broadcast(bias)?,
        None => output,
    };

    output.reshape(geometry.output_shape())
}

/// Backward pass of [conv2d] given the gradient of its output `[N, OH, OW, F]`.
pub fn conv2d_backward(
    input: &Tensor,
    weight: &Tensor,
    grad: &Tensor,
    options: Conv2dOptions,
) -> Result<Conv2dGrads> {
    let geometry = Geometry::new(input, weight, options)?;

    if grad.dims() != geometry.output_shape() {
        return Err(TensorError::IncompatibleShapes {
            op: "conv2d_backward",
            lhs: geometry.output_shape().into(),
            rhs: grad.shape().clone(),
        });
    }

    let columns = im2col(input, &geometry)?;
    let kernel = weight.reshape([geometry.patch_size(), geometry.filters])?;
    let grad = grad.reshape([geometry.num_patches(), geometry.filters])?;

    let weight_grad = matmul_lhs_transposed(&columns, &grad)?.reshape(weight.shape())?;
    let bias_grad = grad.sum_rows()?;
    let columns_grad = matmul_rhs_transposed(&grad, &kernel)?;
    let input_grad = col2im(&columns_grad, &geometry, input)?;

    Ok(Conv2dGrads {
        input: input_grad,
        weight: weight_grad,
        bias: bias_grad,
    })
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    batch_size: usize,
    in_height: usize,
    in_width: usize,
    channels: usize,
    kernel: [usize; 2],
    filters: usize,
    out_height: usize,
    out_width: usize,
    options: Conv2dOptions,
}

impl Geometry {
    fn new(input: &Tensor, weight: &Tensor, options: Conv2dOptions) -> Result<Self> {
        let [batch_size, in_height, in_width, channels] = input.dims4("conv2d")?;
        let [kernel_height, kernel_width, weight_channels, filters] = weight.dims4("conv2d")?;

        if weight_channels != channels {
            return Err(TensorError::IncompatibleShapes {
                op: "conv2d",
                lhs: input.shape().clone(),
                rhs: weight.shape().clone(),
            });
        }

        let out_height = conv_output_size(
            in_height,
            kernel_height,
            options.stride[0],
            options.padding[0],
        );
        let out_width = conv_output_size(in_width, kernel_width, options.stride[1], options.padding[1]);

        match (out_height, out_width) {
            (Some(out_height), Some(out_width)) => Ok(Self {
                batch_size,
                in_height,
                in_width,
                channels,
                kernel: [kernel_height, kernel_width],
                filters,
                out_height,
                out_width,
                options,
            }),
            _ => Err(TensorError::InvalidArgument {
                op: "conv2d",
                reason: format!(
                    "kernel {kernel_height}x{kernel_width} with {options:?} does not fit input {}",
                    input.shape()
                ),
            }),
        }
    }

    fn patch_size(&self) -> usize {
        self.kernel[0] * self.kernel[1] * self.channels
    }

    fn patches_per_item(&self) -> usize {
        self.out_height * self.out_width
    }

    fn num_patches(&self) -> usize {
        self.batch_size * self.patches_per_item()
    }

    fn output_shape(&self) -> [usize; 4] {
        [self.batch_size, self.out_height, self.out_width, self.filters]
    }

    /// Input position read by kernel offset `k` of output position `o` along dimension `dim`.
    fn input_index(&self, dim: usize, o: usize, k: usize) -> Option<usize> {
        let size = if dim == 0 { self.in_height } else { self.in_width };

        (o * self.options.stride[dim] + k)
            .checked_sub(self.options.padding[dim])
            .filter(|index| *index < size)
    }
}

/// Unfolds the input into a `[N * OH * OW, KH * KW * C]` matrix of patches.
fn im2col(input: &Tensor, geometry: &Geometry) -> Result<Tensor> {
    let g = *geometry;
    let channels = g.channels;
    let item_size = g.in_height * g.in_width * channels;
    let source = input.as_slice();
    let mut columns = vec![0.0; g.num_patches() * g.patch_size()];

    columns
        .par_chunks_mut(g.patch_size().max(1))
        .enumerate()
        .for_each(|(patch, row)| {
            let n = patch / g.patches_per_item();
            let oh = patch % g.patches_per_item() / g.out_width;
            let ow = patch % g.out_width;
            let item = &source[n * item_size..(n + 1) * item_size];

            for kh in 0..g.kernel[0] {
                let Some(ih) = g.input_index(0, oh, kh) else {
                    continue;
                };
                for kw in 0..g.kernel[1] {
                    let Some(iw) = g.input_index(1, ow, kw) else {
                        continue;
                    };
                    let start = (ih * g.in_width + iw) * channels;
                    let offset = (kh * g.kernel[1] + kw) * channels;
                    row[offset..offset + channels].copy_from_slice(&item[start..start + channels]);
                }
            }
        });

    Tensor::from_vec(input.arena(), [g.num_patches(), g.patch_size()], columns)
}

/// Folds patch gradients back onto the input, summing overlapping contributions.
fn col2im(columns: &Tensor, geometry: &Geometry, input: &Tensor) -> Result<Tensor> {
    let g = *geometry;
    let channels = g.channels;
    let item_size = g.in_height * g.in_width * channels;
    let patch_size = g.patch_size();
    let source = columns.as_slice();
    let mut data = vec![0.0; g.batch_size * item_size];

    data.par_chunks_mut(item_size.max(1))
        .enumerate()
        .for_each(|(n, item)| {
            for oh in 0..g.out_height {
                for ow in 0..g.out_width {
                    let patch = n * g.patches_per_item() + oh * g.out_width + ow;
                    let row = &source[patch * patch_size..(patch + 1) * patch_size];

                    for kh in 0..g.kernel[0] {
                        let Some(ih) = g.input_index(0, oh, kh) else {
                            continue;
                        };
                        for kw in 0..g.kernel[1] {
                            let Some(iw) = g.input_index(1, ow, kw) else {
                                continue;
                            };
                            let start = (ih * g.in_width + iw) * channels;
                            let offset = (kh * g.kernel[1] + kw) * channels;

                            for c in 0..channels {
                                item[start + c] += row[offset + c];
                            }
                        }
                    }
                }
            }
        });

    Tensor::from_vec(input.arena(), input.shape().clone(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arena;
    use rstest::rstest;

    #[rstest]
    #[case(28, 5, 1, 0, Some(24))]
    #[case(28, 5, 1, 2, Some(28))]
    #[case(12, 5, 1, 0, Some(8))]
    #[case(7, 3, 2, 1, Some(4))]
    #[case(3, 5, 1, 0, None)]
    #[case(3, 3, 0, 0, None)]
    fn output_size(
        #[case] input: usize,
        #[case] kernel: usize,
        #[case] stride: usize,
        #[case] padding: usize,
        #[case] expected: Option<usize>,
    ) {
        assert_eq!(conv_output_size(input, kernel, stride, padding), expected);
    }

    #[test]
    fn conv2d_sums_the_window() {
        let arena = Arena::new();
        let input = Tensor::from_fn(&arena, [1, 3, 3, 1], |i| i as f32).unwrap();
        let weight = Tensor::ones(&arena, [2, 2, 1, 1]).unwrap();
        let bias = Tensor::from_floats(&arena, [1], &[0.5]).unwrap();

        let output = conv2d(&input, &weight, Some(&bias), Conv2dOptions::default()).unwrap();

        assert_eq!(output.dims(), &[1, 2, 2, 1]);
        output.assert_approx_eq(&[8.5, 12.5, 20.5, 24.5], 1e-5);
    }

    #[test]
    fn conv2d_with_padding_and_channels() {
        let arena = Arena::new();
        // Two channels, the second being twice the first.
        let input = Tensor::from_fn(&arena, [1, 2, 2, 2], |i| {
            let value = (i / 2 + 1) as f32;
            if i % 2 == 0 {
                value
            } else {
                2.0 * value
            }
        })
        .unwrap();
        // One filter reading only the second channel at the kernel center.
        let mut weight = vec![0.0; 3 * 3 * 2];
        weight[(3 + 1) * 2 + 1] = 1.0;
        let weight = Tensor::from_vec(&arena, [3, 3, 2, 1], weight).unwrap();

        let output = conv2d(&input, &weight, None, Conv2dOptions::new([1, 1], [1, 1])).unwrap();

        assert_eq!(output.dims(), &[1, 2, 2, 1]);
        output.assert_approx_eq(&[2.0, 4.0, 6.0, 8.0], 1e-6);
    }

    #[test]
    fn conv2d_backward_matches_finite_differences() {
        let arena = Arena::new();
        let options = Conv2dOptions::new([1, 1], [1, 1]);
        let input = Tensor::from_fn(&arena, [2, 4, 4, 2], |i| ((i * 7 % 11) as f32 - 5.0) / 5.0)
            .unwrap();
        let weight =
            Tensor::from_fn(&arena, [3, 3, 2, 3], |i| ((i * 5 % 13) as f32 - 6.0) / 10.0).unwrap();
        let bias = Tensor::zeros(&arena, [3]).unwrap();

        // Loss is the plain sum of the output, its gradient is ones.
        let output = conv2d(&input, &weight, Some(&bias), options).unwrap();
        let grad = Tensor::ones(&arena, output.shape()).unwrap();
        let grads = conv2d_backward(&input, &weight, &grad, options).unwrap();

        let loss = |input: &Tensor, weight: &Tensor| {
            conv2d(input, weight, Some(&bias), options).unwrap().sum() as f64
        };
        let epsilon = 1e-2;

        for index in [0, 5, 17, 40] {
            let mut plus = weight.to_vec();
            let mut minus = weight.to_vec();
            plus[index] += epsilon;
            minus[index] -= epsilon;
            let plus = Tensor::from_vec(&arena, weight.shape(), plus).unwrap();
            let minus = Tensor::from_vec(&arena, weight.shape(), minus).unwrap();
            let numeric = (loss(&input, &plus) - loss(&input, &minus)) / (2.0 * epsilon as f64);

            approx::assert_abs_diff_eq!(
                grads.weight.as_slice()[index] as f64,
                numeric,
                epsilon = 1e-2
            );
        }

        for index in [0, 9, 31, 63] {
            let mut plus = input.to_vec();
            let mut minus = input.to_vec();
            plus[index] += epsilon;
            minus[index] -= epsilon;
            let plus = Tensor::from_vec(&arena, input.shape(), plus).unwrap();
            let minus = Tensor::from_vec(&arena, input.shape(), minus).unwrap();
            let numeric = (loss(&plus, &weight) - loss(&minus, &weight)) / (2.0 * epsilon as f64);

            approx::assert_abs_diff_eq!(
                grads.input.as_slice()[index] as f64,
                numeric,
                epsilon = 1e-2
            );
        }

        // Each filter sees every output position once.
        grads.bias.assert_approx_eq(&[32.0, 32.0, 32.0], 1e-4);
    }

    #[test]
    fn kernel_larger_than_input_is_refused() {
        let arena = Arena::new();
        let input = Tensor::zeros(&arena, [1, 3, 3, 1]).unwrap();
        let weight = Tensor::zeros(&arena, [5, 5, 1, 1]).unwrap();

        assert!(matches!(
            conv2d(&input, &weight, None, Conv2dOptions::default()),
            Err(TensorError::InvalidArgument { op: "conv2d", .. })
        ));
    }
}
