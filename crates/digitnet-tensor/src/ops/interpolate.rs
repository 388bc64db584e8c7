use rayon::prelude::*;

use crate::{Result, Tensor, TensorError};

/// Bilinear resize of a channels-last image `[H, W, C]` to `[out_height, out_width, C]`.
///
/// Uses half-pixel centers with source coordinates clamped to the image (corners not aligned),
/// so resizing to the same size returns the input unchanged.
pub fn resize_bilinear(input: &Tensor, output_size: [usize; 2]) -> Result<Tensor> {
    let [in_height, in_width, channels] = input.dims3("resize_bilinear")?;
    let [out_height, out_width] = output_size;

    if in_height == 0 || in_width == 0 || out_height == 0 || out_width == 0 {
        return Err(TensorError::InvalidArgument {
            op: "resize_bilinear",
            reason: format!(
                "cannot resize {} to {out_height}x{out_width}",
                input.shape()
            ),
        });
    }

    let source = input.as_slice();
    let y_scale = in_height as f64 / out_height as f64;
    let x_scale = in_width as f64 / out_width as f64;
    let mut data = vec![0.0; out_height * out_width * channels];

    data.par_chunks_mut((out_width * channels).max(1))
        .enumerate()
        .for_each(|(h, row)| {
            let y = source_coordinate(h, y_scale, in_height);

            for w in 0..out_width {
                let x = source_coordinate(w, x_scale, in_width);

                for c in 0..channels {
                    row[w * channels + c] =
                        interpolate_single(source, in_width, channels, c, x, y) as f32;
                }
            }
        });

    Tensor::from_vec(input.arena(), [out_height, out_width, channels], data)
}

/// Source coordinate sampled by output index `index`, clamped to the input.
fn source_coordinate(index: usize, scale: f64, size: usize) -> f64 {
    ((index as f64 + 0.5) * scale - 0.5).clamp(0.0, (size - 1) as f64)
}

/// Weighted average of the four pixels around `(x, y)`.
fn interpolate_single(
    source: &[f32],
    width: usize,
    channels: usize,
    c: usize,
    x: f64,
    y: f64,
) -> f64 {
    let height = source.len() / (width * channels);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let dx = x - x0 as f64;
    let dy = y - y0 as f64;

    let pixel = |y: usize, x: usize| source[(y * width + x) * channels + c] as f64;

    pixel(y0, x0) * (1.0 - dx) * (1.0 - dy)
        + pixel(y0, x1) * dx * (1.0 - dy)
        + pixel(y1, x0) * (1.0 - dx) * dy
        + pixel(y1, x1) * dx * dy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Arena;

    #[test]
    fn same_size_is_identity() {
        let arena = Arena::new();
        let input = Tensor::from_fn(&arena, [5, 4, 2], |i| i as f32).unwrap();

        let output = resize_bilinear(&input, [5, 4]).unwrap();

        output.assert_approx_eq(input.as_slice(), 1e-6);
    }

    #[test]
    fn downsampling_averages_neighbours() {
        let arena = Arena::new();
        let input = Tensor::from_floats(
            &arena,
            [2, 2, 1],
            &[0.0, 1.0, 2.0, 3.0],
        )
        .unwrap();

        let output = resize_bilinear(&input, [1, 1]).unwrap();

        output.assert_approx_eq(&[1.5], 1e-6);
    }

    #[test]
    fn upsampling_keeps_the_value_range() {
        let arena = Arena::new();
        let input = Tensor::from_floats(&arena, [2, 2, 1], &[0.0, 255.0, 255.0, 0.0]).unwrap();

        let output = resize_bilinear(&input, [28, 28]).unwrap();

        assert_eq!(output.dims(), &[28, 28, 1]);
        assert!(output.as_slice().iter().all(|v| (0.0..=255.0).contains(v)));
        approx::assert_abs_diff_eq!(output.as_slice()[0], 0.0);
    }

    #[test]
    fn empty_images_are_refused() {
        let arena = Arena::new();
        let input = Tensor::zeros(&arena, [0, 4, 1]).unwrap();

        assert!(resize_bilinear(&input, [28, 28]).is_err());
    }
}
