use digitnet_core::config::Config;
use digitnet_tensor::{ops::resize_bilinear, Arena, Tensor, TensorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{HEIGHT, WIDTH};

const MAX_VALUE: f32 = 255.0;

/// How a multi-channel pixel is reduced to one intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelect {
    /// ITU-R BT.601 luminance of the red, green and blue channels.
    ///
    /// Alpha is ignored. Single and two channel images use their first channel.
    #[default]
    Luminance,

    /// The channel at the given index.
    Channel(usize),
}

/// Configuration of the [preprocessing](preprocess) of a drawing.
#[derive(new, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Size of the output image as `[height, width]`.
    #[new(value = "[HEIGHT, WIDTH]")]
    pub target_size: [usize; 2],
    /// Channel reduction.
    #[new(default)]
    pub channel: ChannelSelect,
    /// Inverts the intensities, for dark strokes on a light background.
    #[new(value = "false")]
    pub invert: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for PreprocessConfig {}

impl PreprocessConfig {
    /// Sets the size of the output image.
    pub fn with_target_size(mut self, target_size: [usize; 2]) -> Self {
        self.target_size = target_size;
        self
    }

    /// Sets the channel reduction.
    pub fn with_channel(mut self, channel: ChannelSelect) -> Self {
        self.channel = channel;
        self
    }

    /// Sets whether intensities are inverted.
    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }
}

/// Errors raised while preprocessing a drawing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    /// The image or the target has an empty dimension.
    #[error("Invalid dimensions: cannot resize a {width}x{height} image to {target:?}")]
    InvalidDimensions {
        /// Width of the image.
        width: usize,
        /// Height of the image.
        height: usize,
        /// Requested output size.
        target: [usize; 2],
    },

    /// The buffer does not hold a whole number of pixels with 1 to 4 channels.
    #[error(
        "Invalid buffer length: {len} bytes do not hold a {width}x{height} image with 1 to 4 channels"
    )]
    InvalidBufferLength {
        /// Length of the buffer.
        len: usize,
        /// Width of the image.
        width: usize,
        /// Height of the image.
        height: usize,
    },

    /// The selected channel does not exist.
    #[error("Invalid channel: channel {channel} of an image with {channels} channels")]
    InvalidChannel {
        /// The selected channel.
        channel: usize,
        /// Number of channels of the image.
        channels: usize,
    },

    /// Tensor allocation failed.
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Turns a drawing into a model input of shape `[1, height, width, 1]` with values in `[0, 1]`.
///
/// The channel count is inferred from the buffer length. Pixels are reduced to one intensity,
/// resized bilinearly to the target size and divided by 255. Intermediate tensors are released
/// before returning, only the output is left in the arena.
///
/// # Arguments
///
/// * `arena` - The arena the output is allocated from.
/// * `pixels` - Row-major pixels, channels interleaved.
/// * `width` - Width of the drawing.
/// * `height` - Height of the drawing.
/// * `config` - The preprocessing configuration.
pub fn preprocess(
    arena: &Arena,
    pixels: &[u8],
    width: usize,
    height: usize,
    config: &PreprocessConfig,
) -> Result<Tensor, PreprocessError> {
    let [target_height, target_width] = config.target_size;

    if width == 0 || height == 0 || target_height == 0 || target_width == 0 {
        return Err(PreprocessError::InvalidDimensions {
            width,
            height,
            target: config.target_size,
        });
    }

    let channels = infer_channels(pixels.len(), width, height)?;
    let intensity = reduce_channels(pixels, channels, config)?;

    arena.run_scoped(|| {
        let image = Tensor::from_vec(arena, [height, width, 1], intensity)?;
        let resized = resize_bilinear(&image, config.target_size)?;
        let normalized = resized.div_scalar(MAX_VALUE)?;
        let batched = normalized.reshape([1, target_height, target_width, 1])?;

        Ok(batched)
    })
}

fn infer_channels(len: usize, width: usize, height: usize) -> Result<usize, PreprocessError> {
    let invalid = || PreprocessError::InvalidBufferLength { len, width, height };
    let num_pixels = width.checked_mul(height).ok_or_else(invalid)?;

    if len == 0 || len % num_pixels != 0 {
        return Err(invalid());
    }

    match len / num_pixels {
        channels @ 1..=4 => Ok(channels),
        _ => Err(invalid()),
    }
}

fn reduce_channels(
    pixels: &[u8],
    channels: usize,
    config: &PreprocessConfig,
) -> Result<Vec<f32>, PreprocessError> {
    if let ChannelSelect::Channel(channel) = config.channel {
        if channel >= channels {
            return Err(PreprocessError::InvalidChannel { channel, channels });
        }
    }

    let intensity = pixels
        .chunks_exact(channels)
        .map(|pixel| {
            let value = match config.channel {
                ChannelSelect::Luminance if channels >= 3 => {
                    0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32
                }
                ChannelSelect::Luminance => pixel[0] as f32,
                ChannelSelect::Channel(channel) => pixel[channel] as f32,
            };
            let value = value.clamp(0.0, MAX_VALUE);

            if config.invert {
                MAX_VALUE - value
            } else {
                value
            }
        })
        .collect();

    Ok(intensity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config() -> PreprocessConfig {
        PreprocessConfig::new()
    }

    #[test]
    fn output_is_a_single_normalized_image() {
        let arena = Arena::new();
        let pixels = vec![255u8; 56 * 56];

        let tensor = preprocess(&arena, &pixels, 56, 56, &config()).unwrap();

        assert_eq!(tensor.dims(), &[1, 28, 28, 1]);
        tensor.assert_approx_eq(&[1.0; 28 * 28], 1e-6);
    }

    #[test]
    fn blank_canvas_gives_zeros() {
        let arena = Arena::new();
        let pixels = vec![0u8; 280 * 280];

        let tensor = preprocess(&arena, &pixels, 280, 280, &config()).unwrap();

        assert!(tensor.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn only_the_output_stays_allocated() {
        let arena = Arena::new();
        let pixels = vec![12u8; 100 * 80 * 4];

        let tensor = preprocess(&arena, &pixels, 100, 80, &config()).unwrap();

        assert_eq!(arena.live_tensors(), 1);
        assert_eq!(arena.live_bytes(), tensor.num_bytes());
    }

    #[test]
    fn identical_inputs_give_identical_outputs() {
        let arena = Arena::new();
        let pixels = (0..97 * 61 * 3).map(|i| (i * 31 % 256) as u8).collect::<Vec<_>>();

        let first = preprocess(&arena, &pixels, 97, 61, &config()).unwrap();
        let second = preprocess(&arena, &pixels, 97, 61, &config()).unwrap();

        let first_bits = first.as_slice().iter().map(|v| v.to_bits());
        assert!(first_bits.eq(second.as_slice().iter().map(|v| v.to_bits())));
    }

    #[test]
    fn alpha_is_ignored_by_luminance() {
        let arena = Arena::new();
        // Opaque white and transparent white give the same intensity.
        let opaque = [255u8, 255, 255, 255].repeat(28 * 28);
        let transparent = [255u8, 255, 255, 0].repeat(28 * 28);

        let opaque = preprocess(&arena, &opaque, 28, 28, &config()).unwrap();
        let transparent = preprocess(&arena, &transparent, 28, 28, &config()).unwrap();

        assert_eq!(opaque, transparent);
    }

    #[test]
    fn luminance_weights_the_color_channels() {
        let arena = Arena::new();
        let pixels = [255u8, 0, 0].repeat(28 * 28);

        let tensor = preprocess(&arena, &pixels, 28, 28, &config()).unwrap();

        tensor.assert_approx_eq(&[0.299; 28 * 28], 1e-5);
    }

    #[test]
    fn explicit_channel_is_selected() {
        let arena = Arena::new();
        let pixels = [0u8, 0, 0, 255].repeat(28 * 28);
        let config = config().with_channel(ChannelSelect::Channel(3));

        let tensor = preprocess(&arena, &pixels, 28, 28, &config).unwrap();

        tensor.assert_approx_eq(&[1.0; 28 * 28], 1e-6);
    }

    #[test]
    fn inversion_turns_white_background_black() {
        let arena = Arena::new();
        let pixels = vec![255u8; 28 * 28];
        let config = config().with_invert(true);

        let tensor = preprocess(&arena, &pixels, 28, 28, &config).unwrap();

        assert!(tensor.as_slice().iter().all(|v| *v == 0.0));
    }

    #[rstest]
    #[case(0, 10, 0)]
    #[case(10, 0, 0)]
    fn empty_images_are_refused(#[case] width: usize, #[case] height: usize, #[case] len: usize) {
        let arena = Arena::new();

        let err = preprocess(&arena, &vec![0; len], width, height, &config()).unwrap_err();

        assert!(matches!(err, PreprocessError::InvalidDimensions { .. }));
    }

    #[rstest]
    #[case(99)]
    #[case(0)]
    #[case(500)]
    fn buffer_length_must_match(#[case] len: usize) {
        let arena = Arena::new();

        let err = preprocess(&arena, &vec![0; len], 10, 10, &config()).unwrap_err();

        assert_eq!(
            err,
            PreprocessError::InvalidBufferLength {
                len,
                width: 10,
                height: 10
            }
        );
        assert_eq!(arena.live_tensors(), 0);
    }

    #[test]
    fn missing_channel_is_refused() {
        let arena = Arena::new();
        let config = config().with_channel(ChannelSelect::Channel(1));

        let err = preprocess(&arena, &[0; 16], 4, 4, &config).unwrap_err();

        assert_eq!(
            err,
            PreprocessError::InvalidChannel {
                channel: 1,
                channels: 1
            }
        );
    }

    #[test]
    fn exhausted_arena_releases_intermediates() {
        // Room for the intensity image only.
        let arena = Arena::with_capacity(28 * 28 * 4);
        let pixels = vec![0u8; 28 * 28];
        let config = config().with_target_size([28, 28]);

        let err = preprocess(&arena, &pixels, 28, 28, &config).unwrap_err();

        assert!(matches!(
            err,
            PreprocessError::Tensor(TensorError::AllocationExhausted { .. })
        ));
        assert_eq!(arena.live_tensors(), 0);
    }

    #[test]
    fn config_json_uses_snake_case() {
        let config = config().with_channel(ChannelSelect::Channel(2));

        let json = serde_json::to_string(&config).unwrap();

        assert!(json.contains(r#""channel":{"channel":2}"#));
    }
}
