use digitnet_core::config::Config;
use digitnet_tensor::Distribution;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::glyph::{is_inked, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::Dataset;

/// Width of the digit images.
pub const WIDTH: usize = 28;
/// Height of the digit images.
pub const HEIGHT: usize = 28;
/// Number of digit classes.
pub const NUM_CLASSES: usize = 10;

// Sub-pixel samples per axis when rasterizing a glyph.
const SUPERSAMPLING: usize = 2;

/// Digit item.
#[derive(new, Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DigitItem {
    /// Pixel intensities in `[0, 1]`, row major with the channel last.
    pub image: Vec<f32>,

    /// Shape of the image as `[height, width, channels]`.
    pub shape: [usize; 3],

    /// Label of the image.
    pub label: usize,
}

impl DigitItem {
    /// Intensity of the pixel at `(row, col)` of the first channel.
    pub fn pixel(&self, row: usize, col: usize) -> Option<f32> {
        let [height, width, channels] = self.shape;
        if row >= height || col >= width {
            return None;
        }
        self.image.get((row * width + col) * channels).copied()
    }
}

/// Configuration of the [synthetic digits dataset](SyntheticDigitsDataset).
#[derive(new, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticDigitsConfig {
    /// Number of samples in the dataset.
    #[new(value = "5000")]
    pub num_samples: usize,
    /// Seed every sample is derived from.
    #[new(value = "42")]
    pub seed: u64,
    /// Smallest size, in pixels, of one glyph cell.
    #[new(value = "2.4")]
    pub min_scale: f32,
    /// Largest size, in pixels, of one glyph cell.
    #[new(value = "3.4")]
    pub max_scale: f32,
    /// Largest shift of the glyph from the image center, in pixels.
    #[new(value = "2.0")]
    pub max_offset: f32,
    /// Largest horizontal shear of the glyph.
    #[new(value = "0.2")]
    pub max_slant: f32,
    /// Dimmest stroke intensity.
    #[new(value = "0.7")]
    pub min_intensity: f32,
    /// Standard deviation of the Gaussian noise added to every pixel.
    #[new(value = "0.05")]
    pub noise_std: f32,
}

impl Default for SyntheticDigitsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for SyntheticDigitsConfig {}

impl SyntheticDigitsConfig {
    /// Sets the number of samples.
    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    /// Sets the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the range of glyph cell sizes.
    pub fn with_scale(mut self, min_scale: f32, max_scale: f32) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    /// Sets the largest shift from the image center.
    pub fn with_max_offset(mut self, max_offset: f32) -> Self {
        self.max_offset = max_offset;
        self
    }

    /// Sets the largest horizontal shear.
    pub fn with_max_slant(mut self, max_slant: f32) -> Self {
        self.max_slant = max_slant;
        self
    }

    /// Sets the dimmest stroke intensity.
    pub fn with_min_intensity(mut self, min_intensity: f32) -> Self {
        self.min_intensity = min_intensity;
        self
    }

    /// Sets the standard deviation of the pixel noise.
    pub fn with_noise_std(mut self, noise_std: f32) -> Self {
        self.noise_std = noise_std;
        self
    }
}

/// Handwritten-looking digits rendered on demand.
///
/// Every item is derived from the seed and its index only, so the dataset is finite, restartable
/// and yields the same images on every pass. Labels cycle through the ten digits, which keeps the
/// classes balanced in any contiguous range.
#[derive(Debug, Clone)]
pub struct SyntheticDigitsDataset {
    config: SyntheticDigitsConfig,
}

impl SyntheticDigitsDataset {
    /// Creates the dataset.
    ///
    /// Out of range parameters are clamped to sensible values.
    pub fn new(config: SyntheticDigitsConfig) -> Self {
        let mut config = config;

        config.min_scale = finite_or(config.min_scale, 2.4).max(0.5);
        config.max_scale = finite_or(config.max_scale, 3.4).max(config.min_scale);
        config.max_offset = finite_or(config.max_offset, 0.0).abs();
        config.max_slant = finite_or(config.max_slant, 0.0).abs();
        config.min_intensity = finite_or(config.min_intensity, 1.0).clamp(0.0, 1.0);
        config.noise_std = finite_or(config.noise_std, 0.0).max(0.0);

        log::debug!(
            "Synthetic digits: {} samples from seed {}",
            config.num_samples,
            config.seed
        );

        Self { config }
    }

    /// The configuration after clamping.
    pub fn config(&self) -> &SyntheticDigitsConfig {
        &self.config
    }

    fn render(&self, index: usize) -> DigitItem {
        let config = &self.config;
        let label = index % NUM_CLASSES;
        let mut rng = StdRng::seed_from_u64(item_seed(config.seed, index));

        let scale = sample_range(&mut rng, config.min_scale, config.max_scale);
        let center_y = HEIGHT as f32 / 2.0 + sample_symmetric(&mut rng, config.max_offset);
        let center_x = WIDTH as f32 / 2.0 + sample_symmetric(&mut rng, config.max_offset);
        let slant = sample_symmetric(&mut rng, config.max_slant);
        let intensity = sample_range(&mut rng, config.min_intensity, 1.0);

        let samples_per_pixel = (SUPERSAMPLING * SUPERSAMPLING) as f32;
        let mut image = vec![0.0; WIDTH * HEIGHT];

        for (position, pixel) in image.iter_mut().enumerate() {
            let (row, col) = (position / WIDTH, position % WIDTH);
            let mut covered = 0;

            for sub_y in 0..SUPERSAMPLING {
                for sub_x in 0..SUPERSAMPLING {
                    let y = row as f32 + (sub_y as f32 + 0.5) / SUPERSAMPLING as f32;
                    let x = col as f32 + (sub_x as f32 + 0.5) / SUPERSAMPLING as f32;

                    let v = (y - center_y) / scale + GLYPH_HEIGHT as f32 / 2.0;
                    let u = (x - center_x - slant * (y - center_y)) / scale
                        + GLYPH_WIDTH as f32 / 2.0;

                    if u >= 0.0 && v >= 0.0 && is_inked(label, v as usize, u as usize) {
                        covered += 1;
                    }
                }
            }

            *pixel = intensity * covered as f32 / samples_per_pixel;
        }

        if config.noise_std > 0.0 {
            add_noise(&mut image, config.noise_std, &mut rng);
        }

        DigitItem::new(image, [HEIGHT, WIDTH, 1], label)
    }
}

impl Dataset<DigitItem> for SyntheticDigitsDataset {
    fn get(&self, index: usize) -> Option<DigitItem> {
        if index >= self.config.num_samples {
            return None;
        }

        Some(self.render(index))
    }

    fn len(&self) -> usize {
        self.config.num_samples
    }
}

fn add_noise(image: &mut [f32], std: f32, rng: &mut StdRng) {
    let mut sampler = match Distribution::Normal(0.0, std as f64).sampler(rng) {
        Ok(sampler) => sampler,
        Err(err) => {
            log::warn!("Skipping pixel noise: {err}");
            return;
        }
    };

    for pixel in image.iter_mut() {
        *pixel = (*pixel + sampler.sample()).clamp(0.0, 1.0);
    }
}

fn item_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

fn sample_range(rng: &mut StdRng, low: f32, high: f32) -> f32 {
    if high > low {
        rng.gen_range(low..=high)
    } else {
        low
    }
}

fn sample_symmetric(rng: &mut StdRng, bound: f32) -> f32 {
    sample_range(rng, -bound, bound)
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
