use digitnet_core::nn::{Activation, Conv2dConfig, DenseConfig, LayerSpec, MaxPool2dConfig};
use digitnet_core::{Model, ModelConfig};
use digitnet_dataset::vision::{SyntheticDigitsConfig, SyntheticDigitsDataset};
use digitnet_tensor::{Arena, Shape};

pub fn digits(num_samples: usize) -> SyntheticDigitsDataset {
    SyntheticDigitsDataset::new(SyntheticDigitsConfig::new().with_num_samples(num_samples))
}

/// A model small enough to train in a unit test.
pub fn small_model(arena: &Arena) -> Model {
    let config = ModelConfig::new(
        Shape::new([28, 28, 1]),
        10,
        vec![
            Conv2dConfig::new(4, [5, 5]).into(),
            MaxPool2dConfig::new([4, 4]).into(),
            LayerSpec::Flatten,
            DenseConfig::new(10)
                .with_activation(Activation::Softmax)
                .into(),
        ],
    );

    config.init(arena).unwrap()
}
