//! Small convolutional classifier for 3x28x28 images.

use crate::data::{CHANNELS, HEIGHT, WIDTH};
use burn::nn::{
    Linear, LinearConfig, PaddingConfig2d, Relu,
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
};
use burn::prelude::*;
use burn::train::ClassificationOutput;

/// Channel widths of the three convolution stages, each followed by a 2x2 max-pool.
const STAGES: [[usize; 3]; 3] = [[CHANNELS, 8, 16], [16, 32, 32], [32, 32, 32]];

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = 10)]
    pub num_classes: usize,
    #[config(default = 256)]
    pub hidden_size: usize,
}

/// Two 3x3 convolutions (stride 1, padding 1) with ReLU, then a 2x2 max-pool halving the resolution.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub activation: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new([d_input, d_middle, d_output]: [usize; 3], device: &B::Device) -> Self {
        let conv = |channels: [usize; 2]| -> Conv2d<B> {
            Conv2dConfig::new(channels, [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        Self {
            conv1: conv([d_input, d_middle]),
            conv2: conv([d_middle, d_output]),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        }
    }

    /// # Shapes
    ///   - Input [batch_size, d_input, height, width]
    ///   - Output [batch_size, d_output, height / 2, width / 2]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.forward(self.conv1.forward(x));
        let x = self.activation.forward(self.conv2.forward(x));
        self.pool.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    pub blocks: Vec<ConvBlock<B>>,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub activation: Relu,
}

impl ModelConfig {
    /// Number of features entering the first fully-connected layer (32 x 3 x 3).
    pub fn flattened_size(&self) -> usize {
        let [_, _, d_output] = STAGES[STAGES.len() - 1];
        let (height, width) = STAGES
            .iter()
            .fold((HEIGHT, WIDTH), |(height, width), _| (height / 2, width / 2));
        d_output * height * width
    }

    /// Returns the initialized model, using burn's default parameter initializers.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        Model {
            blocks: STAGES
                .iter()
                .map(|channels| ConvBlock::new(*channels, device))
                .collect(),
            fc1: LinearConfig::new(self.flattened_size(), self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Model<B> {
    /// Returns raw logits (no final activation).
    ///
    /// # Shapes
    ///   - Input [batch_size, CHANNELS, HEIGHT, WIDTH]
    ///   - Output [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, channels, height, width] = images.dims();
        assert_eq!([channels, height, width], [CHANNELS, HEIGHT, WIDTH]);

        let x = self
            .blocks
            .iter()
            .fold(images, |x, block| block.forward(x));
        let x: Tensor<B, 2> = x.flatten(1, 3);
        let [d_flat, _] = self.fc1.weight.dims();
        assert_eq!([batch_size, d_flat], x.dims());

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.fc2.forward(x);
        let [_, num_classes] = self.fc2.weight.dims();
        assert_eq!([batch_size, num_classes], x.dims());

        x
    }

    /// Forward pass plus the mean cross-entropy loss against `targets`.
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let [batch_size] = targets.dims();
        let output = self.forward(images);
        assert_eq!(output.dims()[0], batch_size);

        let loss = burn::nn::loss::CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::NUM_CLASSES;
    use burn::tensor::{Distribution, activation::softmax};

    type TestBackend = burn::backend::NdArray<f32>;

    #[test]
    fn flattened_size_is_32x3x3() {
        assert_eq!(ModelConfig::new().flattened_size(), 32 * 3 * 3);
    }

    #[test]
    fn output_has_one_logit_per_class() {
        let device = Default::default();
        let model = ModelConfig::new().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random(
            [5, CHANNELS, HEIGHT, WIDTH],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        let output = model.forward(images);

        assert_eq!(output.dims(), [5, NUM_CLASSES]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = ModelConfig::new().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random(
            [4, CHANNELS, HEIGHT, WIDTH],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );

        let probabilities = softmax(model.forward(images), 1);
        let sums = probabilities.sum_dim(1).into_data().to_vec::<f32>().unwrap();

        assert_eq!(sums.len(), 4);
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-5, "sum {sum}");
        }
    }

    #[test]
    fn stage_shapes_halve_resolution() {
        let device = Default::default();
        let model = ModelConfig::new().init::<TestBackend>(&device);
        let mut x = Tensor::<TestBackend, 4>::zeros([2, CHANNELS, HEIGHT, WIDTH], &device);

        let mut shapes = vec![];
        for block in model.blocks.iter() {
            x = block.forward(x);
            shapes.push(x.dims());
        }

        assert_eq!(
            shapes,
            vec![[2, 16, 14, 14], [2, 32, 7, 7], [2, 32, 3, 3]]
        );
    }

    #[test]
    fn classification_loss_is_finite_and_positive() {
        let device = Default::default();
        let model = ModelConfig::new().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random(
            [3, CHANNELS, HEIGHT, WIDTH],
            Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_data([1, 5, 9], &device);

        let output = model.forward_classification(images, targets);
        let loss = output.loss.into_scalar();

        assert!(loss.is_finite() && loss > 0.0, "loss {loss}");
        assert_eq!(output.output.dims(), [3, NUM_CLASSES]);
    }
}
