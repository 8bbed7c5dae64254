use crate::data::svhn::{CHANNELS, SvhnItem};
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Spatial size of the model input.
pub const HEIGHT: usize = 28;
pub const WIDTH: usize = 28;

const MEAN: [f32; CHANNELS] = [0.5, 0.5, 0.5];
const STD: [f32; CHANNELS] = [0.5, 0.5, 0.5];

/// Per-channel normalizer.
#[derive(Clone, Debug)]
pub struct Normalizer<B: Backend> {
    pub mean: Tensor<B, 4>,
    pub std: Tensor<B, 4>,
}

impl<B: Backend> Normalizer<B> {
    pub fn new(device: &B::Device) -> Self {
        let mean = Tensor::<B, 1>::from_floats(MEAN, device).reshape([1, CHANNELS, 1, 1]);
        let std = Tensor::<B, 1>::from_floats(STD, device).reshape([1, CHANNELS, 1, 1]);
        Self { mean, std }
    }

    /// `input = (input - mean) / std`
    ///
    /// An input in the range [0, 1] is mapped to [-1, 1].
    pub fn normalize(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        (input - self.mean.clone()) / self.std.clone()
    }
}

#[derive(Clone, Default)]
pub struct SvhnBatcher {}

#[derive(Clone, Debug)]
pub struct SvhnBatch<B: Backend> {
    /// Resized to 28x28, scaled to [0, 1], then normalized per channel into [-1, 1].
    ///
    /// # Shape
    /// [batch_size, CHANNELS, HEIGHT, WIDTH]
    pub images: Tensor<B, 4>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, SvhnItem, SvhnBatch<B>> for SvhnBatcher {
    fn batch(&self, items: Vec<SvhnItem>, device: &B::Device) -> SvhnBatch<B> {
        let batch_size = items.len();
        let (height, width) = items
            .first()
            .map(|item| (item.height, item.width))
            .unwrap_or((HEIGHT, WIDTH));

        let mut pixels = Vec::with_capacity(batch_size * CHANNELS * height * width);
        let mut labels = Vec::with_capacity(batch_size);
        for item in items {
            assert_eq!(
                (item.height, item.width),
                (height, width),
                "all images of a batch must share their dimensions"
            );
            assert_eq!(item.image.len(), CHANNELS * height * width);
            pixels.extend(item.image.iter().map(|p| *p as f32));
            labels.push(item.label as i64);
        }

        let images = TensorData::new(pixels, [batch_size, CHANNELS, height, width]);
        let images = Tensor::<B, 4>::from_data(images.convert::<B::FloatElem>(), device);
        // scale between [0, 1]
        let images = resize(images / 255);
        let images = Normalizer::<B>::new(device).normalize(images);

        let targets = TensorData::new(labels, [batch_size]);
        let targets = Tensor::<B, 1, Int>::from_data(targets.convert::<B::IntElem>(), device);

        SvhnBatch { images, targets }
    }
}

/// Bilinear resize to [HEIGHT, WIDTH], skipped when already at that size.
fn resize<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_batch_size, _channels, height, width] = images.dims();
    if (height, width) == (HEIGHT, WIDTH) {
        return images;
    }
    interpolate(
        images,
        [HEIGHT, WIDTH],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray<f32>;

    fn item(height: usize, width: usize, label: u8, pixel: impl Fn(usize) -> u8) -> SvhnItem {
        SvhnItem {
            image: (0..CHANNELS * height * width).map(pixel).collect(),
            height,
            width,
            label,
        }
    }

    #[test]
    fn resizes_to_three_channels_of_28x28_within_unit_range() {
        let device = Default::default();
        let items = vec![
            item(32, 32, 1, |i| (i * 37 % 256) as u8),
            item(32, 32, 2, |_| 0),
            item(32, 32, 3, |_| 255),
        ];

        let batch: SvhnBatch<TestBackend> = SvhnBatcher::default().batch(items, &device);

        assert_eq!(batch.images.dims(), [3, CHANNELS, HEIGHT, WIDTH]);
        let min = batch.images.clone().min().into_scalar();
        let max = batch.images.max().into_scalar();
        assert!(min >= -1.0 - 1e-6, "min {min}");
        assert!(max <= 1.0 + 1e-6, "max {max}");
    }

    #[test]
    fn normalizes_each_channel_with_half_mean_and_std() {
        let device = Default::default();
        let items = vec![item(HEIGHT, WIDTH, 0, |_| 51), item(HEIGHT, WIDTH, 0, |_| 255)];

        let batch: SvhnBatch<TestBackend> = SvhnBatcher::default().batch(items, &device);

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        let per_image = CHANNELS * HEIGHT * WIDTH;
        assert!(values[..per_image].iter().all(|v| (v + 0.6).abs() < 1e-5));
        assert!(values[per_image..].iter().all(|v| (v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn targets_follow_item_order() {
        let device = Default::default();
        let items = (0..10)
            .rev()
            .map(|label| item(HEIGHT, WIDTH, label, |_| 0))
            .collect();

        let batch: SvhnBatch<TestBackend> = SvhnBatcher::default().batch(items, &device);

        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, (0..10).rev().collect::<Vec<i64>>());
    }

    #[test]
    #[should_panic(expected = "share their dimensions")]
    fn mixed_dimensions_are_rejected() {
        let device = Default::default();
        let items = vec![item(32, 32, 0, |_| 0), item(28, 28, 0, |_| 0)];

        let _batch: SvhnBatch<TestBackend> = SvhnBatcher::default().batch(items, &device);
    }
}
