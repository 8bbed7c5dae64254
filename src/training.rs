use crate::data::{SvhnBatch, SvhnBatcher, SvhnItem};
use crate::metrics::{EvalAccumulator, accuracy, macro_auc, micro_auc, per_class_auc};
use crate::model::{Model, ModelConfig};
use burn::data::dataloader::{DataLoader, DataLoaderBuilder, Progress};
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use burn::train::ClassificationOutput;
use burn::train::metric::{LossInput, LossMetric, Metric, MetricMetadata, Numeric, NumericEntry};
use std::fmt;
use std::sync::Arc;

/// Whether the evaluation accumulator is cleared before each epoch's eval pass.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AccumulationMode {
    /// Metrics of an epoch only cover that epoch's eval pass.
    #[default]
    PerEpoch,
    /// Metrics cover the union of every eval pass so far.
    Cumulative,
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub model: ModelConfig,
    pub optimizer: AdamConfig,
    #[config(default = 30)]
    pub num_epochs: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    /// Workers of the train loader; the test loader is single-threaded to keep its order fixed.
    #[config(default = 2)]
    pub num_workers: usize,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 42)]
    pub seed: u64,
    #[config(default = "AccumulationMode::PerEpoch")]
    pub accumulation: AccumulationMode,
}

/// The run's parameters: Adam at lr 1e-3, 30 epochs of 128-image batches.
pub fn training_config() -> TrainingConfig {
    TrainingConfig::new(ModelConfig::new(), AdamConfig::new())
}

pub type Dataloader<B> = Arc<dyn DataLoader<B, SvhnBatch<B>>>;

/// Shuffled batches, reshuffled on every pass.
pub fn train_dataloader<B: Backend>(
    config: &TrainingConfig,
    device: &B::Device,
    dataset: impl Dataset<SvhnItem> + 'static,
) -> Dataloader<B> {
    DataLoaderBuilder::new(SvhnBatcher::default())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .set_device(device.clone())
        .build(dataset)
}

/// Batches in dataset order.
pub fn test_dataloader<B: Backend>(
    config: &TrainingConfig,
    device: &B::Device,
    dataset: impl Dataset<SvhnItem> + 'static,
) -> Dataloader<B> {
    DataLoaderBuilder::new(SvhnBatcher::default())
        .batch_size(config.batch_size)
        .set_device(device.clone())
        .build(dataset)
}

/// Losses and metrics of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub epoch: usize,
    pub epoch_total: usize,
    /// Mean per-sample cross-entropy.
    pub train_loss: f64,
    pub test_loss: f64,
    pub accuracy: f64,
    pub macro_auc: Option<f64>,
    pub micro_auc: Option<f64>,
}

impl EpochSummary {
    pub fn new(
        epoch: usize,
        epoch_total: usize,
        train_loss: f64,
        test_loss: f64,
        accumulator: &EvalAccumulator,
    ) -> Self {
        Self {
            epoch,
            epoch_total,
            train_loss,
            test_loss,
            accuracy: accuracy(accumulator.labels(), accumulator.predictions()),
            macro_auc: macro_auc(&per_class_auc(accumulator)),
            micro_auc: micro_auc(accumulator),
        }
    }
}

pub(crate) fn fmt_auc(auc: Option<f64>) -> String {
    auc.map_or_else(|| "n/a".to_string(), |auc| format!("{auc:.4}"))
}

impl fmt::Display for EpochSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {}/{}, Train Loss {:.4}, Test Loss {:.4}, Acc {:.2}%, Macro AUC {}, Micro AUC {}",
            self.epoch,
            self.epoch_total,
            self.train_loss,
            self.test_loss,
            self.accuracy * 100.0,
            fmt_auc(self.macro_auc),
            fmt_auc(self.micro_auc),
        )
    }
}

/// Everything a run produces: one summary per epoch and the final accumulator.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub epochs: Vec<EpochSummary>,
    pub accumulator: EvalAccumulator,
}

impl TrainingReport {
    pub fn train_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|epoch| epoch.train_loss).collect()
    }

    pub fn test_losses(&self) -> Vec<f64> {
        self.epochs.iter().map(|epoch| epoch.test_loss).collect()
    }
}

/// Result of one pass over the test batches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalOutcome {
    /// Mean per-sample cross-entropy.
    pub loss: f64,
    pub samples: usize,
}

pub fn train<AutoB: AutodiffBackend>(
    config: &TrainingConfig,
    device: AutoB::Device,
    dataset_train: impl Dataset<SvhnItem> + 'static,
    dataset_test: impl Dataset<SvhnItem> + 'static,
) -> TrainingReport {
    AutoB::seed(&device, config.seed);

    let mut model: Model<AutoB> = config.model.init(&device);
    let mut optim = config.optimizer.init::<AutoB, Model<AutoB>>();

    let dataloader_train = train_dataloader::<AutoB>(config, &device, dataset_train);
    let dataloader_test = test_dataloader::<AutoB::InnerBackend>(config, &device, dataset_test);
    log::info!(
        "Training on {} images, evaluating on {} images",
        dataloader_train.num_items(),
        dataloader_test.num_items()
    );

    let mut accumulator = EvalAccumulator::new();
    let mut epochs = Vec::with_capacity(config.num_epochs);
    for epoch in 1..config.num_epochs + 1 {
        log::debug!("Epoch {epoch}/{}: training", config.num_epochs);
        let (trained, train_loss) =
            epoch_train(Arc::clone(&dataloader_train), model, &mut optim, config, epoch);
        model = trained;

        if config.accumulation == AccumulationMode::PerEpoch {
            accumulator.clear();
        }
        log::debug!("Epoch {epoch}/{}: evaluating", config.num_epochs);
        let outcome = evaluate(Arc::clone(&dataloader_test), &model.valid(), &mut accumulator);

        let summary = EpochSummary::new(
            epoch,
            config.num_epochs,
            train_loss,
            outcome.loss,
            &accumulator,
        );
        if !summary.train_loss.is_finite() || !summary.test_loss.is_finite() {
            log::warn!("Epoch {epoch}: non-finite loss, metrics are degenerate");
        }
        println!("{summary}");
        epochs.push(summary);
    }
    println!("Training finished.");

    TrainingReport {
        epochs,
        accumulator,
    }
}

/// One optimizer step per batch. Returns the updated model and the mean per-sample loss.
pub fn epoch_train<AutoB, O>(
    dataloader_train: Dataloader<AutoB>,
    mut model: Model<AutoB>,
    optim: &mut O,
    config: &TrainingConfig,
    epoch: usize,
) -> (Model<AutoB>, f64)
where
    AutoB: AutodiffBackend,
    O: Optimizer<Model<AutoB>, AutoB>,
{
    let num_items = dataloader_train.num_items();
    let num_batches = num_items.div_ceil(config.batch_size);
    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, num_items),
        epoch,
        epoch_total: config.num_epochs,
        iteration: 0,
        lr: Some(config.lr),
    };
    let mut loss_metric = LossMetric::<AutoB>::new();

    for (b, batch) in dataloader_train.iter().enumerate() {
        let [batch_size] = batch.targets.dims();
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;

        let output = model.forward_classification(batch.images, batch.targets);
        loss_metric.update(&loss_input(&output, batch_size), &metric_meta);

        let grads = output.loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        model = optim.step(config.lr, model, grads);

        log::debug!(
            "Epoch {}/{}, Batch {:0>4}/{num_batches}, Loss {:.4}",
            metric_meta.epoch,
            metric_meta.epoch_total,
            b + 1,
            loss_metric.value().current(),
        );
    }

    let loss = epoch_loss(&loss_metric, metric_meta.progress.items_processed);
    (model, loss)
}

/// Forward-only pass over the test batches, appending to `accumulator`.
pub fn evaluate<B: Backend>(
    dataloader_test: Dataloader<B>,
    model: &Model<B>,
    accumulator: &mut EvalAccumulator,
) -> EvalOutcome {
    // a standalone pass, not tied to an epoch of a run
    let mut metric_meta = MetricMetadata {
        progress: Progress::new(0, dataloader_test.num_items()),
        epoch: 1,
        epoch_total: 1,
        iteration: 0,
        lr: None,
    };
    let mut loss_metric = LossMetric::<B>::new();

    for batch in dataloader_test.iter() {
        let [batch_size] = batch.targets.dims();
        metric_meta.iteration += 1;
        metric_meta.progress.items_processed += batch_size;

        let output = model.forward_classification(batch.images, batch.targets);
        loss_metric.update(&loss_input(&output, batch_size), &metric_meta);

        let labels = indices(output.targets);
        let predictions = indices(output.output.clone().argmax(1));
        let probabilities: Vec<f32> = softmax(output.output, 1)
            .into_data()
            .iter::<f32>()
            .collect();
        accumulator.push_batch(&labels, &predictions, &probabilities);
    }

    let samples = metric_meta.progress.items_processed;
    EvalOutcome {
        loss: epoch_loss(&loss_metric, samples),
        samples,
    }
}

/// The batch's mean loss once per item, so the metric weighs each batch by its size.
fn loss_input<B: Backend>(output: &ClassificationOutput<B>, batch_size: usize) -> LossInput<B> {
    LossInput::new(output.loss.clone().repeat_dim(0, batch_size))
}

/// Batch-size weighted mean of every loss seen by `loss_metric`, `0.0` after an empty pass.
fn epoch_loss<B: Backend>(loss_metric: &LossMetric<B>, num_items: usize) -> f64 {
    if num_items == 0 {
        return 0.0;
    }
    match loss_metric.value() {
        NumericEntry::Aggregated { sum, count, .. } => sum / count as f64,
        NumericEntry::Value(value) => value,
    }
}

fn indices<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Vec<usize> {
    tensor
        .into_data()
        .iter::<i64>()
        .map(|index| index as usize)
        .collect()
}
