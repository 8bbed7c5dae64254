//! Terminal figures and the final summary table.

use crate::data::NUM_CLASSES;
use crate::metrics::{ConfusionMatrix, MetricsSummary};
use crate::training::{TrainingReport, fmt_auc};
use textplots::{Chart, Plot, Shape};

const CHART_WIDTH: u32 = 160;
const CHART_HEIGHT: u32 = 48;

/// Light to dark, indexed by the share of the largest count.
const SHADES: [char; 5] = [' ', '░', '▒', '▓', '█'];

/// Renders every figure and the summary table of a finished run to stdout.
pub fn render(report: &TrainingReport) -> MetricsSummary {
    let summary = MetricsSummary::compute(&report.accumulator);

    loss_curves(&report.train_losses(), &report.test_losses());
    roc_curves(&summary);
    per_class_accuracy_bars(&summary.per_class_accuracy);
    println!("{}", heatmap(&summary.confusion_matrix));
    println!("{}", summary_table(&summary));

    summary
}

/// `(epoch, loss)` pairs, epochs counted from 1. Non-finite losses are left out.
pub fn epoch_points(losses: &[f64]) -> Vec<(f32, f32)> {
    losses
        .iter()
        .enumerate()
        .filter(|(_, loss)| loss.is_finite())
        .map(|(i, loss)| ((i + 1) as f32, *loss as f32))
        .collect()
}

fn loss_curves(train_losses: &[f64], test_losses: &[f64]) {
    let train = epoch_points(train_losses);
    let test = epoch_points(test_losses);
    let epochs = train_losses.len().max(1) as f32;
    let Some(max_loss) = train
        .iter()
        .chain(&test)
        .map(|(_, loss)| *loss)
        .reduce(f32::max)
    else {
        log::warn!("No finite loss to plot");
        return;
    };

    println!("Loss per epoch (train, then test)");
    Chart::new_with_y_range(
        CHART_WIDTH,
        CHART_HEIGHT,
        0.0,
        epochs,
        0.0,
        max_loss.max(f32::EPSILON) * 1.1,
    )
    .lineplot(&Shape::Lines(&train))
    .lineplot(&Shape::Lines(&test))
    .display();
}

fn roc_curves(summary: &MetricsSummary) {
    let points: Vec<Vec<(f32, f32)>> = summary
        .roc_curves
        .iter()
        .flatten()
        .map(|curve| {
            curve
                .points()
                .map(|(fpr, tpr)| (fpr as f32, tpr as f32))
                .collect()
        })
        .collect();
    let shapes: Vec<Shape> = points.iter().map(|points| Shape::Lines(points)).collect();

    println!("ROC curves, one-vs-rest (x: false positive rate, y: true positive rate)");
    let mut chart = Chart::new_with_y_range(CHART_WIDTH, CHART_HEIGHT, 0.0, 1.0, 0.0, 1.0);
    shapes
        .iter()
        .fold(&mut chart, |chart, shape| chart.lineplot(shape))
        .display();
    for (class, auc) in summary.per_class_auc.iter().enumerate() {
        println!("  class {class}: AUC {}", fmt_auc(*auc));
    }
}

fn per_class_accuracy_bars(per_class_accuracy: &[f64; NUM_CLASSES]) {
    let bars: Vec<(f32, f32)> = per_class_accuracy
        .iter()
        .enumerate()
        .map(|(class, acc)| (class as f32, *acc as f32))
        .collect();

    println!("Accuracy per class");
    Chart::new_with_y_range(
        CHART_WIDTH,
        CHART_HEIGHT,
        0.0,
        NUM_CLASSES as f32,
        0.0,
        1.0,
    )
    .lineplot(&Shape::Bars(&bars))
    .display();
    for (class, acc) in per_class_accuracy.iter().enumerate() {
        println!("  class {class}: {:.2}%", acc * 100.0);
    }
}

/// Confusion matrix as a shaded grid of counts. Rows are true labels, columns predictions.
pub fn heatmap(matrix: &ConfusionMatrix) -> String {
    let max = matrix.max_count();
    let mut out = String::from("Confusion matrix (rows: true label, columns: predicted label)\n");

    out.push_str("true\\pred");
    for class in 0..NUM_CLASSES {
        out.push_str(&format!(" {class:>7}"));
    }
    out.push('\n');

    for (label, row) in matrix.counts.iter().enumerate() {
        out.push_str(&format!("{label:>9}"));
        for count in row {
            out.push_str(&format!(" {}{count:>6}", shade(*count, max)));
        }
        out.push('\n');
    }
    out
}

fn shade(count: usize, max: usize) -> char {
    if count == 0 || max == 0 {
        return SHADES[0];
    }
    // any non-zero count gets at least the lightest visible shade
    let levels = SHADES.len() - 1;
    SHADES[(count * levels).div_ceil(max).clamp(1, levels)]
}

/// Overall accuracy, macro and micro AUC, and the AUC of every class.
pub fn summary_table(summary: &MetricsSummary) -> String {
    let mut rows = vec![
        ("Samples".to_string(), summary.samples.to_string()),
        ("Accuracy".to_string(), format!("{:.4}", summary.accuracy)),
        ("Macro AUC".to_string(), fmt_auc(summary.macro_auc)),
        ("Micro AUC".to_string(), fmt_auc(summary.micro_auc)),
    ];
    for (class, auc) in summary.per_class_auc.iter().enumerate() {
        rows.push((format!("AUC class {class}"), fmt_auc(*auc)));
    }

    let name_width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let value_width = rows
        .iter()
        .map(|(_, value)| value.len())
        .max()
        .unwrap_or(0)
        .max("Value".len());
    let rule = format!("+-{}-+-{}-+\n", "-".repeat(name_width), "-".repeat(value_width));

    let mut out = rule.clone();
    out.push_str(&format!(
        "| {:<name_width$} | {:<value_width$} |\n",
        "Metric", "Value"
    ));
    out.push_str(&rule);
    for (name, value) in rows {
        out.push_str(&format!("| {name:<name_width$} | {value:>value_width$} |\n"));
    }
    out.push_str(&rule);
    out
}
